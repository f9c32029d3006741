//! pyhost command-line tool
//!
//! Evaluates expressions, calls functions and awaits coroutines inside an
//! embedded CPython interpreter:
//!
//! ```text
//! pyhost eval "sum(range(10))"
//! pyhost --path ./lib call mymodule greet world
//! pyhost --path ./lib await jobs fetch https://example.com --timeout 5
//! ```

mod commands;

use anyhow::Context;
use clap::{Parser, Subcommand};
use pyhost_runtime::{Environment, EnvironmentOptions};
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

#[derive(Parser, Debug)]
#[command(name = "pyhost")]
#[command(about = "Run Python code in an embedded interpreter", long_about = None)]
#[command(version)]
struct Cli {
    /// Environment options file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory to append to sys.path (repeatable)
    #[arg(long = "path", global = true)]
    paths: Vec<PathBuf>,

    /// Log runtime events
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Evaluate an expression and print its repr
    Eval {
        /// Python expression
        expression: String,
    },

    /// Call a function with string arguments and print the result's repr
    Call {
        /// Module to import
        module: String,
        /// Function name within the module
        function: String,
        /// Positional arguments, passed as str
        args: Vec<String>,
    },

    /// Call an async function and await the coroutine it returns
    Await {
        /// Module to import
        module: String,
        /// Async function name within the module
        function: String,
        /// Positional arguments, passed as str
        args: Vec<String>,
        /// Cancel the coroutine after this many seconds
        #[arg(long)]
        timeout: Option<f64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::WARN })
        .with_writer(std::io::stderr)
        .init();

    let options = load_options(&cli)?;
    let env = Environment::start(options).context("Failed to start the Python interpreter")?;

    let outcome = match cli.command {
        Commands::Eval { expression } => commands::eval::execute(&env, &expression),
        Commands::Call {
            module,
            function,
            args,
        } => commands::call::execute(&env, &module, &function, &args),
        Commands::Await {
            module,
            function,
            args,
            timeout,
        } => {
            match timeout.map(Duration::try_from_secs_f64).transpose() {
                Ok(timeout) => {
                    commands::coroutine::execute(&env, &module, &function, &args, timeout).await
                }
                Err(e) => Err(anyhow::anyhow!("Invalid --timeout: {e}")),
            }
        }
    };

    let shutdown = env.shutdown().context("Failed to shut down the Python interpreter");
    outcome?;
    shutdown
}

fn load_options(cli: &Cli) -> anyhow::Result<EnvironmentOptions> {
    let mut options = match &cli.config {
        Some(path) => EnvironmentOptions::load(path)?,
        None => EnvironmentOptions::default(),
    };
    options.search_paths.extend(cli.paths.iter().cloned());
    Ok(options)
}
