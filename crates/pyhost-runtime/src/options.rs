//! Environment configuration (pyhost.toml)
//!
//! ```toml
//! search_paths = ["./python", "/opt/app/lib"]
//! install_signal_handlers = false
//! finalize_on_shutdown = true
//! shutdown_timeout_ms = 10000
//! ```
//!
//! Every field is optional.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Options for [`crate::Environment::start`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentOptions {
    /// Directories appended to `sys.path`
    #[serde(default)]
    pub search_paths: Vec<PathBuf>,

    /// Let the interpreter install its own signal handlers
    #[serde(default)]
    pub install_signal_handlers: bool,

    /// Finalize the interpreter on shutdown (only when this environment
    /// initialized it)
    #[serde(default = "default_finalize_on_shutdown")]
    pub finalize_on_shutdown: bool,

    /// How long disposing an event loop waits for its driver thread
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

fn default_finalize_on_shutdown() -> bool {
    true
}

fn default_shutdown_timeout_ms() -> u64 {
    10_000
}

impl Default for EnvironmentOptions {
    fn default() -> Self {
        Self {
            search_paths: Vec::new(),
            install_signal_handlers: false,
            finalize_on_shutdown: default_finalize_on_shutdown(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

impl EnvironmentOptions {
    /// Parse options from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load options from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        toml::from_str(&content).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Append a directory to the search paths
    pub fn with_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_paths.push(path.into());
        self
    }

    /// Set whether the interpreter installs signal handlers
    pub fn with_signal_handlers(mut self, install: bool) -> Self {
        self.install_signal_handlers = install;
        self
    }

    /// Set whether shutdown finalizes the interpreter
    pub fn with_finalize_on_shutdown(mut self, finalize: bool) -> Self {
        self.finalize_on_shutdown = finalize;
        self
    }

    /// Set the event loop shutdown timeout
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout_ms = timeout.as_millis().try_into().unwrap_or(u64::MAX);
        self
    }

    /// Event loop shutdown timeout
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}
