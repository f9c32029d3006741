use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pyhost_runtime::{Environment, Gil, PyHandle, ToPython};

fn env() -> &'static Environment {
    Environment::global().unwrap()
}

fn bench_gil(c: &mut Criterion) {
    env();
    let mut group = c.benchmark_group("gil");

    group.bench_function("acquire_outermost", |b| {
        b.iter(|| {
            let guard = Gil::acquire();
            black_box(&guard);
        });
    });

    group.bench_function("acquire_nested", |b| {
        let _outer = Gil::acquire();
        b.iter(|| {
            let guard = Gil::acquire();
            black_box(&guard);
        });
    });

    group.finish();
}

fn bench_call_paths(c: &mut Criterion) {
    let env = env();
    let identity = env.eval("lambda *args, **kwargs: None").unwrap();
    let one = 1i64.to_python().unwrap();
    let two = 2i64.to_python().unwrap();
    let three = 3i64.to_python().unwrap();
    let extra = env.eval("{'z': 0}").unwrap();

    let mut group = c.benchmark_group("call");
    let cases: [(&str, Vec<&PyHandle>); 3] = [
        ("no_args", vec![]),
        ("one_arg", vec![&one]),
        ("three_args", vec![&one, &two, &three]),
    ];
    for (name, args) in &cases {
        group.bench_with_input(BenchmarkId::new("positional", name), args, |b, args| {
            b.iter(|| identity.call(black_box(args)).unwrap());
        });
    }

    group.bench_function("keywords", |b| {
        b.iter(|| {
            identity
                .call_with_keywords(&[&one], &["x", "y"], &[&two, &three], Some(&extra))
                .unwrap()
        });
    });

    group.finish();
}

fn bench_handles(c: &mut Criterion) {
    let object = env().eval("object()").unwrap();

    c.bench_function("clone_and_dispose", |b| {
        b.iter(|| {
            let mut clone = object.clone_ref().unwrap();
            clone.dispose();
        });
    });
}

criterion_group!(benches, bench_gil, bench_call_paths, bench_handles);
criterion_main!(benches);
