use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use optune::{Options, Search, StopToken};

fn converge(c: &mut Criterion) {
    let mut group = c.benchmark_group("binary");
    for tolerance in [1e-2, 1e-4, 1e-6] {
        group.bench_with_input(
            BenchmarkId::from_parameter(tolerance),
            &tolerance,
            |b, &tolerance| {
                b.iter(|| {
                    let mut search = optune::search_plugins().build("binary").unwrap();
                    let mut opts = Options::new();
                    opts.set("opt:lower_bound", vec![0.0]);
                    opts.set("opt:upper_bound", vec![1.0]);
                    opts.set("opt:target", 42.0);
                    opts.set("opt:global_rel_tolerance", tolerance);
                    opts.set("opt:max_iterations", 200u32);
                    search.set_options(&opts).unwrap();
                    search
                        .search(&|x: &[f64]| Ok(vec![100.0 * x[0]]), &StopToken::new())
                        .unwrap()
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, converge);
criterion_main!(benches);
