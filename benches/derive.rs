use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use normaleq::{derive, ModelSpec};

fn bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("normaleq");
    let families: [(&str, fn() -> ModelSpec); 4] = [
        ("linear", ModelSpec::linear),
        ("quadratic", ModelSpec::quadratic),
        ("power", ModelSpec::power),
        ("exponential", ModelSpec::exponential),
    ];
    for (name, spec) in families {
        group.bench_with_input(BenchmarkId::new("derive", name), &spec, |b, spec| {
            b.iter(|| derive(&spec()).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench);
criterion_main!(benches);
