use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use staged_softmax::{CpuBackend, Launcher, Softmax, SoftmaxConfig, Variant};

fn input(len: usize) -> Vec<f32> {
    (0..len).map(|i| ((i * 2654435761) % 1000) as f32 / 100.0 - 5.0).collect()
}

fn bench_backends(c: &mut Criterion) {
    let mut group = c.benchmark_group("softmax_rows");
    for (name, config) in [
        ("64x64", SoftmaxConfig::matrix_64()),
        ("96x96", SoftmaxConfig::matrix_96()),
        ("vec16k", SoftmaxConfig::vector_blocks(16384, 2048, 8).expect("16k splits into 2k blocks")),
    ] {
        let plan = config.plan().expect("preset plans");
        let src = input(plan.total_len());
        let mut dst = vec![0.0f32; src.len()];
        let launcher = Launcher::new(plan).expect("launcher");

        group.bench_with_input(BenchmarkId::new("cpu", name), &src, |b, src| {
            let mut cpu = CpuBackend::new();
            b.iter(|| cpu.softmax_rows(plan.total_rows(), plan.row_width(), black_box(src), &mut dst))
        });
        group.bench_with_input(BenchmarkId::new("tiled", name), &src, |b, src| {
            b.iter(|| launcher.run(black_box(src), &mut dst))
        });
        group.bench_with_input(BenchmarkId::new("vector", name), &src, |b, src| {
            b.iter(|| launcher.run_variant(Variant::Unstabilized, black_box(src), &mut dst))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_backends);
criterion_main!(benches);
