use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use live_scope::display::RollingBuffer;

fn bench_absorb(c: &mut Criterion) {
    let mut group = c.benchmark_group("absorb");
    let block: Vec<f32> = (0..512).map(|i| (i as f32 * 0.01).sin()).collect();

    for len in [4_410usize, 44_100, 441_000] {
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, &len| {
            let mut buffer = RollingBuffer::new(len);
            b.iter(|| buffer.absorb(black_box(&block)));
        });
    }
    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let mut buffer = RollingBuffer::new(44_100);
    buffer.absorb(&vec![0.5; 1_000]);
    let mut out = Vec::new();
    c.bench_function("snapshot_into_44100", |b| {
        b.iter(|| {
            buffer.snapshot_into(&mut out);
            black_box(out.len())
        })
    });
}

criterion_group!(benches, bench_absorb, bench_snapshot);
criterion_main!(benches);
