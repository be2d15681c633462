use std::sync::Arc;

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use granary::{BucketRegistry, ManualClock, TokenBucket};

fn bench_consume(c: &mut Criterion) {
    let mut group = c.benchmark_group("tokenbucket");
    group
        .throughput(Throughput::Elements(1))
        .sample_size(100)
        .bench_function("consume-manual-clock", |b| {
            let clock = Arc::new(ManualClock::default());
            let tb = TokenBucket::with_clock(0.0, 1e9, 10_000.0, Arc::clone(&clock));
            clock.set(10.0);
            b.iter(|| {
                let _x = std::hint::black_box(tb.consume_one());
            });
        })
        .bench_function("consume-std-clock", |b| {
            let tb = TokenBucket::new(0.0, 1e9, 10_000.0);
            b.iter(|| {
                let _x = std::hint::black_box(tb.consume_one());
            });
        })
        .bench_function("registry-consume", |b| {
            let registry = BucketRegistry::new();
            registry.create_bucket_in(1, 1, 0.0, 1e9, 10_000.0, None);
            b.iter(|| {
                let _x = std::hint::black_box(registry.consume_in(1, 1, 1.0));
            });
        });
    group.finish();
}

const THREADS: u32 = 8;

fn multi_threaded(c: &mut Criterion) {
    let mut group = c.benchmark_group("multi_threaded");
    group
        .throughput(Throughput::Elements(1))
        .bench_function("shared-bucket", |b| {
            let tb = Arc::new(TokenBucket::new(0.0, 1e9, 10_000.0));
            b.iter_custom(|iters| {
                let mut children = vec![];
                let start = std::time::Instant::now();
                for _i in 0..THREADS {
                    let tb = Arc::clone(&tb);
                    children.push(std::thread::spawn(move || {
                        for _i in 0..iters {
                            let _x = std::hint::black_box(tb.consume_one());
                        }
                    }));
                }
                for child in children {
                    child.join().unwrap()
                }
                start.elapsed()
            })
        })
        .bench_function("shared-registry", |b| {
            let registry = Arc::new(BucketRegistry::new());
            registry.create_bucket_in(1, 1, 0.0, 1e9, 10_000.0, None);
            b.iter_custom(|iters| {
                let mut children = vec![];
                let start = std::time::Instant::now();
                for _i in 0..THREADS {
                    let registry = Arc::clone(&registry);
                    children.push(std::thread::spawn(move || {
                        for _i in 0..iters {
                            let _x = std::hint::black_box(registry.consume_in(1, 1, 1.0));
                        }
                    }));
                }
                for child in children {
                    child.join().unwrap()
                }
                start.elapsed()
            })
        });
    group.finish();
}

criterion_group!(benches, bench_consume, multi_threaded);
criterion_main!(benches);
