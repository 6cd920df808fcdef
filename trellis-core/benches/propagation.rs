use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use trellis_core::reactive::{batch, create_root, Effect, Memo, Signal};

/// A signal feeding `depth` memos in a line, read by one effect.
fn deep_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("deep_chain");
    for depth in [10usize, 100, 1_000] {
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, &depth| {
            create_root(|root| {
                let head = Signal::new(0u64);
                let h = head.clone();
                let mut tail = Memo::new(move |_| h.get());
                for _ in 0..depth {
                    let prev = tail.clone();
                    tail = Memo::new(move |_| prev.get() + 1);
                }
                let t = tail.clone();
                Effect::new(move || {
                    black_box(t.get());
                });

                let mut n = 0;
                b.iter(|| {
                    n += 1;
                    head.set(n);
                });
                root.dispose();
            });
        });
    }
    group.finish();
}

/// One signal observed directly by `width` effects.
fn wide_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("wide_fan_out");
    for width in [10usize, 100, 1_000] {
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, &width| {
            create_root(|root| {
                let source = Signal::new(0u64);
                for _ in 0..width {
                    let s = source.clone();
                    Effect::new(move || {
                        black_box(s.get());
                    });
                }

                let mut n = 0;
                b.iter(|| {
                    n += 1;
                    source.set(n);
                });
                root.dispose();
            });
        });
    }
    group.finish();
}

/// Many writes in one batch against a shared effect.
fn batched_writes(c: &mut Criterion) {
    c.bench_function("batched_writes_100", |b| {
        create_root(|root| {
            let signals: Vec<Signal<u64>> = (0..100).map(Signal::new).collect();
            let reads = signals.clone();
            Effect::new(move || {
                black_box(reads.iter().map(|s| s.get()).sum::<u64>());
            });

            let mut n = 0;
            b.iter(|| {
                n += 1;
                batch(|| {
                    for signal in &signals {
                        signal.set(n);
                    }
                });
            });
            root.dispose();
        });
    });
}

criterion_group!(benches, deep_chain, wide_fan_out, batched_writes);
criterion_main!(benches);
