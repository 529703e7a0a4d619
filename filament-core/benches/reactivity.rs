//! Benchmarks for tracking and trigger dispatch.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use filament_core::reactive::{FlushQueue, EffectOptions, ReactiveScope};
use filament_core::value::Raw;

fn bench_tracked_reads(c: &mut Criterion) {
    let scope = ReactiveScope::new();
    let obj = scope.reactive(Raw::record_from([("n", 0i64)]));

    c.bench_function("untracked_read", |b| {
        b.iter(|| black_box(obj.get("n").unwrap()));
    });

    let obj_in = obj.clone();
    let _effect = scope.effect(move || {
        let _ = obj_in.get("n").unwrap();
    });
    c.bench_function("write_with_one_subscriber", |b| {
        let mut i = 0i64;
        b.iter(|| {
            i += 1;
            obj.set("n", i).unwrap();
        });
    });
}

fn bench_fan_out(c: &mut Criterion) {
    let scope = ReactiveScope::new();
    let obj = scope.reactive(Raw::record_from([("n", 0i64)]));

    let mut effects = Vec::new();
    for _ in 0..100 {
        let obj_in = obj.clone();
        effects.push(scope.effect(move || {
            let _ = obj_in.get("n").unwrap();
        }));
    }

    c.bench_function("write_with_100_subscribers", |b| {
        let mut i = 0i64;
        b.iter(|| {
            i += 1;
            obj.set("n", i).unwrap();
        });
    });
}

fn bench_flush_queue(c: &mut Criterion) {
    let scope = ReactiveScope::new();
    let queue = FlushQueue::new();
    let obj = scope.reactive(Raw::record_from([("n", 0i64)]));

    let obj_in = obj.clone();
    let _effect = scope.effect_with(
        move || {
            let _ = obj_in.get("n").unwrap();
        },
        EffectOptions::with_scheduler(queue.scheduler()),
    );

    c.bench_function("burst_of_writes_then_flush", |b| {
        let mut i = 0i64;
        b.iter(|| {
            for _ in 0..10 {
                i += 1;
                obj.set("n", i).unwrap();
            }
            queue.flush();
        });
    });
}

criterion_group!(benches, bench_tracked_reads, bench_fan_out, bench_flush_queue);
criterion_main!(benches);
