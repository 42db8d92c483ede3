//! Benchmarks for the trampoline and channel handoff.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::Duration;
use weft::prelude::*;

fn spawn_chain(rt: &Runtime, depth: u32) -> Job<u32> {
    rt.spawn("chain", move |cx| async move {
        let mut total = 0;
        for i in 0..depth {
            total += cx.spawn(format!("link{i}"), move |_| async move { Ok(i) }).join().await?;
        }
        Ok(total)
    })
}

fn trampoline_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("trampoline");
    for depth in [10u32, 100, 1_000] {
        group.bench_with_input(BenchmarkId::new("spawn_join", depth), &depth, |b, &depth| {
            b.iter(|| {
                let rt = Runtime::lab();
                let job = spawn_chain(&rt, depth);
                black_box(rt.block_on(&job).ok())
            });
        });
    }
    group.finish();
}

fn channel_benchmark(c: &mut Criterion) {
    c.bench_function("channel_ping_pong", |b| {
        b.iter(|| {
            let rt = Runtime::lab();
            let ping = rt.channel::<u32>(0);
            let pong = rt.channel::<u32>(0);

            let (rx, tx) = (ping.clone(), pong.clone());
            rt.spawn("echo", move |_| async move {
                while let Ok(n) = rx.rec().await {
                    tx.put(n + 1).await?;
                }
                Ok(())
            });
            let driver = rt.spawn("driver", move |_| async move {
                let mut n = 0;
                for _ in 0..1_000 {
                    ping.put(n).await?;
                    n = pong.rec().await?;
                }
                ping.close();
                Ok(n)
            });

            black_box(rt.block_on(&driver).ok())
        });
    });
}

fn timer_benchmark(c: &mut Criterion) {
    c.bench_function("virtual_sleepers", |b| {
        b.iter(|| {
            let rt = Runtime::lab();
            for i in 0..1_000u64 {
                rt.spawn(format!("sleeper{i}"), move |cx| async move {
                    cx.sleep(Duration::from_millis(i % 50)).await;
                    Ok(())
                });
            }
            black_box(rt.run().ok())
        });
    });
}

criterion_group!(benches, trampoline_benchmark, channel_benchmark, timer_benchmark);
criterion_main!(benches);
