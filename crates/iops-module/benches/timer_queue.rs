//! Timer heap benchmarks using criterion.
//!
//! Run with: cargo bench -p iops-module --bench timer_queue

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use iops_module::TimerQueue;
use std::time::{Duration, Instant};

fn bench_push_pop(c: &mut Criterion) {
    let mut group = c.benchmark_group("timer_queue_push_pop");

    for n in [64usize, 1024, 16384] {
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            let base = Instant::now();
            b.iter(|| {
                let mut q = TimerQueue::with_capacity(n);
                for i in 0..n {
                    // Spread deadlines so the heap actually reorders
                    let offset = (i * 7919) % n;
                    q.push(i as u32, base + Duration::from_micros(offset as u64));
                }
                let end = base + Duration::from_micros(n as u64);
                let mut fired = 0usize;
                while let Some(entry) = q.pop_expired(end, |_, _| true) {
                    black_box(entry);
                    fired += 1;
                }
                black_box(fired)
            });
        });
    }

    group.finish();
}

fn bench_lazy_cancel(c: &mut Criterion) {
    let mut group = c.benchmark_group("timer_queue_lazy_cancel");

    group.bench_function("half_stale_1024", |b| {
        let base = Instant::now();
        b.iter(|| {
            let mut q = TimerQueue::with_capacity(1024);
            let mut armed = vec![0u64; 1024];
            for i in 0..1024u32 {
                armed[i as usize] = q.push(i, base + Duration::from_micros(u64::from(i)));
            }
            // Reschedule every other timer; the first entry goes stale
            for i in (0..1024u32).step_by(2) {
                armed[i as usize] = q.push(i, base + Duration::from_millis(10));
            }
            let end = base + Duration::from_millis(1);
            let mut fired = 0usize;
            while q.pop_expired(end, |k, s| armed[k as usize] == s).is_some() {
                fired += 1;
            }
            black_box(fired)
        });
    });

    group.finish();
}

criterion_group!(benches, bench_push_pop, bench_lazy_cancel);
criterion_main!(benches);
