use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use hazmpmc::pool::ThreadPool;
use hazmpmc::queue::MpmcQueue;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn custom_criterion() -> Criterion {
    Criterion::default()
        .sample_size(10)
        .measurement_time(Duration::from_secs(1))
        .warm_up_time(Duration::from_secs(1))
}

fn lightweight_bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("MpmcQueue Operations");

    group.measurement_time(Duration::from_secs(1));
    group.warm_up_time(Duration::from_secs(1));
    group.sample_size(10);

    // Single-threaded push
    group.bench_function("push", |b| {
        b.iter_batched(
            || MpmcQueue::<i32>::new(4),
            |queue| {
                queue.push(42);
            },
            BatchSize::SmallInput,
        );
    });

    // Single-threaded pop
    group.bench_function("pop", |b| {
        b.iter_batched(
            || {
                let queue = MpmcQueue::new(4);
                queue.push(42);
                queue
            },
            |queue| {
                let _ = queue.pop();
            },
            BatchSize::SmallInput,
        );
    });

    // Very limited concurrent operations
    group.bench_function("concurrent_ops_2_threads", |b| {
        b.iter_batched(
            || Arc::new(MpmcQueue::<i32>::new(4)),
            |queue| {
                let queue2 = Arc::clone(&queue);

                let handle1 = thread::spawn(move || {
                    queue.push(1);
                    queue.push(2);
                });

                let handle2 = thread::spawn(move || {
                    let _ = queue2.pop();
                    let _ = queue2.pop();
                });

                handle1.join().expect("producer thread panicked");
                handle2.join().expect("consumer thread panicked");
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();

    let mut pool_group = c.benchmark_group("ThreadPool Operations");
    pool_group.measurement_time(Duration::from_secs(1));
    pool_group.warm_up_time(Duration::from_secs(1));
    pool_group.sample_size(10);

    pool_group.bench_function("execute_100_noop_tasks", |b| {
        b.iter_batched(
            || ThreadPool::new(4, 16),
            |pool| {
                for _ in 0..100 {
                    pool.execute(|| {});
                }
                pool.wait_idle();
            },
            BatchSize::SmallInput,
        );
    });

    pool_group.finish();
}

criterion_group! {
    name = benches;
    config = custom_criterion();
    targets = lightweight_bench
}
criterion_main!(benches);
