//! Scheduler dispatch throughput using criterion.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use forkpool::{JobScheduler, SchedulerConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn scheduler_for_bench() -> JobScheduler {
    JobScheduler::new(SchedulerConfig {
        num_threads: num_cpus::get(),
        max_jobs_per_worker: 16_384,
        pin_workers: false,
    })
    .expect("scheduler construction")
}

fn bench_independent_jobs(c: &mut Criterion) {
    let scheduler = scheduler_for_bench();

    let mut group = c.benchmark_group("independent_jobs");
    group.sample_size(10);

    for total_jobs in [1_000usize, 10_000] {
        group.throughput(Throughput::Elements(total_jobs as u64));
        group.bench_function(BenchmarkId::new("spawn_wait", total_jobs), |b| {
            b.iter(|| {
                let completed = Arc::new(AtomicUsize::new(0));
                let mut handles = Vec::with_capacity(total_jobs);
                for _ in 0..total_jobs {
                    let completed = Arc::clone(&completed);
                    let handle = scheduler
                        .spawn(move |_| {
                            completed.fetch_add(1, Ordering::Relaxed);
                        })
                        .expect("spawn");
                    handles.push(handle);
                }
                for handle in handles {
                    scheduler.wait(handle);
                }
                assert_eq!(completed.load(Ordering::Relaxed), total_jobs);
            });
        });
    }
    group.finish();
}

fn bench_fork_join_tree(c: &mut Criterion) {
    let scheduler = scheduler_for_bench();

    let mut group = c.benchmark_group("fork_join_tree");
    group.sample_size(10);

    // Fan-out 8, depth 3: 585 nodes per iteration.
    const FANOUT: usize = 8;
    const DEPTH: usize = 3;
    let nodes: usize = (0..=DEPTH).map(|d| FANOUT.pow(d as u32)).sum();
    group.throughput(Throughput::Elements(nodes as u64));

    group.bench_function("spawn_tree", |b| {
        b.iter(|| {
            let executed = Arc::new(AtomicUsize::new(0));
            let counted = Arc::clone(&executed);
            let root = scheduler
                .spawn(move |ctx| spawn_level(ctx, DEPTH, FANOUT, &counted))
                .expect("spawn root");
            scheduler.wait(root);
            assert_eq!(executed.load(Ordering::Relaxed), nodes);
        });
    });
    group.finish();
}

fn spawn_level(
    ctx: &forkpool::JobContext,
    depth: usize,
    fanout: usize,
    executed: &Arc<AtomicUsize>,
) {
    executed.fetch_add(1, Ordering::Relaxed);
    if depth == 0 {
        return;
    }
    let me = ctx.current_job().unwrap();
    for _ in 0..fanout {
        let executed = Arc::clone(executed);
        ctx.spawn_as_child(me, move |ctx| {
            spawn_level(ctx, depth - 1, fanout, &executed);
        })
        .expect("spawn child");
    }
}

criterion_group!(benches, bench_independent_jobs, bench_fork_join_tree);
criterion_main!(benches);
