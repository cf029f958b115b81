use forkpool::JobScheduler;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

fn main() {
    println!("forkpool - Fine-Grained Fork-Join Job Scheduler\n");

    let num_threads = 4;
    let scheduler = JobScheduler::with_threads(num_threads).expect("scheduler construction");
    println!("Initialized scheduler with {} worker threads\n", num_threads);

    // Example 1: a single job.
    println!("Example 1: Single job");
    let job = scheduler
        .spawn(|_| {
            println!("  Hello from a pooled job!");
        })
        .expect("spawn");
    scheduler.wait(job);
    println!("  Job completed\n");

    // Example 2: independent parallel jobs.
    println!("Example 2: Parallel computation");
    let sum = Arc::new(AtomicUsize::new(0));
    let num_jobs = 100;

    let start = Instant::now();
    let mut jobs = Vec::with_capacity(num_jobs);
    for i in 0..num_jobs {
        let sum = Arc::clone(&sum);
        let job = scheduler
            .spawn(move |_| {
                sum.fetch_add(i, Ordering::SeqCst);
            })
            .expect("spawn");
        jobs.push(job);
    }
    for job in jobs {
        scheduler.wait(job);
    }

    let duration = start.elapsed();
    let expected: usize = (0..num_jobs).sum();
    println!("  Executed {} jobs in {:?}", num_jobs, duration);
    println!(
        "  Sum result: {} (expected: {})\n",
        sum.load(Ordering::SeqCst),
        expected
    );

    // Example 3: a fork-join tree.
    println!("Example 3: Fork-join tree");
    let leaves = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&leaves);
    let root = scheduler
        .spawn(move |ctx| {
            let me = ctx.current_job().unwrap();
            for _ in 0..4 {
                let counted = Arc::clone(&counted);
                ctx.spawn_as_child(me, move |ctx| {
                    let me = ctx.current_job().unwrap();
                    for _ in 0..4 {
                        let counted = Arc::clone(&counted);
                        ctx.spawn_as_child(me, move |_| {
                            counted.fetch_add(1, Ordering::SeqCst);
                        })
                        .expect("spawn leaf");
                    }
                })
                .expect("spawn branch");
            }
        })
        .expect("spawn root");
    scheduler.wait(root);
    println!("  Leaves executed: {} (expected: 16)\n", leaves.load(Ordering::SeqCst));

    // Example 4: throughput.
    println!("Example 4: Throughput");
    let num_jobs = 10_000;
    let start = Instant::now();
    let mut jobs = Vec::with_capacity(num_jobs);
    for _ in 0..num_jobs {
        let job = scheduler
            .spawn(|_| {
                let mut x = 0usize;
                for i in 0..10 {
                    x = x.wrapping_add(i);
                }
                std::hint::black_box(x);
            })
            .expect("spawn");
        jobs.push(job);
    }
    for job in jobs {
        scheduler.wait(job);
    }

    let duration = start.elapsed();
    let jobs_per_second = num_jobs as f64 / duration.as_secs_f64();
    println!("  Executed {} jobs in {:?}", num_jobs, duration);
    println!("  Throughput: {:.2} jobs/second\n", jobs_per_second);

    println!("Shutting down scheduler...");
    match scheduler.shutdown() {
        Ok(_) => println!("Done!"),
        Err(e) => eprintln!("Shutdown error: {}", e),
    }
}
