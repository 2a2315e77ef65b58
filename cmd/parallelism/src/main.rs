//! Parallelism demo
//!
//! Submits CPU-heavy `sum_squares` jobs straight to the offload pool and
//! waits for all of them. With one worker per job the wall time tracks the
//! largest job, not the sum.
//!
//! # Environment Variables
//!
//! - `OFL_WORKER_COUNT` - Worker threads (default: CPU count)
//! - `OFL_SCALE=1` - Divide every job size by this factor
//! - `OFL_LOG_LEVEL=debug` - Set log level

use std::time::Instant;

use offload::{env_get, jobs, kerror, Runtime, RuntimeConfig};

fn main() {
    println!("=== Parallelism Example ===\n");

    let scale: u64 = env_get::<u64>("OFL_SCALE", 1).max(1);
    let numbers = [10u64.pow(7), 10u64.pow(8), 10u64.pow(6), 10u64.pow(8)].map(|n| n / scale);

    let config = RuntimeConfig::from_env();
    config.print();
    let runtime = match Runtime::new(config) {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };

    println!("\nLaunching {} parallel jobs...", numbers.len());
    let start = Instant::now();

    let mut handles = Vec::with_capacity(numbers.len());
    for (i, n) in numbers.iter().enumerate() {
        match runtime.pool().submit(jobs::sum_squares_job(*n)) {
            Ok(h) => {
                println!("Job {}: sum of squares below {} ({})", i, n, h.id());
                handles.push((i, h));
            }
            Err(e) => kerror!("job {} rejected: {}", i, e),
        }
    }

    for (i, handle) in handles {
        match handle.wait() {
            Ok(v) => println!("Job {}: done = {} at {:.2?}", i, v, start.elapsed()),
            Err(f) => println!("Job {}: {}", i, f),
        }
    }

    let stats = runtime.stats();
    println!("\nTotal time elapsed: {:.2?}", start.elapsed());
    println!(
        "Pool: {} workers, peak {} busy, {} completed",
        stats.workers, stats.peak_busy, stats.completed
    );

    if let Err(e) = runtime.shutdown() {
        kerror!("shutdown: {}", e);
    }
    println!("\n=== Example Complete ===");
}
