//! Concurrency demo
//!
//! Three sessions wait 3, 1 and 2 time units on one scheduler thread.
//! They finish in order B, C, A after about 3 units, not 6.
//!
//! # Environment Variables
//!
//! - `OFL_UNIT_MS=1000` - Length of one time unit in milliseconds
//! - `OFL_LOG_LEVEL=debug` - Set log level (off, error, warn, info, debug, trace)

use std::time::Duration;

use offload::{env_get, kinfo, Runtime, RuntimeConfig, Step, StepContext, Value, Wake};

// OFL_UNIT_MS=200 cargo run -p offload-concurrency
fn main() {
    println!("=== Concurrency Example ===\n");

    let unit: u64 = env_get("OFL_UNIT_MS", 1000);
    let runtime = match Runtime::new(RuntimeConfig::from_env().worker_count(1)) {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };

    let report = runtime.block_on(|sched| {
        for (name, units) in [("A", 3u64), ("B", 1), ("C", 2)] {
            let delay = Duration::from_millis(units * unit);
            let id = sched.register(move |cx: &mut StepContext<'_>, wake: Wake| match wake {
                Wake::Start => {
                    println!("Task {} ({}): starting, will wait {:?}", name, cx.id(), delay);
                    Step::Sleep(delay)
                }
                _ => {
                    println!("Task {}: finished after {:?}", name, delay);
                    Step::Complete(Value::from(name))
                }
            });
            kinfo!("registered task {} as {}", name, id);
        }
        sched.run()
    });

    let order: Vec<String> = report
        .exits
        .iter()
        .filter_map(|(_, exit)| exit.value().map(|v| v.to_string()))
        .collect();
    println!("\nCompletion order: {}", order.join(", "));
    println!("Total time elapsed: {:.2?} ({} steps)", report.elapsed, report.steps);
    println!("\n=== Example Complete ===");
}
