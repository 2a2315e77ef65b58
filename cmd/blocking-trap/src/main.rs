//! Blocking trap demo
//!
//! A packet receiver expects to wake every 100ms. Next to it, an analysis
//! session burns 500ms of CPU inside its own step instead of offloading.
//! The scheduler thread is stuck for that long, so the receiver's worst gap
//! jumps well past 100ms. Compare with `offload-mixed`.
//!
//! # Environment Variables
//!
//! - `OFL_PACKETS=10` - Packets to receive
//! - `OFL_INTERVAL_MS=100` - Expected packet interval
//! - `OFL_ANALYSIS_MS=500` - CPU time burned inline

use std::time::{Duration, Instant};

use offload::{env_get, jobs, Runtime, RuntimeConfig, Session, Step, StepContext, Value, Wake};

struct PacketReceiver {
    packets: u32,
    received: u32,
    interval: Duration,
    last: Option<Instant>,
    worst_gap: Duration,
}

impl Session for PacketReceiver {
    fn step(&mut self, cx: &mut StepContext<'_>, _wake: Wake) -> Step {
        let now = cx.now();
        if let Some(last) = self.last {
            self.worst_gap = self.worst_gap.max(now - last);
        }
        self.last = Some(now);

        if self.received == self.packets {
            return Step::Complete(Value::UInt(self.worst_gap.as_millis() as u64));
        }
        println!("Received audio packet {}", self.received);
        self.received += 1;
        Step::Sleep(self.interval)
    }
}

fn main() {
    println!("=== Blocking Trap Example ===\n");

    let packets: u32 = env_get("OFL_PACKETS", 10);
    let interval = Duration::from_millis(env_get("OFL_INTERVAL_MS", 100));
    let analysis = Duration::from_millis(env_get("OFL_ANALYSIS_MS", 500));

    let runtime = match Runtime::new(RuntimeConfig::from_env().worker_count(1)) {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };

    let (receiver, report) = runtime.block_on(|sched| {
        let receiver = sched.register(PacketReceiver {
            packets,
            received: 0,
            interval,
            last: None,
            worst_gap: Duration::ZERO,
        });
        // Deliberately wrong: heavy work inside a step
        sched.register(move |_cx: &mut StepContext<'_>, wake: Wake| match wake {
            Wake::Start => Step::Sleep(interval * 2),
            _ => {
                println!("Starting heavy analysis inline...");
                jobs::spin(analysis);
                println!("Analysis complete!");
                Step::Complete(Value::Unit)
            }
        });
        (receiver, sched.run())
    });

    if let Some(gap) = report.exit_of(receiver).and_then(|e| e.value()) {
        println!("\nWorst gap between packets: {}ms (expected ~{}ms)", gap, interval.as_millis());
    }
    println!("Total time elapsed: {:.2?}", report.elapsed);
    println!("\n=== Example Complete ===");
}
