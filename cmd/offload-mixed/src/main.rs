//! Offload demo
//!
//! The same packet receiver as `blocking-trap`, but the analysis session
//! submits its CPU work to the offload pool and keeps doing light work on
//! the scheduler thread while the job runs. The receiver's worst gap stays
//! near the packet interval.
//!
//! # Environment Variables
//!
//! - `OFL_PACKETS=10` - Packets to receive
//! - `OFL_INTERVAL_MS=100` - Expected packet interval
//! - `OFL_ANALYSIS_MS=500` - CPU time burned on a worker

use std::time::{Duration, Instant};

use offload::{
    env_get, jobs, kwarn, Runtime, RuntimeConfig, Session, SessionError, Step, StepContext,
    Value, Wake,
};

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

/// Submits the analysis, does light work, then collects the result
struct Analysis {
    millis: u64,
    checks: u32,
}

impl Session for Analysis {
    fn step(&mut self, cx: &mut StepContext<'_>, wake: Wake) -> Step {
        match wake {
            Wake::Start => match cx.submit_job(jobs::spin_job(self.millis)) {
                Ok(ticket) => {
                    println!("System started; analysis running as {}", ticket.job());
                    Step::Sleep(Duration::from_millis(150))
                }
                Err(e) => Step::Fail(SessionError::logic(e.to_string())),
            },
            Wake::Timer if self.checks < 2 => {
                self.checks += 1;
                println!("Analysis still pending ({:?}), doing other work", cx.pending_job());
                Step::Sleep(Duration::from_millis(150))
            }
            Wake::Timer => Step::AwaitJob,
            Wake::Job(Ok(v)) => {
                println!("Final analysis result: {} iterations", v);
                Step::Complete(v)
            }
            Wake::Job(Err(f)) => {
                kwarn!("analysis failed: {}", f);
                Step::Fail(SessionError::logic(f.to_string()))
            }
            _ => Step::Yield,
        }
    }
}

fn main() {
    println!("=== Offload Example ===\n");

    let packets: u32 = env_get("OFL_PACKETS", 10);
    let interval = Duration::from_millis(env_get("OFL_INTERVAL_MS", 100));
    let analysis: u64 = env_get("OFL_ANALYSIS_MS", 500);

    let runtime = match Runtime::new(RuntimeConfig::from_env()) {
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
        sched.register(Analysis {
            millis: analysis,
            checks: 0,
        });
        (receiver, sched.run())
    });

    if let Some(gap) = report.exit_of(receiver).and_then(|e| e.value()) {
        println!("\nWorst gap between packets: {}ms (expected ~{}ms)", gap, interval.as_millis());
    }
    for (id, exit) in &report.exits {
        println!("  {}: {}", id, exit);
    }
    println!("Total time elapsed: {:.2?}", report.elapsed);
    println!("\n=== Example Complete ===");
}
