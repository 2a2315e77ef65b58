//! Chat room demo
//!
//! Tens of thousands of user sessions share one scheduler thread. A feeder
//! thread plays the network: it delivers chat lines to users through a
//! `SchedulerHandle`. Ordinary lines are echoed back at once; a line asking
//! to "calculate" is offloaded to the pool, so the other users keep getting
//! their echoes while the math runs.
//!
//! # Environment Variables
//!
//! - `OFL_USERS=50000` - Number of user sessions
//! - `OFL_ROUNDS=3` - Chat lines delivered to every user
//! - `OFL_CALC_EVERY=5000` - Every Nth user asks for a calculation
//! - `OFL_CALC_N=10000000` - Size of each calculation (`sum_squares`)
//! - `OFL_WORKER_COUNT` - Pool workers (default: CPU count)

use std::cell::Cell;
use std::rc::Rc;
use std::thread;
use std::time::Instant;

use offload::{
    env_get, jobs, kinfo, kwarn, MessageSink, Runtime, RuntimeConfig, SchedulerHandle, Session,
    SessionExit, SessionId, Step, StepContext, Value, Wake,
};

const QUIT: &str = "/quit";

/// One connected user
struct User {
    calc_n: u64,
    handled: u64,
}

impl Session for User {
    fn step(&mut self, cx: &mut StepContext<'_>, wake: Wake) -> Step {
        match wake {
            Wake::Message(Value::Text(line)) => {
                if line == QUIT {
                    return Step::Complete(Value::UInt(self.handled));
                }
                self.handled += 1;
                if !line.contains("calculate") {
                    cx.send(format!("Echo: {}", line));
                    return Step::Recv;
                }
                // Never run it here; the pool takes it
                match cx.submit_job(jobs::sum_squares_job(self.calc_n)) {
                    Ok(_) => Step::AwaitJob,
                    Err(e) => {
                        cx.send(format!("error: {}", e));
                        Step::Recv
                    }
                }
            }
            Wake::Job(Ok(result)) => {
                cx.send(result);
                Step::Recv
            }
            Wake::Job(Err(failure)) => {
                cx.send(format!("error: {}", failure));
                Step::Recv
            }
            _ => Step::Recv,
        }
    }
}

/// Counts what the room sends back
struct Tally {
    echoes: Rc<Cell<u64>>,
    results: Rc<Cell<u64>>,
}

impl MessageSink for Tally {
    fn deliver(&mut self, from: SessionId, message: Value) {
        match message {
            Value::Text(ref s) if s.starts_with("Echo: ") => self.echoes.set(self.echoes.get() + 1),
            Value::Text(ref s) if s.starts_with("error: ") => kwarn!("{} <- {}", from, s),
            other => {
                kinfo!("{} <- calculation result {}", from, other);
                self.results.set(self.results.get() + 1);
            }
        }
    }
}

fn feed(handle: SchedulerHandle, users: Vec<SessionId>, rounds: u32, calc_every: usize) {
    for round in 0..rounds {
        for (i, user) in users.iter().enumerate() {
            let line = if round == 0 && calc_every > 0 && i % calc_every == 0 {
                "please calculate".to_string()
            } else {
                format!("hello #{} from {}", round, user)
            };
            handle.deliver(*user, line);
        }
    }
    for user in &users {
        handle.deliver(*user, QUIT);
    }
}

fn main() {
    println!("=== Chat Room Example ===\n");

    let user_count: usize = env_get("OFL_USERS", 50_000);
    let rounds: u32 = env_get("OFL_ROUNDS", 3);
    let calc_every: usize = env_get("OFL_CALC_EVERY", 5_000);
    let calc_n: u64 = env_get("OFL_CALC_N", 10_000_000);

    let runtime = match Runtime::new(RuntimeConfig::from_env()) {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };
    let mut sched = runtime.scheduler();

    let echoes = Rc::new(Cell::new(0));
    let results = Rc::new(Cell::new(0));
    sched.set_message_sink(Box::new(Tally {
        echoes: Rc::clone(&echoes),
        results: Rc::clone(&results),
    }));

    let start = Instant::now();
    let users: Vec<SessionId> = (0..user_count)
        .map(|_| sched.register(User { calc_n, handled: 0 }))
        .collect();
    println!("Registered {} users in {:.2?}", users.len(), start.elapsed());

    let handle = sched.handle();
    let feeder = thread::Builder::new()
        .name("feeder".to_string())
        .spawn(move || feed(handle, users, rounds, calc_every));
    let feeder = match feeder {
        Ok(f) => f,
        Err(e) => {
            eprintln!("failed to spawn feeder: {}", e);
            std::process::exit(1);
        }
    };

    let report = sched.run();
    if feeder.join().is_err() {
        kwarn!("feeder thread panicked");
    }

    let handled: u64 = report
        .exits
        .iter()
        .filter_map(|(_, exit)| match exit {
            SessionExit::Completed(v) => v.as_uint(),
            _ => None,
        })
        .sum();
    let stats = runtime.stats();

    println!("\nUsers finished:      {}", report.exits.len());
    println!("Lines handled:       {}", handled);
    println!("Echoes sent:         {}", echoes.get());
    println!("Calculations:        {}", results.get());
    println!("Failed sessions:     {}", report.count_failed());
    println!("Scheduler steps:     {}", report.steps);
    println!(
        "Pool:                {} workers, peak {} busy, {} jobs completed",
        stats.workers, stats.peak_busy, stats.completed
    );
    println!("Total time elapsed:  {:.2?}", report.elapsed);
    println!("\n=== Example Complete ===");
}
