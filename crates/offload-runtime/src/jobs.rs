//! Built-in job kinds
//!
//! | kind          | args          | result                          |
//! |---------------|---------------|---------------------------------|
//! | `sum_squares` | `n: uint`     | sum of `i * i` for `i < n`      |
//! | `spin`        | `millis: uint`| iterations burned (CPU-bound)   |
//! | `sleep`       | `millis: uint`| unit, after a blocking sleep    |
//!
//! `sum_squares` results that do not fit a `u64` come back as decimal text.

use std::hint::black_box;
use std::thread;
use std::time::{Duration, Instant};

use offload_core::{Arity, JobPayload, JobRegistry, Value};

pub const SUM_SQUARES: &str = "sum_squares";
pub const SPIN: &str = "spin";
pub const SLEEP: &str = "sleep";

/// Sum of `i * i` for `0 <= i < n`, computed the slow way
pub fn sum_squares(n: u64) -> u128 {
    let mut acc: u128 = 0;
    for i in 0..n {
        let i = black_box(i) as u128;
        acc = acc.wrapping_add(i * i);
    }
    acc
}

/// Busy-loop for `duration`; returns the iteration count
///
/// `None` when `duration` reaches past the range of `Instant`.
pub fn spin(duration: Duration) -> Option<u64> {
    let deadline = Instant::now().checked_add(duration)?;
    let mut iterations = 0u64;
    while Instant::now() < deadline {
        for _ in 0..1_000 {
            iterations = black_box(iterations.wrapping_add(1));
        }
    }
    Some(iterations)
}

fn uint_arg(args: &[Value], name: &str) -> Result<u64, String> {
    args.first()
        .and_then(Value::as_uint)
        .ok_or_else(|| format!("{} must be a non-negative integer", name))
}

/// Add the built-in kinds to `registry`
pub fn register_builtins(registry: &mut JobRegistry) -> &mut JobRegistry {
    registry
        .register(SUM_SQUARES, Arity::Exact(1), |args| {
            let total = sum_squares(uint_arg(args, "n")?);
            Ok(match u64::try_from(total) {
                Ok(v) => Value::UInt(v),
                Err(_) => Value::Text(total.to_string()),
            })
        })
        .register(SPIN, Arity::Exact(1), |args| {
            let millis = uint_arg(args, "millis")?;
            spin(Duration::from_millis(millis))
                .map(Value::UInt)
                .ok_or_else(|| format!("spin of {}ms is out of range", millis))
        })
        .register(SLEEP, Arity::Exact(1), |args| {
            let millis = uint_arg(args, "millis")?;
            thread::sleep(Duration::from_millis(millis));
            Ok(Value::Unit)
        })
}

/// A registry holding only the built-in kinds
pub fn builtin_registry() -> JobRegistry {
    let mut registry = JobRegistry::new();
    register_builtins(&mut registry);
    registry
}

pub fn sum_squares_job(n: u64) -> JobPayload {
    JobPayload::unary(SUM_SQUARES, n)
}

pub fn spin_job(millis: u64) -> JobPayload {
    JobPayload::unary(SPIN, millis)
}

pub fn sleep_job(millis: u64) -> JobPayload {
    JobPayload::unary(SLEEP, millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sum_squares() {
        assert_eq!(sum_squares(0), 0);
        assert_eq!(sum_squares(4), 14);
        // n(n-1)(2n-1)/6
        let n: u128 = 100_000;
        assert_eq!(sum_squares(100_000), n * (n - 1) * (2 * n - 1) / 6);
    }

    #[test]
    fn test_builtins_registered() {
        let registry = builtin_registry();
        assert_eq!(registry.kinds(), vec![SLEEP, SPIN, SUM_SQUARES]);

        let f = registry.validate(&sum_squares_job(4)).unwrap();
        assert_eq!(f(&[Value::UInt(4)]), Ok(Value::UInt(14)));
        assert!(f(&[Value::Int(-1)]).is_err());
    }

    #[test]
    fn test_spin_runs_for_duration() {
        let start = Instant::now();
        let n = spin(Duration::from_millis(20)).unwrap();
        assert!(n > 0);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_spin_out_of_range_returns_none() {
        assert_eq!(spin(Duration::MAX), None);
    }
}
