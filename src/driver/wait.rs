//! Bounded waits.
//!
//! Every wait in the harness has a ceiling. When there is something
//! observable to wait for, the predicate is polled and the wait ends as soon
//! as it holds; the ceiling only bounds slow cases.

use std::thread;
use std::time::{Duration, Instant};

use super::types::{DriverResult, Settled};

/// Poll `predicate` every `interval` until it returns true or `ceiling` elapses.
///
/// The predicate is always evaluated at least once, so a zero ceiling is a
/// single probe.
pub fn poll_until<F>(ceiling: Duration, interval: Duration, mut predicate: F) -> DriverResult<Settled>
where
    F: FnMut() -> DriverResult<bool>,
{
    let start = Instant::now();
    let interval = interval.max(Duration::from_millis(1));
    loop {
        if predicate()? {
            return Ok(Settled::ConditionMet(start.elapsed()));
        }
        let elapsed = start.elapsed();
        if elapsed >= ceiling {
            return Ok(Settled::CeilingReached(elapsed));
        }
        thread::sleep(interval.min(ceiling - elapsed));
    }
}

/// Unconditional pause; the fallback when nothing observable exists
pub fn sleep_for(duration: Duration) -> Settled {
    if !duration.is_zero() {
        thread::sleep(duration);
    }
    Settled::Slept(duration)
}
