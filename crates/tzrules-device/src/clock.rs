//! Blocking waits
//!
//! Every delay in the harness (poll backoff, settle delays, boot polling) is a
//! literal blocking sleep. Routing them through `Sleeper` lets tests observe
//! the requested delays without waiting for them.

use std::time::Duration;

/// Something that can block the current thread for a duration
pub trait Sleeper: Send + Sync {
    /// Block for `duration`
    fn sleep(&self, duration: Duration);
}

/// Production sleeper backed by `std::thread::sleep`
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
