//! Bounded-retry condition polling
//!
//! Device installs, uninstalls and reboots complete asynchronously, so every
//! expected state is polled for. Only a predicate returning `Ok(false)` is
//! retried; a predicate error (a broken query channel) ends the wait at once.

use crate::error::HarnessError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tzrules_device::Sleeper;

/// Retry budget for a single wait
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSettings {
    /// Maximum predicate evaluations
    pub max_attempts: u32,
    /// Delay between evaluations
    pub interval: Duration,
}

impl PollSettings {
    /// Create poll settings
    #[inline]
    #[must_use]
    pub const fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }
}

impl Default for PollSettings {
    /// Default: 30 attempts, one second apart.
    fn default() -> Self {
        Self::new(30, Duration::from_millis(1000))
    }
}

/// Polls predicates with fixed backoff
#[derive(Clone)]
pub struct Poller {
    settings: PollSettings,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Poller {
    /// Create a poller sleeping through `sleeper`
    #[must_use]
    pub fn new(settings: PollSettings, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { settings, sleeper }
    }

    /// Get poll settings
    #[inline]
    #[must_use]
    pub fn settings(&self) -> PollSettings {
        self.settings
    }

    /// Evaluate `predicate` until it holds or the budget is exhausted
    ///
    /// Sleeps `interval` between evaluations but never after the last one,
    /// so exhausting the budget takes `(max_attempts - 1) * interval`.
    ///
    /// # Errors
    /// - `HarnessError::ConditionTimeout` naming `condition` when every attempt
    ///   evaluated to `false`
    /// - Any error returned by the predicate, immediately
    pub fn wait_for<F>(&self, condition: &str, mut predicate: F) -> Result<(), HarnessError>
    where
        F: FnMut() -> Result<bool, HarnessError>,
    {
        let max_attempts = self.settings.max_attempts;
        for attempt in 1..=max_attempts {
            if predicate()? {
                tracing::debug!(condition, attempt, "condition met");
                return Ok(());
            }
            if attempt < max_attempts {
                self.sleeper.sleep(self.settings.interval);
            }
        }

        tracing::warn!(condition, attempts = max_attempts, "condition not met");
        Err(HarnessError::ConditionTimeout {
            condition: condition.to_string(),
            attempts: max_attempts,
        })
    }

    /// Block for a fixed delay
    pub fn pause(&self, duration: Duration) {
        tracing::debug!(?duration, "pausing");
        self.sleeper.sleep(duration);
    }
}
