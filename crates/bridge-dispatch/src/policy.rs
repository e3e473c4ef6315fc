//! Pacing policy and hourly cap accounting.

use std::{collections::VecDeque, time::Duration};

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

const HOUR: Duration = Duration::from_secs(3600);

/// Pacing configuration for one bulk job, in seconds.
///
/// Field names follow the `delayConfig` object clients send.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatePolicy {
    /// Wait before the first send.
    #[serde(rename = "beforeStart", default)]
    pub initial_delay_secs: f64,
    /// Lower bound of the base gap between sends.
    #[serde(rename = "minInterval", default)]
    pub min_interval_secs: f64,
    /// Upper bound of the base gap between sends.
    #[serde(rename = "maxInterval", default)]
    pub max_interval_secs: f64,
    /// Upper bound of the extra jitter added to each gap.
    #[serde(rename = "randomExtra", default)]
    pub random_extra_secs: f64,
    /// Hourly send cap.
    #[serde(rename = "messagesPerHour")]
    pub messages_per_hour: u32,
}

impl RatePolicy {
    /// Check the policy invariants.
    ///
    /// # Errors
    /// Returns a description of the first violated invariant.
    pub fn validate(&self) -> Result<(), String> {
        let fields = [
            ("beforeStart", self.initial_delay_secs),
            ("minInterval", self.min_interval_secs),
            ("maxInterval", self.max_interval_secs),
            ("randomExtra", self.random_extra_secs),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("{name} must be a non-negative number of seconds"));
            }
        }
        if self.min_interval_secs > self.max_interval_secs {
            return Err("minInterval must not exceed maxInterval".to_string());
        }
        if self.messages_per_hour == 0 {
            return Err("messagesPerHour must be greater than zero".to_string());
        }
        Ok(())
    }

    /// Delay before the first send.
    #[must_use]
    pub fn initial_delay(&self) -> Duration {
        secs(self.initial_delay_secs)
    }
}

/// Convert non-negative seconds to a `Duration`, saturating on overflow.
#[must_use]
pub fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(Duration::MAX)
}

/// Send accounting for the hourly cap.
///
/// A job is saturated when either
/// - the total sent reaches `messages_per_hour × max(1, ceil(elapsed hours))`, or
/// - the sends within the trailing hour reach `messages_per_hour`.
///
/// The second rule keeps every rolling hour under the cap, which the
/// cumulative budget alone does not guarantee across hour boundaries.
#[derive(Debug)]
pub struct RateWindow {
    messages_per_hour: usize,
    started: Instant,
    total: usize,
    recent: VecDeque<Instant>,
}

impl RateWindow {
    /// Start accounting at `started`.
    #[must_use]
    pub fn new(messages_per_hour: u32, started: Instant) -> Self {
        let messages_per_hour = usize::try_from(messages_per_hour).unwrap_or(usize::MAX);
        Self {
            messages_per_hour,
            started,
            total: 0,
            recent: VecDeque::with_capacity(messages_per_hour.min(1024)),
        }
    }

    /// Cumulative budget at `now`.
    #[must_use]
    pub fn budget(&self, now: Instant) -> usize {
        let hours = now.saturating_duration_since(self.started).as_secs_f64() / HOUR.as_secs_f64();
        // ceil of a finite non-negative f64 fits comfortably in usize for any realistic job.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let windows = (hours.ceil() as usize).max(1);
        self.messages_per_hour.saturating_mul(windows)
    }

    /// Whether the next send must wait.
    pub fn is_saturated(&mut self, now: Instant) -> bool {
        while let Some(front) = self.recent.front() {
            if now.saturating_duration_since(*front) >= HOUR {
                self.recent.pop_front();
            } else {
                break;
            }
        }
        self.total >= self.budget(now) || self.recent.len() >= self.messages_per_hour
    }

    /// Record a successful send.
    pub fn record(&mut self, now: Instant) {
        self.total += 1;
        self.recent.push_back(now);
    }
}
