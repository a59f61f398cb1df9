//! Engine settings.
//!
//! All tunables are carried in one explicit value handed to the engine
//! at construction — there is no process-global settings object.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use caravan_resilience::RetryPolicy;

/// An inclusive delay range sampled uniformly at use sites.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DelayRange {
    /// Lower bound in seconds.
    pub min_secs: f64,
    /// Upper bound in seconds.
    pub max_secs: f64,
}

impl DelayRange {
    /// A zero-length range (no delay).
    #[must_use]
    pub const fn zero() -> Self {
        Self {
            min_secs: 0.0,
            max_secs: 0.0,
        }
    }

    /// A fixed range.
    #[must_use]
    pub const fn new(min_secs: f64, max_secs: f64) -> Self {
        Self { min_secs, max_secs }
    }

    /// Sample a duration from the range.
    #[must_use]
    pub fn sample(&self) -> Duration {
        let min = self.min_secs.max(0.0);
        let max = self.max_secs.max(min);
        let secs = min + (max - min) * fastrand::f64();
        Duration::from_secs_f64(secs)
    }
}

/// All engine tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Accounts processed concurrently per flow.
    pub accounts_per_flow: usize,
    /// Shuffle the account list before partitioning into flows.
    pub shuffle_accounts: bool,
    /// Derive the terminal route status from the full action list rather
    /// than only the actions visited this run: a leftover failed action
    /// then forces the route `Failed` even after a clean rerun.
    pub strict_route_status: bool,
    /// Stagger between account starts within a flow.
    pub account_delay: DelayRange,
    /// Pause between consecutive actions of one account.
    pub action_delay: DelayRange,
    /// Cooldown between flows.
    pub flow_delay: DelayRange,
    /// Retry policy applied around every action invocation.
    pub retry: RetryPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            accounts_per_flow: 5,
            shuffle_accounts: false,
            strict_route_status: false,
            account_delay: DelayRange::new(5.0, 15.0),
            action_delay: DelayRange::new(30.0, 120.0),
            flow_delay: DelayRange::new(60.0, 300.0),
            retry: RetryPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_within_bounds() {
        let range = DelayRange::new(1.0, 2.0);
        for _ in 0..100 {
            let d = range.sample();
            assert!(d >= Duration::from_secs(1));
            assert!(d <= Duration::from_secs(2));
        }
    }

    #[test]
    fn zero_range_samples_zero() {
        assert_eq!(DelayRange::zero().sample(), Duration::ZERO);
    }

    #[test]
    fn degenerate_range_clamps() {
        // max below min falls back to min.
        let range = DelayRange::new(3.0, 1.0);
        assert_eq!(range.sample(), Duration::from_secs(3));

        // negative bounds clamp to zero.
        let range = DelayRange::new(-5.0, -1.0);
        assert_eq!(range.sample(), Duration::ZERO);
    }

    #[test]
    fn default_settings_are_sane() {
        let settings = EngineSettings::default();
        assert!(settings.accounts_per_flow > 0);
        assert!(!settings.shuffle_accounts);
        assert!(settings.retry.max_attempts >= 1);
    }
}
