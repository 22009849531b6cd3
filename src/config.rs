use std::time::Duration;

use crate::error::{MutexError, Result};

/// Longest accepted interval or hold: one year.
pub const MAX_INTERVAL_MS: u64 = 365 * 24 * 60 * 60 * 1_000;

/// Simulated clock skew and the cadence of Berkeley synchronization rounds.
#[derive(Debug, Clone)]
pub struct ClockConfig {
    /// Each node starts with a random offset in `-max..=max` milliseconds.
    pub max_initial_skew_ms: i64,
    /// Interval between synchronization rounds.
    pub sync_interval_ms: u64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            max_initial_skew_ms: 2_000,
            sync_interval_ms: 30_000,
        }
    }
}

/// Timing and membership parameters for a cluster.
///
/// Every interval is expressed in milliseconds. Ranges are inclusive and a
/// fresh value is drawn from them each time a timer is armed.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Nodes created when the cluster starts. The first one is coordinator.
    pub initial_nodes: usize,
    /// Node identities are drawn from `1..=max_node_id`.
    pub max_node_id: u64,
    pub growth_interval_ms: u64,
    pub kill_interval_ms: u64,
    pub request_interval_min_ms: u64,
    pub request_interval_max_ms: u64,
    pub hold_min_ms: u64,
    pub hold_max_ms: u64,
    pub clock: ClockConfig,
    /// How long the harness keeps the cluster alive. `None` runs until a
    /// shutdown signal arrives.
    pub run_for: Option<Duration>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            initial_nodes: 4,
            max_node_id: 100_000,
            growth_interval_ms: 40_000,
            kill_interval_ms: 60_000,
            request_interval_min_ms: 10_000,
            request_interval_max_ms: 25_000,
            hold_min_ms: 5_000,
            hold_max_ms: 15_000,
            clock: ClockConfig::default(),
            run_for: Some(Duration::from_secs(300)),
        }
    }
}

impl ClusterConfig {
    pub fn with_request_interval(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.request_interval_min_ms = min_ms;
        self.request_interval_max_ms = max_ms;
        self
    }

    pub fn with_hold(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.hold_min_ms = min_ms;
        self.hold_max_ms = max_ms;
        self
    }

    /// Reject timing parameters the protocol cannot run with.
    ///
    /// A zero interval would spin a ticker, and a hold range with a zero upper
    /// bound means the critical section has no configured duration at all.
    pub fn validate(&self) -> Result<()> {
        if self.max_node_id == 0 {
            return Err(MutexError::Config("max_node_id must be positive".into()));
        }
        if self.initial_nodes as u64 > self.max_node_id {
            return Err(MutexError::Config(format!(
                "initial_nodes ({}) exceeds the identity space ({})",
                self.initial_nodes, self.max_node_id
            )));
        }
        for (name, value) in [
            ("growth_interval_ms", self.growth_interval_ms),
            ("kill_interval_ms", self.kill_interval_ms),
            ("request_interval_min_ms", self.request_interval_min_ms),
            ("hold_max_ms", self.hold_max_ms),
            ("clock.sync_interval_ms", self.clock.sync_interval_ms),
        ] {
            if value == 0 {
                return Err(MutexError::Config(format!("{name} must be positive")));
            }
        }
        for (name, value) in [
            ("growth_interval_ms", self.growth_interval_ms),
            ("kill_interval_ms", self.kill_interval_ms),
            ("request_interval_max_ms", self.request_interval_max_ms),
            ("hold_max_ms", self.hold_max_ms),
            ("clock.sync_interval_ms", self.clock.sync_interval_ms),
        ] {
            if value > MAX_INTERVAL_MS {
                return Err(MutexError::Config(format!(
                    "{name} ({value}) exceeds the {MAX_INTERVAL_MS}ms limit"
                )));
            }
        }
        check_range(
            "request interval",
            self.request_interval_min_ms,
            self.request_interval_max_ms,
        )?;
        check_range("hold", self.hold_min_ms, self.hold_max_ms)?;
        if self.clock.max_initial_skew_ms < 0 {
            return Err(MutexError::Config(
                "clock.max_initial_skew_ms must not be negative".into(),
            ));
        }
        Ok(())
    }
}

fn check_range(name: &str, min: u64, max: u64) -> Result<()> {
    if min > max {
        return Err(MutexError::Config(format!(
            "{name} range is empty: min {min} > max {max}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_config_default() {
        let cfg = ClusterConfig::default();
        assert_eq!(cfg.initial_nodes, 4);
        assert_eq!(cfg.max_node_id, 100_000);
        assert_eq!(cfg.growth_interval_ms, 40_000);
        assert_eq!(cfg.kill_interval_ms, 60_000);
        assert_eq!(cfg.request_interval_min_ms, 10_000);
        assert_eq!(cfg.request_interval_max_ms, 25_000);
        assert_eq!(cfg.hold_min_ms, 5_000);
        assert_eq!(cfg.hold_max_ms, 15_000);
        assert_eq!(cfg.run_for, Some(Duration::from_secs(300)));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn builders_set_ranges() {
        let cfg = ClusterConfig::default()
            .with_request_interval(5, 10)
            .with_hold(1, 2);
        assert_eq!(cfg.request_interval_min_ms, 5);
        assert_eq!(cfg.request_interval_max_ms, 10);
        assert_eq!(cfg.hold_min_ms, 1);
        assert_eq!(cfg.hold_max_ms, 2);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_interval_is_rejected() {
        let cfg = ClusterConfig {
            kill_interval_ms: 0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(MutexError::Config(msg)) if msg.contains("kill")));
    }

    #[test]
    fn inverted_range_is_rejected() {
        let cfg = ClusterConfig::default().with_hold(20, 10);
        assert!(matches!(cfg.validate(), Err(MutexError::Config(_))));

        let cfg = ClusterConfig::default().with_request_interval(30, 10);
        assert!(matches!(cfg.validate(), Err(MutexError::Config(_))));
    }

    #[test]
    fn zero_hold_upper_bound_is_rejected() {
        let cfg = ClusterConfig::default().with_hold(0, 0);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn identity_space_must_fit_initial_nodes() {
        let cfg = ClusterConfig {
            initial_nodes: 10,
            max_node_id: 5,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = ClusterConfig {
            max_node_id: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn oversized_interval_is_rejected() {
        let cfg = ClusterConfig {
            growth_interval_ms: u64::MAX,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(MutexError::Config(msg)) if msg.contains("growth")));

        let cfg = ClusterConfig::default().with_hold(1, MAX_INTERVAL_MS + 1);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn negative_skew_is_rejected() {
        let mut cfg = ClusterConfig::default();
        cfg.clock.max_initial_skew_ms = -1;
        assert!(cfg.validate().is_err());
    }
}
