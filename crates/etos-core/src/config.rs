//! Simulation configuration
//!
//! Settings fixed for the lifetime of a [`crate::Simulation`]. Every field
//! has a default, so a configuration document only needs to name what it
//! changes.

use serde::{Deserialize, Serialize};

/// Configuration for a simulation run
///
/// # Example
///
/// ```
/// use etos_core::SimConfig;
///
/// let config = SimConfig::default().with_seed(7).with_max_duration(3600.0);
/// assert_eq!(config.seed, 7);
/// assert!(config.record_logs);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Seed of the simulation random number generator
    pub seed: u64,
    /// Offset of the simulation clock (`simulation.t = now + start_time`)
    ///
    /// Lets a run start at a given time of day.
    pub start_time: f64,
    /// Default horizon of [`crate::Simulation::start`]
    pub max_duration: f64,
    /// Keep diagnostics in the in-memory journal
    ///
    /// Records are always forwarded to `tracing`.
    pub record_logs: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 12345,
            start_time: 0.0,
            max_duration: f64::INFINITY,
            record_logs: true,
        }
    }
}

impl SimConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_start_time(mut self, start_time: f64) -> Self {
        self.start_time = start_time;
        self
    }

    pub fn with_max_duration(mut self, max_duration: f64) -> Self {
        self.max_duration = max_duration;
        self
    }

    pub fn with_record_logs(mut self, record_logs: bool) -> Self {
        self.record_logs = record_logs;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SimConfig::default();
        assert_eq!(config.seed, 12345);
        assert_eq!(config.start_time, 0.0);
        assert!(config.max_duration.is_infinite());
        assert!(config.record_logs);
    }

    #[test]
    fn test_partial_ron() {
        let config: SimConfig = ron::from_str("(seed: 42, start_time: 28800.0)").unwrap();
        assert_eq!(config.seed, 42);
        assert_eq!(config.start_time, 28800.0);
        assert!(config.record_logs);
    }
}
