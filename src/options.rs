use std::time::Duration;

use crate::error::{EngineError, Result};

/// Tunables the core itself owns. The reflection-driven host configuration
/// named alongside this in the external interface (`api_version`,
/// `cluster_file`, `root_path`, ...) governs the client wrapper, not this
/// core, and has no counterpart here.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Close the active transaction window once it has been open this long.
    pub window_rollover_age: Duration,
    /// Close the active transaction window once it has merged this many
    /// commits, regardless of age.
    pub window_rollover_cardinality: usize,
    /// A page is a sweep candidate once this fraction of its written bytes
    /// are disposed.
    pub collector_free_ratio_threshold: f32,
    /// Per-key bound on pending watch notifications before new sends are
    /// dropped.
    pub watch_queue_depth: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            window_rollover_age: Duration::from_secs(5),
            window_rollover_cardinality: 100_000,
            collector_free_ratio_threshold: 0.5,
            watch_queue_depth: 8,
        }
    }
}

impl EngineOptions {
    pub fn validate(&self) -> Result<()> {
        if self.window_rollover_age.is_zero() {
            return Err(EngineError::InvalidOptionValue("window_rollover_age must be non-zero"));
        }
        if self.window_rollover_cardinality == 0 {
            return Err(EngineError::InvalidOptionValue(
                "window_rollover_cardinality must be non-zero",
            ));
        }
        if !(0.0..=1.0).contains(&self.collector_free_ratio_threshold) {
            return Err(EngineError::InvalidOptionValue(
                "collector_free_ratio_threshold must be in [0.0, 1.0]",
            ));
        }
        if self.watch_queue_depth == 0 {
            return Err(EngineError::InvalidOptionValue("watch_queue_depth must be non-zero"));
        }
        Ok(())
    }
}
