//! Engine configuration
//!
//! Settings that change how the engine reacts to questionable model behavior.
//! Configs can be written inline or loaded from RON.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// What to do when a batch writes concurrently to a non-commuting cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConflictPolicy {
    /// Skip detection entirely
    Ignore,
    /// Log each conflict and continue; the cell then sees the writes in
    /// batch order
    Warn,
    /// Fail the run with [`Error::UnresolvedConflicts`]
    #[default]
    Abort,
}

/// Configuration for [`SimulationEngine`](crate::SimulationEngine)
///
/// # Example
///
/// ```
/// use kairos_engine::{ConflictPolicy, EngineConfig};
///
/// let config = EngineConfig::default();
/// assert_eq!(config.conflict_policy(), ConflictPolicy::Abort);
///
/// let config = EngineConfig::from_ron("(conflict_policy: Warn)").unwrap();
/// assert_eq!(config.conflict_policy(), ConflictPolicy::Warn);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    conflict_policy: ConflictPolicy,
}

impl EngineConfig {
    pub fn with_conflict_policy(conflict_policy: ConflictPolicy) -> Self {
        Self { conflict_policy }
    }

    pub fn conflict_policy(&self) -> ConflictPolicy {
        self.conflict_policy
    }

    pub fn set_conflict_policy(&mut self, policy: ConflictPolicy) {
        self.conflict_policy = policy;
    }

    /// Parse a config from RON text; missing fields take their defaults
    pub fn from_ron(text: &str) -> Result<Self> {
        ron::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }
}
