//! Simulation configuration

use crate::error::{Result, SimulationError};
use chrono::{DateTime, Utc};
use kairos_core::Duration;
use kairos_engine::EngineConfig;
use serde::{Deserialize, Serialize};

/// When and how long to simulate
///
/// Missing fields take their defaults, so a config file only needs what it
/// changes:
///
/// ```
/// use kairos_core::Duration;
/// use kairos_driver::SimulationConfig;
///
/// let config = SimulationConfig::from_ron(r#"(
///     simulation_start: "2030-01-01T00:00:00Z",
///     simulation_duration: 3600000000,
///     engine: (conflict_policy: Warn),
/// )"#).unwrap();
/// assert_eq!(config.simulation_duration, Duration::HOUR);
/// assert_eq!(config.plan_offset(), Duration::ZERO);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub simulation_start: DateTime<Utc>,
    pub simulation_duration: Duration,
    /// Defaults to `simulation_start`
    pub plan_start: Option<DateTime<Utc>>,
    pub engine: EngineConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            simulation_start: DateTime::<Utc>::default(),
            simulation_duration: Duration::DAY,
            plan_start: None,
            engine: EngineConfig::default(),
        }
    }
}

impl SimulationConfig {
    pub fn new(simulation_start: DateTime<Utc>, simulation_duration: Duration) -> Self {
        Self {
            simulation_start,
            simulation_duration,
            ..Self::default()
        }
    }

    pub fn with_plan_start(mut self, plan_start: DateTime<Utc>) -> Self {
        self.plan_start = Some(plan_start);
        self
    }

    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    /// Plan start relative to the simulation start
    pub fn plan_offset(&self) -> Duration {
        self.plan_start
            .map(|plan_start| Duration::from_chrono(plan_start - self.simulation_start))
            .unwrap_or(Duration::ZERO)
    }

    /// Parse a config from RON text
    pub fn from_ron(text: &str) -> Result<Self> {
        let config: Self =
            ron::from_str(text).map_err(|e| SimulationError::Config(e.to_string()))?;
        if config.simulation_duration.is_negative() {
            return Err(SimulationError::Config(format!(
                "negative simulation duration {}",
                config.simulation_duration
            )));
        }
        Ok(config)
    }
}
