//! Kairos Driver - mission models, plans, and the simulation loop
//!
//! This crate builds on `kairos-engine` to run whole plans:
//!
//! - **MissionModel**: topics, cells, resources, a daemon, and directive types
//! - **Schedule**: activity directives, possibly anchored to one another
//! - **Simulator**: drives the engine from the simulation start to its horizon
//! - **Exporter**: writes simulation results in various formats
//!
//! # Example
//!
//! ```rust
//! use kairos_core::task;
//! use kairos_core::{DirectiveId, Duration, Task, ValueMap};
//! use kairos_driver::{simulate, ActivityDirective, MissionModelBuilder, Schedule, SimulationConfig};
//!
//! let mut builder = MissionModelBuilder::new();
//! builder.directive_type("Wait", |_: &ValueMap| -> kairos_core::Result<Box<dyn Task>> {
//!     Ok(Box::new(task::delaying(Duration::SECOND)))
//! });
//! let model = builder.build();
//!
//! let mut schedule = Schedule::new();
//! schedule.insert(DirectiveId::new(1), ActivityDirective::new("Wait", Duration::SECOND));
//!
//! let config = SimulationConfig::new(Default::default(), Duration::HOUR);
//! let results = simulate(&model, &schedule, &config).unwrap();
//! let wait = results.activity_for_directive(DirectiveId::new(1)).unwrap();
//! assert_eq!(wait.duration, Duration::SECOND);
//! ```

mod config;
mod directive;
mod driver;
mod error;
mod exporter;
mod model;

pub use config::SimulationConfig;
pub use directive::{resolve, ActivityDirective, Anchor, ResolvedSchedule, Schedule};
pub use driver::{simulate, simulate_task, CancelFlag, Simulator};
pub use error::{Result, SimulationError};
pub use exporter::{ExportFormat, Exporter};
pub use model::{DirectiveType, MissionModel, MissionModelBuilder};

// Re-export result types for convenience
pub use kairos_engine::{
    ActivityInstanceId, EngineConfig, SimulatedActivity, SimulationResults, UnfinishedActivity,
};
