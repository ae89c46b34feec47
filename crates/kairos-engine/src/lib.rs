//! Kairos Engine - discrete-event scheduling of tasks, conditions and resources
//!
//! This crate drives the protocol defined in `kairos-core`: it decides which
//! jobs run at which instant, runs each batch against the cell states of that
//! instant, and records resource profiles along the way.
//!
//! ## Architecture
//!
//! ```text
//! driver loop
//!  │  extract_next_jobs ──▶ Batch { offset, jobs }
//!  │  catch up LiveCells to offset
//!  │  perform_jobs ──▶ EventGraph ──▶ Timeline::add_commit
//!  ▼
//! SimulationEngine
//!  ├── JobSchedule      (time, sub-instant) ordered jobs
//!  ├── Subscriptions    tasks on signals, conditions/resources on topics
//!  ├── ExecutionState   per-task lifecycle
//!  └── ProfilingState   per-resource samples
//! ```
//!
//! ## Key Components
//!
//! - [`SimulationEngine`]: owns every table of a run
//! - [`JobSchedule`]: pending jobs keyed by [`SchedulingInstant`]
//! - [`Subscriptions`]: one-shot topic-to-waiter index
//! - [`TaskFrame`]: per-job execution context that builds the batch's event graph
//! - [`compute_results`]: turns a finished run into [`SimulationResults`]
//!
//! ## Ordering
//!
//! Within one time, task jobs run before condition evaluations, which run
//! before resource sampling. Jobs of one batch are concurrent: they all see
//! the same cell states and their events are joined with `concurrently`.

pub mod conflict;
mod config;
mod engine;
mod error;
mod frame;
mod job;
mod profile;
pub mod results;
mod schedule;
mod state;
mod subscriptions;

pub use config::{ConflictPolicy, EngineConfig};
pub use conflict::{detect_conflicts, detect_conflicts_filtered, Conflict, ConflictReport};
pub use engine::SimulationEngine;
pub use error::{Error, Result};
pub use frame::TaskFrame;
pub use job::{JobId, SchedulingInstant, SignalId, SubInstant};
pub use profile::{Profile, ProfileSegment, ProfilingState, Sample};
pub use results::{
    compute_results, ActivityInstanceId, SerializedEvent, SimulatedActivity, SimulationResults,
    UnfinishedActivity,
};
pub use schedule::{Batch, JobSchedule};
pub use state::{AwaitingChildren, ExecutionState, InProgress, Terminated};
pub use subscriptions::Subscriptions;
