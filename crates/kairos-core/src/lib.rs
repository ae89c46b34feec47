//! Kairos Core - Building blocks of a discrete-event simulation
//!
//! This crate provides the types shared by the engine and by mission models:
//! - Logical time (`Duration`) and identities (`TaskId`, `ConditionId`, ...)
//! - Dynamic values (`Value`, `ValueMap`) for serialized data
//! - Typed topics, events and the `EventGraph` algebra
//! - Cells (`CellModel`, `CellStore`, `LiveCells`) and the append-only `Timeline`
//! - The task protocol (`Task`, `TaskStatus`) with `Condition` and `Resource`
//! - The capabilities model code receives (`Querier`, `Scheduler`)
//!
//! ## Model code
//!
//! ```
//! use kairos_core::task::{self, TaskStatus};
//! use kairos_core::{Duration, SchedulerExt, TopicRegistry};
//!
//! let mut topics = TopicRegistry::new();
//! let pings = topics.create::<u32>();
//!
//! // Emit, wait a second, emit again.
//! let _pinger = task::from_fn(move |scheduler| {
//!     scheduler.emit(&pings, 1);
//!     Ok(TaskStatus::delayed(
//!         Duration::SECOND,
//!         task::from_fn(move |scheduler| {
//!             scheduler.emit(&pings, 2);
//!             Ok(TaskStatus::completed(()))
//!         }),
//!     ))
//! });
//! ```
//!
//! Everything here is deterministic: there is no wall-clock time and no
//! global state. Topic ids come from a `TopicRegistry`, task ids from the engine.

mod capability;
mod cell;
pub mod condition;
mod error;
mod graph;
mod identity;
pub mod resource;
pub mod task;
pub mod time;
mod timeline;
mod topic;
mod value;

pub use capability::{Querier, QuerierExt, Scheduler, SchedulerExt};
pub use cell::{Cell, CellModel, CellStore, LiveCells, Query};
pub use condition::Condition;
pub use error::{Error, Result};
pub use graph::{EffectTrait, EventGraph};
pub use identity::{CellId, ConditionId, DirectiveId, ResourceId, TaskId, TopicId};
pub use resource::{RealDynamics, Resource, ResourceKind};
pub use task::{Task, TaskStatus};
pub use time::Duration;
pub use timeline::{TimePoint, Timeline, TimelineStats};
pub use topic::{Event, Payload, SerializableTopic, Topic, TopicRegistry};
pub use value::{Value, ValueMap};
