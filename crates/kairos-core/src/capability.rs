//! Capabilities handed to model code by the engine
//!
//! A [`Querier`] is handed to condition predicates and resource samplers: it can
//! only read cells, and the engine records what was read so it knows when to
//! re-evaluate. A [`Scheduler`] is handed to a stepping task: it can read cells,
//! emit events and spawn child tasks.

use crate::cell::{Cell, Query};
use crate::error::Result;
use crate::identity::{CellId, TaskId, TopicId};
use crate::task::Task;
use crate::time::Duration;
use crate::topic::{Payload, Topic};
use std::sync::Arc;

/// Read-only, dependency-tracking access to cells
pub trait Querier {
    /// Read a cell, recording its topic and expiry as dependencies
    fn read(&mut self, cell: CellId) -> Result<&Cell>;
}

/// Typed helpers over [`Querier`]
pub trait QuerierExt: Querier {
    /// Read a copy of the state behind `query`
    fn get_state<S: Clone + 'static>(&mut self, query: &Query<S>) -> Result<S> {
        let id = query.cell();
        self.read(id)?.downcast::<S>(id).cloned()
    }
}

impl<Q: Querier + ?Sized> QuerierExt for Q {}

/// What a task may do while it is being stepped
pub trait Scheduler {
    /// Current simulation time
    fn now(&self) -> Duration;

    /// The task being stepped
    fn active_task(&self) -> TaskId;

    /// Read a cell as of the task's position in the current instant
    fn read(&mut self, cell: CellId) -> Result<&Cell>;

    /// Emit an already erased payload on a topic
    fn emit_erased(&mut self, topic: TopicId, payload: Payload);

    /// Start a child task at the current instant
    fn spawn(&mut self, task: Box<dyn Task>) -> TaskId;
}

/// Typed helpers over [`Scheduler`]
pub trait SchedulerExt: Scheduler {
    fn get<S: Clone + 'static>(&mut self, query: &Query<S>) -> Result<S> {
        let id = query.cell();
        self.read(id)?.downcast::<S>(id).cloned()
    }

    fn emit<T: Send + Sync + 'static>(&mut self, topic: &Topic<T>, value: T) {
        self.emit_erased(topic.id(), Arc::new(value));
    }

    fn spawn_task<T: Task + 'static>(&mut self, task: T) -> TaskId {
        self.spawn(Box::new(task))
    }
}

impl<S: Scheduler + ?Sized> SchedulerExt for S {}
