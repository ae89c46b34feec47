//! The task stepping protocol
//!
//! A task is a resumable unit of model behavior. Each call to [`Task::step`]
//! runs it until it finishes or must wait, and returns a [`TaskStatus`] saying
//! which. A waiting status carries the continuation to step next time; the
//! engine owns that continuation until it is resumed.

use crate::capability::{Scheduler, SchedulerExt};
use crate::condition::Condition;
use crate::error::Result;
use crate::identity::TaskId;
use crate::time::Duration;
use crate::topic::Topic;
use crate::value::Value;
use std::fmt;

/// A resumable unit of model behavior
pub trait Task: Send {
    /// Run until the task completes or has to wait
    fn step(self: Box<Self>, scheduler: &mut dyn Scheduler) -> Result<TaskStatus>;
}

impl Task for Box<dyn Task> {
    fn step(self: Box<Self>, scheduler: &mut dyn Scheduler) -> Result<TaskStatus> {
        let inner: Box<dyn Task> = *self;
        inner.step(scheduler)
    }
}

/// What a task reported at the end of a step
pub enum TaskStatus {
    /// The task finished with a return value
    Completed(Value),
    /// Resume `continuation` after `delay`
    Delayed {
        delay: Duration,
        continuation: Box<dyn Task>,
    },
    /// Resume `continuation` once `target` has finished
    AwaitingTask {
        target: TaskId,
        continuation: Box<dyn Task>,
    },
    /// Resume `continuation` once `condition` holds
    AwaitingCondition {
        condition: Box<dyn Condition>,
        continuation: Box<dyn Task>,
    },
}

impl TaskStatus {
    pub fn completed(value: impl Into<Value>) -> Self {
        TaskStatus::Completed(value.into())
    }

    pub fn delayed(delay: Duration, continuation: impl Task + 'static) -> Self {
        TaskStatus::Delayed {
            delay,
            continuation: Box::new(continuation),
        }
    }

    pub fn awaiting_task(target: TaskId, continuation: impl Task + 'static) -> Self {
        TaskStatus::AwaitingTask {
            target,
            continuation: Box::new(continuation),
        }
    }

    pub fn awaiting_condition(
        condition: impl Condition + 'static,
        continuation: impl Task + 'static,
    ) -> Self {
        TaskStatus::AwaitingCondition {
            condition: Box::new(condition),
            continuation: Box::new(continuation),
        }
    }

    /// Keep the waiting reason but replace the continuation
    pub fn map_continuation(self, f: impl FnOnce(Box<dyn Task>) -> Box<dyn Task>) -> Self {
        match self {
            TaskStatus::Completed(value) => TaskStatus::Completed(value),
            TaskStatus::Delayed {
                delay,
                continuation,
            } => TaskStatus::Delayed {
                delay,
                continuation: f(continuation),
            },
            TaskStatus::AwaitingTask {
                target,
                continuation,
            } => TaskStatus::AwaitingTask {
                target,
                continuation: f(continuation),
            },
            TaskStatus::AwaitingCondition {
                condition,
                continuation,
            } => TaskStatus::AwaitingCondition {
                condition,
                continuation: f(continuation),
            },
        }
    }
}

impl fmt::Debug for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Completed(value) => f.debug_tuple("Completed").field(value).finish(),
            TaskStatus::Delayed { delay, .. } => {
                f.debug_struct("Delayed").field("delay", delay).finish()
            }
            TaskStatus::AwaitingTask { target, .. } => {
                f.debug_struct("AwaitingTask").field("target", target).finish()
            }
            TaskStatus::AwaitingCondition { .. } => f.write_str("AwaitingCondition"),
        }
    }
}

/// A task backed by a one-shot closure
pub struct FnTask<F> {
    step: F,
}

/// Wrap a closure as a task
///
/// # Example
///
/// ```
/// use kairos_core::task::{self, TaskStatus};
/// use kairos_core::Duration;
///
/// let _wait_then_finish = task::from_fn(|_| {
///     Ok(TaskStatus::delayed(
///         Duration::SECOND,
///         task::from_fn(|_| Ok(TaskStatus::completed(1i64))),
///     ))
/// });
/// ```
pub fn from_fn<F>(step: F) -> FnTask<F>
where
    F: FnOnce(&mut dyn Scheduler) -> Result<TaskStatus> + Send,
{
    FnTask { step }
}

impl<F> Task for FnTask<F>
where
    F: FnOnce(&mut dyn Scheduler) -> Result<TaskStatus> + Send,
{
    fn step(self: Box<Self>, scheduler: &mut dyn Scheduler) -> Result<TaskStatus> {
        let FnTask { step } = *self;
        step(scheduler)
    }
}

/// Runs `first` to completion, then `second`; the result is `second`'s
pub struct AndThen {
    first: Box<dyn Task>,
    second: Box<dyn Task>,
}

pub fn and_then(first: impl Task + 'static, second: impl Task + 'static) -> AndThen {
    AndThen {
        first: Box::new(first),
        second: Box::new(second),
    }
}

impl Task for AndThen {
    fn step(self: Box<Self>, scheduler: &mut dyn Scheduler) -> Result<TaskStatus> {
        let AndThen { first, second } = *self;
        match first.step(scheduler)? {
            TaskStatus::Completed(_) => second.step(scheduler),
            status => Ok(status.map_continuation(|rest| {
                Box::new(AndThen {
                    first: rest,
                    second,
                })
            })),
        }
    }
}

/// A task that only waits
pub fn delaying(delay: Duration) -> impl Task {
    from_fn(move |_| {
        Ok(TaskStatus::delayed(
            delay,
            from_fn(|_| Ok(TaskStatus::Completed(Value::Null))),
        ))
    })
}

/// A task that spawns each of `tasks` and completes immediately
pub fn spawning(tasks: Vec<Box<dyn Task>>) -> impl Task {
    from_fn(move |scheduler| {
        for task in tasks {
            scheduler.spawn(task);
        }
        Ok(TaskStatus::Completed(Value::Null))
    })
}

/// A task that emits one event and completes
pub fn emitting<T: Send + Sync + 'static>(topic: Topic<T>, value: T) -> impl Task {
    from_fn(move |scheduler| {
        scheduler.emit(&topic, value);
        Ok(TaskStatus::Completed(Value::Null))
    })
}
