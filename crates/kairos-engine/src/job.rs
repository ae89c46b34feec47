//! Units of engine work and the instants they are scheduled at

use kairos_core::{ConditionId, Duration, ResourceId, TaskId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordering class within a single simulation time
///
/// At equal times tasks run first, then conditions are evaluated, then
/// resources are sampled, so that conditions and resources observe every
/// effect of the tasks at that time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum SubInstant {
    Tasks,
    Conditions,
    Resources,
}

impl SubInstant {
    pub fn at(self, time: Duration) -> SchedulingInstant {
        SchedulingInstant { time, sub: self }
    }
}

/// A simulation time refined by its ordering class
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SchedulingInstant {
    pub time: Duration,
    pub sub: SubInstant,
}

/// Something tasks can wait to be signalled by
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum SignalId {
    /// Fired when the task finishes (including its children)
    Task(TaskId),
    /// Fired when the condition is satisfied
    Condition(ConditionId),
}

/// A unit of schedulable work
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum JobId {
    /// Step a task
    Task(TaskId),
    /// Wake everything waiting on a signal
    Signal(SignalId),
    /// Re-evaluate a condition
    Condition(ConditionId),
    /// Re-sample a resource
    Resource(ResourceId),
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobId::Task(id) => write!(f, "step {}", id),
            JobId::Signal(SignalId::Task(id)) => write!(f, "signal {}", id),
            JobId::Signal(SignalId::Condition(id)) => write!(f, "signal {}", id),
            JobId::Condition(id) => write!(f, "evaluate {}", id),
            JobId::Resource(id) => write!(f, "sample resource {}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sub_instant_orders_within_a_time() {
        let t = Duration::SECOND;
        assert!(SubInstant::Tasks.at(t) < SubInstant::Conditions.at(t));
        assert!(SubInstant::Conditions.at(t) < SubInstant::Resources.at(t));
        assert!(SubInstant::Resources.at(t) < SubInstant::Tasks.at(t + Duration::EPSILON));
    }
}
