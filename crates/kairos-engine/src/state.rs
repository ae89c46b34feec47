//! Task lifecycle
//!
//! ```text
//! InProgress ──completed──▶ AwaitingChildren ──all children done──▶ Terminated
//!     ▲   │
//!     └───┘ delayed / awaiting a task / awaiting a condition
//! ```
//!
//! Transitions consume the previous state, so a task can never move backwards.

use kairos_core::{Duration, Task, TaskId, Value};
use std::collections::VecDeque;
use std::fmt;

/// A task that still has steps to run
pub struct InProgress {
    pub start_offset: Duration,
    pub continuation: Box<dyn Task>,
}

/// A task that returned, waiting for the children it spawned
#[derive(Debug, Clone)]
pub struct AwaitingChildren {
    pub start_offset: Duration,
    pub end_offset: Duration,
    pub return_value: Value,
    pub remaining_children: VecDeque<TaskId>,
}

/// A task that returned and whose children have all terminated
#[derive(Debug, Clone, PartialEq)]
pub struct Terminated {
    pub start_offset: Duration,
    pub end_offset: Duration,
    /// When the last child finished; never before `end_offset`
    pub join_offset: Duration,
    pub return_value: Value,
}

impl InProgress {
    pub fn new(start_offset: Duration, continuation: Box<dyn Task>) -> Self {
        Self {
            start_offset,
            continuation,
        }
    }

    /// The task returned at `end_offset`
    pub fn completed_at(
        start_offset: Duration,
        end_offset: Duration,
        return_value: Value,
        children: impl IntoIterator<Item = TaskId>,
    ) -> AwaitingChildren {
        AwaitingChildren {
            start_offset,
            end_offset,
            return_value,
            remaining_children: children.into_iter().collect(),
        }
    }
}

impl AwaitingChildren {
    /// All children have terminated as of `join_offset`
    pub fn joined_at(self, join_offset: Duration) -> Terminated {
        Terminated {
            start_offset: self.start_offset,
            end_offset: self.end_offset,
            join_offset: join_offset.max(self.end_offset),
            return_value: self.return_value,
        }
    }
}

impl Terminated {
    /// Time from start until the last child finished
    pub fn duration(&self) -> Duration {
        self.join_offset - self.start_offset
    }
}

/// Where a task is in its lifecycle
pub enum ExecutionState {
    InProgress(InProgress),
    AwaitingChildren(AwaitingChildren),
    Terminated(Terminated),
}

impl ExecutionState {
    pub fn start_offset(&self) -> Duration {
        match self {
            ExecutionState::InProgress(s) => s.start_offset,
            ExecutionState::AwaitingChildren(s) => s.start_offset,
            ExecutionState::Terminated(s) => s.start_offset,
        }
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self, ExecutionState::Terminated(_))
    }

    pub fn as_terminated(&self) -> Option<&Terminated> {
        match self {
            ExecutionState::Terminated(t) => Some(t),
            _ => None,
        }
    }

    /// Short lowercase name of the state, for logs
    pub fn name(&self) -> &'static str {
        match self {
            ExecutionState::InProgress(_) => "in progress",
            ExecutionState::AwaitingChildren(_) => "awaiting children",
            ExecutionState::Terminated(_) => "terminated",
        }
    }
}

impl fmt::Debug for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionState::InProgress(s) => f
                .debug_struct("InProgress")
                .field("start_offset", &s.start_offset)
                .finish_non_exhaustive(),
            ExecutionState::AwaitingChildren(s) => fmt::Debug::fmt(s, f),
            ExecutionState::Terminated(s) => fmt::Debug::fmt(s, f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_never_precedes_end() {
        let awaiting = InProgress::completed_at(
            Duration::SECOND,
            Duration::of(3, Duration::SECOND),
            Value::Int(1),
            [TaskId::new(4)],
        );
        assert_eq!(awaiting.remaining_children.len(), 1);

        let done = awaiting.joined_at(Duration::of(2, Duration::SECOND));
        assert_eq!(done.join_offset, Duration::of(3, Duration::SECOND));
        assert_eq!(done.duration(), Duration::of(2, Duration::SECOND));
        assert_eq!(done.return_value, Value::Int(1));
    }
}
