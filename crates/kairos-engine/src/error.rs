//! Error types for kairos-engine

use crate::conflict::ConflictReport;
use kairos_core::{ConditionId, ResourceId, TaskId};
use thiserror::Error;

/// Result type for kairos-engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running the engine
///
/// Any of these aborts the run: there is no partial retry of a batch.
#[derive(Debug, Error)]
pub enum Error {
    /// A task step failed
    #[error("{task} failed: {source}")]
    TaskFailed {
        task: TaskId,
        #[source]
        source: kairos_core::Error,
    },

    /// A condition could not be evaluated
    #[error("{condition} failed: {source}")]
    ConditionFailed {
        condition: ConditionId,
        #[source]
        source: kairos_core::Error,
    },

    /// A resource could not be sampled
    #[error("resource {resource} failed: {source}")]
    ResourceFailed {
        resource: ResourceId,
        #[source]
        source: kairos_core::Error,
    },

    /// A job referred to a task the engine does not know
    #[error("unknown task {0}")]
    UnknownTask(TaskId),

    #[error("unknown condition {0}")]
    UnknownCondition(ConditionId),

    #[error("unknown resource {0}")]
    UnknownResource(ResourceId),

    /// Concurrent writes to a non-commuting cell under [`ConflictPolicy::Abort`](crate::ConflictPolicy::Abort)
    ///
    /// The `report` field is boxed to keep the error small.
    #[error("unresolved conflicts: {}", Self::format_conflict_count(*.count))]
    UnresolvedConflicts {
        count: usize,
        report: Box<ConflictReport>,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    /// Core error
    #[error("core error: {0}")]
    Core(#[from] kairos_core::Error),
}

impl Error {
    /// Create an UnresolvedConflicts error from a ConflictReport
    pub fn unresolved_conflicts(report: ConflictReport) -> Self {
        Error::UnresolvedConflicts {
            count: report.len(),
            report: Box::new(report),
        }
    }

    /// Get the conflict report if this is an UnresolvedConflicts error
    pub fn conflict_report(&self) -> Option<&ConflictReport> {
        match self {
            Error::UnresolvedConflicts { report, .. } => Some(report),
            _ => None,
        }
    }

    /// The task whose step raised this error, if any
    pub fn task(&self) -> Option<TaskId> {
        match self {
            Error::TaskFailed { task, .. } => Some(*task),
            _ => None,
        }
    }

    fn format_conflict_count(count: usize) -> String {
        if count == 1 {
            "1 conflict detected".to_string()
        } else {
            format!("{} conflicts detected", count)
        }
    }
}

fn _assert_error_send_sync<T: Send + Sync>() {}
fn _error_is_send_sync() {
    _assert_error_send_sync::<Error>();
}
