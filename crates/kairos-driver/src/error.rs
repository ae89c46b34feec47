//! Error types for kairos-driver

use chrono::{DateTime, Utc};
use kairos_core::{DirectiveId, Duration};
use thiserror::Error;

/// Everything that can stop a simulation from producing results
#[derive(Debug, Error)]
pub enum SimulationError {
    /// A directive names a type the mission model does not define
    #[error("directive {directive} has unknown type '{directive_type}'")]
    UnknownDirectiveType {
        directive: DirectiveId,
        directive_type: String,
    },

    /// The mission model rejected a directive's arguments
    #[error("directive {directive} could not be instantiated: {source}")]
    Instantiation {
        directive: DirectiveId,
        #[source]
        source: kairos_core::Error,
    },

    #[error("directive {directive} is anchored to unknown directive {anchor}")]
    UnknownAnchor {
        directive: DirectiveId,
        anchor: DirectiveId,
    },

    #[error("anchor cycle through directive {0}")]
    AnchorCycle(DirectiveId),

    /// A directive would start before the end of the directive it waits on
    #[error("directive {0} starts before the end it is anchored to")]
    NegativeAnchorOffset(DirectiveId),

    /// A step of a directive's activity failed
    #[error("directive {directive} failed at {elapsed} after {start_time}: {source}")]
    Directive {
        directive: DirectiveId,
        elapsed: Duration,
        start_time: DateTime<Utc>,
        #[source]
        source: kairos_engine::Error,
    },

    /// The run failed outside any directive
    #[error("simulation failed at {elapsed} after {start_time}: {source}")]
    Failed {
        elapsed: Duration,
        start_time: DateTime<Utc>,
        #[source]
        source: kairos_engine::Error,
    },

    /// No job is left but the task never finished
    #[error("task stalled at {0} with nothing left to run")]
    Stalled(Duration),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("export error: {0}")]
    Export(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SimulationError {
    /// The directive this failure is attributed to, if any
    pub fn directive(&self) -> Option<DirectiveId> {
        match self {
            SimulationError::UnknownDirectiveType { directive, .. }
            | SimulationError::Instantiation { directive, .. }
            | SimulationError::UnknownAnchor { directive, .. }
            | SimulationError::Directive { directive, .. } => Some(*directive),
            SimulationError::AnchorCycle(directive)
            | SimulationError::NegativeAnchorOffset(directive) => Some(*directive),
            _ => None,
        }
    }

    /// Simulation time reached when the run failed
    pub fn elapsed(&self) -> Option<Duration> {
        match self {
            SimulationError::Directive { elapsed, .. }
            | SimulationError::Failed { elapsed, .. } => Some(*elapsed),
            SimulationError::Stalled(elapsed) => Some(*elapsed),
            _ => None,
        }
    }
}

/// Result type for driver operations
pub type Result<T> = std::result::Result<T, SimulationError>;
