#![forbid(unsafe_code)]

use crate::domain::RecordingState;
use std::fmt;

/// Control operation that was attempted, for transition errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Start,
    Pause,
    Resume,
    Finish,
    Submit,
    SelectPlan,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Start => "start",
            Action::Pause => "pause",
            Action::Resume => "resume",
            Action::Finish => "finish",
            Action::Submit => "submit",
            Action::SelectPlan => "select a plan",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(#[from] config::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("chunk encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid sample: {0}")]
    Sample(#[from] metrics::SampleError),

    #[error("failed to join chunk writer: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("cannot {action} while {from}")]
    InvalidTransition { from: RecordingState, action: Action },

    #[error("another recording session is already active")]
    SessionActive,

    #[error("a plan is already active, clear it first")]
    PlanAlreadyActive,

    #[error("no plan is active")]
    NoActivePlan,

    #[error("plan has no steps")]
    EmptyPlan,

    #[error("chunk {sequence} is corrupt: {reason}")]
    CorruptChunk { sequence: u32, reason: String },

    #[error("aggregation is incomplete at chunk {sequence}: {reason}")]
    IncompleteAggregation { sequence: u32, reason: String },

    #[error("chunk {sequence} could not be written: {reason}")]
    ChunkWrite { sequence: u32, reason: String },

    #[error("chunks can only be cleaned up after a finished session was submitted")]
    CleanupNotAllowed,

    #[error("sample channel is closed")]
    ChannelClosed,

    #[error("recorder engine is not running")]
    EngineStopped,
}

/// Coarse classification published with `error` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidTransition,
    SessionActive,
    PlanAlreadyActive,
    NoActivePlan,
    IncompleteAggregation,
    ChunkWrite,
    Storage,
    Other,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidTransition { .. } | Error::CleanupNotAllowed => {
                ErrorKind::InvalidTransition
            }
            Error::SessionActive => ErrorKind::SessionActive,
            Error::PlanAlreadyActive => ErrorKind::PlanAlreadyActive,
            Error::NoActivePlan | Error::EmptyPlan => ErrorKind::NoActivePlan,
            Error::IncompleteAggregation { .. } | Error::CorruptChunk { .. } => {
                ErrorKind::IncompleteAggregation
            }
            Error::ChunkWrite { .. } => ErrorKind::ChunkWrite,
            Error::Io(_) | Error::Sqlx(_) | Error::Json(_) => ErrorKind::Storage,
            Error::Config(_)
            | Error::Sample(_)
            | Error::Join(_)
            | Error::ChannelClosed
            | Error::EngineStopped => ErrorKind::Other,
        }
    }
}
