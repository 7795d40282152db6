use derive_more::Display;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::round::RoundState;

/// The step of the job in which a [`JobError`] occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum ErrorKind {
    #[display(fmt = "connection")]
    Connection,
    #[display(fmt = "assignment")]
    Assignment,
    #[display(fmt = "training")]
    Training,
    #[display(fmt = "report")]
    Report,
}

/// Error that sends the state machine to the failed state.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobError {
    #[error("handshake with the coordinator failed: {message}")]
    Connection { message: String },
    #[error("invalid assignment: {message}")]
    Assignment { message: String },
    #[error("training round failed: {message}")]
    Training {
        /// Position of the round when it failed, if it failed in the training loop.
        at: Option<RoundState>,
        message: String,
    },
    #[error("failed to report the delta: {message}")]
    Report { message: String },
}

impl JobError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            JobError::Connection { .. } => ErrorKind::Connection,
            JobError::Assignment { .. } => ErrorKind::Assignment,
            JobError::Training { .. } => ErrorKind::Training,
            JobError::Report { .. } => ErrorKind::Report,
        }
    }

    /// Whether [`StateMachine::retry()`] can resume the job after this error.
    ///
    /// [`StateMachine::retry()`]: crate::StateMachine::retry
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Training | ErrorKind::Report)
    }
}
