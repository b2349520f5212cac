//! Recorder error types.

use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur while recording.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecorderError {
    #[error("unknown recording session {0}")]
    UnknownSession(Uuid),

    /// Capture or stop against a session that has already been stopped.
    #[error("session {0} is not recording")]
    NotRecording(Uuid),

    #[error("invalid recording options: {0}")]
    InvalidOptions(String),
}
