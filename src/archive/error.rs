//! Archive error types.

use thiserror::Error;

/// Errors that can occur while exporting or importing a session archive
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Serialization to JSON or binary format failed
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// Deserialization from JSON or binary format failed
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    /// Archive was written by an incompatible format version
    #[error("Unsupported archive version {found}, supported: {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    /// Archive content is internally inconsistent
    #[error("Archive validation failed: {0}")]
    ValidationFailed(String),

    #[error("Archive I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
