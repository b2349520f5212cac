//! Export and import of recorded sessions.
//!
//! A [`SessionArchive`] lets a recording outlive the process that captured it.
//! Two encodings are offered: pretty JSON for inspection and bincode for
//! compact storage. Both restore the session exactly, snapshots included.

use crate::recording::RecordingSession;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub mod error;

pub use error::ArchiveError;

/// Version identifier for the archive format
pub const ARCHIVE_VERSION: u32 = 1;

/// Serializable wrapper around one recording session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionArchive {
    /// Archive format version
    pub version: u32,

    /// When the archive was written
    pub exported_at: DateTime<Utc>,

    /// The recorded session, buffer and bookmarks included
    pub session: RecordingSession,
}

impl SessionArchive {
    pub fn new(session: RecordingSession) -> Self {
        Self {
            version: ARCHIVE_VERSION,
            exported_at: Utc::now(),
            session,
        }
    }

    pub fn into_session(self) -> RecordingSession {
        self.session
    }

    pub fn to_json(&self) -> Result<String, ArchiveError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ArchiveError::SerializationFailed(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, ArchiveError> {
        let archive: Self = serde_json::from_str(json)
            .map_err(|e| ArchiveError::DeserializationFailed(e.to_string()))?;
        archive.verify()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ArchiveError> {
        bincode::serialize(self).map_err(|e| ArchiveError::SerializationFailed(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ArchiveError> {
        let archive: Self = bincode::deserialize(bytes)
            .map_err(|e| ArchiveError::DeserializationFailed(e.to_string()))?;
        archive.verify()
    }

    /// Write the archive, choosing JSON for a `.json` extension and bincode
    /// otherwise.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), ArchiveError> {
        let path = path.as_ref();
        if is_json(path) {
            std::fs::write(path, self.to_json()?)?;
        } else {
            std::fs::write(path, self.to_bytes()?)?;
        }
        tracing::info!(path = %path.display(), frames = self.session.len(), "archive written");
        Ok(())
    }

    pub fn read_from(path: impl AsRef<Path>) -> Result<Self, ArchiveError> {
        let path = path.as_ref();
        if is_json(path) {
            Self::from_json(&std::fs::read_to_string(path)?)
        } else {
            Self::from_bytes(&std::fs::read(path)?)
        }
    }

    fn verify(self) -> Result<Self, ArchiveError> {
        if self.version != ARCHIVE_VERSION {
            return Err(ArchiveError::UnsupportedVersion {
                found: self.version,
                supported: ARCHIVE_VERSION,
            });
        }
        let numbers: Vec<u64> = self.session.frames().map(|f| f.frame_number).collect();
        if numbers.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(ArchiveError::ValidationFailed(
                "frame numbers are not strictly increasing".into(),
            ));
        }
        if self.session.len() > self.session.max_snapshots() {
            return Err(ArchiveError::ValidationFailed(format!(
                "{} frames exceed max_snapshots {}",
                self.session.len(),
                self.session.max_snapshots()
            )));
        }
        Ok(self)
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
}
