//! Snapshot recording.
//!
//! The [`Recorder`] turns [`CaptureFrame`](crate::snapshot::CaptureFrame)s
//! into numbered [`NetworkSnapshot`](crate::snapshot::NetworkSnapshot)s and
//! appends them to a session's bounded buffer. Frame numbers are global and
//! keep counting after old frames are evicted.

mod buffer;
pub mod error;
mod recorder;
mod session;

pub use buffer::SnapshotRing;
pub use error::RecorderError;
pub use recorder::Recorder;
pub use session::{Bookmark, CaptureReport, RecordingOptions, RecordingSession};
