//! Replay error types.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReplayError {
    #[error("session has no recorded frames")]
    EmptySession,

    #[error("frame {0} is not in the buffer")]
    FrameNotFound(u64),

    #[error("no bookmark named '{0}'")]
    UnknownBookmark(String),

    /// The bookmarked frame has since been evicted from the buffer.
    #[error("bookmark '{name}' points at evicted frame {frame_number}")]
    BookmarkEvicted { name: String, frame_number: u64 },

    #[error("playback speed {0} does not give a usable pacing")]
    InvalidSpeed(f64),
}
