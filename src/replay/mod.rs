//! Replay over a recorded session.
//!
//! Cursors are buffer indexes: `0` is the oldest retained frame, whatever its
//! global frame number. Every cursor movement is a pure function of
//! `(session, cursor, argument)` and clamps to the buffer instead of failing.
//!
//! Replay never re-derives state. [`reconstruct_at`] hands back the exact
//! snapshot the recorder stored.

mod controller;
pub mod error;

pub use controller::{Playback, ReplayController};
pub use error::ReplayError;

use crate::recording::RecordingSession;
use crate::snapshot::NetworkSnapshot;
use std::sync::Arc;

/// Clamp a requested index into `[0, len - 1]`. An empty session clamps to 0.
///
/// # Example
///
/// ```rust
/// use aetherium::recording::{Recorder, RecordingOptions};
/// use aetherium::replay;
/// use aetherium::snapshot::CaptureFrame;
///
/// let mut recorder = Recorder::new();
/// let id = recorder.start(RecordingOptions::default()).unwrap();
/// for _ in 0..3 {
///     recorder.capture(id, CaptureFrame::default()).unwrap();
/// }
/// let session = recorder.session(id).unwrap();
///
/// assert_eq!(replay::seek(session, -4), 0);
/// assert_eq!(replay::seek(session, 1), 1);
/// assert_eq!(replay::seek(session, 99), 2);
/// ```
pub fn seek(session: &RecordingSession, target: i64) -> usize {
    let Some(last) = session.last_index() else {
        return 0;
    };
    if target <= 0 {
        return 0;
    }
    usize::try_from(target).map_or(last, |t| t.min(last))
}

/// Move the cursor by `delta` frames, clamping at both ends without wrapping.
pub fn step(session: &RecordingSession, current: usize, delta: i64) -> usize {
    let current = i64::try_from(current).unwrap_or(i64::MAX);
    seek(session, current.saturating_add(delta))
}

/// The stored snapshot at a buffer index.
pub fn reconstruct_at(
    session: &RecordingSession,
    index: usize,
) -> Result<Arc<NetworkSnapshot>, ReplayError> {
    if session.is_empty() {
        return Err(ReplayError::EmptySession);
    }
    let index = seek(session, i64::try_from(index).unwrap_or(i64::MAX));
    session
        .frame(index)
        .cloned()
        .ok_or(ReplayError::EmptySession)
}

/// The stored snapshot with a global frame number.
pub fn find_frame(
    session: &RecordingSession,
    frame_number: u64,
) -> Result<Arc<NetworkSnapshot>, ReplayError> {
    session
        .index_of(frame_number)
        .and_then(|index| session.frame(index))
        .cloned()
        .ok_or(ReplayError::FrameNotFound(frame_number))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{Recorder, RecordingOptions};
    use crate::snapshot::CaptureFrame;
    use std::time::Duration;
    use uuid::Uuid;

    fn recorded(frames: usize, max_snapshots: usize) -> (Recorder, Uuid) {
        let mut recorder = Recorder::new();
        let id = recorder
            .start(RecordingOptions {
                capture_interval: Duration::from_millis(10),
                max_snapshots,
            })
            .unwrap();
        for _ in 0..frames {
            recorder.capture(id, CaptureFrame::default()).unwrap();
        }
        (recorder, id)
    }

    #[test]
    fn seek_zero_after_eviction_is_oldest_retained() {
        let (recorder, id) = recorded(10, 5);
        let session = recorder.session(id).unwrap();

        let cursor = seek(session, 0);

        assert_eq!(reconstruct_at(session, cursor).unwrap().frame_number, 6);
        assert_eq!(seek(session, 100), 4);
        assert_eq!(reconstruct_at(session, 4).unwrap().frame_number, 10);
    }

    #[test]
    fn step_clamps_without_wrapping() {
        let (recorder, id) = recorded(3, 10);
        let session = recorder.session(id).unwrap();

        assert_eq!(step(session, 2, 1), 2);
        assert_eq!(step(session, 0, -1), 0);
        assert_eq!(step(session, 0, 2), 2);
        assert_eq!(step(session, usize::MAX, i64::MAX), 2);
    }

    #[test]
    fn empty_session() {
        let (recorder, id) = recorded(0, 10);
        let session = recorder.session(id).unwrap();

        assert_eq!(seek(session, 3), 0);
        assert_eq!(step(session, 0, 1), 0);
        assert_eq!(
            reconstruct_at(session, 0).unwrap_err(),
            ReplayError::EmptySession
        );
    }

    #[test]
    fn reconstruct_returns_the_stored_value() {
        let (recorder, id) = recorded(2, 10);
        let session = recorder.session(id).unwrap();

        let a = reconstruct_at(session, 1).unwrap();
        let b = reconstruct_at(session, 1).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a, session.frame(1).unwrap()));
    }

    #[test]
    fn find_frame_by_global_number() {
        let (recorder, id) = recorded(10, 5);
        let session = recorder.session(id).unwrap();

        assert_eq!(find_frame(session, 8).unwrap().frame_number, 8);
        assert_eq!(
            find_frame(session, 2).unwrap_err(),
            ReplayError::FrameNotFound(2)
        );
    }
}
