use crate::recording::{Bookmark, RecordingSession};
use crate::replay::error::ReplayError;
use crate::replay::{reconstruct_at, seek, step};
use crate::snapshot::NetworkSnapshot;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// Whether the cursor is advancing on its own.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Playback {
    Paused,
    Playing { speed: f64 },
}

/// A cursor over one session plus its playback mode.
///
/// The controller never owns or mutates snapshots. It stores an index that
/// is clamped again on every read, so eviction underneath it never leaves
/// the cursor out of bounds.
#[derive(Clone, Debug, PartialEq)]
pub struct ReplayController {
    cursor: usize,
    playback: Playback,
}

impl Default for ReplayController {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplayController {
    pub fn new() -> Self {
        Self {
            cursor: 0,
            playback: Playback::Paused,
        }
    }

    /// Current cursor, clamped to the session's present bounds.
    pub fn cursor(&self, session: &RecordingSession) -> usize {
        seek(session, i64::try_from(self.cursor).unwrap_or(i64::MAX))
    }

    pub fn playback(&self) -> Playback {
        self.playback
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.playback, Playback::Playing { .. })
    }

    pub fn current(&self, session: &RecordingSession) -> Result<Arc<NetworkSnapshot>, ReplayError> {
        reconstruct_at(session, self.cursor(session))
    }

    pub fn seek(
        &mut self,
        session: &RecordingSession,
        target: i64,
    ) -> Result<Arc<NetworkSnapshot>, ReplayError> {
        self.cursor = seek(session, target);
        self.current(session)
    }

    pub fn step(
        &mut self,
        session: &RecordingSession,
        delta: i64,
    ) -> Result<Arc<NetworkSnapshot>, ReplayError> {
        self.cursor = step(session, self.cursor(session), delta);
        self.current(session)
    }

    /// Start playback and return the pacing between steps,
    /// `capture_interval / speed`.
    pub fn play(&mut self, session: &RecordingSession, speed: f64) -> Result<Duration, ReplayError> {
        if !speed.is_finite() || speed <= 0.0 {
            return Err(ReplayError::InvalidSpeed(speed));
        }
        if session.is_empty() {
            return Err(ReplayError::EmptySession);
        }
        let pacing = pacing(session.capture_interval(), speed)?;
        self.playback = Playback::Playing { speed };
        tracing::debug!(speed, cursor = self.cursor(session), "playback started");
        Ok(pacing)
    }

    pub fn pause(&mut self) {
        if self.is_playing() {
            tracing::debug!(cursor = self.cursor, "playback paused");
        }
        self.playback = Playback::Paused;
    }

    /// One paced playback step.
    ///
    /// Returns the frame moved to, or `None` when paused or already at the
    /// last frame. Reaching the last frame pauses playback.
    pub fn advance_playback(
        &mut self,
        session: &RecordingSession,
    ) -> Result<Option<Arc<NetworkSnapshot>>, ReplayError> {
        if !self.is_playing() {
            return Ok(None);
        }
        let Some(last) = session.last_index() else {
            self.pause();
            return Err(ReplayError::EmptySession);
        };

        let from = self.cursor(session);
        if from >= last {
            self.pause();
            return Ok(None);
        }

        let frame = self.step(session, 1)?;
        if self.cursor >= last {
            self.pause();
        }
        Ok(Some(frame))
    }

    /// Bookmark the frame under the cursor.
    pub fn bookmark(
        &self,
        session: &mut RecordingSession,
        name: impl Into<String>,
    ) -> Result<Bookmark, ReplayError> {
        let frame = self.current(session)?;
        let bookmark = Bookmark {
            frame_number: frame.frame_number,
            name: name.into(),
            timestamp: Utc::now(),
        };
        session.add_bookmark(bookmark.clone());
        Ok(bookmark)
    }

    /// Move the cursor to a named bookmark's frame.
    pub fn jump_to_bookmark(
        &mut self,
        session: &RecordingSession,
        name: &str,
    ) -> Result<Arc<NetworkSnapshot>, ReplayError> {
        let bookmark = session
            .bookmark(name)
            .ok_or_else(|| ReplayError::UnknownBookmark(name.to_string()))?;
        let index =
            session
                .index_of(bookmark.frame_number)
                .ok_or_else(|| ReplayError::BookmarkEvicted {
                    name: name.to_string(),
                    frame_number: bookmark.frame_number,
                })?;
        self.cursor = index;
        self.current(session)
    }
}

/// Delay between playback steps. Zero or unrepresentable pacing is rejected.
fn pacing(interval: Duration, speed: f64) -> Result<Duration, ReplayError> {
    match Duration::try_from_secs_f64(interval.as_secs_f64() / speed) {
        Ok(pacing) if !pacing.is_zero() => Ok(pacing),
        _ => Err(ReplayError::InvalidSpeed(speed)),
    }
}
