//! Time-travel query surface.
//!
//! [`TimeTravel`] binds the [`Recorder`] to one [`ReplayController`] per
//! session and exposes everything addressed by session id. This is the only
//! surface a viewer needs.

use crate::archive::{ArchiveError, SessionArchive};
use crate::recording::{
    Bookmark, CaptureReport, Recorder, RecorderError, RecordingOptions, RecordingSession,
};
use crate::replay::{self, ReplayController, ReplayError};
use crate::snapshot::{CaptureFrame, NetworkSnapshot};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum TimeTravelError {
    #[error(transparent)]
    Recorder(#[from] RecorderError),

    #[error(transparent)]
    Replay(#[from] ReplayError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("unknown recording session {0}")]
    UnknownSession(Uuid),
}

/// Recorder plus replay cursors, keyed by session id.
///
/// # Example
///
/// ```rust
/// use aetherium::recording::RecordingOptions;
/// use aetherium::snapshot::CaptureFrame;
/// use aetherium::timetravel::TimeTravel;
///
/// let mut tt = TimeTravel::new();
/// let id = tt.start_recording(RecordingOptions::default()).unwrap();
/// for _ in 0..4 {
///     tt.capture(id, CaptureFrame::default()).unwrap();
/// }
/// tt.stop_recording(id).unwrap();
///
/// assert_eq!(tt.seek(id, 2).unwrap().frame_number, 3);
/// assert_eq!(tt.step(id, 5).unwrap().frame_number, 4);
/// assert_eq!(tt.get_frame(id, 0).unwrap().frame_number, 1);
/// ```
#[derive(Debug, Default)]
pub struct TimeTravel {
    recorder: Recorder,
    cursors: BTreeMap<Uuid, ReplayController>,
}

impl TimeTravel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    pub fn session(&self, id: Uuid) -> Option<&RecordingSession> {
        self.recorder.session(id)
    }

    pub fn start_recording(&mut self, options: RecordingOptions) -> Result<Uuid, TimeTravelError> {
        let id = self.recorder.start(options)?;
        self.cursors.insert(id, ReplayController::new());
        Ok(id)
    }

    pub fn stop_recording(&mut self, id: Uuid) -> Result<(), TimeTravelError> {
        self.recorder.stop(id)?;
        Ok(())
    }

    pub fn capture(&mut self, id: Uuid, frame: CaptureFrame) -> Result<CaptureReport, TimeTravelError> {
        Ok(self.recorder.capture(id, frame)?)
    }

    /// The stored snapshot at a buffer index, clamped.
    pub fn get_frame(&self, id: Uuid, index: usize) -> Result<Arc<NetworkSnapshot>, TimeTravelError> {
        Ok(replay::reconstruct_at(self.find(id)?, index)?)
    }

    /// The stored snapshot with a global frame number.
    pub fn find_frame(
        &self,
        id: Uuid,
        frame_number: u64,
    ) -> Result<Arc<NetworkSnapshot>, TimeTravelError> {
        Ok(replay::find_frame(self.find(id)?, frame_number)?)
    }

    pub fn cursor(&self, id: Uuid) -> Result<usize, TimeTravelError> {
        let session = self.find(id)?;
        Ok(self.controller(id)?.cursor(session))
    }

    pub fn seek(&mut self, id: Uuid, target: i64) -> Result<Arc<NetworkSnapshot>, TimeTravelError> {
        let (session, controller) = self.parts(id)?;
        Ok(controller.seek(session, target)?)
    }

    pub fn step(&mut self, id: Uuid, delta: i64) -> Result<Arc<NetworkSnapshot>, TimeTravelError> {
        let (session, controller) = self.parts(id)?;
        Ok(controller.step(session, delta)?)
    }

    /// Start playback, returning the delay between paced steps.
    pub fn play(&mut self, id: Uuid, speed: f64) -> Result<Duration, TimeTravelError> {
        let (session, controller) = self.parts(id)?;
        Ok(controller.play(session, speed)?)
    }

    pub fn pause(&mut self, id: Uuid) -> Result<(), TimeTravelError> {
        self.controller_mut(id)?.pause();
        Ok(())
    }

    pub fn is_playing(&self, id: Uuid) -> Result<bool, TimeTravelError> {
        Ok(self.controller(id)?.is_playing())
    }

    /// Advance playback by one frame. `None` once paused or at the end.
    pub fn advance_playback(
        &mut self,
        id: Uuid,
    ) -> Result<Option<Arc<NetworkSnapshot>>, TimeTravelError> {
        let (session, controller) = self.parts(id)?;
        Ok(controller.advance_playback(session)?)
    }

    pub fn bookmark(&mut self, id: Uuid, name: impl Into<String>) -> Result<Bookmark, TimeTravelError> {
        let controller = self
            .cursors
            .get(&id)
            .ok_or(TimeTravelError::UnknownSession(id))?;
        let session = self
            .recorder
            .session_mut(id)
            .ok_or(TimeTravelError::UnknownSession(id))?;
        Ok(controller.bookmark(session, name)?)
    }

    pub fn jump_to_bookmark(
        &mut self,
        id: Uuid,
        name: &str,
    ) -> Result<Arc<NetworkSnapshot>, TimeTravelError> {
        let (session, controller) = self.parts(id)?;
        Ok(controller.jump_to_bookmark(session, name)?)
    }

    /// Package a session for storage.
    pub fn export(&self, id: Uuid) -> Result<SessionArchive, TimeTravelError> {
        Ok(SessionArchive::new(self.find(id)?.clone()))
    }

    /// Load an archived session for replay. It is never recording.
    pub fn import(&mut self, archive: SessionArchive) -> Uuid {
        let id = self.recorder.import(archive.into_session());
        self.cursors.insert(id, ReplayController::new());
        id
    }

    fn find(&self, id: Uuid) -> Result<&RecordingSession, TimeTravelError> {
        self.recorder
            .session(id)
            .ok_or(TimeTravelError::UnknownSession(id))
    }

    fn controller(&self, id: Uuid) -> Result<&ReplayController, TimeTravelError> {
        self.cursors
            .get(&id)
            .ok_or(TimeTravelError::UnknownSession(id))
    }

    fn controller_mut(&mut self, id: Uuid) -> Result<&mut ReplayController, TimeTravelError> {
        self.cursors
            .get_mut(&id)
            .ok_or(TimeTravelError::UnknownSession(id))
    }

    fn parts(
        &mut self,
        id: Uuid,
    ) -> Result<(&RecordingSession, &mut ReplayController), TimeTravelError> {
        let session = self
            .recorder
            .session(id)
            .ok_or(TimeTravelError::UnknownSession(id))?;
        let controller = self
            .cursors
            .get_mut(&id)
            .ok_or(TimeTravelError::UnknownSession(id))?;
        Ok((session, controller))
    }
}
