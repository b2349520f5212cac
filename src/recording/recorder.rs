use crate::recording::error::RecorderError;
use crate::recording::session::{CaptureReport, RecordingOptions, RecordingSession};
use crate::snapshot::CaptureFrame;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Owns every recording session and is the only writer to their buffers.
///
/// # Example
///
/// ```rust
/// use aetherium::recording::{Recorder, RecordingOptions};
/// use aetherium::snapshot::CaptureFrame;
///
/// let mut recorder = Recorder::new();
/// let id = recorder.start(RecordingOptions::default()).unwrap();
///
/// let report = recorder.capture(id, CaptureFrame::default()).unwrap();
/// assert_eq!(report.frame_number, 1);
///
/// recorder.stop(id).unwrap();
/// assert!(recorder.capture(id, CaptureFrame::default()).is_err());
/// assert_eq!(recorder.session(id).unwrap().len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct Recorder {
    sessions: BTreeMap<Uuid, RecordingSession>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new session in the recording state.
    pub fn start(&mut self, options: RecordingOptions) -> Result<Uuid, RecorderError> {
        if options.max_snapshots == 0 {
            return Err(RecorderError::InvalidOptions(
                "max_snapshots must be at least 1".into(),
            ));
        }
        if options.capture_interval.is_zero() {
            return Err(RecorderError::InvalidOptions(
                "capture_interval must be positive".into(),
            ));
        }

        let session = RecordingSession::new(options);
        let id = session.id();
        tracing::info!(
            session = %id,
            max_snapshots = options.max_snapshots,
            interval = ?options.capture_interval,
            "recording started"
        );
        self.sessions.insert(id, session);
        Ok(id)
    }

    /// Stop capturing. The buffer stays available for replay.
    pub fn stop(&mut self, id: Uuid) -> Result<&RecordingSession, RecorderError> {
        let session = self.recording_mut(id)?;
        session.finish();
        tracing::info!(session = %id, frames = session.len(), "recording stopped");
        Ok(&*session)
    }

    /// Append one frame to a recording session.
    pub fn capture(&mut self, id: Uuid, frame: CaptureFrame) -> Result<CaptureReport, RecorderError> {
        let session = self.recording_mut(id)?;
        let report = session.append(frame);

        if let Some(evicted) = report.evicted {
            if session.evicted() == 1 {
                tracing::warn!(
                    session = %id,
                    max_snapshots = session.max_snapshots(),
                    "snapshot buffer full, evicting oldest frames"
                );
            }
            tracing::debug!(session = %id, frame = evicted, "frame evicted");
        }
        Ok(report)
    }

    pub fn session(&self, id: Uuid) -> Option<&RecordingSession> {
        self.sessions.get(&id)
    }

    pub fn session_mut(&mut self, id: Uuid) -> Option<&mut RecordingSession> {
        self.sessions.get_mut(&id)
    }

    pub fn sessions(&self) -> impl Iterator<Item = &RecordingSession> {
        self.sessions.values()
    }

    /// Adopt a session recorded elsewhere, e.g. one read from an archive.
    ///
    /// Imported sessions are never recording.
    pub fn import(&mut self, mut session: RecordingSession) -> Uuid {
        if session.is_recording() {
            session.finish();
        }
        let id = session.id();
        self.sessions.insert(id, session);
        id
    }

    pub fn remove(&mut self, id: Uuid) -> Option<RecordingSession> {
        self.sessions.remove(&id)
    }

    fn recording_mut(&mut self, id: Uuid) -> Result<&mut RecordingSession, RecorderError> {
        let session = self
            .sessions
            .get_mut(&id)
            .ok_or(RecorderError::UnknownSession(id))?;
        if !session.is_recording() {
            return Err(RecorderError::NotRecording(id));
        }
        Ok(session)
    }
}
