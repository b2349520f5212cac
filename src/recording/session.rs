//! Recording sessions and their options.

use crate::recording::buffer::SnapshotRing;
use crate::snapshot::{CaptureFrame, NetworkSnapshot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// How often to capture and how much history to keep.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordingOptions {
    pub capture_interval: Duration,
    pub max_snapshots: usize,
}

impl Default for RecordingOptions {
    fn default() -> Self {
        Self {
            capture_interval: Duration::from_millis(100),
            max_snapshots: 1000,
        }
    }
}

/// A named point in a recording, pinned to a global frame number.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    pub frame_number: u64,
    pub name: String,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of appending one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaptureReport {
    pub frame_number: u64,
    /// Frame number dropped from the front to stay within `max_snapshots`.
    pub evicted: Option<u64>,
}

/// Ordered history of captured frames plus bookmarks.
///
/// Stopping a session ends capture but keeps the buffer for replay.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSession {
    id: Uuid,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    capture_interval: Duration,
    is_recording: bool,
    snapshots: SnapshotRing,
    bookmarks: Vec<Bookmark>,
    next_frame: u64,
}

impl RecordingSession {
    pub(crate) fn new(options: RecordingOptions) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            ended_at: None,
            capture_interval: options.capture_interval,
            is_recording: true,
            snapshots: SnapshotRing::with_capacity(options.max_snapshots),
            bookmarks: Vec::new(),
            next_frame: 1,
        }
    }

    /// Session id, unique across recorder and imports.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// When recording began.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// When recording was stopped. `None` while still recording.
    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Interval between timed captures. Playback paces from this.
    pub fn capture_interval(&self) -> Duration {
        self.capture_interval
    }

    /// Buffer capacity; older frames are evicted beyond it.
    pub fn max_snapshots(&self) -> usize {
        self.snapshots.capacity()
    }

    pub fn is_recording(&self) -> bool {
        self.is_recording
    }

    /// Number of frames currently retained.
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Frames dropped from the front so far.
    pub fn evicted(&self) -> u64 {
        self.snapshots.evicted()
    }

    /// Frame at a buffer index (0 is the oldest retained frame).
    pub fn frame(&self, index: usize) -> Option<&Arc<NetworkSnapshot>> {
        self.snapshots.get(index)
    }

    /// Retained frames, oldest first.
    pub fn frames(&self) -> impl Iterator<Item = &Arc<NetworkSnapshot>> {
        self.snapshots.iter()
    }

    /// Buffer index of the newest frame.
    pub fn last_index(&self) -> Option<usize> {
        self.len().checked_sub(1)
    }

    /// Buffer index of a global frame number, if still retained.
    pub fn index_of(&self, frame_number: u64) -> Option<usize> {
        self.snapshots.position_of(frame_number)
    }

    /// Bookmarks in creation order.
    pub fn bookmarks(&self) -> &[Bookmark] {
        &self.bookmarks
    }

    /// The most recent bookmark with this name.
    pub fn bookmark(&self, name: &str) -> Option<&Bookmark> {
        self.bookmarks.iter().rev().find(|b| b.name == name)
    }

    pub(crate) fn append(&mut self, frame: CaptureFrame) -> CaptureReport {
        let frame_number = self.next_frame;
        self.next_frame += 1;

        let snapshot = NetworkSnapshot::from_capture(frame_number, Utc::now(), frame);
        let evicted = self
            .snapshots
            .push(Arc::new(snapshot))
            .map(|old| old.frame_number);

        CaptureReport {
            frame_number,
            evicted,
        }
    }

    pub(crate) fn finish(&mut self) {
        self.is_recording = false;
        self.ended_at = Some(Utc::now());
    }

    pub(crate) fn add_bookmark(&mut self, bookmark: Bookmark) {
        self.bookmarks.push(bookmark);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_numbers_are_monotonic_from_one() {
        let mut session = RecordingSession::new(RecordingOptions {
            capture_interval: Duration::from_millis(50),
            max_snapshots: 2,
        });

        let reports: Vec<_> = (0..3)
            .map(|_| session.append(CaptureFrame::default()))
            .collect();

        assert_eq!(reports[0].frame_number, 1);
        assert_eq!(reports[2].frame_number, 3);
        assert_eq!(reports[2].evicted, Some(1));
        assert_eq!(session.frame(0).unwrap().frame_number, 2);
        assert_eq!(session.capture_interval(), Duration::from_millis(50));
    }

    #[test]
    fn sub_millisecond_interval_is_kept_exactly() {
        let session = RecordingSession::new(RecordingOptions {
            capture_interval: Duration::from_micros(500),
            max_snapshots: 4,
        });

        assert_eq!(session.capture_interval(), Duration::from_micros(500));

        let json = serde_json::to_string(&session).unwrap();
        let restored: RecordingSession = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.capture_interval(), Duration::from_micros(500));
    }

    #[test]
    fn finish_keeps_buffer() {
        let mut session = RecordingSession::new(RecordingOptions::default());
        session.append(CaptureFrame::default());
        session.finish();

        assert!(!session.is_recording());
        assert!(session.ended_at().is_some());
        assert_eq!(session.len(), 1);
    }

    #[test]
    fn latest_bookmark_with_name_wins() {
        let mut session = RecordingSession::new(RecordingOptions::default());
        for frame_number in [1, 4] {
            session.add_bookmark(Bookmark {
                frame_number,
                name: "spike".into(),
                timestamp: Utc::now(),
            });
        }

        assert_eq!(session.bookmark("spike").unwrap().frame_number, 4);
        assert!(session.bookmark("other").is_none());
    }
}
