//! Voice recording model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A unique identifier for a voice recording, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordingId(Uuid);

impl RecordingId {
    /// Create a new unique recording ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for RecordingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordingId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A voice recording attached to a flashcard
///
/// `(card_id, file_path)` is unique within a user: at most one local
/// recording per path per card. Sync invariant mirrors [`super::AudioFile`]:
/// `synced == true` exactly when `remote_id` and `audio_url` are both set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recording {
    /// Unique identifier
    pub id: RecordingId,
    /// Owning end-user identity
    pub user_id: String,
    /// Flashcard this recording belongs to
    pub card_id: String,
    /// Local path to the recorded blob
    pub file_path: String,
    /// Duration in whole seconds
    pub duration_secs: i64,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Whether this row has been pushed to the remote store
    pub synced: bool,
    /// Remote identity, set only once synced
    pub remote_id: Option<String>,
    /// Remote audio URL, set only once synced
    pub audio_url: Option<String>,
    /// Number of permanently rejected upload attempts so far
    pub sync_attempts: i64,
    /// Last upload rejection message, kept for surfacing to the user
    pub last_sync_error: Option<String>,
}

impl Recording {
    /// Create a new, unsynced recording row
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        card_id: impl Into<String>,
        file_path: impl Into<String>,
        duration_secs: i64,
    ) -> Self {
        Self {
            id: RecordingId::new(),
            user_id: user_id.into(),
            card_id: card_id.into(),
            file_path: file_path.into(),
            duration_secs,
            created_at: chrono::Utc::now().timestamp_millis(),
            synced: false,
            remote_id: None,
            audio_url: None,
            sync_attempts: 0,
            last_sync_error: None,
        }
    }

    /// Whether the sync metadata is internally consistent
    #[must_use]
    pub const fn sync_metadata_consistent(&self) -> bool {
        match (self.synced, &self.remote_id, &self.audio_url) {
            (true, Some(_), Some(_)) | (false, None, None) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_recording_starts_unsynced() {
        let recording = Recording::new("user-1", "card-7", "/data/rec/c7.wav", 3);
        assert!(!recording.synced);
        assert!(recording.remote_id.is_none());
        assert!(recording.audio_url.is_none());
        assert!(recording.sync_metadata_consistent());
    }

    #[test]
    fn test_recording_id_parse() {
        let id = RecordingId::new();
        let parsed: RecordingId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }
}
