//! Audio file model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::FolderId;

/// A unique identifier for an audio file, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioFileId(Uuid);

impl AudioFileId {
    /// Create a new unique audio file ID using UUID v7
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

impl Default for AudioFileId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AudioFileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AudioFileId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Descriptive metadata for a freshly imported audio file
///
/// Everything except `title`, `file_path`, `original_filename`, `mime_type`
/// and `size_bytes` is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAudioFile {
    pub title: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub year: Option<i64>,
    /// Duration in whole seconds, never negative
    pub duration_secs: i64,
    /// Local path to the media blob, unique per device
    pub file_path: String,
    pub original_filename: String,
    pub mime_type: String,
    pub size_bytes: i64,
}

/// A locally stored audio file, possibly not yet pushed to the remote store
///
/// Sync invariant: `synced == true` exactly when both `remote_id` and
/// `remote_url` are set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFile {
    /// Unique identifier
    pub id: AudioFileId,
    /// Owning end-user identity
    pub user_id: String,
    /// Containing folder; `None` for unfiled (or orphaned) files
    pub folder_id: Option<FolderId>,
    pub title: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub year: Option<i64>,
    /// Duration in whole seconds
    pub duration_secs: i64,
    /// Local path to the media blob
    pub file_path: String,
    pub original_filename: String,
    pub mime_type: String,
    pub size_bytes: i64,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
    /// Whether this row has been pushed to the remote store
    pub synced: bool,
    /// Remote identity, set only once synced
    pub remote_id: Option<String>,
    /// Remote media URL, set only once synced
    pub remote_url: Option<String>,
    /// Number of permanently rejected upload attempts so far
    pub sync_attempts: i64,
    /// Last upload rejection message, kept for surfacing to the user
    pub last_sync_error: Option<String>,
}

impl AudioFile {
    /// Create a new, unsynced audio file row
    #[must_use]
    pub fn new(user_id: impl Into<String>, folder_id: Option<FolderId>, new: NewAudioFile) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: AudioFileId::new(),
            user_id: user_id.into(),
            folder_id,
            title: new.title,
            artist: new.artist,
            album: new.album,
            genre: new.genre,
            year: new.year,
            duration_secs: new.duration_secs,
            file_path: new.file_path,
            original_filename: new.original_filename,
            mime_type: new.mime_type,
            size_bytes: new.size_bytes,
            created_at: now,
            updated_at: now,
            synced: false,
            remote_id: None,
            remote_url: None,
            sync_attempts: 0,
            last_sync_error: None,
        }
    }

    /// Whether the sync metadata is internally consistent
    #[must_use]
    pub const fn sync_metadata_consistent(&self) -> bool {
        match (self.synced, &self.remote_id, &self.remote_url) {
            (true, Some(_), Some(_)) | (false, None, None) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NewAudioFile {
        NewAudioFile {
            title: "La casa".to_string(),
            artist: Some("Profesora Ana".to_string()),
            duration_secs: 42,
            file_path: "/data/audio/la-casa.mp3".to_string(),
            original_filename: "la-casa.mp3".to_string(),
            mime_type: "audio/mpeg".to_string(),
            size_bytes: 120_000,
            ..NewAudioFile::default()
        }
    }

    #[test]
    fn test_new_file_starts_unsynced() {
        let file = AudioFile::new("user-1", None, sample());
        assert!(!file.synced);
        assert!(file.remote_id.is_none());
        assert!(file.remote_url.is_none());
        assert_eq!(file.sync_attempts, 0);
        assert!(file.sync_metadata_consistent());
    }

    #[test]
    fn test_sync_metadata_consistency() {
        let mut file = AudioFile::new("user-1", None, sample());
        file.synced = true;
        assert!(!file.sync_metadata_consistent());

        file.remote_id = Some("rem-1".to_string());
        file.remote_url = Some("https://media.example.com/rem-1".to_string());
        assert!(file.sync_metadata_consistent());
    }
}
