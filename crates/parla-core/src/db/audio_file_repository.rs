//! Audio file repository implementation

use async_trait::async_trait;
use libsql::params;

use crate::error::{Error, Result};
use crate::models::{AudioFile, AudioFileId, FolderId, NewAudioFile};

use super::store::LocalStore;
use super::MAX_SYNC_ATTEMPTS;

const SELECT_COLUMNS: &str = "id, user_id, folder_id, title, artist, album, genre, year, \
     duration_secs, file_path, original_filename, mime_type, size_bytes, \
     created_at, updated_at, synced, remote_id, remote_url, sync_attempts, last_sync_error";

/// Trait for audio file storage operations
#[async_trait]
pub trait AudioFileRepository {
    /// Create a new, unsynced audio file row
    async fn create(
        &self,
        user_id: &str,
        folder_id: Option<&FolderId>,
        new: NewAudioFile,
    ) -> Result<AudioFile>;

    /// Get an audio file by ID
    async fn get(&self, id: &AudioFileId) -> Result<Option<AudioFile>>;

    /// List files in a folder (unfiled for `None`), title ascending
    async fn list_by_folder(
        &self,
        user_id: &str,
        folder_id: Option<&FolderId>,
    ) -> Result<Vec<AudioFile>>;

    /// Remove a file row by id, regardless of sync state
    async fn delete(&self, id: &AudioFileId) -> Result<()>;

    /// Atomically stamp a row as synced with its remote identity.
    ///
    /// Idempotent: re-stamping with identical identifiers leaves the row
    /// untouched (including `updated_at`).
    async fn mark_synced(&self, id: &AudioFileId, remote_id: &str, remote_url: &str)
        -> Result<()>;

    /// Enumerate rows pending upload, title ascending.
    ///
    /// Rows rejected up to the retry ceiling are excluded; they stay visible
    /// to the UI through `last_sync_error` instead of being retried forever.
    /// Transient failures never count against the ceiling.
    async fn list_unsynced(&self, user_id: &str) -> Result<Vec<AudioFile>>;

    /// Record a failed upload attempt.
    ///
    /// A permanent `rejection` keeps its message for surfacing to the user
    /// and counts toward the retry ceiling; transient failures (`None`) are
    /// always retried on the next trigger.
    async fn record_sync_failure(
        &self,
        id: &AudioFileId,
        rejection: Option<&str>,
    ) -> Result<()>;
}

/// libSQL implementation of `AudioFileRepository`
pub struct LibSqlAudioFileRepository<'a> {
    store: &'a LocalStore,
}

impl<'a> LibSqlAudioFileRepository<'a> {
    /// Create a new repository over the given local store
    pub const fn new(store: &'a LocalStore) -> Self {
        Self { store }
    }

    /// Parse an audio file from a database row
    fn parse_file(row: &libsql::Row) -> Result<AudioFile> {
        let id: String = row.get(0)?;
        let folder: Option<String> = row.get(2)?;
        Ok(AudioFile {
            id: id.parse().unwrap_or_default(),
            user_id: row.get(1)?,
            folder_id: folder.and_then(|f| f.parse().ok()),
            title: row.get(3)?,
            artist: row.get(4)?,
            album: row.get(5)?,
            genre: row.get(6)?,
            year: row.get(7)?,
            duration_secs: row.get(8)?,
            file_path: row.get(9)?,
            original_filename: row.get(10)?,
            mime_type: row.get(11)?,
            size_bytes: row.get(12)?,
            created_at: row.get(13)?,
            updated_at: row.get(14)?,
            synced: row.get::<i32>(15)? != 0,
            remote_id: row.get(16)?,
            remote_url: row.get(17)?,
            sync_attempts: row.get(18)?,
            last_sync_error: row.get(19)?,
        })
    }

    fn validate(new: &NewAudioFile) -> Result<()> {
        if new.title.trim().is_empty() {
            return Err(Error::InvalidInput("Audio file title cannot be empty".into()));
        }
        if new.file_path.trim().is_empty() {
            return Err(Error::InvalidInput("Audio file path cannot be empty".into()));
        }
        if new.duration_secs < 0 {
            return Err(Error::InvalidInput(
                "Audio file duration cannot be negative".into(),
            ));
        }
        if new.size_bytes < 0 {
            return Err(Error::InvalidInput(
                "Audio file size cannot be negative".into(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl AudioFileRepository for LibSqlAudioFileRepository<'_> {
    async fn create(
        &self,
        user_id: &str,
        folder_id: Option<&FolderId>,
        new: NewAudioFile,
    ) -> Result<AudioFile> {
        let conn = self.store.connection()?;
        Self::validate(&new)?;

        let file = AudioFile::new(user_id, folder_id.copied(), new);

        conn.execute(
            "INSERT INTO audio_files (
                id, user_id, folder_id, title, artist, album, genre, year,
                duration_secs, file_path, original_filename, mime_type, size_bytes,
                created_at, updated_at, synced, remote_id, remote_url,
                sync_attempts, last_sync_error
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, 0, NULL, NULL, 0, NULL)",
            params![
                file.id.as_str(),
                file.user_id.clone(),
                file.folder_id.map(|f| f.as_str()),
                file.title.clone(),
                file.artist.clone(),
                file.album.clone(),
                file.genre.clone(),
                file.year,
                file.duration_secs,
                file.file_path.clone(),
                file.original_filename.clone(),
                file.mime_type.clone(),
                file.size_bytes,
                file.created_at,
                file.updated_at
            ],
        )
        .await
        .map_err(|e| Error::from_insert(e, "audio file path"))?;

        Ok(file)
    }

    async fn get(&self, id: &AudioFileId) -> Result<Option<AudioFile>> {
        let Some(conn) = self.store.read_connection() else {
            return Ok(None);
        };

        let mut rows = conn
            .query(
                &format!("SELECT {SELECT_COLUMNS} FROM audio_files WHERE id = ?1"),
                params![id.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_file(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_by_folder(
        &self,
        user_id: &str,
        folder_id: Option<&FolderId>,
    ) -> Result<Vec<AudioFile>> {
        let Some(conn) = self.store.read_connection() else {
            return Ok(Vec::new());
        };

        let mut rows = conn
            .query(
                &format!(
                    "SELECT {SELECT_COLUMNS} FROM audio_files
                     WHERE user_id = ?1 AND folder_id IS ?2
                     ORDER BY title ASC"
                ),
                params![user_id, folder_id.map(FolderId::as_str)],
            )
            .await?;

        let mut files = Vec::new();
        while let Some(row) = rows.next().await? {
            files.push(Self::parse_file(&row)?);
        }
        Ok(files)
    }

    async fn delete(&self, id: &AudioFileId) -> Result<()> {
        let conn = self.store.connection()?;

        let deleted = conn
            .execute(
                "DELETE FROM audio_files WHERE id = ?1",
                params![id.as_str()],
            )
            .await?;

        if deleted == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn mark_synced(
        &self,
        id: &AudioFileId,
        remote_id: &str,
        remote_url: &str,
    ) -> Result<()> {
        let conn = self.store.connection()?;
        let now = chrono::Utc::now().timestamp_millis();

        // No-op when the row already carries these exact identifiers
        let updated = conn
            .execute(
                "UPDATE audio_files
                 SET synced = 1, remote_id = ?2, remote_url = ?3,
                     last_sync_error = NULL, updated_at = ?4
                 WHERE id = ?1
                   AND (synced = 0 OR remote_id IS NOT ?2 OR remote_url IS NOT ?3)",
                params![id.as_str(), remote_id, remote_url, now],
            )
            .await?;

        if updated == 0 && self.get(id).await?.is_none() {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn list_unsynced(&self, user_id: &str) -> Result<Vec<AudioFile>> {
        let Some(conn) = self.store.read_connection() else {
            return Ok(Vec::new());
        };

        let mut rows = conn
            .query(
                &format!(
                    "SELECT {SELECT_COLUMNS} FROM audio_files
                     WHERE user_id = ?1 AND synced = 0 AND sync_attempts < ?2
                     ORDER BY title ASC"
                ),
                params![user_id, MAX_SYNC_ATTEMPTS],
            )
            .await?;

        let mut files = Vec::new();
        while let Some(row) = rows.next().await? {
            files.push(Self::parse_file(&row)?);
        }
        Ok(files)
    }

    async fn record_sync_failure(
        &self,
        id: &AudioFileId,
        rejection: Option<&str>,
    ) -> Result<()> {
        let conn = self.store.connection()?;

        // Only rejections consume the ceiling; a flaky network must not
        // strand a row that would upload fine later
        let updated = conn
            .execute(
                "UPDATE audio_files
                 SET sync_attempts = sync_attempts + (?2 IS NOT NULL),
                     last_sync_error = COALESCE(?2, last_sync_error)
                 WHERE id = ?1",
                params![id.as_str(), rejection],
            )
            .await?;

        if updated == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }
}
