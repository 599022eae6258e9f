//! Voice recording repository implementation

use async_trait::async_trait;
use libsql::params;

use crate::error::{Error, Result};
use crate::models::{Recording, RecordingId};

use super::store::LocalStore;
use super::MAX_SYNC_ATTEMPTS;

const SELECT_COLUMNS: &str = "id, user_id, card_id, file_path, duration_secs, created_at, \
     synced, remote_id, audio_url, sync_attempts, last_sync_error";

/// Trait for voice recording storage operations
#[async_trait]
pub trait RecordingRepository {
    /// Create a new, unsynced recording row
    async fn create(
        &self,
        user_id: &str,
        card_id: &str,
        file_path: &str,
        duration_secs: i64,
    ) -> Result<Recording>;

    /// Get a recording by ID
    async fn get(&self, id: &RecordingId) -> Result<Option<Recording>>;

    /// List recordings for a card (all of the user's recordings for `None`),
    /// newest first
    async fn list_by_card(&self, user_id: &str, card_id: Option<&str>) -> Result<Vec<Recording>>;

    /// Remove a recording row by id, regardless of sync state
    async fn delete(&self, id: &RecordingId) -> Result<()>;

    /// Atomically stamp a row as synced with its remote identity; idempotent
    /// for identical identifiers
    async fn mark_synced(&self, id: &RecordingId, remote_id: &str, audio_url: &str) -> Result<()>;

    /// Enumerate rows pending upload, newest first, below the retry ceiling
    async fn list_unsynced(&self, user_id: &str) -> Result<Vec<Recording>>;

    /// Record a failed upload attempt; a permanent `rejection` keeps its
    /// message for the user and counts toward the retry ceiling, transient
    /// failures (`None`) do not
    async fn record_sync_failure(&self, id: &RecordingId, rejection: Option<&str>) -> Result<()>;
}

/// libSQL implementation of `RecordingRepository`
pub struct LibSqlRecordingRepository<'a> {
    store: &'a LocalStore,
}

impl<'a> LibSqlRecordingRepository<'a> {
    /// Create a new repository over the given local store
    pub const fn new(store: &'a LocalStore) -> Self {
        Self { store }
    }

    /// Parse a recording from a database row
    fn parse_recording(row: &libsql::Row) -> Result<Recording> {
        let id: String = row.get(0)?;
        Ok(Recording {
            id: id.parse().unwrap_or_default(),
            user_id: row.get(1)?,
            card_id: row.get(2)?,
            file_path: row.get(3)?,
            duration_secs: row.get(4)?,
            created_at: row.get(5)?,
            synced: row.get::<i32>(6)? != 0,
            remote_id: row.get(7)?,
            audio_url: row.get(8)?,
            sync_attempts: row.get(9)?,
            last_sync_error: row.get(10)?,
        })
    }
}

#[async_trait]
impl RecordingRepository for LibSqlRecordingRepository<'_> {
    async fn create(
        &self,
        user_id: &str,
        card_id: &str,
        file_path: &str,
        duration_secs: i64,
    ) -> Result<Recording> {
        let conn = self.store.connection()?;

        if card_id.trim().is_empty() {
            return Err(Error::InvalidInput("Recording card id cannot be empty".into()));
        }
        if file_path.trim().is_empty() {
            return Err(Error::InvalidInput(
                "Recording file path cannot be empty".into(),
            ));
        }
        if duration_secs < 0 {
            return Err(Error::InvalidInput(
                "Recording duration cannot be negative".into(),
            ));
        }

        let recording = Recording::new(user_id, card_id, file_path, duration_secs);

        conn.execute(
            "INSERT INTO recordings (
                id, user_id, card_id, file_path, duration_secs, created_at,
                synced, remote_id, audio_url, sync_attempts, last_sync_error
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, NULL, NULL, 0, NULL)",
            params![
                recording.id.as_str(),
                recording.user_id.clone(),
                recording.card_id.clone(),
                recording.file_path.clone(),
                recording.duration_secs,
                recording.created_at
            ],
        )
        .await
        .map_err(|e| Error::from_insert(e, "recording path for card"))?;

        Ok(recording)
    }

    async fn get(&self, id: &RecordingId) -> Result<Option<Recording>> {
        let Some(conn) = self.store.read_connection() else {
            return Ok(None);
        };

        let mut rows = conn
            .query(
                &format!("SELECT {SELECT_COLUMNS} FROM recordings WHERE id = ?1"),
                params![id.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_recording(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_by_card(&self, user_id: &str, card_id: Option<&str>) -> Result<Vec<Recording>> {
        let Some(conn) = self.store.read_connection() else {
            return Ok(Vec::new());
        };

        let mut rows = conn
            .query(
                &format!(
                    "SELECT {SELECT_COLUMNS} FROM recordings
                     WHERE user_id = ?1 AND (?2 IS NULL OR card_id = ?2)
                     ORDER BY created_at DESC"
                ),
                params![user_id, card_id],
            )
            .await?;

        let mut recordings = Vec::new();
        while let Some(row) = rows.next().await? {
            recordings.push(Self::parse_recording(&row)?);
        }
        Ok(recordings)
    }

    async fn delete(&self, id: &RecordingId) -> Result<()> {
        let conn = self.store.connection()?;

        let deleted = conn
            .execute("DELETE FROM recordings WHERE id = ?1", params![id.as_str()])
            .await?;

        if deleted == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn mark_synced(&self, id: &RecordingId, remote_id: &str, audio_url: &str) -> Result<()> {
        let conn = self.store.connection()?;

        let updated = conn
            .execute(
                "UPDATE recordings
                 SET synced = 1, remote_id = ?2, audio_url = ?3, last_sync_error = NULL
                 WHERE id = ?1
                   AND (synced = 0 OR remote_id IS NOT ?2 OR audio_url IS NOT ?3)",
                params![id.as_str(), remote_id, audio_url],
            )
            .await?;

        if updated == 0 && self.get(id).await?.is_none() {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn list_unsynced(&self, user_id: &str) -> Result<Vec<Recording>> {
        let Some(conn) = self.store.read_connection() else {
            return Ok(Vec::new());
        };

        let mut rows = conn
            .query(
                &format!(
                    "SELECT {SELECT_COLUMNS} FROM recordings
                     WHERE user_id = ?1 AND synced = 0 AND sync_attempts < ?2
                     ORDER BY created_at DESC"
                ),
                params![user_id, MAX_SYNC_ATTEMPTS],
            )
            .await?;

        let mut recordings = Vec::new();
        while let Some(row) = rows.next().await? {
            recordings.push(Self::parse_recording(&row)?);
        }
        Ok(recordings)
    }

    async fn record_sync_failure(&self, id: &RecordingId, rejection: Option<&str>) -> Result<()> {
        let conn = self.store.connection()?;

        // Only rejections consume the ceiling; a flaky network must not
        // strand a row that would upload fine later
        let updated = conn
            .execute(
                "UPDATE recordings
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
