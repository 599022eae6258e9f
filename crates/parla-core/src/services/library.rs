//! Shared library service wrapper used by UI clients.
//!
//! Every call resolves the local store through the initializer, so the first
//! caller pays for the open and everyone else reuses the same handle.
//! Nothing is cached across calls; reads always re-query the store.

use std::sync::Arc;

use crate::db::{
    AudioFileRepository, FolderRepository, LibSqlAudioFileRepository, LibSqlFolderRepository,
    LibSqlRecordingRepository, RecordingRepository, StoreBackend, StoreInit,
};
use crate::models::{
    AudioFile, AudioFileId, Folder, FolderId, NewAudioFile, Recording, RecordingId,
};
use crate::Result;

/// Thread-safe facade over the local store and entity repositories.
#[derive(Clone)]
pub struct LibraryService {
    init: Arc<StoreInit>,
}

impl LibraryService {
    /// Create a service over the given backend; the store opens lazily on
    /// first use
    #[must_use]
    pub fn new(backend: StoreBackend) -> Self {
        Self {
            init: Arc::new(StoreInit::new(backend)),
        }
    }

    /// Create a service sharing an existing initializer (e.g. with the sync
    /// engine)
    #[must_use]
    pub const fn with_init(init: Arc<StoreInit>) -> Self {
        Self { init }
    }

    /// The shared store initializer
    #[must_use]
    pub fn init(&self) -> Arc<StoreInit> {
        Arc::clone(&self.init)
    }

    /// Create a folder under `parent_id` (`None` = root level)
    pub async fn create_folder(
        &self,
        user_id: &str,
        parent_id: Option<&FolderId>,
        name: &str,
    ) -> Result<Folder> {
        let store = self.init.open().await?;
        LibSqlFolderRepository::new(&store)
            .create(user_id, parent_id, name)
            .await
    }

    /// List a folder's direct children, name ascending
    pub async fn list_folders(
        &self,
        user_id: &str,
        parent_id: Option<&FolderId>,
    ) -> Result<Vec<Folder>> {
        let store = self.init.open().await?;
        LibSqlFolderRepository::new(&store)
            .list_children(user_id, parent_id)
            .await
    }

    /// Delete a folder and its descendants, orphaning contained files
    pub async fn delete_folder(&self, id: &FolderId) -> Result<()> {
        let store = self.init.open().await?;
        LibSqlFolderRepository::new(&store).delete(id).await
    }

    /// Create an audio file row for an imported blob
    pub async fn create_audio_file(
        &self,
        user_id: &str,
        folder_id: Option<&FolderId>,
        new: NewAudioFile,
    ) -> Result<AudioFile> {
        let store = self.init.open().await?;
        LibSqlAudioFileRepository::new(&store)
            .create(user_id, folder_id, new)
            .await
    }

    /// List files in a folder (unfiled for `None`), title ascending
    pub async fn list_audio_files(
        &self,
        user_id: &str,
        folder_id: Option<&FolderId>,
    ) -> Result<Vec<AudioFile>> {
        let store = self.init.open().await?;
        LibSqlAudioFileRepository::new(&store)
            .list_by_folder(user_id, folder_id)
            .await
    }

    /// Delete an audio file row
    pub async fn delete_audio_file(&self, id: &AudioFileId) -> Result<()> {
        let store = self.init.open().await?;
        LibSqlAudioFileRepository::new(&store).delete(id).await
    }

    /// Create a recording row for a freshly captured blob
    pub async fn create_recording(
        &self,
        user_id: &str,
        card_id: &str,
        file_path: &str,
        duration_secs: i64,
    ) -> Result<Recording> {
        let store = self.init.open().await?;
        LibSqlRecordingRepository::new(&store)
            .create(user_id, card_id, file_path, duration_secs)
            .await
    }

    /// List recordings for a card (all of the user's for `None`), newest
    /// first
    pub async fn list_recordings(
        &self,
        user_id: &str,
        card_id: Option<&str>,
    ) -> Result<Vec<Recording>> {
        let store = self.init.open().await?;
        LibSqlRecordingRepository::new(&store)
            .list_by_card(user_id, card_id)
            .await
    }

    /// Delete a recording row
    pub async fn delete_recording(&self, id: &RecordingId) -> Result<()> {
        let store = self.init.open().await?;
        LibSqlRecordingRepository::new(&store).delete(id).await
    }

    /// Count of rows still pending upload, for UI badges
    pub async fn pending_upload_count(&self, user_id: &str) -> Result<usize> {
        let store = self.init.open().await?;
        let files = LibSqlAudioFileRepository::new(&store)
            .list_unsynced(user_id)
            .await?;
        let recordings = LibSqlRecordingRepository::new(&store)
            .list_unsynced(user_id)
            .await?;
        Ok(files.len() + recordings.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn service() -> LibraryService {
        LibraryService::new(StoreBackend::InMemory)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_folder_and_file_lifecycle() {
        let service = service();

        let folder = service.create_folder("user-1", None, "spanish").await.unwrap();
        let file = service
            .create_audio_file(
                "user-1",
                Some(&folder.id),
                NewAudioFile {
                    title: "Lesson 1".to_string(),
                    duration_secs: 30,
                    file_path: "/audio/l1.mp3".to_string(),
                    original_filename: "l1.mp3".to_string(),
                    mime_type: "audio/mpeg".to_string(),
                    size_bytes: 64_000,
                    ..NewAudioFile::default()
                },
            )
            .await
            .unwrap();

        let files = service
            .list_audio_files("user-1", Some(&folder.id))
            .await
            .unwrap();
        assert_eq!(files, vec![file.clone()]);

        service.delete_folder(&folder.id).await.unwrap();
        let unfiled = service.list_audio_files("user-1", None).await.unwrap();
        assert_eq!(unfiled.len(), 1);
        assert_eq!(unfiled[0].id, file.id);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pending_upload_count() {
        let service = service();

        service
            .create_recording("user-1", "card-1", "/rec/a.wav", 2)
            .await
            .unwrap();
        service
            .create_recording("user-1", "card-2", "/rec/b.wav", 2)
            .await
            .unwrap();

        assert_eq!(service.pending_upload_count("user-1").await.unwrap(), 2);
        assert_eq!(service.pending_upload_count("user-2").await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unsupported_backend_reads_are_empty() {
        let service = LibraryService::new(StoreBackend::Unsupported);

        assert!(service.list_folders("user-1", None).await.unwrap().is_empty());
        assert_eq!(service.pending_upload_count("user-1").await.unwrap(), 0);

        let err = service
            .create_folder("user-1", None, "spanish")
            .await
            .unwrap_err();
        assert!(matches!(err, crate::Error::UnsupportedOnPlatform));
    }
}
