//! Push-only synchronization engine.
//!
//! Enumerates locally created, unsynced rows and pushes each blob to the
//! remote store, stamping rows with their remote identity on success. One
//! row's failure never aborts the pass; failures are aggregated into the
//! [`SyncReport`] and retried on a later trigger. At most one pass runs per
//! user at a time; extra triggers are coalesced.

mod remote;

pub use remote::{HttpRemoteStore, MediaKind, RemoteObject, RemoteStore, UploadMetadata};

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::timeout;

use crate::connectivity::ConnectivityMonitor;
use crate::db::{
    AudioFileRepository, LibSqlAudioFileRepository, LibSqlRecordingRepository, RecordingRepository,
    StoreInit,
};
use crate::error::{Error, Result};
use crate::media::guess_mime_type;
use crate::models::{AudioFile, Recording};

/// Default per-row upload deadline; a stuck upload must not stall the pass
const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Which entity a per-row sync failure belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEntity {
    AudioFile(String),
    Recording(String),
}

/// One row that could not be pushed during a pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncFailure {
    pub entity: SyncEntity,
    pub error: String,
    /// Whether the next trigger will retry this row
    pub retryable: bool,
}

/// Outcome of one `sync_all` pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub user_id: String,
    /// Rows stamped synced during this pass
    pub uploaded: usize,
    pub failed: Vec<SyncFailure>,
}

impl SyncReport {
    /// Whether every enumerated row was pushed
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Result of requesting a sync pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// A full pass ran to completion (possibly with per-row failures)
    Completed(SyncReport),
    /// A pass for this user was already in flight; the trigger was dropped
    AlreadyRunning,
}

/// Removes the user from the in-flight set when the pass ends, even on
/// cancellation
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<String>>,
    user_id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&self.user_id);
    }
}

/// Push-only sync orchestrator over the local store and a remote store
pub struct SyncEngine<R> {
    init: Arc<StoreInit>,
    remote: R,
    upload_timeout: Duration,
    in_flight: Mutex<HashSet<String>>,
}

impl<R: RemoteStore> SyncEngine<R> {
    /// Create an engine over the given store initializer and remote store
    pub fn new(init: Arc<StoreInit>, remote: R) -> Self {
        Self {
            init,
            remote,
            upload_timeout: DEFAULT_UPLOAD_TIMEOUT,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Override the per-row upload deadline
    #[must_use]
    pub const fn with_upload_timeout(mut self, upload_timeout: Duration) -> Self {
        self.upload_timeout = upload_timeout;
        self
    }

    /// Push every unsynced row belonging to `user_id` to the remote store.
    ///
    /// Re-running after a fully successful pass is a no-op; after a partial
    /// failure it retries exactly the rows still marked unsynced. Rows
    /// created mid-pass are picked up by the next trigger, not this one.
    pub async fn sync_all(&self, user_id: &str) -> Result<SyncOutcome> {
        let _guard = {
            let mut in_flight = self
                .in_flight
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if !in_flight.insert(user_id.to_string()) {
                tracing::debug!("Sync already in flight for {user_id}; trigger coalesced");
                return Ok(SyncOutcome::AlreadyRunning);
            }
            InFlightGuard {
                set: &self.in_flight,
                user_id: user_id.to_string(),
            }
        };

        let store = self.init.open().await?;
        let mut report = SyncReport {
            user_id: user_id.to_string(),
            uploaded: 0,
            failed: Vec::new(),
        };

        let files = LibSqlAudioFileRepository::new(&store);
        for file in files.list_unsynced(user_id).await? {
            self.push_audio_file(&files, &file, &mut report).await?;
        }

        let recordings = LibSqlRecordingRepository::new(&store);
        for recording in recordings.list_unsynced(user_id).await? {
            self.push_recording(&recordings, &recording, &mut report)
                .await?;
        }

        tracing::info!(
            "Sync pass for {user_id}: {} uploaded, {} failed",
            report.uploaded,
            report.failed.len()
        );
        Ok(SyncOutcome::Completed(report))
    }

    async fn push_audio_file(
        &self,
        repo: &LibSqlAudioFileRepository<'_>,
        file: &AudioFile,
        report: &mut SyncReport,
    ) -> Result<()> {
        let metadata = UploadMetadata {
            user_id: file.user_id.clone(),
            kind: MediaKind::AudioFile,
            title: file.title.clone(),
            original_filename: file.original_filename.clone(),
            mime_type: file.mime_type.clone(),
            duration_secs: file.duration_secs,
            card_id: None,
        };

        match self.push_blob(&file.file_path, &metadata).await {
            Ok(object) => {
                match repo
                    .mark_synced(&file.id, &object.remote_id, &object.remote_url)
                    .await
                {
                    Ok(()) => report.uploaded += 1,
                    // Deleted concurrently; the upload is moot but harmless
                    Err(Error::NotFound(id)) => {
                        tracing::warn!("Audio file {id} vanished before sync stamp");
                    }
                    Err(error) => return Err(error),
                }
            }
            Err(error) => {
                let retryable = error.is_retryable_upload();
                let message = error.to_string();
                tracing::warn!("Upload of audio file {} failed: {message}", file.id);
                let rejection = (!retryable).then_some(message.as_str());
                if let Err(Error::NotFound(id)) =
                    repo.record_sync_failure(&file.id, rejection).await
                {
                    tracing::warn!("Audio file {id} vanished before failure record");
                }
                report.failed.push(SyncFailure {
                    entity: SyncEntity::AudioFile(file.id.to_string()),
                    error: message,
                    retryable,
                });
            }
        }
        Ok(())
    }

    async fn push_recording(
        &self,
        repo: &LibSqlRecordingRepository<'_>,
        recording: &Recording,
        report: &mut SyncReport,
    ) -> Result<()> {
        let metadata = UploadMetadata {
            user_id: recording.user_id.clone(),
            kind: MediaKind::Recording,
            title: recording.card_id.clone(),
            original_filename: recording.file_path.clone(),
            mime_type: guess_mime_type(&recording.file_path).to_string(),
            duration_secs: recording.duration_secs,
            card_id: Some(recording.card_id.clone()),
        };

        match self.push_blob(&recording.file_path, &metadata).await {
            Ok(object) => {
                match repo
                    .mark_synced(&recording.id, &object.remote_id, &object.remote_url)
                    .await
                {
                    Ok(()) => report.uploaded += 1,
                    Err(Error::NotFound(id)) => {
                        tracing::warn!("Recording {id} vanished before sync stamp");
                    }
                    Err(error) => return Err(error),
                }
            }
            Err(error) => {
                let retryable = error.is_retryable_upload();
                let message = error.to_string();
                tracing::warn!("Upload of recording {} failed: {message}", recording.id);
                let rejection = (!retryable).then_some(message.as_str());
                if let Err(Error::NotFound(id)) =
                    repo.record_sync_failure(&recording.id, rejection).await
                {
                    tracing::warn!("Recording {id} vanished before failure record");
                }
                report.failed.push(SyncFailure {
                    entity: SyncEntity::Recording(recording.id.to_string()),
                    error: message,
                    retryable,
                });
            }
        }
        Ok(())
    }

    /// Read the local blob and upload it under the per-row deadline
    async fn push_blob(&self, file_path: &str, metadata: &UploadMetadata) -> Result<RemoteObject> {
        let bytes = tokio::fs::read(file_path).await.map_err(|error| {
            // A blob that cannot be read will not get better on retry
            Error::RemoteUploadRejected(format!("cannot read local blob {file_path}: {error}"))
        })?;

        match timeout(self.upload_timeout, self.remote.upload(metadata, &bytes)).await {
            Ok(result) => result,
            Err(_) => Err(Error::RemoteUploadFailed(format!(
                "upload timed out after {:?}",
                self.upload_timeout
            ))),
        }
    }
}

/// Spawn the long-lived task that triggers sync passes on connectivity
/// transitions.
///
/// `session` carries the currently authenticated user; transitions to online
/// (including the initial online state at startup) trigger a pass for that
/// user. Triggers arriving while a pass runs are coalesced by the engine.
pub fn spawn_auto_sync<R>(
    engine: Arc<SyncEngine<R>>,
    monitor: &ConnectivityMonitor,
    session: watch::Receiver<Option<String>>,
) -> tokio::task::JoinHandle<()>
where
    R: RemoteStore + 'static,
{
    let mut events = monitor.subscribe();
    tokio::spawn(async move {
        let mut was_online = false;
        while let Some(online) = events.next().await {
            let came_online = online && !was_online;
            was_online = online;
            if !came_online {
                continue;
            }

            let Some(user_id) = session.borrow().clone() else {
                tracing::debug!("Online transition with no authenticated user; skipping sync");
                continue;
            };

            match engine.sync_all(&user_id).await {
                Ok(SyncOutcome::Completed(report)) if report.is_clean() => {
                    tracing::debug!("Auto sync for {user_id}: {} uploaded", report.uploaded);
                }
                Ok(SyncOutcome::Completed(report)) => {
                    tracing::warn!(
                        "Auto sync for {user_id}: {} uploaded, {} failed",
                        report.uploaded,
                        report.failed.len()
                    );
                }
                Ok(SyncOutcome::AlreadyRunning) => {}
                Err(error) => {
                    // Local-only workflows keep working; just log and wait
                    // for the next transition
                    tracing::warn!("Auto sync for {user_id} failed: {error}");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{LocalStore, StoreBackend};
    use crate::models::NewAudioFile;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted remote store for engine tests
    #[derive(Default)]
    struct FakeRemote {
        uploads: AtomicUsize,
        /// titles that fail transiently, consumed on first attempt
        fail_once: Mutex<HashSet<String>>,
        /// titles that are permanently rejected
        reject: Mutex<HashSet<String>>,
        delay: Option<Duration>,
    }

    impl FakeRemote {
        fn failing_once(titles: &[&str]) -> Self {
            Self {
                fail_once: Mutex::new(titles.iter().map(ToString::to_string).collect()),
                ..Self::default()
            }
        }

        fn rejecting(titles: &[&str]) -> Self {
            Self {
                reject: Mutex::new(titles.iter().map(ToString::to_string).collect()),
                ..Self::default()
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::default()
            }
        }

        fn upload_count(&self) -> usize {
            self.uploads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RemoteStore for FakeRemote {
        async fn upload(&self, metadata: &UploadMetadata, _bytes: &[u8]) -> Result<RemoteObject> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_once.lock().unwrap().remove(&metadata.title) {
                return Err(Error::RemoteUploadFailed("connection reset".to_string()));
            }
            if self.reject.lock().unwrap().contains(&metadata.title) {
                return Err(Error::RemoteUploadRejected("unsupported codec".to_string()));
            }
            let n = self.uploads.fetch_add(1, Ordering::SeqCst);
            Ok(RemoteObject {
                remote_id: format!("rem-{n}"),
                remote_url: format!("https://media.example.com/rem-{n}"),
            })
        }
    }

    struct Harness {
        init: Arc<StoreInit>,
        _blobs: tempfile::TempDir,
        blob_dir: std::path::PathBuf,
    }

    impl Harness {
        fn new() -> Self {
            let blobs = tempfile::tempdir().unwrap();
            let blob_dir = blobs.path().to_path_buf();
            Self {
                init: Arc::new(StoreInit::new(StoreBackend::InMemory)),
                _blobs: blobs,
                blob_dir,
            }
        }

        async fn store(&self) -> Arc<LocalStore> {
            self.init.open().await.unwrap()
        }

        /// Write a blob to disk and return its path
        fn blob(&self, name: &str) -> String {
            let path = self.blob_dir.join(name);
            std::fs::write(&path, b"RIFF fake audio").unwrap();
            path.to_string_lossy().to_string()
        }

        async fn add_file(&self, title: &str) {
            let store = self.store().await;
            let repo = LibSqlAudioFileRepository::new(&store);
            repo.create(
                "user-1",
                None,
                NewAudioFile {
                    title: title.to_string(),
                    duration_secs: 10,
                    file_path: self.blob(&format!("{title}.mp3")),
                    original_filename: format!("{title}.mp3"),
                    mime_type: "audio/mpeg".to_string(),
                    size_bytes: 15,
                    ..NewAudioFile::default()
                },
            )
            .await
            .unwrap();
        }

        async fn add_recording(&self, card_id: &str) {
            let store = self.store().await;
            let repo = LibSqlRecordingRepository::new(&store);
            repo.create("user-1", card_id, &self.blob(&format!("{card_id}.wav")), 3)
                .await
                .unwrap();
        }

        async fn unsynced_titles(&self) -> Vec<String> {
            let store = self.store().await;
            let repo = LibSqlAudioFileRepository::new(&store);
            repo.list_unsynced("user-1")
                .await
                .unwrap()
                .into_iter()
                .map(|f| f.title)
                .collect()
        }
    }

    fn completed(outcome: SyncOutcome) -> SyncReport {
        match outcome {
            SyncOutcome::Completed(report) => report,
            SyncOutcome::AlreadyRunning => panic!("expected a completed pass"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_sync_all_pushes_files_and_recordings() {
        let harness = Harness::new();
        harness.add_file("Alpha").await;
        harness.add_recording("card-1").await;

        let engine = SyncEngine::new(Arc::clone(&harness.init), FakeRemote::default());
        let report = completed(engine.sync_all("user-1").await.unwrap());

        assert_eq!(report.uploaded, 2);
        assert!(report.is_clean());

        let store = harness.store().await;
        let recordings = LibSqlRecordingRepository::new(&store);
        let rec = &recordings.list_by_card("user-1", None).await.unwrap()[0];
        assert!(rec.synced);
        assert!(rec.sync_metadata_consistent());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_rerun_after_success_is_noop() {
        let harness = Harness::new();
        harness.add_file("Alpha").await;

        let engine = SyncEngine::new(Arc::clone(&harness.init), FakeRemote::default());
        completed(engine.sync_all("user-1").await.unwrap());

        let report = completed(engine.sync_all("user-1").await.unwrap());
        assert_eq!(report.uploaded, 0);
        assert!(report.is_clean());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_partial_failure_keeps_processing_and_retries() {
        let harness = Harness::new();
        harness.add_file("Alpha").await;
        harness.add_file("Bravo").await;
        harness.add_file("Charlie").await;

        // Bravo (second in title order) fails transiently on the first pass
        let engine = SyncEngine::new(
            Arc::clone(&harness.init),
            FakeRemote::failing_once(&["Bravo"]),
        );
        let report = completed(engine.sync_all("user-1").await.unwrap());

        assert_eq!(report.uploaded, 2);
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].retryable);
        assert_eq!(harness.unsynced_titles().await, vec!["Bravo"]);

        // The next pass retries exactly the failed row
        let retry = completed(engine.sync_all("user-1").await.unwrap());
        assert_eq!(retry.uploaded, 1);
        assert!(retry.is_clean());
        assert!(harness.unsynced_titles().await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_rejected_row_records_error_for_user() {
        let harness = Harness::new();
        harness.add_file("Alpha").await;

        let engine = SyncEngine::new(Arc::clone(&harness.init), FakeRemote::rejecting(&["Alpha"]));
        let report = completed(engine.sync_all("user-1").await.unwrap());

        assert_eq!(report.uploaded, 0);
        assert!(!report.failed[0].retryable);

        let store = harness.store().await;
        let repo = LibSqlAudioFileRepository::new(&store);
        let row = &repo.list_by_folder("user-1", None).await.unwrap()[0];
        assert!(!row.synced);
        assert_eq!(row.sync_attempts, 1);
        assert!(row
            .last_sync_error
            .as_deref()
            .unwrap()
            .contains("unsupported codec"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_per_row_timeout_leaves_row_unsynced() {
        let harness = Harness::new();
        harness.add_file("Alpha").await;

        let engine = SyncEngine::new(
            Arc::clone(&harness.init),
            FakeRemote::slow(Duration::from_millis(200)),
        )
        .with_upload_timeout(Duration::from_millis(20));
        let report = completed(engine.sync_all("user-1").await.unwrap());

        assert_eq!(report.uploaded, 0);
        assert!(report.failed[0].retryable);
        assert_eq!(harness.unsynced_titles().await, vec!["Alpha"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_sync_is_single_flight() {
        let harness = Harness::new();
        harness.add_file("Alpha").await;
        harness.add_file("Bravo").await;

        let engine = Arc::new(SyncEngine::new(
            Arc::clone(&harness.init),
            FakeRemote::slow(Duration::from_millis(50)),
        ));

        let first = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.sync_all("user-1").await.unwrap() }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = engine.sync_all("user-1").await.unwrap();

        assert_eq!(second, SyncOutcome::AlreadyRunning);
        let report = completed(first.await.unwrap());
        assert_eq!(report.uploaded, 2);

        // No row was uploaded twice
        assert_eq!(engine.remote.upload_count(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unsupported_store_sync_is_clean_noop() {
        let init = Arc::new(StoreInit::new(StoreBackend::Unsupported));
        let engine = SyncEngine::new(init, FakeRemote::default());

        let report = completed(engine.sync_all("user-1").await.unwrap());
        assert_eq!(report.uploaded, 0);
        assert!(report.is_clean());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_auto_sync_triggers_on_online_transition() {
        let harness = Harness::new();
        harness.add_file("Alpha").await;

        let engine = Arc::new(SyncEngine::new(
            Arc::clone(&harness.init),
            FakeRemote::default(),
        ));
        let monitor = ConnectivityMonitor::new(false);
        let (_session_tx, session_rx) = watch::channel(Some("user-1".to_string()));

        let task = spawn_auto_sync(Arc::clone(&engine), &monitor, session_rx);

        monitor.set_online(true);
        for _ in 0..100 {
            if harness.unsynced_titles().await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(harness.unsynced_titles().await.is_empty());

        task.abort();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_auto_sync_skips_without_authenticated_user() {
        let harness = Harness::new();
        harness.add_file("Alpha").await;

        let engine = Arc::new(SyncEngine::new(
            Arc::clone(&harness.init),
            FakeRemote::default(),
        ));
        let monitor = ConnectivityMonitor::new(false);
        let (_session_tx, session_rx) = watch::channel(None::<String>);

        let task = spawn_auto_sync(Arc::clone(&engine), &monitor, session_rx);
        monitor.set_online(true);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(harness.unsynced_titles().await, vec!["Alpha"]);
        task.abort();
    }
}
