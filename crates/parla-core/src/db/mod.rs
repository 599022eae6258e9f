//! Local storage layer for Parla

mod audio_file_repository;
mod connection;
pub(crate) mod folder_repository;
mod migrations;
mod recording_repository;
mod store;

pub use audio_file_repository::{AudioFileRepository, LibSqlAudioFileRepository};
pub use connection::Database;
pub use folder_repository::{FolderRepository, LibSqlFolderRepository};
pub use recording_repository::{LibSqlRecordingRepository, RecordingRepository};
pub use store::{LocalStore, StoreBackend, StoreInit};

/// Permanent rejections after which a row is no longer auto-retried
pub const MAX_SYNC_ATTEMPTS: i64 = 5;
