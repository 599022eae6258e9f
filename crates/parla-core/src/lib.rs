//! parla-core - Core library for Parla
//!
//! Offline-first local cache and synchronization engine shared by all Parla
//! clients. Feature code goes through [`services::LibraryService`] for local
//! CRUD while the device may be offline; the [`sync::SyncEngine`] pushes
//! locally created rows to the remote store whenever connectivity returns.

pub mod connectivity;
pub mod db;
pub mod error;
pub mod media;
pub mod models;
pub mod services;
pub mod sync;

pub use error::{Error, Result};
pub use models::{AudioFile, AudioFileId, Folder, FolderId, Recording, RecordingId};
