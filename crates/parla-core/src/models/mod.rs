//! Data models for parla-core

mod audio_file;
mod folder;
mod recording;

pub use audio_file::{AudioFile, AudioFileId, NewAudioFile};
pub use folder::{Folder, FolderId};
pub use recording::{Recording, RecordingId};
