//! High-level services composed from the storage and sync layers

mod library;

pub use library::LibraryService;
