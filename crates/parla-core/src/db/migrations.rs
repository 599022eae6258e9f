//! Database migrations

use crate::error::Result;
use libsql::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 1;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        migrate_v1(conn).await?;
    }

    Ok(())
}

/// Get the current schema version
async fn get_version(conn: &Connection) -> Result<i32> {
    // Check if schema_version table exists
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

/// Migration to version 1: Initial schema
async fn migrate_v1(conn: &Connection) -> Result<()> {
    // libsql doesn't have execute_batch, so we run each statement separately
    // Using a transaction for atomicity

    conn.execute("BEGIN TRANSACTION", ()).await?;

    let statements = [
        // Schema version tracking
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        // Audio folders
        "CREATE TABLE IF NOT EXISTS folders (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            parent_id TEXT REFERENCES folders(id),
            name TEXT NOT NULL,
            path TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_folders_parent ON folders(parent_id)",
        "CREATE INDEX IF NOT EXISTS idx_folders_user ON folders(user_id)",
        // NULL parents compare distinct in plain unique indexes, so the
        // (parent_id, path) uniqueness rule goes through COALESCE
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_folders_parent_path
            ON folders(user_id, COALESCE(parent_id, ''), path)",
        // Audio files; folder_id is nullable so files survive folder deletion
        "CREATE TABLE IF NOT EXISTS audio_files (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            folder_id TEXT REFERENCES folders(id),
            title TEXT NOT NULL,
            artist TEXT,
            album TEXT,
            genre TEXT,
            year INTEGER,
            duration_secs INTEGER NOT NULL DEFAULT 0,
            file_path TEXT NOT NULL UNIQUE,
            original_filename TEXT NOT NULL,
            mime_type TEXT NOT NULL,
            size_bytes INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            synced INTEGER NOT NULL DEFAULT 0,
            remote_id TEXT,
            remote_url TEXT,
            sync_attempts INTEGER NOT NULL DEFAULT 0,
            last_sync_error TEXT
        )",
        "CREATE INDEX IF NOT EXISTS idx_audio_files_folder ON audio_files(folder_id)",
        "CREATE INDEX IF NOT EXISTS idx_audio_files_user ON audio_files(user_id)",
        "CREATE INDEX IF NOT EXISTS idx_audio_files_synced ON audio_files(synced)",
        // Voice recordings attached to flashcards
        "CREATE TABLE IF NOT EXISTS recordings (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            card_id TEXT NOT NULL,
            file_path TEXT NOT NULL,
            duration_secs INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            synced INTEGER NOT NULL DEFAULT 0,
            remote_id TEXT,
            audio_url TEXT,
            sync_attempts INTEGER NOT NULL DEFAULT 0,
            last_sync_error TEXT,
            UNIQUE(user_id, card_id, file_path)
        )",
        "CREATE INDEX IF NOT EXISTS idx_recordings_card ON recordings(card_id)",
        "CREATE INDEX IF NOT EXISTS idx_recordings_user ON recordings(user_id)",
        "CREATE INDEX IF NOT EXISTS idx_recordings_synced ON recordings(synced)",
        // Record migration version
        "INSERT INTO schema_version (version) VALUES (1)",
    ];

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    tracing::info!("Migrated database to version 1");
    Ok(())
}
