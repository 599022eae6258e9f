//! Folder repository implementation

use async_trait::async_trait;
use libsql::params;

use crate::error::{Error, Result};
use crate::models::{Folder, FolderId};

use super::store::LocalStore;

/// Trait for folder storage operations
#[async_trait]
pub trait FolderRepository {
    /// Create a new folder under the given parent (`None` = root level)
    async fn create(
        &self,
        user_id: &str,
        parent_id: Option<&FolderId>,
        name: &str,
    ) -> Result<Folder>;

    /// Get a folder by ID
    async fn get(&self, id: &FolderId) -> Result<Option<Folder>>;

    /// List direct children of a parent (root level for `None`), name ascending
    async fn list_children(
        &self,
        user_id: &str,
        parent_id: Option<&FolderId>,
    ) -> Result<Vec<Folder>>;

    /// Delete a folder and every descendant folder.
    ///
    /// Audio files referencing any deleted folder are orphaned
    /// (`folder_id = NULL`), not deleted.
    async fn delete(&self, id: &FolderId) -> Result<()>;
}

/// libSQL implementation of `FolderRepository`
pub struct LibSqlFolderRepository<'a> {
    store: &'a LocalStore,
}

impl<'a> LibSqlFolderRepository<'a> {
    /// Create a new repository over the given local store
    pub const fn new(store: &'a LocalStore) -> Self {
        Self { store }
    }

    /// Parse a folder from a database row
    fn parse_folder(row: &libsql::Row) -> Result<Folder> {
        let id: String = row.get(0)?;
        let parent: Option<String> = row.get(2)?;
        Ok(Folder {
            id: id.parse().unwrap_or_default(),
            user_id: row.get(1)?,
            parent_id: parent.and_then(|p| p.parse().ok()),
            name: row.get(3)?,
            path: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }
}

#[async_trait]
impl FolderRepository for LibSqlFolderRepository<'_> {
    async fn create(
        &self,
        user_id: &str,
        parent_id: Option<&FolderId>,
        name: &str,
    ) -> Result<Folder> {
        let conn = self.store.connection()?;

        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("Folder name cannot be empty".into()));
        }
        if name.contains('/') {
            return Err(Error::InvalidInput(
                "Folder name cannot contain '/'".into(),
            ));
        }

        let folder = match parent_id {
            Some(parent_id) => {
                // Another user's folder is as good as missing
                let parent = self
                    .get(parent_id)
                    .await?
                    .filter(|parent| parent.user_id == user_id)
                    .ok_or_else(|| Error::NotFound(format!("parent folder {parent_id}")))?;
                Folder::child_of(&parent, name)
            }
            None => Folder::root(user_id, name),
        };

        conn.execute(
            "INSERT INTO folders (id, user_id, parent_id, name, path, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                folder.id.as_str(),
                folder.user_id.clone(),
                folder.parent_id.map(|p| p.as_str()),
                folder.name.clone(),
                folder.path.clone(),
                folder.created_at,
                folder.updated_at
            ],
        )
        .await
        .map_err(|e| Error::from_insert(e, "folder path"))?;

        Ok(folder)
    }

    async fn get(&self, id: &FolderId) -> Result<Option<Folder>> {
        let Some(conn) = self.store.read_connection() else {
            return Ok(None);
        };

        let mut rows = conn
            .query(
                "SELECT id, user_id, parent_id, name, path, created_at, updated_at
                 FROM folders WHERE id = ?1",
                params![id.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_folder(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_children(
        &self,
        user_id: &str,
        parent_id: Option<&FolderId>,
    ) -> Result<Vec<Folder>> {
        let Some(conn) = self.store.read_connection() else {
            return Ok(Vec::new());
        };

        let mut rows = conn
            .query(
                "SELECT id, user_id, parent_id, name, path, created_at, updated_at
                 FROM folders
                 WHERE user_id = ?1 AND parent_id IS ?2
                 ORDER BY name ASC",
                params![user_id, parent_id.map(FolderId::as_str)],
            )
            .await?;

        let mut folders = Vec::new();
        while let Some(row) = rows.next().await? {
            folders.push(Self::parse_folder(&row)?);
        }
        Ok(folders)
    }

    async fn delete(&self, id: &FolderId) -> Result<()> {
        let conn = self.store.connection()?;
        let now = chrono::Utc::now().timestamp_millis();

        conn.execute("BEGIN TRANSACTION", ()).await?;

        // Orphan files under the whole subtree first, then drop the folders
        let orphan = conn
            .execute(
                "WITH RECURSIVE descendants(id) AS (
                    SELECT id FROM folders WHERE id = ?1
                    UNION ALL
                    SELECT f.id FROM folders f
                    JOIN descendants d ON f.parent_id = d.id
                 )
                 UPDATE audio_files SET folder_id = NULL, updated_at = ?2
                 WHERE folder_id IN (SELECT id FROM descendants)",
                params![id.as_str(), now],
            )
            .await;
        if let Err(e) = orphan {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }

        let deleted = conn
            .execute(
                "WITH RECURSIVE descendants(id) AS (
                    SELECT id FROM folders WHERE id = ?1
                    UNION ALL
                    SELECT f.id FROM folders f
                    JOIN descendants d ON f.parent_id = d.id
                 )
                 DELETE FROM folders WHERE id IN (SELECT id FROM descendants)",
                params![id.as_str()],
            )
            .await;

        let deleted = match deleted {
            Ok(deleted) => deleted,
            Err(e) => {
                conn.execute("ROLLBACK", ()).await.ok();
                return Err(e.into());
            }
        };

        if let Err(e) = conn.execute("COMMIT", ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }

        if deleted == 0 {
            return Err(Error::NotFound(id.to_string()));
        }

        Ok(())
    }
}
