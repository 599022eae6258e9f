//! Audio folder model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A unique identifier for a folder, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FolderId(Uuid);

impl FolderId {
    /// Create a new unique folder ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for FolderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FolderId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A folder organizing a user's audio files
///
/// `path` is the materialized slash-joined chain of folder names from the
/// root, used for uniqueness and display. `(parent_id, path)` is unique
/// within a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    /// Unique identifier
    pub id: FolderId,
    /// Owning end-user identity
    pub user_id: String,
    /// Parent folder, `None` for root-level folders
    pub parent_id: Option<FolderId>,
    /// Display name
    pub name: String,
    /// Slash-joined name chain from the root, e.g. `spanish/verbs`
    pub path: String,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
}

impl Folder {
    /// Create a new root-level folder
    #[must_use]
    pub fn root(user_id: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: FolderId::new(),
            user_id: user_id.into(),
            parent_id: None,
            path: name.clone(),
            name,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a new folder nested under `parent`
    #[must_use]
    pub fn child_of(parent: &Self, name: impl Into<String>) -> Self {
        let name = name.into();
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: FolderId::new(),
            user_id: parent.user_id.clone(),
            parent_id: Some(parent.id),
            path: format!("{}/{}", parent.path, name),
            name,
            created_at: now,
            updated_at: now,
        }
    }
}
