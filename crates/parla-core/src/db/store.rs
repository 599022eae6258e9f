//! Local store capability and process-wide initialization.
//!
//! `StoreInit` guards the one physical open + schema creation per process:
//! concurrent callers either claim the initialization themselves or wait on
//! it with a bounded deadline, and every caller ends up with the same
//! [`LocalStore`] handle. A failed open is sticky so the app can degrade to
//! remote-only behavior instead of retrying forever.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use libsql::Connection;
use tokio::sync::Notify;
use tokio::time::{timeout, Instant};

use crate::error::{Error, Result};

use super::Database;

/// How long a caller waits for a concurrent initialization before giving up
const OPEN_WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// The local persistence capability.
///
/// UI code is written once against this; on platforms without local
/// persistence (web builds) the `Unsupported` variant makes reads empty and
/// writes fail with [`Error::UnsupportedOnPlatform`].
pub enum LocalStore {
    /// Real embedded store backed by a libSQL database
    Embedded(Database),
    /// Valid, permanent "no local store" mode
    Unsupported,
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Embedded(_) => f.write_str("LocalStore::Embedded"),
            Self::Unsupported => f.write_str("LocalStore::Unsupported"),
        }
    }
}

impl LocalStore {
    /// Whether local persistence is available
    pub const fn is_supported(&self) -> bool {
        matches!(self, Self::Embedded(_))
    }

    /// Connection for write paths; errors in unsupported mode
    pub const fn connection(&self) -> Result<&Connection> {
        match self {
            Self::Embedded(db) => Ok(db.connection()),
            Self::Unsupported => Err(Error::UnsupportedOnPlatform),
        }
    }

    /// Connection for read paths; `None` in unsupported mode (reads are empty)
    pub const fn read_connection(&self) -> Option<&Connection> {
        match self {
            Self::Embedded(db) => Some(db.connection()),
            Self::Unsupported => None,
        }
    }
}

/// Where the local store lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// File-backed store at the given path
    OnDisk(PathBuf),
    /// In-memory store (primarily for tests)
    InMemory,
    /// Platform has no local persistence
    Unsupported,
}

/// Initialization lifecycle, modeled explicitly instead of mutable flags
enum InitState {
    Unstarted,
    Initializing,
    Ready(Arc<LocalStore>),
    Failed(String),
}

/// What a caller should do after inspecting the state
enum Claim {
    Run,
    Wait,
    Done(Arc<LocalStore>),
    Fail(String),
}

/// Releases an abandoned initialization claim.
///
/// If the claiming future is dropped before an outcome is published, the
/// state returns to `Unstarted` and waiters are woken so one of them can
/// claim the initialization instead of timing out.
struct ClaimGuard<'a> {
    init: &'a StoreInit,
    armed: bool,
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self
            .init
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if matches!(&*state, InitState::Initializing) {
            *state = InitState::Unstarted;
            drop(state);
            self.init.notify.notify_waiters();
        }
    }
}

/// Process-wide lazy initializer for the local store.
///
/// Owned by the application's composition root and shared via `Arc`.
pub struct StoreInit {
    backend: StoreBackend,
    state: Mutex<InitState>,
    notify: Notify,
}

impl StoreInit {
    /// Create an initializer for the given backend; nothing is opened yet
    pub fn new(backend: StoreBackend) -> Self {
        Self {
            backend,
            state: Mutex::new(InitState::Unstarted),
            notify: Notify::new(),
        }
    }

    /// Open the local store, initializing it on first call.
    ///
    /// Safe to call concurrently and repeatedly: exactly one physical open
    /// and schema-creation sequence occurs, every caller receives the same
    /// handle, and callers arriving mid-initialization wait with a deadline
    /// rather than racing a second open. Once failed, the original failure
    /// surfaces to every subsequent caller.
    pub async fn open(&self) -> Result<Arc<LocalStore>> {
        let deadline = Instant::now() + OPEN_WAIT_TIMEOUT;

        loop {
            // Register for wakeup before inspecting state, so a transition
            // between the check and the await is not missed
            let notified = self.notify.notified();

            let claim = {
                let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                match &*state {
                    InitState::Ready(store) => Claim::Done(Arc::clone(store)),
                    InitState::Failed(message) => Claim::Fail(message.clone()),
                    InitState::Initializing => Claim::Wait,
                    InitState::Unstarted => {
                        *state = InitState::Initializing;
                        Claim::Run
                    }
                }
            };

            match claim {
                Claim::Done(store) => return Ok(store),
                Claim::Fail(message) => return Err(Error::StoreUnavailable(message)),
                Claim::Run => {
                    let mut guard = ClaimGuard {
                        init: self,
                        armed: true,
                    };
                    let result = self.initialize().await;
                    // An outcome was published; nothing to release
                    guard.armed = false;
                    return result;
                }
                Claim::Wait => {
                    let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                        return Err(Error::StoreUnavailable(
                            "timed out waiting for store initialization".to_string(),
                        ));
                    };
                    if timeout(remaining, notified).await.is_err() {
                        return Err(Error::StoreUnavailable(
                            "timed out waiting for store initialization".to_string(),
                        ));
                    }
                }
            }
        }
    }

    /// Perform the one-time open, publish the outcome, and wake waiters
    async fn initialize(&self) -> Result<Arc<LocalStore>> {
        // Every outcome must pass through the state publication below;
        // an early return here would strand waiters in Initializing
        let opened = match &self.backend {
            StoreBackend::OnDisk(path) => {
                let prepared = match path.parent() {
                    Some(parent) => std::fs::create_dir_all(parent).map_err(Error::from),
                    None => Ok(()),
                };
                match prepared {
                    Ok(()) => Database::open(path).await.map(LocalStore::Embedded),
                    Err(error) => Err(error),
                }
            }
            StoreBackend::InMemory => Database::open_in_memory().await.map(LocalStore::Embedded),
            StoreBackend::Unsupported => {
                tracing::info!("Local store not supported on this platform; running remote-only");
                Ok(LocalStore::Unsupported)
            }
        };

        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        match opened {
            Ok(store) => {
                let store = Arc::new(store);
                *state = InitState::Ready(Arc::clone(&store));
                drop(state);
                self.notify.notify_waiters();
                Ok(store)
            }
            Err(error) => {
                let message = error.to_string();
                tracing::error!("Local store failed to open: {message}");
                *state = InitState::Failed(message.clone());
                drop(state);
                self.notify.notify_waiters();
                Err(Error::StoreUnavailable(message))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_open_initializes_once() {
        let tmp = tempdir().unwrap();
        let init = Arc::new(StoreInit::new(StoreBackend::OnDisk(
            tmp.path().join("parla.db"),
        )));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let init = Arc::clone(&init);
            handles.push(tokio::spawn(async move { init.open().await }));
        }

        let mut stores = Vec::new();
        for handle in handles {
            stores.push(handle.await.unwrap().unwrap());
        }

        // Every caller got the same underlying store
        for store in &stores[1..] {
            assert!(Arc::ptr_eq(&stores[0], store));
        }

        // Schema creation ran exactly once (no duplicate version rows)
        let conn = stores[0].connection().unwrap();
        let mut rows = conn
            .query("SELECT COUNT(*) FROM schema_version", ())
            .await
            .unwrap();
        let count: i32 = rows.next().await.unwrap().unwrap().get(0).unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_repeated_open_returns_same_handle() {
        let init = StoreInit::new(StoreBackend::InMemory);
        let first = init.open().await.unwrap();
        let second = init.open().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failed_open_is_sticky() {
        let tmp = tempdir().unwrap();
        // A file where a directory is needed makes create_dir_all fail
        let blocker = tmp.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let init = StoreInit::new(StoreBackend::OnDisk(blocker.join("sub").join("parla.db")));

        let first = init.open().await.unwrap_err();
        assert!(matches!(first, Error::StoreUnavailable(_)));

        // Second caller observes the original failure, no silent retry
        let second = init.open().await.unwrap_err();
        assert!(matches!(second, Error::StoreUnavailable(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_abandoned_claim_releases_initialization() {
        let init = StoreInit::new(StoreBackend::InMemory);

        // Simulate a claimer whose future was dropped mid-initialization
        {
            let mut state = init
                .state
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            *state = InitState::Initializing;
            drop(state);
            let _abandoned = ClaimGuard {
                init: &init,
                armed: true,
            };
        }

        // The next caller claims the open instead of timing out
        let store = init.open().await.unwrap();
        assert!(store.is_supported());
    }

    #[test]
    fn test_local_store_debug_names_variant() {
        let debug = format!("{:?}", LocalStore::Unsupported);
        assert_eq!(debug, "LocalStore::Unsupported");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unsupported_backend_is_a_valid_mode() {
        let init = StoreInit::new(StoreBackend::Unsupported);
        let store = init.open().await.unwrap();
        assert!(!store.is_supported());
        assert!(store.read_connection().is_none());
        assert!(matches!(
            store.connection(),
            Err(Error::UnsupportedOnPlatform)
        ));
    }
}
