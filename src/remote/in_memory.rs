//! In-memory remote store for testing and single-process scenarios.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use event_emitter_rs::EventEmitter;

use super::{ChangeCallback, RemoteStore, StoreError, Subscription};

type Rows = Vec<(String, Vec<u8>)>;

/// In-memory remote store backed by HashMaps.
///
/// Features:
/// - Clone-friendly via Arc; clones share storage, like two admin sessions
///   talking to the same database
/// - Tables keep insertion order; upserts replace rows in place
/// - Every mutation notifies subscribers of the touched resource
/// - `set_offline(true)` makes every call fail with `StoreError::Unavailable`
///
/// ## Example
///
/// ```
/// # tokio_test_block(async {
/// use funnel_sync::remote::{InMemoryRemoteStore, RemoteStore};
///
/// let store = InMemoryRemoteStore::new();
/// store.write("app_settings", br#"{"initialTitle":"Hi"}"#.to_vec()).await.unwrap();
/// assert!(store.read("app_settings").await.unwrap().is_some());
/// # });
/// # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
/// # }
/// ```
#[derive(Clone)]
pub struct InMemoryRemoteStore {
    blobs: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    tables: Arc<RwLock<HashMap<String, Rows>>>,
    emitter: Arc<Mutex<EventEmitter>>,
    offline: Arc<AtomicBool>,
    reads: Arc<AtomicUsize>,
    writes: Arc<AtomicUsize>,
    subscribers: Arc<AtomicUsize>,
}

impl Default for InMemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRemoteStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            blobs: Arc::new(RwLock::new(HashMap::new())),
            tables: Arc::new(RwLock::new(HashMap::new())),
            emitter: Arc::new(Mutex::new(EventEmitter::new())),
            offline: Arc::new(AtomicBool::new(false)),
            reads: Arc::new(AtomicUsize::new(0)),
            writes: Arc::new(AtomicUsize::new(0)),
            subscribers: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Simulate losing (or regaining) the connection to the store.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of successful read and list calls.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of successful mutating calls.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of live change subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.load(Ordering::SeqCst)
    }

    /// Peek at a stored blob without going through the async API.
    pub fn blob(&self, resource: &str) -> Option<Vec<u8>> {
        self.blobs
            .read()
            .ok()
            .and_then(|blobs| blobs.get(resource).cloned())
    }

    /// Peek at the rows of a table without going through the async API.
    pub fn rows(&self, table: &str) -> Option<Vec<Vec<u8>>> {
        self.tables.read().ok().and_then(|tables| {
            tables
                .get(table)
                .map(|rows| rows.iter().map(|(_, row)| row.clone()).collect())
        })
    }

    /// Fire the change feed for a resource.
    pub fn notify(&self, resource: &str) {
        let handles = match self.emitter.lock() {
            Ok(mut emitter) => emitter.emit(resource, resource.to_string()),
            Err(_) => return,
        };
        // Listeners only signal the engine, so joining here is short and
        // makes delivery happen before the mutating call returns.
        for handle in handles {
            let _ = handle.join();
        }
    }

    fn ensure_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store offline".into()));
        }
        Ok(())
    }

    fn committed(&self, resource: &str) {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.notify(resource);
    }
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("lock poisoned".into())
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn read(&self, resource: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.ensure_online()?;
        let blobs = self.blobs.read().map_err(|_| poisoned())?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(blobs.get(resource).cloned())
    }

    async fn write(&self, resource: &str, blob: Vec<u8>) -> Result<(), StoreError> {
        self.ensure_online()?;
        {
            let mut blobs = self.blobs.write().map_err(|_| poisoned())?;
            blobs.insert(resource.to_string(), blob);
        }
        self.committed(resource);
        Ok(())
    }

    async fn list_rows(&self, table: &str) -> Result<Option<Vec<Vec<u8>>>, StoreError> {
        self.ensure_online()?;
        let tables = self.tables.read().map_err(|_| poisoned())?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(tables
            .get(table)
            .map(|rows| rows.iter().map(|(_, row)| row.clone()).collect()))
    }

    async fn upsert_row(&self, table: &str, id: &str, row: Vec<u8>) -> Result<(), StoreError> {
        self.ensure_online()?;
        {
            let mut tables = self.tables.write().map_err(|_| poisoned())?;
            let rows = tables.entry(table.to_string()).or_default();
            match rows.iter_mut().find(|(existing, _)| existing == id) {
                Some(slot) => slot.1 = row,
                None => rows.push((id.to_string(), row)),
            }
        }
        self.committed(table);
        Ok(())
    }

    async fn delete_row(&self, table: &str, id: &str) -> Result<bool, StoreError> {
        self.ensure_online()?;
        let existed = {
            let mut tables = self.tables.write().map_err(|_| poisoned())?;
            match tables.get_mut(table) {
                Some(rows) => {
                    let before = rows.len();
                    rows.retain(|(existing, _)| existing != id);
                    rows.len() != before
                }
                None => false,
            }
        };
        self.committed(table);
        Ok(existed)
    }

    async fn replace_rows(
        &self,
        table: &str,
        rows: Vec<(String, Vec<u8>)>,
    ) -> Result<(), StoreError> {
        self.ensure_online()?;
        {
            let mut tables = self.tables.write().map_err(|_| poisoned())?;
            tables.insert(table.to_string(), rows);
        }
        self.committed(table);
        Ok(())
    }

    fn subscribe(
        &self,
        resource: &str,
        on_change: ChangeCallback,
    ) -> Result<Subscription, StoreError> {
        self.ensure_online()?;
        let listener_id = self
            .emitter
            .lock()
            .map_err(|_| poisoned())?
            .on(resource, move |_resource: String| on_change());
        self.subscribers.fetch_add(1, Ordering::SeqCst);

        let emitter = Arc::clone(&self.emitter);
        let subscribers = Arc::clone(&self.subscribers);
        Ok(Subscription::new(move || {
            if let Ok(mut emitter) = emitter.lock() {
                emitter.remove_listener(&listener_id);
            }
            subscribers.fetch_sub(1, Ordering::SeqCst);
        }))
    }
}
