//! RemoteStore - the persistence service the sync engines talk to.
//!
//! The store exposes two shapes of resource:
//!
//! - **blobs**: one opaque value per resource id (the settings row),
//! - **tables**: rows addressable by id (the ad inventory).
//!
//! Both are JSON-encoded bytes at this boundary. Every resource also has a
//! change feed; `subscribe` returns a [`Subscription`] that unsubscribes
//! when dropped.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │           SyncEngine (per resource)          │
//! │  initialize() / refresh() / ordered writer   │
//! └──────────────────────────────────────────────┘
//!                        │
//!                        ▼
//! ┌──────────────────────────────────────────────┐
//! │              RemoteStore trait               │
//! │  read / write / list_rows / upsert_row       │
//! │  delete_row / replace_rows / subscribe       │
//! └──────────────────────────────────────────────┘
//!          │                          │
//!          ▼                          ▼
//! ┌──────────────────┐    ┌────────────────────────┐
//! │InMemoryRemoteStore│    │ hosted database client │
//! │    (included)     │    │       (external)       │
//! └──────────────────┘    └────────────────────────┘
//! ```

mod in_memory;
mod subscription;

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

pub use in_memory::InMemoryRemoteStore;
pub use subscription::Subscription;

/// Callback invoked by a store when a subscribed resource changes.
pub type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

/// Error type for remote store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached.
    Unavailable(String),
    /// The request did not complete in time.
    Timeout,
    /// The store refused the request.
    Rejected(String),
    /// Encoding or decoding of a payload failed.
    Serde(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Unavailable(msg) => write!(f, "store unavailable: {}", msg),
            StoreError::Timeout => write!(f, "store request timed out"),
            StoreError::Rejected(msg) => write!(f, "store rejected request: {}", msg),
            StoreError::Serde(msg) => write!(f, "store payload error: {}", msg),
        }
    }
}

impl Error for StoreError {}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serde(err.to_string())
    }
}

/// Key-value persistence service with per-resource change notifications.
///
/// Storage is last-write-wins; no version checks happen at this layer.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Read a blob. Returns `None` if the resource was never written.
    async fn read(&self, resource: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Replace a blob (upsert).
    async fn write(&self, resource: &str, blob: Vec<u8>) -> Result<(), StoreError>;

    /// List all rows of a table in storage order. Returns `None` if the
    /// table does not exist.
    async fn list_rows(&self, table: &str) -> Result<Option<Vec<Vec<u8>>>, StoreError>;

    /// Insert or replace a single row.
    async fn upsert_row(&self, table: &str, id: &str, row: Vec<u8>) -> Result<(), StoreError>;

    /// Delete a row. Returns true if it existed.
    async fn delete_row(&self, table: &str, id: &str) -> Result<bool, StoreError>;

    /// Replace every row of a table, creating the table if needed.
    async fn replace_rows(
        &self,
        table: &str,
        rows: Vec<(String, Vec<u8>)>,
    ) -> Result<(), StoreError>;

    /// Register a change listener for a blob or table.
    fn subscribe(
        &self,
        resource: &str,
        on_change: ChangeCallback,
    ) -> Result<Subscription, StoreError>;
}
