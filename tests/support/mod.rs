//! Test doubles shared by the integration suites.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use funnel_sync::remote::{
    ChangeCallback, InMemoryRemoteStore, RemoteStore, StoreError, Subscription,
};
use tokio::sync::watch;

/// Valve that parks callers while closed.
struct Gate {
    open: watch::Sender<bool>,
    parked: AtomicUsize,
}

impl Gate {
    fn new() -> Self {
        let (open, _) = watch::channel(true);
        Self {
            open,
            parked: AtomicUsize::new(0),
        }
    }

    async fn pass(&self) {
        let mut rx = self.open.subscribe();
        if *rx.borrow() {
            return;
        }
        self.parked.fetch_add(1, Ordering::SeqCst);
        let _ = rx.wait_for(|open| *open).await;
        self.parked.fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-memory store whose reads and writes can be held and released, so a
/// test can decide exactly when a response "arrives".
///
/// A held read has already taken its data from the store, so whatever it
/// returns after release is as stale as a slow network response would be.
pub struct GatedStore {
    inner: InMemoryRemoteStore,
    reads: Gate,
    writes: Gate,
    fail_writes: AtomicBool,
}

impl GatedStore {
    pub fn new() -> Arc<Self> {
        Self::wrap(InMemoryRemoteStore::new())
    }

    pub fn wrap(inner: InMemoryRemoteStore) -> Arc<Self> {
        Arc::new(Self {
            inner,
            reads: Gate::new(),
            writes: Gate::new(),
            fail_writes: AtomicBool::new(false),
        })
    }

    /// The shared backing store, as another admin session would see it.
    pub fn backing(&self) -> &InMemoryRemoteStore {
        &self.inner
    }

    pub fn hold_reads(&self) {
        self.reads.open.send_replace(false);
    }

    pub fn release_reads(&self) {
        self.reads.open.send_replace(true);
    }

    pub fn hold_writes(&self) {
        self.writes.open.send_replace(false);
    }

    pub fn release_writes(&self) {
        self.writes.open.send_replace(true);
    }

    pub fn parked_reads(&self) -> usize {
        self.reads.parked.load(Ordering::SeqCst)
    }

    pub fn parked_writes(&self) -> usize {
        self.writes.parked.load(Ordering::SeqCst)
    }

    /// Make every write fail with `StoreError::Rejected` until turned off.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    async fn before_write(&self) -> Result<(), StoreError> {
        self.writes.pass().await;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected("write refused by test".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for GatedStore {
    async fn read(&self, resource: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let result = self.inner.read(resource).await;
        self.reads.pass().await;
        result
    }

    async fn write(&self, resource: &str, blob: Vec<u8>) -> Result<(), StoreError> {
        self.before_write().await?;
        self.inner.write(resource, blob).await
    }

    async fn list_rows(&self, table: &str) -> Result<Option<Vec<Vec<u8>>>, StoreError> {
        let result = self.inner.list_rows(table).await;
        self.reads.pass().await;
        result
    }

    async fn upsert_row(&self, table: &str, id: &str, row: Vec<u8>) -> Result<(), StoreError> {
        self.before_write().await?;
        self.inner.upsert_row(table, id, row).await
    }

    async fn delete_row(&self, table: &str, id: &str) -> Result<bool, StoreError> {
        self.before_write().await?;
        self.inner.delete_row(table, id).await
    }

    async fn replace_rows(
        &self,
        table: &str,
        rows: Vec<(String, Vec<u8>)>,
    ) -> Result<(), StoreError> {
        self.before_write().await?;
        self.inner.replace_rows(table, rows).await
    }

    fn subscribe(
        &self,
        resource: &str,
        on_change: ChangeCallback,
    ) -> Result<Subscription, StoreError> {
        self.inner.subscribe(resource, on_change)
    }
}

/// Poll `cond` until it holds, yielding to background tasks in between.
pub async fn eventually(what: &str, mut cond: impl FnMut() -> bool) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("timed out waiting for {}", what);
}
