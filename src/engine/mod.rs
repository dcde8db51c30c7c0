//! SyncEngine - a locally cached value kept eventually consistent with one
//! remote resource.
//!
//! Reads are served from the cache and never wait on the network. Writes
//! are applied to the cache immediately and confirmed by the remote store in
//! the background, in the order they were made. Refreshes pull the remote
//! value and replay any local write the remote may not reflect yet, so a
//! slow read can never roll back a newer write.
//!
//! ```text
//!   update ──► cache (optimistic) ──► writer task ──► RemoteStore
//!                 ▲                                       │
//!                 └──── refresh ◄── listener / poller ◄───┘ change feed
//! ```

mod options;
mod state;
mod tasks;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::SyncError;
use crate::remote::{RemoteStore, Subscription};

pub use options::SyncOptions;

use state::SyncState;
use tasks::ChangeSignal;

/// One remotely stored value and the rules for changing it.
///
/// `apply` must be pure and idempotent: the engine runs it once when a write
/// is made and again on top of every refresh that arrives before the write
/// is confirmed.
#[async_trait]
pub trait Resource: Send + Sync + 'static {
    type Value: Clone + Send + Sync + 'static;
    type Mutation: Clone + fmt::Debug + Send + Sync + 'static;

    /// Store key; also used as the change-feed topic and in logs.
    fn name(&self) -> &str;

    /// Value served before the first load and whenever the store is unreachable.
    fn defaults(&self) -> Self::Value;

    fn apply(&self, value: &mut Self::Value, mutation: &Self::Mutation)
        -> Result<(), SyncError>;

    /// Read the remote value. `Ok(None)` means it was never created.
    async fn fetch(&self, store: &dyn RemoteStore) -> Result<Option<Self::Value>, SyncError>;

    /// Create the remote value on first run.
    async fn seed(&self, store: &dyn RemoteStore, value: &Self::Value) -> Result<(), SyncError>;

    /// Persist one mutation. `staged` is the cache value right after it was applied.
    async fn push(
        &self,
        store: &dyn RemoteStore,
        staged: &Self::Value,
        mutation: &Self::Mutation,
    ) -> Result<(), SyncError>;
}

/// How the first load went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// The remote value existed and is now cached.
    Loaded,
    /// The remote value was missing and has been created from defaults.
    Seeded,
    /// The store could not be reached; defaults are served until a refresh succeeds.
    Defaults,
}

/// Result of a successful refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The remote value replaced the cache as is.
    Applied,
    /// Unconfirmed local writes were replayed on top of the remote value.
    Rebased { replayed: usize },
}

/// Handle to a write that is already visible locally.
///
/// Dropping it does not cancel the write.
#[derive(Debug)]
pub struct PendingWrite {
    version: u64,
    outcome: oneshot::Receiver<Result<u64, SyncError>>,
}

impl PendingWrite {
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Wait for the remote store to acknowledge the write.
    ///
    /// A failure means the remote never saw the write. The cache keeps the
    /// optimistic value until the next refresh.
    pub async fn confirmed(self) -> Result<u64, SyncError> {
        self.outcome.await.unwrap_or(Err(SyncError::Closed))
    }
}

/// Work for the ordered writer. Seeds share the queue with writes so a
/// write staged after a seed was queued always lands after it.
enum WriteJob<R: Resource> {
    Push {
        version: u64,
        staged: Arc<R::Value>,
        mutation: R::Mutation,
        reply: oneshot::Sender<Result<u64, SyncError>>,
    },
    Seed {
        value: Arc<R::Value>,
        reply: oneshot::Sender<Result<(), SyncError>>,
    },
}

#[derive(Default)]
struct Background {
    tasks: Vec<JoinHandle<()>>,
    subscription: Option<Subscription>,
}

impl Background {
    fn stop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.subscription.take();
    }
}

struct Inner<R: Resource> {
    resource: R,
    store: Arc<dyn RemoteStore>,
    options: SyncOptions,
    state: Mutex<SyncState<R::Value, R::Mutation>>,
    writes: mpsc::UnboundedSender<WriteJob<R>>,
    signal: Arc<ChangeSignal>,
    init: OnceCell<InitOutcome>,
    background: Mutex<Background>,
}

impl<R: Resource> Inner<R> {
    fn state(&self) -> MutexGuard<'_, SyncState<R::Value, R::Mutation>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn background(&self) -> MutexGuard<'_, Background> {
        self.background.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_closed(&self) -> bool {
        self.state().closed
    }

    fn stage<F>(&self, build: F) -> Result<(u64, Arc<R::Value>, R::Mutation), SyncError>
    where
        F: FnOnce(&R::Value) -> Result<R::Mutation, SyncError>,
    {
        let mut state = self.state();
        if state.closed {
            return Err(SyncError::Closed);
        }
        let mutation = build(state.snapshot.as_ref())?;
        let mut next = state.snapshot.as_ref().clone();
        self.resource.apply(&mut next, &mutation)?;
        let staged = Arc::new(next);
        let version = state.stage(Arc::clone(&staged), mutation.clone());
        Ok((version, staged, mutation))
    }

    fn begin_refresh(&self) -> Result<u64, SyncError> {
        let mut state = self.state();
        if state.closed {
            return Err(SyncError::Closed);
        }
        Ok(state.begin_refresh())
    }

    fn finish_refresh(
        &self,
        floor: u64,
        fetched: Result<Option<R::Value>, SyncError>,
    ) -> Result<RefreshOutcome, SyncError> {
        let name = self.resource.name();
        let mut state = self.state();
        if state.closed {
            state.end_refresh(floor);
            return Err(SyncError::Closed);
        }

        let result = match fetched {
            Ok(Some(mut remote)) => {
                let mut replayed = 0;
                for mutation in state.replay_from(floor) {
                    match self.resource.apply(&mut remote, mutation) {
                        Ok(()) => replayed += 1,
                        Err(err) => {
                            debug!(resource = name, error = %err, ?mutation, "replay skipped")
                        }
                    }
                }
                state.snapshot = Arc::new(remote);
                state.loaded = true;
                state.last_refresh_at = Some(Utc::now());
                if replayed == 0 {
                    Ok(RefreshOutcome::Applied)
                } else {
                    Ok(RefreshOutcome::Rebased { replayed })
                }
            }
            Ok(None) => Err(SyncError::NotFound {
                resource: name.to_string(),
            }),
            Err(err) => Err(err),
        };
        state.end_refresh(floor);
        result
    }

    fn abandon_refresh(&self, floor: u64) {
        let mut state = self.state();
        state.loaded = true;
        state.end_refresh(floor);
    }

    async fn refresh(&self) -> Result<RefreshOutcome, SyncError> {
        let floor = self.begin_refresh()?;
        let fetched = self.resource.fetch(self.store.as_ref()).await;
        let outcome = self.finish_refresh(floor, fetched);
        match &outcome {
            Ok(outcome) => debug!(resource = self.resource.name(), ?outcome, "refreshed"),
            Err(err) => debug!(resource = self.resource.name(), error = %err, "refresh failed"),
        }
        outcome
    }

    /// First load. Whatever happens, the engine counts as loaded afterwards.
    async fn load_initial(&self) -> InitOutcome {
        let outcome = self.fetch_or_seed().await;
        self.state().loaded = true;
        outcome
    }

    async fn fetch_or_seed(&self) -> InitOutcome {
        let name = self.resource.name();
        let Ok(floor) = self.begin_refresh() else {
            return InitOutcome::Defaults;
        };

        match self.resource.fetch(self.store.as_ref()).await {
            Ok(Some(value)) => {
                if self.finish_refresh(floor, Ok(Some(value))).is_err() {
                    return InitOutcome::Defaults;
                }
                info!(resource = name, "loaded remote value");
                InitOutcome::Loaded
            }
            Ok(None) => {
                let seeded = match self.enqueue_seed(floor) {
                    Ok(outcome) => outcome.await.unwrap_or(Err(SyncError::Closed)),
                    Err(err) => Err(err),
                };
                match seeded {
                    Ok(()) => {
                        let defaults = self.resource.defaults();
                        if self.finish_refresh(floor, Ok(Some(defaults))).is_err() {
                            return InitOutcome::Defaults;
                        }
                        info!(resource = name, "seeded remote value from defaults");
                        InitOutcome::Seeded
                    }
                    Err(err) => {
                        warn!(resource = name, error = %err, "seeding failed, serving defaults");
                        self.abandon_refresh(floor);
                        InitOutcome::Defaults
                    }
                }
            }
            Err(err) => {
                warn!(resource = name, error = %err, "initial load failed, serving defaults");
                self.abandon_refresh(floor);
                InitOutcome::Defaults
            }
        }
    }

    /// Queue the creation of the missing remote value: defaults plus every
    /// write staged since `floor`. Built and queued under the state lock, so
    /// a write staged later is pushed after the seed.
    fn enqueue_seed(
        &self,
        floor: u64,
    ) -> Result<oneshot::Receiver<Result<(), SyncError>>, SyncError> {
        let state = self.state();
        if state.closed {
            return Err(SyncError::Closed);
        }
        let mut value = self.resource.defaults();
        for mutation in state.replay_from(floor) {
            if let Err(err) = self.resource.apply(&mut value, mutation) {
                debug!(resource = self.resource.name(), error = %err, ?mutation, "seed replay skipped");
            }
        }
        let (reply, outcome) = oneshot::channel();
        let job = WriteJob::Seed {
            value: Arc::new(value),
            reply,
        };
        self.writes.send(job).map_err(|_| SyncError::Closed)?;
        Ok(outcome)
    }

    fn start_background(self: &Arc<Self>) {
        let engine = Arc::downgrade(self);
        let mut spawned = vec![tokio::spawn(tasks::run_listener(
            engine.clone(),
            Arc::clone(&self.signal),
            self.options.notify_debounce(),
        ))];
        if let Some(period) = self.options.poll_interval() {
            spawned.push(tokio::spawn(tasks::run_poller(engine, period)));
        }

        let subscription = if self.options.subscribe {
            let signal = Arc::clone(&self.signal);
            match self
                .store
                .subscribe(self.resource.name(), Arc::new(move || signal.raise()))
            {
                Ok(subscription) => Some(subscription),
                Err(err) => {
                    warn!(
                        resource = self.resource.name(),
                        error = %err,
                        "change feed unavailable, relying on polling"
                    );
                    None
                }
            }
        } else {
            None
        };

        let mut background = self.background();
        background.tasks.extend(spawned);
        background.subscription = subscription;
        if self.is_closed() {
            background.stop();
        }
    }

    async fn push(
        &self,
        version: u64,
        staged: &R::Value,
        mutation: &R::Mutation,
    ) -> Result<u64, SyncError> {
        if self.is_closed() {
            return Err(SyncError::Closed);
        }
        let result = self
            .resource
            .push(self.store.as_ref(), staged, mutation)
            .await;
        self.finish_write(version, result)
    }

    async fn seed(&self, value: &R::Value) -> Result<(), SyncError> {
        if self.is_closed() {
            return Err(SyncError::Closed);
        }
        self.resource.seed(self.store.as_ref(), value).await
    }

    fn finish_write(&self, version: u64, result: Result<(), SyncError>) -> Result<u64, SyncError> {
        let name = self.resource.name();
        let mut state = self.state();
        match result {
            Ok(()) => {
                state.confirm(version);
                if state.closed {
                    return Err(SyncError::Closed);
                }
                drop(state);
                debug!(resource = name, version, "write confirmed");
                Ok(version)
            }
            Err(err) => {
                state.discard(version);
                drop(state);
                warn!(resource = name, version, error = %err, "remote write failed, keeping local value");
                Err(SyncError::StaleWriteDiscarded {
                    resource: name.to_string(),
                    version,
                    reason: err.to_string(),
                })
            }
        }
    }

    fn shutdown(&self) {
        {
            let mut state = self.state();
            if state.closed {
                return;
            }
            state.closed = true;
        }
        self.background().stop();
        info!(resource = self.resource.name(), "sync engine shut down");
    }
}

impl<R: Resource> Drop for Inner<R> {
    fn drop(&mut self) {
        self.background
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .stop();
    }
}

/// Cached, eventually consistent view of one remote resource.
///
/// Cloning is cheap and every clone shares the same cache. Must be created
/// inside a Tokio runtime.
pub struct SyncEngine<R: Resource> {
    inner: Arc<Inner<R>>,
}

impl<R: Resource> Clone for SyncEngine<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: Resource> SyncEngine<R> {
    /// Create an engine serving `resource.defaults()` until `initialize` runs.
    pub fn new(resource: R, store: Arc<dyn RemoteStore>, options: SyncOptions) -> Self {
        let (writes, jobs) = mpsc::unbounded_channel();
        let state = Mutex::new(SyncState::new(resource.defaults()));
        let inner = Arc::new(Inner {
            resource,
            store,
            options,
            state,
            writes,
            signal: Arc::new(ChangeSignal::default()),
            init: OnceCell::new(),
            background: Mutex::new(Background::default()),
        });

        let writer = tokio::spawn(tasks::run_writer(Arc::downgrade(&inner), jobs));
        inner.background().tasks.push(writer);

        Self { inner }
    }

    pub fn resource(&self) -> &R {
        &self.inner.resource
    }

    /// Load the remote value, seeding it from defaults if it does not exist,
    /// then start listening for changes.
    ///
    /// Runs once per engine. Concurrent and repeated calls wait for and
    /// return the first call's outcome. Never fails: an unreachable store
    /// leaves the defaults in place.
    pub async fn initialize(&self) -> InitOutcome {
        let inner = &self.inner;
        *inner
            .init
            .get_or_init(|| async {
                let outcome = inner.load_initial().await;
                inner.start_background();
                outcome
            })
            .await
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.state().loaded
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Current cached value.
    pub fn snapshot(&self) -> Arc<R::Value> {
        Arc::clone(&self.inner.state().snapshot)
    }

    /// Latest write version handed out.
    pub fn version(&self) -> u64 {
        self.inner.state().version()
    }

    pub fn pending_writes(&self) -> usize {
        self.inner.state().pending_writes()
    }

    pub fn last_refresh_at(&self) -> Option<DateTime<Utc>> {
        self.inner.state().last_refresh_at
    }

    /// Apply `mutation` to the cache now and queue it for the remote store.
    pub fn update(&self, mutation: R::Mutation) -> Result<PendingWrite, SyncError> {
        self.update_with(move |_| Ok(mutation))
    }

    /// Like `update`, but the mutation is computed from the current cached
    /// value while no other write can interleave.
    pub fn update_with<F>(&self, build: F) -> Result<PendingWrite, SyncError>
    where
        F: FnOnce(&R::Value) -> Result<R::Mutation, SyncError>,
    {
        let (version, staged, mutation) = self.inner.stage(build)?;
        let (reply, outcome) = oneshot::channel();
        let job = WriteJob::Push {
            version,
            staged,
            mutation,
            reply,
        };
        if self.inner.writes.send(job).is_err() {
            self.inner.state().discard(version);
            return Err(SyncError::Closed);
        }
        debug!(resource = self.inner.resource.name(), version, "optimistic write staged");
        Ok(PendingWrite { version, outcome })
    }

    /// Pull the remote value now.
    ///
    /// Leaves the cache untouched on failure, including when the remote
    /// value does not exist.
    pub async fn refresh(&self) -> Result<RefreshOutcome, SyncError> {
        self.inner.refresh().await
    }

    /// Ask for a refresh soon. Calls made before the next refresh starts
    /// are merged into one.
    pub fn notify_changed(&self) {
        self.inner.signal.raise();
    }

    /// Stop background work and drop the change subscription.
    ///
    /// Results that arrive afterwards are discarded. Calling it again is a
    /// no-op.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::remote::InMemoryRemoteStore;

    /// Named integer flags stored as one JSON blob.
    struct Flags;

    #[async_trait]
    impl Resource for Flags {
        type Value = BTreeMap<String, i64>;
        type Mutation = (String, i64);

        fn name(&self) -> &str {
            "flags"
        }

        fn defaults(&self) -> Self::Value {
            BTreeMap::from([("limit".to_string(), 10)])
        }

        fn apply(&self, value: &mut Self::Value, (key, v): &Self::Mutation) -> Result<(), SyncError> {
            if *v < 0 {
                return Err(SyncError::Validation(format!("{} must not be negative", key)));
            }
            value.insert(key.clone(), *v);
            Ok(())
        }

        async fn fetch(&self, store: &dyn RemoteStore) -> Result<Option<Self::Value>, SyncError> {
            match store.read("flags").await.map_err(|e| SyncError::io("flags", e))? {
                Some(blob) => Ok(Some(serde_json::from_slice(&blob)?)),
                None => Ok(None),
            }
        }

        async fn seed(&self, store: &dyn RemoteStore, value: &Self::Value) -> Result<(), SyncError> {
            let blob = serde_json::to_vec(value)?;
            store.write("flags", blob).await.map_err(|e| SyncError::io("flags", e))
        }

        async fn push(
            &self,
            store: &dyn RemoteStore,
            staged: &Self::Value,
            _mutation: &Self::Mutation,
        ) -> Result<(), SyncError> {
            self.seed(store, staged).await
        }
    }

    fn engine(store: &InMemoryRemoteStore) -> SyncEngine<Flags> {
        SyncEngine::new(Flags, Arc::new(store.clone()), SyncOptions::manual())
    }

    #[tokio::test]
    async fn serves_defaults_before_initialize() {
        let store = InMemoryRemoteStore::new();
        let engine = engine(&store);

        assert!(!engine.is_loaded());
        assert_eq!(engine.snapshot()["limit"], 10);
        assert_eq!(store.read_count(), 0);
    }

    #[tokio::test]
    async fn first_initialize_seeds_missing_value() {
        let store = InMemoryRemoteStore::new();
        let engine = engine(&store);

        assert_eq!(engine.initialize().await, InitOutcome::Seeded);
        assert_eq!(engine.initialize().await, InitOutcome::Seeded);
        assert!(engine.is_loaded());
        assert_eq!(store.write_count(), 1);
        assert!(store.blob("flags").is_some());
    }

    #[tokio::test]
    async fn offline_initialize_falls_back_to_defaults() {
        let store = InMemoryRemoteStore::new();
        store.set_offline(true);
        let engine = engine(&store);

        assert_eq!(engine.initialize().await, InitOutcome::Defaults);
        assert!(engine.is_loaded());
        assert_eq!(engine.snapshot()["limit"], 10);
    }

    #[tokio::test]
    async fn update_is_visible_before_confirmation() {
        let store = InMemoryRemoteStore::new();
        let engine = engine(&store);
        engine.initialize().await;

        let pending = engine.update(("limit".into(), 3)).unwrap();
        assert_eq!(engine.snapshot()["limit"], 3);
        assert_eq!(pending.version(), 1);

        assert_eq!(pending.confirmed().await, Ok(1));
        assert_eq!(engine.pending_writes(), 0);
    }

    #[tokio::test]
    async fn rejected_mutation_leaves_cache_alone() {
        let store = InMemoryRemoteStore::new();
        let engine = engine(&store);
        engine.initialize().await;

        let err = engine.update(("limit".into(), -1)).unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
        assert_eq!(engine.snapshot()["limit"], 10);
        assert_eq!(engine.version(), 0);
    }

    #[tokio::test]
    async fn refresh_of_missing_value_keeps_cache() {
        let store = InMemoryRemoteStore::new();
        let engine = engine(&store);

        let err = engine.refresh().await.unwrap_err();
        assert_eq!(
            err,
            SyncError::NotFound {
                resource: "flags".into()
            }
        );
        assert_eq!(engine.snapshot()["limit"], 10);
        assert!(engine.last_refresh_at().is_none());
    }

    #[tokio::test]
    async fn initialize_after_shutdown_still_marks_loaded() {
        let store = InMemoryRemoteStore::new();
        let engine = engine(&store);

        engine.shutdown();

        assert_eq!(engine.initialize().await, InitOutcome::Defaults);
        assert!(engine.is_loaded());
        assert_eq!(store.read_count(), 0);
        assert_eq!(engine.snapshot()["limit"], 10);
    }

    #[tokio::test]
    async fn shutdown_rejects_further_work() {
        let store = InMemoryRemoteStore::new();
        let engine = engine(&store);
        engine.initialize().await;

        engine.shutdown();
        engine.shutdown();

        assert!(engine.is_closed());
        assert_eq!(engine.refresh().await, Err(SyncError::Closed));
        assert!(matches!(
            engine.update(("limit".into(), 1)),
            Err(SyncError::Closed)
        ));
    }
}
