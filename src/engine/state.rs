//! Version bookkeeping behind a sync engine's cache.
//!
//! Every optimistic write gets the next version and goes into the journal.
//! A refresh records a *floor* when it starts: the lowest version whose write
//! had not been confirmed yet. Whatever the read returns, journal entries at
//! or above that floor are replayed on top of it, so a read that was already
//! stale when it left cannot erase a newer local write. Entries are pruned
//! once they are confirmed and no in-flight refresh still needs them.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};

struct JournalEntry<M> {
    version: u64,
    mutation: M,
}

pub(crate) struct SyncState<V, M> {
    pub snapshot: Arc<V>,
    pub loaded: bool,
    pub closed: bool,
    pub last_refresh_at: Option<DateTime<Utc>>,
    version: u64,
    pending: BTreeSet<u64>,
    journal: Vec<JournalEntry<M>>,
    floors: Vec<u64>,
}

impl<V, M> SyncState<V, M> {
    pub fn new(initial: V) -> Self {
        Self {
            snapshot: Arc::new(initial),
            loaded: false,
            closed: false,
            last_refresh_at: None,
            version: 0,
            pending: BTreeSet::new(),
            journal: Vec::new(),
            floors: Vec::new(),
        }
    }

    /// Latest version handed out.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn pending_writes(&self) -> usize {
        self.pending.len()
    }

    pub fn journal_len(&self) -> usize {
        self.journal.len()
    }

    /// Install an optimistic value and journal the mutation that produced it.
    pub fn stage(&mut self, next: Arc<V>, mutation: M) -> u64 {
        self.version += 1;
        let version = self.version;
        self.pending.insert(version);
        self.journal.push(JournalEntry { version, mutation });
        self.snapshot = next;
        version
    }

    /// Register a refresh and return its floor.
    pub fn begin_refresh(&mut self) -> u64 {
        let floor = self
            .pending
            .first()
            .copied()
            .unwrap_or(self.version + 1);
        self.floors.push(floor);
        floor
    }

    /// Mutations a refresh with this floor must replay, oldest first.
    pub fn replay_from(&self, floor: u64) -> impl Iterator<Item = &M> + '_ {
        self.journal
            .iter()
            .filter(move |entry| entry.version >= floor)
            .map(|entry| &entry.mutation)
    }

    /// Unregister a refresh once its result was applied or dropped.
    pub fn end_refresh(&mut self, floor: u64) {
        if let Some(idx) = self.floors.iter().position(|f| *f == floor) {
            self.floors.swap_remove(idx);
        }
        self.prune();
    }

    /// The remote acknowledged a write.
    pub fn confirm(&mut self, version: u64) {
        self.pending.remove(&version);
        self.prune();
    }

    /// The remote rejected a write. The cached value keeps the optimistic
    /// change, but later refreshes no longer replay it.
    pub fn discard(&mut self, version: u64) {
        self.pending.remove(&version);
        self.journal.retain(|entry| entry.version != version);
        self.prune();
    }

    fn prune(&mut self) {
        let oldest_floor = self.floors.iter().min().copied();
        let pending = &self.pending;
        self.journal.retain(|entry| {
            pending.contains(&entry.version)
                || oldest_floor.map_or(false, |floor| entry.version >= floor)
        });
    }
}
