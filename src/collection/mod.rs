//! Generic `Resource` for a table of rows keyed by id.

use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::engine::Resource;
use crate::error::SyncError;
use crate::patch::Patchable;
use crate::remote::{RemoteStore, StoreError};

/// A row of a remotely stored table.
///
/// Usually derived with `#[derive(Record)]`:
///
/// ```ignore
/// #[derive(Clone, Debug, Serialize, Deserialize, Record)]
/// #[record(table = "ad_units", validate = "AdRecord::check")]
/// pub struct AdRecord { pub id: String, /* ... */ }
/// ```
pub trait Record: Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync + 'static {
    const TABLE: &'static str;

    fn id(&self) -> &str;

    /// Row-level invariants, checked before a row enters the cache.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Change to a collection of records.
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionMutation<M: Record + Patchable> {
    /// Insert a record, or replace the one with the same id.
    Upsert(M),
    Patch { id: String, patch: M::Patch },
    Remove { id: String },
    ReplaceAll(Vec<M>),
}

impl<M: Record + Patchable> CollectionMutation<M> {
    fn target(&self) -> Option<&str> {
        match self {
            CollectionMutation::Upsert(record) => Some(record.id()),
            CollectionMutation::Patch { id, .. } | CollectionMutation::Remove { id } => Some(id),
            CollectionMutation::ReplaceAll(_) => None,
        }
    }
}

/// Table of `M` rows as one synchronized value.
pub struct CollectionResource<M> {
    defaults: Vec<M>,
    _record: PhantomData<fn() -> M>,
}

impl<M: Record> CollectionResource<M> {
    /// `defaults` seed the table when it does not exist yet.
    pub fn new(defaults: Vec<M>) -> Self {
        Self {
            defaults,
            _record: PhantomData,
        }
    }
}

fn checked<M: Record>(record: &M) -> Result<(), SyncError> {
    record
        .validate()
        .map_err(|reason| SyncError::Validation(format!("{} {}: {}", M::TABLE, record.id(), reason)))
}

fn encode<M: Record>(record: &M) -> Result<(String, Vec<u8>), SyncError> {
    Ok((record.id().to_string(), serde_json::to_vec(record)?))
}

#[async_trait]
impl<M: Record + Patchable> Resource for CollectionResource<M> {
    type Value = Vec<M>;
    type Mutation = CollectionMutation<M>;

    fn name(&self) -> &str {
        M::TABLE
    }

    fn defaults(&self) -> Vec<M> {
        self.defaults.clone()
    }

    fn apply(&self, rows: &mut Vec<M>, mutation: &CollectionMutation<M>) -> Result<(), SyncError> {
        match mutation {
            CollectionMutation::Upsert(record) => {
                checked(record)?;
                match rows.iter_mut().find(|row| row.id() == record.id()) {
                    Some(row) => *row = record.clone(),
                    None => rows.push(record.clone()),
                }
            }
            CollectionMutation::Patch { id, patch } => {
                let row = rows
                    .iter_mut()
                    .find(|row| row.id() == id)
                    .ok_or_else(|| SyncError::RecordNotFound { id: id.clone() })?;
                let mut next = row.clone();
                next.apply_patch(patch);
                checked(&next)?;
                *row = next;
            }
            CollectionMutation::Remove { id } => {
                let idx = rows
                    .iter()
                    .position(|row| row.id() == id)
                    .ok_or_else(|| SyncError::RecordNotFound { id: id.clone() })?;
                rows.remove(idx);
            }
            CollectionMutation::ReplaceAll(records) => {
                let mut seen = HashSet::new();
                for record in records {
                    checked(record)?;
                    if !seen.insert(record.id()) {
                        return Err(SyncError::Validation(format!(
                            "duplicate {} id: {}",
                            M::TABLE,
                            record.id()
                        )));
                    }
                }
                *rows = records.clone();
            }
        }
        Ok(())
    }

    async fn fetch(&self, store: &dyn RemoteStore) -> Result<Option<Vec<M>>, SyncError> {
        let Some(raw) = store
            .list_rows(M::TABLE)
            .await
            .map_err(|err| SyncError::io(M::TABLE, err))?
        else {
            return Ok(None);
        };

        let mut rows = Vec::with_capacity(raw.len());
        for bytes in raw {
            match serde_json::from_slice::<M>(&bytes) {
                Ok(row) => rows.push(row),
                Err(err) => warn!(resource = M::TABLE, error = %err, "skipping undecodable row"),
            }
        }
        Ok(Some(rows))
    }

    async fn seed(&self, store: &dyn RemoteStore, rows: &Vec<M>) -> Result<(), SyncError> {
        let encoded = rows.iter().map(encode).collect::<Result<Vec<_>, _>>()?;
        store
            .replace_rows(M::TABLE, encoded)
            .await
            .map_err(|err| SyncError::io(M::TABLE, err))
    }

    async fn push(
        &self,
        store: &dyn RemoteStore,
        staged: &Vec<M>,
        mutation: &CollectionMutation<M>,
    ) -> Result<(), SyncError> {
        let io = |err: StoreError| SyncError::io(M::TABLE, err);
        match mutation {
            CollectionMutation::ReplaceAll(_) => self.seed(store, staged).await,
            CollectionMutation::Remove { id } => {
                store.delete_row(M::TABLE, id).await.map_err(io)?;
                Ok(())
            }
            upsert_or_patch => {
                let id = upsert_or_patch.target().unwrap_or_default();
                let row = staged
                    .iter()
                    .find(|row| row.id() == id)
                    .ok_or_else(|| SyncError::RecordNotFound { id: id.to_string() })?;
                let (id, bytes) = encode(row)?;
                store.upsert_row(M::TABLE, &id, bytes).await.map_err(io)
            }
        }
    }
}
