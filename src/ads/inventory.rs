use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::collection::{CollectionMutation, CollectionResource};
use crate::engine::{InitOutcome, PendingWrite, RefreshOutcome, SyncEngine, SyncOptions};
use crate::error::SyncError;
use crate::remote::RemoteStore;

use super::{default_ads, AdPosition, AdRecord, AdRecordPatch, AdSelector, NewAdRecord};

type AdMutation = CollectionMutation<AdRecord>;

/// Handle to the synchronized ad-unit table.
#[derive(Clone)]
pub struct AdInventory {
    engine: SyncEngine<CollectionResource<AdRecord>>,
}

impl AdInventory {
    /// A missing table is seeded with `default_ads()`.
    pub fn new(store: Arc<dyn RemoteStore>, options: SyncOptions) -> Self {
        Self {
            engine: SyncEngine::new(CollectionResource::new(default_ads()), store, options),
        }
    }

    pub fn engine(&self) -> &SyncEngine<CollectionResource<AdRecord>> {
        &self.engine
    }

    pub async fn initialize(&self) -> InitOutcome {
        self.engine.initialize().await
    }

    /// Every cached ad unit, in stored order.
    pub fn ads(&self) -> Arc<Vec<AdRecord>> {
        self.engine.snapshot()
    }

    pub fn get(&self, id: &str) -> Option<AdRecord> {
        self.engine.snapshot().iter().find(|ad| ad.id == id).cloned()
    }

    /// Ads to render in `position` on the given impression.
    pub fn ads_for(&self, position: AdPosition, impression: u64) -> Vec<AdRecord> {
        let ads = self.engine.snapshot();
        let selected = AdSelector::new(&ads)
            .select(position, impression)
            .into_iter()
            .cloned()
            .collect();
        selected
    }

    /// Add a unit under a freshly generated `ad-…` id.
    pub fn create(&self, new_ad: NewAdRecord) -> Result<(AdRecord, PendingWrite), SyncError> {
        let id = format!("ad-{}", Uuid::new_v4().simple());
        let record = new_ad.into_record(id, Utc::now());

        let pending = self.engine.update_with(|ads| {
            if ads.iter().any(|ad| ad.id == record.id) {
                return Err(SyncError::Validation(format!("duplicate ad id: {}", record.id)));
            }
            Ok(AdMutation::Upsert(record.clone()))
        })?;
        Ok((record, pending))
    }

    pub fn update(&self, id: &str, mut patch: AdRecordPatch) -> Result<PendingWrite, SyncError> {
        patch.updated_at = Some(Some(Utc::now()));
        self.engine.update(AdMutation::Patch {
            id: id.to_string(),
            patch,
        })
    }

    pub fn delete(&self, id: &str) -> Result<PendingWrite, SyncError> {
        self.engine.update(AdMutation::Remove { id: id.to_string() })
    }

    /// Flip `active`. The new value is fixed when the call is made, so a
    /// replayed toggle does not flip back.
    pub fn toggle_active(&self, id: &str) -> Result<PendingWrite, SyncError> {
        self.engine.update_with(|ads| {
            let ad = ads
                .iter()
                .find(|ad| ad.id == id)
                .ok_or_else(|| SyncError::RecordNotFound { id: id.to_string() })?;
            Ok(AdMutation::Patch {
                id: id.to_string(),
                patch: AdRecordPatch {
                    active: Some(!ad.active),
                    updated_at: Some(Some(Utc::now())),
                    ..Default::default()
                },
            })
        })
    }

    /// Replace the whole table with `default_ads()`.
    pub fn reset_to_defaults(&self) -> Result<PendingWrite, SyncError> {
        self.engine.update(AdMutation::ReplaceAll(default_ads()))
    }

    pub async fn refresh(&self) -> Result<RefreshOutcome, SyncError> {
        self.engine.refresh().await
    }

    pub fn shutdown(&self) {
        self.engine.shutdown();
    }
}
