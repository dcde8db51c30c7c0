//! FunnelSync - one handle over everything the funnel pages and the admin
//! screen read and write.

use std::sync::Arc;

use tracing::info;

use crate::ads::{AdInventory, AdPosition, AdRecord, AdRecordPatch, ImpressionCounter, NewAdRecord};
use crate::engine::{InitOutcome, PendingWrite, RefreshOutcome, SyncOptions};
use crate::error::SyncError;
use crate::remote::RemoteStore;
use crate::seo::{PageMeta, SeoCatalog, SeoSettings, SeoSettingsPatch};
use crate::settings::{Settings, SettingsPatch, SettingsSync};

/// Outcome of `FunnelSync::connect` for each resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectReport {
    pub settings: InitOutcome,
    pub ads: InitOutcome,
    pub seo: InitOutcome,
}

/// Settings, ad inventory, page metadata and impression counter behind one
/// cloneable handle. Pass it to whatever needs configuration instead of
/// reaching for a global.
#[derive(Clone)]
pub struct FunnelSync {
    settings: SettingsSync,
    ads: AdInventory,
    seo: SeoCatalog,
    impressions: Arc<ImpressionCounter>,
}

impl FunnelSync {
    /// Every engine shares `store` and `options`. Nothing is read until
    /// `connect`.
    pub fn new(store: Arc<dyn RemoteStore>, options: SyncOptions) -> Self {
        Self {
            settings: SettingsSync::new(Arc::clone(&store), options.clone()),
            ads: AdInventory::new(Arc::clone(&store), options.clone()),
            seo: SeoCatalog::new(store, options),
            impressions: Arc::new(ImpressionCounter::new()),
        }
    }

    /// Load every resource and start background sync. Safe to call more
    /// than once.
    pub async fn connect(&self) -> ConnectReport {
        let (settings, ads, seo) = tokio::join!(
            self.settings.initialize(),
            self.ads.initialize(),
            self.seo.initialize()
        );
        info!(?settings, ?ads, ?seo, "funnel sync connected");
        ConnectReport { settings, ads, seo }
    }

    pub fn settings(&self) -> &SettingsSync {
        &self.settings
    }

    pub fn inventory(&self) -> &AdInventory {
        &self.ads
    }

    pub fn seo(&self) -> &SeoCatalog {
        &self.seo
    }

    /// True once every resource finished its first load.
    pub fn is_loaded(&self) -> bool {
        self.settings.engine().is_loaded()
            && self.ads.engine().is_loaded()
            && self.seo.engine().is_loaded()
    }

    pub fn settings_snapshot(&self) -> Arc<Settings> {
        self.settings.snapshot()
    }

    pub fn update_settings(&self, patch: SettingsPatch) -> Result<PendingWrite, SyncError> {
        self.settings.update(patch)
    }

    pub fn reset_settings(&self) -> Result<PendingWrite, SyncError> {
        self.settings.reset_to_defaults()
    }

    pub fn verify_credentials(&self, username: &str, password: &str) -> bool {
        self.settings.verify_credentials(username, password)
    }

    /// Count a page view; returns its impression number.
    pub fn record_page_view(&self) -> u64 {
        self.impressions.record_view()
    }

    /// Ads for `position` on the latest recorded page view.
    pub fn ads_by_position(&self, position: AdPosition) -> Vec<AdRecord> {
        self.ads.ads_for(position, self.impressions.current())
    }

    pub fn ads(&self) -> Arc<Vec<AdRecord>> {
        self.ads.ads()
    }

    pub fn create_ad(&self, new_ad: NewAdRecord) -> Result<(AdRecord, PendingWrite), SyncError> {
        self.ads.create(new_ad)
    }

    pub fn update_ad(&self, id: &str, patch: AdRecordPatch) -> Result<PendingWrite, SyncError> {
        self.ads.update(id, patch)
    }

    pub fn delete_ad(&self, id: &str) -> Result<PendingWrite, SyncError> {
        self.ads.delete(id)
    }

    pub fn toggle_ad_active(&self, id: &str) -> Result<PendingWrite, SyncError> {
        self.ads.toggle_active(id)
    }

    pub fn reset_ads(&self) -> Result<PendingWrite, SyncError> {
        self.ads.reset_to_defaults()
    }

    /// Metadata row for the page at `page_path`.
    pub fn seo_for_path(&self, page_path: &str) -> Option<SeoSettings> {
        self.seo.for_path(page_path)
    }

    /// Head tags for the page at `page_path`, fallbacks applied.
    pub fn page_meta(&self, page_path: &str) -> Option<PageMeta> {
        self.seo.meta_for_path(page_path)
    }

    pub fn seo_pages(&self) -> Vec<SeoSettings> {
        self.seo.pages()
    }

    pub fn add_seo_page(
        &self,
        page_path: &str,
        title: &str,
    ) -> Result<(SeoSettings, PendingWrite), SyncError> {
        self.seo.add_page(page_path, title)
    }

    pub fn update_seo(&self, id: &str, patch: SeoSettingsPatch) -> Result<PendingWrite, SyncError> {
        self.seo.update(id, patch)
    }

    pub fn delete_seo_page(&self, id: &str) -> Result<PendingWrite, SyncError> {
        self.seo.delete(id)
    }

    /// Refresh every resource; the first error wins.
    pub async fn refresh_all(&self) -> Result<(), SyncError> {
        let (settings, ads, seo): (
            Result<RefreshOutcome, _>,
            Result<RefreshOutcome, _>,
            Result<RefreshOutcome, _>,
        ) = tokio::join!(self.settings.refresh(), self.ads.refresh(), self.seo.refresh());
        settings?;
        ads?;
        seo?;
        Ok(())
    }

    /// Stop every engine. Late results are dropped.
    pub fn shutdown(&self) {
        self.settings.shutdown();
        self.ads.shutdown();
        self.seo.shutdown();
    }
}
