//! Global application settings, stored remotely as one JSON blob.

mod credentials;
mod form;
mod validate;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::{
    InitOutcome, PendingWrite, RefreshOutcome, Resource, SyncEngine, SyncOptions,
};
use crate::error::SyncError;
use crate::patch::Patchable;
use crate::remote::RemoteStore;
use crate::Patch;

pub use credentials::{BOOTSTRAP_PASSWORD, BOOTSTRAP_USERNAME};
pub use validate::normalize_url;

/// Store key of the settings blob.
pub const SETTINGS_RESOURCE: &str = "app_settings";

/// Every configurable text, timer and link of the funnel.
///
/// Always complete: blobs missing fields are filled from `Settings::default()`
/// when decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Patch)]
#[serde(rename_all = "camelCase", default)]
#[patch(rename_all = "camelCase")]
pub struct Settings {
    pub admin_username: String,
    pub admin_password: String,

    pub initial_title: String,
    pub initial_subtitle: String,
    pub security_title: String,
    pub security_subtitle: String,
    pub confirmation_title: String,
    pub confirmation_subtitle: String,

    pub loading_title: String,
    pub loading_subtitle: String,
    pub loading_image_url: String,

    pub initial_timer_seconds: u32,
    pub security_scan_duration_ms: u64,
    pub confirmation_timer_seconds: u32,

    pub initial_button_text: String,
    pub security_button_text: String,
    pub confirmation_button_text: String,
    pub copy_link_button_text: String,

    pub security_badge_text: String,
    pub footer_text: String,
    pub default_destination_url: String,

    pub whatsapp_url: String,
    pub instagram_url: String,
    pub twitter_url: String,
    pub telegram_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            admin_username: BOOTSTRAP_USERNAME.to_string(),
            admin_password: BOOTSTRAP_PASSWORD.to_string(),
            initial_title: "Wait For Secure Link".to_string(),
            initial_subtitle: "Your secure link is just moments away".to_string(),
            security_title: "Security Verification".to_string(),
            security_subtitle: "We're checking this link for your safety".to_string(),
            confirmation_title: "Ready to Proceed".to_string(),
            confirmation_subtitle: "Your link is ready for access".to_string(),
            loading_title: "Initializing secure pathway...".to_string(),
            loading_subtitle: "Please wait while we verify your browser compatibility"
                .to_string(),
            loading_image_url: String::new(),
            initial_timer_seconds: 10,
            security_scan_duration_ms: 8000,
            confirmation_timer_seconds: 5,
            initial_button_text: "Continue to Security Check".to_string(),
            security_button_text: "Proceed to Final Step".to_string(),
            confirmation_button_text: "Proceed to Destination".to_string(),
            copy_link_button_text: "Copy Link".to_string(),
            security_badge_text: "100% Secure Redirection Service".to_string(),
            footer_text: format!(
                "© {} Secure Pathway Redirector. All rights reserved.",
                Utc::now().year()
            ),
            default_destination_url: "https://example.com".to_string(),
            whatsapp_url: String::new(),
            instagram_url: String::new(),
            twitter_url: String::new(),
            telegram_url: String::new(),
        }
    }
}

/// Settings blob as a sync `Resource`. Mutations are sparse patches.
#[derive(Debug, Default)]
pub struct SettingsResource;

impl SettingsResource {
    fn io(err: crate::remote::StoreError) -> SyncError {
        SyncError::io(SETTINGS_RESOURCE, err)
    }
}

#[async_trait]
impl Resource for SettingsResource {
    type Value = Settings;
    type Mutation = SettingsPatch;

    fn name(&self) -> &str {
        SETTINGS_RESOURCE
    }

    fn defaults(&self) -> Settings {
        Settings::default()
    }

    fn apply(&self, settings: &mut Settings, patch: &SettingsPatch) -> Result<(), SyncError> {
        let patch = validate::normalize(patch)?;
        settings.apply_patch(&patch);
        Ok(())
    }

    async fn fetch(&self, store: &dyn RemoteStore) -> Result<Option<Settings>, SyncError> {
        match store.read(SETTINGS_RESOURCE).await.map_err(Self::io)? {
            Some(blob) => Ok(Some(serde_json::from_slice(&blob)?)),
            None => Ok(None),
        }
    }

    async fn seed(&self, store: &dyn RemoteStore, settings: &Settings) -> Result<(), SyncError> {
        let blob = serde_json::to_vec(settings)?;
        store.write(SETTINGS_RESOURCE, blob).await.map_err(Self::io)
    }

    async fn push(
        &self,
        store: &dyn RemoteStore,
        staged: &Settings,
        _patch: &SettingsPatch,
    ) -> Result<(), SyncError> {
        self.seed(store, staged).await
    }
}

/// Handle to the synchronized settings.
#[derive(Clone)]
pub struct SettingsSync {
    engine: SyncEngine<SettingsResource>,
}

impl SettingsSync {
    pub fn new(store: Arc<dyn RemoteStore>, options: SyncOptions) -> Self {
        Self {
            engine: SyncEngine::new(SettingsResource, store, options),
        }
    }

    pub fn engine(&self) -> &SyncEngine<SettingsResource> {
        &self.engine
    }

    pub async fn initialize(&self) -> InitOutcome {
        self.engine.initialize().await
    }

    pub fn snapshot(&self) -> Arc<Settings> {
        self.engine.snapshot()
    }

    /// Merge `patch` into the settings. Present fields are validated and the
    /// destination URL is normalized first.
    pub fn update(&self, patch: SettingsPatch) -> Result<PendingWrite, SyncError> {
        self.engine.update(patch)
    }

    /// Update from string form values, e.g. a submitted admin form.
    ///
    /// Keys are camelCase field names; keys containing `Seconds` or
    /// `Duration` must hold integers. Unknown keys are rejected.
    pub fn update_from_form<I, K, V>(&self, pairs: I) -> Result<PendingWrite, SyncError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let patch = SettingsPatch::from_form(pairs)?;
        self.engine.update(patch)
    }

    /// Overwrite every field with the compiled-in defaults.
    pub fn reset_to_defaults(&self) -> Result<PendingWrite, SyncError> {
        self.engine.update(Settings::default().into())
    }

    pub fn verify_credentials(&self, username: &str, password: &str) -> bool {
        credentials::verify_credentials(&self.engine.snapshot(), username, password)
    }

    pub async fn refresh(&self) -> Result<RefreshOutcome, SyncError> {
        self.engine.refresh().await
    }

    pub fn shutdown(&self) {
        self.engine.shutdown();
    }
}
