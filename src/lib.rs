//! Client-side synchronization of the funnel's remote configuration.
//!
//! Three resources are kept in memory and eventually consistent with a
//! [`RemoteStore`](remote::RemoteStore): the global [`Settings`] blob, the
//! table of [`AdRecord`]s and the per-page [`SeoSettings`]. Each goes
//! through a [`SyncEngine`], which serves reads from its cache, applies
//! writes optimistically and merges refresh results with unconfirmed writes
//! so that no update is lost.
//!
//! ```no_run
//! use std::sync::Arc;
//! use funnel_sync::{AdPosition, FunnelSync, SyncOptions};
//! use funnel_sync::remote::InMemoryRemoteStore;
//!
//! # async fn run() {
//! let sync = FunnelSync::new(Arc::new(InMemoryRemoteStore::new()), SyncOptions::default());
//! sync.connect().await;
//!
//! sync.record_page_view();
//! let title = sync.settings_snapshot().initial_title.clone();
//! let top_ads = sync.ads_by_position(AdPosition::Top);
//! # let _ = (title, top_ads);
//! # }
//! ```

extern crate self as funnel_sync;

pub mod ads;
pub mod collection;
pub mod engine;
mod error;
mod funnel;
mod patch;
pub mod remote;
pub mod seo;
pub mod settings;

pub use ads::{
    default_ads, AdInventory, AdPosition, AdRecord, AdRecordPatch, AdSelector, ImpressionCounter,
    NewAdRecord, Priority,
};
pub use collection::{CollectionMutation, CollectionResource, Record};
pub use engine::{
    InitOutcome, PendingWrite, RefreshOutcome, Resource, SyncEngine, SyncOptions,
};
pub use error::SyncError;
pub use funnel::{ConnectReport, FunnelSync};
pub use patch::Patchable;
pub use seo::{MetaTag, PageMeta, SeoCatalog, SeoSettings, SeoSettingsPatch};
pub use settings::{Settings, SettingsPatch, SettingsSync};

// Derive macros
pub use funnel_sync_macros::{Patch, Record};
