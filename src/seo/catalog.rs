use std::sync::Arc;

use uuid::Uuid;

use crate::collection::{CollectionMutation, CollectionResource};
use crate::engine::{InitOutcome, PendingWrite, RefreshOutcome, SyncEngine, SyncOptions};
use crate::error::SyncError;
use crate::remote::RemoteStore;

use super::{PageMeta, SeoSettings, SeoSettingsPatch};

type SeoMutation = CollectionMutation<SeoSettings>;

fn path_taken(page_path: &str) -> SyncError {
    SyncError::Validation(format!("page_path already has SEO settings: {}", page_path))
}

/// Handle to the synchronized per-page metadata table. A missing table is
/// created empty.
#[derive(Clone)]
pub struct SeoCatalog {
    engine: SyncEngine<CollectionResource<SeoSettings>>,
}

impl SeoCatalog {
    pub fn new(store: Arc<dyn RemoteStore>, options: SyncOptions) -> Self {
        Self {
            engine: SyncEngine::new(CollectionResource::new(Vec::new()), store, options),
        }
    }

    pub fn engine(&self) -> &SyncEngine<CollectionResource<SeoSettings>> {
        &self.engine
    }

    pub async fn initialize(&self) -> InitOutcome {
        self.engine.initialize().await
    }

    /// Every page, ordered by path.
    pub fn pages(&self) -> Vec<SeoSettings> {
        let mut pages = self.engine.snapshot().as_ref().clone();
        pages.sort_by(|a, b| a.page_path.cmp(&b.page_path));
        pages
    }

    pub fn for_path(&self, page_path: &str) -> Option<SeoSettings> {
        self.engine
            .snapshot()
            .iter()
            .find(|page| page.page_path == page_path)
            .cloned()
    }

    /// Resolved head tags for `page_path`, if the page has a row.
    pub fn meta_for_path(&self, page_path: &str) -> Option<PageMeta> {
        self.for_path(page_path).map(|page| page.page_meta())
    }

    /// Add a row for `page_path` under a fresh `seo-…` id. Paths are unique.
    pub fn add_page(
        &self,
        page_path: &str,
        title: &str,
    ) -> Result<(SeoSettings, PendingWrite), SyncError> {
        let id = format!("seo-{}", Uuid::new_v4().simple());
        let page = SeoSettings::new(id, page_path.trim(), title.trim());

        let pending = self.engine.update_with(|pages| {
            if pages.iter().any(|existing| existing.page_path == page.page_path) {
                return Err(path_taken(&page.page_path));
            }
            Ok(SeoMutation::Upsert(page.clone()))
        })?;
        Ok((page, pending))
    }

    /// Change a page's fields. Moving it onto a path another row already
    /// uses is rejected.
    pub fn update(&self, id: &str, mut patch: SeoSettingsPatch) -> Result<PendingWrite, SyncError> {
        if let Some(path) = &mut patch.page_path {
            *path = path.trim().to_string();
        }
        self.engine.update_with(move |pages| {
            if let Some(path) = &patch.page_path {
                if pages.iter().any(|page| page.id != id && &page.page_path == path) {
                    return Err(path_taken(path));
                }
            }
            Ok(SeoMutation::Patch {
                id: id.to_string(),
                patch,
            })
        })
    }

    pub fn delete(&self, id: &str) -> Result<PendingWrite, SyncError> {
        self.engine.update(SeoMutation::Remove { id: id.to_string() })
    }

    pub async fn refresh(&self) -> Result<RefreshOutcome, SyncError> {
        self.engine.refresh().await
    }

    pub fn shutdown(&self) {
        self.engine.shutdown();
    }
}
