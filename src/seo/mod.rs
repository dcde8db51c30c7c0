//! Per-page search and social metadata, one row per route.

mod catalog;

use serde::{Deserialize, Serialize};

use crate::{Patch, Record};

pub use catalog::SeoCatalog;

/// Card type used when a page does not name one.
pub const DEFAULT_TWITTER_CARD: &str = "summary_large_image";

/// Metadata row for the page served at `page_path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Record, Patch)]
#[record(table = "seo_settings", validate = "SeoSettings::check")]
pub struct SeoSettings {
    #[patch(skip)]
    pub id: String,
    /// Route this row applies to, e.g. `/security-check`.
    pub page_path: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub keywords: Option<String>,
    #[serde(default)]
    pub og_title: Option<String>,
    #[serde(default)]
    pub og_description: Option<String>,
    #[serde(default)]
    pub og_image_url: Option<String>,
    #[serde(default)]
    pub twitter_card: Option<String>,
    #[serde(default)]
    pub twitter_title: Option<String>,
    #[serde(default)]
    pub twitter_description: Option<String>,
    #[serde(default)]
    pub twitter_image_url: Option<String>,
    #[serde(default)]
    pub canonical_url: Option<String>,
    #[serde(default)]
    pub robots_content: Option<String>,
}

/// One `<meta>` element. `og:` tags use the `property` attribute, the rest
/// use `name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaTag {
    pub key: &'static str,
    pub content: String,
}

impl MetaTag {
    pub fn is_property(&self) -> bool {
        self.key.starts_with("og:")
    }
}

/// Everything a page puts in its document head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageMeta {
    pub title: String,
    pub tags: Vec<MetaTag>,
    pub canonical_url: Option<String>,
}

impl PageMeta {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|tag| tag.key == key)
            .map(|tag| tag.content.as_str())
    }
}

/// Blank strings count as unset.
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

impl SeoSettings {
    /// A page with only a title.
    pub fn new(id: impl Into<String>, page_path: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            page_path: page_path.into(),
            title: title.into(),
            description: None,
            keywords: None,
            og_title: None,
            og_description: None,
            og_image_url: None,
            twitter_card: None,
            twitter_title: None,
            twitter_description: None,
            twitter_image_url: None,
            canonical_url: None,
            robots_content: None,
        }
    }

    fn check(&self) -> Result<(), String> {
        if !self.page_path.starts_with('/') {
            return Err(format!("page_path must start with '/': {:?}", self.page_path));
        }
        if self.title.trim().is_empty() {
            return Err("title must not be empty".into());
        }
        Ok(())
    }

    /// Resolve the head tags, falling back to the page title and
    /// description where the social variants are unset. Unset tags are
    /// left out.
    pub fn page_meta(&self) -> PageMeta {
        let title = Some(self.title.as_str());
        let description = present(&self.description);
        let candidates = [
            ("description", description),
            ("keywords", present(&self.keywords)),
            ("robots", present(&self.robots_content)),
            ("og:title", present(&self.og_title).or(title)),
            ("og:description", present(&self.og_description).or(description)),
            ("og:image", present(&self.og_image_url)),
            (
                "twitter:card",
                present(&self.twitter_card).or(Some(DEFAULT_TWITTER_CARD)),
            ),
            ("twitter:title", present(&self.twitter_title).or(title)),
            (
                "twitter:description",
                present(&self.twitter_description).or(description),
            ),
            ("twitter:image", present(&self.twitter_image_url)),
        ];

        PageMeta {
            title: self.title.clone(),
            tags: candidates
                .into_iter()
                .filter_map(|(key, content)| {
                    content.map(|content| MetaTag {
                        key,
                        content: content.to_string(),
                    })
                })
                .collect(),
            canonical_url: present(&self.canonical_url).map(str::to_string),
        }
    }
}
