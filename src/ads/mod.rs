//! Ad units: the record type, its compiled-in defaults, selection and the
//! synchronized inventory.

mod inventory;
mod selector;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::{Patch, Record};

pub use inventory::AdInventory;
pub use selector::{AdSelector, ImpressionCounter};

/// Slot on the funnel pages where an ad unit renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdPosition {
    Top,
    Middle,
    Bottom,
    AfterTimer,
    Sticky,
    Interstitial,
}

impl AdPosition {
    pub const ALL: [AdPosition; 6] = [
        AdPosition::Top,
        AdPosition::Middle,
        AdPosition::Bottom,
        AdPosition::AfterTimer,
        AdPosition::Sticky,
        AdPosition::Interstitial,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AdPosition::Top => "top",
            AdPosition::Middle => "middle",
            AdPosition::Bottom => "bottom",
            AdPosition::AfterTimer => "after-timer",
            AdPosition::Sticky => "sticky",
            AdPosition::Interstitial => "interstitial",
        }
    }
}

impl fmt::Display for AdPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdPosition {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AdPosition::ALL
            .into_iter()
            .find(|position| position.as_str() == s)
            .ok_or_else(|| SyncError::Validation(format!("unknown ad position: {}", s)))
    }
}

/// Render order hint. Values this crate does not know are kept verbatim and
/// rank below `Low`; a missing or null value reads as `Normal`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "String")]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
    Other(String),
}

impl Priority {
    /// Sort weight; higher renders first.
    pub fn rank(&self) -> u8 {
        match self {
            Priority::High => 3,
            Priority::Normal => 2,
            Priority::Low => 1,
            Priority::Other(_) => 0,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
            Priority::Other(raw) => raw.as_str(),
        }
    }
}

impl From<String> for Priority {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "high" => Priority::High,
            "normal" => Priority::Normal,
            "low" => Priority::Low,
            _ => Priority::Other(raw),
        }
    }
}

impl From<Option<String>> for Priority {
    fn from(raw: Option<String>) -> Self {
        raw.map(Priority::from).unwrap_or_default()
    }
}

impl From<Priority> for String {
    fn from(priority: Priority) -> Self {
        match priority {
            Priority::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ad unit row.
///
/// Rows written by older clients name the payload `code` and the cap
/// `frequency`; both spellings are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Record, Patch)]
#[serde(rename_all = "camelCase")]
#[record(table = "ad_units", validate = "AdRecord::check")]
#[patch(rename_all = "camelCase")]
pub struct AdRecord {
    #[patch(skip)]
    pub id: String,
    pub name: String,
    pub position: AdPosition,
    pub active: bool,
    #[serde(default)]
    pub priority: Priority,
    /// Markup injected into the slot.
    #[serde(alias = "code")]
    pub payload: String,
    /// Show only on every n-th impression. `None` or 0 means always.
    #[serde(default, alias = "frequency", skip_serializing_if = "Option::is_none")]
    pub frequency_cap: Option<u32>,
    /// Stored for other clients; selection does not read it.
    #[serde(default, alias = "view_threshold", skip_serializing_if = "Option::is_none")]
    pub view_threshold: Option<u32>,
    #[patch(skip)]
    #[serde(default, alias = "created_at", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "updated_at", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl AdRecord {
    fn check(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be empty".into());
        }
        if self.active && self.payload.trim().is_empty() {
            return Err("an active ad needs a payload".into());
        }
        Ok(())
    }
}

/// Fields supplied when creating an ad unit. Id and timestamps are assigned
/// by the inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAdRecord {
    pub name: String,
    pub position: AdPosition,
    pub payload: String,
    pub active: bool,
    pub priority: Priority,
    pub frequency_cap: Option<u32>,
}

impl NewAdRecord {
    /// An active, normal-priority unit without a frequency cap.
    pub fn new(name: impl Into<String>, position: AdPosition, payload: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            position,
            payload: payload.into(),
            active: true,
            priority: Priority::Normal,
            frequency_cap: None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_frequency_cap(mut self, cap: u32) -> Self {
        self.frequency_cap = Some(cap);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    pub(crate) fn into_record(self, id: String, created_at: DateTime<Utc>) -> AdRecord {
        AdRecord {
            id,
            name: self.name,
            position: self.position,
            active: self.active,
            priority: self.priority,
            payload: self.payload,
            frequency_cap: self.frequency_cap,
            view_threshold: None,
            created_at: Some(created_at),
            updated_at: None,
        }
    }
}

/// The four placeholder units a fresh or reset inventory starts with.
pub fn default_ads() -> Vec<AdRecord> {
    let unit = |id: &str, name: &str, position, priority, label: &str| AdRecord {
        id: id.to_string(),
        name: name.to_string(),
        position,
        active: true,
        priority,
        payload: format!("<div class=\"ad-placeholder\">{} ad placeholder</div>", label),
        frequency_cap: None,
        view_threshold: None,
        created_at: None,
        updated_at: None,
    };

    vec![
        unit("ad-top", "Top Banner Ad", AdPosition::Top, Priority::High, "Top banner"),
        unit("ad-middle", "Middle Content Ad", AdPosition::Middle, Priority::Normal, "Middle content"),
        unit("ad-bottom", "Bottom Footer Ad", AdPosition::Bottom, Priority::Low, "Bottom footer"),
        unit("ad-after-timer", "After Timer Ad", AdPosition::AfterTimer, Priority::High, "After timer"),
    ]
}
