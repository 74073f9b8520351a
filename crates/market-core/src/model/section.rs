use serde::{Deserialize, Serialize};

use super::item::ItemKind;

/// A node of the section tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub parent: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub display_order: i64,
    /// Container only; never holds listings directly.
    #[serde(default)]
    pub is_category: bool,
    #[serde(default = "yes")]
    pub allow_offers: bool,
    #[serde(default = "yes")]
    pub allow_wishes: bool,
    /// Other sections rendered as children without being part of the tree.
    #[serde(default)]
    pub links: Vec<String>,
}

const fn yes() -> bool {
    true
}

impl Section {
    /// Local flag only; use the section tree for the inherited check.
    #[must_use]
    pub const fn allows_locally(&self, kind: ItemKind) -> bool {
        match kind {
            ItemKind::Offer => self.allow_offers,
            ItemKind::Wish => self.allow_wishes,
        }
    }
}

/// Cached listing counts for one section and kind.
///
/// The `_hb` variants include hellbanned listings; deleted items are never
/// counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionCounts {
    pub active: i64,
    pub archived: i64,
    pub active_hb: i64,
    pub archived_hb: i64,
}
