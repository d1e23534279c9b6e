use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use strum::{Display, EnumIter, EnumString};

/// Wardrobe buckets the service files classified items under.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
    EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum WardrobeCategory {
    Tshirts,
    Jeans,
    Shoes,
    Watches,
    Caps,
    Bags,
}

impl WardrobeCategory {
    /// Map a detector label ("shirt", "pants", "hat", ...) to its bucket.
    pub fn from_item_type(item_type: &str) -> Option<Self> {
        match item_type.to_lowercase().as_str() {
            "tshirt" | "shirt" => Some(Self::Tshirts),
            "jeans" | "pants" => Some(Self::Jeans),
            "shoes" => Some(Self::Shoes),
            "watch" => Some(Self::Watches),
            "cap" | "hat" => Some(Self::Caps),
            "bag" => Some(Self::Bags),
            _ => None,
        }
    }
}

/// A user's stored wardrobe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wardrobe {
    pub user_id: String,
    pub created_at: NaiveDateTime,
    #[serde(default)]
    pub updated_at: Option<NaiveDateTime>,
    /// Items keyed by category name. Kept as strings so categories the
    /// service adds later still deserialize.
    pub wardrobe: BTreeMap<String, Vec<WardrobeItem>>,
}

impl Wardrobe {
    pub fn items_in(&self, category: WardrobeCategory) -> &[WardrobeItem] {
        self.wardrobe
            .get(&category.to_string())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn total_items(&self) -> usize {
        self.wardrobe.values().map(Vec::len).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WardrobeItem {
    pub id: String,
    #[serde(default)]
    pub image: String,
    pub color: String,
    pub pattern: String,
    #[serde(default)]
    pub attributes: Value,
    pub added_at: NaiveDateTime,

    // Type-specific attributes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shade: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sleeve_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shoe_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WardrobeSummary {
    pub user_id: String,
    pub total_items: u32,
    pub by_category: BTreeMap<String, u32>,
}

/// Filters for GET /wardrobe/{user_id}/search. Unset filters are omitted.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WardrobeQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<WardrobeCategory>,
}
