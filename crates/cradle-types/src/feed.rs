use serde::{Deserialize, Serialize};

use crate::models::Category;

/// Coarse grouping shown in the feed. The three feeding collections share
/// one label and are told apart by [`FeedingKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedCategory {
    BowelMovement,
    Sleep,
    Feeding,
    Sickness,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedingKind {
    Bottle,
    Breastfeeding,
    SolidFood,
}

impl From<Category> for FeedCategory {
    fn from(category: Category) -> Self {
        match category {
            Category::BowelMovement => Self::BowelMovement,
            Category::Sleep => Self::Sleep,
            Category::Bottle | Category::Breastfeeding | Category::SolidFood => Self::Feeding,
            Category::Sickness => Self::Sickness,
        }
    }
}

impl FeedingKind {
    pub fn of(category: Category) -> Option<Self> {
        match category {
            Category::Bottle => Some(Self::Bottle),
            Category::Breastfeeding => Some(Self::Breastfeeding),
            Category::SolidFood => Some(Self::SolidFood),
            _ => None,
        }
    }
}

/// One row of the aggregated per-child feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    pub id: String,
    pub category: FeedCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_category: Option<FeedingKind>,
    /// Empty when `timestamp` does not parse.
    pub display_date: String,
    pub timestamp: String,
    pub data: serde_json::Value,
}
