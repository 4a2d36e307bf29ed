use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Profile fields supplied when a child is registered.
///
/// Anything beyond `name` and `birthDate` is kept verbatim in `extra` so
/// clients can store fields the server does not know about.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildProfile {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A registered child as stored in the `children` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Child {
    pub id: String,
    pub user_id: String,
    #[serde(flatten)]
    pub profile: ChildProfile,
    pub created_at: String,
}

/// The six things a parent can log against a child.
///
/// Serialized as the name of the per-child collection that holds the
/// entries, which is also the path segment used by the REST routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "bowelMovements")]
    BowelMovement,
    #[serde(rename = "sleep")]
    Sleep,
    #[serde(rename = "bottle")]
    Bottle,
    #[serde(rename = "breastfeeding")]
    Breastfeeding,
    #[serde(rename = "solidfeeding")]
    SolidFood,
    #[serde(rename = "sickness")]
    Sickness,
}

impl Category {
    /// Feed concatenation order.
    pub const ALL: [Category; 6] = [
        Category::BowelMovement,
        Category::Sleep,
        Category::Bottle,
        Category::Breastfeeding,
        Category::SolidFood,
        Category::Sickness,
    ];

    pub fn collection(self) -> &'static str {
        match self {
            Self::BowelMovement => "bowelMovements",
            Self::Sleep => "sleep",
            Self::Bottle => "bottle",
            Self::Breastfeeding => "breastfeeding",
            Self::SolidFood => "solidfeeding",
            Self::Sickness => "sickness",
        }
    }

    pub fn from_collection(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.collection() == name)
    }

    /// Position of this category in [`Category::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.collection())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_collection(s.trim()).ok_or_else(|| format!("unknown log category: {}", s))
    }
}
