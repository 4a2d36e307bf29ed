use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::Category;

/// A category-specific payload stored in one of the per-child log
/// collections.
///
/// `Patch` is the shape accepted by a merge update: every field optional and
/// omitted from the serialized form when unset, so only supplied fields
/// overwrite the stored document.
///
/// Every payload and patch carries an `extra` map. Fields the client sends
/// beyond the known ones are stored and returned as they are.
pub trait LogPayload: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const CATEGORY: Category;
    type Patch: Serialize + DeserializeOwned + Clone + Send + Sync + 'static;
}

/// A decoded log entry together with its document id and timestamp.
///
/// `timestamp` stays a string: it is written by clients and may not parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry<P> {
    pub id: String,
    pub timestamp: String,
    #[serde(flatten)]
    pub payload: P,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BowelMovement {
    pub movement_type: String,
    pub time_of_day: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BowelMovementPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub movement_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_of_day: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BowelMovement {
    pub fn new(movement_type: impl Into<String>, time_of_day: impl Into<String>) -> Self {
        Self {
            movement_type: movement_type.into(),
            time_of_day: time_of_day.into(),
            extra: Map::new(),
        }
    }
}

impl LogPayload for BowelMovement {
    const CATEGORY: Category = Category::BowelMovement;
    type Patch = BowelMovementPatch;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sleep {
    pub from_time: String,
    pub to_time: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SleepPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_time: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Sleep {
    pub fn new(from_time: impl Into<String>, to_time: impl Into<String>) -> Self {
        Self {
            from_time: from_time.into(),
            to_time: to_time.into(),
            extra: Map::new(),
        }
    }
}

impl LogPayload for Sleep {
    const CATEGORY: Category = Category::Sleep;
    type Patch = SleepPatch;
}

// The remaining payloads are all-optional, so they double as their own patch.

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BottleFeeding {
    /// Millilitres.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub increment_volume: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing_choice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specific_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_of_day: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baby_burp: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LogPayload for BottleFeeding {
    const CATEGORY: Category = Category::Bottle;
    type Patch = BottleFeeding;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Breastfeeding {
    /// "left", "right" or "both".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing_choice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specific_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_of_day: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LogPayload for Breastfeeding {
    const CATEGORY: Category = Category::Breastfeeding;
    type Patch = Breastfeeding;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolidFeeding {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub food: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing_choice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specific_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_of_day: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reaction: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LogPayload for SolidFeeding {
    const CATEGORY: Category = Category::SolidFood;
    type Patch = SolidFeeding;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sickness {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Degrees Celsius.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medication: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LogPayload for Sickness {
    const CATEGORY: Category = Category::Sickness;
    type Patch = Sickness;
}
