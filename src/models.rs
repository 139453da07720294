use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const DEFAULT_CATEGORY: &str = "DEFAULT";

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

/// One itinerary entry: when, where, and what kind of stop it is.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[schema(example = "2026.02.04 (수)")]
    pub date: String,
    #[schema(example = "12:30 ~ 14:00")]
    pub time_range: String,
    pub content: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Snapshot of a schedule fetch cycle.
///
/// Once a cycle completes `is_loading` is false and exactly one of `error` or
/// `data` carries the outcome.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FetchState {
    pub data: Vec<ScheduleItem>,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl FetchState {
    pub fn loaded(data: Vec<ScheduleItem>) -> Self {
        Self {
            data,
            is_loading: false,
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            data: Vec::new(),
            is_loading: false,
            error: Some(message.into()),
        }
    }
}
