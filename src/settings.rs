use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment};
use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_ERROR_MESSAGE: &str = "일정 데이터를 서버에서 불러오지 못했습니다.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Rest,
    Spreadsheet,
    Authenticated,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateKind {
    Token,
    Identity,
}

/// Header display names of the published itinerary sheet.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnNames {
    pub date: String,
    pub time_range: String,
    pub content: String,
    pub latitude: String,
    pub longitude: String,
    pub category: String,
    pub note: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Settings {
    pub api_base_url: Url,
    pub schedules_path: String,
    pub refresh_path: String,
    pub login_path: String,
    pub source: SourceKind,
    pub spreadsheet_url: Option<Url>,
    pub columns: ColumnNames,
    pub auth_gate: GateKind,
    pub request_timeout_secs: u64,
    pub fetch_deadline_secs: u64,
    pub error_message: String,
    pub google_client_id: Option<String>,
    pub timezone: String,
    pub debug: bool,
    pub enable_swagger: bool,
    pub port: u16,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let config = Self::defaults_builder()?
            // APP_API_BASE_URL, APP_COLUMNS__DATE, ...
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Settings with every default applied and no environment lookup.
    pub fn defaults() -> Result<Self, ConfigError> {
        Self::defaults_builder()?.build()?.try_deserialize()
    }

    fn defaults_builder() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("api_base_url", "http://localhost:8080/api/v1")?
            .set_default("schedules_path", "/schedules")?
            .set_default("refresh_path", "/auth/refresh")?
            .set_default("login_path", "/login")?
            .set_default("source", "authenticated")?
            .set_default("columns.date", "Date")?
            .set_default("columns.time_range", "Time")?
            .set_default("columns.content", "Content")?
            .set_default("columns.latitude", "Latitude")?
            .set_default("columns.longitude", "Longitude")?
            .set_default("columns.category", "Category")?
            .set_default("columns.note", "Note")?
            .set_default("auth_gate", "token")?
            .set_default("request_timeout_secs", 10)?
            .set_default("fetch_deadline_secs", 30)?
            .set_default("error_message", DEFAULT_ERROR_MESSAGE)?
            .set_default("timezone", "Asia/Tokyo")?
            .set_default("debug", false)?
            .set_default("enable_swagger", true)?
            .set_default("port", 3000)
    }

    pub fn timezone(&self) -> Result<chrono_tz::Tz, ConfigError> {
        self.timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|err| ConfigError::Message(format!("invalid timezone {}: {err}", self.timezone)))
    }
}
