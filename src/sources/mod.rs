//! Interchangeable backends that produce the itinerary list.

mod authenticated;
mod rest;
mod spreadsheet;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use config::ConfigError;
use http::StatusCode;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub use authenticated::AuthenticatedRestSource;
pub use rest::RestSource;
pub use spreadsheet::{SpreadsheetSource, parse_schedule_csv};

use crate::client::{ApiClient, ClientError};
use crate::models::ScheduleItem;
use crate::settings::{Settings, SourceKind};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {0}")]
    Status(StatusCode),
    #[error("Unexpected API response format")]
    UnexpectedFormat,
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Spreadsheet column not found: {0}")]
    MissingColumn(String),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("Fetch did not finish within {0:?}")]
    Timeout(Duration),
    #[error("Fetch cancelled")]
    Cancelled,
}

/// A backend able to return the whole itinerary in one call.
#[async_trait]
pub trait ScheduleSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch_all(&self, cancel: &CancellationToken)
    -> Result<Vec<ScheduleItem>, SourceError>;
}

/// Accepts either a `{ "data": [...] }` envelope or a bare list.
pub fn parse_schedule_payload(payload: Value) -> Result<Vec<ScheduleItem>, SourceError> {
    let list = match payload {
        Value::Array(_) => payload,
        Value::Object(mut envelope) => match envelope.remove("data") {
            Some(data @ Value::Array(_)) => data,
            _ => return Err(SourceError::UnexpectedFormat),
        },
        _ => return Err(SourceError::UnexpectedFormat),
    };
    Ok(serde_json::from_value(list)?)
}

/// Sends `request` unless `cancel` fires first; non-2xx is an error.
pub(crate) async fn send_with_cancel(
    request: reqwest::RequestBuilder,
    cancel: &CancellationToken,
) -> Result<reqwest::Response, SourceError> {
    let request = request.send();
    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(SourceError::Cancelled),
        response = request => response?,
    };
    let status = response.status();
    if !status.is_success() {
        return Err(SourceError::Status(status));
    }
    Ok(response)
}

/// Builds the backend selected by `settings.source`.
pub fn from_settings(
    settings: &Settings,
    api: ApiClient,
) -> Result<Arc<dyn ScheduleSource>, ConfigError> {
    let timeout = Duration::from_secs(settings.request_timeout_secs);
    let source: Arc<dyn ScheduleSource> = match settings.source {
        SourceKind::Rest => Arc::new(RestSource::new(
            format!(
                "{}{}",
                settings.api_base_url.as_str().trim_end_matches('/'),
                settings.schedules_path
            ),
            timeout,
        )),
        SourceKind::Spreadsheet => {
            let url = settings
                .spreadsheet_url
                .clone()
                .ok_or_else(|| ConfigError::NotFound("spreadsheet_url".into()))?;
            Arc::new(SpreadsheetSource::new(
                url,
                settings.columns.clone(),
                timeout,
            ))
        }
        SourceKind::Authenticated => Arc::new(AuthenticatedRestSource::new(
            api,
            settings.schedules_path.clone(),
        )),
    };
    Ok(source)
}
