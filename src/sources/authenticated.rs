use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::{ScheduleSource, SourceError, parse_schedule_payload};
use crate::client::{ApiClient, ApiRequest};
use crate::models::ScheduleItem;

/// JSON endpoint behind bearer auth, called through [`ApiClient`] so an
/// expired token is refreshed transparently.
#[derive(Clone)]
pub struct AuthenticatedRestSource {
    api: ApiClient,
    path: String,
}

impl AuthenticatedRestSource {
    pub fn new(api: ApiClient, path: impl Into<String>) -> Self {
        Self {
            api,
            path: path.into(),
        }
    }
}

#[async_trait]
impl ScheduleSource for AuthenticatedRestSource {
    fn name(&self) -> &'static str {
        "authenticated"
    }

    async fn fetch_all(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<ScheduleItem>, SourceError> {
        let response = self.api.send(&ApiRequest::get(&self.path), cancel).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status(status));
        }
        let payload: Value = response.json().await?;
        parse_schedule_payload(payload)
    }
}
