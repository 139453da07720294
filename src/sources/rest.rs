use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::{ScheduleSource, SourceError, parse_schedule_payload, send_with_cancel};
use crate::models::ScheduleItem;

/// Plain JSON endpoint, no credentials.
#[derive(Clone)]
pub struct RestSource {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl RestSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl ScheduleSource for RestSource {
    fn name(&self) -> &'static str {
        "rest"
    }

    async fn fetch_all(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<ScheduleItem>, SourceError> {
        let request = self
            .client
            .get(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .timeout(self.timeout);
        let response = send_with_cancel(request, cancel).await?;
        let payload: Value = response.json().await?;
        parse_schedule_payload(payload)
    }
}
