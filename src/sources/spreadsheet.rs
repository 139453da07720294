use std::time::Duration;

use async_trait::async_trait;
use csv::{ReaderBuilder, StringRecord, Trim};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use super::{ScheduleSource, SourceError, send_with_cancel};
use crate::models::{DEFAULT_CATEGORY, ScheduleItem};
use crate::settings::ColumnNames;
use crate::validation::{non_blank, parse_coordinate};

/// CSV export of a published spreadsheet.
#[derive(Clone)]
pub struct SpreadsheetSource {
    client: reqwest::Client,
    url: Url,
    columns: ColumnNames,
    timeout: Duration,
}

impl SpreadsheetSource {
    pub fn new(url: Url, columns: ColumnNames, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            columns,
            timeout,
        }
    }
}

#[async_trait]
impl ScheduleSource for SpreadsheetSource {
    fn name(&self) -> &'static str {
        "spreadsheet"
    }

    async fn fetch_all(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<ScheduleItem>, SourceError> {
        let request = self.client.get(self.url.clone()).timeout(self.timeout);
        let response = send_with_cancel(request, cancel).await?;
        let body = response.text().await?;
        parse_schedule_csv(&body, &self.columns)
    }
}

struct ColumnLayout {
    date: usize,
    time_range: usize,
    content: usize,
    latitude: usize,
    longitude: usize,
    category: Option<usize>,
    note: Option<usize>,
}

impl ColumnLayout {
    fn resolve(headers: &StringRecord, names: &ColumnNames) -> Result<Self, SourceError> {
        let find = |name: &str| {
            headers.iter().position(|header| {
                header
                    .trim_start_matches('\u{feff}')
                    .trim()
                    .eq_ignore_ascii_case(name.trim())
            })
        };
        let require = |name: &str| find(name).ok_or_else(|| SourceError::MissingColumn(name.to_string()));

        Ok(Self {
            date: require(&names.date)?,
            time_range: require(&names.time_range)?,
            content: require(&names.content)?,
            latitude: require(&names.latitude)?,
            longitude: require(&names.longitude)?,
            category: find(&names.category),
            note: find(&names.note),
        })
    }
}

/// Turns the sheet export into schedule items.
///
/// Merged date cells export as blanks, so a blank date takes the last
/// non-blank date above it. Rows whose latitude or longitude is not a finite
/// number are dropped.
pub fn parse_schedule_csv(
    body: &str,
    columns: &ColumnNames,
) -> Result<Vec<ScheduleItem>, SourceError> {
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .trim(Trim::All)
        .from_reader(body.as_bytes());
    let layout = ColumnLayout::resolve(reader.headers()?, columns)?;

    let mut last_date = String::new();
    let mut items = Vec::new();
    let mut dropped = 0usize;

    for (index, record) in reader.records().enumerate() {
        // header is line 1
        let line = index + 2;
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                debug!(line, error = %err, "skipping unreadable row");
                dropped += 1;
                continue;
            }
        };
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        let cell = |position: usize| record.get(position).unwrap_or("").trim();
        let optional = |position: Option<usize>| non_blank(position.and_then(|p| record.get(p)));

        if let Some(date) = non_blank(Some(cell(layout.date))) {
            last_date = date.to_string();
        }

        let (Some(lat), Some(lng)) = (
            parse_coordinate(cell(layout.latitude)),
            parse_coordinate(cell(layout.longitude)),
        ) else {
            debug!(line, content = cell(layout.content), "dropping row without valid coordinates");
            dropped += 1;
            continue;
        };

        items.push(ScheduleItem {
            id: None,
            date: last_date.clone(),
            time_range: cell(layout.time_range).to_string(),
            content: cell(layout.content).to_string(),
            lat,
            lng,
            category: optional(layout.category)
                .unwrap_or(DEFAULT_CATEGORY)
                .to_string(),
            note: optional(layout.note).map(str::to_string),
        });
    }

    if dropped > 0 {
        info!(dropped, kept = items.len(), "spreadsheet rows dropped");
    }
    Ok(items)
}
