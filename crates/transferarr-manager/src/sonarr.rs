//! Adapter for Sonarr's queue API (the `series` manager kind).
//!
//! Wire shape mirrors `radarr.rs`: Sonarr's `/api/v3/queue` uses the same
//! paging and `trackedDownloadState` vocabulary, just scoped to episodes
//! rather than movies.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use crate::error::{ManagerError, ManagerResult};
use crate::{KIND_SERIES, MediaManagerAdapter, QueueItem};

const MANAGER: &str = "sonarr";
const OPERATION_QUEUE: &str = "queue";
const OPERATION_READY: &str = "ready_to_remove";
const PAGE_SIZE: u32 = 200;

/// Address and API key for a Sonarr instance.
#[derive(Debug, Clone)]
pub struct SonarrConfig {
    /// Base URL, e.g. `http://localhost:8989`.
    pub base_url: String,
    /// API key issued by the Sonarr instance.
    pub api_key: String,
    /// Per-call timeout; spec default is 30s.
    pub timeout: Duration,
}

/// `series` media-manager adapter backed by Sonarr's `/api/v3/queue`.
pub struct SonarrAdapter {
    config: SonarrConfig,
    http: reqwest::Client,
}

impl SonarrAdapter {
    /// Constructs the adapter.
    ///
    /// # Panics
    ///
    /// Panics if the underlying HTTP client cannot be built.
    #[must_use]
    pub fn new(config: SonarrConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("sonarr http client");
        Self { config, http }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    fn transient(&self, operation: &'static str, source: reqwest::Error) -> ManagerError {
        ManagerError::Transient {
            manager: MANAGER,
            operation,
            source: Box::new(source),
        }
    }

    async fn fetch_page(&self, page: u32) -> ManagerResult<RawQueuePage> {
        self.http
            .get(self.url("/api/v3/queue"))
            .query(&[
                ("apikey", self.config.api_key.as_str()),
                ("page", &page.to_string()),
                ("pageSize", &PAGE_SIZE.to_string()),
                ("includeUnknownSeriesItems", "true"),
            ])
            .send()
            .await
            .map_err(|source| self.transient(OPERATION_QUEUE, source))?
            .error_for_status()
            .map_err(|source| self.transient(OPERATION_QUEUE, source))?
            .json()
            .await
            .map_err(|source| self.transient(OPERATION_QUEUE, source))
    }
}

#[derive(Debug, Deserialize)]
struct RawQueuePage {
    records: Vec<RawQueueRecord>,
    #[serde(rename = "totalRecords")]
    total_records: u32,
}

#[derive(Debug, Deserialize)]
struct RawQueueRecord {
    id: i64,
    title: Option<String>,
    #[serde(rename = "downloadId")]
    download_id: Option<String>,
    #[serde(rename = "trackedDownloadState")]
    tracked_download_state: Option<String>,
}

fn is_imported(state: Option<&str>) -> bool {
    matches!(state, Some("imported"))
}

#[async_trait]
impl MediaManagerAdapter for SonarrAdapter {
    fn kind(&self) -> &'static str {
        KIND_SERIES
    }

    async fn queue(&self) -> ManagerResult<Vec<QueueItem>> {
        let mut items = Vec::new();
        let mut page = 1;
        loop {
            let response = self.fetch_page(page).await?;
            let fetched = response.records.len() as u32;
            for record in response.records {
                let Some(hash) = record.download_id else {
                    continue;
                };
                items.push(QueueItem {
                    hash,
                    name: record.title.unwrap_or_default(),
                    queue_id: record.id.to_string(),
                });
            }
            if page * PAGE_SIZE >= response.total_records || fetched == 0 {
                break;
            }
            page += 1;
        }
        Ok(items)
    }

    async fn ready_to_remove(&self, queue_id: &str) -> ManagerResult<bool> {
        let response = self
            .http
            .get(self.url(&format!("/api/v3/queue/{queue_id}")))
            .query(&[("apikey", self.config.api_key.as_str())])
            .send()
            .await
            .map_err(|source| self.transient(OPERATION_READY, source))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(true);
        }

        let record: RawQueueRecord = response
            .error_for_status()
            .map_err(|source| self.transient(OPERATION_READY, source))?
            .json()
            .await
            .map_err(|source| self.transient(OPERATION_READY, source))?;

        if record.tracked_download_state.is_none() {
            warn!(queue_id, "sonarr queue record missing trackedDownloadState");
        }
        Ok(is_imported(record.tracked_download_state.as_deref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_imported_state_is_ready_to_remove() {
        assert!(is_imported(Some("imported")));
        assert!(!is_imported(Some("importPending")));
        assert!(!is_imported(None));
    }
}
