//! Adapter for the qBittorrent Web API.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{
    AddMetainfoOptions, EndpointClient, EndpointError, EndpointResult, EndpointState,
    TorrentFileEntry, TorrentSummary,
};

const OPERATION_CONNECT: &str = "ensure_connected";
const OPERATION_LIST: &str = "list";
const OPERATION_ADD: &str = "add_metainfo";
const OPERATION_REMOVE: &str = "remove";

/// Credentials and address for a qBittorrent Web API instance.
#[derive(Debug, Clone)]
pub struct QBittorrentConfig {
    /// Base URL, e.g. `http://localhost:8080`.
    pub base_url: String,
    /// Web UI username.
    pub username: String,
    /// Web UI password.
    pub password: String,
    /// Per-call timeout; spec default is 30s.
    pub timeout: Duration,
}

/// Endpoint client backed by qBittorrent's Web API.
pub struct QBittorrentEndpoint {
    name: String,
    config: QBittorrentConfig,
    http: reqwest::Client,
    cookie: Mutex<Option<String>>,
}

impl QBittorrentEndpoint {
    /// Construct an adapter registered under `name`.
    ///
    /// # Panics
    ///
    /// Panics if the underlying HTTP client cannot be built, which only
    /// happens if the process's TLS backend failed to initialise.
    #[must_use]
    pub fn new(name: impl Into<String>, config: QBittorrentConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .cookie_store(false)
            .build()
            .expect("qbittorrent http client");
        Self {
            name: name.into(),
            config,
            http,
            cookie: Mutex::new(None),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    async fn login(&self) -> EndpointResult<String> {
        let response = self
            .http
            .post(self.url("/api/v2/auth/login"))
            .form(&[
                ("username", self.config.username.as_str()),
                ("password", self.config.password.as_str()),
            ])
            .send()
            .await
            .map_err(|source| self.transient(OPERATION_CONNECT, source))?;

        let cookie = response
            .headers()
            .get(reqwest::header::SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(';').next())
            .map(str::to_string)
            .ok_or_else(|| self.fatal_msg(OPERATION_CONNECT, "no session cookie in response"))?;

        Ok(cookie)
    }

    async fn session_cookie(&self) -> EndpointResult<String> {
        let mut guard = self.cookie.lock().await;
        if let Some(cookie) = guard.as_ref() {
            return Ok(cookie.clone());
        }
        let cookie = self.login().await?;
        *guard = Some(cookie.clone());
        Ok(cookie)
    }

    async fn authed_request(
        &self,
        builder_fn: impl Fn(&reqwest::Client, &str) -> reqwest::RequestBuilder,
        operation: &'static str,
    ) -> EndpointResult<reqwest::Response> {
        let cookie = self.session_cookie().await?;
        let response = builder_fn(&self.http, &self.url(""))
            .header(reqwest::header::COOKIE, &cookie)
            .send()
            .await
            .map_err(|source| self.transient(operation, source))?;

        if response.status() == reqwest::StatusCode::FORBIDDEN {
            // Session expired; drop it so the next call re-authenticates.
            *self.cookie.lock().await = None;
            return Err(self.fatal_msg(operation, "session expired"));
        }
        Ok(response)
    }

    fn transient(&self, operation: &'static str, source: reqwest::Error) -> EndpointError {
        EndpointError::Transient {
            endpoint: self.name.clone(),
            operation,
            source: Box::new(source),
        }
    }

    fn fatal_msg(&self, operation: &'static str, message: &str) -> EndpointError {
        EndpointError::Fatal {
            endpoint: self.name.clone(),
            operation,
            source: message.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawTorrentInfo {
    hash: String,
    name: String,
    state: String,
}

#[derive(Debug, Deserialize)]
struct RawTorrentFile {
    name: String,
    size: u64,
}

fn map_native_state(native: &str) -> EndpointState {
    match native {
        "queuedDL" | "queuedUP" | "metaDL" | "allocating" => EndpointState::Queued,
        "checkingDL" | "checkingUP" | "checkingResumeData" => EndpointState::Checking,
        "downloading" | "forcedDL" | "stalledDL" => EndpointState::Downloading,
        "uploading" | "forcedUP" | "stalledUP" => EndpointState::Seeding,
        "pausedDL" | "pausedUP" => EndpointState::Paused,
        "error" | "missingFiles" | "unknown" => EndpointState::Error,
        other => {
            warn!(native_state = other, "unrecognised qbittorrent state, mapping to error");
            EndpointState::Error
        }
    }
}

#[async_trait]
impl EndpointClient for QBittorrentEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ensure_connected(&self) -> EndpointResult<()> {
        self.session_cookie().await.map(|_| ())
    }

    async fn list(&self) -> EndpointResult<HashMap<String, TorrentSummary>> {
        let response = self
            .authed_request(
                |client, base| client.get(format!("{base}/api/v2/torrents/info")),
                OPERATION_LIST,
            )
            .await?;

        let infos: Vec<RawTorrentInfo> = response
            .json()
            .await
            .map_err(|source| self.transient(OPERATION_LIST, source))?;

        let mut summaries = HashMap::with_capacity(infos.len());
        for info in infos {
            let hash = info.hash.to_ascii_lowercase();
            let files = self.files_for(&hash).await.unwrap_or_else(|error| {
                debug!(%hash, %error, "failed to fetch file listing, continuing without it");
                Vec::new()
            });
            summaries.insert(
                hash.clone(),
                TorrentSummary {
                    hash,
                    name: info.name,
                    state: map_native_state(&info.state),
                    files,
                },
            );
        }
        Ok(summaries)
    }

    async fn add_metainfo(
        &self,
        metainfo: &[u8],
        options: AddMetainfoOptions,
    ) -> EndpointResult<()> {
        let cookie = self.session_cookie().await?;
        let part = reqwest::multipart::Part::bytes(metainfo.to_vec())
            .file_name("transferarr.torrent")
            .mime_str("application/x-bittorrent")
            .map_err(|source| self.transient(OPERATION_ADD, source))?;
        let form = reqwest::multipart::Form::new()
            .part("torrents", part)
            .text("savepath", options.save_path)
            .text("paused", if options.paused { "true" } else { "false" });

        let response = self
            .http
            .post(self.url("/api/v2/torrents/add"))
            .header(reqwest::header::COOKIE, &cookie)
            .multipart(form)
            .send()
            .await
            .map_err(|source| self.transient(OPERATION_ADD, source))?;

        if !response.status().is_success() {
            return Err(self.fatal_msg(
                OPERATION_ADD,
                &format!("client rejected add with status {}", response.status()),
            ));
        }
        Ok(())
    }

    async fn remove(&self, hash: &str, delete_data: bool) -> EndpointResult<()> {
        let cookie = self.session_cookie().await?;
        let response = self
            .http
            .post(self.url("/api/v2/torrents/delete"))
            .header(reqwest::header::COOKIE, &cookie)
            .form(&[
                ("hashes", hash.to_ascii_lowercase()),
                ("deleteFiles", delete_data.to_string()),
            ])
            .send()
            .await
            .map_err(|source| self.transient(OPERATION_REMOVE, source))?;

        if !response.status().is_success() {
            return Err(self.fatal_msg(
                OPERATION_REMOVE,
                &format!("client rejected delete with status {}", response.status()),
            ));
        }
        Ok(())
    }
}

impl QBittorrentEndpoint {
    async fn files_for(&self, hash: &str) -> EndpointResult<Vec<TorrentFileEntry>> {
        let response = self
            .authed_request(
                |client, base| {
                    client.get(format!("{base}/api/v2/torrents/files")).query(&[("hash", hash)])
                },
                OPERATION_LIST,
            )
            .await?;

        let files: Vec<RawTorrentFile> = response
            .json()
            .await
            .map_err(|source| self.transient(OPERATION_LIST, source))?;

        Ok(files
            .into_iter()
            .map(|file| TorrentFileEntry {
                path: file.name,
                size_bytes: file.size,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_states_into_universal_set() {
        assert_eq!(map_native_state("downloading"), EndpointState::Downloading);
        assert_eq!(map_native_state("stalledUP"), EndpointState::Seeding);
        assert_eq!(map_native_state("pausedDL"), EndpointState::Paused);
        assert_eq!(map_native_state("checkingResumeData"), EndpointState::Checking);
    }

    #[test]
    fn unknown_state_maps_to_error_rather_than_panicking() {
        assert_eq!(map_native_state("somethingNew"), EndpointState::Error);
    }
}
