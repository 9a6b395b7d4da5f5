//! Adapter for Transmission's RPC protocol.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::warn;

use crate::{
    AddMetainfoOptions, EndpointClient, EndpointError, EndpointResult, EndpointState,
    TorrentFileEntry, TorrentSummary,
};

const OPERATION_CONNECT: &str = "ensure_connected";
const OPERATION_LIST: &str = "list";
const OPERATION_ADD: &str = "add_metainfo";
const OPERATION_REMOVE: &str = "remove";
const SESSION_ID_HEADER: &str = "X-Transmission-Session-Id";

/// Address and optional basic-auth credentials for a Transmission RPC
/// endpoint.
#[derive(Debug, Clone)]
pub struct TransmissionConfig {
    /// Base URL, e.g. `http://localhost:9091`.
    pub base_url: String,
    /// Optional basic-auth username.
    pub username: Option<String>,
    /// Optional basic-auth password.
    pub password: Option<String>,
    /// Per-call timeout; spec default is 30s.
    pub timeout: Duration,
}

/// Endpoint client backed by Transmission's RPC interface.
pub struct TransmissionEndpoint {
    name: String,
    config: TransmissionConfig,
    http: reqwest::Client,
    session_id: Mutex<Option<String>>,
}

impl TransmissionEndpoint {
    /// Construct an adapter registered under `name`.
    ///
    /// # Panics
    ///
    /// Panics if the underlying HTTP client cannot be built.
    #[must_use]
    pub fn new(name: impl Into<String>, config: TransmissionConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("transmission http client");
        Self {
            name: name.into(),
            config,
            http,
            session_id: Mutex::new(None),
        }
    }

    fn rpc_url(&self) -> String {
        format!("{}/transmission/rpc", self.config.base_url.trim_end_matches('/'))
    }

    fn request(&self) -> reqwest::RequestBuilder {
        let mut builder = self.http.post(self.rpc_url());
        if let Some(username) = &self.config.username {
            builder = builder.basic_auth(username, self.config.password.as_ref());
        }
        builder
    }

    async fn call(&self, method: &str, arguments: Value, operation: &'static str) -> EndpointResult<Value> {
        let body = json!({ "method": method, "arguments": arguments });

        let session_id = self.session_id.lock().await.clone();
        let mut builder = self.request().json(&body);
        if let Some(session_id) = &session_id {
            builder = builder.header(SESSION_ID_HEADER, session_id);
        }

        let response = builder
            .send()
            .await
            .map_err(|source| self.transient(operation, source))?;

        if response.status() == reqwest::StatusCode::CONFLICT {
            let fresh = response
                .headers()
                .get(SESSION_ID_HEADER)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
                .ok_or_else(|| self.fatal_msg(operation, "409 without session id header"))?;
            *self.session_id.lock().await = Some(fresh.clone());

            let response = self
                .request()
                .json(&body)
                .header(SESSION_ID_HEADER, &fresh)
                .send()
                .await
                .map_err(|source| self.transient(operation, source))?;
            return self.parse_rpc_response(response, operation).await;
        }

        self.parse_rpc_response(response, operation).await
    }

    async fn parse_rpc_response(
        &self,
        response: reqwest::Response,
        operation: &'static str,
    ) -> EndpointResult<Value> {
        let envelope: RpcEnvelope = response
            .json()
            .await
            .map_err(|source| self.transient(operation, source))?;
        if envelope.result != "success" {
            return Err(self.fatal_msg(operation, &format!("rpc result: {}", envelope.result)));
        }
        Ok(envelope.arguments)
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
struct RpcEnvelope {
    result: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct RawTorrent {
    #[serde(rename = "hashString")]
    hash_string: String,
    name: String,
    status: u64,
    files: Option<Vec<RawFile>>,
}

#[derive(Debug, Deserialize)]
struct RawFile {
    name: String,
    length: u64,
}

#[derive(Debug, Serialize)]
struct TorrentGetArgs<'a> {
    fields: &'a [&'a str],
}

fn map_native_status(status: u64) -> EndpointState {
    // Transmission's `status` field: 0 stopped, 1 check-wait, 2 check,
    // 3 download-wait, 4 download, 5 seed-wait, 6 seed.
    match status {
        0 => EndpointState::Paused,
        1 | 3 => EndpointState::Queued,
        2 => EndpointState::Checking,
        4 => EndpointState::Downloading,
        5 | 6 => EndpointState::Seeding,
        other => {
            warn!(native_status = other, "unrecognised transmission status, mapping to error");
            EndpointState::Error
        }
    }
}

#[async_trait]
impl EndpointClient for TransmissionEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ensure_connected(&self) -> EndpointResult<()> {
        self.call("session-get", json!({}), OPERATION_CONNECT)
            .await
            .map(|_| ())
    }

    async fn list(&self) -> EndpointResult<HashMap<String, TorrentSummary>> {
        let args = TorrentGetArgs {
            fields: &["hashString", "name", "status", "files"],
        };
        let value = self
            .call(
                "torrent-get",
                serde_json::to_value(args).expect("serialisable args"),
                OPERATION_LIST,
            )
            .await?;

        let torrents: Vec<RawTorrent> = serde_json::from_value(
            value.get("torrents").cloned().unwrap_or(Value::Array(Vec::new())),
        )
        .map_err(|source| self.fatal_msg(OPERATION_LIST, &source.to_string()))?;

        Ok(torrents
            .into_iter()
            .map(|torrent| {
                let hash = torrent.hash_string.to_ascii_lowercase();
                let files = torrent
                    .files
                    .unwrap_or_default()
                    .into_iter()
                    .map(|file| TorrentFileEntry {
                        path: file.name,
                        size_bytes: file.length,
                    })
                    .collect();
                (
                    hash.clone(),
                    TorrentSummary {
                        hash,
                        name: torrent.name,
                        state: map_native_status(torrent.status),
                        files,
                    },
                )
            })
            .collect())
    }

    async fn add_metainfo(
        &self,
        metainfo: &[u8],
        options: AddMetainfoOptions,
    ) -> EndpointResult<()> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(metainfo);
        self.call(
            "torrent-add",
            json!({
                "metainfo": encoded,
                "download-dir": options.save_path,
                "paused": options.paused,
            }),
            OPERATION_ADD,
        )
        .await
        .map(|_| ())
    }

    async fn remove(&self, hash: &str, delete_data: bool) -> EndpointResult<()> {
        self.call(
            "torrent-remove",
            json!({
                "ids": [hash.to_ascii_lowercase()],
                "delete-local-data": delete_data,
            }),
            OPERATION_REMOVE,
        )
        .await
        .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_status_codes_into_universal_set() {
        assert_eq!(map_native_status(4), EndpointState::Downloading);
        assert_eq!(map_native_status(6), EndpointState::Seeding);
        assert_eq!(map_native_status(0), EndpointState::Paused);
        assert_eq!(map_native_status(2), EndpointState::Checking);
    }

    #[test]
    fn unknown_status_maps_to_error() {
        assert_eq!(map_native_status(99), EndpointState::Error);
    }
}
