#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::multiple_crate_versions)]

//! Filesystem access to a torrent endpoint's payload and metainfo
//! directories, over either a local mount or SFTP.
//!
//! A [`Transport`] is deliberately narrow: list, stat, read whole files
//! (metainfo is small), and open byte streams for copying large payloads.
//! Directory-tree replication and the skip-if-size-matches crash-safety
//! policy live in [`copy`], built on top of these primitives so both
//! backends get it for free.

use std::path::Path;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

pub mod copy;
pub mod descriptor;
pub mod error;
pub mod local;
pub mod sftp;

pub use copy::{copy_tree, CopyOutcome, ProgressFn};
pub use descriptor::{SftpDescriptor, TransportDescriptor};
pub use error::{TransportError, TransportResult};
pub use local::LocalTransport;
pub use sftp::SftpTransport;

/// A single entry returned by [`Transport::list_dir`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    /// File or directory name (no path separators).
    pub name: String,
    /// Whether this entry is itself a directory.
    pub is_dir: bool,
    /// Size in bytes; `0` for directories.
    pub size_bytes: u64,
}

/// The result of [`Transport::stat`]ing a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteStat {
    /// Size in bytes; `0` for directories.
    pub size_bytes: u64,
    /// Whether the path is a directory.
    pub is_dir: bool,
}

/// Filesystem access to one side (home or target) of a connection.
///
/// Implementations must be safe to call concurrently from multiple
/// executor workers; an SFTP implementation typically serializes access
/// to its underlying session internally.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establishes (or re-establishes) connectivity. Called once before a
    /// transport is used and again after a retryable failure.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the endpoint cannot be reached.
    async fn ensure_connected(&self) -> TransportResult<()>;

    /// Lists the immediate children of `path`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotFound`] if `path` does not exist, or
    /// an I/O- or SFTP-layer error otherwise.
    async fn list_dir(&self, path: &str) -> TransportResult<Vec<RemoteEntry>>;

    /// Stats `path`, returning `Ok(None)` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] for failures other than a missing path.
    async fn stat(&self, path: &str) -> TransportResult<Option<RemoteStat>>;

    /// Reads the whole contents of a (small) file, such as a `.torrent`
    /// metainfo file.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the file cannot be read.
    async fn read_file(&self, path: &str) -> TransportResult<Vec<u8>>;

    /// Writes the whole contents of a (small) file, creating parent
    /// directories as needed.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the file cannot be written.
    async fn write_file(&self, path: &str, contents: &[u8]) -> TransportResult<()>;

    /// Recursively creates `path` and any missing ancestors.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the directory cannot be created.
    async fn make_dir_all(&self, path: &str) -> TransportResult<()>;

    /// Opens `path` for streamed reading.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the file cannot be opened.
    async fn open_read(&self, path: &str) -> TransportResult<Box<dyn AsyncRead + Unpin + Send>>;

    /// Opens `path` for streamed writing, creating parent directories and
    /// truncating any existing file.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the file cannot be opened.
    async fn open_write(&self, path: &str) -> TransportResult<Box<dyn AsyncWrite + Unpin + Send>>;
}

/// Joins remote path segments with `/`, the wire convention both SFTP and
/// the local backend (which stores forward-slash-relative paths even on
/// any host) use internally.
#[must_use]
pub fn join(base: &str, child: &str) -> String {
    if base.is_empty() {
        child.to_string()
    } else {
        format!("{}/{}", base.trim_end_matches('/'), child)
    }
}

/// Splits off the first path component, used to resolve Radarr/Sonarr's
/// `movies/Some.Movie.2020` style per-item path against a torrent's
/// top-level file/directory so the right single entry is copied and
/// deduplicated.
#[must_use]
pub fn first_component(path: &str) -> &str {
    Path::new(path)
        .components()
        .next()
        .map(|component| component.as_os_str().to_str().unwrap_or_default())
        .unwrap_or_default()
}
