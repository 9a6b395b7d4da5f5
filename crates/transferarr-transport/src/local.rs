//! Local-filesystem transport: the endpoint's files are directly visible on
//! this host.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{TransportError, TransportResult};
use crate::{RemoteEntry, RemoteStat, Transport};

const OP_LIST: &str = "list_dir";
const OP_STAT: &str = "stat";
const OP_READ: &str = "open_read";
const OP_WRITE: &str = "open_write";
const OP_MKDIR: &str = "make_dir_all";

/// Transport backed directly by `tokio::fs`.
pub struct LocalTransport {
    root: PathBuf,
}

impl LocalTransport {
    /// Creates a transport rooted at `root`; every path passed to its
    /// methods is resolved relative to it.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }

    fn io_err(operation: &'static str, path: &std::path::Path, source: std::io::Error) -> TransportError {
        TransportError::Io {
            operation,
            path: path.display().to_string(),
            source,
        }
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn ensure_connected(&self) -> TransportResult<()> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|source| Self::io_err("ensure_connected", &self.root, source))
    }

    async fn list_dir(&self, path: &str) -> TransportResult<Vec<RemoteEntry>> {
        let resolved = self.resolve(path);
        let mut entries = Vec::new();
        let mut read_dir = fs::read_dir(&resolved)
            .await
            .map_err(|source| Self::io_err(OP_LIST, &resolved, source))?;

        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|source| Self::io_err(OP_LIST, &resolved, source))?
        {
            let metadata = entry
                .metadata()
                .await
                .map_err(|source| Self::io_err(OP_LIST, &entry.path(), source))?;
            entries.push(RemoteEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: metadata.is_dir(),
                size_bytes: metadata.len(),
            });
        }
        Ok(entries)
    }

    async fn stat(&self, path: &str) -> TransportResult<Option<RemoteStat>> {
        let resolved = self.resolve(path);
        match fs::metadata(&resolved).await {
            Ok(metadata) => Ok(Some(RemoteStat {
                size_bytes: metadata.len(),
                is_dir: metadata.is_dir(),
            })),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(Self::io_err(OP_STAT, &resolved, source)),
        }
    }

    async fn read_file(&self, path: &str) -> TransportResult<Vec<u8>> {
        let resolved = self.resolve(path);
        fs::read(&resolved)
            .await
            .map_err(|source| Self::io_err(OP_READ, &resolved, source))
    }

    async fn write_file(&self, path: &str, contents: &[u8]) -> TransportResult<()> {
        let resolved = self.resolve(path);
        if let Some(parent) = resolved.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| Self::io_err(OP_WRITE, parent, source))?;
        }
        fs::write(&resolved, contents)
            .await
            .map_err(|source| Self::io_err(OP_WRITE, &resolved, source))
    }

    async fn make_dir_all(&self, path: &str) -> TransportResult<()> {
        let resolved = self.resolve(path);
        fs::create_dir_all(&resolved)
            .await
            .map_err(|source| Self::io_err(OP_MKDIR, &resolved, source))
    }

    async fn open_read(&self, path: &str) -> TransportResult<Box<dyn AsyncRead + Unpin + Send>> {
        let resolved = self.resolve(path);
        let file = fs::File::open(&resolved)
            .await
            .map_err(|source| Self::io_err(OP_READ, &resolved, source))?;
        Ok(Box::new(file))
    }

    async fn open_write(&self, path: &str) -> TransportResult<Box<dyn AsyncWrite + Unpin + Send>> {
        let resolved = self.resolve(path);
        if let Some(parent) = resolved.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| Self::io_err(OP_WRITE, parent, source))?;
        }
        let file = fs::File::create(&resolved)
            .await
            .map_err(|source| Self::io_err(OP_WRITE, &resolved, source))?;
        Ok(Box::new(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let transport = LocalTransport::new(dir.path());
        transport.write_file("a/b.txt", b"hello").await.unwrap();
        let contents = transport.read_file("a/b.txt").await.unwrap();
        assert_eq!(contents, b"hello");
    }

    #[tokio::test]
    async fn stat_reports_none_for_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let transport = LocalTransport::new(dir.path());
        assert!(transport.stat("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn open_write_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let transport = LocalTransport::new(dir.path());
        let mut writer = transport.open_write("nested/dir/file.bin").await.unwrap();
        writer.write_all(b"payload").await.unwrap();

        let mut reader = transport.open_read("nested/dir/file.bin").await.unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"payload");
    }

    #[tokio::test]
    async fn list_dir_reports_files_and_sizes() {
        let dir = tempfile::tempdir().unwrap();
        let transport = LocalTransport::new(dir.path());
        transport.write_file("movie.mkv", &vec![0_u8; 1024]).await.unwrap();

        let entries = transport.list_dir("").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "movie.mkv");
        assert_eq!(entries[0].size_bytes, 1024);
    }
}
