//! SFTP transport, for connections where the home or target client's
//! payload/metainfo directories are reached over SSH rather than mounted
//! locally.
//!
//! `ssh2` is blocking, so every call is dispatched onto
//! [`tokio::task::spawn_blocking`] against a session guarded by a
//! [`std::sync::Mutex`]; a dropped connection is re-dialed lazily on the
//! next call rather than eagerly retried in the background.

use std::fs;
use std::future::Future as _;
use std::io::Read as _;
use std::net::TcpStream;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ssh2::Session;
use ssh2_config::{ParseRule, SshConfig};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::descriptor::SftpDescriptor;
use crate::error::{TransportError, TransportResult};
use crate::{RemoteEntry, RemoteStat, Transport};

/// How an [`SftpTransport`] authenticates once it has resolved a host,
/// port and username.
#[derive(Debug, Clone)]
enum Auth {
    Password(String),
    PrivateKey { identity_file: PathBuf },
}

#[derive(Debug, Clone)]
struct Dial {
    host: String,
    port: u16,
    username: String,
    auth: Auth,
}

/// Transport over SFTP, built from an inline host/credentials pair or
/// resolved from an `ssh_config`-style file.
pub struct SftpTransport {
    name: String,
    dial: Dial,
    session: Mutex<Option<Arc<Mutex<Session>>>>,
}

impl SftpTransport {
    /// Builds a transport from a connection-config descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::UnknownSshAlias`] if `descriptor` is
    /// [`SftpDescriptor::BySshAlias`] and the alias is not present in the
    /// referenced SSH client configuration file, or an I/O error if that
    /// file cannot be read.
    pub fn from_descriptor(name: impl Into<String>, descriptor: &SftpDescriptor) -> TransportResult<Self> {
        let dial = match descriptor {
            SftpDescriptor::ByHostCredentials {
                host,
                port,
                username,
                password,
            } => Dial {
                host: host.clone(),
                port: *port,
                username: username.clone(),
                auth: Auth::Password(password.clone()),
            },
            SftpDescriptor::BySshAlias {
                ssh_config_file,
                ssh_config_host,
            } => Self::resolve_ssh_alias(ssh_config_file, ssh_config_host)?,
        };

        Ok(Self {
            name: name.into(),
            dial,
            session: Mutex::new(None),
        })
    }

    fn resolve_ssh_alias(config_file: &std::path::Path, alias: &str) -> TransportResult<Dial> {
        let mut reader = fs::File::open(config_file)
            .map(std::io::BufReader::new)
            .map_err(|source| TransportError::Io {
                operation: "read_ssh_config",
                path: config_file.display().to_string(),
                source,
            })?;

        let config = SshConfig::parse(&mut reader, ParseRule::STRICT).map_err(|error| {
            TransportError::Io {
                operation: "parse_ssh_config",
                path: config_file.display().to_string(),
                source: std::io::Error::other(error.to_string()),
            }
        })?;

        let params = config.query(alias);
        let host = params.host_name.clone().unwrap_or_else(|| alias.to_string());
        let port = params.port.unwrap_or(22);
        let username = params.user.clone().ok_or_else(|| TransportError::UnknownSshAlias {
            config_file: config_file.display().to_string(),
            alias: alias.to_string(),
        })?;
        let identity_file = params
            .identity_file
            .as_ref()
            .and_then(|files| files.first().cloned())
            .ok_or_else(|| TransportError::UnknownSshAlias {
                config_file: config_file.display().to_string(),
                alias: alias.to_string(),
            })?;

        Ok(Dial {
            host,
            port,
            username,
            auth: Auth::PrivateKey { identity_file },
        })
    }

    fn dial(dial: &Dial) -> TransportResult<Session> {
        let address = format!("{}:{}", dial.host, dial.port);
        let tcp = TcpStream::connect(address.as_str()).map_err(|source| TransportError::Io {
            operation: "tcp_connect",
            path: address.clone(),
            source,
        })?;

        let mut session = Session::new().map_err(|source| TransportError::Sftp {
            operation: "new_session",
            path: address.clone(),
            source,
        })?;
        session.set_tcp_stream(tcp);
        session.handshake().map_err(|source| TransportError::Sftp {
            operation: "handshake",
            path: address.clone(),
            source,
        })?;

        match &dial.auth {
            Auth::Password(password) => {
                session
                    .userauth_password(&dial.username, password)
                    .map_err(|source| TransportError::Sftp {
                        operation: "userauth_password",
                        path: address.clone(),
                        source,
                    })?;
            }
            Auth::PrivateKey { identity_file } => {
                session
                    .userauth_pubkey_file(&dial.username, None, identity_file, None)
                    .map_err(|source| TransportError::Sftp {
                        operation: "userauth_pubkey_file",
                        path: address.clone(),
                        source,
                    })?;
            }
        }

        Ok(session)
    }

    fn session_handle(&self) -> TransportResult<Arc<Mutex<Session>>> {
        let mut guard = self.session.lock().expect("sftp session mutex poisoned");
        if let Some(existing) = guard.as_ref() {
            return Ok(Arc::clone(existing));
        }
        debug!(endpoint = %self.name, "dialing sftp session");
        let session = Self::dial(&self.dial)?;
        let handle = Arc::new(Mutex::new(session));
        *guard = Some(Arc::clone(&handle));
        Ok(handle)
    }

    fn drop_session(&self) {
        *self.session.lock().expect("sftp session mutex poisoned") = None;
    }

    async fn with_sftp<T, F>(&self, operation: &'static str, path: String, f: F) -> TransportResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&ssh2::Sftp) -> Result<T, ssh2::Error> + Send + 'static,
    {
        let handle = self.session_handle()?;
        let result = tokio::task::spawn_blocking(move || {
            let session = handle.lock().expect("sftp session mutex poisoned");
            let sftp = session.sftp()?;
            f(&sftp)
        })
        .await
        .expect("sftp blocking task panicked");

        result.map_err(|source| {
            self.drop_session();
            TransportError::Sftp {
                operation,
                path,
                source,
            }
        })
    }
}

#[async_trait]
impl Transport for SftpTransport {
    async fn ensure_connected(&self) -> TransportResult<()> {
        self.session_handle().map(|_| ())
    }

    async fn list_dir(&self, path: &str) -> TransportResult<Vec<RemoteEntry>> {
        let remote_path = PathBuf::from(path);
        self.with_sftp("list_dir", path.to_string(), move |sftp| {
            let entries = sftp.readdir(&remote_path)?;
            Ok(entries
                .into_iter()
                .map(|(entry_path, stat)| RemoteEntry {
                    name: entry_path
                        .file_name()
                        .map(|name| name.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                    is_dir: stat.is_dir(),
                    size_bytes: stat.size.unwrap_or(0),
                })
                .collect())
        })
        .await
    }

    async fn stat(&self, path: &str) -> TransportResult<Option<RemoteStat>> {
        let remote_path = PathBuf::from(path);
        let path_owned = path.to_string();
        let handle = self.session_handle()?;
        let result = tokio::task::spawn_blocking(move || {
            let session = handle.lock().expect("sftp session mutex poisoned");
            let sftp = session.sftp()?;
            sftp.stat(&remote_path)
        })
        .await
        .expect("sftp blocking task panicked");

        match result {
            Ok(stat) => Ok(Some(RemoteStat {
                size_bytes: stat.size.unwrap_or(0),
                is_dir: stat.is_dir(),
            })),
            Err(error) if error.code() == ssh2::ErrorCode::SFTP(2) => Ok(None), // SSH_FX_NO_SUCH_FILE
            Err(source) => {
                self.drop_session();
                Err(TransportError::Sftp {
                    operation: "stat",
                    path: path_owned,
                    source,
                })
            }
        }
    }

    async fn read_file(&self, path: &str) -> TransportResult<Vec<u8>> {
        let remote_path = PathBuf::from(path);
        self.with_sftp("read_file", path.to_string(), move |sftp| {
            let mut file = sftp.open(&remote_path)?;
            let mut contents = Vec::new();
            file.read_to_end(&mut contents)
                .map_err(|error| ssh2::Error::new(ssh2::ErrorCode::Session(-1), error.to_string()))?;
            Ok(contents)
        })
        .await
    }

    async fn write_file(&self, path: &str, contents: &[u8]) -> TransportResult<()> {
        let remote_path = PathBuf::from(path);
        if let Some(parent) = remote_path.parent() {
            self.make_dir_all(&parent.to_string_lossy()).await?;
        }
        let bytes = contents.to_vec();
        self.with_sftp("write_file", path.to_string(), move |sftp| {
            use std::io::Write as _;
            let mut file = sftp.create(&remote_path)?;
            file.write_all(&bytes)
                .map_err(|error| ssh2::Error::new(ssh2::ErrorCode::Session(-1), error.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn make_dir_all(&self, path: &str) -> TransportResult<()> {
        let mut built = PathBuf::new();
        for component in PathBuf::from(path).components() {
            built.push(component);
            let remote_path = built.clone();
            let exists = self.stat(&remote_path.to_string_lossy()).await?.is_some();
            if exists {
                continue;
            }
            self.with_sftp("make_dir_all", remote_path.to_string_lossy().into_owned(), move |sftp| {
                match sftp.mkdir(&remote_path, 0o755) {
                    Ok(()) => Ok(()),
                    Err(error) if error.code() == ssh2::ErrorCode::SFTP(4) => Ok(()), // SSH_FX_FAILURE: already exists
                    Err(error) => Err(error),
                }
            })
            .await?;
        }
        Ok(())
    }

    async fn open_read(&self, path: &str) -> TransportResult<Box<dyn AsyncRead + Unpin + Send>> {
        let handle = self.session_handle()?;
        let remote_path = PathBuf::from(path);
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<std::io::Result<Vec<u8>>>();

        tokio::task::spawn_blocking(move || {
            let pump = || -> Result<(), ssh2::Error> {
                let session = handle.lock().expect("sftp session mutex poisoned");
                let sftp = session.sftp()?;
                let mut file = sftp.open(&remote_path)?;
                let mut buffer = [0_u8; READ_CHUNK_BYTES];
                loop {
                    let read = file
                        .read(&mut buffer)
                        .map_err(|error| ssh2::Error::new(ssh2::ErrorCode::Session(-1), error.to_string()))?;
                    if read == 0 {
                        break;
                    }
                    if tx.send(Ok(buffer[..read].to_vec())).is_err() {
                        break;
                    }
                }
                Ok(())
            };
            if let Err(error) = pump() {
                let _ = tx.send(Err(std::io::Error::other(error.to_string())));
            }
        });

        Ok(Box::new(ChannelReader {
            receiver: rx,
            pending: Vec::new(),
            pending_pos: 0,
        }))
    }

    async fn open_write(&self, path: &str) -> TransportResult<Box<dyn AsyncWrite + Unpin + Send>> {
        let remote_path = PathBuf::from(path);
        if let Some(parent) = remote_path.parent() {
            self.make_dir_all(&parent.to_string_lossy()).await?;
        }
        let handle = self.session_handle()?;
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Vec<u8>>();
        let (done_tx, done_rx) = tokio::sync::oneshot::channel::<Result<(), String>>();

        tokio::task::spawn_blocking(move || {
            let pump = || -> Result<(), ssh2::Error> {
                let session = handle.lock().expect("sftp session mutex poisoned");
                let sftp = session.sftp()?;
                let mut file = sftp.create(&remote_path)?;
                while let Some(chunk) = rx.blocking_recv() {
                    file.write_all(&chunk)
                        .map_err(|error| ssh2::Error::new(ssh2::ErrorCode::Session(-1), error.to_string()))?;
                }
                Ok(())
            };
            let _ = done_tx.send(pump().map_err(|error| error.to_string()));
        });

        Ok(Box::new(ChannelWriter {
            sender: Some(tx),
            done: Some(done_rx),
        }))
    }
}

const READ_CHUNK_BYTES: usize = 256 * 1024;

/// Bridges a blocking SFTP read loop running on a `spawn_blocking` task
/// into an `AsyncRead` by relaying chunks over an unbounded channel.
struct ChannelReader {
    receiver: tokio::sync::mpsc::UnboundedReceiver<std::io::Result<Vec<u8>>>,
    pending: Vec<u8>,
    pending_pos: usize,
}

impl AsyncRead for ChannelReader {
    fn poll_read(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        loop {
            if self.pending_pos < self.pending.len() {
                let available = self.pending.len() - self.pending_pos;
                let take = available.min(buf.remaining());
                let start = self.pending_pos;
                buf.put_slice(&self.pending[start..start + take]);
                self.pending_pos += take;
                return std::task::Poll::Ready(Ok(()));
            }
            match self.receiver.poll_recv(cx) {
                std::task::Poll::Ready(Some(Ok(chunk))) => {
                    self.pending = chunk;
                    self.pending_pos = 0;
                }
                std::task::Poll::Ready(Some(Err(error))) => return std::task::Poll::Ready(Err(error)),
                std::task::Poll::Ready(None) => return std::task::Poll::Ready(Ok(())),
                std::task::Poll::Pending => return std::task::Poll::Pending,
            }
        }
    }
}

/// Bridges an `AsyncWrite` onto a blocking SFTP write loop: chunks are
/// relayed over an unbounded channel, and `poll_shutdown` waits for the
/// blocking task's completion status over a oneshot so write errors
/// surface to the caller rather than being silently dropped.
struct ChannelWriter {
    sender: Option<tokio::sync::mpsc::UnboundedSender<Vec<u8>>>,
    done: Option<tokio::sync::oneshot::Receiver<Result<(), String>>>,
}

impl AsyncWrite for ChannelWriter {
    fn poll_write(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        let this = self.get_mut();
        match this.sender.as_ref() {
            Some(sender) => match sender.send(buf.to_vec()) {
                Ok(()) => std::task::Poll::Ready(Ok(buf.len())),
                Err(_) => std::task::Poll::Ready(Err(std::io::Error::other("sftp write task ended"))),
            },
            None => std::task::Poll::Ready(Err(std::io::Error::other("write after shutdown"))),
        }
    }

    fn poll_flush(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn poll_shutdown(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        let this = self.get_mut();
        this.sender.take();
        let Some(done) = this.done.as_mut() else {
            return std::task::Poll::Ready(Ok(()));
        };
        match std::pin::Pin::new(done).poll(cx) {
            std::task::Poll::Ready(Ok(Ok(()))) => std::task::Poll::Ready(Ok(())),
            std::task::Poll::Ready(Ok(Err(message))) => {
                std::task::Poll::Ready(Err(std::io::Error::other(message)))
            }
            std::task::Poll::Ready(Err(_)) => {
                std::task::Poll::Ready(Err(std::io::Error::other("sftp write task dropped")))
            }
            std::task::Poll::Pending => std::task::Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_dial_is_built_from_host_credentials_descriptor() {
        let descriptor = SftpDescriptor::ByHostCredentials {
            host: "nas.local".to_string(),
            port: 2222,
            username: "transferarr".to_string(),
            password: "hunter2".to_string(),
        };
        let transport = SftpTransport::from_descriptor("home", &descriptor).unwrap();
        assert_eq!(transport.dial.host, "nas.local");
        assert_eq!(transport.dial.port, 2222);
        assert!(matches!(transport.dial.auth, Auth::Password(ref p) if p == "hunter2"));
    }

    #[test]
    fn ssh_alias_with_missing_config_file_is_an_io_error() {
        let descriptor = SftpDescriptor::BySshAlias {
            ssh_config_file: PathBuf::from("/nonexistent/ssh/config"),
            ssh_config_host: "seedbox".to_string(),
        };
        let result = SftpTransport::from_descriptor("home", &descriptor);
        assert!(matches!(result, Err(TransportError::Io { .. })));
    }

    #[test]
    fn ssh_alias_resolves_host_user_and_identity_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config");
        std::fs::write(
            &config_path,
            "Host seedbox\n    HostName seedbox.example.com\n    Port 2022\n    User alice\n    IdentityFile ~/.ssh/id_ed25519\n",
        )
        .unwrap();

        let descriptor = SftpDescriptor::BySshAlias {
            ssh_config_file: config_path,
            ssh_config_host: "seedbox".to_string(),
        };
        let transport = SftpTransport::from_descriptor("home", &descriptor).unwrap();
        assert_eq!(transport.dial.host, "seedbox.example.com");
        assert_eq!(transport.dial.port, 2022);
        assert_eq!(transport.dial.username, "alice");
        assert!(matches!(transport.dial.auth, Auth::PrivateKey { .. }));
    }
}
