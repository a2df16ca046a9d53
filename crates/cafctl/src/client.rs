//! Daemon connection client for the cafctl CLI.
//!
//! This module provides the `DaemonClient` which handles:
//! - Connection to the daemon via Unix socket
//! - The protocol handshake with version checking
//! - One-shot request/response exchanges
//! - Event streaming for `cafctl watch`
//!
//! **Panic-Free Policy:** This module follows the project's panic-free
//! guidelines. No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`,
//! or `todo!()`.

use std::path::{Path, PathBuf};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tracing::{debug, info};

use cafctl_protocol::{ClientMessage, DaemonMessage, ProtocolVersion};

use crate::error::{CliError, Result};

/// Default socket path, kept in sync with the daemon.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/cafctl.sock";

/// Environment variable overriding the socket path.
pub const SOCKET_PATH_ENV: &str = "CAFCTL_SOCKET";

/// Resolves the socket path from the environment, falling back to the
/// default.
pub fn socket_path_from_env() -> PathBuf {
    match std::env::var(SOCKET_PATH_ENV) {
        Ok(path) if !path.is_empty() => PathBuf::from(path),
        _ => PathBuf::from(DEFAULT_SOCKET_PATH),
    }
}

/// A connected, handshaken client for the keep-awake daemon.
///
/// # Connection Lifecycle
///
/// 1. Client connects to the Unix socket
/// 2. Sends a `Connect` message and waits for `Connected`
/// 3. Exchanges request/response pairs, or subscribes for events
/// 4. Disconnects by dropping the client or sending `Disconnect`
pub struct DaemonClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl DaemonClient {
    /// Connects to the daemon and performs the handshake.
    pub async fn connect(socket_path: &Path) -> Result<Self> {
        let stream = UnixStream::connect(socket_path)
            .await
            .map_err(|e| CliError::DaemonConnection(e.to_string()))?;

        let (reader, writer) = stream.into_split();
        let mut client = Self {
            reader: BufReader::new(reader),
            writer,
        };

        client.handshake().await?;
        Ok(client)
    }

    /// Performs the protocol handshake.
    async fn handshake(&mut self) -> Result<()> {
        self.send(&ClientMessage::connect(None)).await?;

        match self.recv_raw().await? {
            DaemonMessage::Connected {
                protocol_version,
                client_id,
            } => {
                if !ProtocolVersion::CURRENT.is_compatible_with(&protocol_version) {
                    return Err(CliError::VersionMismatch {
                        client_version: ProtocolVersion::CURRENT.to_string(),
                        daemon_version: protocol_version.to_string(),
                    });
                }
                info!(
                    client_id,
                    protocol_version = %protocol_version,
                    "Handshake complete"
                );
                Ok(())
            }
            DaemonMessage::Rejected {
                reason: _,
                protocol_version,
            } => Err(CliError::VersionMismatch {
                client_version: ProtocolVersion::CURRENT.to_string(),
                daemon_version: protocol_version.to_string(),
            }),
            other => Err(CliError::Protocol(format!(
                "Unexpected response to connect: {other:?}"
            ))),
        }
    }

    /// Sends a request and returns the daemon's reply.
    ///
    /// An `Error` reply is mapped to `CliError::Daemon` so callers only
    /// ever see successful replies.
    pub async fn request(&mut self, msg: ClientMessage) -> Result<DaemonMessage> {
        self.send(&msg).await?;
        match self.recv_raw().await? {
            DaemonMessage::Error { message, code } => Err(CliError::Daemon { message, code }),
            other => Ok(other),
        }
    }

    /// Sends a message without waiting for a reply.
    pub async fn send(&mut self, message: &ClientMessage) -> Result<()> {
        let json = serde_json::to_string(message)?;
        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        debug!(request = ?message.request, "Sent message to daemon");
        Ok(())
    }

    /// Reads the next message from the daemon.
    ///
    /// Used by `cafctl watch` after subscribing; replies and events arrive
    /// on the same stream.
    pub async fn next_message(&mut self) -> Result<DaemonMessage> {
        self.recv_raw().await
    }

    async fn recv_raw(&mut self) -> Result<DaemonMessage> {
        let mut line = String::new();
        let bytes_read = self.reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            return Err(CliError::DaemonConnection(
                "daemon closed the connection".to_string(),
            ));
        }
        Ok(serde_json::from_str(line.trim())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_socket_path() {
        assert_eq!(DEFAULT_SOCKET_PATH, "/tmp/cafctl.sock");
    }

    #[tokio::test]
    async fn test_connect_fails_when_socket_missing() {
        let result = DaemonClient::connect(Path::new("/tmp/cafctl-nonexistent-test.sock")).await;
        assert!(matches!(result, Err(CliError::DaemonConnection(_))));
    }
}
