//! Error types for the cafctl CLI.
//!
//! All error types use `thiserror` for derive macros and provide clear,
//! user-friendly error messages with actionable suggestions.
//!
//! **Panic-Free Policy:** This module follows the project's panic-free
//! guidelines. No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`,
//! or `todo!()`.

use std::io;
use thiserror::Error;

/// CLI errors.
///
/// Most errors include actionable information for the user:
/// - Connection errors suggest checking if the daemon is running
/// - Protocol errors may indicate version mismatches
/// - Daemon errors carry the daemon's own message and error code
#[derive(Error, Debug)]
pub enum CliError {
    /// Failed to connect to the daemon.
    #[error("Failed to connect to daemon: {0}")]
    DaemonConnection(String),

    /// The daemon could not be started automatically.
    #[error("Failed to start daemon: {0}")]
    DaemonStart(String),

    /// Protocol version mismatch with daemon.
    ///
    /// The CLI and daemon are running incompatible protocol versions.
    /// This typically happens when one of the two has been updated but
    /// not the other. Ensure both are the same version.
    #[error("Protocol version mismatch (client: {client_version}, daemon: {daemon_version})")]
    VersionMismatch {
        /// The protocol version this CLI supports.
        client_version: String,
        /// The protocol version the daemon is running.
        daemon_version: String,
    },

    /// Protocol parse or format error.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// An error reported by the daemon itself.
    #[error("{message}")]
    Daemon {
        /// Human-readable message from the daemon.
        message: String,
        /// Stable machine-readable code, when the daemon provided one.
        code: Option<String>,
    },

    /// I/O error passthrough.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON parse error passthrough.
    #[error("Failed to parse message: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Convenience Result type alias for CLI operations.
pub type Result<T> = std::result::Result<T, CliError>;
