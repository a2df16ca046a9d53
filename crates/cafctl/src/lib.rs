//! cafctl CLI - client library for the keep-awake daemon.
//!
//! This library backs the `cafctl` binary:
//!
//! - **client** - one-shot request/response and event streaming over the
//!   daemon's Unix socket
//! - **daemon** - finding and auto-starting the `cafctld` process
//! - **output** - human-readable and `--json` rendering of daemon replies

pub mod client;
pub mod daemon;
pub mod error;
pub mod output;

pub use client::DaemonClient;
pub use error::{CliError, Result};
