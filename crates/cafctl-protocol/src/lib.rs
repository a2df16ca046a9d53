//! cafctl Protocol - Wire protocol for daemon communication
//!
//! This crate provides message types for communication between the cafctl
//! CLI and the cafctld daemon over a local Unix socket. Messages are
//! line-delimited JSON in both directions.

pub mod message;
pub mod version;

pub use message::{ClientMessage, ClientRequest, DaemonMessage, EventKind};
pub use version::ProtocolVersion;
