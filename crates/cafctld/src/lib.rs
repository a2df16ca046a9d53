//! cafctl Daemon - Keep-awake session controller and broadcast server
//!
//! This crate provides the core infrastructure for the cafctld daemon:
//! - `session` - Session actor owning all keep-awake state
//! - `server` - Unix socket server for client connections
//! - `caffeinate` - Management of the `caffeinate` child process
//! - `power` - Lid-sleep flag probing, escalation, and reconciliation
//! - `countdown` - Per-second session ticking
//! - `alarm` - Audible alarm rendering
//! - `settings` - Persisted preferences
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     cafctld daemon                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐    │
//! │  │  DaemonServer   │────▶│       SessionActor          │    │
//! │  │ (Unix Socket)   │     │  (keep-awake state owner)   │    │
//! │  └────────┬────────┘     └──────────────┬──────────────┘    │
//! │           │                             │                   │
//! │           │ line-delimited JSON         │ drives            │
//! │           ▼                             ▼                   │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐    │
//! │  │  cafctl CLI     │     │ caffeinate / pmset / sounds │    │
//! │  │  (subscribers)  │     │    (external processes)     │    │
//! │  └─────────────────┘     └─────────────────────────────┘    │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All modules follow the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, or `todo!()` outside of tests.

pub mod alarm;
pub mod caffeinate;
pub mod countdown;
pub mod power;
pub mod server;
pub mod session;
pub mod settings;
