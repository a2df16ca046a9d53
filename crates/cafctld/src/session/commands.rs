//! Session actor commands and errors.
//!
//! This module defines the message types for communicating with the
//! `SessionActor`:
//! - `SessionCommand`: commands sent to the actor
//! - `SessionError`: errors that can occur during session operations
//! - `LidSleepResponse`: the two-step reply shape for lid-sleep requests
//!
//! Subscribers receive `cafctl_protocol::EventKind` values over the
//! broadcast channel; the actor publishes the wire event type directly
//! since there is a single event consumer shape.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::oneshot;

use cafctl_core::{DomainError, OptionKind, StatusReport, StopReason};

use crate::power::{EscalationOutcome, LidOp};

/// Commands sent to the session actor.
///
/// Each request-response command carries a oneshot channel for the reply.
/// `Tick`, `LidOpFinished`, and `ProbeResult` are internal: they are sent
/// by tasks the actor itself spawned.
#[derive(Debug)]
pub enum SessionCommand {
    /// Start a session, replacing any running one.
    ///
    /// # Errors
    /// - `SessionError::Domain` if the duration is invalid
    /// - `SessionError::Launch` if the keep-awake child fails to spawn
    Start {
        /// Requested duration in seconds; `None` reuses the last duration
        duration_secs: Option<u64>,
        /// Channel to send the result
        respond_to: oneshot::Sender<Result<StatusReport, SessionError>>,
    },

    /// Stop the running session.
    ///
    /// Replies `None` when no session was running (idempotent).
    Stop {
        respond_to: oneshot::Sender<Option<StopReason>>,
    },

    /// Get a status report with a fresh flag probe.
    GetStatus {
        respond_to: oneshot::Sender<StatusReport>,
    },

    /// Toggle one caffeinate option flag.
    SetOption {
        option: OptionKind,
        enabled: bool,
        respond_to: oneshot::Sender<Result<StatusReport, SessionError>>,
    },

    /// Change the lid-sleep override preference.
    ///
    /// Enabling without `confirmed` replies `ConfirmationRequired` and
    /// changes nothing.
    ///
    /// # Errors
    /// - `SessionError::LidBusy` if an operation is already in flight
    SetLidSleep {
        enabled: bool,
        confirmed: bool,
        respond_to: oneshot::Sender<Result<LidSleepResponse, SessionError>>,
    },

    /// Enable or disable audible alarms.
    SetAlarm {
        enabled: bool,
        respond_to: oneshot::Sender<StatusReport>,
    },

    /// One countdown tick (internal, sent by the tick task).
    Tick { now: DateTime<Utc> },

    /// A privileged lid operation finished (internal).
    LidOpFinished {
        op: LidOp,
        outcome: EscalationOutcome,
    },

    /// A flag probe finished (internal). `None` means the probe failed
    /// and the flag is treated as inactive for reporting.
    ProbeResult { active: Option<bool> },

    /// Graceful shutdown: stop the session and retract the lid flag,
    /// then reply.
    Shutdown {
        respond_to: oneshot::Sender<()>,
    },
}

/// Reply shape for `SetLidSleep`.
#[derive(Debug)]
pub enum LidSleepResponse {
    /// Enabling needs explicit confirmation; show the warning and resend
    /// with `confirmed` set.
    ConfirmationRequired { warning: String },

    /// The request was accepted and resolved; the report reflects the
    /// final state (which may be unchanged if the user cancelled).
    Accepted { report: Box<StatusReport> },
}

/// Errors that can occur during session operations.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// The keep-awake child failed to spawn.
    #[error("failed to start keep-awake process: {0}")]
    Launch(String),

    /// A privileged lid-sleep operation is already in flight.
    #[error("a lid-sleep operation is already in progress")]
    LidBusy,

    /// Invalid input (bad duration, unknown option).
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The response channel was closed before receiving a response.
    ///
    /// This typically indicates the actor was shut down.
    #[error("response channel closed")]
    ChannelClosed,
}
