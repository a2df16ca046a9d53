//! Client interface for interacting with the SessionActor.
//!
//! The `SessionHandle` provides a cheap-to-clone interface for sending
//! commands to the session actor and subscribing to events.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Channel errors are mapped to `SessionError::ChannelClosed`

use tokio::sync::{broadcast, mpsc, oneshot};

use cafctl_core::{OptionKind, StatusReport, StopReason};
use cafctl_protocol::EventKind;

use super::commands::{LidSleepResponse, SessionCommand, SessionError};

// ============================================================================
// Session Handle
// ============================================================================

/// Handle for interacting with the session actor.
///
/// This is a cheap-to-clone handle that can be shared across tasks.
/// All methods are async and communicate with the actor via channels.
#[derive(Clone)]
pub struct SessionHandle {
    /// Command sender to the actor
    sender: mpsc::Sender<SessionCommand>,

    /// Event broadcaster for subscribing to updates
    event_sender: broadcast::Sender<EventKind>,
}

impl SessionHandle {
    /// Create a new session handle.
    pub fn new(
        sender: mpsc::Sender<SessionCommand>,
        event_sender: broadcast::Sender<EventKind>,
    ) -> Self {
        Self {
            sender,
            event_sender,
        }
    }

    /// Start a session, replacing any running one.
    ///
    /// # Errors
    ///
    /// - `SessionError::Domain` if the duration is out of range
    /// - `SessionError::Launch` if the keep-awake child fails to spawn
    /// - `SessionError::ChannelClosed` if the actor has shut down
    pub async fn start(&self, duration_secs: Option<u64>) -> Result<StatusReport, SessionError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(SessionCommand::Start {
                duration_secs,
                respond_to: tx,
            })
            .await
            .map_err(|_| SessionError::ChannelClosed)?;

        rx.await.map_err(|_| SessionError::ChannelClosed)?
    }

    /// Stop the running session. Returns `None` when nothing was running.
    pub async fn stop(&self) -> Result<Option<StopReason>, SessionError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(SessionCommand::Stop { respond_to: tx })
            .await
            .map_err(|_| SessionError::ChannelClosed)?;

        rx.await.map_err(|_| SessionError::ChannelClosed)
    }

    /// Get a status report backed by a fresh flag probe.
    pub async fn status(&self) -> Result<StatusReport, SessionError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(SessionCommand::GetStatus { respond_to: tx })
            .await
            .map_err(|_| SessionError::ChannelClosed)?;

        rx.await.map_err(|_| SessionError::ChannelClosed)
    }

    /// Toggle one caffeinate option flag.
    pub async fn set_option(
        &self,
        option: OptionKind,
        enabled: bool,
    ) -> Result<StatusReport, SessionError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(SessionCommand::SetOption {
                option,
                enabled,
                respond_to: tx,
            })
            .await
            .map_err(|_| SessionError::ChannelClosed)?;

        rx.await.map_err(|_| SessionError::ChannelClosed)?
    }

    /// Change the lid-sleep override preference.
    ///
    /// # Errors
    ///
    /// - `SessionError::LidBusy` if an operation is already in flight
    /// - `SessionError::ChannelClosed` if the actor has shut down
    pub async fn set_lid_sleep(
        &self,
        enabled: bool,
        confirmed: bool,
    ) -> Result<LidSleepResponse, SessionError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(SessionCommand::SetLidSleep {
                enabled,
                confirmed,
                respond_to: tx,
            })
            .await
            .map_err(|_| SessionError::ChannelClosed)?;

        rx.await.map_err(|_| SessionError::ChannelClosed)?
    }

    /// Enable or disable audible alarms.
    pub async fn set_alarm(&self, enabled: bool) -> Result<StatusReport, SessionError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(SessionCommand::SetAlarm {
                enabled,
                respond_to: tx,
            })
            .await
            .map_err(|_| SessionError::ChannelClosed)?;

        rx.await.map_err(|_| SessionError::ChannelClosed)
    }

    /// Gracefully shut the actor down: stop the session, retract the lid
    /// flag, and wait for completion.
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(SessionCommand::Shutdown { respond_to: tx })
            .await
            .map_err(|_| SessionError::ChannelClosed)?;

        rx.await.map_err(|_| SessionError::ChannelClosed)
    }

    /// Subscribe to session and lid events.
    ///
    /// This is a synchronous operation - it doesn't communicate with the
    /// actor.
    pub fn subscribe(&self) -> broadcast::Receiver<EventKind> {
        self.event_sender.subscribe()
    }

    /// Check if the actor is still running.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}
