//! Protocol message types for daemon communication.

use crate::version::ProtocolVersion;
use cafctl_core::{NoticeSeverity, StatusReport, StopReason, ThresholdEvent};
use serde::{Deserialize, Serialize};

/// Requests a client can send to the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientRequest {
    /// Client handshake/connection request
    Connect {
        /// Client identifier (optional)
        #[serde(skip_serializing_if = "Option::is_none")]
        client_id: Option<String>,
    },

    /// Start a keep-awake session
    Start {
        /// Requested duration in seconds; omit to reuse the last one
        #[serde(skip_serializing_if = "Option::is_none")]
        duration_secs: Option<u64>,
    },

    /// Stop the current session, if any
    Stop,

    /// Request a fresh status report
    GetStatus,

    /// Toggle one of the caffeinate option flags
    SetOption {
        /// Option name: display, idle, disk, system, user
        option: String,
        enabled: bool,
    },

    /// Change the lid-sleep override preference
    SetLidSleep {
        enabled: bool,
        /// Whether the user has acknowledged the enable warning
        #[serde(default)]
        confirmed: bool,
    },

    /// Enable or disable audible alarms
    SetAlarm { enabled: bool },

    /// Subscribe to session and lid events
    Subscribe,

    /// Ping to check connection
    Ping {
        /// Sequence number for matching pong response
        seq: u64,
    },

    /// Client disconnecting gracefully
    Disconnect,
}

/// Messages sent from client to daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientMessage {
    /// Protocol version
    pub protocol_version: ProtocolVersion,

    /// Message payload
    #[serde(flatten)]
    pub request: ClientRequest,
}

impl ClientMessage {
    /// Creates a new client message with current protocol version.
    pub fn new(request: ClientRequest) -> Self {
        Self {
            protocol_version: ProtocolVersion::CURRENT,
            request,
        }
    }

    /// Creates a connect message.
    pub fn connect(client_id: Option<String>) -> Self {
        Self::new(ClientRequest::Connect { client_id })
    }

    /// Creates a start message.
    pub fn start(duration_secs: Option<u64>) -> Self {
        Self::new(ClientRequest::Start { duration_secs })
    }

    /// Creates a stop message.
    pub fn stop() -> Self {
        Self::new(ClientRequest::Stop)
    }

    /// Creates a status request.
    pub fn get_status() -> Self {
        Self::new(ClientRequest::GetStatus)
    }

    /// Creates an option toggle message.
    pub fn set_option(option: &str, enabled: bool) -> Self {
        Self::new(ClientRequest::SetOption {
            option: option.to_string(),
            enabled,
        })
    }

    /// Creates a lid-sleep preference message.
    pub fn set_lid_sleep(enabled: bool, confirmed: bool) -> Self {
        Self::new(ClientRequest::SetLidSleep { enabled, confirmed })
    }

    /// Creates an alarm toggle message.
    pub fn set_alarm(enabled: bool) -> Self {
        Self::new(ClientRequest::SetAlarm { enabled })
    }

    /// Creates a subscribe message.
    pub fn subscribe() -> Self {
        Self::new(ClientRequest::Subscribe)
    }

    /// Creates a ping message.
    pub fn ping(seq: u64) -> Self {
        Self::new(ClientRequest::Ping { seq })
    }

    /// Creates a disconnect message.
    pub fn disconnect() -> Self {
        Self::new(ClientRequest::Disconnect)
    }
}

/// Events broadcast to subscribed clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    /// A session started (or replaced the previous one)
    SessionStarted { report: Box<StatusReport> },

    /// The session ended
    SessionEnded { reason: StopReason },

    /// An alarm threshold was crossed
    Threshold {
        threshold: ThresholdEvent,
        remaining_secs: u64,
    },

    /// The lid-sleep flag changed
    LidChanged {
        preference: bool,
        actual_active: bool,
    },

    /// Out-of-band notice for the user
    Notice {
        severity: NoticeSeverity,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        remediation: Option<String>,
    },
}

/// Messages sent from daemon to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DaemonMessage {
    /// Connection accepted
    Connected {
        /// Daemon's protocol version
        protocol_version: ProtocolVersion,
        /// Assigned client ID
        client_id: String,
    },

    /// Connection rejected (version mismatch, etc.)
    Rejected {
        /// Reason for rejection
        reason: String,
        /// Daemon's protocol version (for client to upgrade)
        protocol_version: ProtocolVersion,
    },

    /// Status report response
    Status { report: Box<StatusReport> },

    /// Session started successfully
    Started { report: Box<StatusReport> },

    /// Session stopped (or there was none to stop)
    Stopped {
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<StopReason>,
    },

    /// Enabling lid-sleep override needs explicit confirmation
    LidConfirmationRequired {
        /// The warning to show the user before re-sending confirmed
        warning: String,
    },

    /// Broadcast event for subscribers
    Event {
        #[serde(flatten)]
        event: EventKind,
    },

    /// Pong response to ping
    Pong {
        /// Sequence number from ping
        seq: u64,
    },

    /// Error response
    Error {
        /// Error message
        message: String,
        /// Error code (optional)
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

impl DaemonMessage {
    /// Creates a connected response.
    pub fn connected(client_id: String) -> Self {
        Self::Connected {
            protocol_version: ProtocolVersion::CURRENT,
            client_id,
        }
    }

    /// Creates a rejected response.
    pub fn rejected(reason: &str) -> Self {
        Self::Rejected {
            reason: reason.to_string(),
            protocol_version: ProtocolVersion::CURRENT,
        }
    }

    /// Creates a status response.
    pub fn status(report: StatusReport) -> Self {
        Self::Status {
            report: Box::new(report),
        }
    }

    /// Creates a started response.
    pub fn started(report: StatusReport) -> Self {
        Self::Started {
            report: Box::new(report),
        }
    }

    /// Creates a stopped response.
    pub fn stopped(reason: Option<StopReason>) -> Self {
        Self::Stopped { reason }
    }

    /// Creates an event broadcast.
    pub fn event(event: EventKind) -> Self {
        Self::Event { event }
    }

    /// Creates a pong response.
    pub fn pong(seq: u64) -> Self {
        Self::Pong { seq }
    }

    /// Creates an error response.
    pub fn error(message: &str) -> Self {
        Self::Error {
            message: message.to_string(),
            code: None,
        }
    }

    /// Creates an error response with code.
    pub fn error_with_code(message: &str, code: &str) -> Self {
        Self::Error {
            message: message.to_string(),
            code: Some(code.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_serialization() {
        let msg = ClientMessage::start(Some(900));
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"start\""));
        assert!(json.contains("\"duration_secs\":900"));
    }

    #[test]
    fn test_start_omits_absent_duration() {
        let msg = ClientMessage::start(None);
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("duration_secs"));
    }

    #[test]
    fn test_lid_confirmed_defaults_false() {
        let json = r#"{"protocol_version":{"major":1,"minor":0},"type":"set_lid_sleep","enabled":true}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg.request {
            ClientRequest::SetLidSleep { enabled, confirmed } => {
                assert!(enabled);
                assert!(!confirmed);
            }
            _ => panic!("Expected SetLidSleep message"),
        }
    }

    #[test]
    fn test_daemon_message_serialization() {
        let msg = DaemonMessage::connected("client-123".to_string());
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"connected\""));
        assert!(json.contains("\"client_id\":\"client-123\""));
    }

    #[test]
    fn test_event_flattens_kind() {
        let msg = DaemonMessage::event(EventKind::Threshold {
            threshold: ThresholdEvent::FivePercent,
            remaining_secs: 45,
        });
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"event\""));
        assert!(json.contains("\"event\":\"threshold\""));
        assert!(json.contains("\"remaining_secs\":45"));
    }

    #[test]
    fn test_message_roundtrip() {
        let original = ClientMessage::set_option("display", true);
        let json = serde_json::to_string(&original).unwrap();
        let parsed: ClientMessage = serde_json::from_str(&json).unwrap();

        match parsed.request {
            ClientRequest::SetOption { option, enabled } => {
                assert_eq!(option, "display");
                assert!(enabled);
            }
            _ => panic!("Expected SetOption message"),
        }
    }
}
