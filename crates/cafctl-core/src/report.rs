//! Status snapshots and user-facing notices.

use crate::lid::LidSleepState;
use crate::options::KeepAwakeOptions;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time view of the current session, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// A session is currently running.
    pub active: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_at: Option<DateTime<Utc>>,

    /// Requested budget of the running session, in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u64>,

    /// Seconds left on the budget, clamped at zero.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_secs: Option<u64>,

    /// Percentage of the budget still remaining.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent_remaining: Option<f64>,
}

impl SessionSnapshot {
    /// A snapshot for the idle (no session) state.
    pub fn idle() -> Self {
        Self {
            active: false,
            started_at: None,
            end_at: None,
            duration_secs: None,
            remaining_secs: None,
            percent_remaining: None,
        }
    }
}

/// Full daemon status as reported over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub session: SessionSnapshot,
    pub options: KeepAwakeOptions,
    pub lid: LidSleepState,
    pub alarm_enabled: bool,

    /// The duration the next `start` without an argument will use.
    pub last_duration_secs: u64,
}

/// Severity of a user-facing notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeSeverity {
    Info,
    Warning,
}

/// Out-of-band message for the user, e.g. a failed privileged operation
/// with the manual command to run instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub severity: NoticeSeverity,
    pub message: String,

    /// Suggested manual fix, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            severity: NoticeSeverity::Info,
            message: message.into(),
            remediation: None,
        }
    }

    pub fn warning(message: impl Into<String>, remediation: Option<String>) -> Self {
        Self {
            severity: NoticeSeverity::Warning,
            message: message.into(),
            remediation,
        }
    }
}
