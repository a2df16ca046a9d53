//! Keep-awake session entities and value objects.

use crate::error::{DomainError, DomainResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Default session length when none was ever chosen: 1 hour.
pub const DEFAULT_DURATION_SECS: u64 = 3600;

/// Upper bound on a single session: 24 hours.
const MAX_DURATION_SECS: u64 = 24 * 3600;

// ============================================================================
// Session Duration
// ============================================================================

/// Requested length of a keep-awake session, in whole seconds.
///
/// Parses human-friendly forms: `"900"`, `"90s"`, `"15m"`, `"2h"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionDuration(u64);

impl SessionDuration {
    /// Creates a duration from whole seconds, validating the supported range.
    pub fn from_secs(seconds: u64) -> DomainResult<Self> {
        if seconds == 0 || seconds > MAX_DURATION_SECS {
            return Err(DomainError::DurationOutOfRange { seconds });
        }
        Ok(Self(seconds))
    }

    /// Returns the duration in whole seconds.
    pub fn as_secs(&self) -> u64 {
        self.0
    }

    /// Returns the duration as floating-point seconds (for percentage math).
    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64
    }

    /// Returns the duration as a chrono `Duration`.
    pub fn to_chrono(&self) -> Duration {
        Duration::seconds(self.0 as i64)
    }
}

impl Default for SessionDuration {
    fn default() -> Self {
        Self(DEFAULT_DURATION_SECS)
    }
}

impl FromStr for SessionDuration {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(DomainError::InvalidDuration {
                input: s.to_string(),
                reason: "empty string".to_string(),
            });
        }

        let (digits, multiplier) = match s.as_bytes().last() {
            Some(b'h') => (&s[..s.len() - 1], 3600),
            Some(b'm') => (&s[..s.len() - 1], 60),
            Some(b's') => (&s[..s.len() - 1], 1),
            _ => (s, 1),
        };

        let value: u64 = digits.parse().map_err(|_| DomainError::InvalidDuration {
            input: s.to_string(),
            reason: "expected a number with optional h/m/s suffix".to_string(),
        })?;

        let seconds = value
            .checked_mul(multiplier)
            .ok_or(DomainError::DurationOutOfRange { seconds: u64::MAX })?;

        Self::from_secs(seconds)
    }
}

impl fmt::Display for SessionDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        format_secs(self.0 as i64, f)
    }
}

/// Formats whole seconds as `2h 5m 30s`, omitting leading zero units.
fn format_secs(total: i64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let total = total.max(0);
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    if hours > 0 {
        write!(f, "{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        write!(f, "{minutes}m {seconds}s")
    } else {
        write!(f, "{seconds}s")
    }
}

/// Wrapper for displaying a remaining-seconds count like a duration.
pub struct RemainingDisplay(pub i64);

impl fmt::Display for RemainingDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        format_secs(self.0, f)
    }
}

// ============================================================================
// Session
// ============================================================================

/// One bounded keep-awake run with a fixed end time.
///
/// Exactly one session exists at a time; starting while one is active stops
/// the previous one first. The wall-clock `end_at` is the sole source of truth
/// for expiry - the child process's own exit is never observed for this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// When the session started
    pub started_at: DateTime<Utc>,

    /// Absolute end time (`started_at + requested`)
    pub end_at: DateTime<Utc>,

    /// The duration the user asked for
    pub requested: SessionDuration,
}

impl Session {
    /// Begins a session at `now` lasting `requested`.
    pub fn begin(now: DateTime<Utc>, requested: SessionDuration) -> Self {
        let end_at = now + requested.to_chrono();
        debug!(%requested, %end_at, "session beginning");
        Self {
            started_at: now,
            end_at,
            requested,
        }
    }

    /// Time left on the budget. Negative once expired.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        self.end_at - now
    }

    /// Time left as floating-point seconds (millisecond precision).
    pub fn remaining_secs_f64(&self, now: DateTime<Utc>) -> f64 {
        self.remaining(now).num_milliseconds() as f64 / 1000.0
    }

    /// Percentage of the budget still remaining.
    pub fn percent_remaining(&self, now: DateTime<Utc>) -> f64 {
        let total = self.requested.as_secs_f64();
        if total <= 0.0 {
            return 0.0;
        }
        (self.remaining_secs_f64(now) / total * 100.0).max(0.0)
    }

    /// True once the budget has reached zero.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.remaining(now) <= Duration::zero()
    }
}

// ============================================================================
// Stop Reason
// ============================================================================

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// User explicitly asked to stop.
    Requested,

    /// The time budget reached zero.
    Expired,

    /// A new session replaced the running one.
    Restarted,

    /// The daemon is shutting down.
    Shutdown,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => write!(f, "stopped by user"),
            Self::Expired => write!(f, "time budget expired"),
            Self::Restarted => write!(f, "replaced by a new session"),
            Self::Shutdown => write!(f, "daemon shutting down"),
        }
    }
}
