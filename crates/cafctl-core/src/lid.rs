//! State tracking for the privileged lid-sleep (`pmset disablesleep`) flag.

use serde::{Deserialize, Serialize};
use std::fmt;

/// User-visible view of the lid-sleep flag.
///
/// `preference` is what the user asked for; `actual_active` is what the probe
/// last observed on the system. The two can disagree after a failed apply or
/// when another tool touched the flag behind our back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LidSleepState {
    /// User wants lid-closed sleep disabled.
    pub preference: bool,

    /// The system flag is currently set (as last observed).
    pub actual_active: bool,
}

/// Where the flag sits in its apply/retract lifecycle.
///
/// Only one privileged operation may be in flight at a time; requests
/// arriving while `is_busy()` are rejected rather than queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LidFlagPhase {
    /// Nothing observed yet.
    Unknown,

    /// A probe ran; `active` is what it saw.
    Probed { active: bool },

    /// An apply (set flag) operation is in flight.
    Applying,

    /// The flag is set and we set it.
    Active,

    /// The last apply failed.
    Failed,

    /// A retract (clear flag) operation is in flight.
    Retracting,

    /// The flag is clear.
    Inactive,
}

impl LidFlagPhase {
    /// True while a privileged operation is in flight.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Applying | Self::Retracting)
    }
}

impl fmt::Display for LidFlagPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            Self::Probed { active: true } => "probed (active)",
            Self::Probed { active: false } => "probed (inactive)",
            Self::Applying => "applying",
            Self::Active => "active",
            Self::Failed => "failed",
            Self::Retracting => "retracting",
            Self::Inactive => "inactive",
        };
        write!(f, "{name}")
    }
}
