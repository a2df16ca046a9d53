//! Sleep-prevention option set mapped onto `caffeinate` flags.

use crate::error::DomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which sleep behaviors the keep-awake child should suppress.
///
/// Each field maps to one `caffeinate` flag. Idle-sleep prevention defaults
/// on; the rest default off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeepAwakeOptions {
    /// Prevent the display from sleeping (`-d`).
    pub display_sleep: bool,

    /// Prevent the system from idle-sleeping (`-i`).
    pub idle_sleep: bool,

    /// Prevent disks from idle-spinning-down (`-m`).
    pub disk_sleep: bool,

    /// Prevent system sleep entirely, even on AC removal (`-s`).
    pub system_sleep: bool,

    /// Assert the user is active, waking the display (`-u`).
    pub user_active: bool,
}

impl Default for KeepAwakeOptions {
    fn default() -> Self {
        Self {
            display_sleep: false,
            idle_sleep: true,
            disk_sleep: false,
            system_sleep: false,
            user_active: false,
        }
    }
}

impl KeepAwakeOptions {
    /// The `caffeinate` flags this option set selects, in stable order.
    pub fn flag_args(&self) -> Vec<&'static str> {
        let mut args = Vec::new();
        if self.display_sleep {
            args.push("-d");
        }
        if self.idle_sleep {
            args.push("-i");
        }
        if self.disk_sleep {
            args.push("-m");
        }
        if self.system_sleep {
            args.push("-s");
        }
        if self.user_active {
            args.push("-u");
        }
        args
    }

    pub fn get(&self, kind: OptionKind) -> bool {
        match kind {
            OptionKind::DisplaySleep => self.display_sleep,
            OptionKind::IdleSleep => self.idle_sleep,
            OptionKind::DiskSleep => self.disk_sleep,
            OptionKind::SystemSleep => self.system_sleep,
            OptionKind::UserActive => self.user_active,
        }
    }

    pub fn set(&mut self, kind: OptionKind, enabled: bool) {
        match kind {
            OptionKind::DisplaySleep => self.display_sleep = enabled,
            OptionKind::IdleSleep => self.idle_sleep = enabled,
            OptionKind::DiskSleep => self.disk_sleep = enabled,
            OptionKind::SystemSleep => self.system_sleep = enabled,
            OptionKind::UserActive => self.user_active = enabled,
        }
    }
}

/// Names one of the five toggleable options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionKind {
    DisplaySleep,
    IdleSleep,
    DiskSleep,
    SystemSleep,
    UserActive,
}

impl FromStr for OptionKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "display" => Ok(Self::DisplaySleep),
            "idle" => Ok(Self::IdleSleep),
            "disk" => Ok(Self::DiskSleep),
            "system" => Ok(Self::SystemSleep),
            "user" => Ok(Self::UserActive),
            other => Err(DomainError::UnknownOption(other.to_string())),
        }
    }
}

impl fmt::Display for OptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::DisplaySleep => "display",
            Self::IdleSleep => "idle",
            Self::DiskSleep => "disk",
            Self::SystemSleep => "system",
            Self::UserActive => "user",
        };
        write!(f, "{name}")
    }
}
