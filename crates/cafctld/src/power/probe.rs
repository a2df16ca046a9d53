//! Probing the current lid-sleep flag via `pmset -g`.

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Errors that can occur probing power settings.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Failed to run pmset: {0}")]
    Exec(String),

    #[error("pmset exited with status {status}")]
    NonZeroExit { status: i32 },

    #[error("pmset output had no sleep line")]
    NoSleepLine,
}

/// Reads the current state of the lid-sleep flag.
#[async_trait]
pub trait FlagProbe: Send + Sync {
    /// Returns `true` when `disablesleep` is currently in effect.
    async fn probe(&self) -> Result<bool, ProbeError>;
}

/// Probes by running `pmset -g` and inspecting the `sleep` line.
pub struct PmsetProbe;

/// Extracts the lid-sleep flag from `pmset -g` output.
///
/// The line whose first whitespace-separated token is exactly `sleep`
/// carries the system sleep timer; a value of `0` means sleep is disabled
/// (the `disablesleep` flag is set). Lines like `displaysleep` or
/// `disksleep` must not match.
pub fn parse_sleep_flag(output: &str) -> Option<bool> {
    for line in output.lines() {
        let mut tokens = line.split_whitespace();
        if tokens.next() == Some("sleep") {
            return tokens.next().map(|value| value == "0");
        }
    }
    None
}

#[async_trait]
impl FlagProbe for PmsetProbe {
    async fn probe(&self) -> Result<bool, ProbeError> {
        let output = Command::new("pmset")
            .arg("-g")
            .output()
            .await
            .map_err(|e| ProbeError::Exec(e.to_string()))?;

        if !output.status.success() {
            return Err(ProbeError::NonZeroExit {
                status: output.status.code().unwrap_or(-1),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let active = parse_sleep_flag(&stdout).ok_or(ProbeError::NoSleepLine)?;
        debug!(active, "Probed lid-sleep flag");
        Ok(active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sleep_zero_means_active() {
        let output = " displaysleep        10\n sleep                0 (sleep prevented by coreaudiod)\n disksleep            10\n";
        assert_eq!(parse_sleep_flag(output), Some(true));
    }

    #[test]
    fn test_parse_sleep_nonzero_means_inactive() {
        let output = " displaysleep        10\n sleep                15\n";
        assert_eq!(parse_sleep_flag(output), Some(false));
    }

    #[test]
    fn test_parse_ignores_displaysleep_and_disksleep() {
        // No plain "sleep" line at all
        let output = " displaysleep        0\n disksleep           0\n";
        assert_eq!(parse_sleep_flag(output), None);
    }

    #[test]
    fn test_parse_garbage_yields_none() {
        assert_eq!(parse_sleep_flag(""), None);
        assert_eq!(parse_sleep_flag("not pmset output at all"), None);
    }

    #[test]
    fn test_parse_sleep_line_without_value() {
        assert_eq!(parse_sleep_flag(" sleep\n"), None);
    }
}
