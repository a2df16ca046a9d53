//! Privileged writes to the lid-sleep flag.
//!
//! Two paths exist, tried in order:
//! 1. A setuid helper at [`HELPER_PATH`] that accepts a single `0`/`1`
//!    argument and execs `pmset -a disablesleep N`.
//! 2. An `osascript` administrator-privileges prompt, only when the
//!    operation was user-initiated (interactive).
//!
//! When the user dismisses the GUI prompt, AppleScript reports error
//! code -128 on stderr; that is a cancellation, not a failure.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Install location of the setuid pmset helper.
pub const HELPER_PATH: &str = "/usr/local/bin/cafctl-pmset";

/// AppleScript's user-cancelled error code.
const OSASCRIPT_CANCEL_CODE: &str = "-128";

/// Result of a privileged flag write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EscalationOutcome {
    /// The flag was written.
    Done,

    /// The user dismissed the authorization prompt.
    Cancelled,

    /// The write failed.
    Failed(String),
}

/// Writes the lid-sleep flag with elevated privileges.
#[async_trait]
pub trait PrivilegeBridge: Send + Sync {
    /// Sets `disablesleep` to `active`. `interactive` permits falling back
    /// to a GUI authorization prompt.
    async fn set_flag(&self, active: bool, interactive: bool) -> EscalationOutcome;
}

/// The manual command a user can run when escalation fails.
pub fn manual_command(active: bool) -> String {
    format!("sudo pmset -a disablesleep {}", flag_value(active))
}

fn flag_value(active: bool) -> &'static str {
    if active {
        "1"
    } else {
        "0"
    }
}

/// Classifies an osascript failure from its stderr output.
pub fn classify_osascript_failure(stderr: &str) -> EscalationOutcome {
    if stderr.contains(OSASCRIPT_CANCEL_CODE) {
        EscalationOutcome::Cancelled
    } else {
        EscalationOutcome::Failed(stderr.trim().to_string())
    }
}

/// Production escalation: helper first, then osascript.
pub struct SystemPrivilegeBridge;

impl SystemPrivilegeBridge {
    async fn try_helper(&self, active: bool) -> Option<EscalationOutcome> {
        if !std::path::Path::new(HELPER_PATH).exists() {
            debug!(helper = HELPER_PATH, "Helper not installed");
            return None;
        }

        match Command::new(HELPER_PATH).arg(flag_value(active)).output().await {
            Ok(output) if output.status.success() => {
                info!(active, "Lid-sleep flag written via helper");
                Some(EscalationOutcome::Done)
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                warn!(
                    status = ?output.status.code(),
                    stderr = %stderr.trim(),
                    "Helper failed"
                );
                Some(EscalationOutcome::Failed(format!(
                    "helper exited with status {:?}",
                    output.status.code()
                )))
            }
            Err(e) => {
                warn!(error = %e, "Failed to run helper");
                None
            }
        }
    }

    async fn try_osascript(&self, active: bool) -> EscalationOutcome {
        let script = format!(
            "do shell script \"pmset -a disablesleep {}\" with administrator privileges",
            flag_value(active)
        );

        match Command::new("osascript").arg("-e").arg(&script).output().await {
            Ok(output) if output.status.success() => {
                info!(active, "Lid-sleep flag written via admin prompt");
                EscalationOutcome::Done
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let outcome = classify_osascript_failure(&stderr);
                match &outcome {
                    EscalationOutcome::Cancelled => {
                        info!("User cancelled the authorization prompt")
                    }
                    _ => warn!(stderr = %stderr.trim(), "osascript escalation failed"),
                }
                outcome
            }
            Err(e) => EscalationOutcome::Failed(format!("failed to run osascript: {e}")),
        }
    }
}

#[async_trait]
impl PrivilegeBridge for SystemPrivilegeBridge {
    async fn set_flag(&self, active: bool, interactive: bool) -> EscalationOutcome {
        if let Some(outcome) = self.try_helper(active).await {
            // A helper that ran but failed is authoritative when we cannot
            // prompt; otherwise fall through to the GUI prompt.
            match (&outcome, interactive) {
                (EscalationOutcome::Failed(_), true) => {}
                _ => return outcome,
            }
        }

        if interactive {
            self.try_osascript(active).await
        } else {
            EscalationOutcome::Failed("helper unavailable and prompting not permitted".to_string())
        }
    }
}
