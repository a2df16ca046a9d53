//! Management of the `caffeinate` child process.
//!
//! The daemon keeps the machine awake by running the system `caffeinate`
//! binary with a `-t` time bound matching the session budget. The child's
//! own exit is never used for expiry; the session actor tracks the
//! wall-clock end time and the `-t` bound is a backstop in case the
//! daemon dies mid-session.

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use cafctl_core::{KeepAwakeOptions, SessionDuration};

/// Path of the system keep-awake binary.
const CAFFEINATE_BIN: &str = "/usr/bin/caffeinate";

/// Errors that can occur launching the keep-awake child.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("Failed to spawn {bin}: {error}")]
    Spawn { bin: String, error: String },
}

/// Abstraction over the keep-awake child process.
///
/// The session actor talks to this trait so tests can substitute a mock
/// that records launches instead of spawning real processes.
#[async_trait]
pub trait KeepAwakeProcess: Send {
    /// Starts the child for the given budget. Any previous child is
    /// stopped first.
    async fn start(
        &mut self,
        duration: SessionDuration,
        options: &KeepAwakeOptions,
    ) -> Result<(), LaunchError>;

    /// Stops the child if one is running. Idempotent.
    async fn stop(&mut self);

    /// True while a child is believed to be running.
    fn is_running(&self) -> bool;
}

/// Runs the real `caffeinate` binary.
pub struct CaffeinateRunner {
    child: Option<Child>,
}

impl CaffeinateRunner {
    pub fn new() -> Self {
        Self { child: None }
    }
}

impl Default for CaffeinateRunner {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds the argument list for a `caffeinate` invocation.
///
/// Option flags come first in stable order, then the `-t` time bound.
pub fn launch_args(duration: SessionDuration, options: &KeepAwakeOptions) -> Vec<String> {
    let mut args: Vec<String> = options
        .flag_args()
        .into_iter()
        .map(String::from)
        .collect();
    args.push("-t".to_string());
    args.push(duration.as_secs().to_string());
    args
}

#[async_trait]
impl KeepAwakeProcess for CaffeinateRunner {
    async fn start(
        &mut self,
        duration: SessionDuration,
        options: &KeepAwakeOptions,
    ) -> Result<(), LaunchError> {
        self.stop().await;

        let args = launch_args(duration, options);
        debug!(bin = CAFFEINATE_BIN, args = ?args, "Spawning keep-awake child");

        let child = Command::new(CAFFEINATE_BIN)
            .args(&args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| LaunchError::Spawn {
                bin: CAFFEINATE_BIN.to_string(),
                error: e.to_string(),
            })?;

        info!(
            pid = ?child.id(),
            duration_secs = duration.as_secs(),
            "Keep-awake child started"
        );

        self.child = Some(child);
        Ok(())
    }

    async fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let pid = child.id();
            match child.kill().await {
                Ok(()) => info!(pid = ?pid, "Keep-awake child stopped"),
                Err(e) => warn!(pid = ?pid, error = %e, "Failed to kill keep-awake child"),
            }
        }
    }

    fn is_running(&self) -> bool {
        self.child.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_args_default_options() {
        let duration = SessionDuration::from_secs(900).unwrap();
        let args = launch_args(duration, &KeepAwakeOptions::default());
        assert_eq!(args, vec!["-i", "-t", "900"]);
    }

    #[test]
    fn test_launch_args_all_options() {
        let options = KeepAwakeOptions {
            display_sleep: true,
            idle_sleep: true,
            disk_sleep: true,
            system_sleep: true,
            user_active: true,
        };
        let duration = SessionDuration::from_secs(3600).unwrap();
        let args = launch_args(duration, &options);
        assert_eq!(args, vec!["-d", "-i", "-m", "-s", "-u", "-t", "3600"]);
    }

    #[test]
    fn test_launch_args_no_options_still_has_time_bound() {
        let options = KeepAwakeOptions {
            display_sleep: false,
            idle_sleep: false,
            disk_sleep: false,
            system_sleep: false,
            user_active: false,
        };
        let duration = SessionDuration::from_secs(60).unwrap();
        assert_eq!(launch_args(duration, &options), vec!["-t", "60"]);
    }

    #[tokio::test]
    async fn test_runner_stop_without_child_is_noop() {
        let mut runner = CaffeinateRunner::new();
        assert!(!runner.is_running());
        runner.stop().await;
        assert!(!runner.is_running());
    }
}
