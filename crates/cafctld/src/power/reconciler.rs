//! State machine reconciling the lid-sleep preference with the system flag.
//!
//! The reconciler is owned by the session actor and mutated only from that
//! single task. Privileged operations run in spawned tasks; their outcomes
//! are marshaled back to the actor, which calls `complete_apply` /
//! `complete_retract`. At most one operation is in flight at a time and
//! requests arriving while busy are rejected.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use cafctl_core::{LidFlagPhase, LidSleepState, Notice};

use super::escalation::{manual_command, EscalationOutcome, PrivilegeBridge};
use super::probe::FlagProbe;

/// How long to wait before verifying a flag write took effect.
const SETTLE_DELAY: Duration = Duration::from_millis(300);

/// Which privileged operation is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LidOp {
    Apply,
    Retract,
}

/// Errors from reconciler guards.
#[derive(Debug, Clone, Error)]
pub enum ReconcileError {
    #[error("a lid-sleep operation is already in progress")]
    Busy,
}

/// Tracks the lid-sleep preference, the observed system flag, and the
/// lifecycle phase of any in-flight privileged operation.
pub struct LidSleepReconciler {
    state: LidSleepState,
    phase: LidFlagPhase,
}

impl LidSleepReconciler {
    pub fn new() -> Self {
        Self {
            state: LidSleepState::default(),
            phase: LidFlagPhase::Unknown,
        }
    }

    pub fn state(&self) -> LidSleepState {
        self.state
    }

    pub fn phase(&self) -> LidFlagPhase {
        self.phase
    }

    pub fn is_busy(&self) -> bool {
        self.phase.is_busy()
    }

    /// Records the user's intent without touching the system flag.
    /// While idle only this intent changes; the flag itself is written
    /// when a session starts.
    pub fn set_preference(&mut self, enabled: bool) {
        if self.state.preference != enabled {
            info!(enabled, "Lid-sleep preference changed");
        }
        self.state.preference = enabled;
    }

    /// Records a probe observation. Ignored while an operation is in
    /// flight, since the probe may race the write.
    pub fn observe_probe(&mut self, active: bool) {
        if self.is_busy() {
            debug!(active, "Ignoring probe result during in-flight operation");
            return;
        }

        if self.state.actual_active != active {
            info!(
                was = self.state.actual_active,
                now = active,
                "Observed lid-sleep flag change"
            );
        }
        self.state.actual_active = active;

        if matches!(self.phase, LidFlagPhase::Unknown) {
            self.phase = LidFlagPhase::Probed { active };
        }
    }

    /// Marks an apply operation as started.
    pub fn begin_apply(&mut self) -> Result<(), ReconcileError> {
        if self.is_busy() {
            return Err(ReconcileError::Busy);
        }
        self.phase = LidFlagPhase::Applying;
        Ok(())
    }

    /// Marks a retract operation as started.
    pub fn begin_retract(&mut self) -> Result<(), ReconcileError> {
        if self.is_busy() {
            return Err(ReconcileError::Busy);
        }
        self.phase = LidFlagPhase::Retracting;
        Ok(())
    }

    /// Records the outcome of an apply. Returns a notice for the user
    /// when the operation did not complete. Cancellation and failure
    /// reset the preference: the toggle must not stay on for an action
    /// the user declined or the system refused.
    pub fn complete_apply(&mut self, outcome: EscalationOutcome) -> Option<Notice> {
        match outcome {
            EscalationOutcome::Done => {
                self.state.preference = true;
                self.state.actual_active = true;
                self.phase = LidFlagPhase::Active;
                info!("Lid-sleep override active");
                None
            }
            EscalationOutcome::Cancelled => {
                self.state.preference = false;
                self.phase = LidFlagPhase::Inactive;
                info!("Lid-sleep override cancelled by user");
                Some(Notice::info("Lid-sleep override was not enabled"))
            }
            EscalationOutcome::Failed(reason) => {
                self.state.preference = false;
                self.phase = LidFlagPhase::Failed;
                warn!(reason = %reason, "Lid-sleep apply failed");
                Some(Notice::warning(
                    format!("Could not disable lid sleep: {reason}"),
                    Some(manual_command(true)),
                ))
            }
        }
    }

    /// Records the outcome of a retract. On failure the flag stays set on
    /// the system; the user gets the manual command to clear it. The
    /// preference is untouched: a teardown retract clears the flag for
    /// this session while the intent carries over to the next one.
    pub fn complete_retract(&mut self, outcome: EscalationOutcome) -> Option<Notice> {
        match outcome {
            EscalationOutcome::Done => {
                self.state.actual_active = false;
                self.phase = LidFlagPhase::Inactive;
                info!("Lid-sleep override retracted");
                None
            }
            EscalationOutcome::Cancelled => {
                self.phase = LidFlagPhase::Failed;
                warn!("Lid-sleep retract cancelled, flag remains set");
                Some(Notice::warning(
                    "Lid sleep is still disabled; the retract prompt was cancelled".to_string(),
                    Some(manual_command(false)),
                ))
            }
            EscalationOutcome::Failed(reason) => {
                self.phase = LidFlagPhase::Failed;
                warn!(reason = %reason, "Lid-sleep retract failed, flag remains set");
                Some(Notice::warning(
                    format!("Could not re-enable lid sleep: {reason}"),
                    Some(manual_command(false)),
                ))
            }
        }
    }
}

impl Default for LidSleepReconciler {
    fn default() -> Self {
        Self::new()
    }
}

/// Performs an apply against the system and verifies it settled.
///
/// The escalation outcome is authoritative; the follow-up probe only logs
/// a mismatch for diagnosis.
pub async fn run_apply(
    probe: Arc<dyn FlagProbe>,
    bridge: Arc<dyn PrivilegeBridge>,
    interactive: bool,
) -> EscalationOutcome {
    let outcome = bridge.set_flag(true, interactive).await;
    if outcome == EscalationOutcome::Done {
        verify_settled(probe, true).await;
    }
    outcome
}

/// Performs a retract against the system and verifies it settled.
pub async fn run_retract(
    probe: Arc<dyn FlagProbe>,
    bridge: Arc<dyn PrivilegeBridge>,
    interactive: bool,
) -> EscalationOutcome {
    let outcome = bridge.set_flag(false, interactive).await;
    if outcome == EscalationOutcome::Done {
        verify_settled(probe, false).await;
    }
    outcome
}

async fn verify_settled(probe: Arc<dyn FlagProbe>, expected: bool) {
    tokio::time::sleep(SETTLE_DELAY).await;
    match probe.probe().await {
        Ok(active) if active == expected => {
            debug!(expected, "Flag write verified");
        }
        Ok(active) => {
            warn!(expected, observed = active, "Flag write did not settle as expected");
        }
        Err(e) => {
            debug!(error = %e, "Could not verify flag write");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_done_transitions_to_active() {
        let mut rec = LidSleepReconciler::new();
        rec.begin_apply().unwrap();
        assert!(rec.is_busy());

        let notice = rec.complete_apply(EscalationOutcome::Done);
        assert!(notice.is_none());
        assert_eq!(rec.phase(), LidFlagPhase::Active);
        assert!(rec.state().preference);
        assert!(rec.state().actual_active);
    }

    #[test]
    fn test_apply_cancelled_resets_preference() {
        let mut rec = LidSleepReconciler::new();
        rec.begin_apply().unwrap();

        let notice = rec.complete_apply(EscalationOutcome::Cancelled);
        assert!(notice.is_some());
        assert_eq!(rec.phase(), LidFlagPhase::Inactive);
        assert!(!rec.state().preference);
        assert!(!rec.state().actual_active);
    }

    #[test]
    fn test_apply_failed_carries_remediation() {
        let mut rec = LidSleepReconciler::new();
        rec.begin_apply().unwrap();

        let notice = rec
            .complete_apply(EscalationOutcome::Failed("helper broke".to_string()))
            .unwrap();
        assert_eq!(rec.phase(), LidFlagPhase::Failed);
        assert!(!rec.state().preference);
        assert_eq!(
            notice.remediation.as_deref(),
            Some("sudo pmset -a disablesleep 1")
        );
    }

    #[test]
    fn test_retract_failure_keeps_actual_active() {
        let mut rec = LidSleepReconciler::new();
        rec.begin_apply().unwrap();
        rec.complete_apply(EscalationOutcome::Done);

        rec.begin_retract().unwrap();
        let notice = rec
            .complete_retract(EscalationOutcome::Failed("no tty".to_string()))
            .unwrap();
        // The system flag is still set; the preference carries over.
        assert!(rec.state().actual_active);
        assert!(rec.state().preference);
        assert_eq!(
            notice.remediation.as_deref(),
            Some("sudo pmset -a disablesleep 0")
        );
    }

    #[test]
    fn test_set_preference_records_intent_only() {
        let mut rec = LidSleepReconciler::new();
        rec.set_preference(true);
        assert!(rec.state().preference);
        assert!(!rec.state().actual_active);
        assert!(!rec.is_busy());
    }

    #[test]
    fn test_retract_done_keeps_preference() {
        let mut rec = LidSleepReconciler::new();
        rec.begin_apply().unwrap();
        rec.complete_apply(EscalationOutcome::Done);

        rec.begin_retract().unwrap();
        assert!(rec.complete_retract(EscalationOutcome::Done).is_none());
        assert!(!rec.state().actual_active);
        assert!(rec.state().preference);
        assert_eq!(rec.phase(), LidFlagPhase::Inactive);
    }

    #[test]
    fn test_busy_guard_rejects_second_operation() {
        let mut rec = LidSleepReconciler::new();
        rec.begin_apply().unwrap();
        assert!(matches!(rec.begin_apply(), Err(ReconcileError::Busy)));
        assert!(matches!(rec.begin_retract(), Err(ReconcileError::Busy)));
    }

    #[test]
    fn test_probe_ignored_while_busy() {
        let mut rec = LidSleepReconciler::new();
        rec.begin_apply().unwrap();
        rec.observe_probe(true);
        assert!(!rec.state().actual_active);

        rec.complete_apply(EscalationOutcome::Done);
        rec.observe_probe(false);
        assert!(!rec.state().actual_active);
    }

    #[test]
    fn test_first_probe_sets_probed_phase() {
        let mut rec = LidSleepReconciler::new();
        assert_eq!(rec.phase(), LidFlagPhase::Unknown);
        rec.observe_probe(true);
        assert_eq!(rec.phase(), LidFlagPhase::Probed { active: true });
        assert!(rec.state().actual_active);
    }
}
