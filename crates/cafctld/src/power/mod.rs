//! Lid-sleep (`pmset disablesleep`) flag management.
//!
//! Disabling sleep on lid close requires root. The daemon never holds
//! elevated privileges itself; it shells out to a small setuid helper when
//! installed, falling back to an `osascript` administrator prompt. The
//! reconciler tracks the flag's lifecycle and keeps the user preference and
//! the observed system state in agreement.

mod escalation;
mod probe;
mod reconciler;

pub use escalation::{
    manual_command, EscalationOutcome, PrivilegeBridge, SystemPrivilegeBridge, HELPER_PATH,
};
pub use probe::{parse_sleep_flag, FlagProbe, PmsetProbe, ProbeError};
pub use reconciler::{run_apply, run_retract, LidOp, LidSleepReconciler, ReconcileError};
