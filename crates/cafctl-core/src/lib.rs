//! cafctl Core - Shared domain types for the keep-awake agent
//!
//! This crate provides the domain model shared between the daemon (cafctld)
//! and the control CLI (cafctl): sessions with a fixed end time, the
//! caffeinate option flags, the alarm threshold schedule, and the lid-sleep
//! override state machine's value types.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, or `todo!()` outside of tests.

pub mod alarm;
pub mod error;
pub mod lid;
pub mod options;
pub mod report;
pub mod session;

// Re-exports for convenience
pub use alarm::{AlarmState, ThresholdEvent, FINAL_COUNTDOWN_WINDOW_SECS};
pub use error::{DomainError, DomainResult};
pub use lid::{LidFlagPhase, LidSleepState};
pub use options::{KeepAwakeOptions, OptionKind};
pub use report::{Notice, NoticeSeverity, SessionSnapshot, StatusReport};
pub use session::{
    RemainingDisplay, Session, SessionDuration, StopReason, DEFAULT_DURATION_SECS,
};
