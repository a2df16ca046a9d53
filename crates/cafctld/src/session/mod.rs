//! Session management using the actor pattern.
//!
//! The session subsystem tracks the single keep-awake session, the option
//! flags, the lid-sleep override, and the alarm schedule:
//!
//! - **SessionActor** - owns all state, processes commands sequentially
//! - **SessionHandle** - cheap-to-clone handle for sending commands
//! - **SessionCommand** - messages the actor understands
//!
//! Connection handlers hold a `SessionHandle` and never touch state
//! directly, so there are no locks on the session path.

mod actor;
mod commands;
mod handle;

pub use actor::{SessionActor, SessionActorDeps, LID_SLEEP_WARNING};
pub use commands::{LidSleepResponse, SessionCommand, SessionError};
pub use handle::SessionHandle;

use tokio::sync::{broadcast, mpsc};

/// Command channel capacity.
const COMMAND_BUFFER: usize = 100;

/// Event broadcast capacity. Slow subscribers that fall more than this
/// far behind miss events rather than blocking the actor.
const EVENT_BUFFER: usize = 100;

/// Spawns the session actor and returns a handle to it.
///
/// The actor runs until `shutdown()` is called on the handle or every
/// handle is dropped.
pub fn spawn_session_actor(deps: SessionActorDeps) -> SessionHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

    let actor = SessionActor::new(cmd_rx, cmd_tx.clone(), event_tx.clone(), deps);
    tokio::spawn(actor.run());

    SessionHandle::new(cmd_tx, event_tx)
}
