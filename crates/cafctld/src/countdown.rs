//! Per-second session ticking and threshold evaluation.
//!
//! The scheduler spawns a 1-second interval task that sends `Tick`
//! commands back to the session actor. All state mutation happens inside
//! the actor; the tick task only carries the clock reading.

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use cafctl_core::{AlarmState, ThresholdEvent};

use crate::session::SessionCommand;

/// Tick period.
const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Drives the per-second countdown for the running session.
pub struct CountdownScheduler {
    alarm: AlarmState,
    tick_token: Option<CancellationToken>,
}

impl CountdownScheduler {
    pub fn new() -> Self {
        Self {
            alarm: AlarmState::new(),
            tick_token: None,
        }
    }

    /// Starts the tick task, replacing any previous one and resetting the
    /// alarm thresholds for a fresh session.
    pub fn start(&mut self, sender: mpsc::Sender<SessionCommand>) {
        self.stop();
        self.alarm.reset();

        let token = CancellationToken::new();
        self.tick_token = Some(token.clone());

        tokio::spawn(async move {
            let mut ticker = interval(TICK_PERIOD);
            // A delayed tick should not cause a burst of catch-up ticks;
            // the actor computes remaining time from the wall clock.
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Countdown tick task stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        if sender.send(SessionCommand::Tick { now: Utc::now() }).await.is_err() {
                            debug!("Countdown tick task stopping: actor channel closed");
                            break;
                        }
                    }
                }
            }
        });
    }

    /// Cancels the tick task and clears threshold state.
    pub fn stop(&mut self) {
        if let Some(token) = self.tick_token.take() {
            token.cancel();
        }
        self.alarm.reset();
    }

    /// True while a tick task is running.
    pub fn is_running(&self) -> bool {
        self.tick_token.is_some()
    }

    /// Evaluates one tick against the alarm schedule.
    pub fn evaluate(&mut self, remaining_secs: f64, total_secs: f64) -> Vec<ThresholdEvent> {
        self.alarm.advance(remaining_secs, total_secs)
    }
}

impl Default for CountdownScheduler {
    fn default() -> Self {
        Self::new()
    }
}
