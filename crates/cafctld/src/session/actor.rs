//! Session actor - owns all keep-awake state and processes commands.
//!
//! The SessionActor is the single owner of mutable state in the daemon:
//! the running session, the option flags, the alarm schedule, and the
//! lid-sleep reconciler. It receives commands via an mpsc channel and
//! publishes events via broadcast. Blocking work (privileged flag writes,
//! flag probes) runs in spawned tasks whose results are marshaled back to
//! the actor through its own command channel.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Channel send failures are logged but don't panic

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use cafctl_core::{
    KeepAwakeOptions, OptionKind, Session, SessionDuration, SessionSnapshot, StatusReport,
    StopReason,
};
use cafctl_protocol::EventKind;

use crate::alarm::{AlarmSequencer, SoundBackend};
use crate::caffeinate::KeepAwakeProcess;
use crate::countdown::CountdownScheduler;
use crate::power::{
    run_apply, run_retract, EscalationOutcome, FlagProbe, LidOp, LidSleepReconciler,
    PrivilegeBridge,
};
use crate::settings::{Settings, SettingsStore};

use super::commands::{LidSleepResponse, SessionCommand, SessionError};

/// Warning shown before enabling the lid-sleep override.
pub const LID_SLEEP_WARNING: &str = "Disabling lid sleep keeps the machine fully awake with the \
lid closed. In a bag or on a soft surface this can cause serious heat buildup. Administrator \
authorization is required.";

/// Bound on the inline retract performed at shutdown.
const SHUTDOWN_RETRACT_TIMEOUT: Duration = Duration::from_secs(5);

/// External dependencies of the session actor.
///
/// Production wiring uses the real process runner, pmset probe, and
/// escalation bridge; tests substitute mocks.
pub struct SessionActorDeps {
    pub process: Box<dyn KeepAwakeProcess>,
    pub probe: Arc<dyn FlagProbe>,
    pub bridge: Arc<dyn PrivilegeBridge>,
    pub sounds: Arc<dyn SoundBackend>,
    pub store: SettingsStore,
}

/// The session actor - owns all keep-awake state.
///
/// Implements the actor pattern: receives commands via mpsc channel,
/// processes them sequentially, and publishes events to subscribers.
/// Exactly one session exists at a time; `Start` while active performs an
/// implicit stop-then-start.
pub struct SessionActor {
    /// Command receiver
    receiver: mpsc::Receiver<SessionCommand>,

    /// Sender to our own channel, for tick and completion marshaling
    self_tx: mpsc::Sender<SessionCommand>,

    /// Event publisher for real-time updates to clients
    event_publisher: broadcast::Sender<EventKind>,

    process: Box<dyn KeepAwakeProcess>,
    probe: Arc<dyn FlagProbe>,
    bridge: Arc<dyn PrivilegeBridge>,
    sequencer: AlarmSequencer,

    store: SettingsStore,
    settings: Settings,

    session: Option<Session>,
    options: KeepAwakeOptions,
    alarm_enabled: bool,
    last_duration: SessionDuration,
    reconciler: LidSleepReconciler,
    countdown: CountdownScheduler,

    /// Reply for the lid-sleep request whose privileged operation is in
    /// flight. At most one, guarded by the reconciler's busy check.
    pending_lid_reply: Option<oneshot::Sender<Result<LidSleepResponse, SessionError>>>,

    /// Status requests waiting on a fresh flag probe.
    pending_status: Vec<oneshot::Sender<StatusReport>>,
}

impl SessionActor {
    /// Creates a new session actor, loading persisted settings.
    pub fn new(
        receiver: mpsc::Receiver<SessionCommand>,
        self_tx: mpsc::Sender<SessionCommand>,
        event_publisher: broadcast::Sender<EventKind>,
        deps: SessionActorDeps,
    ) -> Self {
        let settings = deps.store.load();
        let options = settings.options();
        let alarm_enabled = settings.alarm_enabled;
        let last_duration = SessionDuration::from_secs(settings.last_duration_secs)
            .unwrap_or_default();

        let mut reconciler = LidSleepReconciler::new();
        reconciler.set_preference(settings.lid_sleep_disabled);

        Self {
            receiver,
            self_tx,
            event_publisher,
            process: deps.process,
            probe: deps.probe,
            bridge: deps.bridge,
            sequencer: AlarmSequencer::new(deps.sounds),
            store: deps.store,
            settings,
            session: None,
            options,
            alarm_enabled,
            last_duration,
            reconciler,
            countdown: CountdownScheduler::new(),
            pending_lid_reply: None,
            pending_status: Vec::new(),
        }
    }

    /// Runs the actor event loop.
    ///
    /// Performs the startup flag sync, then processes commands until a
    /// `Shutdown` arrives or the channel closes.
    pub async fn run(mut self) {
        info!("Session actor starting");

        self.startup_sync().await;

        while let Some(cmd) = self.receiver.recv().await {
            if let SessionCommand::Shutdown { respond_to } = cmd {
                self.handle_shutdown().await;
                let _ = respond_to.send(());
                break;
            }
            self.handle_command(cmd).await;
        }

        info!("Session actor stopped");
    }

    /// Reconciles the system flag at startup.
    ///
    /// A set flag with no running session is stale (the daemon died
    /// mid-session). It is cleared silently via the helper only; the
    /// daemon never shows an authorization prompt without a user action.
    async fn startup_sync(&mut self) {
        match self.probe.probe().await {
            Ok(active) => {
                self.reconciler.observe_probe(active);
                if active {
                    info!("Stale lid-sleep flag found at startup, retracting");
                    if self.reconciler.begin_retract().is_ok() {
                        let outcome = run_retract(
                            Arc::clone(&self.probe),
                            Arc::clone(&self.bridge),
                            false,
                        )
                        .await;
                        if let Some(notice) = self.reconciler.complete_retract(outcome) {
                            warn!(message = %notice.message, "Could not clear stale lid-sleep flag");
                        }
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Initial flag probe failed");
            }
        }
    }

    /// Dispatches a command to the appropriate handler.
    async fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Start {
                duration_secs,
                respond_to,
            } => {
                let result = self.handle_start(duration_secs).await;
                // Ignore send error - client may have dropped the receiver
                let _ = respond_to.send(result);
            }
            SessionCommand::Stop { respond_to } => {
                let reason = if self.session.is_some() {
                    self.teardown(StopReason::Requested).await;
                    Some(StopReason::Requested)
                } else {
                    debug!("Stop with no running session");
                    None
                };
                let _ = respond_to.send(reason);
            }
            SessionCommand::GetStatus { respond_to } => {
                self.pending_status.push(respond_to);
                self.spawn_probe();
            }
            SessionCommand::SetOption {
                option,
                enabled,
                respond_to,
            } => {
                let result = self.handle_set_option(option, enabled);
                let _ = respond_to.send(result);
            }
            SessionCommand::SetLidSleep {
                enabled,
                confirmed,
                respond_to,
            } => {
                self.handle_set_lid_sleep(enabled, confirmed, respond_to);
            }
            SessionCommand::SetAlarm {
                enabled,
                respond_to,
            } => {
                self.alarm_enabled = enabled;
                self.settings.alarm_enabled = enabled;
                self.persist_settings();
                info!(enabled, "Alarm setting changed");
                let _ = respond_to.send(self.report());
            }
            SessionCommand::Tick { now } => {
                self.handle_tick(now).await;
            }
            SessionCommand::LidOpFinished { op, outcome } => {
                self.handle_lid_op_finished(op, outcome);
            }
            SessionCommand::ProbeResult { active } => {
                self.handle_probe_result(active);
            }
            SessionCommand::Shutdown { respond_to } => {
                // Handled in run(); reachable only when driving
                // handle_command directly.
                self.handle_shutdown().await;
                let _ = respond_to.send(());
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    /// Handles session start, replacing any running session.
    async fn handle_start(
        &mut self,
        duration_secs: Option<u64>,
    ) -> Result<StatusReport, SessionError> {
        let duration = match duration_secs {
            Some(secs) => SessionDuration::from_secs(secs)?,
            None => self.last_duration,
        };

        if self.session.is_some() {
            info!("Session active, replacing");
            self.teardown(StopReason::Restarted).await;
        }

        self.process
            .start(duration, &self.options)
            .await
            .map_err(|e| SessionError::Launch(e.to_string()))?;

        let session = Session::begin(Utc::now(), duration);
        info!(
            duration = %duration,
            end_at = %session.end_at,
            "Session started"
        );
        self.session = Some(session);

        self.last_duration = duration;
        self.settings.last_duration_secs = duration.as_secs();
        self.persist_settings();

        self.countdown.start(self.self_tx.clone());

        // Write the flag the user asked for while idle.
        let lid = self.reconciler.state();
        if lid.preference && !lid.actual_active && self.reconciler.begin_apply().is_ok() {
            self.spawn_lid_op(LidOp::Apply, true);
        }

        let report = self.report();
        let _ = self.event_publisher.send(EventKind::SessionStarted {
            report: Box::new(report.clone()),
        });
        Ok(report)
    }

    /// Stops the session and releases everything it held.
    ///
    /// Used identically for explicit stop, expiry, replacement, and
    /// shutdown; only the broadcast reason differs.
    async fn teardown(&mut self, reason: StopReason) {
        self.countdown.stop();
        self.process.stop().await;

        if self.session.take().is_some() {
            info!(reason = %reason, "Session ended");
            let _ = self
                .event_publisher
                .send(EventKind::SessionEnded { reason });
        }

        // Clear the lid flag if it is set; replacement keeps it for the
        // next session to avoid a retract-reapply prompt pair.
        if reason != StopReason::Restarted && self.reconciler.state().actual_active {
            if self.reconciler.is_busy() {
                warn!("Lid operation in flight during teardown, flag not retracted");
            } else if self.reconciler.begin_retract().is_ok() {
                // Prompting is acceptable only for a user-initiated stop.
                let interactive = reason == StopReason::Requested;
                self.spawn_lid_op(LidOp::Retract, interactive);
            }
        }
    }

    /// Handles one countdown tick.
    async fn handle_tick(&mut self, now: DateTime<Utc>) {
        let (expired, remaining, total) = match &self.session {
            Some(s) => (
                s.is_expired(now),
                s.remaining_secs_f64(now),
                s.requested.as_secs_f64(),
            ),
            None => return,
        };

        if expired {
            info!("Session budget exhausted");
            self.teardown(StopReason::Expired).await;
            return;
        }

        for event in self.countdown.evaluate(remaining, total) {
            debug!(event = ?event, remaining_secs = remaining, "Alarm threshold crossed");
            let _ = self.event_publisher.send(EventKind::Threshold {
                threshold: event,
                remaining_secs: remaining.max(0.0).ceil() as u64,
            });
            // Thresholds are always broadcast; only the sounds are gated.
            if self.alarm_enabled {
                self.sequencer.render(event);
            }
        }
    }

    /// Handles an option toggle. A running session keeps the flags it was
    /// started with; the change takes effect at the next start.
    fn handle_set_option(
        &mut self,
        option: OptionKind,
        enabled: bool,
    ) -> Result<StatusReport, SessionError> {
        self.options.set(option, enabled);
        self.settings.set_options(&self.options);
        self.persist_settings();
        if self.session.is_some() {
            info!(option = %option, enabled, "Option changed, applies to the next session");
        } else {
            info!(option = %option, enabled, "Option changed");
        }

        Ok(self.report())
    }

    /// Handles a lid-sleep preference change.
    fn handle_set_lid_sleep(
        &mut self,
        enabled: bool,
        confirmed: bool,
        respond_to: oneshot::Sender<Result<LidSleepResponse, SessionError>>,
    ) {
        if enabled && !confirmed && !self.settings.lid_warning_acknowledged {
            let _ = respond_to.send(Ok(LidSleepResponse::ConfirmationRequired {
                warning: LID_SLEEP_WARNING.to_string(),
            }));
            return;
        }
        if enabled && confirmed && !self.settings.lid_warning_acknowledged {
            self.settings.lid_warning_acknowledged = true;
            self.persist_settings();
        }

        if self.reconciler.is_busy() {
            let _ = respond_to.send(Err(SessionError::LidBusy));
            return;
        }

        self.reconciler.set_preference(enabled);
        self.settings.lid_sleep_disabled = enabled;
        self.persist_settings();

        let state = self.reconciler.state();

        // While idle the toggle only records intent; the flag is
        // written when a session starts and cleared on teardown.
        // During a session the change takes effect immediately.
        let needs_op = self.session.is_some() && state.actual_active != enabled;
        if !needs_op {
            let _ = self.event_publisher.send(EventKind::LidChanged {
                preference: state.preference,
                actual_active: state.actual_active,
            });
            let _ = respond_to.send(Ok(LidSleepResponse::Accepted {
                report: Box::new(self.report()),
            }));
            return;
        }

        let begun = if enabled {
            self.reconciler.begin_apply()
        } else {
            self.reconciler.begin_retract()
        };
        // Cannot fail; busy was checked above
        if begun.is_ok() {
            self.pending_lid_reply = Some(respond_to);
            let op = if enabled { LidOp::Apply } else { LidOp::Retract };
            self.spawn_lid_op(op, true);
        }
    }

    /// Handles completion of a privileged lid operation.
    fn handle_lid_op_finished(&mut self, op: LidOp, outcome: EscalationOutcome) {
        // A retract with no client waiting came from teardown, expiry, or
        // shutdown; its failures are logged, not surfaced.
        let user_initiated = self.pending_lid_reply.is_some();

        let notice = match op {
            LidOp::Apply => self.reconciler.complete_apply(outcome),
            LidOp::Retract => self.reconciler.complete_retract(outcome),
        };

        let state = self.reconciler.state();
        self.settings.lid_sleep_disabled = state.preference;
        self.persist_settings();

        let _ = self.event_publisher.send(EventKind::LidChanged {
            preference: state.preference,
            actual_active: state.actual_active,
        });
        if let Some(notice) = notice {
            if op == LidOp::Apply || user_initiated {
                self.publish_notice(notice);
            } else {
                warn!(message = %notice.message, "Lid-sleep flag retract failed");
            }
        }

        if let Some(reply) = self.pending_lid_reply.take() {
            let _ = reply.send(Ok(LidSleepResponse::Accepted {
                report: Box::new(self.report()),
            }));
        }

        // The session may have ended while the apply was in flight. The
        // flag must not outlive it: clear it via the helper right away.
        if op == LidOp::Apply
            && state.actual_active
            && self.session.is_none()
            && self.reconciler.begin_retract().is_ok()
        {
            info!("Session ended while lid-sleep apply was in flight, retracting");
            self.spawn_lid_op(LidOp::Retract, false);
        }
    }

    /// Handles a probe result and answers waiting status requests.
    fn handle_probe_result(&mut self, active: Option<bool>) {
        match active {
            Some(active) => self.reconciler.observe_probe(active),
            None => {
                // An unavailable probe reports the flag as inactive.
                warn!("Flag probe failed, reporting lid-sleep flag as inactive");
                self.reconciler.observe_probe(false);
            }
        }

        let report = self.report();
        for reply in self.pending_status.drain(..) {
            let _ = reply.send(report.clone());
        }
    }

    /// Graceful shutdown: stop the session and clear the flag, bounded.
    async fn handle_shutdown(&mut self) {
        info!("Session actor shutting down");
        self.countdown.stop();
        self.process.stop().await;

        if self.session.take().is_some() {
            let _ = self.event_publisher.send(EventKind::SessionEnded {
                reason: StopReason::Shutdown,
            });
        }

        if self.reconciler.state().actual_active && !self.reconciler.is_busy() {
            if self.reconciler.begin_retract().is_ok() {
                let outcome = match timeout(
                    SHUTDOWN_RETRACT_TIMEOUT,
                    run_retract(Arc::clone(&self.probe), Arc::clone(&self.bridge), false),
                )
                .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => EscalationOutcome::Failed("retract timed out".to_string()),
                };
                if let Some(notice) = self.reconciler.complete_retract(outcome) {
                    warn!(message = %notice.message, "Lid-sleep flag left set at shutdown");
                }
            }
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Spawns a privileged flag write; the outcome comes back as a
    /// `LidOpFinished` command.
    fn spawn_lid_op(&self, op: LidOp, interactive: bool) {
        let probe = Arc::clone(&self.probe);
        let bridge = Arc::clone(&self.bridge);
        let self_tx = self.self_tx.clone();

        tokio::spawn(async move {
            let outcome = match op {
                LidOp::Apply => run_apply(probe, bridge, interactive).await,
                LidOp::Retract => run_retract(probe, bridge, interactive).await,
            };
            if self_tx
                .send(SessionCommand::LidOpFinished { op, outcome })
                .await
                .is_err()
            {
                debug!("Actor gone before lid operation completed");
            }
        });
    }

    /// Spawns a flag probe; the result comes back as a `ProbeResult`.
    fn spawn_probe(&self) {
        let probe = Arc::clone(&self.probe);
        let self_tx = self.self_tx.clone();

        tokio::spawn(async move {
            let active = match probe.probe().await {
                Ok(active) => Some(active),
                Err(e) => {
                    debug!(error = %e, "Flag probe failed");
                    None
                }
            };
            let _ = self_tx.send(SessionCommand::ProbeResult { active }).await;
        });
    }

    fn publish_notice(&self, notice: cafctl_core::Notice) {
        let _ = self.event_publisher.send(EventKind::Notice {
            severity: notice.severity,
            message: notice.message,
            remediation: notice.remediation,
        });
    }

    fn persist_settings(&self) {
        if let Err(e) = self.store.save(&self.settings) {
            warn!(error = %e, "Failed to persist settings");
        }
    }

    /// Builds a status report from current state.
    fn report(&self) -> StatusReport {
        let now = Utc::now();
        let session = match &self.session {
            Some(s) => SessionSnapshot {
                active: true,
                started_at: Some(s.started_at),
                end_at: Some(s.end_at),
                duration_secs: Some(s.requested.as_secs()),
                remaining_secs: Some(s.remaining(now).num_seconds().max(0) as u64),
                percent_remaining: Some(s.percent_remaining(now)),
            },
            None => SessionSnapshot::idle(),
        };

        StatusReport {
            session,
            options: self.options,
            lid: self.reconciler.state(),
            alarm_enabled: self.alarm_enabled,
            last_duration_secs: self.last_duration.as_secs(),
        }
    }

    // ========================================================================
    // Accessors (for testing)
    // ========================================================================

    #[cfg(test)]
    fn session_active(&self) -> bool {
        self.session.is_some()
    }
}
