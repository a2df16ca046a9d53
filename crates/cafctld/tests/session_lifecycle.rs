//! Integration tests for the session actor through its public handle.
//!
//! These tests spawn the real actor with mock process/probe/bridge
//! implementations and exercise complete flows: start, replace, stop,
//! expiry, and the lid-sleep confirmation round trip.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::time::timeout;

use cafctl_core::{KeepAwakeOptions, SessionDuration, StopReason};
use cafctl_protocol::EventKind;
use cafctld::alarm::SoundBackend;
use cafctld::caffeinate::{KeepAwakeProcess, LaunchError};
use cafctld::power::{EscalationOutcome, FlagProbe, PrivilegeBridge, ProbeError};
use cafctld::session::{spawn_session_actor, LidSleepResponse, SessionActorDeps, SessionHandle};
use cafctld::settings::SettingsStore;

const EVENT_WAIT: Duration = Duration::from_secs(3);

// ============================================================================
// Test Doubles
// ============================================================================

#[derive(Clone, Default)]
struct FakeProcess {
    starts: Arc<AtomicUsize>,
    running: Arc<AtomicBool>,
}

#[async_trait]
impl KeepAwakeProcess for FakeProcess {
    async fn start(
        &mut self,
        _duration: SessionDuration,
        _options: &KeepAwakeOptions,
    ) -> Result<(), LaunchError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

struct FakeProbe {
    flag: Arc<AtomicBool>,
}

#[async_trait]
impl FlagProbe for FakeProbe {
    async fn probe(&self) -> Result<bool, ProbeError> {
        Ok(self.flag.load(Ordering::SeqCst))
    }
}

struct FakeBridge {
    flag: Arc<AtomicBool>,
    writes: Arc<AtomicUsize>,
}

#[async_trait]
impl PrivilegeBridge for FakeBridge {
    async fn set_flag(&self, active: bool, _interactive: bool) -> EscalationOutcome {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.flag.store(active, Ordering::SeqCst);
        EscalationOutcome::Done
    }
}

struct SilentSounds;

#[async_trait]
impl SoundBackend for SilentSounds {
    async fn play_tone(&self) {}
    async fn play_pip(&self) {}
}

struct TestActor {
    handle: SessionHandle,
    process: FakeProcess,
    flag: Arc<AtomicBool>,
    writes: Arc<AtomicUsize>,
    _dir: TempDir,
}

fn spawn_actor() -> TestActor {
    let dir = tempfile::tempdir().expect("create temp dir");
    let store = SettingsStore::new(dir.path().join("settings.toml"));

    let flag = Arc::new(AtomicBool::new(false));
    let writes = Arc::new(AtomicUsize::new(0));
    let process = FakeProcess::default();

    let handle = spawn_session_actor(SessionActorDeps {
        process: Box::new(process.clone()),
        probe: Arc::new(FakeProbe {
            flag: Arc::clone(&flag),
        }),
        bridge: Arc::new(FakeBridge {
            flag: Arc::clone(&flag),
            writes: Arc::clone(&writes),
        }),
        sounds: Arc::new(SilentSounds),
        store,
    });

    TestActor {
        handle,
        process,
        flag,
        writes,
        _dir: dir,
    }
}

/// Waits for an event matching the predicate, skipping others.
async fn wait_for_event<F>(
    rx: &mut tokio::sync::broadcast::Receiver<EventKind>,
    mut pred: F,
) -> EventKind
where
    F: FnMut(&EventKind) -> bool,
{
    loop {
        let event = timeout(EVENT_WAIT, rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed");
        if pred(&event) {
            return event;
        }
    }
}

// ============================================================================
// Lifecycle Tests
// ============================================================================

#[tokio::test]
async fn test_start_status_stop_flow() {
    let actor = spawn_actor();

    let report = actor.handle.start(Some(600)).await.expect("start");
    assert!(report.session.active);
    assert_eq!(report.session.duration_secs, Some(600));
    assert!(actor.process.is_running());

    let status = actor.handle.status().await.expect("status");
    assert!(status.session.active);
    let remaining = status.session.remaining_secs.expect("remaining");
    assert!(remaining <= 600);

    let reason = actor.handle.stop().await.expect("stop");
    assert_eq!(reason, Some(StopReason::Requested));
    assert!(!actor.process.is_running());

    let status = actor.handle.status().await.expect("status after stop");
    assert!(!status.session.active);
}

#[tokio::test]
async fn test_stop_without_session_is_noop() {
    let actor = spawn_actor();

    let reason = actor.handle.stop().await.expect("stop");
    assert_eq!(reason, None);
}

#[tokio::test]
async fn test_restart_broadcasts_ended_then_started() {
    let actor = spawn_actor();
    let mut events = actor.handle.subscribe();

    actor.handle.start(Some(600)).await.expect("first start");
    wait_for_event(&mut events, |e| {
        matches!(e, EventKind::SessionStarted { .. })
    })
    .await;

    actor.handle.start(Some(900)).await.expect("second start");

    let ended = wait_for_event(&mut events, |e| {
        matches!(e, EventKind::SessionEnded { .. })
    })
    .await;
    assert!(matches!(
        ended,
        EventKind::SessionEnded {
            reason: StopReason::Restarted
        }
    ));

    let started = wait_for_event(&mut events, |e| {
        matches!(e, EventKind::SessionStarted { .. })
    })
    .await;
    if let EventKind::SessionStarted { report } = started {
        assert_eq!(report.session.duration_secs, Some(900));
    }
}

#[tokio::test]
async fn test_short_session_expires_on_its_own() {
    let actor = spawn_actor();
    let mut events = actor.handle.subscribe();

    actor.handle.start(Some(1)).await.expect("start");

    let ended = wait_for_event(&mut events, |e| {
        matches!(e, EventKind::SessionEnded { .. })
    })
    .await;
    assert!(matches!(
        ended,
        EventKind::SessionEnded {
            reason: StopReason::Expired
        }
    ));

    let status = actor.handle.status().await.expect("status");
    assert!(!status.session.active);
    assert!(!actor.process.is_running());
}

#[tokio::test]
async fn test_final_countdown_thresholds_for_short_session() {
    let actor = spawn_actor();
    let mut events = actor.handle.subscribe();

    // A 3-second session is inside the final window from the start, so
    // countdown pips fire on the way out.
    actor.handle.start(Some(3)).await.expect("start");

    let threshold = wait_for_event(&mut events, |e| {
        matches!(e, EventKind::Threshold { .. })
    })
    .await;
    if let EventKind::Threshold { remaining_secs, .. } = threshold {
        assert!(remaining_secs <= 3);
    }
}

// ============================================================================
// Lid-Sleep Flow Tests
// ============================================================================

#[tokio::test]
async fn test_lid_sleep_confirmation_round_trip() {
    let actor = spawn_actor();

    // First request without confirmation gets the warning back.
    let response = actor
        .handle
        .set_lid_sleep(true, false)
        .await
        .expect("set_lid_sleep");
    match response {
        LidSleepResponse::ConfirmationRequired { warning } => {
            assert!(!warning.is_empty());
        }
        other => panic!("Expected ConfirmationRequired, got {other:?}"),
    }
    assert_eq!(actor.writes.load(Ordering::SeqCst), 0);

    // Confirmed request records the intent; nothing is written while idle.
    let response = actor
        .handle
        .set_lid_sleep(true, true)
        .await
        .expect("set_lid_sleep confirmed");
    match response {
        LidSleepResponse::Accepted { report } => {
            assert!(report.lid.preference);
            assert!(!report.lid.actual_active);
        }
        other => panic!("Expected Accepted, got {other:?}"),
    }
    assert_eq!(actor.writes.load(Ordering::SeqCst), 0);

    // Starting a session applies the recorded preference.
    let mut events = actor.handle.subscribe();
    actor.handle.start(Some(600)).await.expect("start");
    wait_for_event(&mut events, |e| {
        matches!(
            e,
            EventKind::LidChanged {
                actual_active: true,
                ..
            }
        )
    })
    .await;
    assert!(actor.flag.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_stop_retracts_lid_flag() {
    let actor = spawn_actor();
    let mut events = actor.handle.subscribe();

    actor.handle.start(Some(600)).await.expect("start");
    actor
        .handle
        .set_lid_sleep(true, true)
        .await
        .expect("enable lid override");
    assert!(actor.flag.load(Ordering::SeqCst));

    actor.handle.stop().await.expect("stop");

    // The retraction completes asynchronously after the stop reply.
    let changed = wait_for_event(&mut events, |e| {
        matches!(
            e,
            EventKind::LidChanged {
                actual_active: false,
                ..
            }
        )
    })
    .await;
    // The preference survives the teardown; only the flag is cleared.
    assert!(matches!(
        changed,
        EventKind::LidChanged {
            preference: true,
            actual_active: false
        }
    ));
    assert!(!actor.flag.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_disable_when_inactive_is_noop() {
    let actor = spawn_actor();

    let response = actor
        .handle
        .set_lid_sleep(false, false)
        .await
        .expect("set_lid_sleep off");
    match response {
        LidSleepResponse::Accepted { report } => {
            assert!(!report.lid.preference);
            assert!(!report.lid.actual_active);
        }
        other => panic!("Expected Accepted, got {other:?}"),
    }
    assert_eq!(actor.writes.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Settings Tests
// ============================================================================

#[tokio::test]
async fn test_option_changes_survive_in_report() {
    let actor = spawn_actor();

    let report = actor
        .handle
        .set_option(cafctl_core::OptionKind::DisplaySleep, true)
        .await
        .expect("set option");
    assert!(report.options.display_sleep);
    assert!(report.options.idle_sleep); // default stays on

    let report = actor.handle.set_alarm(false).await.expect("set alarm");
    assert!(!report.alarm_enabled);
}

#[tokio::test]
async fn test_shutdown_stops_actor() {
    let actor = spawn_actor();

    actor.handle.start(Some(600)).await.expect("start");
    actor.handle.shutdown().await.expect("shutdown");

    // After shutdown the command channel is closed.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(actor.handle.start(Some(600)).await.is_err());
}
