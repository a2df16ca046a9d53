//! Integration tests for the Unix socket server.
//!
//! These tests verify the DaemonServer works correctly as a complete
//! system: connection handling, protocol negotiation, request routing,
//! event subscriptions, and graceful shutdown. The session actor runs
//! with mock process/probe/bridge implementations so no real child
//! process or privileged operation is involved.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use cafctl_core::{KeepAwakeOptions, SessionDuration};
use cafctl_protocol::{ClientMessage, ClientRequest, DaemonMessage, ProtocolVersion};
use cafctld::alarm::SoundBackend;
use cafctld::caffeinate::{KeepAwakeProcess, LaunchError};
use cafctld::power::{EscalationOutcome, FlagProbe, PrivilegeBridge, ProbeError};
use cafctld::server::DaemonServer;
use cafctld::session::{spawn_session_actor, SessionActorDeps};
use cafctld::settings::SettingsStore;

// ============================================================================
// Constants
// ============================================================================

/// Maximum time to wait for server socket to appear
const SOCKET_WAIT_TIMEOUT: Duration = Duration::from_millis(500);

/// Interval between socket existence checks
const SOCKET_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Grace period for server shutdown
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_millis(100);

// ============================================================================
// Test Doubles
// ============================================================================

#[derive(Clone, Default)]
struct FakeProcess {
    running: Arc<AtomicBool>,
}

#[async_trait]
impl KeepAwakeProcess for FakeProcess {
    async fn start(
        &mut self,
        _duration: SessionDuration,
        _options: &KeepAwakeOptions,
    ) -> Result<(), LaunchError> {
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
}

#[async_trait]
impl PrivilegeBridge for FakeBridge {
    async fn set_flag(&self, active: bool, _interactive: bool) -> EscalationOutcome {
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

// ============================================================================
// Test Helpers
// ============================================================================

/// Test server context that manages server lifecycle and cleanup.
struct TestServer {
    socket_path: PathBuf,
    cancel_token: CancellationToken,
    _temp_dir: TempDir, // Keep alive for RAII cleanup
}

impl TestServer {
    /// Spawns a new test server in the background.
    async fn spawn() -> Self {
        let temp_dir = tempfile::tempdir().expect("create temp dir");
        let socket_path = temp_dir.path().join("test.sock");

        let flag = Arc::new(AtomicBool::new(false));
        let session = spawn_session_actor(SessionActorDeps {
            process: Box::new(FakeProcess::default()),
            probe: Arc::new(FakeProbe {
                flag: Arc::clone(&flag),
            }),
            bridge: Arc::new(FakeBridge { flag }),
            sounds: Arc::new(SilentSounds),
            store: SettingsStore::new(temp_dir.path().join("settings.toml")),
        });

        let cancel_token = CancellationToken::new();
        let server = DaemonServer::new(socket_path.clone(), session, cancel_token.clone());

        // Spawn server in background
        tokio::spawn(async move {
            let _ = server.run().await;
        });

        // Wait for socket to be ready with timeout
        let start = tokio::time::Instant::now();
        while start.elapsed() < SOCKET_WAIT_TIMEOUT {
            if socket_path.exists() {
                break;
            }
            sleep(SOCKET_POLL_INTERVAL).await;
        }

        assert!(
            socket_path.exists(),
            "Server socket did not appear within {SOCKET_WAIT_TIMEOUT:?}"
        );

        TestServer {
            socket_path,
            cancel_token,
            _temp_dir: temp_dir,
        }
    }

    /// Creates a client connection to the server.
    async fn connect(&self) -> TestClient {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .expect("connect to server");
        TestClient::new(stream)
    }

    /// Shuts down the server gracefully.
    async fn shutdown(self) {
        self.cancel_token.cancel();
        sleep(SHUTDOWN_GRACE_PERIOD).await;
    }
}

/// Test client connection with protocol helpers.
struct TestClient {
    reader: BufReader<tokio::net::unix::OwnedReadHalf>,
    writer: tokio::net::unix::OwnedWriteHalf,
}

impl TestClient {
    fn new(stream: UnixStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    /// Sends a message to the server.
    async fn send(&mut self, msg: ClientMessage) {
        let json = serde_json::to_string(&msg).unwrap();
        self.writer.write_all(json.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
        self.writer.flush().await.unwrap();
    }

    /// Receives a message from the server.
    async fn recv(&mut self) -> DaemonMessage {
        let mut line = String::new();
        self.reader.read_line(&mut line).await.unwrap();
        serde_json::from_str(&line).unwrap()
    }

    /// Performs handshake with optional client ID.
    async fn handshake(&mut self, client_id: Option<String>) -> String {
        self.send(ClientMessage::connect(client_id)).await;

        match self.recv().await {
            DaemonMessage::Connected { client_id, .. } => client_id,
            other => panic!("Expected Connected, got {other:?}"),
        }
    }

    /// Performs handshake with a specific protocol version.
    async fn handshake_with_version(&mut self, version: ProtocolVersion) -> DaemonMessage {
        let msg = ClientMessage {
            protocol_version: version,
            request: ClientRequest::Connect { client_id: None },
        };
        self.send(msg).await;
        self.recv().await
    }
}

// ============================================================================
// Connection Tests
// ============================================================================

#[tokio::test]
async fn test_server_accepts_connection() {
    let server = TestServer::spawn().await;

    let _client = server.connect().await;

    server.shutdown().await;
}

#[tokio::test]
async fn test_handshake_success() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    client
        .send(ClientMessage::connect(Some("test-client".to_string())))
        .await;

    match client.recv().await {
        DaemonMessage::Connected {
            protocol_version,
            client_id,
        } => {
            assert_eq!(protocol_version, ProtocolVersion::CURRENT);
            assert_eq!(client_id, "test-client");
        }
        other => panic!("Expected Connected, got {other:?}"),
    }

    server.shutdown().await;
}

#[tokio::test]
async fn test_handshake_auto_assigns_client_id() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    client.send(ClientMessage::connect(None)).await;

    match client.recv().await {
        DaemonMessage::Connected { client_id, .. } => {
            assert!(
                client_id.starts_with("client-"),
                "Expected auto-assigned ID starting with 'client-', got: {client_id}"
            );
        }
        other => panic!("Expected Connected, got {other:?}"),
    }

    server.shutdown().await;
}

#[tokio::test]
async fn test_handshake_version_mismatch() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    let response = client
        .handshake_with_version(ProtocolVersion::new(99, 0))
        .await;

    match response {
        DaemonMessage::Rejected { reason, .. } => {
            assert!(
                reason.contains("not compatible"),
                "Expected 'not compatible' in reason, got: {reason}"
            );
        }
        other => panic!("Expected Rejected, got {other:?}"),
    }

    server.shutdown().await;
}

// ============================================================================
// Request Routing Tests
// ============================================================================

#[tokio::test]
async fn test_start_status_stop_over_socket() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    client.handshake(None).await;

    client.send(ClientMessage::start(Some(600))).await;
    match client.recv().await {
        DaemonMessage::Started { report } => {
            assert!(report.session.active);
            assert_eq!(report.session.duration_secs, Some(600));
        }
        other => panic!("Expected Started, got {other:?}"),
    }

    client.send(ClientMessage::get_status()).await;
    match client.recv().await {
        DaemonMessage::Status { report } => {
            assert!(report.session.active);
        }
        other => panic!("Expected Status, got {other:?}"),
    }

    client.send(ClientMessage::stop()).await;
    match client.recv().await {
        DaemonMessage::Stopped { reason } => {
            assert!(reason.is_some());
        }
        other => panic!("Expected Stopped, got {other:?}"),
    }

    server.shutdown().await;
}

#[tokio::test]
async fn test_invalid_duration_returns_error() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    client.handshake(None).await;

    client.send(ClientMessage::start(Some(0))).await;
    match client.recv().await {
        DaemonMessage::Error { code, .. } => {
            assert_eq!(code.as_deref(), Some("invalid_request"));
        }
        other => panic!("Expected Error, got {other:?}"),
    }

    server.shutdown().await;
}

#[tokio::test]
async fn test_unknown_option_returns_error() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    client.handshake(None).await;

    client.send(ClientMessage::set_option("bogus", true)).await;
    match client.recv().await {
        DaemonMessage::Error { code, message } => {
            assert_eq!(code.as_deref(), Some("unknown_option"));
            assert!(message.contains("bogus"));
        }
        other => panic!("Expected Error, got {other:?}"),
    }

    server.shutdown().await;
}

#[tokio::test]
async fn test_lid_sleep_requires_confirmation_over_socket() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    client.handshake(None).await;

    client.send(ClientMessage::set_lid_sleep(true, false)).await;
    match client.recv().await {
        DaemonMessage::LidConfirmationRequired { warning } => {
            assert!(!warning.is_empty());
        }
        other => panic!("Expected LidConfirmationRequired, got {other:?}"),
    }

    client.send(ClientMessage::set_lid_sleep(true, true)).await;
    match client.recv().await {
        DaemonMessage::Status { report } => {
            // No session running: intent is recorded, the flag is not set.
            assert!(report.lid.preference);
            assert!(!report.lid.actual_active);
        }
        other => panic!("Expected Status, got {other:?}"),
    }

    server.shutdown().await;
}

// ============================================================================
// Subscription Tests
// ============================================================================

#[tokio::test]
async fn test_subscribe_gets_initial_status_then_events() {
    let server = TestServer::spawn().await;

    let mut watcher = server.connect().await;
    watcher.handshake(Some("watcher".to_string())).await;
    watcher.send(ClientMessage::subscribe()).await;

    // Initial state first
    match watcher.recv().await {
        DaemonMessage::Status { report } => {
            assert!(!report.session.active);
        }
        other => panic!("Expected Status, got {other:?}"),
    }

    // A second client starts a session; the watcher sees the event.
    let mut starter = server.connect().await;
    starter.handshake(Some("starter".to_string())).await;
    starter.send(ClientMessage::start(Some(600))).await;
    let _ = starter.recv().await;

    match watcher.recv().await {
        DaemonMessage::Event { event } => {
            assert!(matches!(
                event,
                cafctl_protocol::EventKind::SessionStarted { .. }
            ));
        }
        other => panic!("Expected Event, got {other:?}"),
    }

    server.shutdown().await;
}

#[tokio::test]
async fn test_subscribe_before_connect_rejected() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    client.send(ClientMessage::subscribe()).await;

    match client.recv().await {
        DaemonMessage::Error { message, .. } => {
            assert!(
                message.contains("Expected Connect"),
                "Error should mention expected Connect message, got: {message}"
            );
        }
        other => panic!("Expected Error, got {other:?}"),
    }

    server.shutdown().await;
}

// ============================================================================
// Protocol Tests
// ============================================================================

#[tokio::test]
async fn test_ping_pong() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    client.handshake(None).await;

    client.send(ClientMessage::ping(42)).await;

    match client.recv().await {
        DaemonMessage::Pong { seq } => {
            assert_eq!(seq, 42, "Pong seq should match ping seq");
        }
        other => panic!("Expected Pong, got {other:?}"),
    }

    server.shutdown().await;
}

#[tokio::test]
async fn test_duplicate_connect_rejected() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    client.handshake(None).await;

    client.send(ClientMessage::connect(None)).await;

    match client.recv().await {
        DaemonMessage::Error { message, .. } => {
            assert!(
                message.contains("Already connected"),
                "Error should mention 'Already connected', got: {message}"
            );
        }
        other => panic!("Expected Error, got {other:?}"),
    }

    server.shutdown().await;
}

// ============================================================================
// Graceful Shutdown Tests
// ============================================================================

#[tokio::test]
async fn test_graceful_shutdown_removes_socket() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    client.handshake(None).await;

    let socket_path = server.socket_path.clone();

    server.cancel_token.cancel();
    sleep(SHUTDOWN_GRACE_PERIOD).await;

    assert!(
        !socket_path.exists(),
        "Socket file should be removed after shutdown"
    );
}

#[tokio::test]
async fn test_client_disconnect_message() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    client.handshake(None).await;

    client.send(ClientMessage::disconnect()).await;

    // Connection will close (server won't send response to disconnect)
    sleep(SHUTDOWN_GRACE_PERIOD).await;

    server.shutdown().await;
}

// ============================================================================
// Concurrent Clients Tests
// ============================================================================

#[tokio::test]
async fn test_multiple_clients_concurrent() {
    let server = TestServer::spawn().await;

    let mut handles = Vec::new();
    for i in 0..5 {
        let socket_path = server.socket_path.clone();
        let handle = tokio::spawn(async move {
            let stream = UnixStream::connect(&socket_path).await.unwrap();
            let mut client = TestClient::new(stream);

            let id = client.handshake(Some(format!("concurrent-{i}"))).await;
            assert_eq!(id, format!("concurrent-{i}"));

            client.send(ClientMessage::ping(i as u64)).await;
            match client.recv().await {
                DaemonMessage::Pong { seq } => assert_eq!(seq, i as u64),
                other => panic!("Expected Pong, got {other:?}"),
            }
        });
        handles.push(handle);
    }

    for handle in handles {
        handle.await.expect("concurrent client task should succeed");
    }

    server.shutdown().await;
}
