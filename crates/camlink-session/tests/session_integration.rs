//! End-to-end session tests.
//!
//! Two `SessionManager`s talk over an in-process `MemoryRadio`, exercising
//! the full path: listen/accept, connection-mode fallback, the read loop,
//! the write pump, teardown, command dispatch and preview streaming.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use camlink_core::{
    decode_message, encode_message, ConnectionState, DeviceRole, FlashMode, Message, MessageType,
    SessionSnapshot,
};
use camlink_session::application::config::SessionConfig;
use camlink_session::application::manager::FrameDispatch;
use camlink_session::application::remote_commands::{
    CameraControl, ControllerView, RemoteCommandDispatcher,
};
use camlink_session::application::stream_preview::PreviewStreamer;
use camlink_session::application::transport::{
    ConnectMode, ServiceRecord, StaticPermission, Transport,
};
use camlink_session::infrastructure::camera::SimulatedCamera;
use camlink_session::infrastructure::transport::{MemoryRadio, MemoryTransport};
use camlink_session::{PeerHandle, SessionError, SessionManager, TransportError};
use image::DynamicImage;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::time::{timeout, Instant};

const HOST_NAME: &str = "host-phone";
const CONTROLLER_NAME: &str = "controller-phone";
const DEADLINE: Duration = Duration::from_secs(3);

fn test_config() -> SessionConfig {
    SessionConfig {
        accept_timeout: Duration::from_secs(5),
        connect_timeout: Duration::from_millis(500),
        keepalive_interval: None,
        idle_timeout: None,
        preview_start_delay: Duration::from_millis(50),
        preview_tick: Duration::from_millis(20),
        ..SessionConfig::default()
    }
}

struct Devices {
    radio: MemoryRadio,
    host: SessionManager,
    host_radio: Arc<MemoryTransport>,
    controller: SessionManager,
    controller_radio: Arc<MemoryTransport>,
}

fn devices(config: SessionConfig) -> Devices {
    let radio = MemoryRadio::new();
    let host_radio = Arc::new(radio.transport(HOST_NAME));
    let controller_radio = Arc::new(radio.transport(CONTROLLER_NAME));
    controller_radio.pair_with(&host_radio);

    let host = SessionManager::new(
        config.clone(),
        Arc::clone(&host_radio) as Arc<dyn Transport>,
        Arc::new(StaticPermission(true)),
    );
    let controller = SessionManager::new(
        config,
        Arc::clone(&controller_radio) as Arc<dyn Transport>,
        Arc::new(StaticPermission(true)),
    );
    Devices {
        radio,
        host,
        host_radio,
        controller,
        controller_radio,
    }
}

/// Runs the host and controller role sequences until both sides are connected.
async fn connect(devices: &Devices) {
    let host_pending = devices.host.start_as_host().await.expect("host listens");
    let peers = devices.controller.start_as_controller().await.expect("peers listed");
    let controller_pending = devices.controller.connect_to_device(peers[0].clone());

    timeout(DEADLINE, controller_pending)
        .await
        .expect("controller connects in time")
        .expect("controller connects");
    timeout(DEADLINE, host_pending)
        .await
        .expect("host accepts in time")
        .expect("host accepts");
}

fn record(manager: &SessionManager) -> Arc<Mutex<Vec<Message>>> {
    let received: Arc<Mutex<Vec<Message>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    manager.set_message_listener(move |msg: Message| sink.lock().unwrap().push(msg));
    received
}

fn count_of(received: &Mutex<Vec<Message>>, message_type: MessageType) -> usize {
    received
        .lock()
        .unwrap()
        .iter()
        .filter(|m| m.message_type == message_type)
        .count()
}

async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = Instant::now() + DEADLINE;
    while !check() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ── Establishing a session ────────────────────────────────────────────────────

#[tokio::test]
async fn test_host_and_controller_reach_connected() {
    // Arrange
    let devices = devices(test_config());

    // Act
    connect(&devices).await;

    // Assert
    assert_eq!(
        devices.controller.snapshot(),
        SessionSnapshot {
            state: ConnectionState::Connected,
            role: DeviceRole::Controller,
            peer_name: HOST_NAME.to_string(),
        }
    );
    assert_eq!(devices.host.connection_state(), ConnectionState::Connected);
    assert_eq!(devices.host.device_role(), DeviceRole::Host);
    assert_eq!(devices.host.connected_device_name(), CONTROLLER_NAME);
    assert_eq!(devices.controller_radio.discovery_cancel_count(), 1);
}

#[tokio::test]
async fn test_host_accept_timeout_settles_disconnected() {
    // Arrange
    let config = SessionConfig {
        accept_timeout: Duration::from_millis(100),
        ..test_config()
    };
    let devices = devices(config);

    // Act
    let pending = devices.host.start_as_host().await.expect("listening started");
    assert_eq!(devices.host.connection_state(), ConnectionState::Discovering);
    let outcome = timeout(DEADLINE, pending).await.expect("accept gives up");

    // Assert
    assert!(matches!(
        outcome,
        Err(SessionError::Transport(TransportError::AcceptTimeout(_)))
    ));
    assert_eq!(devices.host.snapshot(), SessionSnapshot::default());
}

#[tokio::test]
async fn test_controller_falls_back_through_connect_modes() {
    // Arrange
    let devices = devices(test_config());
    devices.controller_radio.fail_mode(ConnectMode::Insecure);
    devices.controller_radio.fail_mode(ConnectMode::Secure);

    // Act
    connect(&devices).await;

    // Assert
    assert_eq!(devices.controller.connection_state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_controller_reports_every_failed_connect_mode() {
    // Arrange
    let devices = devices(test_config());
    for mode in [ConnectMode::Insecure, ConnectMode::Secure, ConnectMode::Channel(1)] {
        devices.controller_radio.fail_mode(mode);
    }
    let _host_pending = devices.host.start_as_host().await.unwrap();
    let peers = devices.controller.start_as_controller().await.unwrap();

    // Act
    let outcome = timeout(DEADLINE, devices.controller.connect_to_device(peers[0].clone()))
        .await
        .unwrap();

    // Assert
    match outcome {
        Err(SessionError::Transport(TransportError::ConnectFailed { peer, attempts })) => {
            assert_eq!(peer, HOST_NAME);
            assert_eq!(attempts, vec!["insecure", "secure", "channel-1"]);
        }
        other => panic!("expected ConnectFailed, got {other:?}"),
    }
    assert_eq!(devices.controller.snapshot(), SessionSnapshot::default());
    assert_eq!(devices.host.connection_state(), ConnectionState::Discovering);
}

#[tokio::test]
async fn test_radio_off_blocks_both_roles() {
    let devices = devices(test_config());
    devices.host_radio.set_available(false);
    devices.controller_radio.set_available(false);

    assert!(matches!(
        devices.host.start_as_host().await,
        Err(SessionError::Transport(TransportError::TransportUnavailable))
    ));
    assert!(matches!(
        devices.controller.start_as_controller().await,
        Err(SessionError::Transport(TransportError::TransportUnavailable))
    ));
}

#[tokio::test]
async fn test_refused_role_start_ends_running_session() {
    // Arrange
    let devices = devices(test_config());
    connect(&devices).await;

    // Act
    devices.host_radio.set_available(false);
    let host_restart = devices.host.start_as_host().await;
    devices.controller_radio.set_available(false);
    let controller_restart = devices.controller.start_as_controller().await;

    // Assert
    assert!(matches!(
        host_restart,
        Err(SessionError::Transport(TransportError::TransportUnavailable))
    ));
    assert!(matches!(
        controller_restart,
        Err(SessionError::Transport(TransportError::TransportUnavailable))
    ));
    assert_eq!(devices.host.snapshot(), SessionSnapshot::default());
    assert_eq!(devices.controller.snapshot(), SessionSnapshot::default());
}

// ── Messaging ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_controller_command_reaches_host_handler_once() {
    // Arrange
    let devices = devices(test_config());
    let host_inbox = record(&devices.host);
    connect(&devices).await;

    // Act
    devices.controller.send_message(Message::new(MessageType::CapturePhoto));

    // Assert
    eventually("CAPTURE_PHOTO at host", || !host_inbox.lock().unwrap().is_empty()).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let inbox = host_inbox.lock().unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].message_type, MessageType::CapturePhoto);
}

#[tokio::test]
async fn test_messages_arrive_in_send_order() {
    // Arrange
    let devices = devices(test_config());
    let host_inbox = record(&devices.host);
    connect(&devices).await;
    let sent = [
        MessageType::ZoomIn,
        MessageType::ToggleFlash,
        MessageType::SwitchCamera,
        MessageType::ZoomOut,
    ];

    // Act
    for message_type in sent {
        devices.controller.send_message(Message::new(message_type));
    }

    // Assert
    eventually("all commands at host", || host_inbox.lock().unwrap().len() == sent.len()).await;
    let order: Vec<MessageType> = host_inbox.lock().unwrap().iter().map(|m| m.message_type).collect();
    assert_eq!(order, sent);
}

#[tokio::test]
async fn test_ping_is_answered_with_ack() {
    // Arrange
    let devices = devices(test_config());
    let host_inbox = record(&devices.host);
    let controller_inbox = record(&devices.controller);
    connect(&devices).await;

    // Act
    devices.controller.ping();

    // Assert
    eventually("ACK at controller", || count_of(&controller_inbox, MessageType::Ack) == 1).await;
    assert_eq!(count_of(&host_inbox, MessageType::Ping), 1);
}

#[tokio::test]
async fn test_send_without_session_is_noop() {
    let devices = devices(test_config());

    devices.controller.send_message(Message::new(MessageType::ZoomIn));
    devices.controller.ping();

    assert_eq!(devices.controller.snapshot(), SessionSnapshot::default());
}

#[tokio::test]
async fn test_malformed_and_ping_lines_from_raw_peer() {
    // Arrange: a hand-driven controller writing raw lines
    let devices = devices(test_config());
    let host_inbox = record(&devices.host);
    let host_pending = devices.host.start_as_host().await.unwrap();
    let stream = devices
        .controller_radio
        .connect(
            &PeerHandle::new(HOST_NAME, HOST_NAME),
            &ServiceRecord::default(),
            ConnectMode::Insecure,
        )
        .await
        .unwrap();
    timeout(DEADLINE, host_pending).await.unwrap().unwrap();
    let (reader, mut writer) = tokio::io::split(stream);
    let mut lines = BufReader::new(reader).lines();

    // Act
    writer.write_all(b"this is not json\n").await.unwrap();
    writer.write_all(b"{\"type\":\"PING\",\"timestamp\":42}\n").await.unwrap();
    let capture = encode_message(&Message::at(MessageType::CapturePhoto, 7)).unwrap();
    writer.write_all(&capture).await.unwrap();
    let reply = timeout(DEADLINE, lines.next_line()).await.unwrap().unwrap().expect("ack line");

    // Assert
    let ack = decode_message(&reply).unwrap();
    assert_eq!(ack.message_type, MessageType::Ack);
    assert_eq!(ack.action, "42");
    eventually("both valid lines at host", || host_inbox.lock().unwrap().len() == 2).await;
    let order: Vec<MessageType> = host_inbox.lock().unwrap().iter().map(|m| m.message_type).collect();
    assert_eq!(order, vec![MessageType::Ping, MessageType::CapturePhoto]);
    assert_eq!(devices.host.connection_state(), ConnectionState::Connected);
}

// ── Teardown ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_severed_link_disconnects_both_sides() {
    // Arrange
    let devices = devices(test_config());
    let host_inbox = record(&devices.host);
    connect(&devices).await;

    // Act
    devices.radio.sever_links();

    // Assert
    timeout(DEADLINE, devices.host.wait_for_state(ConnectionState::Disconnected))
        .await
        .unwrap()
        .unwrap();
    timeout(DEADLINE, devices.controller.wait_for_state(ConnectionState::Disconnected))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(devices.host.snapshot(), SessionSnapshot::default());

    devices.controller.send_message(Message::new(MessageType::CapturePhoto));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(host_inbox.lock().unwrap().is_empty(), "no delivery after teardown");
}

#[tokio::test]
async fn test_disconnect_resets_local_and_ends_remote_session() {
    // Arrange
    let devices = devices(test_config());
    connect(&devices).await;

    // Act
    devices.host.disconnect();

    // Assert
    assert_eq!(devices.host.snapshot(), SessionSnapshot::default());
    timeout(DEADLINE, devices.controller.wait_for_state(ConnectionState::Disconnected))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(devices.controller.device_role(), DeviceRole::None);
    assert_eq!(devices.controller.connected_device_name(), "");
}

#[tokio::test]
async fn test_host_can_serve_a_second_session() {
    // Arrange
    let devices = devices(test_config());
    connect(&devices).await;
    devices.controller.disconnect();
    timeout(DEADLINE, devices.host.wait_for_state(ConnectionState::Disconnected))
        .await
        .unwrap()
        .unwrap();

    // Act
    connect(&devices).await;

    // Assert
    assert_eq!(devices.host.connection_state(), ConnectionState::Connected);
    assert_eq!(devices.controller.connection_state(), ConnectionState::Connected);
}

// ── Preview frames and remote control ─────────────────────────────────────────

#[tokio::test]
async fn test_frames_inside_min_interval_are_skipped() {
    // Arrange
    let devices = devices(test_config());
    let controller_inbox = record(&devices.controller);
    connect(&devices).await;
    let frame = DynamicImage::new_rgb8(64, 48);

    // Act
    let first = devices.host.send_preview_frame(frame.clone());
    let second = devices.host.send_preview_frame(frame);

    // Assert
    assert_eq!(first, FrameDispatch::Queued);
    assert_eq!(second, FrameDispatch::Skipped);
    eventually("one preview frame", || count_of(&controller_inbox, MessageType::PreviewFrame) == 1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(count_of(&controller_inbox, MessageType::PreviewFrame), 1);
}

#[tokio::test]
async fn test_controller_may_not_stream_frames() {
    let devices = devices(test_config());
    connect(&devices).await;

    let outcome = devices.controller.send_preview_frame(DynamicImage::new_rgb8(8, 8));

    assert_eq!(outcome, FrameDispatch::NotPermitted);
}

#[tokio::test]
async fn test_remote_toggle_flash_updates_controller_view() {
    // Arrange
    let devices = devices(test_config());
    let camera = Arc::new(SimulatedCamera::new());
    let host_dispatcher = RemoteCommandDispatcher::new(Arc::new(ControllerView::new()))
        .with_camera(Arc::clone(&camera) as Arc<dyn CameraControl>);
    Arc::new(host_dispatcher).attach(&devices.host);
    let view = Arc::new(ControllerView::new());
    Arc::new(RemoteCommandDispatcher::new(Arc::clone(&view))).attach(&devices.controller);
    connect(&devices).await;

    // Act
    devices.controller.send_message(Message::new(MessageType::ToggleFlash));

    // Assert
    eventually("camera state at controller", || view.camera_state().is_some()).await;
    assert_eq!(camera.flash_mode(), FlashMode::On);
    assert_eq!(view.camera_state().map(|s| s.flash), Some(FlashMode::On));
}

#[tokio::test]
async fn test_capture_photo_sent_to_controller_is_not_executed() {
    // Arrange: the controller has a camera too, which must stay untouched
    let devices = devices(test_config());
    let controller_camera = Arc::new(SimulatedCamera::new());
    let dispatcher = RemoteCommandDispatcher::new(Arc::new(ControllerView::new()))
        .with_camera(Arc::clone(&controller_camera) as Arc<dyn CameraControl>);
    Arc::new(dispatcher).attach(&devices.controller);
    let host_inbox = record(&devices.host);
    connect(&devices).await;

    // Act
    devices.host.send_message(Message::new(MessageType::CapturePhoto));
    devices.host.ping();

    // Assert: the ACK proves the controller read past the CAPTURE_PHOTO
    eventually("ACK at host", || count_of(&host_inbox, MessageType::Ack) == 1).await;
    assert_eq!(controller_camera.photos_taken(), 0);
}

#[tokio::test]
async fn test_preview_streamer_delivers_frames_and_initial_state() {
    // Arrange
    let devices = devices(test_config());
    let camera = Arc::new(SimulatedCamera::new());
    let streamer = PreviewStreamer::new(devices.host.clone(), Arc::clone(&camera) as Arc<dyn CameraControl>);
    let streaming = tokio::spawn(streamer.run());
    let view = Arc::new(ControllerView::new());
    Arc::new(RemoteCommandDispatcher::new(Arc::clone(&view))).attach(&devices.controller);

    // Act
    connect(&devices).await;

    // Assert
    eventually("two preview frames", || view.frames_received() >= 2).await;
    assert!(view.camera_state().is_some(), "status is published before frames");
    let frame = view.latest_frame().expect("frame kept").expect("frame decodes");
    assert_eq!((frame.width(), frame.height()), (320, 240));

    devices.host.cleanup();
    timeout(DEADLINE, streaming).await.expect("streamer stops").unwrap();
}
