//! Role-aware handling of inbound messages.
//!
//! The session delivers every decoded message to one listener.  This module
//! provides that listener and decides, per role, what each message means:
//!
//! | role       | acts on                                                   |
//! |------------|-----------------------------------------------------------|
//! | HOST       | camera commands (capture, flash, flip, zoom, mode, hint)  |
//! | CONTROLLER | preview frames, camera status, suggestion updates         |
//! | NONE       | nothing                                                   |
//!
//! A command that changes the camera is answered with a `CAMERA_STATE`
//! broadcast so the controller's status display stays current.  A command
//! that reaches the wrong role (e.g. `CAPTURE_PHOTO` on a controller) is
//! never executed.

use std::sync::{Arc, Mutex, PoisonError};

use camlink_core::protocol::messages::MessageDirection;
use camlink_core::{CameraMode, CameraState, DeviceRole, FlashMode, Message, MessageType};
use image::DynamicImage;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::application::frame_encoder::{decompress_frame, FrameError};
use crate::application::manager::SessionManager;

/// Errors reported by a camera implementation.
#[derive(Debug, Error)]
pub enum CameraError {
    #[error("camera is not available")]
    Unavailable,

    #[error("camera operation failed: {0}")]
    Failed(String),
}

/// The camera operations a host exposes to remote control.
#[cfg_attr(test, mockall::automock)]
pub trait CameraControl: Send + Sync {
    fn current_zoom(&self) -> f32;
    fn flash_mode(&self) -> FlashMode;
    fn current_mode(&self) -> CameraMode;

    /// Grabs the latest viewfinder frame, `None` if the camera has none yet.
    fn capture_preview_frame(&self) -> Option<DynamicImage>;

    fn capture_photo(&self) -> Result<(), CameraError>;
    fn toggle_flash(&self) -> Result<FlashMode, CameraError>;
    fn flip_camera(&self) -> Result<(), CameraError>;
    fn zoom_in(&self) -> Result<f32, CameraError>;
    fn zoom_out(&self) -> Result<f32, CameraError>;
    fn set_zoom(&self, zoom: f32) -> Result<f32, CameraError>;
    fn set_mode(&self, mode: CameraMode) -> Result<(), CameraError>;
    fn apply_suggestion(&self, title: &str) -> Result<(), CameraError>;
}

/// Reads the current status of `camera`.
pub fn camera_state(camera: &dyn CameraControl) -> CameraState {
    CameraState {
        zoom: camera.current_zoom(),
        flash: camera.flash_mode(),
        mode: camera.current_mode(),
    }
}

/// What the dispatcher did with one message.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    /// A host command ran and left the camera status unchanged.
    Executed,
    /// A host command ran and changed the camera; this state should be broadcast.
    StateChanged(CameraState),
    /// The controller's view was updated.
    ViewUpdated,
    /// The message is not for this role, or is link-level traffic.
    Ignored,
    /// The message was for this role but could not be carried out.
    Rejected(String),
}

#[derive(Debug, Default)]
struct ViewState {
    frame_payload: Option<String>,
    frames_received: u64,
    camera_state: Option<CameraState>,
    suggestion: Option<String>,
}

/// The controller's copy of what the host is showing.
///
/// Preview frames are kept as received and decoded on demand, so the read
/// loop never waits on JPEG decoding.
#[derive(Debug, Default)]
pub struct ControllerView {
    inner: Mutex<ViewState>,
}

impl ControllerView {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ViewState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decodes the most recent preview frame.
    pub fn latest_frame(&self) -> Option<Result<DynamicImage, FrameError>> {
        let payload = self.state().frame_payload.clone()?;
        Some(decompress_frame(&payload))
    }

    pub fn frames_received(&self) -> u64 {
        self.state().frames_received
    }

    pub fn camera_state(&self) -> Option<CameraState> {
        self.state().camera_state
    }

    pub fn suggestion(&self) -> Option<String> {
        self.state().suggestion.clone()
    }

    /// Forgets everything, e.g. after a disconnect.
    pub fn clear(&self) {
        *self.state() = ViewState::default();
    }
}

/// Routes inbound messages to the camera (host) or the view (controller).
pub struct RemoteCommandDispatcher {
    camera: Option<Arc<dyn CameraControl>>,
    view: Arc<ControllerView>,
}

impl RemoteCommandDispatcher {
    pub fn new(view: Arc<ControllerView>) -> Self {
        Self { camera: None, view }
    }

    /// Attaches the camera that host-bound commands drive.
    pub fn with_camera(mut self, camera: Arc<dyn CameraControl>) -> Self {
        self.camera = Some(camera);
        self
    }

    pub fn view(&self) -> &Arc<ControllerView> {
        &self.view
    }

    /// Handles one message for a device currently in `role`.
    pub fn dispatch(&self, role: DeviceRole, msg: &Message) -> CommandOutcome {
        match role {
            DeviceRole::None => {
                debug!(message_type = %msg.message_type, "no role selected; ignoring message");
                CommandOutcome::Ignored
            }
            DeviceRole::Host => self.execute_on_host(msg),
            DeviceRole::Controller => self.apply_on_controller(msg),
        }
    }

    fn execute_on_host(&self, msg: &Message) -> CommandOutcome {
        let camera = match (&self.camera, msg.message_type.direction()) {
            (Some(camera), _) => camera,
            (None, MessageDirection::ToHost) => {
                warn!(message_type = %msg.message_type, "no camera attached; cannot execute command");
                return CommandOutcome::Rejected("no camera attached".to_string());
            }
            (None, _) => return CommandOutcome::Ignored,
        };

        // `Ok(true)` means the command changed the camera status.
        let result = match msg.message_type {
            MessageType::CapturePhoto => camera.capture_photo().map(|()| false),
            MessageType::SwitchCamera => camera.flip_camera().map(|()| true),
            MessageType::ToggleFlash => camera.toggle_flash().map(|_| true),
            MessageType::ZoomIn => camera.zoom_in().map(|_| true),
            MessageType::ZoomOut => camera.zoom_out().map(|_| true),
            MessageType::SetZoom => match msg.value.trim().parse::<f32>() {
                Ok(zoom) if zoom.is_finite() && zoom > 0.0 => camera.set_zoom(zoom).map(|_| true),
                _ => {
                    warn!(value = %msg.value, "SET_ZOOM with invalid zoom factor");
                    return CommandOutcome::Rejected(format!("invalid zoom factor: {:?}", msg.value));
                }
            },
            MessageType::ChangeMode => match msg.value.parse::<CameraMode>() {
                Ok(mode) => camera.set_mode(mode).map(|()| true),
                Err(e) => {
                    warn!("CHANGE_MODE rejected: {e}");
                    return CommandOutcome::Rejected(e.to_string());
                }
            },
            MessageType::ApplySuggestion => {
                if msg.action.trim().is_empty() {
                    return CommandOutcome::Rejected("suggestion title is empty".to_string());
                }
                info!(suggestion = %msg.action, "applying remote suggestion");
                camera.apply_suggestion(&msg.action).map(|()| false)
            }
            MessageType::PreviewFrame | MessageType::CameraState | MessageType::SuggestionUpdate => {
                debug!(message_type = %msg.message_type, "host ignores controller-bound message");
                return CommandOutcome::Ignored;
            }
            MessageType::Ping | MessageType::Ack => return CommandOutcome::Ignored,
        };

        match result {
            Ok(true) => CommandOutcome::StateChanged(camera_state(camera.as_ref())),
            Ok(false) => CommandOutcome::Executed,
            Err(e) => {
                warn!(message_type = %msg.message_type, "camera command failed: {e}");
                CommandOutcome::Rejected(e.to_string())
            }
        }
    }

    fn apply_on_controller(&self, msg: &Message) -> CommandOutcome {
        match msg.message_type {
            MessageType::PreviewFrame => {
                if msg.value.is_empty() {
                    return CommandOutcome::Rejected("empty preview frame".to_string());
                }
                let mut view = self.view.state();
                view.frame_payload = Some(msg.value.clone());
                view.frames_received += 1;
                CommandOutcome::ViewUpdated
            }
            MessageType::CameraState => match CameraState::from_wire(&msg.value) {
                Ok(state) => {
                    info!(zoom = state.zoom, flash = ?state.flash, mode = %state.mode, "camera state updated");
                    self.view.state().camera_state = Some(state);
                    CommandOutcome::ViewUpdated
                }
                Err(e) => {
                    warn!("dropping CAMERA_STATE with unreadable payload: {e}");
                    CommandOutcome::Rejected(e.to_string())
                }
            },
            MessageType::SuggestionUpdate => {
                debug!("suggestions updated");
                self.view.state().suggestion = Some(msg.value.clone());
                CommandOutcome::ViewUpdated
            }
            MessageType::CapturePhoto
            | MessageType::SwitchCamera
            | MessageType::ToggleFlash
            | MessageType::ZoomIn
            | MessageType::ZoomOut
            | MessageType::SetZoom
            | MessageType::ChangeMode
            | MessageType::ApplySuggestion => {
                warn!(message_type = %msg.message_type, "controller ignores host-bound command");
                CommandOutcome::Ignored
            }
            MessageType::Ping | MessageType::Ack => CommandOutcome::Ignored,
        }
    }

    /// Installs this dispatcher as `manager`'s message listener.
    ///
    /// State-changing host commands are answered with a `CAMERA_STATE`
    /// message on the same session.
    pub fn attach(self: Arc<Self>, manager: &SessionManager) {
        let session = manager.clone();
        manager.set_message_listener(move |msg| {
            if let CommandOutcome::StateChanged(state) = self.dispatch(session.device_role(), &msg) {
                match state.to_message() {
                    Ok(update) => session.send_message(update),
                    Err(e) => warn!("could not build CAMERA_STATE: {e}"),
                }
            }
        });
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::frame_encoder::compress_frame;

    fn camera_reporting(zoom: f32, flash: FlashMode, mode: CameraMode) -> MockCameraControl {
        let mut camera = MockCameraControl::new();
        camera.expect_current_zoom().return_const(zoom);
        camera.expect_flash_mode().return_const(flash);
        camera.expect_current_mode().return_const(mode);
        camera
    }

    fn host_dispatcher(camera: MockCameraControl) -> RemoteCommandDispatcher {
        RemoteCommandDispatcher::new(Arc::new(ControllerView::new())).with_camera(Arc::new(camera))
    }

    #[test]
    fn test_host_toggle_flash_reports_new_state() {
        // Arrange
        let mut camera = camera_reporting(1.0, FlashMode::On, CameraMode::Photo);
        camera.expect_toggle_flash().times(1).returning(|| Ok(FlashMode::On));
        let dispatcher = host_dispatcher(camera);

        // Act
        let outcome = dispatcher.dispatch(DeviceRole::Host, &Message::new(MessageType::ToggleFlash));

        // Assert
        assert_eq!(
            outcome,
            CommandOutcome::StateChanged(CameraState {
                zoom: 1.0,
                flash: FlashMode::On,
                mode: CameraMode::Photo,
            })
        );
    }

    #[test]
    fn test_host_capture_photo_executes_without_state_broadcast() {
        let mut camera = MockCameraControl::new();
        camera.expect_capture_photo().times(1).returning(|| Ok(()));
        let dispatcher = host_dispatcher(camera);

        let outcome = dispatcher.dispatch(DeviceRole::Host, &Message::new(MessageType::CapturePhoto));

        assert_eq!(outcome, CommandOutcome::Executed);
    }

    #[test]
    fn test_host_set_zoom_parses_value() {
        let mut camera = camera_reporting(2.5, FlashMode::Off, CameraMode::Photo);
        camera
            .expect_set_zoom()
            .withf(|z| (*z - 2.5).abs() < f32::EPSILON)
            .times(1)
            .returning(Ok);
        let dispatcher = host_dispatcher(camera);

        let outcome = dispatcher.dispatch(
            DeviceRole::Host,
            &Message::new(MessageType::SetZoom).with_value("2.5"),
        );

        assert!(matches!(outcome, CommandOutcome::StateChanged(s) if s.zoom == 2.5));
    }

    #[test]
    fn test_host_set_zoom_rejects_garbage() {
        let mut camera = MockCameraControl::new();
        camera.expect_set_zoom().never();
        let dispatcher = host_dispatcher(camera);

        let outcome = dispatcher.dispatch(
            DeviceRole::Host,
            &Message::new(MessageType::SetZoom).with_value("wide"),
        );

        assert!(matches!(outcome, CommandOutcome::Rejected(_)));
    }

    #[test]
    fn test_host_change_mode_uses_mode_name() {
        let mut camera = camera_reporting(1.0, FlashMode::Off, CameraMode::Night);
        camera
            .expect_set_mode()
            .withf(|m| *m == CameraMode::Night)
            .times(1)
            .returning(|_| Ok(()));
        let dispatcher = host_dispatcher(camera);

        let outcome = dispatcher.dispatch(
            DeviceRole::Host,
            &Message::new(MessageType::ChangeMode).with_value("night"),
        );

        assert!(matches!(outcome, CommandOutcome::StateChanged(s) if s.mode == CameraMode::Night));
    }

    #[test]
    fn test_host_apply_suggestion_passes_title() {
        let mut camera = MockCameraControl::new();
        camera
            .expect_apply_suggestion()
            .withf(|title| title.to_string() == "Rule of thirds")
            .times(1)
            .returning(|_| Ok(()));
        let dispatcher = host_dispatcher(camera);

        let outcome = dispatcher.dispatch(
            DeviceRole::Host,
            &Message::new(MessageType::ApplySuggestion).with_action("Rule of thirds"),
        );

        assert_eq!(outcome, CommandOutcome::Executed);
    }

    #[test]
    fn test_host_camera_failure_is_rejected() {
        let mut camera = MockCameraControl::new();
        camera.expect_flip_camera().returning(|| Err(CameraError::Unavailable));
        let dispatcher = host_dispatcher(camera);

        let outcome = dispatcher.dispatch(DeviceRole::Host, &Message::new(MessageType::SwitchCamera));

        assert_eq!(outcome, CommandOutcome::Rejected("camera is not available".to_string()));
    }

    #[test]
    fn test_controller_never_executes_capture() {
        // Arrange
        let mut camera = MockCameraControl::new();
        camera.expect_capture_photo().never();
        let dispatcher = host_dispatcher(camera);

        // Act
        let outcome = dispatcher.dispatch(DeviceRole::Controller, &Message::new(MessageType::CapturePhoto));

        // Assert
        assert_eq!(outcome, CommandOutcome::Ignored);
    }

    #[test]
    fn test_no_role_ignores_everything() {
        let mut camera = MockCameraControl::new();
        camera.expect_capture_photo().never();
        camera.expect_toggle_flash().never();
        let dispatcher = host_dispatcher(camera);

        for t in MessageType::ALL {
            assert_eq!(dispatcher.dispatch(DeviceRole::None, &Message::new(t)), CommandOutcome::Ignored);
        }
    }

    #[test]
    fn test_controller_stores_camera_state() {
        let dispatcher = RemoteCommandDispatcher::new(Arc::new(ControllerView::new()));
        let state = CameraState {
            zoom: 3.0,
            flash: FlashMode::Auto,
            mode: CameraMode::Food,
        };

        let outcome = dispatcher.dispatch(DeviceRole::Controller, &state.to_message().unwrap());

        assert_eq!(outcome, CommandOutcome::ViewUpdated);
        assert_eq!(dispatcher.view().camera_state(), Some(state));
    }

    #[test]
    fn test_controller_rejects_unreadable_camera_state() {
        let dispatcher = RemoteCommandDispatcher::new(Arc::new(ControllerView::new()));
        let msg = Message::new(MessageType::CameraState).with_value("{\"zoom\":");

        let outcome = dispatcher.dispatch(DeviceRole::Controller, &msg);

        assert!(matches!(outcome, CommandOutcome::Rejected(_)));
        assert_eq!(dispatcher.view().camera_state(), None);
    }

    #[test]
    fn test_controller_keeps_latest_preview_frame() {
        // Arrange
        let dispatcher = RemoteCommandDispatcher::new(Arc::new(ControllerView::new()));
        let payload = compress_frame(&DynamicImage::new_rgb8(32, 16), 40).unwrap();

        // Act
        dispatcher.dispatch(
            DeviceRole::Controller,
            &Message::new(MessageType::PreviewFrame).with_value(payload.clone()),
        );
        dispatcher.dispatch(
            DeviceRole::Controller,
            &Message::new(MessageType::PreviewFrame).with_value(payload),
        );

        // Assert
        let view = dispatcher.view();
        assert_eq!(view.frames_received(), 2);
        let frame = view.latest_frame().unwrap().unwrap();
        assert_eq!((frame.width(), frame.height()), (16, 8));
    }

    #[test]
    fn test_controller_view_clear_forgets_everything() {
        let view = Arc::new(ControllerView::new());
        let dispatcher = RemoteCommandDispatcher::new(Arc::clone(&view));
        dispatcher.dispatch(
            DeviceRole::Controller,
            &Message::new(MessageType::SuggestionUpdate).with_value("Move closer"),
        );
        assert_eq!(view.suggestion().as_deref(), Some("Move closer"));

        view.clear();

        assert_eq!(view.suggestion(), None);
        assert!(view.latest_frame().is_none());
    }
}
