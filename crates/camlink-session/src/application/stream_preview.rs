//! Host-side streaming: live preview frames and camera status broadcasts.
//!
//! [`PreviewStreamer`] follows the session: whenever this device becomes a
//! connected host it publishes the camera status once, waits the start
//! delay, then offers one camera frame per preview tick.  The frame encoder's
//! rate limit decides which ticks actually reach the wire.  Streaming stops
//! as soon as the state leaves `Connected`, and resumes with the next
//! session.

use std::sync::Arc;

use camlink_core::{ConnectionState, DeviceRole};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::application::manager::{FrameDispatch, SessionManager};
use crate::application::remote_commands::{camera_state, CameraControl};
use crate::application::session::{wait_for_state_where, SessionError};

/// Sends the host camera's status as a `CAMERA_STATE` message.
#[derive(Clone)]
pub struct CameraStatePublisher {
    manager: SessionManager,
    camera: Arc<dyn CameraControl>,
}

impl CameraStatePublisher {
    pub fn new(manager: SessionManager, camera: Arc<dyn CameraControl>) -> Self {
        Self { manager, camera }
    }

    /// Builds the status from the camera and queues it for the controller.
    ///
    /// # Errors
    ///
    /// - [`SessionError::InvalidRole`] unless this device is the host.
    /// - [`SessionError::Protocol`] if the status cannot be encoded.
    pub fn publish(&self) -> Result<(), SessionError> {
        let role = self.manager.device_role();
        if role != DeviceRole::Host {
            return Err(SessionError::InvalidRole {
                operation: "publishing camera state",
                expected: DeviceRole::Host,
                actual: role,
            });
        }
        let msg = camera_state(self.camera.as_ref()).to_message()?;
        self.manager.send_message(msg);
        Ok(())
    }
}

/// Streams camera preview frames while this device is a connected host.
pub struct PreviewStreamer {
    manager: SessionManager,
    camera: Arc<dyn CameraControl>,
    publisher: CameraStatePublisher,
}

impl PreviewStreamer {
    pub fn new(manager: SessionManager, camera: Arc<dyn CameraControl>) -> Self {
        let publisher = CameraStatePublisher::new(manager.clone(), Arc::clone(&camera));
        Self {
            manager,
            camera,
            publisher,
        }
    }

    /// Serves every host session until the manager is cleaned up.
    pub async fn run(self) {
        let mut states = self.manager.subscribe_state();
        loop {
            let connected = tokio::select! {
                _ = self.manager.closed() => return,
                connected = wait_for_state_where(&mut states, |s| s == ConnectionState::Connected) => connected,
            };
            if !connected {
                return;
            }

            let epoch = self.manager.session_epoch();
            if self.manager.device_role() == DeviceRole::Host {
                let queued = self.stream_session(epoch).await;
                info!(frames = queued, "preview streaming stopped");
            }

            // A newer session may already be connected; the epoch tells them apart.
            let left = tokio::select! {
                _ = self.manager.closed() => return,
                left = wait_for_state_where(&mut states, |s| self.session_over(s, epoch)) => left,
            };
            if !left {
                return;
            }
        }
    }

    fn session_over(&self, state: ConnectionState, epoch: u64) -> bool {
        state != ConnectionState::Connected || self.manager.session_epoch() != epoch
    }

    /// Streams the session of `epoch`.  Returns the number of frames handed to the encoder.
    async fn stream_session(&self, epoch: u64) -> u64 {
        let config = self.manager.config();
        let mut states = self.manager.subscribe_state();
        let session_ended = |s: ConnectionState| self.session_over(s, epoch);

        if let Err(e) = self.publisher.publish() {
            warn!("initial camera state not sent: {e}");
        }

        tokio::select! {
            _ = tokio::time::sleep(config.preview_start_delay) => {}
            _ = wait_for_state_where(&mut states, session_ended) => return 0,
        }
        info!(tick = ?config.preview_tick, "preview streaming started");

        let mut ticker = tokio::time::interval(config.preview_tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut queued = 0;
        loop {
            tokio::select! {
                _ = self.manager.closed() => break,
                _ = wait_for_state_where(&mut states, session_ended) => break,
                _ = ticker.tick() => {
                    if self.manager.session_epoch() != epoch || !self.manager.snapshot().may_stream_frames() {
                        break;
                    }
                    let Some(frame) = self.camera.capture_preview_frame() else {
                        debug!("camera has no frame yet");
                        continue;
                    };
                    match self.manager.send_preview_frame(frame) {
                        FrameDispatch::Queued => queued += 1,
                        FrameDispatch::Skipped => {}
                        FrameDispatch::NotPermitted => break,
                    }
                }
            }
        }
        queued
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
