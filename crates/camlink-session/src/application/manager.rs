//! [`SessionManager`]: the public entry point of the session layer.
//!
//! One manager exists per process.  It is cheap to clone (an `Arc` inside),
//! so UI code, the preview streamer and message handlers can each hold one.
//!
//! # Typical flows
//!
//! Host:
//! ```text
//! start_as_host().await?  ──► listening (DISCOVERING)
//!     pending.await       ──► peer accepted (CONNECTING → CONNECTED)
//! ```
//!
//! Controller:
//! ```text
//! start_as_controller().await?  ──► paired peers (DISCOVERING)
//! connect_to_device(peer).await ──► CONNECTING → CONNECTED
//! ```
//!
//! All operations that spawn work (`start_as_host`, `connect_to_device`,
//! `send_preview_frame`) must be called from inside a Tokio runtime.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use camlink_core::{ConnectionState, DeviceRole, Message, MessageType, SessionSnapshot};
use image::DynamicImage;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::config::SessionConfig;
use crate::application::frame_encoder::compress_frame;
use crate::application::session::{
    wait_for_state_where, Attempt, MessageHandler, SessionCore, SessionError,
};
use crate::application::transport::{
    accept_within, connect_with_fallback, PeerHandle, PermissionCheck, Transport, TransportError,
};

/// What happened to a frame passed to [`SessionManager::send_preview_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDispatch {
    /// The frame is being encoded and will be queued for sending.
    Queued,
    /// The frame arrived inside the rate-limit window and was dropped.
    Skipped,
    /// Frames are only streamed by a connected host.
    NotPermitted,
}

/// The eventual outcome of a host accept or a controller connect.
///
/// Resolves to `Ok(())` once the session is `Connected`, or to the error that
/// ended the attempt.  Dropping it does not cancel the attempt; call
/// [`SessionManager::disconnect`] for that.
#[derive(Debug)]
#[must_use = "a PendingConnection reports whether the session was established"]
pub struct PendingConnection {
    handle: JoinHandle<Result<(), SessionError>>,
}

impl PendingConnection {
    fn spawn<F>(work: F) -> Self
    where
        F: Future<Output = Result<(), SessionError>> + Send + 'static,
    {
        Self {
            handle: tokio::spawn(work),
        }
    }

    fn failed(error: SessionError) -> Self {
        Self::spawn(async move { Err(error) })
    }

    /// Returns `true` once the attempt has finished, successfully or not.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Future for PendingConnection {
    type Output = Result<(), SessionError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.handle).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(join_error)) => {
                warn!("connection task ended abnormally: {join_error}");
                Poll::Ready(Err(SessionError::Cancelled))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Owns the single session of this process.
#[derive(Clone)]
pub struct SessionManager {
    core: Arc<SessionCore>,
    transport: Arc<dyn Transport>,
    permissions: Arc<dyn PermissionCheck>,
}

impl SessionManager {
    pub fn new(
        config: SessionConfig,
        transport: Arc<dyn Transport>,
        permissions: Arc<dyn PermissionCheck>,
    ) -> Self {
        Self {
            core: Arc::new(SessionCore::new(config)),
            transport,
            permissions,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.core.config
    }

    /// Changes whenever a session ends or a new role sequence starts.
    pub(crate) fn session_epoch(&self) -> u64 {
        self.core.current_epoch()
    }

    #[cfg(test)]
    pub(crate) fn core(&self) -> &Arc<SessionCore> {
        &self.core
    }

    /// Checks permission and availability.  On failure any running session
    /// or attempt is torn down, so every role sequence ends `Disconnected`.
    fn check_access(&self, refused: &str) -> Result<(), TransportError> {
        let denied = if !self.permissions.has_transport_permission() {
            TransportError::PermissionDenied
        } else if !self.transport.is_available() {
            TransportError::TransportUnavailable
        } else {
            return Ok(());
        };
        warn!("{refused}: {denied}");
        self.core.teardown(None, refused);
        Err(denied)
    }

    /// Ends a failed attempt unless it was cancelled, which has already torn
    /// the session down.
    fn fail_attempt(core: &SessionCore, epoch: u64, error: &SessionError) {
        if !matches!(error, SessionError::Cancelled) {
            warn!("session attempt failed: {error}");
            core.teardown(Some(epoch), "attempt failed");
        }
    }

    // ── Role sequences ────────────────────────────────────────────────────────

    /// Becomes the host: starts listening and waits for one controller in
    /// the background.
    ///
    /// Returns once listening has begun.  The returned [`PendingConnection`]
    /// resolves when a controller connects, the accept timeout expires, or
    /// the attempt is cancelled.
    ///
    /// # Errors
    ///
    /// Permission, availability and listen failures are reported here and
    /// leave the session `Disconnected`.
    pub async fn start_as_host(&self) -> Result<PendingConnection, SessionError> {
        self.check_access("host start refused")?;
        let Attempt { epoch, cancel } = self.core.begin_attempt(DeviceRole::Host)?;

        let mut acceptor = match self.transport.listen(&self.core.config.service).await {
            Ok(acceptor) => acceptor,
            Err(e) => {
                let error = SessionError::from(e);
                Self::fail_attempt(&self.core, epoch, &error);
                return Err(error);
            }
        };
        info!(service = %self.core.config.service.name, "listening for a controller");

        let core = Arc::clone(&self.core);
        let timeout = self.core.config.accept_timeout;
        Ok(PendingConnection::spawn(async move {
            let accepted = tokio::select! {
                _ = cancel.cancelled() => Err(SessionError::Cancelled),
                accepted = accept_within(acceptor.as_mut(), timeout) => accepted.map_err(SessionError::from),
            };
            // Closes the listener: a host serves one controller at a time.
            drop(acceptor);

            match accepted {
                Ok(accepted) => core.bind_stream(epoch, accepted.stream, accepted.peer_name),
                Err(error) => {
                    Self::fail_attempt(&core, epoch, &error);
                    Err(error)
                }
            }
        }))
    }

    /// Becomes the controller and returns the paired devices to choose from.
    ///
    /// # Errors
    ///
    /// Permission, availability and discovery failures leave the session
    /// `Disconnected`.
    pub async fn start_as_controller(&self) -> Result<Vec<PeerHandle>, SessionError> {
        self.check_access("controller start refused")?;
        let Attempt { epoch, .. } = self.core.begin_attempt(DeviceRole::Controller)?;

        match self.transport.paired_peers().await {
            Ok(peers) => {
                info!(count = peers.len(), "found paired devices");
                Ok(peers)
            }
            Err(e) => {
                let error = SessionError::from(e);
                Self::fail_attempt(&self.core, epoch, &error);
                Err(error)
            }
        }
    }

    /// Connects to `peer` as the controller.
    ///
    /// The state moves to `Connecting` before this returns.  An existing
    /// session or pending attempt is torn down first.  The connection modes
    /// from the config are tried in order.
    pub fn connect_to_device(&self, peer: PeerHandle) -> PendingConnection {
        if let Err(e) = self.check_access("connect refused") {
            return PendingConnection::failed(e.into());
        }
        let Attempt { epoch, cancel } = match self.core.begin_connect(&peer.name) {
            Ok(attempt) => attempt,
            Err(e) => return PendingConnection::failed(e),
        };
        info!(peer = %peer, "connecting");

        let core = Arc::clone(&self.core);
        let transport = Arc::clone(&self.transport);
        PendingConnection::spawn(async move {
            let config = &core.config;
            let connected = tokio::select! {
                _ = cancel.cancelled() => Err(SessionError::Cancelled),
                connected = connect_with_fallback(
                    transport.as_ref(),
                    &peer,
                    &config.service,
                    &config.connect_modes,
                    config.connect_timeout,
                ) => connected.map_err(SessionError::from),
            };

            match connected {
                Ok((stream, _mode)) => core.bind_stream(epoch, stream, None),
                Err(error) => {
                    Self::fail_attempt(&core, epoch, &error);
                    Err(error)
                }
            }
        })
    }

    // ── Sending ───────────────────────────────────────────────────────────────

    /// Queues `msg` for the peer.
    ///
    /// Does nothing unless `Connected`.  Never blocks: a full outbound queue
    /// drops the message with a warning, and write failures surface as a
    /// disconnect.
    pub fn send_message(&self, msg: Message) {
        self.core.send(&msg, None);
    }

    /// Sends a keepalive `PING`.  The peer answers with an `ACK`.
    pub fn ping(&self) {
        self.send_message(Message::new(MessageType::Ping));
    }

    /// Offers a camera frame for streaming to the controller.
    ///
    /// Only a connected host streams.  At most one frame per
    /// `min_frame_interval` is encoded; the rest are dropped.  Encoding runs
    /// on the blocking pool and the frame is sent when it finishes, unless the
    /// session has ended by then.
    pub fn send_preview_frame(&self, frame: DynamicImage) -> FrameDispatch {
        if !self.core.snapshot().may_stream_frames() {
            debug!("preview frame dropped: not a connected host");
            return FrameDispatch::NotPermitted;
        }
        if !self.core.admit_frame() {
            return FrameDispatch::Skipped;
        }

        let epoch = self.core.current_epoch();
        let quality = self.core.config.jpeg_quality;
        let core = Arc::clone(&self.core);
        tokio::spawn(async move {
            match tokio::task::spawn_blocking(move || compress_frame(&frame, quality)).await {
                Ok(Ok(payload)) => {
                    let msg = Message::new(MessageType::PreviewFrame).with_value(payload);
                    core.send(&msg, Some(epoch));
                }
                Ok(Err(e)) => warn!("failed to encode preview frame: {e}"),
                Err(e) => warn!("preview encoder task failed: {e}"),
            }
        });
        FrameDispatch::Queued
    }

    // ── Teardown ──────────────────────────────────────────────────────────────

    /// Closes the stream or listener and resets state, role and peer name.
    /// Idempotent.
    pub fn disconnect(&self) {
        self.core.teardown(None, "disconnect requested");
    }

    /// Disconnects, drops the message listener, and cancels every background
    /// task of this manager.  Idempotent; later role sequences fail with
    /// [`SessionError::Cancelled`].
    pub fn cleanup(&self) {
        self.disconnect();
        self.core.set_handler(None);
        self.core.shut_down();
    }

    /// Resolves once [`cleanup`](Self::cleanup) has been called.
    pub async fn closed(&self) {
        self.core.shutdown_token().cancelled().await;
    }

    // ── Listener ──────────────────────────────────────────────────────────────

    /// Registers the callback for inbound messages, replacing any previous one.
    ///
    /// It runs on the read-loop task, once per decoded line, in wire order.
    /// `PING` and `ACK` are delivered too.
    pub fn set_message_listener<F>(&self, listener: F)
    where
        F: Fn(Message) + Send + Sync + 'static,
    {
        let handler: MessageHandler = Arc::new(listener);
        self.core.set_handler(Some(handler));
    }

    // ── Observables ───────────────────────────────────────────────────────────

    pub fn connection_state(&self) -> ConnectionState {
        self.core.state()
    }

    pub fn device_role(&self) -> DeviceRole {
        self.core.role()
    }

    /// Name of the connected (or connecting) peer, empty when unknown.
    pub fn connected_device_name(&self) -> String {
        self.core.peer_name()
    }

    /// All three observable values, read together.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.core.snapshot()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.core.subscribe_state()
    }

    pub fn subscribe_role(&self) -> watch::Receiver<DeviceRole> {
        self.core.subscribe_role()
    }

    pub fn subscribe_peer_name(&self) -> watch::Receiver<String> {
        self.core.subscribe_peer_name()
    }

    /// Waits until the connection state equals `target`.
    ///
    /// # Errors
    ///
    /// [`SessionError::Cancelled`] if the manager is cleaned up first.
    pub async fn wait_for_state(&self, target: ConnectionState) -> Result<(), SessionError> {
        let mut states = self.subscribe_state();
        let reached = tokio::select! {
            _ = self.closed() => false,
            reached = wait_for_state_where(&mut states, |s| s == target) => reached,
        };
        if reached {
            Ok(())
        } else {
            Err(SessionError::Cancelled)
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
