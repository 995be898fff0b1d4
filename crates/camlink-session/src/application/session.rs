//! Session core: observable state, stream binding, and the per-stream tasks.
//!
//! # Shape of a live session
//!
//! ```text
//!                    ┌──────────── SessionCore ────────────┐
//!  send_message() ──►│ outbound queue (bounded mpsc) ──────┼──► write pump ──► stream
//!                    │                                     │
//!  handler(msg)  ◄───┼── read loop ◄───────────────────────┼──── stream
//!                    │      └─ PING? enqueue ACK           │
//!                    │                                     │
//!                    │ ping pump ──► outbound queue        │
//!                    └─────────────────────────────────────┘
//! ```
//!
//! Every bound stream belongs to an *epoch*.  Starting a new role sequence or
//! tearing the session down bumps the epoch and cancels the epoch's
//! [`CancellationToken`], so tasks from an older stream can neither deliver
//! messages nor change the observable state of a newer one.
//!
//! The three observable values (connection state, device role, peer name)
//! are `tokio::sync::watch` channels.  They are only ever written while the
//! link mutex is held, which keeps the `Connected ⇒ role ≠ None` invariant
//! true for every observer: the role is set before the state leaves
//! `Disconnected`, and the state returns to `Disconnected` before the role is
//! cleared.

use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use camlink_core::{
    decode_message, encode_message, ConnectionState, DeviceRole, Message, MessageType,
    ProtocolError, SessionSnapshot,
};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::config::SessionConfig;
use crate::application::frame_encoder::FrameThrottle;
use crate::application::transport::{BoxedStream, TransportError};

/// Callback invoked for every decoded inbound message, in wire order, on the
/// read-loop task.  Handlers must return quickly.
pub type MessageHandler = Arc<dyn Fn(Message) + Send + Sync>;

/// Errors reported by session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The transport failed to listen, discover, accept or connect.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A message could not be built or encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The operation is only valid in another role.
    #[error("{operation} requires role {expected}, current role is {actual}")]
    InvalidRole {
        operation: &'static str,
        expected: DeviceRole,
        actual: DeviceRole,
    },

    /// The attempt was superseded by `disconnect`, a newer role sequence, or shutdown.
    #[error("session attempt was cancelled")]
    Cancelled,
}

/// Identity of one connection attempt.
#[derive(Debug, Clone)]
pub(crate) struct Attempt {
    pub epoch: u64,
    pub cancel: CancellationToken,
}

#[derive(Debug, Default)]
struct Link {
    epoch: u64,
    cancel: Option<CancellationToken>,
    outbound: Option<mpsc::Sender<Vec<u8>>>,
}

/// Shared state behind a [`SessionManager`](crate::SessionManager).
pub(crate) struct SessionCore {
    pub(crate) config: SessionConfig,
    shutdown: CancellationToken,
    state_tx: watch::Sender<ConnectionState>,
    role_tx: watch::Sender<DeviceRole>,
    peer_tx: watch::Sender<String>,
    link: Mutex<Link>,
    handler: RwLock<Option<MessageHandler>>,
    throttle: Mutex<FrameThrottle>,
}

impl SessionCore {
    pub(crate) fn new(config: SessionConfig) -> Self {
        let throttle = FrameThrottle::new(config.min_frame_interval);
        Self {
            config,
            shutdown: CancellationToken::new(),
            state_tx: watch::Sender::new(ConnectionState::Disconnected),
            role_tx: watch::Sender::new(DeviceRole::None),
            peer_tx: watch::Sender::new(String::new()),
            link: Mutex::new(Link::default()),
            handler: RwLock::new(None),
            throttle: Mutex::new(throttle),
        }
    }

    fn link(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Observables ───────────────────────────────────────────────────────────

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub(crate) fn role(&self) -> DeviceRole {
        *self.role_tx.borrow()
    }

    pub(crate) fn peer_name(&self) -> String {
        self.peer_tx.borrow().clone()
    }

    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        let _link = self.link();
        SessionSnapshot {
            state: self.state(),
            role: self.role(),
            peer_name: self.peer_name(),
        }
    }

    pub(crate) fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub(crate) fn subscribe_role(&self) -> watch::Receiver<DeviceRole> {
        self.role_tx.subscribe()
    }

    pub(crate) fn subscribe_peer_name(&self) -> watch::Receiver<String> {
        self.peer_tx.subscribe()
    }

    pub(crate) fn current_epoch(&self) -> u64 {
        self.link().epoch
    }

    // ── Handler ───────────────────────────────────────────────────────────────

    pub(crate) fn set_handler(&self, handler: Option<MessageHandler>) {
        *self.handler.write().unwrap_or_else(PoisonError::into_inner) = handler;
    }

    fn deliver(&self, msg: Message) {
        let handler = self.handler.read().unwrap_or_else(PoisonError::into_inner).clone();
        match handler {
            Some(handler) => handler(msg),
            None => debug!(message_type = %msg.message_type, "no message listener; dropping inbound message"),
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    pub(crate) fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    pub(crate) fn shut_down(&self) {
        self.shutdown.cancel();
    }

    /// Starts a new role sequence: tears down whatever was running, selects
    /// `role`, and moves to `Discovering`.
    pub(crate) fn begin_attempt(&self, role: DeviceRole) -> Result<Attempt, SessionError> {
        if self.shutdown.is_cancelled() {
            return Err(SessionError::Cancelled);
        }
        let mut link = self.link();
        if self.state().is_active() || link.cancel.is_some() {
            self.teardown_locked(&mut link, "starting a new role sequence");
        }
        let cancel = self.open_attempt_locked(&mut link, role);
        Ok(Attempt {
            epoch: link.epoch,
            cancel,
        })
    }

    /// Moves a controller to `Connecting` towards `peer_name`.
    ///
    /// A controller still in `Discovering` keeps its attempt.  From any other
    /// state a fresh controller sequence is opened first; a live or pending
    /// connection is torn down.
    pub(crate) fn begin_connect(&self, peer_name: &str) -> Result<Attempt, SessionError> {
        if self.shutdown.is_cancelled() {
            return Err(SessionError::Cancelled);
        }
        let mut link = self.link();
        let reusable = self.state() == ConnectionState::Discovering && self.role() == DeviceRole::Controller;
        let cancel = match link.cancel.clone() {
            Some(cancel) if reusable => cancel,
            _ => {
                if self.state().is_active() || link.cancel.is_some() {
                    self.teardown_locked(&mut link, "connecting to another device");
                }
                self.open_attempt_locked(&mut link, DeviceRole::Controller)
            }
        };
        self.peer_tx.send_replace(peer_name.to_string());
        self.set_state_locked(ConnectionState::Connecting);
        Ok(Attempt {
            epoch: link.epoch,
            cancel,
        })
    }

    fn open_attempt_locked(&self, link: &mut Link, role: DeviceRole) -> CancellationToken {
        link.epoch += 1;
        let cancel = self.shutdown.child_token();
        link.cancel = Some(cancel.clone());
        self.role_tx.send_replace(role);
        self.peer_tx.send_replace(String::new());
        self.set_state_locked(ConnectionState::Discovering);
        info!(%role, epoch = link.epoch, "role selected");
        cancel
    }

    /// Binds an established stream to the attempt `epoch` and starts the
    /// read loop, write pump and (optionally) ping pump.
    ///
    /// # Errors
    ///
    /// [`SessionError::Cancelled`] when the attempt has been superseded; the
    /// stream is dropped, which closes it.
    pub(crate) fn bind_stream(
        self: &Arc<Self>,
        epoch: u64,
        stream: BoxedStream,
        peer_name: Option<String>,
    ) -> Result<(), SessionError> {
        let mut link = self.link();
        let cancel = match &link.cancel {
            Some(cancel) if link.epoch == epoch && !cancel.is_cancelled() => cancel.clone(),
            _ => {
                debug!(epoch, "discarding stream from a superseded attempt");
                return Err(SessionError::Cancelled);
            }
        };

        if self.state() == ConnectionState::Discovering {
            self.set_state_locked(ConnectionState::Connecting);
        }
        if let Some(name) = peer_name.filter(|n| !n.is_empty()) {
            self.peer_tx.send_replace(name);
        }
        if !self.set_state_locked(ConnectionState::Connected) {
            self.teardown_locked(&mut link, "stream arrived in an unexpected state");
            return Err(SessionError::Cancelled);
        }

        let (reader, writer) = tokio::io::split(stream);
        let (tx, rx) = mpsc::channel(self.config.outbound_queue_depth.max(1));
        link.outbound = Some(tx.clone());

        tokio::spawn(write_pump(Arc::clone(self), epoch, cancel.clone(), writer, rx));
        if let Some(interval) = self.config.keepalive_interval {
            tokio::spawn(ping_pump(cancel.clone(), tx.clone(), interval));
        }
        tokio::spawn(read_loop(Arc::clone(self), epoch, cancel, reader, tx));

        info!(
            role = %self.role(),
            peer = %self.peer_name(),
            epoch,
            "session connected"
        );
        Ok(())
    }

    /// Tears the session down.
    ///
    /// With `Some(epoch)` nothing happens unless `epoch` is still current, so
    /// a stale task cannot end a newer session.  Returns `true` if a teardown
    /// took place.
    pub(crate) fn teardown(&self, epoch: Option<u64>, reason: &str) -> bool {
        let mut link = self.link();
        if let Some(epoch) = epoch {
            if epoch != link.epoch {
                debug!(epoch, current = link.epoch, reason, "ignoring teardown from stale epoch");
                return false;
            }
        }
        self.teardown_locked(&mut link, reason);
        true
    }

    fn teardown_locked(&self, link: &mut Link, reason: &str) {
        let was_active = self.state().is_active() || link.cancel.is_some();
        if let Some(cancel) = link.cancel.take() {
            cancel.cancel();
        }
        link.outbound = None;
        link.epoch += 1;

        self.set_state_locked(ConnectionState::Disconnected);
        self.role_tx.send_replace(DeviceRole::None);
        self.peer_tx.send_replace(String::new());
        self.throttle.lock().unwrap_or_else(PoisonError::into_inner).reset();

        if was_active {
            info!(reason, "session torn down");
        }
    }

    fn set_state_locked(&self, next: ConnectionState) -> bool {
        let current = self.state();
        if current == next {
            return true;
        }
        if !current.can_transition_to(next) {
            warn!(from = %current, to = %next, "ignoring illegal state transition");
            return false;
        }
        self.state_tx.send_replace(next);
        info!(from = %current, to = %next, "connection state changed");
        true
    }

    // ── Outbound ──────────────────────────────────────────────────────────────

    /// Queues `msg` on the current stream.  A no-op unless `Connected`; with
    /// `Some(epoch)` also a no-op once that epoch has ended.
    pub(crate) fn send(&self, msg: &Message, epoch: Option<u64>) -> bool {
        let outbound = {
            let link = self.link();
            if self.state() != ConnectionState::Connected {
                debug!(message_type = %msg.message_type, "not connected; dropping outbound message");
                return false;
            }
            if epoch.is_some_and(|e| e != link.epoch) {
                debug!(message_type = %msg.message_type, "session ended; dropping outbound message");
                return false;
            }
            link.outbound.clone()
        };
        match outbound {
            Some(tx) => enqueue(&tx, msg),
            None => false,
        }
    }

    /// Claims the next preview-frame slot.  `false` means the frame must be skipped.
    pub(crate) fn admit_frame(&self) -> bool {
        self.throttle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_acquire(std::time::Instant::now())
    }

    // ── Inbound ───────────────────────────────────────────────────────────────

    /// Decodes and delivers one inbound line.  Returns the message type, or
    /// `None` when the line was skipped.
    fn handle_line(&self, raw: &[u8], outbound: &mpsc::Sender<Vec<u8>>) -> Option<MessageType> {
        let text = match std::str::from_utf8(raw) {
            Ok(text) => text,
            Err(e) => {
                warn!("dropping inbound line that is not UTF-8: {e}");
                return None;
            }
        };
        if text.trim().is_empty() {
            return None;
        }
        let msg = match decode_message(text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("dropping malformed inbound line: {e}");
                return None;
            }
        };

        debug!(message_type = %msg.message_type, timestamp = msg.timestamp, "received");
        let message_type = msg.message_type;
        if message_type == MessageType::Ping {
            enqueue(outbound, &msg.ack());
        }
        self.deliver(msg);
        Some(message_type)
    }
}

/// Waits until the observed state satisfies `pred`.  Returns `false` if the
/// session is gone.
pub(crate) async fn wait_for_state_where<F>(states: &mut watch::Receiver<ConnectionState>, pred: F) -> bool
where
    F: Fn(ConnectionState) -> bool,
{
    loop {
        if pred(*states.borrow_and_update()) {
            return true;
        }
        if states.changed().await.is_err() {
            return false;
        }
    }
}

/// Encodes `msg` and puts it on the outbound queue without waiting.
fn enqueue(outbound: &mpsc::Sender<Vec<u8>>, msg: &Message) -> bool {
    let bytes = match encode_message(msg) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(message_type = %msg.message_type, "failed to encode outbound message: {e}");
            return false;
        }
    };
    match outbound.try_send(bytes) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            warn!(message_type = %msg.message_type, "outbound queue full; dropping message");
            false
        }
        Err(TrySendError::Closed(_)) => {
            debug!(message_type = %msg.message_type, "stream closed; dropping message");
            false
        }
    }
}

// ── Per-stream tasks ──────────────────────────────────────────────────────────

/// Reads one `\n`-terminated line into `buf`.  `Ok(false)` means end of stream.
async fn next_line<R>(reader: &mut R, buf: &mut Vec<u8>, max_len: usize) -> io::Result<bool>
where
    R: AsyncBufRead + Unpin,
{
    let n = (&mut *reader).take(max_len as u64 + 1).read_until(b'\n', buf).await?;
    if n == 0 {
        return Ok(false);
    }
    if buf.last() != Some(&b'\n') && buf.len() > max_len {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("inbound line exceeds {max_len} bytes"),
        ));
    }
    Ok(true)
}

async fn next_line_within<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    max_len: usize,
    idle_timeout: Option<Duration>,
) -> io::Result<bool>
where
    R: AsyncBufRead + Unpin,
{
    match idle_timeout {
        Some(limit) => tokio::time::timeout(limit, next_line(reader, buf, max_len))
            .await
            .unwrap_or_else(|_| {
                Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("no traffic for {limit:?}"),
                ))
            }),
        None => next_line(reader, buf, max_len).await,
    }
}

async fn read_loop<R>(
    core: Arc<SessionCore>,
    epoch: u64,
    cancel: CancellationToken,
    reader: R,
    outbound: mpsc::Sender<Vec<u8>>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    let max_len = core.config.max_line_bytes;
    // Peers that never send PING or ACK are never timed out.
    let mut idle_timeout = None;

    let reason = loop {
        line.clear();
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            next = next_line_within(&mut reader, &mut line, max_len, idle_timeout) => next,
        };
        match next {
            // A handler may have ended the session while this line was read.
            Ok(true) if cancel.is_cancelled() => return,
            Ok(true) => {
                let seen = core.handle_line(&line, &outbound);
                if idle_timeout.is_none() && matches!(seen, Some(MessageType::Ping | MessageType::Ack)) {
                    idle_timeout = core.config.idle_timeout;
                    if let Some(limit) = idle_timeout {
                        debug!(?limit, "peer sends keepalives; idle timeout armed");
                    }
                }
            }
            Ok(false) => break "peer closed the stream",
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                warn!("{e}; treating peer as gone");
                break "idle timeout";
            }
            Err(e) => {
                warn!("stream read failed: {e}");
                break "stream read failed";
            }
        }
    };

    core.teardown(Some(epoch), reason);
}

async fn write_pump<W>(
    core: Arc<SessionCore>,
    epoch: u64,
    cancel: CancellationToken,
    mut writer: W,
    mut queue: mpsc::Receiver<Vec<u8>>,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            next = queue.recv() => match next {
                Some(line) => line,
                None => break,
            },
        };
        let write = async {
            writer.write_all(&line).await?;
            writer.flush().await
        };
        let written = tokio::select! {
            _ = cancel.cancelled() => break,
            written = write => written,
        };
        if let Err(e) = written {
            warn!("stream write failed: {e}");
            core.teardown(Some(epoch), "stream write failed");
            break;
        }
    }

    if let Err(e) = writer.shutdown().await {
        debug!("stream shutdown: {e}");
    }
}

async fn ping_pump(cancel: CancellationToken, outbound: mpsc::Sender<Vec<u8>>, interval: Duration) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                enqueue(&outbound, &Message::new(MessageType::Ping));
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
