//! Transport ports: the traits the session layer uses to reach a peer.
//!
//! The session never touches a socket type directly.  It asks a
//! [`Transport`] to listen, to list paired peers, or to connect, and gets back
//! a [`BoxedStream`]: any bidirectional byte stream.  The production adapter
//! is TCP; tests pair two sessions over an in-memory radio.
//!
//! # Connection strategies
//!
//! Radio stacks are unreliable about which flavour of connection a peer will
//! accept, so the controller walks an ordered list of [`ConnectMode`]s and
//! keeps the first one that yields a stream.  See [`connect_with_fallback`].

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{info, warn};
use uuid::Uuid;

/// Service UUID shared by every CamLink host.
pub const CAMERA_REMOTE_SERVICE_ID: Uuid = Uuid::from_u128(0x8ce255c0_200a_11e0_ac64_0800200c9a66);

/// Service name advertised next to [`CAMERA_REMOTE_SERVICE_ID`].
pub const CAMERA_REMOTE_SERVICE_NAME: &str = "CameraRemote";

/// Default fallback order used by the controller.
pub const DEFAULT_CONNECT_MODES: [ConnectMode; 3] =
    [ConnectMode::Insecure, ConnectMode::Secure, ConnectMode::Channel(1)];

/// Errors raised by transports and by the connection helpers in this module.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The radio is absent or switched off.
    #[error("transport unavailable (radio absent or disabled)")]
    TransportUnavailable,

    /// The platform has not granted the transport permission.
    #[error("transport permission not granted")]
    PermissionDenied,

    /// No peer connected before the accept deadline.
    #[error("no peer connected within {0:?}")]
    AcceptTimeout(Duration),

    /// The listener or stream was closed underneath the caller.
    #[error("transport closed")]
    TransportClosed,

    /// Every connection strategy failed.
    #[error("could not connect to {peer} (tried {})", attempts.join(", "))]
    ConnectFailed { peer: String, attempts: Vec<String> },

    /// Underlying I/O failure.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Any bidirectional byte stream a transport can hand out.
pub trait ByteStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> ByteStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// An owned, type-erased stream.
pub type BoxedStream = Box<dyn ByteStream>;

/// A remote device the controller can connect to.
///
/// `address` is transport-specific: a `host:port` for TCP, a device name for
/// the in-memory radio.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerHandle {
    pub name: String,
    pub address: String,
}

impl PeerHandle {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }
}

impl fmt::Display for PeerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.address)
    }
}

/// The service a host listens under and a controller connects to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    pub name: String,
    pub id: Uuid,
}

impl Default for ServiceRecord {
    fn default() -> Self {
        Self {
            name: CAMERA_REMOTE_SERVICE_NAME.to_string(),
            id: CAMERA_REMOTE_SERVICE_ID,
        }
    }
}

/// One flavour of outgoing connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectMode {
    /// Service lookup without link encryption.
    Insecure,
    /// Service lookup with link encryption.
    Secure,
    /// Direct connection to a fixed channel number, skipping service lookup.
    Channel(u8),
}

impl fmt::Display for ConnectMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectMode::Insecure => f.write_str("insecure"),
            ConnectMode::Secure => f.write_str("secure"),
            ConnectMode::Channel(n) => write!(f, "channel-{n}"),
        }
    }
}

/// A stream accepted by a listening host.
pub struct Accepted {
    pub stream: BoxedStream,
    /// Display name of the remote device, when the transport knows it.
    pub peer_name: Option<String>,
}

impl fmt::Debug for Accepted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accepted")
            .field("peer_name", &self.peer_name)
            .finish_non_exhaustive()
    }
}

/// A listening endpoint.  Dropping it closes the listener.
#[async_trait]
pub trait Acceptor: Send {
    /// Waits for the next inbound connection.
    async fn accept(&mut self) -> Result<Accepted, TransportError>;
}

/// Abstraction over the link layer.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Returns `false` when the radio is absent or switched off.
    fn is_available(&self) -> bool;

    /// Starts listening for `service`.  Must not wait for a peer.
    async fn listen(&self, service: &ServiceRecord) -> Result<Box<dyn Acceptor>, TransportError>;

    /// Lists the devices previously paired with this one.
    async fn paired_peers(&self) -> Result<Vec<PeerHandle>, TransportError>;

    /// Opens a stream to `peer` using one connection mode.
    async fn connect(
        &self,
        peer: &PeerHandle,
        service: &ServiceRecord,
        mode: ConnectMode,
    ) -> Result<BoxedStream, TransportError>;

    /// Stops any ongoing discovery scan.  Called before every connect.
    fn cancel_discovery(&self) {}
}

/// Platform permission gate consulted before every listen, discover and connect.
pub trait PermissionCheck: Send + Sync {
    fn has_transport_permission(&self) -> bool;
}

/// A [`PermissionCheck`] with a fixed answer.
#[derive(Debug, Clone, Copy)]
pub struct StaticPermission(pub bool);

impl PermissionCheck for StaticPermission {
    fn has_transport_permission(&self) -> bool {
        self.0
    }
}

/// Waits for one inbound connection, giving up after `timeout`.
///
/// # Errors
///
/// Returns [`TransportError::AcceptTimeout`] when the deadline passes, or
/// whatever the acceptor itself reports.
pub async fn accept_within(
    acceptor: &mut (dyn Acceptor + '_),
    timeout: Duration,
) -> Result<Accepted, TransportError> {
    tokio::time::timeout(timeout, acceptor.accept())
        .await
        .map_err(|_| TransportError::AcceptTimeout(timeout))?
}

/// Connects to `peer`, trying each mode in `modes` until one succeeds.
///
/// Discovery is cancelled first because an active scan slows connects down
/// on most radios.  Each attempt gets its own `attempt_timeout`.
///
/// # Errors
///
/// - [`TransportError::TransportUnavailable`] / [`TransportError::PermissionDenied`]
///   stop the walk immediately.
/// - [`TransportError::ConnectFailed`] lists every mode tried when all fail.
pub async fn connect_with_fallback(
    transport: &dyn Transport,
    peer: &PeerHandle,
    service: &ServiceRecord,
    modes: &[ConnectMode],
    attempt_timeout: Duration,
) -> Result<(BoxedStream, ConnectMode), TransportError> {
    transport.cancel_discovery();

    let mut attempts = Vec::with_capacity(modes.len());
    for &mode in modes {
        attempts.push(mode.to_string());
        let attempt = tokio::time::timeout(attempt_timeout, transport.connect(peer, service, mode));
        match attempt.await {
            Ok(Ok(stream)) => {
                info!(peer = %peer.name, %mode, "connected");
                return Ok((stream, mode));
            }
            Ok(Err(e @ (TransportError::TransportUnavailable | TransportError::PermissionDenied))) => {
                return Err(e);
            }
            Ok(Err(e)) => warn!(peer = %peer.name, %mode, "connect attempt failed: {e}"),
            Err(_) => warn!(peer = %peer.name, %mode, "connect attempt timed out after {attempt_timeout:?}"),
        }
    }

    Err(TransportError::ConnectFailed {
        peer: peer.name.clone(),
        attempts,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
