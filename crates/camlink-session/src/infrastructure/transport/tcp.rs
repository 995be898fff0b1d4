//! TCP transport.
//!
//! The host binds a listener on the configured address; the controller
//! dials a peer's `host:port` from the configured peer list.  TCP has a
//! single way to connect, so every [`ConnectMode`] dials the same address
//! and the fallback list degenerates into plain retries.

use std::net::SocketAddr;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use crate::application::transport::{
    Accepted, Acceptor, BoxedStream, ConnectMode, PeerHandle, ServiceRecord, Transport,
    TransportError,
};

/// [`Transport`] over TCP sockets.
pub struct TcpTransport {
    bind_addr: SocketAddr,
    peers: Vec<PeerHandle>,
    bound: Mutex<Option<SocketAddr>>,
}

impl TcpTransport {
    pub fn new(bind_addr: SocketAddr, peers: Vec<PeerHandle>) -> Self {
        Self {
            bind_addr,
            peers,
            bound: Mutex::new(None),
        }
    }

    /// Address of the most recent listener, with the real port when bound to port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.bound.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct TcpAcceptor {
    listener: TcpListener,
}

#[async_trait]
impl Acceptor for TcpAcceptor {
    async fn accept(&mut self) -> Result<Accepted, TransportError> {
        let (stream, remote) = self.listener.accept().await?;
        stream.set_nodelay(true)?;
        info!(%remote, "accepted controller connection");
        Ok(Accepted {
            stream: Box::new(stream),
            peer_name: Some(remote.to_string()),
        })
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn is_available(&self) -> bool {
        true
    }

    async fn listen(&self, service: &ServiceRecord) -> Result<Box<dyn Acceptor>, TransportError> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        let local = listener.local_addr()?;
        *self.bound.lock().unwrap_or_else(PoisonError::into_inner) = Some(local);
        info!(%local, service = %service.name, "tcp listener bound");
        Ok(Box::new(TcpAcceptor { listener }))
    }

    async fn paired_peers(&self) -> Result<Vec<PeerHandle>, TransportError> {
        Ok(self.peers.clone())
    }

    async fn connect(
        &self,
        peer: &PeerHandle,
        _service: &ServiceRecord,
        mode: ConnectMode,
    ) -> Result<BoxedStream, TransportError> {
        debug!(peer = %peer, %mode, "dialing");
        let stream = TcpStream::connect(peer.address.as_str()).await?;
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
