//! In-process loopback radio.
//!
//! [`MemoryRadio`] plays the part of the air between devices: every
//! [`MemoryTransport`] created from the same radio can reach the others by
//! device name.  Links are `tokio::io::duplex` pipes joined by a relay task,
//! which lets the radio cut every live link at once with
//! [`MemoryRadio::sever_links`].
//!
//! Each transport can also be switched off, or told to refuse particular
//! connection modes, which is how tests drive the unavailable-radio and
//! connection-fallback paths.
//!
//! ```text
//! controller end ══ duplex ══ relay task ══ duplex ══ host end
//!                                 ▲
//!                          sever token
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::io::DuplexStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::application::transport::{
    Accepted, Acceptor, BoxedStream, ConnectMode, PeerHandle, ServiceRecord, Transport,
    TransportError,
};

/// Buffer size of each half of a link.
const LINK_BUFFER: usize = 64 * 1024;

type ListenerKey = (String, Uuid);

struct Incoming {
    stream: BoxedStream,
    from: String,
}

#[derive(Default)]
struct RadioState {
    listeners: HashMap<ListenerKey, mpsc::Sender<Incoming>>,
    links: CancellationToken,
}

/// Shared medium for a group of [`MemoryTransport`]s.
#[derive(Clone, Default)]
pub struct MemoryRadio {
    state: Arc<Mutex<RadioState>>,
}

impl MemoryRadio {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, RadioState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates a transport for a device called `device_name`.
    pub fn transport(&self, device_name: impl Into<String>) -> MemoryTransport {
        MemoryTransport {
            radio: self.clone(),
            device_name: device_name.into(),
            available: AtomicBool::new(true),
            failing_modes: Mutex::new(HashSet::new()),
            paired: Mutex::new(Vec::new()),
            discovery_cancels: AtomicUsize::new(0),
        }
    }

    /// Cuts every live link.  Both ends see the stream fail.
    pub fn sever_links(&self) {
        let token = std::mem::take(&mut self.state().links);
        token.cancel();
        debug!("all radio links severed");
    }
}

/// One device's view of a [`MemoryRadio`].
pub struct MemoryTransport {
    radio: MemoryRadio,
    device_name: String,
    available: AtomicBool,
    failing_modes: Mutex<HashSet<ConnectMode>>,
    paired: Mutex<Vec<PeerHandle>>,
    discovery_cancels: AtomicUsize,
}

impl MemoryTransport {
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Switches the radio on or off for this device.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Makes every connect attempt using `mode` fail.
    pub fn fail_mode(&self, mode: ConnectMode) {
        self.failing_modes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(mode);
    }

    /// Adds `other` to this device's paired list.
    pub fn pair_with(&self, other: &MemoryTransport) {
        self.paired
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(PeerHandle::new(other.device_name.clone(), other.device_name.clone()));
    }

    /// How many times discovery was cancelled (once per connect).
    pub fn discovery_cancel_count(&self) -> usize {
        self.discovery_cancels.load(Ordering::SeqCst)
    }

    fn ensure_available(&self) -> Result<(), TransportError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransportError::TransportUnavailable)
        }
    }
}

struct MemoryAcceptor {
    radio: MemoryRadio,
    key: ListenerKey,
    incoming: mpsc::Receiver<Incoming>,
}

#[async_trait]
impl Acceptor for MemoryAcceptor {
    async fn accept(&mut self) -> Result<Accepted, TransportError> {
        let incoming = self.incoming.recv().await.ok_or(TransportError::TransportClosed)?;
        Ok(Accepted {
            stream: incoming.stream,
            peer_name: Some(incoming.from),
        })
    }
}

impl Drop for MemoryAcceptor {
    fn drop(&mut self) {
        self.incoming.close();
        let mut state = self.radio.state();
        if state.listeners.get(&self.key).is_some_and(|tx| tx.is_closed()) {
            state.listeners.remove(&self.key);
        }
    }
}

async fn relay(mut controller_side: DuplexStream, mut host_side: DuplexStream, sever: CancellationToken) {
    tokio::select! {
        _ = sever.cancelled() => debug!("link severed"),
        copied = tokio::io::copy_bidirectional(&mut controller_side, &mut host_side) => match copied {
            Ok((up, down)) => debug!(up, down, "link closed"),
            Err(e) => debug!("link closed: {e}"),
        },
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn listen(&self, service: &ServiceRecord) -> Result<Box<dyn Acceptor>, TransportError> {
        self.ensure_available()?;
        let key = (self.device_name.clone(), service.id);
        let (tx, rx) = mpsc::channel(4);
        {
            let mut state = self.radio.state();
            if state.listeners.get(&key).is_some_and(|tx| !tx.is_closed()) {
                return Err(std::io::Error::from(std::io::ErrorKind::AddrInUse).into());
            }
            state.listeners.insert(key.clone(), tx);
        }
        debug!(device = %self.device_name, service = %service.name, "listening on radio");
        Ok(Box::new(MemoryAcceptor {
            radio: self.radio.clone(),
            key,
            incoming: rx,
        }))
    }

    async fn paired_peers(&self) -> Result<Vec<PeerHandle>, TransportError> {
        self.ensure_available()?;
        Ok(self.paired.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    async fn connect(
        &self,
        peer: &PeerHandle,
        service: &ServiceRecord,
        mode: ConnectMode,
    ) -> Result<BoxedStream, TransportError> {
        self.ensure_available()?;
        let refused = || TransportError::from(std::io::Error::from(std::io::ErrorKind::ConnectionRefused));

        let failing = self
            .failing_modes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&mode);
        if failing {
            return Err(refused());
        }

        let (listener, sever) = {
            let state = self.radio.state();
            let listener = state.listeners.get(&(peer.address.clone(), service.id)).cloned();
            (listener, state.links.clone())
        };
        let listener = listener.ok_or_else(refused)?;

        let (controller_end, relay_controller) = tokio::io::duplex(LINK_BUFFER);
        let (relay_host, host_end) = tokio::io::duplex(LINK_BUFFER);
        listener
            .send(Incoming {
                stream: Box::new(host_end),
                from: self.device_name.clone(),
            })
            .await
            .map_err(|_| refused())?;
        tokio::spawn(relay(relay_controller, relay_host, sever));

        Ok(Box::new(controller_end))
    }

    fn cancel_discovery(&self) {
        self.discovery_cancels.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
