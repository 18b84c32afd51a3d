//! Network boundary for channel messages.
//!
//! Sending is best effort: no acknowledgement, ordering or retry. A message
//! is the pair `(collection, tuple)`; the receiver queues it in its
//! [`Inbox`] for the next tick.

use crate::inbox::Inbox;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tidal_core::{Error, Result, Tuple};

const MAX_DATAGRAM: usize = 64 * 1024;
const POLL_INTERVAL: Duration = Duration::from_millis(50);
const FIRST_LOCAL_PORT: u16 = 40000;

/// Outbound side of an instance's network endpoint.
pub trait Transport: Send {
    /// Address peers use to reach this endpoint.
    fn local_addr(&self) -> SocketAddr;

    /// Sends one message to `destination` (`host:port`).
    fn send(&self, destination: &str, collection: &str, t: &Tuple) -> Result<()>;

    /// Stops receiving. Closing twice is a no-op.
    fn close(&mut self) -> Result<()>;
}

/// Resolves a `host:port` destination.
pub fn resolve(destination: &str) -> Result<SocketAddr> {
    destination
        .to_socket_addrs()
        .map_err(|e| Error::transport(format!("bad address {}: {}", destination, e)))?
        .next()
        .ok_or_else(|| Error::transport(format!("address {} resolves to nothing", destination)))
}

#[derive(Default)]
struct Hub {
    peers: HashMap<SocketAddr, Arc<Inbox>>,
    next_port: u16,
}

/// An in-process network. Endpoints bound on the same `LocalNetwork` reach
/// each other by address without sockets.
#[derive(Clone, Default)]
pub struct LocalNetwork {
    hub: Arc<Mutex<Hub>>,
}

impl fmt::Debug for LocalNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalNetwork")
            .field("peers", &self.hub.lock().peers.len())
            .finish()
    }
}

impl LocalNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds an endpoint delivering into `inbox`. Port 0 picks a free port.
    pub fn bind(&self, ip: IpAddr, port: u16, inbox: Arc<Inbox>) -> Result<LocalTransport> {
        let mut hub = self.hub.lock();
        let port = if port == 0 {
            let mut candidate = hub.next_port.max(FIRST_LOCAL_PORT);
            while hub.peers.contains_key(&SocketAddr::new(ip, candidate)) {
                candidate = candidate.checked_add(1).ok_or_else(|| {
                    Error::transport(format!("no free port on {}", ip))
                })?;
            }
            hub.next_port = candidate.saturating_add(1);
            candidate
        } else {
            port
        };
        let addr = SocketAddr::new(ip, port);
        if hub.peers.contains_key(&addr) {
            return Err(Error::transport(format!("address {} already in use", addr)));
        }
        hub.peers.insert(addr, inbox);
        Ok(LocalTransport {
            network: self.clone(),
            addr,
            closed: false,
        })
    }

    /// Number of bound endpoints.
    pub fn len(&self) -> usize {
        self.hub.lock().peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn route(&self, to: SocketAddr) -> Option<Arc<Inbox>> {
        self.hub.lock().peers.get(&to).cloned()
    }
}

/// Endpoint on a [`LocalNetwork`].
pub struct LocalTransport {
    network: LocalNetwork,
    addr: SocketAddr,
    closed: bool,
}

impl Transport for LocalTransport {
    fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    fn send(&self, destination: &str, collection: &str, t: &Tuple) -> Result<()> {
        if self.closed {
            return Err(Error::Shutdown);
        }
        let to = resolve(destination)?;
        match self.network.route(to) {
            Some(inbox) => inbox.deliver(collection, t.clone()),
            None => tracing::debug!(%to, collection, "no endpoint at destination, message dropped"),
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.network.hub.lock().peers.remove(&self.addr);
            self.closed = true;
        }
        Ok(())
    }
}

impl Drop for LocalTransport {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// UDP endpoint. Each datagram carries one `bincode`-encoded
/// `(collection, tuple)` pair.
pub struct UdpTransport {
    socket: UdpSocket,
    addr: SocketAddr,
    stop: Arc<AtomicBool>,
    receiver: Option<JoinHandle<()>>,
}

impl UdpTransport {
    /// Binds `ip:port` and starts the receive thread.
    pub fn bind(ip: IpAddr, port: u16, inbox: Arc<Inbox>) -> Result<Self> {
        let socket = UdpSocket::bind(SocketAddr::new(ip, port))
            .map_err(|e| Error::transport(format!("bind {}:{}: {}", ip, port, e)))?;
        let addr = socket
            .local_addr()
            .map_err(|e| Error::transport(format!("local address: {}", e)))?;
        let reader = socket
            .try_clone()
            .map_err(|e| Error::transport(format!("clone socket: {}", e)))?;
        reader
            .set_read_timeout(Some(POLL_INTERVAL))
            .map_err(|e| Error::transport(format!("set read timeout: {}", e)))?;

        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let receiver = thread::Builder::new()
            .name(format!("tidal-udp-{}", addr.port()))
            .spawn(move || receive_loop(reader, inbox, flag))
            .map_err(|e| Error::transport(format!("spawn receiver: {}", e)))?;
        tracing::debug!(%addr, "udp endpoint bound");
        Ok(Self {
            socket,
            addr,
            stop,
            receiver: Some(receiver),
        })
    }
}

fn receive_loop(socket: UdpSocket, inbox: Arc<Inbox>, stop: Arc<AtomicBool>) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    while !stop.load(Ordering::Acquire) {
        let (n, from) = match socket.recv_from(&mut buf) {
            Ok(r) => r,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => continue,
            Err(e) => {
                tracing::warn!(error = %e, "udp receive failed");
                continue;
            }
        };
        match bincode::deserialize::<(String, Tuple)>(&buf[..n]) {
            Ok((collection, t)) => inbox.deliver(collection, t),
            Err(e) => tracing::warn!(%from, error = %e, "undecodable datagram dropped"),
        }
    }
}

impl Transport for UdpTransport {
    fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    fn send(&self, destination: &str, collection: &str, t: &Tuple) -> Result<()> {
        if self.receiver.is_none() {
            return Err(Error::Shutdown);
        }
        let to = resolve(destination)?;
        let bytes = bincode::serialize(&(collection, t))
            .map_err(|e| Error::transport(format!("encode message: {}", e)))?;
        if bytes.len() > MAX_DATAGRAM {
            return Err(Error::transport(format!(
                "message for {} is {} bytes, over the datagram limit",
                collection,
                bytes.len()
            )));
        }
        self.socket
            .send_to(&bytes, to)
            .map_err(|e| Error::transport(format!("send to {}: {}", to, e)))?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(handle) = self.receiver.take() {
            self.stop.store(true, Ordering::Release);
            if handle.join().is_err() {
                return Err(Error::transport("udp receiver panicked"));
            }
            tracing::debug!(addr = %self.addr, "udp endpoint closed");
        }
        Ok(())
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
