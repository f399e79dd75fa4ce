//! Physical transport to the relay server.
//!
//! The relay protocol relies on message boundaries being preserved, so the
//! transport is datagram oriented: one `send` is one message and one `recv`
//! returns at most one message.

use async_trait::async_trait;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A live, message-oriented connection to the relay server
#[async_trait]
pub trait RelayTransport: Send + Sync {
    /// Receive one message into `buf`, returning its length
    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize>;
    /// Send `buf` as one message
    async fn send(&self, buf: &[u8]) -> io::Result<usize>;
    /// Close the transport; pending and later receives fail
    async fn close(&self) -> io::Result<()>;
}

/// Opens transports to a relay server
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Dial `addr` and return the connected transport
    async fn dial(&self, addr: &str) -> io::Result<Arc<dyn RelayTransport>>;
}

/// Connected UDP socket
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    closed: AtomicBool,
    shutdown: CancellationToken,
}

impl UdpTransport {
    /// Resolve `addr`, bind an ephemeral local port and connect to it
    pub async fn connect(addr: &str) -> io::Result<Self> {
        let remote = tokio::net::lookup_host(addr).await?.next().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("no address found for {}", addr),
            )
        })?;

        let local = match remote {
            SocketAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            SocketAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
        };

        let socket = UdpSocket::bind(local).await?;
        socket.connect(remote).await?;
        debug!("Dialed relay server {} from {}", remote, socket.local_addr()?);

        Ok(Self {
            socket,
            closed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        })
    }

    /// Local address of the underlying socket
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Address of the relay server
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.socket.peer_addr()
    }
}

#[async_trait]
impl RelayTransport for UdpTransport {
    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        tokio::select! {
            _ = self.shutdown.cancelled() => Err(closed_error()),
            res = self.socket.recv(buf) => res,
        }
    }

    async fn send(&self, buf: &[u8]) -> io::Result<usize> {
        if self.closed.load(Ordering::Acquire) {
            return Err(closed_error());
        }
        self.socket.send(buf).await
    }

    async fn close(&self) -> io::Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(closed_error());
        }
        self.shutdown.cancel();
        Ok(())
    }
}

/// Default dialer, connecting over UDP
#[derive(Debug, Default, Clone, Copy)]
pub struct UdpDialer;

#[async_trait]
impl Dialer for UdpDialer {
    async fn dial(&self, addr: &str) -> io::Result<Arc<dyn RelayTransport>> {
        let transport: Arc<dyn RelayTransport> = Arc::new(UdpTransport::connect(addr).await?);
        Ok(transport)
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "use of closed connection")
}
