//! Fire-and-forget UDP datagram sender.
//!
//! Shared by the log collector and StatsD sinks. Sends never await: a full
//! socket buffer or an unreachable peer drops the datagram.
//!
//! The socket is a plain non-blocking `std` socket. A send is a single
//! syscall that either writes or fails, independent of reactor readiness.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};

use tokio::net::lookup_host;

/// A UDP socket connected to a single collector.
#[derive(Debug)]
pub struct DatagramSender {
    socket: UdpSocket,
    target: SocketAddr,
}

impl DatagramSender {
    /// Resolve `target` and connect an ephemeral socket to it.
    pub async fn connect(target: &str) -> io::Result<Self> {
        let target = lookup_host(target).await?.next().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("no address for {target}"),
            )
        })?;

        let bind = if target.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        let socket = UdpSocket::bind(bind)?;
        socket.set_nonblocking(true)?;
        socket.connect(target)?;

        Ok(Self { socket, target })
    }

    /// Collector address.
    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Send one datagram without blocking. Returns whether it was handed to the OS.
    pub fn send(&self, payload: &[u8]) -> bool {
        match self.socket.send(payload) {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(target_addr = %self.target, error = %e, "Datagram dropped");
                false
            }
        }
    }
}
