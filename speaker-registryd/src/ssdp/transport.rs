//! UDP socket used for SSDP searches.
//!
//! One socket sends the search and receives the unicast replies, since
//! devices answer to the source address/port of the request.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use local_ip_address::list_afinet_netifas;
use socket2::{Domain, Protocol, SockRef, Socket, Type};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::time::{timeout, Instant};

/// UPnP recommends a TTL of 4 for SSDP multicast.
const MULTICAST_TTL: u32 = 4;

/// Largest UDP payload we accept.
const MAX_DATAGRAM: usize = 65_536;

/// Interface name prefixes that never host speakers.
const VIRTUAL_INTERFACE_PREFIXES: &[&str] = &[
    "lo", "docker", "veth", "br-", "virbr", "vmnet", "vbox", "tun", "tap",
];

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no usable network interfaces found")]
    NoInterfaces,

    #[error("failed to bind UDP socket: {0}")]
    Bind(#[source] std::io::Error),

    #[error("failed to send datagram: {0}")]
    Send(#[source] std::io::Error),

    #[error("failed to receive datagram: {0}")]
    Recv(#[source] std::io::Error),

    #[error("socket is closed")]
    Closed,
}

/// A local IPv4 interface that takes part in discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceInfo {
    pub name: String,
    pub ip: Ipv4Addr,
}

fn is_virtual_interface(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    VIRTUAL_INTERFACE_PREFIXES
        .iter()
        .any(|prefix| name.starts_with(prefix))
}

/// Resolve the interfaces to search on.
///
/// An empty `names` list selects every non-virtual IPv4 interface. An empty
/// result in that case means "let the OS route it". Naming interfaces that
/// do not exist is an error.
pub fn select_interfaces(names: &[String]) -> Result<Vec<InterfaceInfo>, TransportError> {
    let available = list_afinet_netifas().unwrap_or_else(|e| {
        tracing::warn!("Failed to list network interfaces: {}", e);
        Vec::new()
    });
    let selected = filter_interfaces(available, names);

    if !names.is_empty() && selected.is_empty() {
        return Err(TransportError::NoInterfaces);
    }
    Ok(selected)
}

fn filter_interfaces(available: Vec<(String, IpAddr)>, names: &[String]) -> Vec<InterfaceInfo> {
    available
        .into_iter()
        .filter_map(|(name, addr)| match addr {
            IpAddr::V4(ip) if !ip.is_loopback() => Some(InterfaceInfo { name, ip }),
            _ => None,
        })
        .filter(|iface| {
            if names.is_empty() {
                !is_virtual_interface(&iface.name)
            } else {
                names.iter().any(|n| n == &iface.name)
            }
        })
        .collect()
}

pub struct MulticastTransport {
    socket: Option<UdpSocket>,
    interfaces: Vec<InterfaceInfo>,
}

impl MulticastTransport {
    /// Bind a socket at `bind` (port 0 lets the OS choose).
    pub fn open(bind: SocketAddr, interfaces: Vec<InterfaceInfo>) -> Result<Self, TransportError> {
        let socket = Socket::new(Domain::for_address(bind), Type::DGRAM, Some(Protocol::UDP))
            .map_err(TransportError::Bind)?;

        if let Err(e) = socket.set_reuse_address(true) {
            tracing::warn!("Failed to set SO_REUSEADDR on {}: {}", bind, e);
        }
        if bind.is_ipv4() {
            if let Err(e) = socket.set_multicast_ttl_v4(MULTICAST_TTL) {
                tracing::warn!("Failed to set multicast TTL on {}: {}", bind, e);
            }
        }

        socket.set_nonblocking(true).map_err(TransportError::Bind)?;
        socket.bind(&bind.into()).map_err(TransportError::Bind)?;

        let std_socket: std::net::UdpSocket = socket.into();
        let socket = UdpSocket::from_std(std_socket).map_err(TransportError::Bind)?;

        tracing::debug!(
            "SSDP socket bound to {:?} on {} interface(s)",
            socket.local_addr().ok(),
            interfaces.len()
        );

        Ok(Self {
            socket: Some(socket),
            interfaces,
        })
    }

    fn socket(&self) -> Result<&UdpSocket, TransportError> {
        self.socket.as_ref().ok_or(TransportError::Closed)
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.socket()?.local_addr().map_err(TransportError::Bind)
    }

    /// Send `message` to `destination`. Multicast destinations are sent once
    /// per selected interface.
    pub async fn send(&self, message: &[u8], destination: SocketAddr) -> Result<(), TransportError> {
        let socket = self.socket()?;

        if !destination.ip().is_multicast() || self.interfaces.is_empty() {
            socket
                .send_to(message, destination)
                .await
                .map_err(TransportError::Send)?;
            tracing::trace!("Sent {} bytes to {}", message.len(), destination);
            return Ok(());
        }

        let mut sent = 0usize;
        let mut last_error = None;
        for iface in &self.interfaces {
            if let Err(e) = SockRef::from(socket).set_multicast_if_v4(&iface.ip) {
                tracing::warn!("Failed to select interface {} ({}): {}", iface.name, iface.ip, e);
                last_error = Some(e);
                continue;
            }
            match socket.send_to(message, destination).await {
                Ok(_) => {
                    sent += 1;
                    tracing::trace!("Sent {} bytes to {} via {}", message.len(), destination, iface.name);
                }
                Err(e) => {
                    tracing::warn!("Failed to send on {} ({}): {}", iface.name, iface.ip, e);
                    last_error = Some(e);
                }
            }
        }

        match (sent, last_error) {
            (0, Some(e)) => Err(TransportError::Send(e)),
            _ => Ok(()),
        }
    }

    /// Call `on_packet` for every datagram received until `duration` elapses.
    pub async fn receive_for<F>(&self, duration: Duration, mut on_packet: F) -> Result<(), TransportError>
    where
        F: FnMut(SocketAddr, &[u8]),
    {
        let socket = self.socket()?;
        let deadline = Instant::now() + duration;
        let mut buf = vec![0u8; MAX_DATAGRAM];

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match timeout(remaining, socket.recv_from(&mut buf)).await {
                Ok(Ok((len, src))) => {
                    tracing::trace!("Received {} bytes from {}", len, src);
                    on_packet(src, &buf[..len]);
                }
                Ok(Err(e)) => return Err(TransportError::Recv(e)),
                Err(_) => break,
            }
        }
        Ok(())
    }

    /// Release the socket. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(socket) = self.socket.take() {
            drop(socket);
            tracing::trace!("SSDP socket closed");
        }
    }
}

impl Drop for MulticastTransport {
    fn drop(&mut self) {
        self.close();
    }
}
