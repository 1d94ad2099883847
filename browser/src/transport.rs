//! Packet transport between the browser and game servers
//!
//! The polling engine talks to the network through the `Transport` trait so
//! it can run against a real UDP socket or an in-memory recorder. Inbound
//! datagrams are delivered separately as `Inbound` values over a channel owned
//! by whoever drives the engine.

use crate::error::DiscoveryError;
use log::{debug, error, warn};
use shared::{decode_packet, encode_packet, Packet, MAX_PACKET_SIZE};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{lookup_host, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Outbound half of a packet transport
pub trait Transport {
    /// Queues `packet` for delivery to `address:port`.
    fn send(&mut self, packet: Packet, address: &str, port: u16) -> Result<(), DiscoveryError>;

    /// Stops delivering packets in both directions. Safe to call repeatedly.
    fn close(&mut self);
}

/// A datagram received from the network
#[derive(Debug, Clone)]
pub struct Inbound {
    pub packet: Packet,
    pub from: SocketAddr,
}

impl Inbound {
    pub fn new(packet: Packet, from: SocketAddr) -> Self {
        Self { packet, from }
    }
}

/// Server information extracted from an `Info` packet and its sender
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoReply {
    pub address: String,
    pub port: u16,
    pub map: Option<String>,
    pub players: Option<u32>,
    pub bots: Option<u32>,
    pub max_players: Option<u32>,
}

impl InfoReply {
    /// Returns `None` for anything that is not an info reply.
    pub fn from_inbound(inbound: &Inbound) -> Option<Self> {
        match &inbound.packet {
            Packet::Info {
                map,
                players,
                bots,
                max_players,
            } => Some(Self {
                address: inbound.from.ip().to_string(),
                port: inbound.from.port(),
                map: map.clone(),
                players: *players,
                bots: *bots,
                max_players: *max_players,
            }),
            _ => None,
        }
    }
}

/// A packet handed to a `RecordingTransport`, for tests and benchmarks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentPacket {
    pub packet: Packet,
    pub address: String,
    pub port: u16,
}

/// In-memory transport that keeps every packet it is asked to send
///
/// Nothing goes on the wire. Used by tests and benchmarks to inspect what the
/// lists would have sent.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    pub sent: Vec<SentPacket>,
    pub closed: bool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Destinations of all sent packets, oldest first.
    pub fn destinations(&self) -> Vec<(String, u16)> {
        self.sent
            .iter()
            .map(|sent| (sent.address.clone(), sent.port))
            .collect()
    }

    pub fn take_sent(&mut self) -> Vec<SentPacket> {
        std::mem::take(&mut self.sent)
    }
}

impl Transport for RecordingTransport {
    fn send(&mut self, packet: Packet, address: &str, port: u16) -> Result<(), DiscoveryError> {
        if self.closed {
            return Err(DiscoveryError::TransportClosed);
        }
        self.sent.push(SentPacket {
            packet,
            address: address.to_string(),
            port,
        });
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

#[derive(Debug)]
struct Outbound {
    packet: Packet,
    address: String,
    port: u16,
}

/// UDP transport with broadcast enabled
///
/// Sending is non-blocking: packets are queued to a sender task that resolves
/// the destination and writes the datagram. A receiver task decodes incoming
/// datagrams and forwards them on the channel returned by `open`.
pub struct UdpTransport {
    local_addr: SocketAddr,
    outbound: Option<mpsc::UnboundedSender<Outbound>>,
    tasks: Vec<JoinHandle<()>>,
}

impl UdpTransport {
    /// Binds `bind_addr` and starts the sender and receiver tasks.
    pub async fn open(
        bind_addr: &str,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Inbound>), DiscoveryError> {
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|source| DiscoveryError::Bind {
                addr: bind_addr.to_string(),
                source,
            })?;
        socket
            .set_broadcast(true)
            .map_err(|source| DiscoveryError::Bind {
                addr: bind_addr.to_string(),
                source,
            })?;
        let local_addr = socket.local_addr().map_err(|source| DiscoveryError::Bind {
            addr: bind_addr.to_string(),
            source,
        })?;
        debug!("Discovery socket bound to {}", local_addr);

        let socket = Arc::new(socket);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let tasks = vec![
            Self::spawn_sender(Arc::clone(&socket), outbound_rx),
            Self::spawn_receiver(socket, inbound_tx),
        ];

        Ok((
            UdpTransport {
                local_addr,
                outbound: Some(outbound_tx),
                tasks,
            },
            inbound_rx,
        ))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Spawns task that processes the outgoing packet queue
    fn spawn_sender(
        socket: Arc<UdpSocket>,
        mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(outbound) = outbound_rx.recv().await {
                let data = match encode_packet(&outbound.packet) {
                    Ok(data) => data,
                    Err(e) => {
                        error!("Failed to encode packet: {}", e);
                        continue;
                    }
                };

                // Literal addresses go straight out; lookups run off the queue
                match literal_target(&outbound.address, outbound.port) {
                    Some(target) => send_datagram(&socket, &data, target).await,
                    None => {
                        let socket = Arc::clone(&socket);
                        tokio::spawn(async move {
                            if let Some(target) = resolve(&outbound.address, outbound.port).await {
                                send_datagram(&socket, &data, target).await;
                            }
                        });
                    }
                }
            }
        })
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_receiver(
        socket: Arc<UdpSocket>,
        inbound_tx: mpsc::UnboundedSender<Inbound>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut buffer = [0u8; MAX_PACKET_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, from)) => match decode_packet(&buffer[..len]) {
                        Ok(packet) => {
                            if inbound_tx.send(Inbound::new(packet, from)).is_err() {
                                debug!("Inbound channel closed, stopping receiver");
                                break;
                            }
                        }
                        Err(e) => {
                            debug!("Failed to decode packet from {}: {}", from, e);
                        }
                    },
                    Err(e) => {
                        // ICMP unreachable surfaces here on some platforms
                        debug!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        })
    }
}

/// Destination for an IP literal, `None` for anything that needs a lookup
fn literal_target(address: &str, port: u16) -> Option<SocketAddr> {
    address
        .parse::<IpAddr>()
        .ok()
        .map(|ip| SocketAddr::new(ip, port))
}

async fn resolve(address: &str, port: u16) -> Option<SocketAddr> {
    match lookup_host((address, port)).await {
        Ok(mut addrs) => {
            let target = addrs.find(|addr| addr.is_ipv4());
            if target.is_none() {
                debug!("No IPv4 address for {}:{}", address, port);
            }
            target
        }
        Err(e) => {
            debug!("Failed to resolve {}:{}: {}", address, port, e);
            None
        }
    }
}

async fn send_datagram(socket: &UdpSocket, data: &[u8], target: SocketAddr) {
    if let Err(e) = socket.send_to(data, target).await {
        warn!("Failed to send packet to {}: {}", target, e);
    }
}

impl Transport for UdpTransport {
    fn send(&mut self, packet: Packet, address: &str, port: u16) -> Result<(), DiscoveryError> {
        let outbound = self
            .outbound
            .as_ref()
            .ok_or(DiscoveryError::TransportClosed)?;
        outbound
            .send(Outbound {
                packet,
                address: address.to_string(),
                port,
            })
            .map_err(|_| DiscoveryError::TransportClosed)
    }

    fn close(&mut self) {
        if self.outbound.take().is_some() {
            debug!("Closing discovery socket {}", self.local_addr);
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        self.close();
    }
}
