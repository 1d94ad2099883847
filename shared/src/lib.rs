use serde::{Deserialize, Serialize};

/// Port game servers listen on when an address carries none.
pub const DEFAULT_PORT: u16 = 62666;
/// Limited broadcast address used for LAN discovery queries.
pub const BROADCAST_ADDRESS: &str = "255.255.255.255";
/// Upper bound for a single discovery datagram.
pub const MAX_PACKET_SIZE: usize = 2048;

/// Messages exchanged between a browser and game servers.
///
/// The browser only ever sends `Query`; servers answer with `Info`. The
/// sender's address is taken from the datagram, not from the payload.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum Packet {
    Query,
    Info {
        map: Option<String>,
        players: Option<u32>,
        bots: Option<u32>,
        max_players: Option<u32>,
    },
}

impl Packet {
    pub fn is_info(&self) -> bool {
        matches!(self, Packet::Info { .. })
    }
}

pub fn encode_packet(packet: &Packet) -> bincode::Result<Vec<u8>> {
    bincode::serialize(packet)
}

/// Decodes a datagram, rejecting anything larger than `MAX_PACKET_SIZE`.
pub fn decode_packet(data: &[u8]) -> bincode::Result<Packet> {
    if data.len() > MAX_PACKET_SIZE {
        return Err(Box::new(bincode::ErrorKind::SizeLimit));
    }
    bincode::deserialize(data)
}
