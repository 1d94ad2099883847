//! Known game servers and address parsing
//!
//! A `ServerRecord` is identified by its `(address, port)` pair. Everything
//! else on it is volatile state refreshed by the polling engine: latency,
//! the map being played and player counts, plus the timestamps the engine
//! needs for scheduling and timeout detection.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::Instant;

/// One tracked remote server
#[derive(Debug, Clone)]
pub struct ServerRecord {
    /// Dotted-quad IPv4 address or hostname
    pub address: String,
    pub port: u16,
    /// Round-trip time of the last answered query, `None` while unreachable
    pub ping: Option<u32>,
    pub map: Option<String>,
    pub players: Option<u32>,
    pub bots: Option<u32>,
    pub max_players: Option<u32>,
    /// When the most recent query to this server was sent
    pub time_last_query: Option<Instant>,
    /// When the most recent reply from this server arrived
    pub time_last_response: Option<Instant>,
    /// First query sent since the last reply, cleared when a reply arrives
    pub(crate) pending_since: Option<Instant>,
}

impl ServerRecord {
    /// Creates a record with an explicit port and no known state.
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
            ping: None,
            map: None,
            players: None,
            bots: None,
            max_players: None,
            time_last_query: None,
            time_last_response: None,
            pending_since: None,
        }
    }

    /// Creates a record from user input that may or may not carry a port.
    ///
    /// `"10.0.0.1:7777"` yields port 7777, `"10.0.0.1"` and anything that is
    /// not a strict IPv4 literal (hostnames, garbage) use `default_port` with
    /// the whole input kept as the address.
    pub fn parse(input: &str, default_port: u16) -> Self {
        match parse_ip_port(input) {
            Some((address, port)) => Self::new(address, port.unwrap_or(default_port)),
            None => Self::new(input, default_port),
        }
    }

    /// True when `address` and `port` name this server.
    pub fn is(&self, address: &str, port: u16) -> bool {
        self.address == address && self.port == port
    }

    /// Records that a query has just been sent.
    pub(crate) fn mark_queried(&mut self, now: Instant) {
        self.time_last_query = Some(now);
        self.pending_since.get_or_insert(now);
    }

    /// Whether the next query may go out at `now`.
    pub(crate) fn is_due(&self, now: Instant, interval: std::time::Duration) -> bool {
        match self.time_last_query {
            Some(last) => last + interval <= now,
            None => true,
        }
    }

    /// Whether a previously reachable server has gone quiet for `timeout`.
    pub(crate) fn has_timed_out(&self, now: Instant, timeout: std::time::Duration) -> bool {
        if self.ping.is_none() {
            return false;
        }
        let Some(last_query) = self.time_last_query else {
            return false;
        };
        let answered = matches!(self.time_last_response, Some(response) if response >= last_query);
        if answered {
            return false;
        }
        let waiting_since = self.pending_since.unwrap_or(last_query);
        waiting_since + timeout <= now
    }
}

impl PartialEq for ServerRecord {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address && self.port == other.port
    }
}

impl Eq for ServerRecord {}

impl Hash for ServerRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
        self.port.hash(state);
    }
}

impl fmt::Display for ServerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} (", self.address, self.port)?;
        match self.ping {
            Some(ping) => write!(f, "ping: {}ms", ping)?,
            None => write!(f, "timeout")?,
        }
        if let Some(map) = &self.map {
            write!(f, ", map: {}", map)?;
        }
        if self.players.is_some() || self.bots.is_some() || self.max_players.is_some() {
            write!(
                f,
                ", players: {}+{}/{}",
                count(self.players),
                count(self.bots),
                count(self.max_players)
            )?;
        }
        write!(f, ")")
    }
}

fn count(value: Option<u32>) -> String {
    value.map_or_else(|| "?".to_string(), |v| v.to_string())
}

/// Matches a strict `a.b.c.d[:port]` literal.
///
/// Each octet is one to three digits with a value of at most 255, the port
/// one to five digits with a value of at most 65535. Returns the address part
/// and the port if present. Anything else (hostnames, IPv6, stray characters)
/// is `None`.
pub fn parse_ip_port(input: &str) -> Option<(&str, Option<u16>)> {
    let (address, port) = match input.split_once(':') {
        Some((address, port)) => (address, Some(port)),
        None => (input, None),
    };

    let mut octets = 0;
    for octet in address.split('.') {
        if !is_bounded_number(octet, 3, 255) {
            return None;
        }
        octets += 1;
    }
    if octets != 4 {
        return None;
    }

    let port = match port {
        Some(port) if is_bounded_number(port, 5, u16::MAX as u32) => Some(port.parse().ok()?),
        Some(_) => return None,
        None => None,
    };

    Some((address, port))
}

fn is_bounded_number(text: &str, max_digits: usize, max_value: u32) -> bool {
    if text.is_empty() || text.len() > max_digits || !text.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    text.parse::<u32>().map_or(false, |value| value <= max_value)
}
