//! Round-robin polling engine shared by every server list
//!
//! The engine owns an ordered list of `ServerRecord`s and keeps them fresh:
//! - At most one query goes out per tick, to the first record whose query
//!   interval has elapsed, so every server gets its turn
//! - Replies are matched to records by `(address, port)` and update latency,
//!   map and player counts
//! - A reachable server that stops answering for longer than the query
//!   timeout is marked unreachable the next time its turn comes up
//!
//! Every visible change is reported through a subscribed listener as a
//! `ChangeEvent`, synchronously and exactly once per change.

use crate::server::ServerRecord;
use crate::transport::{Inbound, InfoReply, Transport};
use log::{debug, warn};
use shared::Packet;
use std::time::{Duration, Instant};

pub const DEFAULT_QUERY_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(2);

/// Query pacing shared by all servers in one list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Minimum time between two queries to the same server
    pub query_interval: Duration,
    /// Time after which an unanswered query counts as failed
    pub query_timeout: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            query_interval: DEFAULT_QUERY_INTERVAL,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }
}

/// A change to the observable state of a server list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Added { address: String, port: u16 },
    Removed { address: String, port: u16 },
    Cleared,
    TimedOut { address: String, port: u16 },
    Responded { address: String, port: u16 },
}

type Listener = Box<dyn FnMut(&ChangeEvent) + Send>;

/// Ordered collection of servers polled over a transport
pub struct ServerList<T: Transport> {
    servers: Vec<ServerRecord>,
    transport: T,
    timing: Timing,
    listener: Option<Listener>,
    ended: bool,
}

impl<T: Transport> ServerList<T> {
    pub fn new(transport: T, timing: Timing) -> Self {
        Self {
            servers: Vec::new(),
            transport,
            timing,
            listener: None,
            ended: false,
        }
    }

    /// Installs the change listener, replacing any previous one.
    pub fn subscribe<F>(&mut self, listener: F)
    where
        F: FnMut(&ChangeEvent) + Send + 'static,
    {
        self.listener = Some(Box::new(listener));
    }

    pub fn unsubscribe(&mut self) {
        self.listener = None;
    }

    pub fn timing(&self) -> Timing {
        self.timing
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Detaches the listener and closes the transport.
    ///
    /// Replies still in flight are ignored afterwards. Calling this again is
    /// a no-op.
    pub fn end(&mut self) {
        if self.ended {
            return;
        }
        self.ended = true;
        self.listener = None;
        self.transport.close();
        debug!("Server list ended with {} servers", self.servers.len());
    }

    /// Per-tick pump: queries the first server that is due, if any.
    pub fn tick(&mut self, now: Instant) {
        if self.ended {
            return;
        }

        let interval = self.timing.query_interval;
        let Some(index) = self.servers.iter().position(|s| s.is_due(now, interval)) else {
            return;
        };

        let server = &mut self.servers[index];
        let identity = (server.address.clone(), server.port);
        if server.has_timed_out(now, self.timing.query_timeout) {
            server.ping = None;
            debug!("Server {}:{} timed out", identity.0, identity.1);
            self.notify(ChangeEvent::TimedOut {
                address: identity.0.clone(),
                port: identity.1,
            });
        }

        self.query(&identity.0, identity.1, now);
    }

    /// Appends `server`, moving an existing record with the same identity to
    /// the end instead of duplicating it.
    pub fn add(&mut self, server: ServerRecord) {
        self.servers.retain(|s| *s != server);
        let event = ChangeEvent::Added {
            address: server.address.clone(),
            port: server.port,
        };
        self.servers.push(server);
        self.notify(event);
    }

    /// Removes the record with the identity of `server`.
    pub fn remove(&mut self, server: &ServerRecord) -> Option<ServerRecord> {
        let index = self.servers.iter().position(|s| s == server)?;
        let removed = self.servers.remove(index);
        self.notify(ChangeEvent::Removed {
            address: removed.address.clone(),
            port: removed.port,
        });
        Some(removed)
    }

    pub fn clear(&mut self) {
        self.servers.clear();
        self.notify(ChangeEvent::Cleared);
    }

    /// Stamps every record for `address:port` as queried and sends a query.
    pub fn query(&mut self, address: &str, port: u16, now: Instant) {
        for server in self.servers.iter_mut().filter(|s| s.is(address, port)) {
            server.mark_queried(now);
        }
        self.request(address, port);
    }

    /// Sends a query without touching any record.
    pub fn request(&mut self, address: &str, port: u16) {
        if self.ended {
            return;
        }
        if let Err(e) = self.transport.send(Packet::Query, address, port) {
            warn!("Failed to queue query for {}:{}: {}", address, port, e);
        }
    }

    /// Stamps every record as queried at `now` without sending anything.
    pub fn mark_all_queried(&mut self, now: Instant) {
        for server in &mut self.servers {
            server.mark_queried(now);
        }
    }

    /// Handles a datagram from the transport. Non-info packets are ignored.
    pub fn handle_inbound(&mut self, inbound: &Inbound, now: Instant) -> bool {
        match InfoReply::from_inbound(inbound) {
            Some(reply) => self.handle_reply(&reply, now),
            None => {
                debug!("Ignoring non-info packet from {}", inbound.from);
                false
            }
        }
    }

    /// Applies a reply to the matching record.
    ///
    /// Returns false when no record matches; such replies are dropped.
    pub fn handle_reply(&mut self, reply: &InfoReply, now: Instant) -> bool {
        if self.ended {
            return false;
        }
        let Some(server) = self
            .servers
            .iter_mut()
            .find(|s| s.is(&reply.address, reply.port))
        else {
            debug!("Dropping reply from unknown server {}:{}", reply.address, reply.port);
            return false;
        };

        let sent = server.time_last_query.unwrap_or(now);
        server.time_last_response = Some(now);
        server.pending_since = None;
        server.ping = Some(round_millis(now.saturating_duration_since(sent)));
        server.map = reply.map.clone();
        server.players = reply.players;
        server.bots = reply.bots;
        server.max_players = reply.max_players;

        self.notify(ChangeEvent::Responded {
            address: reply.address.clone(),
            port: reply.port,
        });
        true
    }

    pub fn contains(&self, address: &str, port: u16) -> bool {
        self.servers.iter().any(|s| s.is(address, port))
    }

    pub fn find(&self, address: &str, port: u16) -> Option<&ServerRecord> {
        self.servers.iter().find(|s| s.is(address, port))
    }

    pub fn find_mut(&mut self, address: &str, port: u16) -> Option<&mut ServerRecord> {
        self.servers.iter_mut().find(|s| s.is(address, port))
    }

    pub fn get(&self, index: usize) -> Option<&ServerRecord> {
        self.servers.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ServerRecord> {
        self.servers.iter()
    }

    pub fn servers(&self) -> &[ServerRecord] {
        &self.servers
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    fn notify(&mut self, event: ChangeEvent) {
        if let Some(listener) = self.listener.as_mut() {
            listener(&event);
        }
    }
}

impl<'a, T: Transport> IntoIterator for &'a ServerList<T> {
    type Item = &'a ServerRecord;
    type IntoIter = std::slice::Iter<'a, ServerRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.servers.iter()
    }
}

fn round_millis(elapsed: Duration) -> u32 {
    let millis = (elapsed.as_secs_f64() * 1000.0).round();
    millis.min(u32::MAX as f64) as u32
}
