//! Local network server list
//!
//! Servers are found by broadcasting a query and adding whoever answers.
//! Unlike the directory list, refreshes never drop known servers; one that
//! goes quiet simply stays listed as timed out.

use crate::discovery::{Discovery, RefreshSchedule};
use crate::server::ServerRecord;
use crate::server_list::{ServerList, Timing};
use crate::transport::{Inbound, InfoReply, Transport};
use log::{debug, info};
use shared::BROADCAST_ADDRESS;
use std::time::{Duration, Instant};

pub const DEFAULT_LAN_UPDATE_INTERVAL: Duration = Duration::from_secs(5);

pub struct LanServerList<T: Transport> {
    list: ServerList<T>,
    default_port: u16,
    broadcast_address: String,
    schedule: RefreshSchedule,
}

impl<T: Transport> LanServerList<T> {
    /// Creates an empty list; the first tick sends the initial broadcast.
    pub fn new(transport: T, default_port: u16, timing: Timing, update_interval: Duration) -> Self {
        Self {
            list: ServerList::new(transport, timing),
            default_port,
            broadcast_address: BROADCAST_ADDRESS.to_string(),
            schedule: RefreshSchedule::new(update_interval),
        }
    }

    /// Sends discovery broadcasts somewhere other than the limited broadcast
    /// address, e.g. a subnet broadcast or loopback in tests.
    pub fn with_broadcast_address(mut self, address: impl Into<String>) -> Self {
        self.broadcast_address = address.into();
        self
    }

    pub fn last_update(&self) -> Option<Instant> {
        self.schedule.last_update()
    }
}

impl<T: Transport> Discovery for LanServerList<T> {
    type Transport = T;

    fn servers(&self) -> &ServerList<T> {
        &self.list
    }

    fn servers_mut(&mut self) -> &mut ServerList<T> {
        &mut self.list
    }

    /// Broadcasts one query; every known server counts as queried now.
    fn update(&mut self, now: Instant) {
        if self.list.is_ended() {
            return;
        }
        self.list.mark_all_queried(now);
        self.list.request(&self.broadcast_address, self.default_port);
        self.schedule.mark(now);
        debug!(
            "Broadcast query to {}:{}",
            self.broadcast_address, self.default_port
        );
    }

    fn tick(&mut self, now: Instant) {
        self.list.tick(now);
        if self.schedule.is_due(now) {
            self.update(now);
        }
    }

    /// Adds unknown responders before the normal reply handling.
    fn handle_inbound(&mut self, inbound: &Inbound, now: Instant) {
        let Some(reply) = InfoReply::from_inbound(inbound) else {
            debug!("Ignoring non-info packet from {}", inbound.from);
            return;
        };
        if self.list.is_ended() {
            return;
        }

        if !self.list.contains(&reply.address, reply.port) {
            info!("Discovered LAN server {}:{}", reply.address, reply.port);
            self.list.add(ServerRecord::new(reply.address.clone(), reply.port));
            self.list.query(&reply.address, reply.port, now);
        }
        self.list.handle_reply(&reply, now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server_list::tests::record_events;
    use crate::server_list::ChangeEvent;
    use crate::transport::RecordingTransport;
    use shared::Packet;

    fn lan_list() -> LanServerList<RecordingTransport> {
        LanServerList::new(
            RecordingTransport::new(),
            2000,
            Timing::default(),
            DEFAULT_LAN_UPDATE_INTERVAL,
        )
    }

    fn info_from(addr: &str) -> Inbound {
        Inbound::new(
            Packet::Info {
                map: Some("lagoon".to_string()),
                players: Some(2),
                bots: Some(0),
                max_players: Some(4),
            },
            addr.parse().unwrap(),
        )
    }

    #[test]
    fn test_first_tick_broadcasts() {
        let now = Instant::now();
        let mut lan = lan_list();

        lan.tick(now);
        assert_eq!(
            lan.servers().transport().destinations(),
            vec![(BROADCAST_ADDRESS.to_string(), 2000)]
        );
        assert_eq!(lan.last_update(), Some(now));

        lan.tick(now + Duration::from_secs(4));
        assert_eq!(lan.servers().transport().sent.len(), 1);
        lan.tick(now + Duration::from_secs(5));
        assert_eq!(lan.servers().transport().sent.len(), 2);
    }

    #[test]
    fn test_reply_from_new_server_adds_it_once() {
        let now = Instant::now();
        let mut lan = lan_list();
        lan.update(now);
        let events = record_events(lan.servers_mut());

        lan.handle_inbound(&info_from("192.168.0.5:2000"), now + Duration::from_millis(5));
        lan.handle_inbound(&info_from("192.168.0.5:2000"), now + Duration::from_millis(30));

        assert_eq!(lan.servers().len(), 1);
        let server = lan.servers().find("192.168.0.5", 2000).unwrap();
        assert_eq!(server.map.as_deref(), Some("lagoon"));
        assert!(server.ping.is_some());

        // Follow-up query primes a direct ping measurement
        assert_eq!(
            lan.servers().transport().destinations(),
            vec![
                (BROADCAST_ADDRESS.to_string(), 2000),
                ("192.168.0.5".to_string(), 2000)
            ]
        );

        let events = events.lock().unwrap();
        assert_eq!(
            events[0],
            ChangeEvent::Added {
                address: "192.168.0.5".to_string(),
                port: 2000
            }
        );
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn test_update_keeps_known_servers() {
        let now = Instant::now();
        let mut lan = lan_list();
        lan.update(now);
        lan.handle_inbound(&info_from("192.168.0.5:2000"), now);
        lan.handle_inbound(&info_from("192.168.0.6:2001"), now);

        let later = now + Duration::from_secs(5);
        lan.update(later);

        assert_eq!(lan.servers().len(), 2);
        assert!(lan
            .servers()
            .iter()
            .all(|s| s.time_last_query == Some(later)));
    }

    #[test]
    fn test_broadcast_reply_measures_ping() {
        let now = Instant::now();
        let mut lan = lan_list();
        lan.update(now);
        lan.handle_inbound(&info_from("192.168.0.5:2000"), now);

        lan.update(now + Duration::from_secs(5));
        lan.handle_inbound(
            &info_from("192.168.0.5:2000"),
            now + Duration::from_secs(5) + Duration::from_millis(12),
        );

        assert_eq!(lan.servers().get(0).unwrap().ping, Some(12));
    }

    #[test]
    fn test_non_info_packet_adds_nothing() {
        let mut lan = lan_list();
        let inbound = Inbound::new(Packet::Query, "192.168.0.5:2000".parse().unwrap());
        lan.handle_inbound(&inbound, Instant::now());
        assert!(lan.servers().is_empty());
    }
}
