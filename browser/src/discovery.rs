use crate::server_list::ServerList;
use crate::transport::{Inbound, Transport};
use std::time::{Duration, Instant};

/// Common surface of the WAN, LAN and favorites lists
///
/// The driver only talks to lists through this trait: it forwards inbound
/// datagrams, ticks the list at a fixed cadence and ends it on shutdown.
pub trait Discovery {
    type Transport: Transport;

    fn servers(&self) -> &ServerList<Self::Transport>;

    fn servers_mut(&mut self) -> &mut ServerList<Self::Transport>;

    /// Refreshes the membership (or just re-queries) right away.
    fn update(&mut self, now: Instant);

    /// Called once per scheduler tick.
    fn tick(&mut self, now: Instant) {
        self.servers_mut().tick(now);
    }

    fn handle_inbound(&mut self, inbound: &Inbound, now: Instant) {
        self.servers_mut().handle_inbound(inbound, now);
    }

    fn end(&mut self) {
        self.servers_mut().end();
    }
}

/// Periodic refresh bookkeeping for lists that rediscover their members
#[derive(Debug, Clone, Copy)]
pub(crate) struct RefreshSchedule {
    interval: Duration,
    last_update: Option<Instant>,
}

impl RefreshSchedule {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_update: None,
        }
    }

    /// A list that never refreshed is always due; a zero interval disables
    /// every refresh after the first.
    pub(crate) fn is_due(&self, now: Instant) -> bool {
        match self.last_update {
            None => true,
            Some(_) if self.interval.is_zero() => false,
            Some(last) => last + self.interval <= now,
        }
    }

    pub(crate) fn mark(&mut self, now: Instant) {
        self.last_update = Some(now);
    }

    pub(crate) fn last_update(&self) -> Option<Instant> {
        self.last_update
    }
}
