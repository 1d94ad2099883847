//! Async loop that drives a server list
//!
//! Ticks the list at a fixed cadence, feeds it inbound datagrams as they
//! arrive and ends it when asked to shut down or when the transport's
//! inbound channel closes. Everything runs on one task, so ticks and reply
//! handling never overlap.

use crate::discovery::Discovery;
use crate::transport::Inbound;
use log::{debug, info};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};

/// Handle used to stop a running driver
pub struct Shutdown {
    tx: Option<oneshot::Sender<()>>,
}

impl Shutdown {
    pub fn channel() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Signals the driver to stop. Later calls do nothing.
    pub fn trigger(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Why the driver stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Shutdown,
    TransportClosed,
}

/// Runs `discovery` until shutdown, then ends it.
pub async fn run<D: Discovery>(
    discovery: &mut D,
    inbound: &mut mpsc::UnboundedReceiver<Inbound>,
    tick: Duration,
    mut shutdown: oneshot::Receiver<()>,
) -> StopReason {
    let mut tick_interval = interval(tick);
    tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!("Server list driver started ({:?} tick)", tick);

    let reason = loop {
        tokio::select! {
            message = inbound.recv() => {
                match message {
                    Some(packet) => discovery.handle_inbound(&packet, Instant::now()),
                    None => {
                        debug!("Inbound channel closed");
                        break StopReason::TransportClosed;
                    }
                }
            },

            _ = tick_interval.tick() => {
                discovery.tick(Instant::now());
            },

            // A dropped handle counts as a shutdown request as well
            _ = &mut shutdown => {
                break StopReason::Shutdown;
            },
        }
    };

    discovery.end();
    info!("Server list driver stopped: {:?}", reason);
    reason
}
