//! # Server Browser Library
//!
//! This library discovers multiplayer game servers and keeps their liveness
//! information fresh. It maintains live lists of reachable servers together
//! with per-server latency, current map and player counts.
//!
//! ## Core Responsibilities
//!
//! ### Discovery
//! Servers enter a list in one of three ways:
//! - **Internet** (`wan`): a central directory publishes one `ip[:port]` per
//!   line; each refresh replaces the list with the directory's contents
//! - **Local network** (`lan`): a query is broadcast and every server that
//!   answers is added on the fly; known servers are never dropped
//! - **Favorites** (`favorites`): addresses the user added explicitly,
//!   persisted between sessions
//!
//! ### Liveness Tracking
//! All three lists share one polling engine (`server_list`). On every tick it
//! queries the first server whose query interval has elapsed, matches info
//! replies back to servers by address and port, computes the round-trip time
//! and marks servers unreachable once they stop answering.
//!
//! ### Change Notification
//! Every visible change (server added, removed, list cleared, reply received,
//! server timed out) is reported synchronously to a subscribed listener.
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Event Loop
//! A list is driven from one task (`driver`) that interleaves scheduler ticks
//! and inbound datagrams. The engine itself performs no I/O and takes the
//! current time as an argument, so it can be exercised without a runtime.
//!
//! ### UDP-Based Communication
//! `transport::UdpTransport` owns a broadcast-capable UDP socket with a
//! sender task and a receiver task. Closing the transport aborts both, so no
//! reply reaches a list after it has ended.
//!
//! ### Off-Loaded Directory Fetch
//! The directory is the only blocking operation. It runs on a spawned task
//! and its result is applied on a later tick; a list never has two fetches
//! outstanding.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use browser::discovery::Discovery;
//! use browser::driver::{self, Shutdown};
//! use browser::lan::{LanServerList, DEFAULT_LAN_UPDATE_INTERVAL};
//! use browser::server_list::Timing;
//! use browser::transport::UdpTransport;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (transport, mut inbound) = UdpTransport::open("0.0.0.0:0").await?;
//!     let mut lan = LanServerList::new(
//!         transport,
//!         shared::DEFAULT_PORT,
//!         Timing::default(),
//!         DEFAULT_LAN_UPDATE_INTERVAL,
//!     );
//!     lan.servers_mut().subscribe(|event| println!("{:?}", event));
//!
//!     let (_shutdown, shutdown_rx) = Shutdown::channel();
//!     driver::run(&mut lan, &mut inbound, Duration::from_millis(50), shutdown_rx).await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod discovery;
pub mod driver;
pub mod error;
pub mod favorites;
pub mod lan;
pub mod server;
pub mod server_list;
pub mod transport;
pub mod wan;

pub use error::DiscoveryError;
pub use server::ServerRecord;
pub use server_list::{ChangeEvent, ServerList, Timing};
