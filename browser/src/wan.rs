//! Internet server list backed by a central directory
//!
//! The directory is a plain-text document with one `ip[:port]` entry per
//! line. Every refresh replaces the whole list with the directory's current
//! contents and queries each server once. Fetching runs on a spawned task so
//! the tick loop never waits on the network; a second fetch is never started
//! while one is still outstanding.

use crate::discovery::{Discovery, RefreshSchedule};
use crate::error::DiscoveryError;
use crate::server::{parse_ip_port, ServerRecord};
use crate::server_list::{ServerList, Timing};
use crate::transport::Transport;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

pub const DEFAULT_WAN_UPDATE_INTERVAL: Duration = Duration::from_secs(60);
const DIRECTORY_TIMEOUT: Duration = Duration::from_secs(10);

pub type FetchFuture = Pin<Box<dyn Future<Output = Result<String, DiscoveryError>> + Send>>;

/// Source of the raw directory document
pub trait DirectorySource: Send + Sync {
    fn fetch(&self) -> FetchFuture;
}

/// Directory served over HTTP(S)
pub struct HttpDirectory {
    client: reqwest::Client,
    url: String,
}

impl HttpDirectory {
    pub fn new(url: impl Into<String>) -> Result<Self, DiscoveryError> {
        let client = reqwest::Client::builder()
            .timeout(DIRECTORY_TIMEOUT)
            .build()?;
        Ok(Self::with_client(client, url))
    }

    /// Uses a preconfigured client, e.g. one with custom proxy settings.
    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl DirectorySource for HttpDirectory {
    fn fetch(&self) -> FetchFuture {
        let client = self.client.clone();
        let url = self.url.clone();
        Box::pin(async move {
            let response = client.get(&url).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(DiscoveryError::DirectoryStatus(status.as_u16()));
            }
            Ok(response.text().await?)
        })
    }
}

/// Parses a directory document into records, skipping lines that are not
/// strict `ip[:port]` literals and repeated identities.
pub fn parse_directory(body: &str, default_port: u16) -> Vec<ServerRecord> {
    let mut seen = HashSet::new();
    let mut servers = Vec::new();
    for line in body.lines().map(str::trim).filter(|line| !line.is_empty()) {
        let Some((address, port)) = parse_ip_port(line) else {
            debug!("Skipping directory entry {:?}", line);
            continue;
        };
        let port = port.unwrap_or(default_port);
        if seen.insert((address, port)) {
            servers.push(ServerRecord::new(address, port));
        }
    }
    servers
}

type PendingFetch = oneshot::Receiver<Result<String, DiscoveryError>>;

/// Server list refreshed from a remote directory
pub struct WanServerList<T: Transport> {
    list: ServerList<T>,
    directory: Arc<dyn DirectorySource>,
    default_port: u16,
    schedule: RefreshSchedule,
    pending: Option<PendingFetch>,
}

impl<T: Transport> WanServerList<T> {
    /// Creates an empty list; the first tick starts the initial fetch.
    pub fn new(
        transport: T,
        directory: Arc<dyn DirectorySource>,
        default_port: u16,
        timing: Timing,
        update_interval: Duration,
    ) -> Self {
        Self {
            list: ServerList::new(transport, timing),
            directory,
            default_port,
            schedule: RefreshSchedule::new(update_interval),
            pending: None,
        }
    }

    pub fn is_fetching(&self) -> bool {
        self.pending.is_some()
    }

    pub fn last_update(&self) -> Option<Instant> {
        self.schedule.last_update()
    }

    /// Replaces the list with the servers named in `body` and queries each.
    pub fn apply_directory(&mut self, body: &str, now: Instant) -> usize {
        let servers = parse_directory(body, self.default_port);
        self.list.clear();
        for server in servers {
            let (address, port) = (server.address.clone(), server.port);
            if self.list.contains(&address, port) {
                continue;
            }
            self.list.add(server);
            self.list.query(&address, port, now);
        }
        self.schedule.mark(now);
        info!("Directory listed {} servers", self.list.len());
        self.list.len()
    }

    /// Fetches the directory inline and applies it.
    ///
    /// On failure the current list is left untouched.
    pub async fn refresh(&mut self) -> Result<usize, DiscoveryError> {
        let body = self.directory.fetch().await?;
        Ok(self.apply_directory(&body, Instant::now()))
    }

    /// Applies the outcome of a finished background fetch, if any.
    fn poll_fetch(&mut self, now: Instant) {
        let Some(pending) = self.pending.as_mut() else {
            return;
        };

        let outcome = match pending.try_recv() {
            Ok(outcome) => outcome,
            Err(TryRecvError::Empty) => return,
            Err(TryRecvError::Closed) => Err(DiscoveryError::FetchCancelled),
        };
        self.pending = None;

        match outcome {
            Ok(body) => {
                self.apply_directory(&body, now);
            }
            Err(e) => {
                warn!("Keeping previous server list, {}", e);
                self.schedule.mark(now);
            }
        }
    }
}

impl<T: Transport> Discovery for WanServerList<T> {
    type Transport = T;

    fn servers(&self) -> &ServerList<T> {
        &self.list
    }

    fn servers_mut(&mut self) -> &mut ServerList<T> {
        &mut self.list
    }

    /// Starts a background fetch unless one is already running.
    fn update(&mut self, now: Instant) {
        if self.list.is_ended() {
            return;
        }
        if self.pending.is_some() {
            debug!("Directory fetch already in flight");
            return;
        }

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Cannot fetch directory without a runtime: {}", e);
                self.schedule.mark(now);
                return;
            }
        };

        let (tx, rx) = oneshot::channel();
        let fetch = self.directory.fetch();
        handle.spawn(async move {
            // Receiver is gone if the list ended meanwhile
            let _ = tx.send(fetch.await);
        });
        self.pending = Some(rx);
    }

    fn tick(&mut self, now: Instant) {
        self.list.tick(now);
        self.poll_fetch(now);
        if self.pending.is_none() && self.schedule.is_due(now) {
            self.update(now);
        }
    }

    fn end(&mut self) {
        self.pending = None;
        self.list.end();
    }
}
