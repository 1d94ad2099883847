//! User-curated server list
//!
//! Favorites change only through explicit `add`, `remove` and `clear`
//! calls. The raw strings the user typed are persisted through a
//! `FavoritesStore`; the list itself never discovers or forgets servers.

use crate::discovery::Discovery;
use crate::error::DiscoveryError;
use crate::server::ServerRecord;
use crate::server_list::{ServerList, Timing};
use crate::transport::Transport;
use log::{debug, info};
use std::time::Instant;

/// Persistence for favorite address strings
pub trait FavoritesStore {
    fn load(&self) -> Result<Vec<String>, DiscoveryError>;
    fn save(&mut self, favorites: &[String]) -> Result<(), DiscoveryError>;
}

/// Favorites kept only for the lifetime of the process
#[derive(Debug, Default, Clone)]
pub struct MemoryFavorites {
    pub favorites: Vec<String>,
}

impl MemoryFavorites {
    pub fn new(favorites: Vec<String>) -> Self {
        Self { favorites }
    }
}

impl FavoritesStore for MemoryFavorites {
    fn load(&self) -> Result<Vec<String>, DiscoveryError> {
        Ok(self.favorites.clone())
    }

    fn save(&mut self, favorites: &[String]) -> Result<(), DiscoveryError> {
        self.favorites = favorites.to_vec();
        Ok(())
    }
}

pub struct FavoriteServerList<T: Transport, S: FavoritesStore> {
    list: ServerList<T>,
    store: S,
    favorites: Vec<String>,
    default_port: u16,
}

impl<T: Transport, S: FavoritesStore> FavoriteServerList<T, S> {
    /// Loads the persisted favorites and queries each of them.
    pub fn open(
        transport: T,
        store: S,
        default_port: u16,
        timing: Timing,
        now: Instant,
    ) -> Result<Self, DiscoveryError> {
        let favorites = store.load()?;
        let mut list = Self {
            list: ServerList::new(transport, timing),
            store,
            favorites,
            default_port,
        };

        for entry in list.favorites.clone() {
            list.track(&entry, now);
        }
        debug!("Loaded {} favorites", list.favorites.len());
        Ok(list)
    }

    /// Persisted favorite strings, in the order they were added.
    pub fn favorites(&self) -> &[String] {
        &self.favorites
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Adds a server given as `address` or `address:port` and queries it.
    ///
    /// Nothing changes if the store rejects the new favorites.
    pub fn add(&mut self, entry: &str, now: Instant) -> Result<(), DiscoveryError> {
        let mut favorites = self.favorites.clone();
        favorites.push(entry.to_string());
        self.store.save(&favorites)?;

        self.favorites = favorites;
        self.track(entry, now);
        info!("Added favorite {}", entry);
        Ok(())
    }

    /// Removes the server `entry` names and the first matching persisted
    /// string. Returns whether the string was persisted.
    ///
    /// When the store rejects the shortened favorites the server stays
    /// listed.
    pub fn remove(&mut self, entry: &str) -> Result<bool, DiscoveryError> {
        let server = ServerRecord::parse(entry, self.default_port);

        let Some(index) = self.favorites.iter().position(|f| f == entry) else {
            debug!("{} is not a persisted favorite", entry);
            self.list.remove(&server);
            return Ok(false);
        };
        let mut favorites = self.favorites.clone();
        favorites.remove(index);
        self.store.save(&favorites)?;

        self.favorites = favorites;
        self.list.remove(&server);
        info!("Removed favorite {}", entry);
        Ok(true)
    }

    /// Forgets every favorite once the store accepts the empty list.
    pub fn clear(&mut self) -> Result<(), DiscoveryError> {
        self.store.save(&[])?;
        self.favorites.clear();
        self.list.clear();
        Ok(())
    }

    fn track(&mut self, entry: &str, now: Instant) {
        let server = ServerRecord::parse(entry, self.default_port);
        let (address, port) = (server.address.clone(), server.port);
        self.list.add(server);
        self.list.query(&address, port, now);
    }
}

impl<T: Transport, S: FavoritesStore> Discovery for FavoriteServerList<T, S> {
    type Transport = T;

    fn servers(&self) -> &ServerList<T> {
        &self.list
    }

    fn servers_mut(&mut self) -> &mut ServerList<T> {
        &mut self.list
    }

    /// Re-queries every favorite.
    fn update(&mut self, now: Instant) {
        let targets: Vec<(String, u16)> = self
            .list
            .iter()
            .map(|s| (s.address.clone(), s.port))
            .collect();
        for (address, port) in targets {
            self.list.query(&address, port, now);
        }
    }
}
