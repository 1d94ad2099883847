//! Browser settings loaded from a TOML file
//!
//! ```toml
//! [network]
//! port = 62666
//! url_servers = "https://example.org/servers.txt"
//! favorites = ["10.0.0.1", "10.0.0.2:7777"]
//!
//! [polling]
//! query_interval_ms = 1000
//! ```

use crate::error::DiscoveryError;
use crate::favorites::FavoritesStore;
use crate::lan::DEFAULT_LAN_UPDATE_INTERVAL;
use crate::server_list::{Timing, DEFAULT_QUERY_INTERVAL, DEFAULT_QUERY_TIMEOUT};
use crate::wan::DEFAULT_WAN_UPDATE_INTERVAL;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub network: NetworkSettings,
    #[serde(default)]
    pub polling: PollingSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSettings {
    /// Port assumed for addresses that carry none
    #[serde(default = "default_port")]
    pub port: u16,
    /// Local address the discovery socket binds to
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Directory document listing internet servers
    #[serde(default = "default_url_servers")]
    pub url_servers: String,
    #[serde(default)]
    pub favorites: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollingSettings {
    #[serde(default = "default_query_interval")]
    pub query_interval_ms: u64,
    #[serde(default = "default_query_timeout")]
    pub query_timeout_ms: u64,
    /// Zero disables periodic directory refreshes
    #[serde(default = "default_wan_update_interval")]
    pub wan_update_interval_secs: u64,
    /// Zero disables periodic broadcasts
    #[serde(default = "default_lan_update_interval")]
    pub lan_update_interval_secs: u64,
    #[serde(default = "default_tick")]
    pub tick_ms: u64,
}

fn default_port() -> u16 {
    shared::DEFAULT_PORT
}

fn default_bind() -> String {
    "0.0.0.0:0".to_string()
}

fn default_url_servers() -> String {
    "http://localhost/servers.txt".to_string()
}

fn default_query_interval() -> u64 {
    DEFAULT_QUERY_INTERVAL.as_millis() as u64
}

fn default_query_timeout() -> u64 {
    DEFAULT_QUERY_TIMEOUT.as_millis() as u64
}

fn default_wan_update_interval() -> u64 {
    DEFAULT_WAN_UPDATE_INTERVAL.as_secs()
}

fn default_lan_update_interval() -> u64 {
    DEFAULT_LAN_UPDATE_INTERVAL.as_secs()
}

fn default_tick() -> u64 {
    50
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            url_servers: default_url_servers(),
            favorites: Vec::new(),
        }
    }
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            query_interval_ms: default_query_interval(),
            query_timeout_ms: default_query_timeout(),
            wan_update_interval_secs: default_wan_update_interval(),
            lan_update_interval_secs: default_lan_update_interval(),
            tick_ms: default_tick(),
        }
    }
}

impl PollingSettings {
    /// Query timing for the polling engine.
    ///
    /// The query interval is never shorter than one tick. Every record is
    /// polled only when the interval also covers one tick per listed server,
    /// since each tick queries the first due record in list order.
    pub fn timing(&self) -> Timing {
        Timing {
            query_interval: Duration::from_millis(self.query_interval_ms).max(self.tick()),
            query_timeout: Duration::from_millis(self.query_timeout_ms),
        }
    }

    pub fn wan_update_interval(&self) -> Duration {
        Duration::from_secs(self.wan_update_interval_secs)
    }

    pub fn lan_update_interval(&self) -> Duration {
        Duration::from_secs(self.lan_update_interval_secs)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }
}

impl Settings {
    /// Loads settings from `path`. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DiscoveryError> {
        let path = path.as_ref();
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(DiscoveryError::SettingsRead {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        toml::from_str(&contents).map_err(|source| DiscoveryError::SettingsParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), DiscoveryError> {
        let path = path.as_ref();
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents).map_err(|source| DiscoveryError::SettingsWrite {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Favorites persisted in the `[network]` section of a settings file
///
/// Saving rewrites the whole file with the in-memory settings, so other
/// sections keep the values they had when the store was created.
#[derive(Debug, Clone)]
pub struct SettingsFavorites {
    path: PathBuf,
    settings: Settings,
}

impl SettingsFavorites {
    pub fn new(path: impl Into<PathBuf>, settings: Settings) -> Self {
        Self {
            path: path.into(),
            settings,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

impl FavoritesStore for SettingsFavorites {
    fn load(&self) -> Result<Vec<String>, DiscoveryError> {
        Ok(self.settings.network.favorites.clone())
    }

    fn save(&mut self, favorites: &[String]) -> Result<(), DiscoveryError> {
        let mut settings = self.settings.clone();
        settings.network.favorites = favorites.to_vec();
        settings.save(&self.path)?;
        self.settings = settings;
        Ok(())
    }
}
