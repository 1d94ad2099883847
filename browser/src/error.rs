use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the server browser.
///
/// Protocol conditions (timeouts, unknown replies, bad directory lines) are
/// handled inside the lists and never show up here.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The discovery socket could not be bound.
    #[error("failed to bind discovery socket on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The transport was closed or its sender task is gone.
    #[error("transport closed")]
    TransportClosed,

    /// The directory request itself failed.
    #[error("directory fetch failed: {0}")]
    Directory(#[from] reqwest::Error),

    /// The directory answered with a non-success status.
    #[error("directory returned HTTP {0}")]
    DirectoryStatus(u16),

    /// A spawned directory fetch ended without delivering a result.
    #[error("directory fetch was cancelled")]
    FetchCancelled,

    #[error("failed to read settings file {path}: {source}")]
    SettingsRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings file {path}: {source}")]
    SettingsParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize settings: {0}")]
    SettingsEncode(#[from] toml::ser::Error),

    #[error("failed to write settings file {path}: {source}")]
    SettingsWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
