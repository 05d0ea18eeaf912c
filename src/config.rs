//! Configuration for lfs-store
//!
//! Centralized configuration with sensible defaults. A `Config` is built once
//! at startup and handed to `ContentStore::open` / `Bucket::open`; nothing
//! reads configuration from global state.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use url::Url;

use crate::error::{Result, StoreError};

/// Main configuration for a store instance
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Target Configuration
    // -------------------------------------------------------------------------
    /// Where objects live. Resolved once; backends never re-resolve it.
    pub target: StorageTarget,

    // -------------------------------------------------------------------------
    // Local Backend Configuration
    // -------------------------------------------------------------------------
    /// Permission bits for directories the local backend creates (unix only)
    pub dir_mode: u32,

    // -------------------------------------------------------------------------
    // Remote Backend Configuration
    // -------------------------------------------------------------------------
    pub remote: RemoteOptions,
}

/// Storage target: a local directory or a remote bucket under a key prefix
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StorageTarget {
    /// Absolute directory on the local filesystem
    Local { root: PathBuf },

    /// HTTP(S) bucket; every key is stored under `prefix`
    Remote {
        bucket_url: Url,
        #[serde(default)]
        prefix: String,
    },
}

/// Tunables for the remote backend
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RemoteOptions {
    /// Whole-request timeout (milliseconds, 0 = none)
    pub timeout_ms: u64,

    /// Connect timeout (milliseconds, 0 = none)
    pub connect_timeout_ms: u64,

    /// Honour HTTP_PROXY / HTTPS_PROXY / NO_PROXY from the environment
    pub use_env_proxy: bool,
}

impl Default for RemoteOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 0,
            connect_timeout_ms: 10_000,
            use_env_proxy: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target: StorageTarget::Local {
                root: PathBuf::from("./lfs_data"),
            },
            dir_mode: 0o700,
            remote: RemoteOptions::default(),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Parse a TOML document into a config
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| StoreError::Config(e.to_string()))
    }

    /// Read and parse a TOML config file
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

impl StorageTarget {
    /// Local directory target
    pub fn local(root: impl Into<PathBuf>) -> Self {
        StorageTarget::Local { root: root.into() }
    }

    /// Remote bucket target under `prefix`
    pub fn remote(bucket_url: &str, prefix: impl Into<String>) -> Result<Self> {
        let bucket_url = parse_url(bucket_url)?;
        Ok(StorageTarget::Remote {
            bucket_url,
            prefix: normalize_prefix(&prefix.into()),
        })
    }

    /// Pick a target from a base path and the configured bucket URL
    ///
    /// An absolute `base_path` is a local root. Otherwise `base_path` is a
    /// prefix inside `bucket_url`; a `file://` bucket is still local.
    pub fn resolve(base_path: impl AsRef<Path>, bucket_url: &str) -> Result<Self> {
        let base_path = base_path.as_ref();
        if base_path.is_absolute() {
            return Ok(Self::local(base_path));
        }

        let url = parse_url(bucket_url)?;
        match url.scheme() {
            "file" => {
                let dir = url.to_file_path().map_err(|_| {
                    StoreError::Config(format!("file bucket url has no local path: {url}"))
                })?;
                Ok(Self::local(dir.join(base_path)))
            }
            "http" | "https" => Ok(StorageTarget::Remote {
                bucket_url: url,
                prefix: normalize_prefix(&base_path.to_string_lossy()),
            }),
            other => Err(StoreError::Config(format!(
                "unsupported bucket scheme: {other}"
            ))),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, StorageTarget::Local { .. })
    }
}

fn parse_url(s: &str) -> Result<Url> {
    Url::parse(s).map_err(|e| StoreError::Config(format!("invalid bucket url {s:?}: {e}")))
}

fn normalize_prefix(prefix: &str) -> String {
    prefix
        .split(['/', '\\'])
        .filter(|s| !s.is_empty() && *s != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the storage target
    pub fn target(mut self, target: StorageTarget) -> Self {
        self.config.target = target;
        self
    }

    /// Shorthand for a local directory target
    pub fn local_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.target = StorageTarget::local(root);
        self
    }

    /// Set the permission bits for created directories
    pub fn dir_mode(mut self, mode: u32) -> Self {
        self.config.dir_mode = mode;
        self
    }

    /// Set the remote request timeout (in milliseconds)
    pub fn remote_timeout_ms(mut self, ms: u64) -> Self {
        self.config.remote.timeout_ms = ms;
        self
    }

    /// Set the remote connect timeout (in milliseconds)
    pub fn remote_connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.remote.connect_timeout_ms = ms;
        self
    }

    /// Enable or disable environment proxy settings for the remote backend
    pub fn remote_env_proxy(mut self, enabled: bool) -> Self {
        self.config.remote.use_env_proxy = enabled;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
