//! Teleport configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use conductor_pool::{Buckets, StorageConfig};
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{TeleportError, TeleportResult};
use crate::teleporter::{HttpTeleporter, LocalTeleporter, Teleporter};

/// Where merges run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeleportMode {
    /// In the deploying process.
    #[default]
    Local,
    /// On a remote `conductor-teleport` service.
    Http,
}

/// The `[teleport]` section of the deploy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeleportConfig {
    /// Whether large units are teleported at all.
    #[serde(default)]
    pub enabled: bool,

    /// Where merges run.
    #[serde(default)]
    pub mode: TeleportMode,

    /// Base URL of the teleport service, for `http` mode.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Teleport units with at least this many fragments.
    #[serde(default = "default_min_fragments")]
    pub min_fragments: usize,

    /// Teleport units with at least this many content bytes.
    #[serde(default = "default_min_bytes")]
    pub min_bytes: u64,

    /// Request timeout for the remote merge, in seconds. Unset means the
    /// request waits as long as the service takes.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

const fn default_min_fragments() -> usize {
    8
}

const fn default_min_bytes() -> u64 {
    16 * 1024 * 1024
}

impl Default for TeleportConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: TeleportMode::default(),
            endpoint: None,
            min_fragments: default_min_fragments(),
            min_bytes: default_min_bytes(),
            timeout_secs: None,
        }
    }
}

impl TeleportConfig {
    /// Whether a unit of this shape should be teleported.
    #[must_use]
    pub fn applies_to(&self, fragments: usize, content_bytes: u64) -> bool {
        self.enabled && (fragments >= self.min_fragments || content_bytes >= self.min_bytes)
    }

    /// Build the configured teleporter.
    pub fn teleporter(&self, buckets: &Buckets) -> TeleportResult<Arc<dyn Teleporter>> {
        match self.mode {
            TeleportMode::Local => Ok(Arc::new(LocalTeleporter::new(buckets.clone()))),
            TeleportMode::Http => {
                let endpoint = self.endpoint.as_deref().ok_or_else(|| {
                    TeleportError::Config("teleport mode is http but no endpoint is set".to_owned())
                })?;
                Ok(Arc::new(HttpTeleporter::new(
                    endpoint,
                    self.timeout_secs.map(Duration::from_secs),
                )?))
            }
        }
    }
}

/// Configuration for the `conductor-teleport` service.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Address to listen on.
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Object storage backing every bucket.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Buckets the service serves.
    #[serde(default = "default_buckets")]
    pub buckets: Vec<String>,
}

fn default_listen() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8790)
}

fn default_buckets() -> Vec<String> {
    vec!["conductor-artifacts".to_owned()]
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            storage: StorageConfig::default(),
            buckets: default_buckets(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from the default sources.
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. `teleport.toml` in the current directory (if present)
    /// 3. Environment variables with `CONDUCTOR_TELEPORT_` prefix
    pub fn load() -> TeleportResult<Self> {
        Ok(Figment::new()
            .merge(Toml::file("teleport.toml"))
            .merge(Env::prefixed("CONDUCTOR_TELEPORT_").split("__"))
            .extract()?)
    }

    /// Load configuration from a specific TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> TeleportResult<Self> {
        Ok(Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("CONDUCTOR_TELEPORT_").split("__"))
            .extract()?)
    }

    /// Build the bucket registry the service serves.
    pub fn buckets(&self) -> TeleportResult<Buckets> {
        Ok(Buckets::from_config(
            &self.storage,
            self.buckets.iter().map(String::as_str),
        )?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_apply_only_when_enabled() {
        let mut config = TeleportConfig {
            min_fragments: 4,
            min_bytes: 1000,
            ..TeleportConfig::default()
        };
        assert!(!config.applies_to(10, 10_000));

        config.enabled = true;
        assert!(config.applies_to(4, 0));
        assert!(config.applies_to(1, 1000));
        assert!(!config.applies_to(3, 999));
    }

    #[test]
    fn http_mode_requires_endpoint() {
        let config = TeleportConfig {
            enabled: true,
            mode: TeleportMode::Http,
            ..TeleportConfig::default()
        };
        assert!(matches!(
            config.teleporter(&Buckets::new()),
            Err(TeleportError::Config(_))
        ));
    }

    #[test]
    fn service_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("teleport.toml");
        std::fs::write(
            &path,
            r#"
            listen = "127.0.0.1:9000"
            buckets = ["pool", "code"]

            [storage]
            storage_type = "memory"
            "#,
        )
        .unwrap();

        let config = ServiceConfig::from_file(&path).unwrap();
        assert_eq!(config.listen.port(), 9000);
        assert_eq!(config.storage.storage_type, "memory");

        let buckets = config.buckets().unwrap();
        assert!(buckets.contains("pool"));
        assert!(buckets.contains("code"));
    }
}
