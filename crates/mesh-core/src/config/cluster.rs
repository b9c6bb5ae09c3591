//! Cluster definitions

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::serde_utils::duration_secs;
use crate::error::ConfigError;
use crate::types::Host;

/// SSH port used when a cluster does not set one
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Dial timeout used when a cluster does not set one
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// A named group of hosts sharing connection parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    /// Name under which the cluster is defined; filled in on load
    #[serde(skip)]
    pub name: String,

    /// Login user on every host
    pub user: String,

    /// Private key used to authenticate
    pub identity_file: PathBuf,

    /// Hosts in rank order
    #[serde(default)]
    pub hosts: Vec<Host>,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_connect_timeout", with = "duration_secs")]
    pub connect_timeout: Duration,
}

fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

impl Cluster {
    /// Create a cluster with default port and timeout
    pub fn new(
        name: impl Into<String>,
        user: impl Into<String>,
        identity_file: impl Into<PathBuf>,
        hosts: Vec<Host>,
    ) -> Self {
        Self {
            name: name.into(),
            user: user.into(),
            identity_file: identity_file.into(),
            hosts,
            port: DEFAULT_SSH_PORT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Identity file path with a leading `~/` expanded to the home directory
    pub fn identity_path(&self) -> PathBuf {
        expand_home(&self.identity_file)
    }

    /// Check the load-time invariants, returning the reason on failure
    pub fn validate(&self) -> Result<(), String> {
        if self.hosts.is_empty() {
            return Err(format!(
                "expected cluster {} to have at least 1 IP got 0",
                self.name
            ));
        }
        if let Some(host) = self.hosts.iter().find(|h| !h.is_ip()) {
            return Err(format!(
                "invalid IP address {} in cluster {}",
                host, self.name
            ));
        }
        Ok(())
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

/// All clusters defined in a cluster file, keyed by name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterMap(BTreeMap<String, Cluster>);

impl ClusterMap {
    /// Parse a cluster file and drop clusters that fail validation
    pub fn from_yaml(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let raw: BTreeMap<String, Cluster> =
            serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let mut clusters = BTreeMap::new();
        for (name, mut cluster) in raw {
            cluster.name = name.clone();
            match cluster.validate() {
                Ok(()) => {
                    tracing::info!(
                        "parsed cluster {} with {} hosts",
                        name,
                        cluster.hosts.len()
                    );
                    clusters.insert(name, cluster);
                }
                Err(reason) => tracing::error!("{}", reason),
            }
        }

        let map = Self(clusters);
        tracing::info!("available clusters: {:?}", map.names());
        Ok(map)
    }

    /// Look up a cluster by name
    pub fn get(&self, name: &str) -> Result<&Cluster, ConfigError> {
        self.0.get(name).ok_or_else(|| ConfigError::ClusterNotFound {
            name: name.to_string(),
            available: self.names(),
        })
    }

    /// Cluster names in sorted order
    pub fn names(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cluster> {
        self.0.values()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
