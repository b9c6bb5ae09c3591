//! Configuration management for mesh

mod cluster;
mod job;
pub mod serde_utils;

pub use cluster::{Cluster, ClusterMap, DEFAULT_CONNECT_TIMEOUT, DEFAULT_SSH_PORT};
pub use job::{JobSpec, DEFAULT_KILL_PATTERN};

use crate::error::ConfigError;
use std::path::{Path, PathBuf};

/// Environment variable overriding the cluster file location
pub const CLUSTERS_ENV: &str = "MESH_CLUSTERS";

/// Default job spec path, relative to the working directory
pub const DEFAULT_JOB_PATH: &str = "mesh.yaml";

/// Get the default configuration directory
///
/// `~/.config/mesh` on unix-like systems, the platform config directory
/// elsewhere.
pub fn default_config_dir() -> PathBuf {
    if cfg!(windows) {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mesh")
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("mesh")
    }
}

/// Get the default cluster file path
pub fn default_cluster_path() -> PathBuf {
    default_config_dir().join("cluster.yaml")
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Load and validate the cluster file
pub fn load_clusters(path: &Path) -> Result<ClusterMap, ConfigError> {
    let content = read_file(path)?;
    ClusterMap::from_yaml(&content, path)
}

/// Load the job spec
pub fn load_job(path: &Path) -> Result<JobSpec, ConfigError> {
    let content = read_file(path)?;
    JobSpec::from_yaml(&content, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_paths_end_with_mesh() {
        let path = default_cluster_path();
        assert!(path.ends_with("mesh/cluster.yaml"));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cluster.yaml");
        assert!(matches!(
            load_clusters(&path),
            Err(ConfigError::NotFound(p)) if p == path
        ));
        assert!(matches!(load_job(&path), Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let cluster_path = dir.path().join("cluster.yaml");
        let mut file = std::fs::File::create(&cluster_path).unwrap();
        writeln!(
            file,
            "tpu:\n  user: ops\n  identity_file: /keys/id\n  hosts: [10.0.0.1]"
        )
        .unwrap();

        let job_path = dir.path().join("mesh.yaml");
        std::fs::write(&job_path, "ignore: ['*.log']\n").unwrap();

        let clusters = load_clusters(&cluster_path).unwrap();
        assert_eq!(clusters.len(), 1);
        let job = load_job(&job_path).unwrap();
        assert_eq!(job.ignore, vec!["*.log"]);
    }
}
