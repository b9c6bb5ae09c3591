//! CLI command implementations

mod clusters;
mod run;
mod setup;
mod watch;

pub use clusters::clusters_command;
pub use run::run_command;
pub use setup::setup_command;
pub use watch::watch_command;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use mesh_core::config::{self, Cluster, ClusterMap, JobSpec};

/// Where the cluster file and the job spec are read from
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub clusters: PathBuf,
    pub job: PathBuf,
}

impl ConfigPaths {
    pub fn new(clusters: Option<PathBuf>, job: Option<PathBuf>) -> Self {
        Self {
            clusters: clusters.unwrap_or_else(config::default_cluster_path),
            job: job.unwrap_or_else(|| PathBuf::from(config::DEFAULT_JOB_PATH)),
        }
    }

    pub fn load_clusters(&self) -> Result<ClusterMap> {
        config::load_clusters(&self.clusters).context("failed to load cluster file")
    }

    /// Resolve one cluster by name
    pub fn load_cluster(&self, name: &str) -> Result<Arc<Cluster>> {
        let clusters = self.load_clusters()?;
        let cluster = clusters.get(name)?;
        Ok(Arc::new(cluster.clone()))
    }

    pub fn load_job(&self) -> Result<JobSpec> {
        config::load_job(&self.job).context("failed to load job spec")
    }
}

fn host_label(count: usize) -> &'static str {
    if count == 1 {
        "host"
    } else {
        "hosts"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_missing_cluster_lists_available() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cluster.yaml");
        fs::write(
            &path,
            "dev:\n  user: ops\n  identity_file: /keys/id\n  hosts: [10.0.0.1]\n",
        )
        .unwrap();

        let paths = ConfigPaths::new(Some(path), None);
        assert_eq!(paths.load_cluster("dev").unwrap().hosts.len(), 1);

        let err = paths.load_cluster("prod").unwrap_err();
        assert_eq!(err.to_string(), "cluster 'prod' not found (available: dev)");
    }

    #[test]
    fn test_missing_files_have_context() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ConfigPaths::new(
            Some(dir.path().join("none.yaml")),
            Some(dir.path().join("mesh.yaml")),
        );
        let err = paths.load_clusters().unwrap_err();
        assert!(format!("{:#}", err).starts_with("failed to load cluster file: config file not found"));
        let err = paths.load_job().unwrap_err();
        assert!(format!("{:#}", err).starts_with("failed to load job spec"));
    }

    #[test]
    fn test_host_label() {
        assert_eq!(host_label(1), "host");
        assert_eq!(host_label(4), "hosts");
    }
}
