//! Clusters command implementation

use anyhow::Result;

use super::ConfigPaths;
use crate::output::{format_clusters, print_error};

/// Execute the clusters command
pub fn clusters_command(paths: &ConfigPaths) -> Result<()> {
    let clusters = match paths.load_clusters() {
        Ok(c) => c,
        Err(e) => {
            print_error(&format!("Cluster file: {}", paths.clusters.display()));
            return Err(e);
        }
    };

    println!("{}", format_clusters(&clusters));
    Ok(())
}
