//! Setup command implementation

use std::sync::Arc;

use anyhow::{bail, Result};

use mesh_orchestrator::pipeline::setup_host;
use mesh_orchestrator::{EventSink, FanOut};
use mesh_remote::SshConnector;

use super::{host_label, ConfigPaths};
use crate::output::{print_header, print_info, print_success, spawn_event_printer};

/// Execute the setup command
pub async fn setup_command(paths: &ConfigPaths, cluster_name: &str) -> Result<()> {
    let cluster = paths.load_cluster(cluster_name)?;
    let job = Arc::new(paths.load_job()?);

    if job.commands.is_empty() {
        print_info(&format!("No commands to run in {}", paths.job.display()));
        return Ok(());
    }

    print_header(&format!(
        "Setting up cluster '{}' ({} {})",
        cluster_name,
        cluster.hosts.len(),
        host_label(cluster.hosts.len())
    ));

    let (events, rx) = EventSink::channel();
    let printer = spawn_event_printer(rx);
    let connector = Arc::new(SshConnector::new());

    let report = FanOut::new(Arc::clone(&cluster), "Setup")
        .with_events(events)
        .run(|task| setup_host(Arc::clone(&connector), Arc::clone(&job), task))
        .await;
    let _ = printer.await;

    if !report.is_success() {
        bail!("setup failed on {} of {} hosts", report.failure_count(), report.outcomes.len());
    }
    print_success(&format!("Cluster '{}' setup complete", cluster_name));
    Ok(())
}
