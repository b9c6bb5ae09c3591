//! Run command implementation

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use mesh_orchestrator::pipeline::{cleanup_host, run_host, RunPlan};
use mesh_orchestrator::{EventSink, FanOut};
use mesh_remote::SshConnector;

use super::{host_label, ConfigPaths};
use crate::output::{print_header, print_info, print_success, spawn_event_printer};

/// Execute the run command.
///
/// Launches the job everywhere and follows the first host's log. When every
/// host launched successfully (including after Ctrl+C stops the log), the
/// job is killed and its directory removed on every host.
pub async fn run_command(
    paths: &ConfigPaths,
    cluster_name: &str,
    command: &[String],
    workspace: Option<PathBuf>,
) -> Result<()> {
    let cluster = paths.load_cluster(cluster_name)?;
    let job = paths.load_job()?;
    let workspace = match workspace {
        Some(dir) => dir,
        None => std::env::current_dir().context("failed to determine working directory")?,
    };
    if !workspace.is_dir() {
        bail!("workspace {} is not a directory", workspace.display());
    }

    let command = command.join(" ");
    print_info(&format!("Running command: {}", command));
    print_header(&format!(
        "Launching run on '{}' ({} {}) with command '{}'",
        cluster_name,
        cluster.hosts.len(),
        host_label(cluster.hosts.len()),
        command
    ));

    let (events, rx) = EventSink::channel();
    let printer = spawn_event_printer(rx);
    let connector = Arc::new(SshConnector::new());
    let plan = Arc::new(RunPlan {
        command,
        workspace,
        job: job.clone(),
    });
    let job = Arc::new(job);

    let report = FanOut::new(Arc::clone(&cluster), "Run")
        .with_events(events.clone())
        .run(|task| run_host(Arc::clone(&connector), Arc::clone(&plan), task, io::stdout()))
        .await;

    let result = if !report.is_success() {
        Err(anyhow::anyhow!(
            "run failed on {} of {} hosts",
            report.failure_count(),
            report.outcomes.len()
        ))
    } else {
        let cleanup = FanOut::new(Arc::clone(&cluster), "Cleanup")
            .with_events(events.clone())
            .run(|task| cleanup_host(Arc::clone(&connector), Arc::clone(&job), task))
            .await;
        if cleanup.is_success() {
            Ok(())
        } else {
            Err(anyhow::anyhow!(
                "cleanup failed on {} of {} hosts",
                cleanup.failure_count(),
                cleanup.outcomes.len()
            ))
        }
    };

    drop(events);
    let _ = printer.await;
    result?;
    print_success(&format!("Run completed on {}", cluster_name));
    Ok(())
}
