//! Watch command implementation

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use mesh_orchestrator::pipeline::{collect_metrics, ClusterTpuMetrics};
use mesh_orchestrator::{EventSink, FanOut, InterruptGuard};
use mesh_remote::SshConnector;

use super::ConfigPaths;
use crate::output::{clear_screen, format_host_table, print_header, print_summary, wall_clock};

/// Execute the watch command.
///
/// Polls every host, redraws the dashboard, and repeats every `interval`
/// until interrupted. With `once`, draws a single frame without clearing
/// the screen.
pub async fn watch_command(
    paths: &ConfigPaths,
    cluster_name: &str,
    interval: Duration,
    once: bool,
) -> Result<()> {
    let cluster = paths.load_cluster(cluster_name)?;
    let connector = Arc::new(SshConnector::new());

    let cancel = CancellationToken::new();
    let _guard = InterruptGuard::install(cancel.clone(), EventSink::none());

    loop {
        let report = FanOut::new(Arc::clone(&cluster), "Watch")
            .run_with_token(cancel.clone(), |task| collect_metrics(Arc::clone(&connector), task))
            .await;
        if cancel.is_cancelled() {
            break;
        }

        let metrics = ClusterTpuMetrics::from_report(report);
        if !once {
            clear_screen();
        }
        print_header(&format!("TPU Cluster '{}' - {}", cluster_name, wall_clock()));
        println!();
        print_summary(&metrics);
        println!("{}", format_host_table(&metrics));

        if once {
            break;
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    tracing::debug!("stopped watching cluster {}", cluster_name);
    Ok(())
}
