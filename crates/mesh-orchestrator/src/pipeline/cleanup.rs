//! Stop the job and remove its directory

use std::sync::Arc;

use anyhow::{Context, Result};

use mesh_core::config::JobSpec;
use mesh_protocol::RemoteCommand;
use mesh_remote::Connector;

use crate::fanout::HostTask;

/// Kill the job's processes and delete the job directory on one host.
///
/// Only a failed connection counts as a failure. The kill command exits
/// non-zero when nothing matched, which is the normal case for a job that
/// already finished, so its result is logged and otherwise ignored.
pub async fn cleanup_host<C: Connector>(
    connector: Arc<C>,
    job: Arc<JobSpec>,
    task: HostTask,
) -> Result<()> {
    let cancel = &task.cancel;
    let mut session = connector
        .connect(&task.cluster, &task.host, cancel)
        .await
        .context("failed to connect")?;

    let command = RemoteCommand::Cleanup {
        pattern: job.kill_pattern.clone(),
        dir: job.remote.job_dir.clone(),
    };
    let captured = session.run_and_capture(&command, cancel).await;
    if let Err(e) = captured.status {
        tracing::debug!("[{}] cleanup: {} ({})", task.host, e, captured_text(&captured.output));
    }

    session.close().await;
    Ok(())
}

fn captured_text(output: &[u8]) -> String {
    String::from_utf8_lossy(output).trim_end().to_string()
}
