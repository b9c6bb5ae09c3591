//! Run the job spec's setup commands

use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};

use mesh_core::config::JobSpec;
use mesh_protocol::RemoteCommand;
use mesh_remote::Connector;

use crate::fanout::HostTask;

/// Run every setup command on one host, in order, stopping at the first
/// failure. Command output is discarded.
pub async fn setup_host<C: Connector>(
    connector: Arc<C>,
    job: Arc<JobSpec>,
    task: HostTask,
) -> Result<()> {
    let mut session = connector
        .connect(&task.cluster, &task.host, &task.cancel)
        .await
        .context("failed to connect")?;

    let mut result = Ok(());
    for (i, command) in job.commands.iter().enumerate() {
        let step = session
            .exec(
                &RemoteCommand::Raw(command.clone()),
                &mut io::sink(),
                &mut io::sink(),
                &task.cancel,
            )
            .await
            .with_context(|| format!("failed to execute '{}'", command));
        if let Err(e) = step {
            result = Err(e);
            break;
        }
        task.progress(format!("{}/{} {}", i + 1, job.commands.len(), command));
    }

    session.close().await;
    result
}
