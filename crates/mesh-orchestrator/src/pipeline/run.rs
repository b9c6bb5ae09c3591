//! Push the workspace, launch the job, stream its log

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use mesh_core::config::JobSpec;
use mesh_protocol::RemoteCommand;
use mesh_remote::{build_archive, Connector, IgnoreSet, Session};

use crate::fanout::HostTask;
use crate::output::AttributedSink;

/// What a run ships and executes
#[derive(Debug, Clone)]
pub struct RunPlan {
    /// Job command line, run on every host with its rank exported
    pub command: String,
    /// Local directory archived and extracted into the job directory
    pub workspace: PathBuf,
    pub job: JobSpec,
}

/// Run the job on one host.
///
/// Steps, strictly in order: connect, clear the job directory, stream the
/// workspace, run the pre-run commands, create the log, launch the job
/// detached, then tail its log into `dest` (labelled, and shown only for
/// the representative host). Cancellation while tailing is a normal end.
pub async fn run_host<C, W>(
    connector: Arc<C>,
    plan: Arc<RunPlan>,
    task: HostTask,
    dest: W,
) -> Result<()>
where
    C: Connector,
    W: Write + Send,
{
    let mut session = connector
        .connect(&task.cluster, &task.host, &task.cancel)
        .await
        .context("failed to connect")?;

    let mut sink = AttributedSink::new(
        format!("[{}] ", task.host),
        dest,
        task.is_representative(),
    );
    let result = run_steps(&session, &plan, &task, &mut sink).await;

    session.close().await;
    if let Err(e) = sink.finish() {
        tracing::debug!("[{}] flushing output: {}", task.host, e);
    }
    result
}

async fn run_steps<T, W>(
    session: &Session<T>,
    plan: &RunPlan,
    task: &HostTask,
    sink: &mut AttributedSink<W>,
) -> Result<()>
where
    T: mesh_core::traits::Transport,
    W: Write + Send,
{
    let layout = &plan.job.remote;
    let cancel = &task.cancel;

    session
        .exec(
            &RemoteCommand::PrepareDir {
                dir: layout.job_dir.clone(),
            },
            &mut io::sink(),
            &mut io::sink(),
            cancel,
        )
        .await
        .context("failed to prepare job directory")?;

    let archive = build_archive(&plan.workspace, IgnoreSet::new(&plan.job.ignore));
    session
        .send_archive(archive, layout, cancel)
        .await
        .context("failed to send files")?;
    task.progress("Directory built and copied");

    for command in &plan.job.prerun {
        session
            .exec_merged(
                &RemoteCommand::InDir {
                    dir: layout.job_dir.clone(),
                    command: command.clone(),
                },
                &mut *sink,
                cancel,
            )
            .await
            .with_context(|| format!("failed to execute '{}'", command))?;
    }

    session
        .exec(
            &RemoteCommand::Touch {
                path: layout.log_path(),
            },
            &mut io::sink(),
            &mut io::sink(),
            cancel,
        )
        .await
        .context("failed to create log file")?;

    let job = RemoteCommand::Job {
        dir: layout.job_dir.clone(),
        command: plan.command.clone(),
        rank: task.index,
        log: layout.log_file.clone(),
    };
    session
        .exec_detached(&job, cancel)
        .await
        .context("failed to launch command")?;
    task.progress("Command launched");

    match session.tail(&layout.log_path(), &mut *sink, cancel).await {
        Ok(()) => Ok(()),
        Err(e) if e.is_cancelled() => {
            tracing::info!("[{}] stopped following logs", task.host);
            Ok(())
        }
        Err(e) => Err(e).context("failed to tail logs"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Read;
    use std::time::Duration;

    use mesh_core::config::Cluster;
    use mesh_core::types::Host;
    use mesh_remote::mock::{MockCommand, MockConnector};
    use tokio_util::sync::CancellationToken;

    use crate::events::EventSink;
    use crate::fanout::FanOut;

    fn cluster() -> Arc<Cluster> {
        Arc::new(Cluster::new(
            "tpu",
            "ops",
            "/keys/id",
            vec![Host::new("10.0.0.1"), Host::new("10.0.0.2")],
        ))
    }

    fn plan(workspace: &std::path::Path) -> Arc<RunPlan> {
        Arc::new(RunPlan {
            command: "python train.py".into(),
            workspace: workspace.to_path_buf(),
            job: JobSpec {
                prerun: vec!["echo ready".into()],
                ignore: vec!["*.log".into()],
                ..JobSpec::default()
            },
        })
    }

    fn workspace() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("train.py"), "print('hi')\n").unwrap();
        fs::write(dir.path().join("old.log"), "stale\n").unwrap();
        fs::create_dir(dir.path().join("data")).unwrap();
        fs::write(dir.path().join("data/debug.log"), "stale\n").unwrap();
        fs::write(dir.path().join("data/x.csv"), "1,2\n").unwrap();
        dir
    }

    fn archive_names(bytes: &[u8]) -> Vec<String> {
        let mut archive = tar::Archive::new(bytes);
        archive
            .entries()
            .unwrap()
            .map(|e| {
                let mut e = e.unwrap();
                let name = e.path().unwrap().to_string_lossy().trim_end_matches('/').to_string();
                let mut body = Vec::new();
                e.read_to_end(&mut body).unwrap();
                name
            })
            .collect()
    }

    #[tokio::test]
    async fn test_run_end_to_end() {
        let dir = workspace();
        let connector = Arc::new(
            MockConnector::new()
                .on("cat >", MockCommand::exit(0).wait_for_eof())
                .on("echo ready", MockCommand::exit(0).stdout("ready\n"))
                .on("tail -f", MockCommand::exit(0).stdout("step 1\nstep 2\n")),
        );
        let plan = plan(dir.path());
        let cluster = cluster();

        let shown = Arc::new(std::sync::Mutex::new(Vec::new()));
        struct Shared(Arc<std::sync::Mutex<Vec<u8>>>);
        impl Write for Shared {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let report = FanOut::new(Arc::clone(&cluster), "Run")
            .run_with_token(CancellationToken::new(), |task| {
                run_host(
                    Arc::clone(&connector),
                    Arc::clone(&plan),
                    task,
                    Shared(Arc::clone(&shown)),
                )
            })
            .await;

        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.failure_count(), 0);

        for (rank, host) in cluster.hosts.iter().enumerate() {
            let transport = connector.transport(host).unwrap();
            let commands = transport.commands();
            assert_eq!(
                commands,
                vec![
                    "mkdir -p job && rm -rf job/*".to_string(),
                    "cat > job/mesh.tar && cd job && tar -xf mesh.tar".to_string(),
                    "cd job && echo ready".to_string(),
                    "touch job/output.log".to_string(),
                    format!(
                        "setsid sh -c 'cd job && RANK={} python train.py > output.log 2>&1' > /dev/null 2>&1 < /dev/null &",
                        rank
                    ),
                    "tail -f job/output.log".to_string(),
                ]
            );

            let upload = &transport.execs()[1];
            assert!(upload.eof);
            assert_eq!(archive_names(&upload.stdin), vec!["data", "data/x.csv", "train.py"]);
            assert_eq!(transport.disconnects(), 1);
        }

        let shown = String::from_utf8(shown.lock().unwrap().clone()).unwrap();
        assert_eq!(
            shown,
            "[10.0.0.1] ready\n[10.0.0.1] step 1\n[10.0.0.1] step 2\n"
        );
    }

    #[tokio::test]
    async fn test_unreachable_host_fails_alone() {
        let dir = workspace();
        let connector = Arc::new(
            MockConnector::new()
                .on("cat >", MockCommand::exit(0).wait_for_eof())
                .unreachable("10.0.0.2"),
        );
        let plan = plan(dir.path());

        let report = FanOut::new(cluster(), "Run")
            .run_with_token(CancellationToken::new(), |task| {
                run_host(Arc::clone(&connector), Arc::clone(&plan), task, io::sink())
            })
            .await;

        assert_eq!(report.failure_count(), 1);
        let (host, err) = report.failures().next().unwrap();
        assert_eq!(host.as_str(), "10.0.0.2");
        assert!(format!("{:#}", err).starts_with("failed to connect"));
    }

    #[tokio::test]
    async fn test_failed_prerun_stops_host() {
        let dir = workspace();
        let connector = Arc::new(
            MockConnector::new()
                .on("cat >", MockCommand::exit(0).wait_for_eof())
                .on("echo ready", MockCommand::exit(127)),
        );
        let plan = plan(dir.path());
        let (events, _rx) = EventSink::channel();

        let report = FanOut::new(cluster(), "Run")
            .with_events(events)
            .run_with_token(CancellationToken::new(), |task| {
                run_host(Arc::clone(&connector), Arc::clone(&plan), task, io::sink())
            })
            .await;

        assert_eq!(report.failure_count(), 2);
        let (_, err) = report.failures().next().unwrap();
        assert_eq!(
            format!("{:#}", err),
            "failed to execute 'echo ready': command exited with status 127"
        );
        let transport = connector.transport(&Host::new("10.0.0.1")).unwrap();
        assert!(!transport.commands().iter().any(|c| c.starts_with("setsid")));
        assert_eq!(transport.disconnects(), 1);
    }

    #[tokio::test]
    async fn test_interrupt_while_tailing_is_success() {
        let dir = workspace();
        let connector = Arc::new(
            MockConnector::new()
                .on("cat >", MockCommand::exit(0).wait_for_eof())
                .on("tail -f", MockCommand::until_signal()),
        );
        let plan = plan(dir.path());
        let cancel = CancellationToken::new();

        // Interrupt once both hosts are following their logs
        let trigger = cancel.clone();
        let watched = Arc::clone(&connector);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(10)).await;
                let tailing = ["10.0.0.1", "10.0.0.2"].iter().all(|h| {
                    watched.transport(&Host::new(*h)).is_some_and(|t| {
                        t.commands().iter().any(|c| c.starts_with("tail -f"))
                    })
                });
                if tailing {
                    trigger.cancel();
                    return;
                }
            }
        });

        let report = FanOut::new(cluster(), "Run")
            .run_with_token(cancel, |task| {
                run_host(Arc::clone(&connector), Arc::clone(&plan), task, io::sink())
            })
            .await;

        assert!(report.interrupted);
        assert_eq!(report.failure_count(), 0);
        let transport = connector.transport(&Host::new("10.0.0.2")).unwrap();
        assert_eq!(transport.signals(), vec![mesh_core::types::Signal::Term]);
    }
}
