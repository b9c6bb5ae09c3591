//! Concurrent per-host execution
//!
//! [`FanOut`] runs one operation on every host of a cluster at once. Each
//! host gets its own task and its own outcome: a failing or panicking host
//! never stops the others, and nothing is retried. A single
//! [`CancellationToken`] is shared by every task and fires when the
//! operator interrupts.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::anyhow;
use futures::FutureExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use mesh_core::config::Cluster;
use mesh_core::types::Host;

use crate::events::{EventSink, FanOutEvent};
use crate::interrupt::InterruptGuard;

/// Everything one host's operation gets to work with
#[derive(Debug, Clone)]
pub struct HostTask {
    pub host: Host,
    /// Position of the host in the cluster; exported to the job as its rank
    pub index: usize,
    pub cluster: Arc<Cluster>,
    pub cancel: CancellationToken,
    pub events: EventSink,
}

impl HostTask {
    /// Whether this host's output is shown live
    pub fn is_representative(&self) -> bool {
        self.index == 0
    }

    /// Report an intermediate step
    pub fn progress(&self, message: impl Into<String>) {
        self.events.send(FanOutEvent::HostProgress {
            host: self.host.clone(),
            message: message.into(),
        });
    }
}

/// Result of one host's operation
#[derive(Debug)]
pub struct HostOutcome<T> {
    pub host: Host,
    pub index: usize,
    pub result: anyhow::Result<T>,
}

/// Results for every host, in cluster order
#[derive(Debug)]
pub struct FanOutReport<T> {
    pub outcomes: Vec<HostOutcome<T>>,
    /// Whether the token had been cancelled by the time all tasks finished
    pub interrupted: bool,
}

impl<T> FanOutReport<T> {
    pub fn failure_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_err()).count()
    }

    pub fn is_success(&self) -> bool {
        self.failure_count() == 0
    }

    /// Failing hosts and their errors
    pub fn failures(&self) -> impl Iterator<Item = (&Host, &anyhow::Error)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (&o.host, e)))
    }

    /// Succeeding hosts and their values
    pub fn successes(&self) -> impl Iterator<Item = (&Host, &T)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok().map(|v| (&o.host, v)))
    }
}

/// Runs an operation on every host of a cluster
pub struct FanOut {
    cluster: Arc<Cluster>,
    operation: &'static str,
    events: EventSink,
}

impl FanOut {
    /// `operation` names the operation in events, e.g. "Run"
    pub fn new(cluster: Arc<Cluster>, operation: &'static str) -> Self {
        Self {
            cluster,
            operation,
            events: EventSink::none(),
        }
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    /// Run with a fresh token cancelled by Ctrl+C or SIGTERM.
    ///
    /// The signal listener is installed before the first task starts and
    /// removed once the last one has finished.
    pub async fn run<T, F, Fut>(&self, op: F) -> FanOutReport<T>
    where
        F: Fn(HostTask) -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let cancel = CancellationToken::new();
        let _guard = InterruptGuard::install(cancel.clone(), self.events.clone());
        self.run_with_token(cancel, op).await
    }

    /// Run with a caller-provided token
    pub async fn run_with_token<T, F, Fut>(&self, cancel: CancellationToken, op: F) -> FanOutReport<T>
    where
        F: Fn(HostTask) -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let hosts = &self.cluster.hosts;
        self.events.send(FanOutEvent::Started {
            operation: self.operation,
            hosts: hosts.len(),
        });
        tracing::debug!(
            "{} on {} hosts of cluster {}",
            self.operation,
            hosts.len(),
            self.cluster.name
        );

        let mut tasks = JoinSet::new();
        for (index, host) in hosts.iter().enumerate() {
            let task = HostTask {
                host: host.clone(),
                index,
                cluster: Arc::clone(&self.cluster),
                cancel: cancel.clone(),
                events: self.events.clone(),
            };
            let work = op(task);
            tasks.spawn(async move { (index, AssertUnwindSafe(work).catch_unwind().await) });
        }

        let mut results: Vec<Option<anyhow::Result<T>>> = hosts.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            let (index, result) = match joined {
                Ok((index, Ok(result))) => (index, result),
                Ok((index, Err(panic))) => (
                    index,
                    Err(anyhow!("task panicked: {}", panic_message(panic.as_ref()))),
                ),
                Err(e) => {
                    // Only reachable if the runtime is shutting down
                    tracing::error!("Host task did not complete: {}", e);
                    continue;
                }
            };
            self.report(&hosts[index], &result);
            results[index] = Some(result);
        }

        let outcomes: Vec<HostOutcome<T>> = results
            .into_iter()
            .zip(hosts.iter())
            .enumerate()
            .map(|(index, (result, host))| HostOutcome {
                host: host.clone(),
                index,
                result: result.unwrap_or_else(|| Err(anyhow!("task did not complete"))),
            })
            .collect();

        let report = FanOutReport {
            outcomes,
            interrupted: cancel.is_cancelled(),
        };
        self.events.send(FanOutEvent::Finished {
            operation: self.operation,
            failures: report.failure_count(),
            total: hosts.len(),
        });
        report
    }

    fn report<T>(&self, host: &Host, result: &anyhow::Result<T>) {
        match result {
            Ok(_) => {
                tracing::info!("[{}] {} completed", host, self.operation);
                self.events.send(FanOutEvent::HostSucceeded {
                    host: host.clone(),
                    operation: self.operation,
                });
            }
            Err(e) => {
                tracing::warn!("[{}] {} failed: {:#}", host, self.operation, e);
                self.events.send(FanOutEvent::HostFailed {
                    host: host.clone(),
                    operation: self.operation,
                    reason: format!("{:#}", e),
                });
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use mesh_core::error::RunError;
    use mesh_protocol::RemoteCommand;
    use mesh_remote::mock::{MockCommand, MockConnector};
    use mesh_remote::Connector;

    fn cluster(n: usize) -> Arc<Cluster> {
        let hosts = (1..=n).map(|i| Host::new(format!("10.0.0.{}", i))).collect();
        Arc::new(Cluster::new("test", "ops", "/keys/id", hosts))
    }

    #[tokio::test]
    async fn test_all_hosts_succeed() {
        let calls = Arc::new(AtomicUsize::new(0));
        let fanout = FanOut::new(cluster(5), "Probe");

        let report = fanout
            .run_with_token(CancellationToken::new(), |task| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(task.index * 10)
                }
            })
            .await;

        assert_eq!(report.failure_count(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        let values: Vec<usize> = report.successes().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![0, 10, 20, 30, 40]);
        assert!(!report.interrupted);
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let completed = Arc::new(AtomicUsize::new(0));
        let fanout = FanOut::new(cluster(6), "Run");

        let report = fanout
            .run_with_token(CancellationToken::new(), |task| {
                let completed = Arc::clone(&completed);
                async move {
                    if task.index % 3 == 0 {
                        anyhow::bail!("host {} is broken", task.host);
                    }
                    tokio::task::yield_now().await;
                    completed.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;

        assert_eq!(report.failure_count(), 2);
        assert_eq!(completed.load(Ordering::SeqCst), 4);
        let failed: Vec<String> = report.failures().map(|(h, _)| h.to_string()).collect();
        assert_eq!(failed, vec!["10.0.0.1", "10.0.0.4"]);
    }

    #[tokio::test]
    async fn test_panic_is_captured_as_failure() {
        let fanout = FanOut::new(cluster(3), "Run");
        let report = fanout
            .run_with_token(CancellationToken::new(), |task| async move {
                if task.index == 1 {
                    panic!("boom");
                }
                Ok(())
            })
            .await;

        assert_eq!(report.failure_count(), 1);
        let (host, err) = report.failures().next().unwrap();
        assert_eq!(host.as_str(), "10.0.0.2");
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn test_events_report_each_host() {
        let (events, mut rx) = EventSink::channel();
        let fanout = FanOut::new(cluster(2), "Setup").with_events(events);

        fanout
            .run_with_token(CancellationToken::new(), |task| async move {
                task.progress("halfway");
                if task.index == 1 {
                    anyhow::bail!("nope");
                }
                Ok(())
            })
            .await;
        drop(fanout);

        let mut seen = Vec::new();
        while let Some(event) = rx.recv().await {
            seen.push(event);
        }

        assert_eq!(
            seen.first(),
            Some(&FanOutEvent::Started {
                operation: "Setup",
                hosts: 2
            })
        );
        assert_eq!(
            seen.last(),
            Some(&FanOutEvent::Finished {
                operation: "Setup",
                failures: 1,
                total: 2
            })
        );
        assert!(seen.contains(&FanOutEvent::HostSucceeded {
            host: Host::new("10.0.0.1"),
            operation: "Setup",
        }));
        assert!(seen.contains(&FanOutEvent::HostFailed {
            host: Host::new("10.0.0.2"),
            operation: "Setup",
            reason: "nope".into(),
        }));
        let progress = seen
            .iter()
            .filter(|e| matches!(e, FanOutEvent::HostProgress { .. }))
            .count();
        assert_eq!(progress, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_returns_within_grace() {
        let connector = Arc::new(
            MockConnector::new()
                .on("train", MockCommand::hang())
                .with_grace(Duration::from_secs(2)),
        );
        let cancel = CancellationToken::new();
        let fanout = FanOut::new(cluster(4), "Run");

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            trigger.cancel();
        });

        let started = tokio::time::Instant::now();
        let report = fanout
            .run_with_token(cancel, |task| {
                let connector = Arc::clone(&connector);
                async move {
                    let mut session = connector
                        .connect(&task.cluster, &task.host, &task.cancel)
                        .await?;
                    let result = session
                        .exec(
                            &RemoteCommand::from("python train.py"),
                            &mut std::io::sink(),
                            &mut std::io::sink(),
                            &task.cancel,
                        )
                        .await;
                    session.close().await;
                    result?;
                    Ok(())
                }
            })
            .await;
        let elapsed = started.elapsed();

        assert!(report.interrupted);
        assert_eq!(report.failure_count(), 4);
        for (_, err) in report.failures() {
            assert!(err
                .downcast_ref::<RunError>()
                .is_some_and(RunError::is_cancelled));
        }
        assert!(elapsed < Duration::from_millis(500) + Duration::from_secs(3));
        for i in 1..=4 {
            let transport = connector
                .transport(&Host::new(format!("10.0.0.{}", i)))
                .unwrap();
            assert_eq!(transport.signals().len(), 1);
        }
    }
}
