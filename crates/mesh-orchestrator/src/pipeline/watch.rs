//! TPU metrics collection

use std::collections::BTreeMap;
use std::sync::Arc;

use mesh_core::types::Host;
use mesh_protocol::{RemoteCommand, TpuHostMetrics, TPU_METRICS_PROBE};
use mesh_remote::Connector;

use crate::fanout::{FanOutReport, HostTask};

/// Probe one host for TPU metrics.
///
/// Never fails: a host that cannot be reached, cannot run the probe or
/// prints something unparseable becomes an error row instead.
pub async fn collect_metrics<C: Connector>(
    connector: Arc<C>,
    task: HostTask,
) -> anyhow::Result<TpuHostMetrics> {
    let mut session = match connector
        .connect(&task.cluster, &task.host, &task.cancel)
        .await
    {
        Ok(session) => session,
        Err(e) => return Ok(TpuHostMetrics::from_error(format!("connection failed: {}", e))),
    };

    let captured = session
        .run_and_capture(&RemoteCommand::Raw(TPU_METRICS_PROBE.to_string()), &task.cancel)
        .await;
    session.close().await;

    let text = captured.text();
    let metrics = match (TpuHostMetrics::parse(&text), &captured.status) {
        // The probe reports its own failures as JSON and exits non-zero
        (Ok(metrics), _) if metrics.error.is_some() => metrics,
        (Ok(metrics), Ok(())) => metrics,
        (_, Err(e)) => TpuHostMetrics::from_error(format!("exec failed: {}", e)),
        (Err(e), Ok(())) => TpuHostMetrics::from_error(format!("parse failed: {}", e)),
    };
    Ok(metrics)
}

/// Cluster-wide TPU totals
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterTpuMetrics {
    /// Per-host metrics, sorted by host
    pub hosts: BTreeMap<Host, TpuHostMetrics>,
    pub total_chips: usize,
    pub total_memory_gb: f64,
    pub used_memory_gb: f64,
    /// Mean duty cycle over every chip of every active host
    pub avg_utilization: f64,
    pub active_hosts: usize,
    pub error_hosts: usize,
}

impl ClusterTpuMetrics {
    pub fn from_hosts(hosts: impl IntoIterator<Item = (Host, TpuHostMetrics)>) -> Self {
        let mut cluster = Self::default();
        let mut duty_total = 0.0;

        for (host, metrics) in hosts {
            if metrics.error.is_some() {
                cluster.error_hosts += 1;
            } else {
                cluster.active_hosts += 1;
                cluster.total_chips += metrics.chip_count;
                cluster.total_memory_gb += metrics.total_memory_gb();
                cluster.used_memory_gb += metrics.memory_usage_gb();
                duty_total += metrics.chips.iter().map(|c| c.duty_cycle_pct).sum::<f64>();
            }
            cluster.hosts.insert(host, metrics);
        }

        if cluster.total_chips > 0 {
            cluster.avg_utilization = duty_total / cluster.total_chips as f64;
        }
        cluster
    }

    /// Aggregate a metrics fan-out; a failed task becomes an error row
    pub fn from_report(report: FanOutReport<TpuHostMetrics>) -> Self {
        Self::from_hosts(report.outcomes.into_iter().map(|outcome| {
            let metrics = outcome
                .result
                .unwrap_or_else(|e| TpuHostMetrics::from_error(format!("{:#}", e)));
            (outcome.host, metrics)
        }))
    }

    pub fn total_hosts(&self) -> usize {
        self.hosts.len()
    }

    /// Used memory as a percentage of total memory
    pub fn memory_utilization_pct(&self) -> f64 {
        if self.total_memory_gb == 0.0 {
            return 0.0;
        }
        100.0 * self.used_memory_gb / self.total_memory_gb
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_core::config::Cluster;
    use mesh_remote::mock::{MockCommand, MockConnector};
    use tokio_util::sync::CancellationToken;

    use crate::fanout::FanOut;

    const V4_HOST: &str = r#"{"chip_type": "v4", "chip_count": 2, "chips": [{"device_id": 0, "memory_usage": 2000000000, "total_memory": 8000000000, "duty_cycle_pct": 50.0}, {"device_id": 1, "memory_usage": 6000000000, "total_memory": 8000000000, "duty_cycle_pct": 100.0}]}"#;

    fn cluster() -> Arc<Cluster> {
        Arc::new(Cluster::new(
            "tpu",
            "ops",
            "/keys/id",
            vec![
                Host::new("10.0.0.3"),
                Host::new("10.0.0.1"),
                Host::new("10.0.0.2"),
            ],
        ))
    }

    #[tokio::test]
    async fn test_collect_and_aggregate() {
        let connector = Arc::new(
            MockConnector::new()
                .on("tpu_info", MockCommand::exit(0).stdout(format!("{}\n", V4_HOST)))
                .unreachable("10.0.0.2"),
        );

        let report = FanOut::new(cluster(), "Watch")
            .run_with_token(CancellationToken::new(), |task| {
                collect_metrics(Arc::clone(&connector), task)
            })
            .await;
        assert!(report.is_success());

        let metrics = ClusterTpuMetrics::from_report(report);
        assert_eq!(metrics.total_hosts(), 3);
        assert_eq!(metrics.active_hosts, 2);
        assert_eq!(metrics.error_hosts, 1);
        assert_eq!(metrics.total_chips, 4);
        assert!((metrics.total_memory_gb - 32.0).abs() < 1e-9);
        assert!((metrics.used_memory_gb - 16.0).abs() < 1e-9);
        assert!((metrics.avg_utilization - 75.0).abs() < 1e-9);
        assert!((metrics.memory_utilization_pct() - 50.0).abs() < 1e-9);

        let order: Vec<&str> = metrics.hosts.keys().map(Host::as_str).collect();
        assert_eq!(order, vec!["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
        let failed = &metrics.hosts[&Host::new("10.0.0.2")];
        assert!(failed
            .error
            .as_deref()
            .is_some_and(|e| e.starts_with("connection failed")));
    }

    #[tokio::test]
    async fn test_probe_errors_become_rows() {
        let connector = Arc::new(
            MockConnector::new()
                .on("tpu_info", MockCommand::exit(1).stdout("{\"error\": \"no TPU chips found\"}\n")),
        );
        let report = FanOut::new(cluster(), "Watch")
            .run_with_token(CancellationToken::new(), |task| {
                collect_metrics(Arc::clone(&connector), task)
            })
            .await;

        let metrics = ClusterTpuMetrics::from_report(report);
        assert_eq!(metrics.error_hosts, 3);
        assert_eq!(metrics.avg_utilization, 0.0);
        assert_eq!(metrics.memory_utilization_pct(), 0.0);
        for row in metrics.hosts.values() {
            assert_eq!(row.error.as_deref(), Some("no TPU chips found"));
        }
    }

    #[tokio::test]
    async fn test_garbage_output_is_parse_error() {
        let connector = Arc::new(
            MockConnector::new().on("tpu_info", MockCommand::exit(0).stdout("Traceback...\n")),
        );
        let report = FanOut::new(cluster(), "Watch")
            .run_with_token(CancellationToken::new(), |task| {
                collect_metrics(Arc::clone(&connector), task)
            })
            .await;

        let metrics = ClusterTpuMetrics::from_report(report);
        let row = &metrics.hosts[&Host::new("10.0.0.1")];
        assert!(row.error.as_deref().is_some_and(|e| e.starts_with("parse failed")));
    }
}
