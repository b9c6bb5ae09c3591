//! Per-host operations run by the CLI
//!
//! Each pipeline is an async function taking a [`HostTask`](crate::HostTask)
//! and returning that host's result, ready to hand to
//! [`FanOut`](crate::FanOut). All of them open their own session and close
//! it before returning, whatever the outcome.

mod cleanup;
mod run;
mod setup;
mod watch;

pub use cleanup::cleanup_host;
pub use run::{run_host, RunPlan};
pub use setup::setup_host;
pub use watch::{collect_metrics, ClusterTpuMetrics};
