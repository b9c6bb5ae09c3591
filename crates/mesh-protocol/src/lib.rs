//! mesh-protocol: Remote shell contract for mesh
//!
//! There is no agent on the remote side. Every host is driven through a
//! POSIX shell, so the command strings rendered here are the wire protocol
//! between the controller and existing remote environments. They must stay
//! byte-for-byte stable.

pub mod command;
pub mod layout;
pub mod metrics;
pub mod quote;

pub use command::RemoteCommand;
pub use layout::RemoteLayout;
pub use metrics::{ProbeError, TpuChipMetrics, TpuHostMetrics, TPU_METRICS_PROBE};
pub use quote::quote;
