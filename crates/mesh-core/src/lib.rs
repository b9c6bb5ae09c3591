//! mesh-core: Core abstractions and configuration for mesh
//!
//! This crate provides the shared domain types, the error taxonomy, the
//! cluster/job configuration and the transport traits used by the session,
//! orchestrator, and CLI crates.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::{Cluster, ClusterMap, JobSpec};
pub use error::{ChannelError, ConfigError, ConnectionError, RunError, TailError, TransferError};
pub use traits::{ChannelEvent, RemoteChannel, Transport};
pub use types::{Host, Signal};
