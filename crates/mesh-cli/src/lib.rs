//! mesh-cli: Command-line interface for mesh
//!
//! Provides the `mesh` binary: run a job across a cluster, install its
//! dependencies, watch TPU utilization, and list configured clusters.

pub mod commands;
pub mod output;
