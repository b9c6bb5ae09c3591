//! mesh-orchestrator: Fan-out across a cluster
//!
//! Runs one operation on every host of a cluster concurrently, turns an
//! operator interrupt into cancellation, and accounts for each host's
//! outcome independently. The per-host pipelines used by the CLI live in
//! [`pipeline`].

pub mod events;
pub mod fanout;
pub mod interrupt;
pub mod output;
pub mod pipeline;

pub use events::{EventSink, FanOutEvent};
pub use fanout::{FanOut, FanOutReport, HostOutcome, HostTask};
pub use interrupt::InterruptGuard;
pub use output::AttributedSink;
