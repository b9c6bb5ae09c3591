//! mesh-remote: Remote sessions for mesh
//!
//! This crate turns one SSH connection into the primitives a run is built
//! from (see [`Session`]), provides the russh transport behind them, and
//! builds the streamed workspace archive that gets uploaded to each host.

pub mod archive;
pub mod connector;
pub mod session;
pub mod ssh;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use archive::{build_archive, ArchiveStream, IgnoreSet};
pub use connector::{Connector, SshConnector};
pub use session::{Captured, Session, CAPTURE_LIMIT, DEFAULT_GRACE};
pub use ssh::SshTransport;
