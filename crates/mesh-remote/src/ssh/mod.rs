//! SSH transport over russh

mod handler;
mod transport;

pub use transport::{SshChannel, SshTransport};
