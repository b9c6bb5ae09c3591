//! Core trait definitions

mod transport;

pub use transport::{ChannelEvent, RemoteChannel, Transport};
