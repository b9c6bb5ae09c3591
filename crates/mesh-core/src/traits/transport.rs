//! Transport traits
//!
//! A [`Transport`] is one authenticated connection to one host. It hands out
//! [`RemoteChannel`]s, each of which runs a single command. The session layer
//! builds every primitive (run-and-wait, detached launch, archive upload,
//! tail) on top of these two traits, so they are all that a test double has
//! to provide.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::ChannelError;
use crate::types::Signal;

/// Something that happened on a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Bytes on the command's stdout
    Stdout(Bytes),
    /// Bytes on the command's stderr
    Stderr(Bytes),
    /// The command exited with this status
    ExitStatus(u32),
    /// The command was terminated by this signal (name without `SIG`)
    ExitSignal(String),
    /// The remote side will send no more data
    Eof,
    /// The server refused the exec request
    Rejected,
}

/// A channel running one remote command
#[async_trait]
pub trait RemoteChannel: Send {
    /// Request execution of `command`
    async fn exec(&mut self, command: &str) -> Result<(), ChannelError>;

    /// Write bytes to the command's stdin
    async fn send_stdin(&mut self, data: &[u8]) -> Result<(), ChannelError>;

    /// Close the command's stdin
    async fn send_eof(&mut self) -> Result<(), ChannelError>;

    /// Deliver a signal to the remote process
    async fn signal(&mut self, signal: Signal) -> Result<(), ChannelError>;

    /// Wait for the next event.
    ///
    /// Returns `None` once the channel is closed.
    async fn next_event(&mut self) -> Option<ChannelEvent>;

    /// Close the channel
    async fn close(&mut self) -> Result<(), ChannelError>;
}

/// An authenticated connection to one host
#[async_trait]
pub trait Transport: Send + Sync {
    /// The channel type this transport opens
    type Channel: RemoteChannel;

    /// Open a new session channel
    async fn open_channel(&self) -> Result<Self::Channel, ChannelError>;

    /// Tear down the connection. Errors are swallowed.
    async fn disconnect(&self);
}
