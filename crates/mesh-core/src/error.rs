//! Core error types for mesh
//!
//! Errors are split by where a host operation can fail: establishing the
//! connection, talking over a channel, running a command, transferring the
//! workspace, and tailing the job log. Cancellation is a variant of each
//! error that can observe it, so callers can tell a deliberate stop from a
//! failure without inspecting messages.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors establishing an authenticated connection to a host
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Identity file could not be read
    #[error("failed to read identity file {path}: {source}")]
    KeyRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Identity file could not be parsed as a private key
    #[error("failed to parse private key {path}: {message}")]
    KeyParse { path: PathBuf, message: String },

    /// TCP or SSH handshake failed
    #[error("failed to connect to {host}: {message}")]
    Dial { host: String, message: String },

    /// Dial did not complete in time
    #[error("connection to {host} timed out after {after:?}")]
    Timeout { host: String, after: Duration },

    /// The server rejected our key
    #[error("authentication rejected for {user}@{host}")]
    AuthRejected { user: String, host: String },

    /// The run was cancelled while dialing
    #[error("connection cancelled")]
    Cancelled,
}

impl ConnectionError {
    /// Whether the error is the result of cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ConnectionError::Cancelled)
    }
}

/// Errors on a single channel of an established connection
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Opening a channel failed
    #[error("failed to open channel: {0}")]
    Open(String),

    /// A request on the channel (exec, data, signal, eof) failed
    #[error("channel request failed: {0}")]
    Request(String),

    /// The connection has already been closed
    #[error("session is closed")]
    SessionClosed,
}

/// Errors running a remote command
#[derive(Error, Debug)]
pub enum RunError {
    /// Channel-level failure
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// The server refused to start the command
    #[error("remote refused to run command")]
    Rejected,

    /// The command exited with a non-zero status
    #[error("command exited with status {status}")]
    Exit { status: u32 },

    /// The command was killed by a signal
    #[error("command killed by signal {signal}")]
    Signal { signal: String },

    /// The channel closed without reporting how the command ended
    #[error("channel closed before the command reported an exit status")]
    Closed,

    /// Writing command output to a local sink failed
    #[error("failed to write command output: {0}")]
    Output(#[source] std::io::Error),

    /// Captured output exceeded the capture limit
    #[error("command output exceeded {limit} bytes")]
    OutputLimit { limit: usize },

    /// The run was cancelled before the command finished
    #[error("command cancelled")]
    Cancelled,
}

impl RunError {
    /// Whether the error is the result of cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RunError::Cancelled)
    }
}

/// Errors streaming the workspace archive to a host
#[derive(Error, Debug)]
pub enum TransferError {
    /// Building the archive locally failed mid-stream
    #[error("failed to build archive: {0}")]
    Archive(#[source] std::io::Error),

    /// Writing or extracting the archive remotely failed
    #[error("remote extraction failed: {0}")]
    Remote(#[from] RunError),
}

impl TransferError {
    /// Whether the error is the result of cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransferError::Remote(e) if e.is_cancelled())
    }
}

/// Errors following a remote file
#[derive(Error, Debug)]
pub enum TailError {
    /// Following was stopped deliberately
    #[error("tail cancelled")]
    Cancelled,

    /// The remote stream ended on its own with a failure
    #[error("tail ended unexpectedly (status {})", status.map(|s| s.to_string()).unwrap_or_else(|| "unknown".into()))]
    Ended { status: Option<u32> },

    /// The tail command itself failed
    #[error(transparent)]
    Run(RunError),
}

impl TailError {
    /// Whether the error is the result of cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TailError::Cancelled)
    }
}

impl From<RunError> for TailError {
    fn from(err: RunError) -> Self {
        match err {
            RunError::Cancelled => TailError::Cancelled,
            RunError::Exit { status } => TailError::Ended {
                status: Some(status),
            },
            RunError::Closed => TailError::Ended { status: None },
            other => TailError::Run(other),
        }
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    /// Config file could not be read
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Requested cluster is not defined
    #[error("cluster '{name}' not found (available: {})", if available.is_empty() { "none".to_string() } else { available.join(", ") })]
    ClusterNotFound {
        name: String,
        available: Vec<String>,
    },
}
