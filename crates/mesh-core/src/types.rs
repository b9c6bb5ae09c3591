//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;

/// A remote host, identified by its network address
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Host(pub String);

impl Host {
    /// Create a new host
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Get the raw address string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the address parses as an IPv4 or IPv6 address
    pub fn is_ip(&self) -> bool {
        self.0.parse::<std::net::IpAddr>().is_ok()
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Host {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Host {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Signals the controller may deliver to a remote process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// SIGTERM
    Term,
    /// SIGINT
    Int,
    /// SIGKILL
    Kill,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Term => write!(f, "TERM"),
            Signal::Int => write!(f, "INT"),
            Signal::Kill => write!(f, "KILL"),
        }
    }
}
