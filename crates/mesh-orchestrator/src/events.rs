//! Semantic progress events
//!
//! The orchestrator reports what happens as events instead of printing, so
//! the binary decides how things look.

use tokio::sync::mpsc;

use mesh_core::types::Host;

/// Something that happened during a fan-out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FanOutEvent {
    /// Tasks are about to start
    Started {
        operation: &'static str,
        hosts: usize,
    },
    /// A host finished an intermediate step
    HostProgress { host: Host, message: String },
    /// A host's operation returned successfully
    HostSucceeded {
        host: Host,
        operation: &'static str,
    },
    /// A host's operation failed; `reason` is the full error chain
    HostFailed {
        host: Host,
        operation: &'static str,
        reason: String,
    },
    /// The operator asked to stop
    Interrupted,
    /// Every task has finished
    Finished {
        operation: &'static str,
        failures: usize,
        total: usize,
    },
}

/// Sending half of the event channel; a no-op when detached
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<FanOutEvent>>,
}

impl EventSink {
    /// Create a connected sink and its receiver
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<FanOutEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that drops every event
    pub fn none() -> Self {
        Self::default()
    }

    pub fn send(&self, event: FanOutEvent) {
        if let Some(tx) = &self.tx {
            // Receiver gone means nobody is rendering any more
            let _ = tx.send(event);
        }
    }
}
