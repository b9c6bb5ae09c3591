//! Operator interrupt handling

use tokio_util::sync::CancellationToken;

use crate::events::{EventSink, FanOutEvent};

/// Turns Ctrl+C (and SIGTERM on unix) into a cancelled token.
///
/// The listener lives until the guard is dropped. It fires at most once:
/// on the first signal it reports [`FanOutEvent::Interrupted`], cancels the
/// token, and exits.
///
/// Dropping the guard does not restore the default SIGINT behaviour: tokio
/// keeps its handler for the life of the process, so a later Ctrl+C with no
/// guard installed is swallowed rather than killing the process.
pub struct InterruptGuard {
    done: CancellationToken,
}

impl InterruptGuard {
    /// Start listening. Must be called from within a tokio runtime.
    pub fn install(cancel: CancellationToken, events: EventSink) -> Self {
        let done = CancellationToken::new();
        let stop = done.clone();

        tokio::spawn(async move {
            let ctrl_c = tokio::signal::ctrl_c();

            #[cfg(unix)]
            let terminate = async {
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(mut signal) => {
                        signal.recv().await;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to install SIGTERM handler: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            };

            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = stop.cancelled() => return,
                _ = ctrl_c => {
                    tracing::info!("Received Ctrl+C, cancelling all hosts");
                }
                _ = terminate => {
                    tracing::info!("Received SIGTERM, cancelling all hosts");
                }
            }

            events.send(FanOutEvent::Interrupted);
            cancel.cancel();
        });

        Self { done }
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        self.done.cancel();
    }
}
