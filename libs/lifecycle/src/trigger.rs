//! Termination trigger sources
//!
//! The coordinator's listener waits on exactly one [`TriggerSource`] plus its
//! own manual `close()` path. Sources are injected so tests can drive a
//! coordinator without sending real signals to the test process.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{LifecycleError, Result};
use crate::termination::TerminationKind;

/// Something that resolves once, when the process should shut down
#[async_trait]
pub trait TriggerSource: Send + 'static {
    async fn wait(&mut self) -> TerminationKind;
}

/// OS termination notifications
///
/// - On Unix: SIGINT or SIGTERM
/// - On Windows: Ctrl+C only
///
/// Handlers are installed in [`install`](OsSignals::install) so a failure
/// surfaces at startup rather than when the signal arrives.
pub struct OsSignals {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl OsSignals {
    /// Install the signal handlers. Must run inside a Tokio runtime.
    pub fn install() -> Result<Self> {
        tokio::runtime::Handle::try_current().map_err(|_| LifecycleError::NoRuntime)?;

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let interrupt =
                signal(SignalKind::interrupt()).map_err(|source| LifecycleError::SignalInstall {
                    signal: "SIGINT",
                    source,
                })?;
            let terminate =
                signal(SignalKind::terminate()).map_err(|source| LifecycleError::SignalInstall {
                    signal: "SIGTERM",
                    source,
                })?;
            debug!("Signal handlers installed: SIGINT, SIGTERM");
            return Ok(Self {
                interrupt,
                terminate,
            });
        }
        #[cfg(not(unix))]
        {
            debug!("Signal handler installed: Ctrl+C");
            return Ok(Self {});
        }
    }
}

#[async_trait]
impl TriggerSource for OsSignals {
    async fn wait(&mut self) -> TerminationKind {
        #[cfg(unix)]
        {
            return tokio::select! {
                _ = self.interrupt.recv() => TerminationKind::Interrupt,
                _ = self.terminate.recv() => TerminationKind::Terminate,
            };
        }
        #[cfg(not(unix))]
        {
            return match tokio::signal::ctrl_c().await {
                Ok(()) => TerminationKind::Interrupt,
                Err(e) => {
                    tracing::warn!("Ctrl+C handler: {}. Only close() will shut down", e);
                    std::future::pending().await
                },
            };
        }
    }
}

/// Never fires; shutdown happens only through `close()`
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualOnly;

#[async_trait]
impl TriggerSource for ManualOnly {
    async fn wait(&mut self) -> TerminationKind {
        std::future::pending().await
    }
}

/// Trigger fed from a channel, for embedding the coordinator under another
/// supervisor or simulating signals in tests
pub struct ChannelTrigger {
    rx: mpsc::UnboundedReceiver<TerminationKind>,
}

impl ChannelTrigger {
    pub fn new() -> (mpsc::UnboundedSender<TerminationKind>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }
}

#[async_trait]
impl TriggerSource for ChannelTrigger {
    async fn wait(&mut self) -> TerminationKind {
        match self.rx.recv().await {
            Some(kind) => kind,
            // All senders gone: nothing can fire any more
            None => std::future::pending().await,
        }
    }
}
