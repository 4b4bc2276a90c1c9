//! Lifecycle error types

use thiserror::Error;

/// Errors surfaced by the shutdown coordinator itself.
///
/// Participant failures never appear here; they are handed to the
/// participant's own [`recover`](crate::ShutdownParticipant::recover) hook.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Registration attempted after the termination trigger fired
    #[error("Shutdown already in progress, cannot register '{participant}'")]
    ShutdownInProgress { participant: String },

    /// `listen()` called outside a Tokio runtime
    #[error("No Tokio runtime available to spawn the shutdown listener")]
    NoRuntime,

    /// OS signal handler could not be installed
    #[error("Failed to install {signal} handler: {source}")]
    SignalInstall {
        signal: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] common::Error),
}

/// Lifecycle result type
pub type Result<T> = std::result::Result<T, LifecycleError>;
