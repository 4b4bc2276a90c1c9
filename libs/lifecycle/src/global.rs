//! Process-wide coordinator accessor
//!
//! A thin wrapper for process entry points and collaborators that cannot be
//! handed a coordinator explicitly. Everything else should construct its own
//! [`ShutdownCoordinator`].

use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::LifecycleConfig;
use crate::coordinator::ShutdownCoordinator;
use crate::error::Result;
use crate::participant::ShutdownParticipant;
use crate::trigger::OsSignals;

static GLOBAL: OnceLock<ShutdownCoordinator> = OnceLock::new();

/// Get the process-wide coordinator, creating it on first call with
/// configuration from the environment (`LIFECYCLE_*`).
pub fn get() -> Result<&'static ShutdownCoordinator> {
    if let Some(coordinator) = GLOBAL.get() {
        return Ok(coordinator);
    }

    let config = LifecycleConfig::from_env().unwrap_or_else(|e| {
        warn!("Lifecycle config: {}. Using defaults", e);
        LifecycleConfig::default()
    });
    init(config)
}

/// Create the process-wide coordinator with an explicit configuration.
///
/// Creation installs SIGINT/SIGTERM handlers and spawns the single listener,
/// so it must happen inside a Tokio runtime. Concurrent first calls race on
/// the `OnceLock`; the loser's handlers are dropped before any listener is
/// spawned. If the coordinator already exists `config` is ignored.
pub fn init(config: LifecycleConfig) -> Result<&'static ShutdownCoordinator> {
    if let Some(coordinator) = GLOBAL.get() {
        debug!("Global coordinator already initialized, config ignored");
        return Ok(coordinator);
    }

    let trigger = OsSignals::install()?;
    let coordinator = GLOBAL.get_or_init(|| ShutdownCoordinator::new(config, trigger));
    coordinator.listen()?;
    Ok(coordinator)
}

/// Register with the process-wide coordinator
pub fn register_close(participant: Arc<dyn ShutdownParticipant>) -> Result<CancellationToken> {
    get()?.register_close(participant)
}

/// Trigger the process-wide shutdown, creating the coordinator if needed so
/// a later `wait_close_pending()` still returns.
pub fn close() -> Result<()> {
    get()?.close();
    Ok(())
}

/// Wait until the process-wide shutdown has fully drained
pub async fn wait_close_pending() -> Result<()> {
    get()?.wait_close_pending().await;
    Ok(())
}

/// Whether the global coordinator exists yet
pub fn is_initialized() -> bool {
    GLOBAL.get().is_some()
}
