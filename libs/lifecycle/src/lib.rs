//! Process lifecycle and graceful shutdown
//!
//! Subsystems (schedulers, servers, clients) register a
//! [`ShutdownParticipant`] and receive a child of the shared early-cancellation
//! token; cancelling that handle only stops the holder's own work.
//! When a termination trigger fires (SIGINT, SIGTERM or [`close`]) the
//! coordinator:
//!
//! 1. cancels the early token,
//! 2. runs every participant's `graceful_close` concurrently, each in its
//!    own task so a panic is handed to that participant's `recover`,
//! 3. waits for all of them,
//! 4. cancels the completion token, releasing `wait_close_pending()`.
//!
//! ```rust,no_run
//! use lifecycle::{FnParticipant, LifecycleConfig, ShutdownCoordinator, OsSignals};
//!
//! #[tokio::main]
//! async fn main() -> lifecycle::Result<()> {
//!     let coordinator = ShutdownCoordinator::start(LifecycleConfig::default(), OsSignals::install()?)?;
//!     let token = coordinator.register(FnParticipant::new("server", |info| async move {
//!         tracing::info!("server stopping on {}", info);
//!     }))?;
//!
//!     tokio::spawn(async move {
//!         token.cancelled().await;
//!         // stop accepting new work
//!     });
//!
//!     coordinator.wait_close_pending().await;
//!     Ok(())
//! }
//! ```
//!
//! [`close`]: ShutdownCoordinator::close

pub mod config;
pub mod coordinator;
pub mod error;
pub mod global;
pub mod participant;
pub mod termination;
pub mod trigger;

pub use config::LifecycleConfig;
pub use coordinator::{LifecycleState, ShutdownCoordinator, ShutdownReport};
pub use error::{LifecycleError, Result};
pub use participant::{FnParticipant, ParticipantFailure, ShutdownParticipant};
pub use termination::{TerminationInfo, TerminationKind};
pub use trigger::{ChannelTrigger, ManualOnly, OsSignals, TriggerSource};

// Re-export so participants can name the token type without another dependency
pub use tokio_util::sync::CancellationToken;
