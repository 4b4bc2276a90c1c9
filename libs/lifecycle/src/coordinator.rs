//! Shutdown coordinator
//!
//! Owns the participant registry, the early-cancellation token and the
//! completion token that releases `wait_close_pending()`. Callers only ever
//! receive child tokens: cancelling one stops that holder's own work and
//! never reaches the coordinator or other participants.
//!
//! ```text
//! Uninitialized ──listen()──► Listening ──trigger──► ShuttingDown ──join──► Drained
//!                                  │                      │
//!                                  │               early.cancel()
//!                                  │               fan-out + join
//!                                  │               completion.cancel()
//!                          register_close() ok    register_close() rejected
//! ```

use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

use crate::config::LifecycleConfig;
use crate::error::{LifecycleError, Result};
use crate::participant::{ParticipantFailure, ShutdownParticipant};
use crate::termination::{TerminationInfo, TerminationKind};
use crate::trigger::TriggerSource;

/// Coordinator lifecycle. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Constructed, listener not yet spawned
    Uninitialized,
    /// Waiting for a termination trigger
    Listening,
    /// Trigger fired, participants running
    ShuttingDown,
    /// Every participant finished; terminal
    Drained,
}

/// Summary of one shutdown run
#[derive(Debug, Clone)]
pub struct ShutdownReport {
    pub termination: TerminationInfo,
    /// Participants launched at trigger time
    pub launched: usize,
    /// Participants whose `graceful_close` returned normally
    pub closed: usize,
    /// Failures handed to `recover`
    pub failures: Vec<ParticipantFailure>,
    pub elapsed: Duration,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

struct Registry {
    state: LifecycleState,
    participants: Vec<Arc<dyn ShutdownParticipant>>,
}

struct ListenerParts {
    trigger: Box<dyn TriggerSource>,
    manual_rx: mpsc::Receiver<TerminationKind>,
}

struct Inner {
    registry: Mutex<Registry>,
    listener: Mutex<Option<ListenerParts>>,
    manual_tx: mpsc::Sender<TerminationKind>,
    early: CancellationToken,
    completion: CancellationToken,
    config: LifecycleConfig,
    termination: OnceLock<TerminationInfo>,
    report: OnceLock<ShutdownReport>,
}

/// Graceful shutdown coordinator
///
/// Cheap to clone; clones share the same registry and tokens.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    inner: Arc<Inner>,
}

enum Outcome {
    Closed,
    Recovered(ParticipantFailure),
}

impl ShutdownCoordinator {
    /// Build a coordinator without starting its listener.
    ///
    /// Registration is accepted immediately; `close()` is buffered until
    /// [`listen`](Self::listen) runs.
    pub fn new(config: LifecycleConfig, trigger: impl TriggerSource) -> Self {
        // One slot: the first trigger wins, later ones are dropped
        let (manual_tx, manual_rx) = mpsc::channel(1);
        Self {
            inner: Arc::new(Inner {
                registry: Mutex::new(Registry {
                    state: LifecycleState::Uninitialized,
                    participants: Vec::new(),
                }),
                listener: Mutex::new(Some(ListenerParts {
                    trigger: Box::new(trigger),
                    manual_rx,
                })),
                manual_tx,
                early: CancellationToken::new(),
                completion: CancellationToken::new(),
                config,
                termination: OnceLock::new(),
                report: OnceLock::new(),
            }),
        }
    }

    /// Build a coordinator and spawn its listener on the current runtime
    pub fn start(config: LifecycleConfig, trigger: impl TriggerSource) -> Result<Self> {
        let coordinator = Self::new(config, trigger);
        coordinator.listen()?;
        Ok(coordinator)
    }

    /// Spawn the trigger listener. Only the first call spawns; later calls
    /// return `Ok(())`.
    pub fn listen(&self) -> Result<()> {
        let handle =
            tokio::runtime::Handle::try_current().map_err(|_| LifecycleError::NoRuntime)?;

        let Some(parts) = self.inner.listener.lock().take() else {
            return Ok(());
        };

        {
            let mut registry = self.inner.registry.lock();
            if registry.state == LifecycleState::Uninitialized {
                registry.state = LifecycleState::Listening;
            }
        }

        // Listener and units inherit the caller's span
        handle.spawn(run_listener(Arc::clone(&self.inner), parts).in_current_span());
        info!("Shutdown listener started");
        Ok(())
    }

    /// Register a participant and return a child of the shared
    /// early-cancellation token.
    ///
    /// Rejected with [`LifecycleError::ShutdownInProgress`] once the trigger
    /// has fired; the registry is frozen at that instant.
    pub fn register_close(
        &self,
        participant: Arc<dyn ShutdownParticipant>,
    ) -> Result<CancellationToken> {
        let mut registry = self.inner.registry.lock();
        match registry.state {
            LifecycleState::Uninitialized | LifecycleState::Listening => {
                if self.inner.config.log_participants {
                    debug!("Registered participant: {}", participant.name());
                }
                registry.participants.push(participant);
                Ok(self.inner.early.child_token())
            },
            LifecycleState::ShuttingDown | LifecycleState::Drained => {
                let name = participant.name().to_string();
                warn!("Late registration rejected: {}", name);
                Err(LifecycleError::ShutdownInProgress { participant: name })
            },
        }
    }

    /// Convenience wrapper over [`register_close`](Self::register_close)
    pub fn register<P: ShutdownParticipant>(&self, participant: P) -> Result<CancellationToken> {
        self.register_close(Arc::new(participant))
    }

    /// Request shutdown from inside the process, reported as
    /// [`TerminationKind::Manual`]. Non-blocking; repeated calls are no-ops.
    pub fn close(&self) {
        self.close_with(TerminationKind::Manual);
    }

    /// Request shutdown with an explicit kind
    pub fn close_with(&self, kind: TerminationKind) {
        let state = self.state();
        if matches!(
            state,
            LifecycleState::ShuttingDown | LifecycleState::Drained
        ) {
            debug!("close({}) ignored: already {:?}", kind, state);
            return;
        }

        match self.inner.manual_tx.try_send(kind) {
            Ok(()) => info!("Shutdown requested ({})", kind),
            Err(TrySendError::Full(_)) => debug!("close({}) ignored: trigger pending", kind),
            Err(TrySendError::Closed(_)) => debug!("close({}) ignored: listener done", kind),
        }
    }

    /// Resolve once every participant has finished (cleanly or recovered)
    pub async fn wait_close_pending(&self) {
        self.inner.completion.cancelled().await;
    }

    pub fn state(&self) -> LifecycleState {
        self.inner.registry.lock().state
    }

    /// Watch handle on the early token; cancelled first on shutdown
    pub fn early_token(&self) -> CancellationToken {
        self.inner.early.child_token()
    }

    /// Watch handle on the completion token; cancelled last, after every
    /// participant has finished
    pub fn completion_token(&self) -> CancellationToken {
        self.inner.completion.child_token()
    }

    /// What triggered shutdown, once it has been triggered
    pub fn termination(&self) -> Option<TerminationInfo> {
        self.inner.termination.get().copied()
    }

    /// Participants waiting to run. Zero once the registry is frozen.
    pub fn participant_count(&self) -> usize {
        self.inner.registry.lock().participants.len()
    }

    /// Summary of the completed run, available once drained
    pub fn report(&self) -> Option<ShutdownReport> {
        self.inner.report.get().cloned()
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.inner.config
    }
}

impl fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.inner.registry.lock();
        f.debug_struct("ShutdownCoordinator")
            .field("state", &registry.state)
            .field("participants", &registry.participants.len())
            .field("termination", &self.inner.termination.get())
            .finish()
    }
}

async fn run_listener(inner: Arc<Inner>, parts: ListenerParts) {
    let ListenerParts {
        mut trigger,
        mut manual_rx,
    } = parts;

    let kind = tokio::select! {
        kind = trigger.wait() => kind,
        Some(kind) = manual_rx.recv() => kind,
    };
    // Closing the receiver turns later close() calls into immediate no-ops
    manual_rx.close();
    drop(trigger);

    drive_shutdown(&inner, TerminationInfo::new(kind)).await;
}

async fn drive_shutdown(inner: &Inner, info: TerminationInfo) {
    let participants = {
        let mut registry = inner.registry.lock();
        registry.state = LifecycleState::ShuttingDown;
        std::mem::take(&mut registry.participants)
    };
    let _ = inner.termination.set(info);
    info!(
        "Shutdown triggered by {}: {} participant(s)",
        info,
        participants.len()
    );

    // No participant code may run before this
    inner.early.cancel();

    let started = Instant::now();
    let timeout = inner.config.participant_timeout();
    let verbose = inner.config.log_participants;
    let mut units = JoinSet::new();
    for participant in participants {
        units.spawn(run_participant(participant, info, timeout, verbose).in_current_span());
    }
    let launched = units.len();

    let mut closed = 0;
    let mut failures = Vec::new();
    while let Some(joined) = units.join_next().await {
        match joined {
            Ok(Outcome::Closed) => closed += 1,
            Ok(Outcome::Recovered(failure)) => failures.push(failure),
            Err(e) => error!("Shutdown unit failed outside isolation: {}", e),
        }
    }

    let report = ShutdownReport {
        termination: info,
        launched,
        closed,
        failures,
        elapsed: started.elapsed(),
    };
    inner.registry.lock().state = LifecycleState::Drained;
    if report.is_clean() {
        info!(
            "Shutdown drained: {}/{} closed in {:?}",
            report.closed, report.launched, report.elapsed
        );
    } else {
        warn!(
            "Shutdown drained: {}/{} closed, {} recovered, {:?}",
            report.closed,
            report.launched,
            report.failures.len(),
            report.elapsed
        );
    }
    let _ = inner.report.set(report);

    // Only after every unit has joined
    inner.completion.cancel();
}

/// One isolated unit: close in its own task, recover in another, so a
/// panic in either never escapes to the coordinator or a sibling.
async fn run_participant(
    participant: Arc<dyn ShutdownParticipant>,
    info: TerminationInfo,
    timeout: Option<Duration>,
    verbose: bool,
) -> Outcome {
    let name = participant.name().to_string();
    if verbose {
        debug!("{}: closing", name);
    }
    let started = Instant::now();

    let closing = Arc::clone(&participant);
    let mut handle =
        tokio::spawn(async move { closing.graceful_close(info).await }.in_current_span());

    let result = match timeout {
        None => handle
            .await
            .map_err(|e| ParticipantFailure::from_join_error(&name, e)),
        Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
            Ok(joined) => joined.map_err(|e| ParticipantFailure::from_join_error(&name, e)),
            Err(_) => {
                handle.abort();
                Err(ParticipantFailure::TimedOut {
                    participant: name.clone(),
                    timeout: limit,
                })
            },
        },
    };

    let failure = match result {
        Ok(()) => {
            if verbose {
                debug!("{}: closed in {:?}", name, started.elapsed());
            }
            return Outcome::Closed;
        },
        Err(failure) => failure,
    };

    warn!("{}", failure);
    let hook_failure = failure.clone();
    let recovering =
        tokio::spawn(async move { participant.recover(hook_failure).await }.in_current_span());
    if let Err(e) = recovering.await {
        error!("{}: recover hook failed: {}", name, e);
    }
    Outcome::Recovered(failure)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::participant::FnParticipant;
    use crate::trigger::{ChannelTrigger, ManualOnly};

    fn noop(name: &'static str) -> impl ShutdownParticipant {
        FnParticipant::new(name, |_: TerminationInfo| std::future::ready(()))
    }

    #[test]
    fn test_new_is_uninitialized_and_accepts_registration() {
        let coordinator = ShutdownCoordinator::new(LifecycleConfig::default(), ManualOnly);
        assert_eq!(coordinator.state(), LifecycleState::Uninitialized);

        let token = coordinator.register(noop("early")).unwrap();
        assert!(!token.is_cancelled());
        assert_eq!(coordinator.participant_count(), 1);
    }

    #[test]
    fn test_listen_outside_runtime_fails() {
        let coordinator = ShutdownCoordinator::new(LifecycleConfig::default(), ManualOnly);
        assert!(matches!(
            coordinator.listen(),
            Err(LifecycleError::NoRuntime)
        ));
        assert_eq!(coordinator.state(), LifecycleState::Uninitialized);
    }

    #[tokio::test]
    async fn test_listen_is_idempotent() {
        let coordinator = ShutdownCoordinator::new(LifecycleConfig::default(), ManualOnly);
        coordinator.listen().unwrap();
        coordinator.listen().unwrap();
        assert_eq!(coordinator.state(), LifecycleState::Listening);
    }

    #[tokio::test]
    async fn test_close_before_listen_is_buffered() {
        let coordinator = ShutdownCoordinator::new(LifecycleConfig::default(), ManualOnly);
        coordinator.register(noop("buffered")).unwrap();
        coordinator.close();
        assert_eq!(coordinator.state(), LifecycleState::Uninitialized);

        coordinator.listen().unwrap();
        coordinator.wait_close_pending().await;
        assert_eq!(coordinator.state(), LifecycleState::Drained);
        assert_eq!(coordinator.report().unwrap().closed, 1);
    }

    #[tokio::test]
    async fn test_repeated_close_never_blocks() {
        let coordinator =
            ShutdownCoordinator::start(LifecycleConfig::default(), ManualOnly).unwrap();
        for _ in 0..10 {
            coordinator.close();
        }
        coordinator.wait_close_pending().await;
        coordinator.close();
        coordinator.close_with(TerminationKind::Terminate);

        let termination = coordinator.termination().unwrap();
        assert_eq!(termination.kind(), TerminationKind::Manual);
    }

    #[tokio::test]
    async fn test_registration_rejected_after_trigger() {
        let coordinator =
            ShutdownCoordinator::start(LifecycleConfig::default(), ManualOnly).unwrap();
        coordinator.close();
        coordinator.wait_close_pending().await;

        let err = coordinator.register(noop("late")).unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::ShutdownInProgress { ref participant } if participant == "late"
        ));
        assert_eq!(coordinator.participant_count(), 0);
    }

    #[tokio::test]
    async fn test_trigger_source_drives_shutdown() {
        let (tx, trigger) = ChannelTrigger::new();
        let coordinator = ShutdownCoordinator::start(LifecycleConfig::default(), trigger).unwrap();
        coordinator.register(noop("signalled")).unwrap();

        tx.send(TerminationKind::Terminate).unwrap();
        coordinator.wait_close_pending().await;

        let report = coordinator.report().unwrap();
        assert_eq!(report.termination.kind(), TerminationKind::Terminate);
        assert!(report.termination.is_signal());
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn test_empty_registry_drains() {
        let coordinator =
            ShutdownCoordinator::start(LifecycleConfig::default(), ManualOnly).unwrap();
        coordinator.close();
        coordinator.wait_close_pending().await;

        let report = coordinator.report().unwrap();
        assert_eq!(report.launched, 0);
        assert!(coordinator.early_token().is_cancelled());
        assert!(coordinator.completion_token().is_cancelled());
    }

    #[tokio::test]
    async fn test_participant_cancelling_its_token_does_not_trigger_shutdown() {
        let coordinator =
            ShutdownCoordinator::start(LifecycleConfig::default(), ManualOnly).unwrap();
        let token_a = coordinator.register(noop("a")).unwrap();
        let token_b = coordinator.register(noop("b")).unwrap();

        // A participant stopping its own worker
        token_a.cancel();
        coordinator.early_token().cancel();
        tokio::task::yield_now().await;

        assert!(!token_b.is_cancelled());
        assert!(!coordinator.early_token().is_cancelled());
        assert_eq!(coordinator.state(), LifecycleState::Listening);
        assert!(coordinator.termination().is_none());

        coordinator.close();
        coordinator.wait_close_pending().await;
        assert!(token_b.is_cancelled());
        assert_eq!(coordinator.report().unwrap().closed, 2);
    }

    #[tokio::test]
    async fn test_cancelling_completion_handle_does_not_release_wait() {
        let coordinator =
            ShutdownCoordinator::start(LifecycleConfig::default(), ManualOnly).unwrap();
        coordinator.register(noop("pending")).unwrap();

        let completion = coordinator.completion_token();
        completion.cancel();
        assert!(completion.is_cancelled());

        let waited = tokio::time::timeout(
            Duration::from_millis(30),
            coordinator.wait_close_pending(),
        )
        .await;
        assert!(waited.is_err(), "wait returned before any shutdown ran");
        assert!(!coordinator.completion_token().is_cancelled());
        assert_eq!(coordinator.state(), LifecycleState::Listening);
    }

    #[tokio::test]
    async fn test_debug_shows_state() {
        let coordinator = ShutdownCoordinator::new(LifecycleConfig::default(), ManualOnly);
        let rendered = format!("{:?}", coordinator);
        assert!(rendered.contains("Uninitialized"));
    }
}
