//! Shutdown participant capability and its failure type

use std::any::Any;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinError;
use tracing::error;

use crate::termination::TerminationInfo;

/// A subsystem that registers a cleanup routine with the coordinator.
///
/// `graceful_close` runs once, concurrently with every other participant,
/// after the shared early-cancellation token has fired. It may block on the
/// participant's own drain but must eventually return. If it panics (or is
/// cut off by a configured timeout) the coordinator calls `recover` on the
/// same participant instead of propagating the failure.
#[async_trait]
pub trait ShutdownParticipant: Send + Sync + 'static {
    /// Name used in logs and failure values
    fn name(&self) -> &str {
        "participant"
    }

    async fn graceful_close(&self, info: TerminationInfo);

    async fn recover(&self, failure: ParticipantFailure) {
        error!("{} recovered: {}", self.name(), failure);
    }
}

/// Abnormal end of a participant's `graceful_close`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParticipantFailure {
    #[error("participant '{participant}' panicked: {message}")]
    Panicked { participant: String, message: String },

    #[error("participant '{participant}' did not finish within {timeout:?}")]
    TimedOut {
        participant: String,
        timeout: Duration,
    },

    #[error("participant '{participant}' was aborted")]
    Aborted { participant: String },
}

impl ParticipantFailure {
    pub fn participant(&self) -> &str {
        match self {
            Self::Panicked { participant, .. }
            | Self::TimedOut { participant, .. }
            | Self::Aborted { participant } => participant,
        }
    }

    pub(crate) fn from_join_error(participant: &str, err: JoinError) -> Self {
        if err.is_panic() {
            Self::Panicked {
                participant: participant.to_string(),
                message: panic_message(err.into_panic()),
            }
        } else {
            Self::Aborted {
                participant: participant.to_string(),
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Participant built from a name and an async closure
///
/// ```ignore
/// coordinator.register(FnParticipant::new("flush", |info| async move {
///     tracing::info!("flushing on {}", info);
/// }))?;
/// ```
pub struct FnParticipant<F> {
    name: String,
    close: F,
}

impl<F, Fut> FnParticipant<F>
where
    F: Fn(TerminationInfo) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    pub fn new(name: impl Into<String>, close: F) -> Self {
        Self {
            name: name.into(),
            close,
        }
    }
}

#[async_trait]
impl<F, Fut> ShutdownParticipant for FnParticipant<F>
where
    F: Fn(TerminationInfo) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn graceful_close(&self, info: TerminationInfo) {
        (self.close)(info).await
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::termination::TerminationKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_panic_join_error_becomes_panicked() {
        let handle = tokio::spawn(async { panic!("flush failed") });
        let err = handle.await.unwrap_err();

        let failure = ParticipantFailure::from_join_error("writer", err);
        assert_eq!(
            failure,
            ParticipantFailure::Panicked {
                participant: "writer".to_string(),
                message: "flush failed".to_string(),
            }
        );
        assert_eq!(failure.participant(), "writer");
    }

    #[tokio::test]
    async fn test_formatted_panic_message_is_kept() {
        let code = 7;
        let handle = tokio::spawn(async move { panic!("exit code {}", code) });
        let err = handle.await.unwrap_err();

        match ParticipantFailure::from_join_error("server", err) {
            ParticipantFailure::Panicked { message, .. } => assert_eq!(message, "exit code 7"),
            other => panic!("unexpected failure: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_aborted_join_error_becomes_aborted() {
        let handle = tokio::spawn(std::future::pending::<()>());
        handle.abort();
        let err = handle.await.unwrap_err();

        let failure = ParticipantFailure::from_join_error("cron", err);
        assert!(matches!(failure, ParticipantFailure::Aborted { .. }));
        assert!(failure.to_string().contains("cron"));
    }

    #[tokio::test]
    async fn test_fn_participant_runs_closure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let participant = FnParticipant::new("counter", move |info: TerminationInfo| {
            let counter = Arc::clone(&counter);
            async move {
                assert_eq!(info.kind(), TerminationKind::Manual);
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        assert_eq!(participant.name(), "counter");
        participant
            .graceful_close(TerminationInfo::new(TerminationKind::Manual))
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
