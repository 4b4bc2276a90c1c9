//! Description of what triggered a shutdown

use std::fmt;
use std::time::Instant;

/// The event that started the shutdown sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminationKind {
    /// SIGINT / Ctrl+C
    Interrupt,
    /// SIGTERM
    Terminate,
    /// Programmatic `close()`
    Manual,
}

impl TerminationKind {
    /// Human readable name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for TerminationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable descriptor handed to every participant's `graceful_close`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminationInfo {
    kind: TerminationKind,
    observed_at: Instant,
}

impl TerminationInfo {
    pub fn new(kind: TerminationKind) -> Self {
        Self {
            kind,
            observed_at: Instant::now(),
        }
    }

    pub fn kind(&self) -> TerminationKind {
        self.kind
    }

    /// When the listener observed the trigger
    pub fn observed_at(&self) -> Instant {
        self.observed_at
    }

    /// True for OS-originated triggers
    pub fn is_signal(&self) -> bool {
        !matches!(self.kind, TerminationKind::Manual)
    }
}

impl fmt::Display for TerminationInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.kind, f)
    }
}
