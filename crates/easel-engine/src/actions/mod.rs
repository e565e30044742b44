//! Action scripts
//!
//! One module per task kind, all built from the same shared primitives and
//! the same high-level state machine: initialize from configuration,
//! navigate, optionally upload, submit, poll the classifier to a terminal
//! status, download, sync the naming index back to configuration.
//!
//! Every failure is absorbed here and converted into log markers plus an
//! [`ActionOutcome`]; nothing propagates into the supervisor's dispatch
//! loop.

pub mod primitives;
pub mod redo;
pub mod sandbox;
pub mod scrape;
pub mod signin;
pub mod submit;

/// Terminal outcome of one action execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Classification reached `success`; downloads may still be partial
    Success,
    /// Ordinary failure; the external loop may retry with a redo
    Failed,
    /// Page state is unrecoverable; the external loop must reissue a
    /// fresh submit
    ResetRequired,
    /// Quota exhausted; the external loop must stop entirely
    QuotaExhausted,
}

impl ActionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl std::fmt::Display for ActionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
            Self::ResetRequired => write!(f, "reset_required"),
            Self::QuotaExhausted => write!(f, "quota_exhausted"),
        }
    }
}
