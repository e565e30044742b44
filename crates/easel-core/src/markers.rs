//! Log line markers parsed by external consumers
//!
//! The engine log is a line-oriented contract: the control surface tails it
//! and reacts to these markers. Consumers scan trailing lines rather than
//! just the last one, because several markers can land in quick succession.

/// Terminal success of an action
pub const SUCCESS: &str = "[SUCCESS]";

/// Terminal failure of an action
pub const FAIL: &str = "[FAIL]";

/// Qualifier on `[FAIL]`: the page state is unrecoverable and the external
/// loop must reissue a fresh submit instead of a lightweight redo
pub const RESET_REQUIRED: &str = "[RESET_REQUIRED]";

/// Quota exhaustion: a deliberate stop, never retried automatically
pub const END: &str = "[END]";

/// Emitted once the browser session is launched and navigated
pub const BROWSER_READY: &str = ">>> Browser Ready";

/// Classifier observation lines (status plus extracted text)
pub const DETECTION: &str = "[DETECTION]";

/// Emitted per saved artifact; counted by the external log scanner
pub const SAVED: &str = "Saved:";

/// Refusal phrasing emitted with `[FAIL]` when the target declines a prompt
pub const DECLINED: &str = "Declined to generate";
