//! Session supervisor and task-dispatch loop
//!
//! The supervisor exclusively owns the one browser session per engine
//! process and polls the single-slot task mailbox, executing one task to
//! completion before the slot is examined again. Every dispatch is wrapped
//! in a catch-all: an action's failure becomes log lines, never a dead
//! dispatch loop.

use easel_core::{
    markers, sync_engine_version, EngineConfig, ExchangePaths, Mailbox, TaskAction, TaskRecord,
};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::actions;
use crate::actions::primitives::TEXTBOX_SELECTOR;
use crate::session::BrowserSession;

/// Version stamped into the shared configuration at startup
pub const ENGINE_VERSION: &str = concat!("V", env!("CARGO_PKG_VERSION"));

/// Mailbox polling cadence
const MAILBOX_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Grace period after the task file appears, letting a concurrent writer
/// finish before the slot is consumed
const MAILBOX_DEBOUNCE: Duration = Duration::from_millis(300);

/// How long the input control may take to appear after the launch
/// navigation; absence is only a warning at this stage
const LAUNCH_INPUT_WAIT: Duration = Duration::from_secs(15);

/// Whether dispatching `action` requires navigating to `configured`.
///
/// Redo-class actions never navigate, whatever the configured URL says;
/// ordinary actions navigate only when the target actually changed.
fn needs_navigation(action: TaskAction, configured: &str, last: Option<&str>) -> bool {
    !action.is_redo() && last != Some(configured)
}

/// Owner of the browser session and the dispatch loop
pub struct Supervisor {
    paths: ExchangePaths,
    mailbox: Mailbox,
    session: Option<BrowserSession>,
    /// URL the last non-redo action navigated to; lets repeated actions
    /// against an unchanged target skip the reload
    last_action_url: Option<String>,
}

impl Supervisor {
    pub fn new(paths: ExchangePaths) -> Self {
        let mailbox = Mailbox::new(paths.task());
        Self {
            paths,
            mailbox,
            session: None,
            last_action_url: None,
        }
    }

    /// Run the dispatch loop. Never returns under normal operation.
    pub async fn run(&mut self) {
        if let Err(e) = sync_engine_version(&self.paths.config(), ENGINE_VERSION) {
            warn!("Version sync failed: {}", e);
        } else {
            info!("Engine synchronized to {}", ENGINE_VERSION);
        }
        info!("Engine {} active. Listening for tasks...", ENGINE_VERSION);

        loop {
            if self.mailbox.is_pending() {
                sleep(MAILBOX_DEBOUNCE).await;
                match self.mailbox.take() {
                    Ok(Some(task)) => self.handle_task(task).await,
                    Ok(None) => {}
                    Err(e) => error!("Discarded unreadable task record: {}", e),
                }
            }
            sleep(MAILBOX_POLL_INTERVAL).await;
        }
    }

    async fn handle_task(&mut self, task: TaskRecord) {
        debug!(
            "Task '{}' received ({:.1}s after posting)",
            task.action,
            task.age_secs()
        );
        match task.action {
            TaskAction::Launch => self.ensure_session(false).await,
            TaskAction::LaunchHeadless => self.ensure_session(true).await,
            TaskAction::CloseBrowser => self.close_session().await,
            _ => {
                if self.session.is_some() {
                    self.dispatch_action(&task).await;
                } else {
                    error!("Action '{}' ignored: browser inactive.", task.action);
                }
            }
        }
    }

    /// Launch the browser session. Idempotent: a request while a session
    /// is already active is a no-op.
    async fn ensure_session(&mut self, headless: bool) {
        if self.session.is_some() {
            info!("Launch request ignored: a session is already active.");
            return;
        }

        let session = match BrowserSession::launch(headless).await {
            Ok(session) => session,
            Err(e) => {
                error!("{} Launch failed: {}", markers::FAIL, e);
                return;
            }
        };

        if headless {
            // Headless sessions are seeded from a prior headed capture
            match session.restore_session_state(&self.paths.session_state()) {
                Ok(0) => {}
                Ok(count) => info!("Injected {} cookies.", count),
                Err(e) => warn!("Cookie injection failed: {}", e),
            }
        }

        let cfg = EngineConfig::load_or_default(&self.paths.config());
        let url = cfg.target_url().to_string();
        info!("Navigating to {}...", url);
        match session.navigate(&url).await {
            Ok(()) => {
                self.last_action_url = Some(url);
                if session
                    .wait_for_element(TEXTBOX_SELECTOR, LAUNCH_INPUT_WAIT)
                    .await
                    .is_ok()
                {
                    info!("Input control detected and ready.");
                } else {
                    warn!("Input control not found yet, page might still be loading.");
                }
            }
            Err(e) => warn!("Initial navigation failed: {}", e),
        }

        if let Err(e) = session.persist_session_state(&self.paths.session_state()) {
            warn!("Session state save failed: {}", e);
        }

        self.session = Some(session);
        info!(
            "{}. Mode: {}",
            markers::BROWSER_READY,
            if headless { "headless" } else { "headed" }
        );
    }

    async fn close_session(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = session.persist_session_state(&self.paths.session_state()) {
                warn!("Session state save failed: {}", e);
            }
            session.close().await;
            self.last_action_url = None;
        }
        info!("Browser closed.");
    }

    async fn dispatch_action(&mut self, task: &TaskRecord) {
        let alive = self.session.as_ref().map(|s| s.is_alive()).unwrap_or(false);
        if !alive {
            error!(
                "Action '{}' ignored: session no longer responds.",
                task.action
            );
            self.session = None;
            self.last_action_url = None;
            return;
        }

        // URL synchronization with redo protection
        if task.action.is_redo() {
            info!("Redo action '{}': keeping current page.", task.action);
        } else {
            let cfg = EngineConfig::load_or_default(&self.paths.config());
            let url = cfg.target_url().to_string();
            if needs_navigation(task.action, &url, self.last_action_url.as_deref()) {
                info!(
                    "URL change detected: {} -> {}",
                    self.last_action_url.as_deref().unwrap_or("(none)"),
                    url
                );
                let Some(session) = self.session.as_ref() else {
                    return;
                };
                if let Err(e) = session.navigate(&url).await {
                    error!(
                        "{} {} Navigation failed: {}",
                        markers::FAIL,
                        markers::RESET_REQUIRED,
                        e
                    );
                    return;
                }
                self.last_action_url = Some(url);
            } else {
                debug!("URL unchanged: {}", url);
            }
        }

        let Some(session) = self.session.as_ref() else {
            return;
        };
        info!("Executing action: {}", task.action);

        let result = match task.action {
            TaskAction::UploadTest => actions::submit::run(session, &self.paths, task).await,
            TaskAction::UploadTestRedo => actions::redo::run(session, &self.paths, task).await,
            TaskAction::CheckSignin => actions::signin::run(session, &self.paths).await,
            TaskAction::ScrapeGemInfo => actions::scrape::run(session, &self.paths).await,
            TaskAction::SandBox => actions::sandbox::run(session).await,
            // Lifecycle instructions are handled before dispatch
            TaskAction::Launch | TaskAction::LaunchHeadless | TaskAction::CloseBrowser => return,
        };

        match result {
            Ok(outcome) => debug!("Action '{}' finished: {}", task.action, outcome),
            Err(e) => error!("{} Action '{}' crashed: {}", markers::FAIL, task.action, e),
        }

        // Headed sessions re-export cookies after every action;
        // persist_session_state itself is a no-op for headless
        if let Err(e) = session.persist_session_state(&self.paths.session_state()) {
            warn!("Session state save failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_version_format() {
        assert!(ENGINE_VERSION.starts_with('V'));
        assert!(ENGINE_VERSION.len() > 1);
    }

    #[test]
    fn test_redo_never_navigates() {
        // Even a changed target URL must not trigger navigation for a
        // redo-class action
        assert!(!needs_navigation(
            TaskAction::UploadTestRedo,
            "https://example.com/b",
            Some("https://example.com/a"),
        ));
        assert!(!needs_navigation(
            TaskAction::UploadTestRedo,
            "https://example.com/a",
            None,
        ));
    }

    #[test]
    fn test_ordinary_action_navigates_only_on_change() {
        assert!(needs_navigation(
            TaskAction::UploadTest,
            "https://example.com/b",
            Some("https://example.com/a"),
        ));
        assert!(!needs_navigation(
            TaskAction::UploadTest,
            "https://example.com/a",
            Some("https://example.com/a"),
        ));
        assert!(needs_navigation(TaskAction::UploadTest, "https://example.com/a", None));
    }
}
