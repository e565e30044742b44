//! Browser session lifecycle over the Chrome DevTools Protocol
//!
//! One [`BrowserSession`] wraps the launched browser, its single tab and a
//! per-session download staging directory. The supervisor owns the session
//! exclusively; action scripts borrow it per invocation and must not retain
//! it past their own execution.

use easel_core::{EaselError, Result};
use headless_chrome::protocol::cdp::Browser as BrowserCdp;
use headless_chrome::protocol::cdp::Network::CookieParam;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::protocol::cdp::DOM;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::collections::HashSet;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// User agent presented to the target page; a bare headless UA trips the
/// site's automation detection
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";

/// Headless sessions get a fixed large viewport; headed sessions keep the
/// window manager's size
const HEADLESS_VIEWPORT: (u32, u32) = (2560, 1440);
const HEADED_VIEWPORT: (u32, u32) = (1920, 1080);

/// Polling cadence while waiting for a staged download to land
const DOWNLOAD_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Active browser session
pub struct BrowserSession {
    /// Underlying browser instance (kept alive for tab lifetime)
    #[allow(dead_code)]
    browser: Browser,
    /// The single tab all actions operate on
    tab: Arc<Tab>,
    headless: bool,
    /// Staging directory the browser downloads into before artifacts are
    /// renamed and persisted
    download_dir: TempDir,
}

impl BrowserSession {
    /// Launch a browser with anti-automation countermeasures applied
    /// before any page script runs.
    pub async fn launch(headless: bool) -> Result<Self> {
        let size = if headless {
            HEADLESS_VIEWPORT
        } else {
            HEADED_VIEWPORT
        };
        info!(
            "Launching browser (headless: {}, size: {}x{})",
            headless, size.0, size.1
        );

        let user_agent_arg = format!("--user-agent={}", USER_AGENT);
        let mut launch_options = LaunchOptions::default_builder()
            .headless(headless)
            .window_size(Some(size))
            // The session outlives any single action; the default idle
            // watchdog would tear it down between tasks.
            .idle_browser_timeout(Duration::from_secs(86_400))
            .build()
            .map_err(|e| EaselError::Browser(format!("Failed to launch browser: {}", e)))?;

        launch_options
            .args
            .push(OsStr::new("--disable-blink-features=AutomationControlled"));
        launch_options.args.push(OsStr::new("--no-sandbox"));
        launch_options.args.push(OsStr::new(&user_agent_arg));

        let browser = Browser::new(launch_options)
            .map_err(|e| EaselError::Browser(format!("Failed to launch browser: {}", e)))?;

        let tab = browser
            .new_tab()
            .map_err(|e| EaselError::Browser(format!("Failed to create tab: {}", e)))?;

        // Fingerprint overrides (navigator.webdriver and friends) are
        // injected before any page script runs.
        tab.enable_stealth_mode()
            .map_err(|e| EaselError::Browser(format!("Stealth injection failed: {}", e)))?;

        let download_dir = TempDir::new()?;
        tab.call_method(BrowserCdp::SetDownloadBehavior {
            behavior: BrowserCdp::SetDownloadBehaviorBehaviorOption::Allow,
            browser_context_id: None,
            download_path: Some(download_dir.path().to_string_lossy().into_owned()),
            events_enabled: Some(true),
        })
        .map_err(|e| EaselError::Browser(format!("Failed to set download path: {}", e)))?;

        info!("Browser launched successfully");

        Ok(Self {
            browser,
            tab,
            headless,
            download_dir,
        })
    }

    pub fn headless(&self) -> bool {
        self.headless
    }

    /// Cheap liveness probe; a dead CDP connection fails every call.
    pub fn is_alive(&self) -> bool {
        self.tab.evaluate("true", false).is_ok()
    }

    /// Navigate and wait for the load to settle.
    pub async fn navigate(&self, url: &str) -> Result<()> {
        debug!("Navigating to {}", url);

        self.tab
            .navigate_to(url)
            .map_err(|e| EaselError::Browser(format!("Failed to navigate to {}: {}", url, e)))?;

        self.tab
            .wait_until_navigated()
            .map_err(|e| EaselError::Browser(format!("Navigation timeout for {}: {}", url, e)))?;

        info!("Successfully navigated to {}", url);
        Ok(())
    }

    /// Wait for an element to appear.
    pub async fn wait_for_element(&self, selector: &str, timeout: Duration) -> Result<()> {
        debug!("Waiting for element: {} (timeout: {:?})", selector, timeout);

        self.tab
            .wait_for_element_with_custom_timeout(selector, timeout)
            .map_err(|_e| EaselError::Browser(format!("Element not found: {}", selector)))?;

        Ok(())
    }

    /// Execute JavaScript in the page context and return its value.
    pub async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .tab
            .evaluate(script, false)
            .map_err(|e| EaselError::Browser(format!("JavaScript evaluation failed: {}", e)))?;

        Ok(result.value.unwrap_or(serde_json::Value::Null))
    }

    /// Execute JavaScript that returns `JSON.stringify(...)` output and
    /// deserialize it.
    ///
    /// Structured results cross the protocol as strings: object returns
    /// come back by reference, not by value.
    pub async fn evaluate_json<T: serde::de::DeserializeOwned>(&self, script: &str) -> Result<T> {
        let value = self.evaluate(script).await?;
        let raw = value.as_str().ok_or_else(|| {
            EaselError::Browser("expected a JSON string from page evaluation".to_string())
        })?;
        Ok(serde_json::from_str(raw)?)
    }

    /// Send a key press to the focused element.
    pub async fn press_key(&self, key: &str) -> Result<()> {
        self.tab
            .press_key(key)
            .map_err(|e| EaselError::Browser(format!("Key press '{}' failed: {}", key, e)))?;
        Ok(())
    }

    /// Type text via synthesized keystrokes.
    pub async fn type_text(&self, text: &str) -> Result<()> {
        self.tab
            .type_str(text)
            .map_err(|e| EaselError::Browser(format!("Typing failed: {}", e)))?;
        Ok(())
    }

    /// Attach a file to a file input element.
    pub async fn set_file_input(&self, selector: &str, file: &Path) -> Result<()> {
        let element = self
            .tab
            .wait_for_element_with_custom_timeout(selector, Duration::from_secs(10))
            .map_err(|_e| EaselError::Browser(format!("File input not found: {}", selector)))?;

        self.tab
            .call_method(DOM::SetFileInputFiles {
                files: vec![file.to_string_lossy().into_owned()],
                node_id: None,
                backend_node_id: Some(element.backend_node_id),
                object_id: None,
            })
            .map_err(|e| {
                EaselError::Browser(format!("Failed to attach {}: {}", file.display(), e))
            })?;

        Ok(())
    }

    /// Capture a full-page screenshot to disk (sign-in diagnosis aid).
    pub async fn save_screenshot(&self, path: &Path) -> Result<()> {
        let data = self
            .tab
            .capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
            .map_err(|e| EaselError::Browser(format!("Screenshot capture failed: {}", e)))?;
        std::fs::write(path, data)?;
        Ok(())
    }

    /// Names currently present in the download staging directory.
    ///
    /// Taken before triggering a download so the new file can be told
    /// apart afterwards.
    pub fn staged_files(&self) -> Result<HashSet<OsString>> {
        let mut names = HashSet::new();
        for entry in std::fs::read_dir(self.download_dir.path())? {
            names.insert(entry?.file_name());
        }
        Ok(names)
    }

    /// Wait for a new, fully-written file to land in the staging
    /// directory.
    pub async fn wait_for_download(
        &self,
        before: &HashSet<OsString>,
        timeout: Duration,
    ) -> Result<PathBuf> {
        let deadline = Instant::now() + timeout;

        while Instant::now() < deadline {
            if let Some(path) = self.find_new_download(before)? {
                // The file must stop growing before it counts as complete.
                let size = std::fs::metadata(&path)?.len();
                tokio::time::sleep(DOWNLOAD_POLL_INTERVAL).await;
                if size > 0 && std::fs::metadata(&path)?.len() == size {
                    debug!("Download captured: {}", path.display());
                    return Ok(path);
                }
                continue;
            }
            tokio::time::sleep(DOWNLOAD_POLL_INTERVAL).await;
        }

        Err(EaselError::Browser(
            "Download did not complete in time".to_string(),
        ))
    }

    fn find_new_download(&self, before: &HashSet<OsString>) -> Result<Option<PathBuf>> {
        for entry in std::fs::read_dir(self.download_dir.path())? {
            let entry = entry?;
            let name = entry.file_name();
            if before.contains(&name) {
                continue;
            }
            let lossy = name.to_string_lossy();
            // In-flight Chromium downloads carry a temporary suffix
            if lossy.ends_with(".crdownload") || lossy.ends_with(".tmp") {
                continue;
            }
            return Ok(Some(entry.path()));
        }
        Ok(None)
    }

    /// Export cookies to a session-state file.
    ///
    /// Headed sessions only: a headless session was seeded read-only from
    /// a prior headed capture and must not clobber it.
    pub fn persist_session_state(&self, path: &Path) -> Result<()> {
        if self.headless {
            return Ok(());
        }
        let cookies = self
            .tab
            .get_cookies()
            .map_err(|e| EaselError::Browser(format!("Cookie export failed: {}", e)))?;
        let state = serde_json::json!({ "cookies": cookies });
        std::fs::write(path, serde_json::to_string_pretty(&state)?)?;
        info!("Session state saved: {}", path.display());
        Ok(())
    }

    /// Inject cookies from a session-state file, returning how many were
    /// restored. A missing file is not an error.
    pub fn restore_session_state(&self, path: &Path) -> Result<usize> {
        if !path.exists() {
            warn!("No session state to inject: {}", path.display());
            return Ok(0);
        }
        let raw = std::fs::read_to_string(path)?;
        let state: serde_json::Value = serde_json::from_str(&raw)?;
        let Some(stored) = state.get("cookies") else {
            return Ok(0);
        };
        let cookies: Vec<CookieParam> = serde_json::from_value(stored.clone())?;
        let count = cookies.len();
        self.tab
            .set_cookies(cookies)
            .map_err(|e| EaselError::Browser(format!("Cookie injection failed: {}", e)))?;
        Ok(count)
    }

    /// Close the browser session.
    pub async fn close(self) {
        info!("Closing browser session");
        // Browser and staging directory are cleaned up on drop
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        debug!("BrowserSession dropped, browser will be cleaned up");
    }
}
