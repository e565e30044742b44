//! Sign-in status check with screenshot evidence for headless diagnosis.

use easel_core::{ExchangePaths, Result};
use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::actions::ActionOutcome;
use crate::session::BrowserSession;

const AVATAR_VISIBLE_SCRIPT: &str = r#"(() => {
    const els = document.querySelectorAll(
        'a[href*="accounts.google.com/SignOut"], button[aria-label*="Google Account"]');
    return Array.from(els).some(e => e.offsetParent !== null);
})()"#;

const SIGNIN_VISIBLE_SCRIPT: &str = r#"(() => {
    const links = document.querySelectorAll('a[href*="accounts.google.com/ServiceLogin"]');
    if (Array.from(links).some(e => e.offsetParent !== null)) return true;
    const btn = Array.from(document.querySelectorAll('button'))
        .find(b => b.innerText.toLowerCase().includes('sign in') && b.offsetParent !== null);
    return !!btn;
})()"#;

const SIDEBAR_VISIBLE_SCRIPT: &str = r#"(() => {
    const el = document.querySelector('div[data-test-id="conversations-list"]');
    return !!el && el.offsetParent !== null;
})()"#;

pub async fn run(session: &BrowserSession, paths: &ExchangePaths) -> Result<ActionOutcome> {
    info!("Checking sign-in status...");

    // Headless renders settle late; give the account chrome time to paint
    sleep(Duration::from_secs(3)).await;

    let avatar_visible = session
        .evaluate(AVATAR_VISIBLE_SCRIPT)
        .await?
        .as_bool()
        .unwrap_or(false);
    if avatar_visible {
        info!("Sign-in status: logged in.");
        return Ok(ActionOutcome::Success);
    }

    let signin_visible = session
        .evaluate(SIGNIN_VISIBLE_SCRIPT)
        .await?
        .as_bool()
        .unwrap_or(false);
    if signin_visible {
        let shot = paths.root().join("headless_signin_detected.png");
        save_evidence(session, &shot).await;
        warn!(
            "Sign-in status: not logged in. Screenshot saved to {}",
            shot.display()
        );
        return Ok(ActionOutcome::Failed);
    }

    // Neither control found; the conversation sidebar is a weaker but
    // reliable logged-in signal
    let sidebar_visible = session
        .evaluate(SIDEBAR_VISIBLE_SCRIPT)
        .await?
        .as_bool()
        .unwrap_or(false);
    if sidebar_visible {
        info!("Sign-in status: logged in (detected via sidebar).");
        return Ok(ActionOutcome::Success);
    }

    let shot = paths.root().join("headless_unknown_state.png");
    save_evidence(session, &shot).await;
    warn!(
        "Sign-in status: unknown. Screenshot saved to {}",
        shot.display()
    );
    Ok(ActionOutcome::Failed)
}

async fn save_evidence(session: &BrowserSession, path: &Path) {
    if let Err(e) = session.save_screenshot(path).await {
        warn!("Could not capture screenshot: {}", e);
    }
}
