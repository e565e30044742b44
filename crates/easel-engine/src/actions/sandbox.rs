//! Sandbox action: open a fresh conversation without touching the URL.

use easel_core::{markers, Result};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::actions::ActionOutcome;
use crate::session::BrowserSession;

const NEW_CHAT_SCRIPT: &str = r#"(() => {
    const byLabel = document.querySelector('[aria-label="New chat"]');
    if (byLabel && byLabel.offsetParent !== null) { byLabel.click(); return true; }
    const byText = Array.from(document.querySelectorAll('button'))
        .find(b => b.innerText.toLowerCase().includes('new chat') && b.offsetParent !== null);
    if (byText) { byText.click(); return true; }
    return false;
})()"#;

const OPEN_MENU_SCRIPT: &str = r#"(() => {
    const btn = document.querySelector('[aria-label="Main menu"], [aria-label="Expand menu"]');
    if (btn && btn.offsetParent !== null) { btn.click(); return true; }
    return false;
})()"#;

pub async fn run(session: &BrowserSession) -> Result<ActionOutcome> {
    info!("Opening a fresh conversation...");

    let clicked = session
        .evaluate(NEW_CHAT_SCRIPT)
        .await?
        .as_bool()
        .unwrap_or(false);
    if clicked {
        sleep(Duration::from_secs(2)).await;
        info!(">> New conversation opened.");
        return Ok(ActionOutcome::Success);
    }

    // Narrow layouts hide the button behind the main menu
    warn!(">> New-conversation control not visible, opening menu first...");
    let menu_open = session
        .evaluate(OPEN_MENU_SCRIPT)
        .await?
        .as_bool()
        .unwrap_or(false);
    if menu_open {
        sleep(Duration::from_secs(1)).await;
        let retried = session
            .evaluate(NEW_CHAT_SCRIPT)
            .await?
            .as_bool()
            .unwrap_or(false);
        if retried {
            sleep(Duration::from_secs(2)).await;
            info!(">> New conversation opened after expanding menu.");
            return Ok(ActionOutcome::Success);
        }
    }

    error!("{} New-conversation control not found.", markers::FAIL);
    Ok(ActionOutcome::Failed)
}
