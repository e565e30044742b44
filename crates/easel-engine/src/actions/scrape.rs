//! Metadata-scrape action: read the assistant's name and description off
//! the conversation page and write them to the scrape-result file.

use easel_core::{markers, EngineConfig, ExchangePaths, Result, ScrapeResult};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info};

use crate::actions::ActionOutcome;
use crate::session::BrowserSession;

/// Content renders asynchronously after navigation; poll fast and stop
/// early on the first hit
const POLL_ATTEMPTS: u32 = 40;
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Placeholder title of the host application; means the real name has not
/// rendered yet
const HOST_TITLE: &str = "Gemini";

const SCRAPE_SCRIPT: &str = r#"(() => {
    const clean = t => t ? t.replace(/\s+/g, ' ').trim() : '';
    let name = '';
    const nameEl = document.querySelector('.bot-name-container');
    if (nameEl) {
        const copy = nameEl.cloneNode(true);
        const badge = copy.querySelector('bot-experiment-badge, .bot-name-container-animation-box');
        if (badge) badge.remove();
        name = clean(copy.innerText);
    }
    const descEl = document.querySelector('.bot-description');
    return JSON.stringify({ name, description: descEl ? clean(descEl.innerText) : '' });
})()"#;

pub async fn run(session: &BrowserSession, paths: &ExchangePaths) -> Result<ActionOutcome> {
    info!(">>> Running metadata scrape");

    let cfg = match EngineConfig::load(&paths.config()) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("{} {}", markers::FAIL, e);
            return Ok(ActionOutcome::Failed);
        }
    };

    info!(">> Navigating to: {}", cfg.target_url());
    if let Err(e) = session.navigate(cfg.target_url()).await {
        error!(
            "{} {} Navigation failed: {}",
            markers::FAIL,
            markers::RESET_REQUIRED,
            e
        );
        return Ok(ActionOutcome::ResetRequired);
    }

    info!(">> Polling for page metadata...");
    let mut result = ScrapeResult::default();
    for attempt in 0..POLL_ATTEMPTS {
        result = session.evaluate_json(SCRAPE_SCRIPT).await?;
        if !result.name.is_empty() && result.name != HOST_TITLE {
            info!(">> Content found at poll {}", attempt + 1);
            break;
        }
        sleep(POLL_INTERVAL).await;
    }

    // Fall back to the document title with the host suffix stripped
    if result.name.is_empty() {
        let title = session
            .evaluate("document.title")
            .await?
            .as_str()
            .unwrap_or_default()
            .to_string();
        result.name = title
            .trim_end_matches(&format!(" - {}", HOST_TITLE))
            .trim()
            .to_string();
    }
    if result.name.is_empty() || result.name == HOST_TITLE {
        result.name = "New Gem (Fetch Failed)".to_string();
    }

    result.store(&paths.scrape_result())?;
    info!("{} Scrape finished: {}", markers::SUCCESS, result.name);
    Ok(ActionOutcome::Success)
}
