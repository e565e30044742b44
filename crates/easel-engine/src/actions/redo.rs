//! Redo action: regenerate the latest response of the conversation
//! already on screen.
//!
//! Redo-class actions deliberately skip navigation; they must operate on
//! the in-place conversation, not a freshly loaded one.

use easel_core::{markers, ArtifactNamer, EngineConfig, ExchangePaths, Result, TaskRecord};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info};

use crate::actions::{primitives, ActionOutcome};
use crate::classifier::{KeywordSets, ResponseStatus};
use crate::session::BrowserSession;

/// Regeneration reuses a warm conversation, so the budget is shorter than
/// a fresh submit
const POLL_ATTEMPTS: u32 = 15;

/// Only the newest images belong to the regenerated response; anything
/// older is conversation history
const DOWNLOAD_LIMIT: usize = 4;

const REGENERATE_TRIGGER_SCRIPT: &str = r#"(() => {
    const trigger = document.querySelector('button[aria-label*="Regenerate"]') ||
        document.querySelector('mat-icon[data-mat-icon-name="refresh"]')?.closest('button') ||
        document.querySelector('button .google-symbols[fonticon="refresh"]')?.closest('button');
    if (!trigger) return false;
    trigger.scrollIntoView({ behavior: 'smooth', block: 'center' });
    trigger.click();
    return true;
})()"#;

const TRY_AGAIN_SCRIPT: &str = r#"(() => {
    const overlay = document.querySelector('.cdk-overlay-pane');
    if (!overlay) return false;
    const items = Array.from(overlay.querySelectorAll('button[role="menuitem"], .mat-mdc-menu-item'));
    const btn = items.find(b => b.innerText.toLowerCase().includes('try again'));
    if (btn) { btn.click(); return true; }
    return false;
})()"#;

pub async fn run(
    session: &BrowserSession,
    paths: &ExchangePaths,
    task: &TaskRecord,
) -> Result<ActionOutcome> {
    info!(">>> Running redo action");
    let config_path = paths.config();

    let cfg = match EngineConfig::load(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("{} {}", markers::FAIL, e);
            return Ok(ActionOutcome::Failed);
        }
    };

    // Trigger the regenerate menu on the latest response
    let triggered = session
        .evaluate(REGENERATE_TRIGGER_SCRIPT)
        .await?
        .as_bool()
        .unwrap_or(false);
    if !triggered {
        error!("{} Regenerate control not found.", markers::FAIL);
        return Ok(ActionOutcome::Failed);
    }
    sleep(Duration::from_millis(1500)).await;

    let clicked = session
        .evaluate(TRY_AGAIN_SCRIPT)
        .await?
        .as_bool()
        .unwrap_or(false);
    if !clicked {
        error!("{} 'Try again' item not found in menu overlay.", markers::FAIL);
        return Ok(ActionOutcome::Failed);
    }
    info!(">> Regenerate triggered. Monitoring response...");

    let keywords = KeywordSets::from_config(&cfg);
    let observed = primitives::poll_status(session, &keywords, POLL_ATTEMPTS).await?;
    match observed.status {
        ResponseStatus::Refused => {
            error!("{} {}: {}", markers::FAIL, markers::DECLINED, observed.text);
            return Ok(ActionOutcome::Failed);
        }
        ResponseStatus::QuotaExceeded => {
            error!("{} Quota limit detected.", markers::END);
            return Ok(ActionOutcome::QuotaExhausted);
        }
        ResponseStatus::Success => {
            info!(">> Images detected. Starting download...");
        }
        ResponseStatus::Waiting | ResponseStatus::Generating => {
            // The conversation is still usable; an ordinary failure lets
            // the external loop retry with another redo
            error!("{} Timeout: regenerate produced no images.", markers::FAIL);
            return Ok(ActionOutcome::Failed);
        }
    }

    let prompt = task
        .subject
        .clone()
        .unwrap_or_else(|| cfg.last_prompt.clone())
        .trim()
        .to_string();
    let mut namer = ArtifactNamer::new(
        cfg.save_dir.clone(),
        cfg.name_prefix.clone(),
        cfg.name_padding,
        cfg.name_start,
    );
    let saved =
        primitives::download_images(session, &mut namer, &prompt, Some(DOWNLOAD_LIMIT)).await?;

    let mut latest = EngineConfig::load(&config_path).unwrap_or(cfg);
    latest.name_start = namer.next_index();
    latest.store(&config_path)?;

    info!(
        "{} Redo task finished. Downloaded: {}",
        markers::SUCCESS,
        saved
    );
    Ok(ActionOutcome::Success)
}
