//! Submit action: navigate, upload references, inject the prompt, poll to
//! a terminal status, download results and sync the naming index.

use easel_core::{markers, ArtifactNamer, EngineConfig, ExchangePaths, Result, TaskRecord};
use tracing::{error, info, warn};

use crate::actions::{primitives, ActionOutcome};
use crate::classifier::{KeywordSets, ResponseStatus};
use crate::session::BrowserSession;

/// Polling budget: generation plus rendering regularly takes tens of
/// seconds on a fresh conversation
const POLL_ATTEMPTS: u32 = 20;

pub async fn run(
    session: &BrowserSession,
    paths: &ExchangePaths,
    task: &TaskRecord,
) -> Result<ActionOutcome> {
    info!(">>> Running submit action");
    let config_path = paths.config();

    // INIT: a broken exchange store is terminal, nothing to retry here
    let cfg = match EngineConfig::load(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("{} {}", markers::FAIL, e);
            return Ok(ActionOutcome::Failed);
        }
    };

    // NAVIGATE: an unreachable page or missing input control needs a
    // fresh load, not a retry
    if let Err(e) = primitives::open_conversation(session, cfg.target_url()).await {
        error!(
            "{} {} Navigation failed: {}",
            markers::FAIL,
            markers::RESET_REQUIRED,
            e
        );
        return Ok(ActionOutcome::ResetRequired);
    }

    // The control surface may have updated prompt/uploads while the page
    // was loading
    let cfg = EngineConfig::load(&config_path).unwrap_or(cfg);

    // UPLOAD
    let attachments = if task.attachments.is_empty() {
        cfg.upload_task.clone()
    } else {
        task.attachments.clone()
    };
    if let Err(e) = primitives::attach_files(session, &attachments).await {
        error!("{} Upload error: {}", markers::FAIL, e);
        return Ok(ActionOutcome::Failed);
    }

    // SUBMIT
    if !primitives::select_generation_tool(session, primitives::GENERATION_TOOL_KEYWORD).await {
        warn!(">> Tool selection could not be confirmed.");
    }

    let prompt = task
        .subject
        .clone()
        .unwrap_or_else(|| cfg.last_prompt.clone())
        .trim()
        .to_string();
    primitives::inject_prompt(session, &prompt).await?;

    // POLL
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
            error!(
                "{} {} Timeout: no image signal detected.",
                markers::FAIL,
                markers::RESET_REQUIRED
            );
            return Ok(ActionOutcome::ResetRequired);
        }
    }

    // DOWNLOAD
    let mut namer = ArtifactNamer::new(
        cfg.save_dir.clone(),
        cfg.name_prefix.clone(),
        cfg.name_padding,
        cfg.name_start,
    );
    let saved = primitives::download_images(session, &mut namer, &prompt, None).await?;

    // SYNC_CONFIG: persist the advanced index so a restart cannot reuse
    // filenames
    let mut latest = EngineConfig::load(&config_path).unwrap_or(cfg);
    latest.name_start = namer.next_index();
    latest.store(&config_path)?;

    info!(
        "{} Submit task finished. Downloaded: {}",
        markers::SUCCESS,
        saved
    );
    Ok(ActionOutcome::Success)
}
