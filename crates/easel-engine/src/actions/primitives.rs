//! Shared page-manipulation primitives used by every action script
//!
//! All selectors here are heuristic, best-effort probes against a
//! third-party page with no stable markup contract; each primitive has a
//! terminal fallback instead of assuming a hit.

use easel_core::{markers, ArtifactNamer, EaselError, Result};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::classifier::{check_response_status, Classification, KeywordSets};
use crate::session::BrowserSession;

/// Primary input control of the conversation page
pub const TEXTBOX_SELECTOR: &str = r#"[role="textbox"]"#;

/// Generation tool the submit actions select before injecting a prompt
pub const GENERATION_TOOL_KEYWORD: &str = "create image";

/// Classifier polling cadence
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Heartbeat log line frequency while waiting/generating
const HEARTBEAT_EVERY: u32 = 5;

/// Rendered width below which an image is treated as icon/avatar noise
const MIN_IMAGE_WIDTH: u32 = 150;

/// How long the input control may take to appear after navigation
const INPUT_WAIT: Duration = Duration::from_secs(30);

/// How long a triggered download may take to land in the staging dir
const DOWNLOAD_WAIT: Duration = Duration::from_secs(15);

/// Navigate to the configured conversation URL and wait for the input
/// control to become interactable. Errors here mean the page state is
/// unrecoverable (reset-required).
pub async fn open_conversation(session: &BrowserSession, url: &str) -> Result<()> {
    info!(">> Navigating to: {}", url);
    session.navigate(url).await?;
    session.wait_for_element(TEXTBOX_SELECTOR, INPUT_WAIT).await?;
    info!(">> Input control detected.");
    Ok(())
}

const OPEN_ATTACH_MENU_SCRIPT: &str = r#"(() => {
    const icon = document.querySelector('mat-icon[data-mat-icon-name="add_2"]');
    if (icon && icon.closest('button')) { icon.closest('button').click(); return true; }
    const btn = Array.from(document.querySelectorAll('button'))
        .find(b => b.ariaLabel?.includes('Add') || b.innerHTML.includes('plus'));
    if (btn) { btn.click(); return true; }
    return false;
})()"#;

const PICK_UPLOAD_OPTION_SCRIPT: &str = r#"(() => {
    const opt = Array.from(document.querySelectorAll('.menu-text, [role="menuitem"], span'))
        .find(i => i.innerText && i.innerText.toLowerCase().includes('upload files'));
    if (opt) { opt.click(); return true; }
    return false;
})()"#;

/// Attach each existing file through the host's attach affordance.
///
/// Any single file's failure aborts the whole action; files missing on
/// disk are skipped without counting as failure.
pub async fn attach_files(session: &BrowserSession, files: &[PathBuf]) -> Result<usize> {
    let mut attached = 0;

    for file in files {
        if !file.exists() {
            warn!(">> Skipping missing attachment: {}", file.display());
            continue;
        }
        let abs = file.canonicalize()?;

        let menu_open = session
            .evaluate(OPEN_ATTACH_MENU_SCRIPT)
            .await?
            .as_bool()
            .unwrap_or(false);
        if !menu_open {
            return Err(EaselError::Browser("Attach affordance not found".to_string()));
        }
        sleep(Duration::from_secs(2)).await;

        let option_picked = session
            .evaluate(PICK_UPLOAD_OPTION_SCRIPT)
            .await?
            .as_bool()
            .unwrap_or(false);
        if !option_picked {
            return Err(EaselError::Browser(
                "'Upload files' menu item not found".to_string(),
            ));
        }

        session.set_file_input(r#"input[type="file"]"#, &abs).await?;
        // Let the upload visibly complete before the next attachment
        sleep(Duration::from_secs(4)).await;

        info!(">> Attached: {}", abs.display());
        attached += 1;
    }

    Ok(attached)
}

const DRAWER_TOGGLE_SCRIPT: &str = r#"(() => {
    const icon = document.querySelector('mat-icon[data-mat-icon-name="page_info"]');
    const btn = icon ? icon.closest('button') : null;
    if (btn) { btn.click(); return true; }
    return false;
})()"#;

fn tool_click_script(keyword: &str) -> String {
    let literal = serde_json::to_string(&keyword.to_lowercase()).unwrap_or_default();
    format!(
        r#"(() => {{
    const kw = {literal};
    const btn = Array.from(document.querySelectorAll('button, span, .menu-text'))
        .find(i => i.innerText && i.innerText.toLowerCase().includes(kw) && i.offsetParent !== null);
    if (btn) {{ btn.click(); return true; }}
    return false;
}})()"#
    )
}

/// Best-effort selection of the generation tool. A miss is reported, not
/// fatal: the tool may already be active.
pub async fn select_generation_tool(session: &BrowserSession, keyword: &str) -> bool {
    match try_select_tool(session, keyword).await {
        Ok(selected) => selected,
        Err(e) => {
            debug!("Tool selection probe failed: {}", e);
            false
        }
    }
}

async fn try_select_tool(session: &BrowserSession, keyword: &str) -> Result<bool> {
    let script = tool_click_script(keyword);

    let mut clicked = session.evaluate(&script).await?.as_bool().unwrap_or(false);
    if !clicked {
        // The tool list may live in a collapsed drawer
        let drawer = session
            .evaluate(DRAWER_TOGGLE_SCRIPT)
            .await?
            .as_bool()
            .unwrap_or(false);
        if drawer {
            sleep(Duration::from_secs(2)).await;
            clicked = session.evaluate(&script).await?.as_bool().unwrap_or(false);
        }
    }

    if clicked {
        // Give the UI time to switch modes before the prompt goes in
        sleep(Duration::from_secs(3)).await;
    }
    Ok(clicked)
}

fn paste_script(prompt: &str) -> String {
    let literal = serde_json::to_string(prompt).unwrap_or_default();
    format!(
        r#"(() => {{
    const tb = document.querySelector('[role="textbox"]');
    if (!tb) return false;
    tb.focus();
    const text = {literal};
    const dt = new DataTransfer();
    dt.setData('text/plain', text);
    tb.dispatchEvent(new ClipboardEvent('paste', {{ clipboardData: dt, bubbles: true }}));
    if (tb.innerText.trim().length === 0) document.execCommand('insertText', false, text);
    return tb.innerText.trim().length > 0;
}})()"#
    )
}

/// Inject the prompt into the input control and submit it.
///
/// Primary path is a synthetic paste event; if the control stays empty the
/// text is typed directly.
pub async fn inject_prompt(session: &BrowserSession, prompt: &str) -> Result<()> {
    info!(">> Injecting prompt...");
    session.wait_for_element(TEXTBOX_SELECTOR, INPUT_WAIT).await?;

    let pasted = session
        .evaluate(&paste_script(prompt))
        .await?
        .as_bool()
        .unwrap_or(false);
    if !pasted {
        debug!("Paste event left the control empty, typing directly");
        session.type_text(prompt).await?;
    }

    sleep(Duration::from_millis(500)).await;
    session.press_key("Enter").await?;
    info!(">> Prompt submitted. Monitoring...");
    Ok(())
}

/// Poll the classifier until a terminal status or attempt exhaustion.
///
/// Returns the last observation either way; the caller maps a non-terminal
/// final status to its own timeout handling. Heartbeat lines keep an
/// external monitor able to tell "alive but slow" from "stuck".
pub async fn poll_status(
    session: &BrowserSession,
    keywords: &KeywordSets,
    max_attempts: u32,
) -> Result<Classification> {
    let mut last = Classification::waiting();

    for attempt in 0..max_attempts {
        last = check_response_status(session, keywords).await?;
        if last.status.is_terminal() {
            return Ok(last);
        }
        if attempt % HEARTBEAT_EVERY == 0 {
            info!(
                ">> [MONITOR] Status: {} (attempt {}/{})",
                last.status,
                attempt + 1,
                max_attempts
            );
        }
        sleep(POLL_INTERVAL).await;
    }

    Ok(last)
}

fn collect_images_script() -> String {
    format!(
        r#"(() => {{
    const responses = document.querySelectorAll('model-response');
    const last = responses[responses.length - 1];
    if (!last) return JSON.stringify([]);
    const picks = [];
    Array.from(last.querySelectorAll('img')).forEach((img, i) => {{
        if (img.getBoundingClientRect().width > {MIN_IMAGE_WIDTH}) picks.push(i);
    }});
    return JSON.stringify(picks);
}})()"#
    )
}

fn open_preview_script(index: u32) -> String {
    format!(
        r#"(() => {{
    const responses = document.querySelectorAll('model-response');
    const last = responses[responses.length - 1];
    const img = last ? last.querySelectorAll('img')[{index}] : null;
    if (!img) return false;
    img.scrollIntoView({{ behavior: 'instant', block: 'center' }});
    img.click();
    return true;
}})()"#
    )
}

const DOWNLOAD_BUTTON_SCRIPT: &str = r#"(() => {
    const btn = Array.from(document.querySelectorAll('button'))
        .find(b => (b.ariaLabel?.includes('Download') ||
                    b.title?.includes('Download') ||
                    b.innerText.includes('Download')) && b.offsetParent !== null);
    if (btn) { btn.click(); return true; }
    return false;
})()"#;

/// Download every qualifying image in the latest response.
///
/// Thumbnails below the minimum rendered width are noise (avatars, icons)
/// and skipped. Per-image failures are logged and the loop continues;
/// partial success is a valid outcome. Returns the number of artifacts
/// saved.
pub async fn download_images(
    session: &BrowserSession,
    namer: &mut ArtifactNamer,
    prompt: &str,
    limit: Option<usize>,
) -> Result<u32> {
    std::fs::create_dir_all(namer.save_dir())?;

    let mut indexes: Vec<u32> = session.evaluate_json(&collect_images_script()).await?;
    if let Some(limit) = limit {
        if indexes.len() > limit {
            let skipped = indexes.len() - limit;
            indexes = indexes.split_off(skipped);
            debug!(
                ">> Ignoring {} older images, downloading the newest {}",
                skipped, limit
            );
        }
    }
    info!(">> Found {} target images to download.", indexes.len());

    let mut saved = 0;
    for index in indexes {
        match download_one(session, namer, prompt, index).await {
            Ok(name) => {
                info!(">> {} {}", markers::SAVED, name);
                saved += 1;
            }
            Err(e) => warn!(">> Image {} skipped: {}", index, e),
        }
        // Always close the preview, even after a failure; a stuck overlay
        // would break every following image.
        if let Err(e) = session.press_key("Escape").await {
            warn!(">> Could not close preview: {}", e);
        }
        sleep(Duration::from_secs(1)).await;
    }

    Ok(saved)
}

async fn download_one(
    session: &BrowserSession,
    namer: &mut ArtifactNamer,
    prompt: &str,
    index: u32,
) -> Result<String> {
    let opened = session
        .evaluate(&open_preview_script(index))
        .await?
        .as_bool()
        .unwrap_or(false);
    if !opened {
        return Err(EaselError::Browser(format!("Preview {} did not open", index)));
    }
    sleep(Duration::from_secs(3)).await;

    let before = session.staged_files()?;
    let clicked = session
        .evaluate(DOWNLOAD_BUTTON_SCRIPT)
        .await?
        .as_bool()
        .unwrap_or(false);
    if !clicked {
        return Err(EaselError::Browser(
            "Download button not found in preview".to_string(),
        ));
    }

    let staged = session.wait_for_download(&before, DOWNLOAD_WAIT).await?;

    let dest = namer.claim_next();
    crate::artifact::embed_prompt(&staged, &dest, prompt)?;
    namer.advance();
    let _ = std::fs::remove_file(&staged);

    let name = dest
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| dest.display().to_string());
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paste_script_escapes_prompt() {
        let script = paste_script("line \"one\"\nline 'two'");
        // The prompt must land as a single JS string literal
        assert!(script.contains(r#""line \"one\"\nline 'two'""#));
    }

    #[test]
    fn test_tool_click_script_lowercases_keyword() {
        let script = tool_click_script("Create Image");
        assert!(script.contains(r#""create image""#));
    }

    #[test]
    fn test_collect_images_script_uses_width_filter() {
        assert!(collect_images_script().contains("width > 150"));
    }

    #[test]
    fn test_open_preview_script_indexes() {
        assert!(open_preview_script(3).contains("[3]"));
    }
}
