//! Response-status detection
//!
//! The live page is reduced to a small [`PageProbe`] snapshot by one
//! JavaScript evaluation; classifying the snapshot is a pure function over
//! configurable keyword sets, so the matching rules can be tested (and
//! updated) without a browser.
//!
//! The target application's refusal phrasing is unstable and
//! language-dependent, which is why the built-in keyword lists can be
//! extended through the configuration but never replaced.

use easel_core::{markers, EngineConfig, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::session::BrowserSession;

/// Built-in refusal phrasings (English and Chinese)
const DEFAULT_REFUSAL_KEYWORDS: &[&str] = &[
    "can't generate",
    "cannot generate",
    "policy",
    "safety",
    "real people",
    "minors",
    "不能生成",
    "无法生成",
    "真实人物",
    "未成年人",
    "描绘他们",
    "安全提示",
    "试试其他想法",
    "抱歉",
];

/// Built-in quota-exhaustion phrasings
const DEFAULT_QUOTA_KEYWORDS: &[&str] = &[
    "quota",
    "daily limit",
    "usage limit",
    "reached your limit",
    "已达到",
    "次数已用完",
    "明天再试",
];

/// Snapshot script: collapses the page into the fields the classifier
/// needs. Returned as a JSON string because object results cross the
/// protocol by reference.
const PROBE_SCRIPT: &str = r#"(() => {
    const generating = !!document.querySelector('mat-progress-bar, .generating-progress') ||
                       document.body.innerText.toLowerCase().includes('nano banana');

    const responses = document.querySelectorAll('model-response');
    if (responses.length === 0) {
        return JSON.stringify({ generating, has_response: false, text: '', image_count: 0 });
    }

    const last = responses[responses.length - 1];
    // Refusal text sometimes renders outside the response block; scan
    // paragraph tags as well.
    const paragraphs = Array.from(document.querySelectorAll('p')).map(p => p.innerText).join(' ');

    return JSON.stringify({
        generating,
        has_response: true,
        text: last.innerText + ' ' + paragraphs,
        image_count: last.querySelectorAll('img').length
    });
})()"#;

/// Classification result for one observation of the page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Generating,
    Waiting,
    Refused,
    QuotaExceeded,
    Success,
}

impl ResponseStatus {
    /// Terminal statuses end the polling loop.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Refused | Self::QuotaExceeded | Self::Success)
    }
}

impl std::fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Generating => write!(f, "generating"),
            Self::Waiting => write!(f, "waiting"),
            Self::Refused => write!(f, "refused"),
            Self::QuotaExceeded => write!(f, "quota_exceeded"),
            Self::Success => write!(f, "success"),
        }
    }
}

/// Raw page snapshot extracted by [`PROBE_SCRIPT`]
#[derive(Debug, Clone, Deserialize)]
pub struct PageProbe {
    pub generating: bool,
    pub has_response: bool,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub image_count: u32,
}

/// Merged keyword sets the classifier matches against
#[derive(Debug, Clone)]
pub struct KeywordSets {
    refusal: Vec<String>,
    quota: Vec<String>,
}

impl KeywordSets {
    /// Built-in defaults extended (never replaced) by configured phrases.
    pub fn new(refusal_extra: &[String], quota_extra: &[String]) -> Self {
        Self {
            refusal: merge(DEFAULT_REFUSAL_KEYWORDS, refusal_extra),
            quota: merge(DEFAULT_QUOTA_KEYWORDS, quota_extra),
        }
    }

    pub fn from_config(cfg: &EngineConfig) -> Self {
        Self::new(&cfg.declined_msg, &cfg.quota_exceeded_msg)
    }
}

fn merge(defaults: &[&str], extra: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = defaults.iter().map(|k| k.to_lowercase()).collect();
    for keyword in extra {
        let lowered = keyword.to_lowercase();
        if !lowered.trim().is_empty() && !merged.contains(&lowered) {
            merged.push(lowered);
        }
    }
    merged
}

/// One classified observation: the status plus the flattened response text
#[derive(Debug, Clone)]
pub struct Classification {
    pub status: ResponseStatus,
    pub text: String,
}

impl Classification {
    pub fn waiting() -> Self {
        Self {
            status: ResponseStatus::Waiting,
            text: String::new(),
        }
    }
}

/// Collapse whitespace so one observation is always one log line;
/// downstream consumers parse the log line-by-line.
pub fn flatten_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Classify a page snapshot. Priority order, first match wins:
/// generation marker, no response yet, quota keyword, refusal keyword,
/// embedded image, otherwise still waiting.
pub fn classify(probe: &PageProbe, keywords: &KeywordSets) -> Classification {
    if probe.generating {
        return Classification {
            status: ResponseStatus::Generating,
            text: String::new(),
        };
    }

    if !probe.has_response {
        return Classification::waiting();
    }

    let text = flatten_text(&probe.text);
    let haystack = text.to_lowercase();

    // Quota phrasing often reads like a refusal; check it first.
    let status = if keywords.quota.iter().any(|k| haystack.contains(k)) {
        ResponseStatus::QuotaExceeded
    } else if keywords.refusal.iter().any(|k| haystack.contains(k)) {
        ResponseStatus::Refused
    } else if probe.image_count > 0 {
        ResponseStatus::Success
    } else {
        ResponseStatus::Waiting
    };

    Classification { status, text }
}

/// Probe the live page and classify it.
pub async fn check_response_status(
    session: &BrowserSession,
    keywords: &KeywordSets,
) -> Result<Classification> {
    let probe: PageProbe = session.evaluate_json(PROBE_SCRIPT).await?;
    let classification = classify(&probe, keywords);

    if classification.status != ResponseStatus::Waiting {
        info!(
            "{} Status: {} {}",
            markers::DETECTION,
            classification.status,
            classification.text
        );
    }

    Ok(classification)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(generating: bool, has_response: bool, text: &str, image_count: u32) -> PageProbe {
        PageProbe {
            generating,
            has_response,
            text: text.to_string(),
            image_count,
        }
    }

    fn defaults() -> KeywordSets {
        KeywordSets::new(&[], &[])
    }

    #[test]
    fn test_generating_wins_over_everything() {
        let keywords = defaults();
        let p = probe(true, true, "quota reached and safety policy violated", 3);
        assert_eq!(classify(&p, &keywords).status, ResponseStatus::Generating);
    }

    #[test]
    fn test_no_response_is_waiting() {
        let p = probe(false, false, "", 0);
        assert_eq!(classify(&p, &defaults()).status, ResponseStatus::Waiting);
    }

    #[test]
    fn test_quota_precedes_refusal() {
        // Both keyword families present: quota must win.
        let p = probe(
            false,
            true,
            "Sorry, you reached your limit under our safety policy",
            0,
        );
        assert_eq!(
            classify(&p, &defaults()).status,
            ResponseStatus::QuotaExceeded
        );
    }

    #[test]
    fn test_refusal_detected_case_insensitive() {
        let p = probe(false, true, "I CANNOT GENERATE that image", 0);
        assert_eq!(classify(&p, &defaults()).status, ResponseStatus::Refused);
    }

    #[test]
    fn test_refusal_beats_image_presence() {
        let p = probe(false, true, "blocked by policy", 2);
        assert_eq!(classify(&p, &defaults()).status, ResponseStatus::Refused);
    }

    #[test]
    fn test_image_without_keywords_is_success() {
        let p = probe(false, true, "Here are the results you asked for", 2);
        assert_eq!(classify(&p, &defaults()).status, ResponseStatus::Success);
    }

    #[test]
    fn test_text_without_images_or_keywords_is_waiting() {
        let p = probe(false, true, "Working on it", 0);
        let c = classify(&p, &defaults());
        assert_eq!(c.status, ResponseStatus::Waiting);
        assert_eq!(c.text, "Working on it");
    }

    #[test]
    fn test_configured_keywords_extend_defaults() {
        let keywords = KeywordSets::new(
            &["forbidden subject".to_string()],
            &["no more images today".to_string()],
        );

        let refused = probe(false, true, "This is a Forbidden Subject here", 1);
        assert_eq!(classify(&refused, &keywords).status, ResponseStatus::Refused);

        let quota = probe(false, true, "No more images today, come back soon", 1);
        assert_eq!(
            classify(&quota, &keywords).status,
            ResponseStatus::QuotaExceeded
        );

        // Defaults still apply alongside the extras
        let builtin = probe(false, true, "cannot generate this", 0);
        assert_eq!(classify(&builtin, &keywords).status, ResponseStatus::Refused);
    }

    #[test]
    fn test_chinese_refusal_keywords() {
        let p = probe(false, true, "抱歉，我无法生成这张图片", 0);
        assert_eq!(classify(&p, &defaults()).status, ResponseStatus::Refused);
    }

    #[test]
    fn test_text_is_flattened_to_one_line() {
        let p = probe(false, true, "line one\nline two\n\n   line three", 1);
        let c = classify(&p, &defaults());
        assert_eq!(c.text, "line one line two line three");
    }

    #[test]
    fn test_flatten_text() {
        assert_eq!(flatten_text("  a\tb\r\nc  "), "a b c");
        assert_eq!(flatten_text(""), "");
    }
}
