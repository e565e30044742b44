//! Flat-file exchange store between the engine and the control surface
//!
//! Three files coordinate the two processes: a single-slot task mailbox
//! (`task.json`), the running configuration (`config.json`) and the engine
//! log. The mailbox is deliberately not a queue: a record written while
//! another is still unconsumed is overwritten, last write wins. Callers
//! tolerate occasional task loss; this is a documented race, not a bug.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{markers, Result};

/// Instruction kinds accepted by the engine dispatch loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskAction {
    Launch,
    LaunchHeadless,
    CloseBrowser,
    UploadTest,
    UploadTestRedo,
    CheckSignin,
    ScrapeGemInfo,
    SandBox,
}

impl TaskAction {
    /// Redo-class actions operate on the in-place conversation and must
    /// never trigger a navigation, even when the configured URL changed.
    pub fn is_redo(&self) -> bool {
        matches!(self, Self::UploadTestRedo)
    }

    /// Session-lifecycle instructions handled by the supervisor itself
    /// rather than routed to an action script.
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, Self::Launch | Self::LaunchHeadless | Self::CloseBrowser)
    }
}

impl std::fmt::Display for TaskAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Launch => write!(f, "launch"),
            Self::LaunchHeadless => write!(f, "launch_headless"),
            Self::CloseBrowser => write!(f, "close_browser"),
            Self::UploadTest => write!(f, "upload_test"),
            Self::UploadTestRedo => write!(f, "upload_test_redo"),
            Self::CheckSignin => write!(f, "check_signin"),
            Self::ScrapeGemInfo => write!(f, "scrape_gem_info"),
            Self::SandBox => write!(f, "sand_box"),
        }
    }
}

impl std::str::FromStr for TaskAction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "launch" => Ok(Self::Launch),
            "launch_headless" => Ok(Self::LaunchHeadless),
            "close_browser" => Ok(Self::CloseBrowser),
            "upload_test" => Ok(Self::UploadTest),
            "upload_test_redo" => Ok(Self::UploadTestRedo),
            "check_signin" => Ok(Self::CheckSignin),
            "scrape_gem_info" => Ok(Self::ScrapeGemInfo),
            "sand_box" => Ok(Self::SandBox),
            _ => Err(format!("Unknown action: {}", s)),
        }
    }
}

/// One instruction record, consumed exactly once
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub action: TaskAction,

    /// Prompt text override; generation actions fall back to the
    /// configuration's `last_prompt`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    /// Reference images to upload before submitting
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<PathBuf>,

    /// Seconds since the epoch at write time
    #[serde(default)]
    pub timestamp: f64,
}

impl TaskRecord {
    pub fn new(action: TaskAction) -> Self {
        Self {
            action,
            subject: None,
            attachments: Vec::new(),
            timestamp: chrono::Utc::now().timestamp_millis() as f64 / 1000.0,
        }
    }

    /// Age of the record in seconds, or zero for untimestamped records.
    pub fn age_secs(&self) -> f64 {
        if self.timestamp <= 0.0 {
            return 0.0;
        }
        let now = chrono::Utc::now().timestamp_millis() as f64 / 1000.0;
        (now - self.timestamp).max(0.0)
    }
}

/// Single-slot task mailbox backed by one JSON file
#[derive(Debug, Clone)]
pub struct Mailbox {
    path: PathBuf,
}

impl Mailbox {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Whether a record is waiting to be consumed.
    pub fn is_pending(&self) -> bool {
        self.path.exists()
    }

    /// Consume the pending record, if any.
    ///
    /// The file is removed before the payload is parsed: a corrupt record
    /// must surface as one error, not wedge the dispatch loop retrying the
    /// same bytes forever.
    pub fn take(&self) -> Result<Option<TaskRecord>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&self.path)?;
        std::fs::remove_file(&self.path)?;
        let task = serde_json::from_str(&raw)?;
        Ok(Some(task))
    }

    /// Write a record into the slot, overwriting any unconsumed one
    /// (last write wins).
    pub fn post(&self, task: &TaskRecord) -> Result<()> {
        let raw = serde_json::to_string_pretty(task)?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }
}

/// Derived, resettable aggregate over engine log lines
///
/// Produced by an external log scanner and consumed by the control surface
/// only; the engine never reads it back. Fully reconstructible by rescanning
/// the log from offset zero. The accounting rule is increment-on-detection:
/// a refusal line bumps `image_decline`, a non-refusal `[FAIL]` bumps
/// `fail_count`, every terminal marker bumps `total_count`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountersRecord {
    pub total_count: u64,
    pub image_save: u64,
    pub image_decline: u64,
    pub fail_count: u64,
    pub line_offset: u64,
}

impl CountersRecord {
    /// Fold one log line into the aggregate.
    pub fn apply_line(&mut self, line: &str) {
        self.line_offset += 1;

        if line.contains(markers::SAVED) {
            self.image_save += 1;
        }
        if line.contains(markers::SUCCESS) || line.contains(markers::END) {
            self.total_count += 1;
        } else if line.contains(markers::FAIL) {
            self.total_count += 1;
            if line.contains(markers::DECLINED) {
                self.image_decline += 1;
            } else {
                self.fail_count += 1;
            }
        }
    }

    /// Fold a batch of new lines (everything past `line_offset`).
    pub fn apply_lines<'a, I: IntoIterator<Item = &'a str>>(&mut self, lines: I) {
        for line in lines {
            self.apply_line(line);
        }
    }
}

/// Result record written by the metadata-scrape action
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScrapeResult {
    pub name: String,
    pub description: String,
}

impl ScrapeResult {
    pub fn store(&self, path: &Path) -> Result<()> {
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw)?;
        Ok(())
    }
}

/// Well-known locations of the exchange files under one root directory
#[derive(Debug, Clone)]
pub struct ExchangePaths {
    root: PathBuf,
}

impl ExchangePaths {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> PathBuf {
        self.root.join("config.json")
    }

    pub fn task(&self) -> PathBuf {
        self.root.join("task.json")
    }

    pub fn log(&self) -> PathBuf {
        self.root.join("engine.log")
    }

    /// Cookie snapshot used to seed headless relaunches
    pub fn session_state(&self) -> PathBuf {
        self.root.join("state.json")
    }

    pub fn scrape_result(&self) -> PathBuf {
        self.root.join("scraped_info.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_action_round_trip() {
        for action in [
            TaskAction::Launch,
            TaskAction::LaunchHeadless,
            TaskAction::CloseBrowser,
            TaskAction::UploadTest,
            TaskAction::UploadTestRedo,
            TaskAction::CheckSignin,
            TaskAction::ScrapeGemInfo,
            TaskAction::SandBox,
        ] {
            let parsed = TaskAction::from_str(&action.to_string()).expect("parse");
            assert_eq!(parsed, action);
        }
    }

    #[test]
    fn test_only_redo_skips_navigation() {
        assert!(TaskAction::UploadTestRedo.is_redo());
        assert!(!TaskAction::UploadTest.is_redo());
        assert!(!TaskAction::ScrapeGemInfo.is_redo());
    }

    #[test]
    fn test_lifecycle_actions() {
        assert!(TaskAction::Launch.is_lifecycle());
        assert!(TaskAction::LaunchHeadless.is_lifecycle());
        assert!(TaskAction::CloseBrowser.is_lifecycle());
        assert!(!TaskAction::UploadTest.is_lifecycle());
        assert!(!TaskAction::SandBox.is_lifecycle());
    }

    #[test]
    fn test_task_record_wire_format() {
        let task: TaskRecord = serde_json::from_str(
            r#"{"action": "upload_test", "subject": "a red fox", "attachments": [], "timestamp": 1726000000.5}"#,
        )
        .expect("parse");
        assert_eq!(task.action, TaskAction::UploadTest);
        assert_eq!(task.subject.as_deref(), Some("a red fox"));
        assert!(task.attachments.is_empty());
    }

    #[test]
    fn test_mailbox_consume_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mailbox = Mailbox::new(dir.path().join("task.json"));

        assert!(mailbox.take().expect("take").is_none());

        mailbox
            .post(&TaskRecord::new(TaskAction::CheckSignin))
            .expect("post");
        assert!(mailbox.is_pending());

        let task = mailbox.take().expect("take").expect("record");
        assert_eq!(task.action, TaskAction::CheckSignin);

        // Slot is empty after consumption
        assert!(!mailbox.is_pending());
        assert!(mailbox.take().expect("take").is_none());
    }

    #[test]
    fn test_mailbox_last_write_wins() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mailbox = Mailbox::new(dir.path().join("task.json"));

        mailbox.post(&TaskRecord::new(TaskAction::Launch)).expect("post");
        mailbox.post(&TaskRecord::new(TaskAction::SandBox)).expect("post");

        let task = mailbox.take().expect("take").expect("record");
        assert_eq!(task.action, TaskAction::SandBox);
    }

    #[test]
    fn test_mailbox_corrupt_record_is_consumed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("task.json");
        std::fs::write(&path, "{not json").expect("write");

        let mailbox = Mailbox::new(path.clone());
        assert!(mailbox.take().is_err());
        // The bad payload must not remain in the slot
        assert!(!path.exists());
    }

    #[test]
    fn test_counters_accounting() {
        let mut counters = CountersRecord::default();
        counters.apply_lines([
            ">> Saved: art_01.png",
            "[SUCCESS] Submit task finished. Downloaded: 1",
            "[FAIL] Declined to generate: policy hit",
            "[FAIL] [RESET_REQUIRED] Navigation crash",
            "[END] Quota limit detected.",
            ">> [MONITOR] Status: waiting (attempt 5/20)",
        ]);

        assert_eq!(counters.image_save, 1);
        assert_eq!(counters.total_count, 4);
        assert_eq!(counters.image_decline, 1);
        assert_eq!(counters.fail_count, 1);
        assert_eq!(counters.line_offset, 6);
    }
}
