//! Running configuration shared with the control surface
//!
//! `config.json` is mutated by both sides: the control surface owns the
//! target URL, naming scheme, prompt and upload list; the engine only writes
//! `name_start` back after successful downloads and stamps `engine_version`
//! at startup. All writers perform whole-file read-modify-write with no
//! locking, so each side sticks to its own keys.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{EaselError, Result};

/// Fallback target when the configured URL is missing or blank
pub const DEFAULT_URL: &str = "https://gemini.google.com/app";

/// Running configuration record (`config.json`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Engine version string, stamped by the engine at startup
    #[serde(default)]
    pub engine_version: String,

    /// Target conversation URL
    #[serde(default = "default_url")]
    pub url: String,

    /// Preferred launch mode for the control surface
    #[serde(default)]
    pub headless: bool,

    /// Directory downloaded artifacts are saved into
    #[serde(default = "default_save_dir")]
    pub save_dir: PathBuf,

    /// Artifact filename prefix
    #[serde(default)]
    pub name_prefix: String,

    /// Zero-padding width for the artifact index
    #[serde(default = "default_name_padding")]
    pub name_padding: usize,

    /// Next artifact index; advanced by the engine after each save
    #[serde(default = "default_name_start")]
    pub name_start: u32,

    /// Prompt text submitted by generation actions
    #[serde(default)]
    pub last_prompt: String,

    /// Reference images to attach before submitting
    #[serde(default)]
    pub upload_task: Vec<PathBuf>,

    /// Extra refusal keywords, merged with the built-in defaults
    #[serde(default)]
    pub declined_msg: Vec<String>,

    /// Extra quota-exhaustion keywords, merged with the built-in defaults
    #[serde(default)]
    pub quota_exceeded_msg: Vec<String>,

    /// Keys owned by the control surface that the engine must not drop
    /// when rewriting the file
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_url() -> String {
    DEFAULT_URL.to_string()
}

fn default_save_dir() -> PathBuf {
    PathBuf::from("easel_outputs")
}

fn default_name_padding() -> usize {
    2
}

fn default_name_start() -> u32 {
    1
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            engine_version: String::new(),
            url: default_url(),
            headless: false,
            save_dir: default_save_dir(),
            name_prefix: String::new(),
            name_padding: default_name_padding(),
            name_start: default_name_start(),
            last_prompt: String::new(),
            upload_task: Vec::new(),
            declined_msg: Vec::new(),
            quota_exceeded_msg: Vec::new(),
            extra: serde_json::Map::new(),
        }
    }
}

impl EngineConfig {
    /// Load configuration, failing when the file is missing or unparsable.
    ///
    /// Actions call this at their INIT step and treat any error as a
    /// terminal failure.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            EaselError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            EaselError::Config(format!("cannot parse {}: {}", path.display(), e))
        })
    }

    /// Load configuration, substituting defaults when the file is missing
    /// or corrupt. Used by the supervisor, which must keep running even
    /// with a broken exchange store.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!("Falling back to default configuration: {}", e);
                Self::default()
            }
        }
    }

    /// Rewrite the whole configuration file (pretty-printed JSON).
    pub fn store(&self, path: &Path) -> Result<()> {
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw)?;
        Ok(())
    }

    /// The effective target URL, falling back to [`DEFAULT_URL`] when the
    /// configured value is blank.
    pub fn target_url(&self) -> &str {
        if self.url.trim().is_empty() {
            DEFAULT_URL
        } else {
            &self.url
        }
    }
}

/// Stamp the engine version into an existing configuration file.
///
/// A missing file is a no-op: the control surface has not created the
/// exchange store yet and the engine must not conjure one up.
pub fn sync_engine_version(path: &Path, version: &str) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    let mut cfg = EngineConfig::load(path)?;
    cfg.engine_version = version.to_string();
    cfg.store(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.url, DEFAULT_URL);
        assert_eq!(cfg.name_padding, 2);
        assert_eq!(cfg.name_start, 1);
        assert!(!cfg.headless);
    }

    #[test]
    fn test_partial_record_fills_defaults() {
        let cfg: EngineConfig =
            serde_json::from_str(r#"{"url": "https://example.com", "last_prompt": "a fox"}"#)
                .expect("parse");
        assert_eq!(cfg.url, "https://example.com");
        assert_eq!(cfg.last_prompt, "a fox");
        assert_eq!(cfg.name_start, 1);
        assert!(cfg.upload_task.is_empty());
    }

    #[test]
    fn test_blank_url_falls_back() {
        let cfg: EngineConfig = serde_json::from_str(r#"{"url": "   "}"#).expect("parse");
        assert_eq!(cfg.target_url(), DEFAULT_URL);
    }

    #[test]
    fn test_unknown_keys_survive_rewrite() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"url": "https://example.com", "name_start": 3, "ui_theme": "dark"}"#,
        )
        .expect("write");

        let mut cfg = EngineConfig::load(&path).expect("load");
        cfg.name_start = 4;
        cfg.store(&path).expect("store");

        let raw = std::fs::read_to_string(&path).expect("read");
        let value: serde_json::Value = serde_json::from_str(&raw).expect("parse");
        assert_eq!(value["ui_theme"], "dark");
        assert_eq!(value["name_start"], 4);
    }

    #[test]
    fn test_sync_engine_version_missing_file_is_noop() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        sync_engine_version(&path, "V0.3.1").expect("sync");
        assert!(!path.exists());
    }

    #[test]
    fn test_sync_engine_version_updates_existing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        EngineConfig::default().store(&path).expect("store");
        sync_engine_version(&path, "V9.9.9").expect("sync");
        let cfg = EngineConfig::load(&path).expect("load");
        assert_eq!(cfg.engine_version, "V9.9.9");
    }
}
