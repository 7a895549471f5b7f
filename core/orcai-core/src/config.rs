//! Configuration loading, saving and storage paths.
//!
//! Handles:
//! - The persisted summarization endpoint config (`~/.orcai_config.json`)
//! - The orcai data directory (`~/.orcai/`: logs, transcripts)
//! - Capture settings derived from the environment

use crate::error::{OrcaiError, Result};
use crate::PROGRAM_NAME;
use fs_err as fs;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

pub const DEFAULT_MODEL: &str = "gpt-4";
pub const DEFAULT_CONTEXT_LENGTH: u32 = 2048;
pub const DEFAULT_SHELL: &str = "/bin/sh";

const CONFIG_FILE_NAME: &str = ".orcai_config.json";
const DATA_DIR_NAME: &str = ".orcai";

// ─────────────────────────────────────────────────────────────────────────────
// Storage Paths
// ─────────────────────────────────────────────────────────────────────────────

/// Central place for every path orcai reads or writes.
///
/// Production code uses `StoragePaths::from_home()`; tests use `with_root(temp_dir)`.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    home: PathBuf,
    data_dir: PathBuf,
    config_file: PathBuf,
}

impl StoragePaths {
    pub fn from_home() -> Result<Self> {
        let home = dirs::home_dir().ok_or(OrcaiError::HomeNotFound)?;
        Ok(Self::with_root(home))
    }

    /// Treats `root` as the home directory.
    pub fn with_root(root: PathBuf) -> Self {
        Self {
            data_dir: root.join(DATA_DIR_NAME),
            config_file: root.join(CONFIG_FILE_NAME),
            home: root,
        }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    pub fn transcripts_dir(&self) -> PathBuf {
        self.data_dir.join("transcripts")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Summarization Config
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrcaiConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_length: Option<u32>,
}

/// Per-invocation values layered over the stored config. Never persisted.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub api_endpoint: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub context_length: Option<u32>,
}

impl OrcaiConfig {
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if overrides.api_endpoint.is_some() {
            self.api_endpoint = overrides.api_endpoint;
        }
        if overrides.api_key.is_some() {
            self.api_key = overrides.api_key;
        }
        if overrides.model.is_some() {
            self.model = overrides.model;
        }
        if overrides.context_length.is_some() {
            self.context_length = overrides.context_length;
        }
        self
    }

    pub fn model(&self) -> &str {
        non_blank(&self.model).unwrap_or(DEFAULT_MODEL)
    }

    pub fn context_length(&self) -> u32 {
        self.context_length.unwrap_or(DEFAULT_CONTEXT_LENGTH)
    }

    pub fn endpoint(&self) -> Option<&str> {
        non_blank(&self.api_endpoint)
    }

    pub fn credential(&self) -> Option<&str> {
        non_blank(&self.api_key)
    }

    /// Names of the fields that must be set before a handoff can be attempted.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.endpoint().is_none() {
            missing.push("api_endpoint");
        }
        if self.credential().is_none() {
            missing.push("api_key");
        }
        missing
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Loads the config, returning defaults if the file doesn't exist.
pub fn load_config(path: &Path) -> Result<OrcaiConfig> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(OrcaiConfig::default())
        }
        Err(err) => return Err(OrcaiError::io("Failed to read config", err)),
    };

    serde_json::from_slice(&data).map_err(|err| OrcaiError::ConfigMalformed {
        path: path.to_path_buf(),
        details: err.to_string(),
    })
}

/// Writes the config through a temp file so a crash never leaves it half written.
pub fn save_config(path: &Path, config: &OrcaiConfig) -> Result<()> {
    let payload = serde_json::to_vec_pretty(config).map_err(|source| OrcaiError::Json {
        context: "Failed to serialize config".to_string(),
        source,
    })?;
    let write_failed = |source| OrcaiError::ConfigWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_failed)?;
    }
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, payload).map_err(write_failed)?;
    fs::rename(&tmp_path, path).map_err(write_failed)?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Capture Settings
// ─────────────────────────────────────────────────────────────────────────────

/// Knobs for one capture session.
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    /// Root of the recursive file watch.
    pub watch_root: PathBuf,
    /// Shell program run inside the PTY.
    pub shell: PathBuf,
    /// Lines containing any of these substrings are never recorded.
    pub self_filters: Vec<String>,
    /// A recorded line ending in one of these is treated as a script invocation.
    pub script_suffixes: Vec<String>,
    /// File events for paths ending in one of these are ignored (editor swap/backup files).
    pub ignored_suffixes: Vec<String>,
    /// File events under these directories are ignored.
    pub ignored_prefixes: Vec<PathBuf>,
}

impl CaptureSettings {
    pub fn new(paths: &StoragePaths, shell: PathBuf) -> Self {
        Self {
            watch_root: paths.home().to_path_buf(),
            shell,
            self_filters: vec![PROGRAM_NAME.to_string()],
            script_suffixes: vec![".sh".to_string()],
            ignored_suffixes: [".swp", ".swo", ".swx", ".tmp", "~", ".part"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            ignored_prefixes: vec![paths.data_dir().to_path_buf()],
        }
    }

    pub fn from_env(paths: &StoragePaths) -> Self {
        Self::new(paths, default_shell())
    }
}

/// The user's shell from `$SHELL`, falling back to `/bin/sh`.
pub fn default_shell() -> PathBuf {
    env::var_os("SHELL")
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SHELL))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_config_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, OrcaiConfig::default());
        assert_eq!(config.model(), DEFAULT_MODEL);
        assert_eq!(config.context_length(), DEFAULT_CONTEXT_LENGTH);
    }

    #[test]
    fn save_then_load_preserves_fields() {
        let dir = tempdir().unwrap();
        let paths = StoragePaths::with_root(dir.path().to_path_buf());
        let config = OrcaiConfig {
            api_endpoint: Some("https://api.example.com/v1/chat/completions".to_string()),
            api_key: Some("sk-test".to_string()),
            model: Some("gpt-4o".to_string()),
            context_length: Some(4096),
        };

        save_config(paths.config_file(), &config).unwrap();
        assert_eq!(load_config(paths.config_file()).unwrap(), config);
        assert!(!paths.config_file().with_extension("tmp").exists());
    }

    #[test]
    fn malformed_config_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            load_config(&path),
            Err(OrcaiError::ConfigMalformed { .. })
        ));
    }

    #[test]
    fn overrides_replace_only_given_fields() {
        let config = OrcaiConfig {
            api_endpoint: Some("https://stored".to_string()),
            api_key: Some("stored-key".to_string()),
            model: None,
            context_length: Some(1024),
        };
        let merged = config.with_overrides(ConfigOverrides {
            model: Some("gpt-4o-mini".to_string()),
            context_length: Some(512),
            ..Default::default()
        });

        assert_eq!(merged.endpoint(), Some("https://stored"));
        assert_eq!(merged.credential(), Some("stored-key"));
        assert_eq!(merged.model(), "gpt-4o-mini");
        assert_eq!(merged.context_length(), 512);
    }

    #[test]
    fn blank_endpoint_counts_as_missing() {
        let config = OrcaiConfig {
            api_endpoint: Some("   ".to_string()),
            ..Default::default()
        };
        assert_eq!(config.missing_fields(), vec!["api_endpoint", "api_key"]);
    }

    #[test]
    fn capture_settings_ignore_own_data_dir() {
        let dir = tempdir().unwrap();
        let paths = StoragePaths::with_root(dir.path().to_path_buf());
        let settings = CaptureSettings::new(&paths, PathBuf::from("/bin/sh"));

        assert_eq!(settings.watch_root, dir.path());
        assert_eq!(settings.ignored_prefixes, vec![dir.path().join(".orcai")]);
        assert_eq!(settings.self_filters, vec!["orcai".to_string()]);
        assert_eq!(paths.logs_dir(), dir.path().join(".orcai").join("logs"));
    }
}
