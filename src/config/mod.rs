use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::types::error::MailguardError;

/// Application configuration, loaded from a TOML file.
///
/// Every section has serde defaults so a partial (or missing) file still
/// yields a runnable configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub scorer: ScorerConfig,

    #[serde(default)]
    pub narrative: NarrativeConfig,

    #[serde(default)]
    pub mailbox: MailboxConfig,

    #[serde(default)]
    pub scan: ScanConfig,
}

/// Decision store location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database file path
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_data_dir().join("decisions.db"),
        }
    }
}

/// Frozen scoring artifact location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorerConfig {
    /// Path to the serialized model artifact (JSON)
    pub model_path: PathBuf,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            model_path: default_data_dir().join("phishing_model.json"),
        }
    }
}

/// Narrative synthesis strategy selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrativeConfig {
    /// "template" (local, deterministic) or "external" (LLM with fallback)
    #[serde(default = "default_narrative_mode")]
    pub mode: String,

    /// Base URL of the external generation endpoint
    #[serde(default = "default_narrative_url")]
    pub url: String,

    /// Model name passed to the external endpoint
    #[serde(default = "default_narrative_model")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_narrative_timeout")]
    pub timeout_secs: u64,
}

impl Default for NarrativeConfig {
    fn default() -> Self {
        Self {
            mode: default_narrative_mode(),
            url: default_narrative_url(),
            model: default_narrative_model(),
            timeout_secs: default_narrative_timeout(),
        }
    }
}

/// Mailbox provider endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailboxConfig {
    /// Base URL of the mailbox REST API
    #[serde(default = "default_mailbox_url")]
    pub base_url: String,

    /// Per-call timeout in seconds
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            base_url: default_mailbox_url(),
            call_timeout_secs: default_call_timeout(),
        }
    }
}

/// Sweep behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Folder to sweep
    #[serde(default = "default_folder")]
    pub folder: String,

    /// Parallel metadata-fetch/classify workers per page
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Default cap on newly processed messages per sweep
    #[serde(default = "default_max_messages")]
    pub default_max_messages: u32,

    /// Message ids fetched per page
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,

    /// Characters of body excerpt fed to the scorer
    #[serde(default = "default_excerpt_len")]
    pub excerpt_len: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            folder: default_folder(),
            worker_count: default_worker_count(),
            default_max_messages: default_max_messages(),
            default_page_size: default_page_size(),
            excerpt_len: default_excerpt_len(),
        }
    }
}

fn default_narrative_mode() -> String {
    "template".to_string()
}

fn default_narrative_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_narrative_model() -> String {
    "mistral:latest".to_string()
}

fn default_narrative_timeout() -> u64 {
    10
}

fn default_mailbox_url() -> String {
    "https://gmail.googleapis.com/gmail/v1".to_string()
}

fn default_call_timeout() -> u64 {
    15
}

fn default_folder() -> String {
    "INBOX".to_string()
}

fn default_worker_count() -> usize {
    5
}

fn default_max_messages() -> u32 {
    50
}

fn default_page_size() -> u32 {
    50
}

fn default_excerpt_len() -> usize {
    1000
}

/// Data directory for the database and model artifact.
///
/// In debug builds this is `./.mailguard` relative to the working directory
/// for easier inspection; release builds use the platform data dir.
pub fn default_data_dir() -> PathBuf {
    if cfg!(debug_assertions) {
        PathBuf::from(".mailguard")
    } else {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mailguard")
    }
}

impl AppConfig {
    /// Load configuration from a TOML file. A missing file yields defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, MailguardError> {
        let path = path.as_ref();
        if !path.exists() {
            info!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }
}
