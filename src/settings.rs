use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::{AppError, Result};

pub const SETTINGS_FILE: &str = "settings.toml";

pub const DEFAULT_BASE_URL: &str = "https://slack.com/api";
pub const DEFAULT_PAGE_SIZE: u32 = 1000;
pub const DEFAULT_PAGE_DELAY_MS: u64 = 1000;
pub const DEFAULT_OUTPUT_DIR: &str = "BU";
pub const DEFAULT_MEDIA_DIR: &str = "media";

#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub backup: BackupSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiSettings {
    #[serde(default = "default_base_url", rename = "base-url")]
    pub base_url: String,
    #[serde(default = "default_page_size", rename = "page-size")]
    pub page_size: u32,
    #[serde(default = "default_page_delay_ms", rename = "page-delay-ms")]
    pub page_delay_ms: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            page_size: default_page_size(),
            page_delay_ms: default_page_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackupSettings {
    #[serde(default = "default_output_dir", rename = "output-dir")]
    pub output_dir: String,
    #[serde(default = "default_channel_types", rename = "channel-types")]
    pub channel_types: Vec<String>,
    /// Exact channel names to back up; empty means every channel.
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default = "default_true", rename = "members-only")]
    pub members_only: bool,
    #[serde(default = "default_true", rename = "include-threads")]
    pub include_threads: bool,
    #[serde(default = "default_media_dir", rename = "media-dir")]
    pub media_dir: String,
    /// Content-type prefixes allowed for attachment downloads; empty means all.
    #[serde(default, rename = "media-types")]
    pub media_types: Vec<String>,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            channel_types: default_channel_types(),
            channels: Vec::new(),
            members_only: true,
            include_threads: true,
            media_dir: default_media_dir(),
            media_types: Vec::new(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

fn default_page_delay_ms() -> u64 {
    DEFAULT_PAGE_DELAY_MS
}

fn default_output_dir() -> String {
    DEFAULT_OUTPUT_DIR.to_string()
}

fn default_media_dir() -> String {
    DEFAULT_MEDIA_DIR.to_string()
}

fn default_channel_types() -> Vec<String> {
    vec![
        "public_channel".to_string(),
        "private_channel".to_string(),
        "im".to_string(),
    ]
}

fn default_true() -> bool {
    true
}

impl Settings {
    /// Load settings from `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| AppError::ReadFile {
            path: path.display().to_string(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| AppError::TomlParse(e.to_string()))
    }
}
