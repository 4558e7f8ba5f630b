use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_USER_AGENT: &str = "docx2wiki/0.1";
pub const DEFAULT_SPACE_KEY: &str = "SUP";
pub const DEFAULT_EXTENSION: &str = "docx";
pub const DEFAULT_PANDOC: &str = "pandoc";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct AppConfig {
    #[serde(default)]
    pub confluence: ConfluenceSection,
    #[serde(default)]
    pub import: ImportSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct ConfluenceSection {
    pub base_url: Option<String>,
    pub username: Option<String>,
    pub space_key: Option<String>,
    pub parent_page_id: Option<String>,
    pub user_agent: Option<String>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct ImportSection {
    pub data_dir: Option<String>,
    pub media_dir: Option<String>,
    pub log_file: Option<String>,
    pub extension: Option<String>,
    pub pandoc: Option<String>,
}

/// Connection settings for the wiki REST API. Credentials are not validated;
/// a blank value simply makes every request fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub user_agent: String,
    pub timeout_ms: u64,
}

/// Where migrated pages land.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSettings {
    pub space_key: String,
    pub parent_page_id: Option<String>,
}

impl AppConfig {
    pub fn connection(&self) -> ConnectionSettings {
        self.connection_with_lookup(|key| env::var(key).ok())
    }

    pub fn target(&self) -> TargetSettings {
        self.target_with_lookup(|key| env::var(key).ok())
    }

    /// Resolve the converter binary: env PANDOC_PATH > config > "pandoc".
    pub fn pandoc_binary(&self) -> String {
        self.pandoc_binary_with_lookup(|key| env::var(key).ok())
    }

    pub fn extension(&self) -> String {
        self.import
            .extension
            .as_deref()
            .map(|value| value.trim().trim_start_matches('.'))
            .filter(|value| !value.is_empty())
            .unwrap_or(DEFAULT_EXTENSION)
            .to_string()
    }

    fn connection_with_lookup<F>(&self, lookup_env: F) -> ConnectionSettings
    where
        F: Fn(&str) -> Option<String>,
    {
        let section = &self.confluence;
        let base_url = pick(&lookup_env, "CONFLUENCE_BASE_URL", section.base_url.as_deref())
            .unwrap_or_default()
            .trim_end_matches('/')
            .to_string();
        ConnectionSettings {
            base_url,
            username: pick(&lookup_env, "CONFLUENCE_USERNAME", section.username.as_deref())
                .unwrap_or_default(),
            password: lookup_env("CONFLUENCE_PASSWORD").unwrap_or_default(),
            user_agent: pick(&lookup_env, "CONFLUENCE_USER_AGENT", section.user_agent.as_deref())
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            timeout_ms: lookup_env("CONFLUENCE_HTTP_TIMEOUT_MS")
                .and_then(|value| value.trim().parse::<u64>().ok())
                .or(section.timeout_ms)
                .unwrap_or(DEFAULT_TIMEOUT_MS),
        }
    }

    fn target_with_lookup<F>(&self, lookup_env: F) -> TargetSettings
    where
        F: Fn(&str) -> Option<String>,
    {
        let section = &self.confluence;
        TargetSettings {
            space_key: pick(&lookup_env, "CONFLUENCE_SPACE_KEY", section.space_key.as_deref())
                .unwrap_or_else(|| DEFAULT_SPACE_KEY.to_string()),
            parent_page_id: pick(
                &lookup_env,
                "CONFLUENCE_PARENT_PAGE_ID",
                section.parent_page_id.as_deref(),
            ),
        }
    }

    fn pandoc_binary_with_lookup<F>(&self, lookup_env: F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        pick(&lookup_env, "PANDOC_PATH", self.import.pandoc.as_deref())
            .unwrap_or_else(|| DEFAULT_PANDOC.to_string())
    }
}

/// Load and parse an AppConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<AppConfig> {
    if !config_path.exists() {
        return Ok(AppConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: AppConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

fn pick<F>(lookup_env: &F, key: &str, configured: Option<&str>) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup_env(key) {
        let trimmed = value.trim().to_string();
        if !trimmed.is_empty() {
            return Some(trimmed);
        }
    }
    configured
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}
