use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::language::{self, LanguageInfo};

pub const DEFAULT_USER_AGENT: &str = "wikitranslate/0.2";
pub const DEFAULT_API_URL: &str = "https://wiki.archlinux.org/api.php";
pub const DEFAULT_LANGUAGE: &str = "Polish";
pub const DEFAULT_CACHE_HOURS: u32 = 6;
pub const DEFAULT_MAX_REDIRECT_PASSES: usize = 16;
pub const DEFAULT_PAGE_INFO_BATCH: usize = 50;

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct WikiConfig {
    #[serde(default)]
    pub wiki: WikiSection,
    #[serde(default)]
    pub translator: TranslatorSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct WikiSection {
    pub api_url: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct TranslatorSection {
    pub language: Option<String>,
    pub localized_status_template: Option<bool>,
    pub cache_hours: Option<u32>,
    pub max_redirect_passes: Option<usize>,
    pub page_info_batch: Option<usize>,
}

impl WikiConfig {
    /// Resolve the wiki API URL: env WIKI_API_URL > config > DEFAULT_API_URL.
    pub fn api_url(&self) -> String {
        env_override("WIKI_API_URL")
            .or_else(|| self.wiki.api_url.clone())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    /// Resolve user agent: env WIKI_USER_AGENT > config > DEFAULT_USER_AGENT.
    pub fn user_agent(&self) -> String {
        env_override("WIKI_USER_AGENT")
            .or_else(|| self.wiki.user_agent.clone())
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    /// Resolve the target language key: env WIKITRANSLATE_LANGUAGE > config > Polish.
    pub fn language_key(&self) -> String {
        env_override("WIKITRANSLATE_LANGUAGE")
            .or_else(|| self.translator.language.clone())
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string())
    }

    /// Registry entry for [`Self::language_key`]; fails on an unknown key.
    pub fn language(&self) -> Result<&'static LanguageInfo> {
        let key = self.language_key();
        language::lookup(&key).with_context(|| "failed to resolve [translator].language")
    }

    pub fn localized_status_template(&self) -> bool {
        self.translator.localized_status_template.unwrap_or(true)
    }

    pub fn cache_hours(&self) -> u32 {
        self.translator.cache_hours.unwrap_or(DEFAULT_CACHE_HOURS)
    }

    pub fn max_redirect_passes(&self) -> usize {
        self.translator
            .max_redirect_passes
            .unwrap_or(DEFAULT_MAX_REDIRECT_PASSES)
            .max(1)
    }

    pub fn page_info_batch(&self) -> usize {
        self.translator
            .page_info_batch
            .unwrap_or(DEFAULT_PAGE_INFO_BATCH)
            .max(1)
    }
}

fn env_override(key: &str) -> Option<String> {
    let value = env::var(key).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Load and parse a WikiConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<WikiConfig> {
    if !config_path.exists() {
        return Ok(WikiConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: WikiConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

/// Stores `key` as the active `[translator].language`. The file is rewritten
/// from its parsed form, so comments are dropped.
pub fn save_language(config_path: &Path, key: &str) -> Result<&'static LanguageInfo> {
    let info = language::lookup(key)?;
    let mut config = load_config(config_path)?;
    config.translator.language = Some(info.key.to_string());
    let rendered = toml::to_string_pretty(&config).context("failed to render config")?;
    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(config_path, rendered)
        .with_context(|| format!("failed to write {}", config_path.display()))?;
    Ok(info)
}
