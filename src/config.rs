//! Configuration parsing and validation.
//!
//! `enote` reads a TOML file (default `./config/enote.toml`):
//!
//! ```toml
//! [service]
//! backend = "http"          # http | sandbox
//! token = "S=s1:U=92e22:..."
//! timeout_secs = 30
//! max_retries = 3
//!
//! [markdown]
//! tables = true
//! [markdown.inline_css]
//! pre = "background: #f8f8f8"
//!
//! [text]
//! emphasis_mark = "_"
//!
//! [notes]
//! order = "updated"
//! ```
//!
//! Every section is optional. `ENOTE_TOKEN` overrides `service.token`.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::models::NoteSortOrder;
use crate::render::RenderOptions;
use crate::textify::TextOptions;

/// Environment variable that overrides `service.token`.
pub const TOKEN_ENV: &str = "ENOTE_TOKEN";

/// The service never returns more than this many notes per listing page.
pub const MAX_PAGE_SIZE: usize = 250;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub markdown: MarkdownConfig,
    #[serde(default)]
    pub text: TextConfig,
    #[serde(default)]
    pub notes: NotesConfig,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Http,
    Sandbox,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    #[serde(default)]
    pub backend: Backend,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub note_store_url: Option<String>,
    #[serde(default)]
    pub sandbox_path: Option<PathBuf>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_max_notes")]
    pub max_notes: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Http,
            token: None,
            note_store_url: None,
            sandbox_path: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            page_size: default_page_size(),
            max_notes: default_max_notes(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_page_size() -> usize {
    MAX_PAGE_SIZE
}
fn default_max_notes() -> usize {
    100
}

impl ServiceConfig {
    /// `note_store_url`, or the URL derived from the token's shard.
    pub fn resolved_note_store_url(&self) -> Result<String> {
        if let Some(url) = &self.note_store_url {
            return Ok(url.clone());
        }
        let token = self
            .token
            .as_deref()
            .context("service.note_store_url is not set and there is no token to derive it from")?;
        let shard = shard_id(token)
            .with_context(|| "Cannot derive the note store URL: token has no shard id")?;
        Ok(format!("https://www.evernote.com/shard/{}/notestore", shard))
    }
}

/// Shard id from a token of the form `S=s1:U=92e22:...`.
pub fn shard_id(token: &str) -> Option<&str> {
    token
        .split(':')
        .find_map(|part| part.strip_prefix("S="))
        .filter(|s| !s.is_empty())
}

/// Numeric user id from a token of the form `S=s1:U=92e22:...` (hex).
pub fn user_id(token: &str) -> Option<u64> {
    token
        .split(':')
        .find_map(|part| part.strip_prefix("U="))
        .and_then(|hex| u64::from_str_radix(hex, 16).ok())
}

#[derive(Debug, Deserialize, Clone)]
pub struct MarkdownConfig {
    #[serde(default = "default_true")]
    pub tables: bool,
    #[serde(default = "default_true")]
    pub footnotes: bool,
    #[serde(default = "default_true")]
    pub strikethrough: bool,
    #[serde(default = "default_true")]
    pub tasklists: bool,
    #[serde(default)]
    pub inline_css: BTreeMap<String, String>,
}

impl Default for MarkdownConfig {
    fn default() -> Self {
        Self {
            tables: true,
            footnotes: true,
            strikethrough: true,
            tasklists: true,
            inline_css: BTreeMap::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

impl MarkdownConfig {
    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            tables: self.tables,
            footnotes: self.footnotes,
            strikethrough: self.strikethrough,
            tasklists: self.tasklists,
            inline_css: self.inline_css.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TextConfig {
    #[serde(default = "default_emphasis_mark")]
    pub emphasis_mark: String,
    #[serde(default = "default_strong_mark")]
    pub strong_mark: String,
    #[serde(default = "default_item_mark")]
    pub item_mark: String,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            emphasis_mark: default_emphasis_mark(),
            strong_mark: default_strong_mark(),
            item_mark: default_item_mark(),
        }
    }
}

fn default_emphasis_mark() -> String {
    "_".to_string()
}
fn default_strong_mark() -> String {
    "**".to_string()
}
fn default_item_mark() -> String {
    "*".to_string()
}

impl TextConfig {
    pub fn text_options(&self) -> TextOptions {
        TextOptions {
            emphasis_mark: self.emphasis_mark.clone(),
            strong_mark: self.strong_mark.clone(),
            item_mark: self.item_mark.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotesConfig {
    #[serde(default = "default_order")]
    pub order: String,
    #[serde(default)]
    pub ascending: bool,
    #[serde(default)]
    pub sort_notebooks: bool,
    #[serde(default)]
    pub default_template: Option<PathBuf>,
}

impl Default for NotesConfig {
    fn default() -> Self {
        Self {
            order: default_order(),
            ascending: false,
            sort_notebooks: false,
            default_template: None,
        }
    }
}

fn default_order() -> String {
    "updated".to_string()
}

impl NotesConfig {
    pub fn sort_order(&self) -> Result<NoteSortOrder> {
        self.order.parse().map_err(anyhow::Error::msg)
    }
}

impl Config {
    /// Defaults only; enough for offline conversion.
    pub fn minimal() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    fn apply_env(&mut self) {
        if let Ok(token) = std::env::var(TOKEN_ENV) {
            if !token.trim().is_empty() {
                self.service.token = Some(token.trim().to_string());
            }
        }
    }

    /// Inline CSS values always end with `;` so they can be concatenated.
    fn normalize(&mut self) {
        for value in self.markdown.inline_css.values_mut() {
            let trimmed = value.trim();
            *value = if trimmed.is_empty() || trimmed.ends_with(';') {
                trimmed.to_string()
            } else {
                format!("{};", trimmed)
            };
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    config.apply_env();
    config.normalize();

    // Sandbox paths are relative to the config file
    if let Some(sandbox) = &config.service.sandbox_path {
        if sandbox.is_relative() {
            if let Some(dir) = path.parent() {
                config.service.sandbox_path = Some(dir.join(sandbox));
            }
        }
    }

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    let service = &config.service;
    if service.page_size == 0 || service.page_size > MAX_PAGE_SIZE {
        bail!("service.page_size must be in 1..={}", MAX_PAGE_SIZE);
    }
    if service.max_notes == 0 {
        bail!("service.max_notes must be >= 1");
    }
    if service.timeout_secs == 0 {
        bail!("service.timeout_secs must be > 0");
    }
    if service.backend == Backend::Sandbox && service.sandbox_path.is_none() {
        bail!("service.sandbox_path must be set when backend is 'sandbox'");
    }
    config.notes.sort_order()?;
    for (name, mark) in [
        ("text.emphasis_mark", &config.text.emphasis_mark),
        ("text.strong_mark", &config.text.strong_mark),
        ("text.item_mark", &config.text.item_mark),
    ] {
        if mark.is_empty() {
            bail!("{} must not be empty", name);
        }
    }
    Ok(())
}
