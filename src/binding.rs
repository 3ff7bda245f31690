//! Association between a local Markdown file and a remote note.
//!
//! Stored as a small JSON sidecar next to the document
//! (`notes/plan.md` -> `notes/.plan.md.enote.json`). The recorded revision is
//! the SHA-256 of the text at the last successful sync, which tells whether
//! the file was edited since.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteBinding {
    pub guid: String,
    pub title: String,
    pub revision: String,
    #[serde(default)]
    pub synced_at: Option<DateTime<Utc>>,
}

impl NoteBinding {
    pub fn new(guid: impl Into<String>, title: impl Into<String>, text: &str) -> Self {
        Self {
            guid: guid.into(),
            title: title.into(),
            revision: revision(text),
            synced_at: Some(Utc::now()),
        }
    }

    /// The text differs from what was last synced.
    pub fn is_modified(&self, text: &str) -> bool {
        self.revision != revision(text)
    }
}

/// SHA-256 of the document text, hex encoded.
pub fn revision(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

pub fn sidecar_path(document: &Path) -> PathBuf {
    let name = document
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    document.with_file_name(format!(".{}.enote.json", name))
}

pub fn load(document: &Path) -> Result<Option<NoteBinding>> {
    let path = sidecar_path(document);
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read binding: {}", path.display()))?;
    let binding = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse binding: {}", path.display()))?;
    Ok(Some(binding))
}

pub fn save(document: &Path, binding: &NoteBinding) -> Result<()> {
    let path = sidecar_path(document);
    let json = serde_json::to_string_pretty(binding)?;
    std::fs::write(&path, json)
        .with_context(|| format!("Failed to write binding: {}", path.display()))
}

pub fn remove(document: &Path) -> Result<()> {
    let path = sidecar_path(document);
    if path.exists() {
        std::fs::remove_file(&path)
            .with_context(|| format!("Failed to remove binding: {}", path.display()))?;
    }
    Ok(())
}
