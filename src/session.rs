//! Connected session: a [`NoteStore`] plus lazily filled lookup caches.
//!
//! Notebook and tag lookups are needed on nearly every operation (resolving
//! a notebook name from a metadata header, showing tag names of a note).
//! The caches are filled on first use and dropped wholesale by
//! [`Session::clear_cache`] or when a notebook is created.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use tracing::debug;

use crate::config::{self, Backend, Config};
use crate::models::{Notebook, Tag};
use crate::store::http::HttpNoteStore;
use crate::store::memory::InMemoryNoteStore;
use crate::store::{NoteStore, StoreResult};

#[derive(Default)]
struct NotebookCache {
    list: Vec<Notebook>,
}

#[derive(Default)]
struct TagCache {
    name_by_guid: HashMap<String, String>,
    guid_by_name: HashMap<String, String>,
    complete: bool,
}

impl TagCache {
    fn insert(&mut self, tag: &Tag) {
        self.name_by_guid.insert(tag.guid.clone(), tag.name.clone());
        self.guid_by_name.insert(tag.name.clone(), tag.guid.clone());
    }
}

pub struct Session {
    store: Arc<dyn NoteStore>,
    config: Config,
    notebooks: Mutex<Option<NotebookCache>>,
    tags: Mutex<TagCache>,
}

impl Session {
    pub fn new(store: Arc<dyn NoteStore>, config: Config) -> Self {
        Self {
            store,
            config,
            notebooks: Mutex::new(None),
            tags: Mutex::new(TagCache::default()),
        }
    }

    /// Open the backend selected by `service.backend`.
    pub fn connect(config: Config) -> Result<Self> {
        let store: Arc<dyn NoteStore> = match config.service.backend {
            Backend::Http => Arc::new(HttpNoteStore::from_config(&config.service)?),
            Backend::Sandbox => {
                let path = config
                    .service
                    .sandbox_path
                    .as_deref()
                    .context("service.sandbox_path must be set when backend is 'sandbox'")?;
                Arc::new(InMemoryNoteStore::open(path)?)
            }
        };
        debug!(backend = ?config.service.backend, "session connected");
        Ok(Self::new(store, config))
    }

    pub fn store(&self) -> &dyn NoteStore {
        self.store.as_ref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn notebook_cache(&self) -> MutexGuard<'_, Option<NotebookCache>> {
        self.notebooks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn tag_cache(&self) -> MutexGuard<'_, TagCache> {
        self.tags.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// All notebooks, sorted by name when `notes.sort_notebooks` is set.
    pub async fn notebooks(&self) -> StoreResult<Vec<Notebook>> {
        if let Some(cache) = self.notebook_cache().as_ref() {
            return Ok(cache.list.clone());
        }
        let mut list = self.store.list_notebooks().await?;
        if self.config.notes.sort_notebooks {
            list.sort_by_key(|nb| nb.name.to_lowercase());
        }
        debug!(count = list.len(), "notebook cache filled");
        *self.notebook_cache() = Some(NotebookCache { list: list.clone() });
        Ok(list)
    }

    /// Exact, case-sensitive name lookup.
    pub async fn notebook_by_name(&self, name: &str) -> StoreResult<Option<Notebook>> {
        Ok(self.notebooks().await?.into_iter().find(|nb| nb.name == name))
    }

    pub async fn notebook_by_guid(&self, guid: &str) -> StoreResult<Option<Notebook>> {
        Ok(self.notebooks().await?.into_iter().find(|nb| nb.guid == guid))
    }

    /// Name of a notebook, or its guid when it is not (or no longer) listed.
    pub async fn notebook_name(&self, guid: &str) -> StoreResult<String> {
        Ok(self
            .notebook_by_guid(guid)
            .await?
            .map(|nb| nb.name)
            .unwrap_or_else(|| guid.to_string()))
    }

    pub async fn create_notebook(&self, name: &str) -> StoreResult<Notebook> {
        let notebook = self.store.create_notebook(name).await?;
        self.invalidate_notebooks();
        Ok(notebook)
    }

    pub fn invalidate_notebooks(&self) {
        *self.notebook_cache() = None;
    }

    /// Drop every cached lookup.
    pub fn clear_cache(&self) {
        self.invalidate_notebooks();
        *self.tag_cache() = TagCache::default();
    }

    async fn load_tags(&self) -> StoreResult<()> {
        if self.tag_cache().complete {
            return Ok(());
        }
        let tags = self.store.list_tags().await?;
        let mut cache = self.tag_cache();
        for tag in &tags {
            cache.insert(tag);
        }
        cache.complete = true;
        Ok(())
    }

    pub async fn tag_name(&self, guid: &str) -> StoreResult<String> {
        if let Some(name) = self.tag_cache().name_by_guid.get(guid) {
            return Ok(name.clone());
        }
        let tag = self.store.get_tag(guid).await?;
        self.tag_cache().insert(&tag);
        Ok(tag.name)
    }

    /// Guid of a tag by exact name; `None` if no such tag exists.
    pub async fn tag_guid(&self, name: &str) -> StoreResult<Option<String>> {
        if let Some(guid) = self.tag_cache().guid_by_name.get(name) {
            return Ok(Some(guid.clone()));
        }
        self.load_tags().await?;
        Ok(self.tag_cache().guid_by_name.get(name).cloned())
    }

    /// All tag names, sorted.
    pub async fn tag_names(&self) -> StoreResult<Vec<String>> {
        self.load_tags().await?;
        let mut names: Vec<String> = self.tag_cache().guid_by_name.keys().cloned().collect();
        names.sort_by_key(|n| n.to_lowercase());
        Ok(names)
    }

    /// `evernote:///view/{user}/{shard}/{guid}/{guid}/`
    pub fn note_link(&self, guid: &str) -> Result<String> {
        let token = self
            .config
            .service
            .token
            .as_deref()
            .context("A token is required to build note links")?;
        let shard = config::shard_id(token).context("Token has no shard id")?;
        let user = config::user_id(token).context("Token has no user id")?;
        Ok(format!(
            "evernote:///view/{}/{}/{}/{}/",
            user, shard, guid, guid
        ))
    }
}
