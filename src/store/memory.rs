//! In-memory [`NoteStore`] implementation.
//!
//! Keeps notebooks, tags and notes (with resource bodies) in a single
//! snapshot behind `std::sync::RwLock`. Notes keep insertion order, so
//! listings without an explicit order are stable. Validation mirrors the
//! service closely enough to exercise error paths: missing titles, unknown
//! guids, duplicate notebook names and obviously invalid markup are
//! rejected with the matching [`ServiceError`].
//!
//! [`InMemoryNoteStore::open`] backs the store with a JSON file that is
//! rewritten after every mutation; this is the `sandbox` backend.

use std::path::{Path, PathBuf};
use std::sync::{LazyLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::Context;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{NoteStore, StoreResult};
use crate::error::{ErrorCode, ServiceError};
use crate::models::{
    NoteFilter, NoteSortOrder, NoteSummary, Notebook, NotesMetadataList, NotesMetadataResultSpec,
    RemoteNote, Resource, Tag,
};

/// The service never returns more than this many notes per page.
pub const DEFAULT_PAGE_CAP: usize = 250;

const MAX_TITLE_LEN: usize = 255;
const MAX_NOTEBOOK_NAME_LEN: usize = 100;

static CLASS_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<([A-Za-z][\w-]*)\b[^>]*\sclass\s*="#).expect("class attribute pattern is valid")
});

static FORBIDDEN_ELEMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<(script|iframe|form|input|button|object|embed|applet|frame|frameset)\b")
        .expect("forbidden element pattern is valid")
});

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    notebooks: Vec<Notebook>,
    #[serde(default)]
    tags: Vec<Tag>,
    #[serde(default)]
    notes: Vec<RemoteNote>,
}

/// In-memory note store for tests and offline use.
pub struct InMemoryNoteStore {
    state: RwLock<Snapshot>,
    page_cap: usize,
    snapshot_path: Option<PathBuf>,
}

impl InMemoryNoteStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(Snapshot::default()),
            page_cap: DEFAULT_PAGE_CAP,
            snapshot_path: None,
        }
    }

    /// Load (or start) a snapshot file that is rewritten after every change.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let snapshot = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read sandbox file: {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse sandbox file: {}", path.display()))?
        } else {
            Snapshot::default()
        };
        Ok(Self {
            state: RwLock::new(snapshot),
            page_cap: DEFAULT_PAGE_CAP,
            snapshot_path: Some(path.to_path_buf()),
        })
    }

    /// Cap the number of notes returned per listing page.
    pub fn with_page_cap(mut self, cap: usize) -> Self {
        self.page_cap = cap.max(1);
        self
    }

    /// Add a notebook directly, bypassing name validation.
    pub fn add_notebook(&self, name: &str, stack: Option<&str>) -> Notebook {
        let mut state = self.write();
        let notebook = Notebook {
            guid: new_guid(),
            name: name.to_string(),
            stack: stack.map(str::to_string),
            default_notebook: state.notebooks.is_empty(),
        };
        state.notebooks.push(notebook.clone());
        notebook
    }

    pub fn note_count(&self) -> usize {
        self.read().notes.len()
    }

    fn read(&self) -> RwLockReadGuard<'_, Snapshot> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Snapshot> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, state: &Snapshot) -> StoreResult<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(state).map_err(|e| ServiceError::System {
            code: ErrorCode::InternalError,
            message: e.to_string(),
        })?;
        std::fs::write(path, json).map_err(|e| ServiceError::System {
            code: ErrorCode::InternalError,
            message: format!("cannot write {}: {}", path.display(), e),
        })?;
        debug!(path = %path.display(), notes = state.notes.len(), "sandbox saved");
        Ok(())
    }
}

impl Default for InMemoryNoteStore {
    fn default() -> Self {
        Self::new()
    }
}

fn new_guid() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn validate_title(title: Option<&str>) -> StoreResult<()> {
    let title = title.unwrap_or("");
    if title.is_empty() {
        return Err(ServiceError::user(ErrorCode::DataRequired, "Note.title"));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(ServiceError::user(ErrorCode::LenTooLong, "Note.title"));
    }
    if title.trim() != title {
        return Err(ServiceError::user(ErrorCode::BadDataFormat, "Note.title"));
    }
    Ok(())
}

fn validate_content(content: &str) -> StoreResult<()> {
    if !content.contains("<en-note") {
        return Err(ServiceError::user(
            ErrorCode::EnmlValidation,
            "Document root element \"en-note\", must match DOCTYPE root.",
        ));
    }
    if let Some(caps) = FORBIDDEN_ELEMENT_RE.captures(content) {
        return Err(ServiceError::user(
            ErrorCode::EnmlValidation,
            format!("Element type \"{}\" must be declared.", &caps[1]),
        ));
    }
    if let Some(caps) = CLASS_ATTR_RE.captures(content) {
        return Err(ServiceError::user(
            ErrorCode::EnmlValidation,
            format!(
                "Attribute \"class\" must be declared for element type \"{}\".",
                &caps[1]
            ),
        ));
    }
    Ok(())
}

/// Guid of the requested notebook, or of the default one (created on demand).
/// Every notebook and tag guid a note refers to exists.
///
/// Run before [`resolve_notebook`] and [`resolve_tags`], which create the
/// Default notebook and missing tags, so a rejected write changes nothing.
fn check_references(
    state: &Snapshot,
    notebook_guid: Option<&str>,
    tag_guids: Option<&Vec<String>>,
) -> StoreResult<()> {
    if let Some(guid) = notebook_guid {
        if !state.notebooks.iter().any(|nb| nb.guid == guid) {
            return Err(ServiceError::not_found("Note.notebookGuid", guid));
        }
    }
    for guid in tag_guids.into_iter().flatten() {
        if !state.tags.iter().any(|t| &t.guid == guid) {
            return Err(ServiceError::not_found("Tag.guid", guid.as_str()));
        }
    }
    Ok(())
}

fn resolve_notebook(state: &mut Snapshot, guid: Option<&str>) -> StoreResult<String> {
    if let Some(guid) = guid {
        return state
            .notebooks
            .iter()
            .find(|nb| nb.guid == guid)
            .map(|nb| nb.guid.clone())
            .ok_or_else(|| ServiceError::not_found("Note.notebookGuid", guid));
    }
    if let Some(nb) = state
        .notebooks
        .iter()
        .find(|nb| nb.default_notebook)
        .or_else(|| state.notebooks.first())
    {
        return Ok(nb.guid.clone());
    }
    let notebook = Notebook {
        guid: new_guid(),
        name: "Default".to_string(),
        stack: None,
        default_notebook: true,
    };
    let guid = notebook.guid.clone();
    state.notebooks.push(notebook);
    Ok(guid)
}

/// Union of the given tag guids and the tags named, creating missing names.
fn resolve_tags(
    state: &mut Snapshot,
    guids: Option<&Vec<String>>,
    names: Option<&Vec<String>>,
) -> StoreResult<Vec<String>> {
    let mut resolved: Vec<String> = Vec::new();
    for guid in guids.into_iter().flatten() {
        if !state.tags.iter().any(|t| &t.guid == guid) {
            return Err(ServiceError::not_found("Tag.guid", guid.as_str()));
        }
        if !resolved.contains(guid) {
            resolved.push(guid.clone());
        }
    }
    for name in names.into_iter().flatten() {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        let guid = match state
            .tags
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
        {
            Some(tag) => tag.guid.clone(),
            None => {
                let tag = Tag {
                    guid: new_guid(),
                    name: name.to_string(),
                };
                let guid = tag.guid.clone();
                state.tags.push(tag);
                guid
            }
        };
        if !resolved.contains(&guid) {
            resolved.push(guid);
        }
    }
    Ok(resolved)
}

/// Assign guids and hashes; resources sent without a body keep their stored data.
fn prepare_resources(
    resources: &[Resource],
    note_guid: &str,
    existing: &[Resource],
) -> StoreResult<Vec<Resource>> {
    let mut prepared = Vec::with_capacity(resources.len());
    for resource in resources {
        let mut resource = resource.clone();
        match resource.data.body.as_ref() {
            Some(body) => {
                resource.data.size = body.len();
                if resource.data.body_hash.is_empty() {
                    resource.data.body_hash = md5::compute(body).0.to_vec();
                }
            }
            None => {
                let stored = resource
                    .guid
                    .as_deref()
                    .and_then(|g| existing.iter().find(|r| r.guid.as_deref() == Some(g)))
                    .ok_or_else(|| ServiceError::user(ErrorCode::DataRequired, "Resource.data.body"))?;
                resource.data = stored.data.clone();
            }
        }
        if resource.guid.is_none() {
            resource.guid = Some(new_guid());
        }
        resource.note_guid = Some(note_guid.to_string());
        prepared.push(resource);
    }
    Ok(prepared)
}

fn strip_resource_bodies(resources: &mut Option<Vec<Resource>>) {
    for resource in resources.iter_mut().flatten() {
        resource.data.body = None;
    }
}

/// Lower-cased visible text of a note, good enough for word matching.
fn searchable_text(note: &RemoteNote) -> String {
    let content = note.content.as_deref().unwrap_or("");
    let mut text = String::with_capacity(content.len());
    let mut in_tag = false;
    for ch in content.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                text.push(' ');
            }
            _ if !in_tag => text.push(ch),
            _ => {}
        }
    }
    text.to_lowercase()
}

fn matches_filter(note: &RemoteNote, filter: &NoteFilter, words: &[String]) -> bool {
    if let Some(nb) = &filter.notebook_guid {
        if note.notebook_guid.as_ref() != Some(nb) {
            return false;
        }
    }
    if let Some(required) = &filter.tag_guids {
        let tags = note.tag_guids.as_deref().unwrap_or(&[]);
        if !required.iter().all(|t| tags.contains(t)) {
            return false;
        }
    }
    if words.is_empty() {
        return true;
    }
    let title = note.title.as_deref().unwrap_or("").to_lowercase();
    let body = searchable_text(note);
    words.iter().all(|word| match word.strip_prefix("intitle:") {
        Some(w) => title.contains(w),
        None => title.contains(word.as_str()) || body.contains(word.as_str()),
    })
}

#[async_trait]
impl NoteStore for InMemoryNoteStore {
    async fn find_notes_metadata(
        &self,
        filter: &NoteFilter,
        offset: usize,
        max_notes: usize,
        spec: &NotesMetadataResultSpec,
    ) -> StoreResult<NotesMetadataList> {
        let words: Vec<String> = filter
            .words
            .as_deref()
            .unwrap_or("")
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();

        let state = self.read();
        let mut matches: Vec<&RemoteNote> = state
            .notes
            .iter()
            .filter(|n| matches_filter(n, filter, &words))
            .collect();

        let sorted = match filter.order {
            Some(NoteSortOrder::Created) => {
                matches.sort_by_key(|n| n.created.unwrap_or(0));
                true
            }
            Some(NoteSortOrder::Updated) => {
                matches.sort_by_key(|n| n.updated.unwrap_or(0));
                true
            }
            Some(NoteSortOrder::Title) => {
                matches.sort_by_key(|n| n.title.as_deref().unwrap_or("").to_lowercase());
                true
            }
            Some(NoteSortOrder::Relevance) | None => false,
        };
        if sorted && !filter.ascending {
            matches.reverse();
        }

        let total_notes = matches.len();
        let notes = matches
            .into_iter()
            .skip(offset)
            .take(max_notes.min(self.page_cap))
            .map(|n| NoteSummary {
                guid: n.guid.clone().unwrap_or_default(),
                title: if spec.include_title { n.title.clone() } else { None },
                notebook_guid: if spec.include_notebook_guid {
                    n.notebook_guid.clone()
                } else {
                    None
                },
                created: if spec.include_updated { n.created } else { None },
                updated: if spec.include_updated { n.updated } else { None },
            })
            .collect();

        Ok(NotesMetadataList {
            start_index: offset,
            total_notes,
            notes,
        })
    }

    async fn get_note(
        &self,
        guid: &str,
        with_content: bool,
        with_resources_data: bool,
    ) -> StoreResult<RemoteNote> {
        let state = self.read();
        let mut note = state
            .notes
            .iter()
            .find(|n| n.guid.as_deref() == Some(guid))
            .cloned()
            .ok_or_else(|| ServiceError::not_found("Note.guid", guid))?;
        if !with_content {
            note.content = None;
        }
        if !with_resources_data {
            strip_resource_bodies(&mut note.resources);
        }
        Ok(note)
    }

    async fn get_note_tag_names(&self, guid: &str) -> StoreResult<Vec<String>> {
        let state = self.read();
        let note = state
            .notes
            .iter()
            .find(|n| n.guid.as_deref() == Some(guid))
            .ok_or_else(|| ServiceError::not_found("Note.guid", guid))?;
        Ok(note
            .tag_guids
            .iter()
            .flatten()
            .filter_map(|g| state.tags.iter().find(|t| &t.guid == g))
            .map(|t| t.name.clone())
            .collect())
    }

    async fn create_note(&self, note: &RemoteNote) -> StoreResult<RemoteNote> {
        validate_title(note.title.as_deref())?;
        let content = note
            .content
            .as_deref()
            .ok_or_else(|| ServiceError::user(ErrorCode::DataRequired, "Note.content"))?;
        validate_content(content)?;

        let guid = new_guid();
        let resources = prepare_resources(note.resources.as_deref().unwrap_or(&[]), &guid, &[])?;

        let mut state = self.write();
        check_references(&state, note.notebook_guid.as_deref(), note.tag_guids.as_ref())?;
        let notebook_guid = resolve_notebook(&mut state, note.notebook_guid.as_deref())?;
        let tag_guids = resolve_tags(&mut state, note.tag_guids.as_ref(), note.tag_names.as_ref())?;
        let now = now_ms();

        let stored = RemoteNote {
            guid: Some(guid),
            title: note.title.clone(),
            content: Some(content.to_string()),
            notebook_guid: Some(notebook_guid),
            tag_guids: Some(tag_guids),
            tag_names: None,
            resources: if resources.is_empty() { None } else { Some(resources) },
            created: Some(note.created.unwrap_or(now)),
            updated: Some(now),
        };
        state.notes.push(stored.clone());
        self.persist(&state)?;
        debug!(guid = stored.guid.as_deref().unwrap_or(""), "note created");
        Ok(stored)
    }

    async fn update_note(&self, note: &RemoteNote) -> StoreResult<RemoteNote> {
        let guid = note
            .guid
            .as_deref()
            .ok_or_else(|| ServiceError::user(ErrorCode::DataRequired, "Note.guid"))?;
        if note.title.is_some() {
            validate_title(note.title.as_deref())?;
        }
        if let Some(content) = note.content.as_deref() {
            validate_content(content)?;
        }

        let mut state = self.write();
        let idx = state
            .notes
            .iter()
            .position(|n| n.guid.as_deref() == Some(guid))
            .ok_or_else(|| ServiceError::not_found("Note.guid", guid))?;

        let resources = match note.resources.as_deref() {
            Some(list) => {
                let existing = state.notes[idx].resources.as_deref().unwrap_or(&[]);
                Some(prepare_resources(list, guid, existing)?)
            }
            None => None,
        };
        check_references(&state, note.notebook_guid.as_deref(), note.tag_guids.as_ref())?;

        let notebook_guid = match note.notebook_guid.as_deref() {
            Some(nb) => Some(resolve_notebook(&mut state, Some(nb))?),
            None => None,
        };
        let tag_guids = if note.tag_guids.is_some() || note.tag_names.is_some() {
            Some(resolve_tags(&mut state, note.tag_guids.as_ref(), note.tag_names.as_ref())?)
        } else {
            None
        };

        let stored = &mut state.notes[idx];
        if let Some(title) = &note.title {
            stored.title = Some(title.clone());
        }
        if let Some(content) = &note.content {
            stored.content = Some(content.clone());
        }
        if notebook_guid.is_some() {
            stored.notebook_guid = notebook_guid;
        }
        if tag_guids.is_some() {
            stored.tag_guids = tag_guids;
        }
        if let Some(resources) = resources {
            stored.resources = if resources.is_empty() { None } else { Some(resources) };
        }
        stored.updated = Some(now_ms());
        let updated = stored.clone();

        self.persist(&state)?;
        debug!(guid, "note updated");
        Ok(updated)
    }

    async fn delete_note(&self, guid: &str) -> StoreResult<()> {
        let mut state = self.write();
        let idx = state
            .notes
            .iter()
            .position(|n| n.guid.as_deref() == Some(guid))
            .ok_or_else(|| ServiceError::not_found("Note.guid", guid))?;
        state.notes.remove(idx);
        self.persist(&state)
    }

    async fn list_notebooks(&self) -> StoreResult<Vec<Notebook>> {
        Ok(self.read().notebooks.clone())
    }

    async fn create_notebook(&self, name: &str) -> StoreResult<Notebook> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::user(ErrorCode::DataRequired, "Notebook.name"));
        }
        if name.chars().count() > MAX_NOTEBOOK_NAME_LEN {
            return Err(ServiceError::user(ErrorCode::LenTooLong, "Notebook.name"));
        }
        let mut state = self.write();
        if state
            .notebooks
            .iter()
            .any(|nb| nb.name.eq_ignore_ascii_case(name))
        {
            return Err(ServiceError::user(ErrorCode::DataConflict, "Notebook.name"));
        }
        let notebook = Notebook {
            guid: new_guid(),
            name: name.to_string(),
            stack: None,
            default_notebook: state.notebooks.is_empty(),
        };
        state.notebooks.push(notebook.clone());
        self.persist(&state)?;
        Ok(notebook)
    }

    async fn list_tags(&self) -> StoreResult<Vec<Tag>> {
        Ok(self.read().tags.clone())
    }

    async fn get_tag(&self, guid: &str) -> StoreResult<Tag> {
        self.read()
            .tags
            .iter()
            .find(|t| t.guid == guid)
            .cloned()
            .ok_or_else(|| ServiceError::not_found("Tag.guid", guid))
    }

    async fn get_resource(&self, guid: &str, with_data: bool) -> StoreResult<Resource> {
        let state = self.read();
        let mut resource = state
            .notes
            .iter()
            .flat_map(|n| n.resources.iter().flatten())
            .find(|r| r.guid.as_deref() == Some(guid))
            .cloned()
            .ok_or_else(|| ServiceError::not_found("Resource.guid", guid))?;
        if !with_data {
            resource.data.body = None;
        }
        Ok(resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ResourceAttributes, ResourceData};

    const CONTENT: &str = "<en-note><p>hello world</p></en-note>";

    fn note(title: &str) -> RemoteNote {
        RemoteNote {
            title: Some(title.to_string()),
            content: Some(CONTENT.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_assigns_guid_default_notebook_and_tags() {
        let store = InMemoryNoteStore::new();
        let mut n = note("First");
        n.tag_names = Some(vec!["work".into(), "Work".into(), "home".into()]);
        let created = store.create_note(&n).await.unwrap();

        let guid = created.guid.clone().unwrap();
        assert_eq!(created.tag_guids.as_ref().unwrap().len(), 2);
        let notebooks = store.list_notebooks().await.unwrap();
        assert_eq!(notebooks.len(), 1);
        assert!(notebooks[0].default_notebook);
        assert_eq!(created.notebook_guid.as_deref(), Some(notebooks[0].guid.as_str()));
        assert_eq!(
            store.get_note_tag_names(&guid).await.unwrap(),
            vec!["work".to_string(), "home".to_string()]
        );
    }

    #[tokio::test]
    async fn create_rejects_bad_input() {
        let store = InMemoryNoteStore::new();
        let err = store.create_note(&note("")).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::DataRequired));

        let mut bad = note("T");
        bad.content = Some("<en-note><pre class=\"x\">a</pre></en-note>".into());
        let err = store.create_note(&bad).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::EnmlValidation));
        assert!(err.explain().contains("'pre' HTML tag with a 'class' attribute"));

        let mut missing_nb = note("T");
        missing_nb.notebook_guid = Some("nope".into());
        assert!(matches!(
            store.create_note(&missing_nb).await.unwrap_err(),
            ServiceError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn rejected_writes_leave_no_tags_or_notebooks_behind() {
        let store = InMemoryNoteStore::new();
        let mut bad = note("T");
        bad.tag_names = Some(vec!["fresh".into()]);
        bad.resources = Some(vec![Resource {
            mime: "text/plain".into(),
            ..Default::default()
        }]);
        let err = store.create_note(&bad).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::DataRequired));
        assert!(store.list_tags().await.unwrap().is_empty());
        assert!(store.list_notebooks().await.unwrap().is_empty());

        let guid = store.create_note(&note("Kept")).await.unwrap().guid.unwrap();
        let update = RemoteNote {
            guid: Some(guid.clone()),
            notebook_guid: Some("nope".into()),
            tag_names: Some(vec!["fresh".into()]),
            ..Default::default()
        };
        assert!(matches!(
            store.update_note(&update).await.unwrap_err(),
            ServiceError::NotFound { .. }
        ));
        assert!(store.list_tags().await.unwrap().is_empty());
        assert!(store.get_note_tag_names(&guid).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn listing_is_paged_and_capped() {
        let store = InMemoryNoteStore::new().with_page_cap(2);
        for i in 0..5 {
            store.create_note(&note(&format!("n{}", i))).await.unwrap();
        }
        let spec = NotesMetadataResultSpec::titles_only();
        let page = store
            .find_notes_metadata(&NoteFilter::default(), 0, 250, &spec)
            .await
            .unwrap();
        assert_eq!(page.total_notes, 5);
        assert_eq!(page.notes.len(), 2);
        assert_eq!(page.notes[0].title.as_deref(), Some("n0"));

        let last = store
            .find_notes_metadata(&NoteFilter::default(), 4, 250, &spec)
            .await
            .unwrap();
        assert_eq!(last.start_index, 4);
        assert_eq!(last.notes.len(), 1);
        assert!(last.notes[0].notebook_guid.is_none());
    }

    #[tokio::test]
    async fn word_search_matches_title_and_body() {
        let store = InMemoryNoteStore::new();
        store.create_note(&note("Groceries")).await.unwrap();
        let mut other = note("Other");
        other.content = Some("<en-note><p>buy groceries later</p></en-note>".into());
        store.create_note(&other).await.unwrap();

        let spec = NotesMetadataResultSpec::titles_only();
        let filter = NoteFilter {
            words: Some("GROCERIES".into()),
            ..Default::default()
        };
        let hits = store.find_notes_metadata(&filter, 0, 10, &spec).await.unwrap();
        assert_eq!(hits.total_notes, 2);

        let filter = NoteFilter {
            words: Some("intitle:groceries".into()),
            ..Default::default()
        };
        let hits = store.find_notes_metadata(&filter, 0, 10, &spec).await.unwrap();
        assert_eq!(hits.total_notes, 1);
    }

    #[tokio::test]
    async fn update_keeps_resource_data_sent_without_body() {
        let store = InMemoryNoteStore::new();
        let mut n = note("With file");
        n.resources = Some(vec![Resource {
            mime: "text/plain".into(),
            data: ResourceData {
                body: Some(b"abc".to_vec()),
                ..Default::default()
            },
            attributes: ResourceAttributes {
                file_name: Some("a.txt".into()),
                attachment: true,
                ..Default::default()
            },
            ..Default::default()
        }]);
        let created = store.create_note(&n).await.unwrap();
        let guid = created.guid.clone().unwrap();

        let fetched = store.get_note(&guid, false, false).await.unwrap();
        assert!(fetched.content.is_none());
        let resources = fetched.resources.clone().unwrap();
        assert!(resources[0].data.body.is_none());
        assert_eq!(resources[0].data.size, 3);
        assert_eq!(resources[0].data.body_hash, md5::compute(b"abc").0.to_vec());

        store.update_note(&fetched).await.unwrap();
        let rguid = resources[0].guid.clone().unwrap();
        let resource = store.get_resource(&rguid, true).await.unwrap();
        assert_eq!(resource.data.body.as_deref(), Some(&b"abc"[..]));
        let again = store.get_note(&guid, true, false).await.unwrap();
        assert_eq!(again.content.as_deref(), Some(CONTENT));
    }

    #[tokio::test]
    async fn notebook_names_are_unique() {
        let store = InMemoryNoteStore::new();
        store.create_notebook("Work").await.unwrap();
        let err = store.create_notebook("work").await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::DataConflict));
    }

    #[tokio::test]
    async fn delete_and_not_found() {
        let store = InMemoryNoteStore::new();
        let guid = store.create_note(&note("x")).await.unwrap().guid.unwrap();
        store.delete_note(&guid).await.unwrap();
        assert_eq!(store.note_count(), 0);
        let err = store.get_note(&guid, true, false).await.unwrap_err();
        assert_eq!(err.explain(), "Cannot find Note");
    }

    #[tokio::test]
    async fn snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.json");
        {
            let store = InMemoryNoteStore::open(&path).unwrap();
            store.create_notebook("Journal").await.unwrap();
            store.create_note(&note("kept")).await.unwrap();
        }
        let store = InMemoryNoteStore::open(&path).unwrap();
        assert_eq!(store.note_count(), 1);
        let notebooks = store.list_notebooks().await.unwrap();
        assert_eq!(notebooks[0].name, "Journal");
    }
}
