//! Note service abstraction.
//!
//! The [`NoteStore`] trait is the request/response surface of the remote
//! note service. Everything else in the crate talks to the service through
//! it, which keeps transport concerns out of the scanner and the codec.
//!
//! # Backends
//!
//! | Backend | Use |
//! |---------|-----|
//! | [`http::HttpNoteStore`] | JSON gateway in front of the real service |
//! | [`memory::InMemoryNoteStore`] | tests and the offline `sandbox` backend |
//!
//! Implementations must be `Send + Sync`; all operations are async via
//! `async-trait`.

pub mod http;
pub mod memory;

use async_trait::async_trait;

use crate::error::ServiceError;
use crate::models::{
    NoteFilter, Notebook, NotesMetadataList, NotesMetadataResultSpec, RemoteNote, Resource, Tag,
};

pub type StoreResult<T> = Result<T, ServiceError>;

/// Operations offered by the remote note service.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | `find_notes_metadata` | one page of a listing, with the total match count |
/// | `get_note` | a note, optionally with content and resource bodies |
/// | `get_note_tag_names` | tag names attached to a note |
/// | `create_note` / `update_note` / `delete_note` | note lifecycle |
/// | `list_notebooks` / `create_notebook` | notebooks |
/// | `list_tags` / `get_tag` | tags |
/// | `get_resource` | a single attachment |
#[async_trait]
pub trait NoteStore: Send + Sync {
    /// Return at most `max_notes` summaries starting at `offset`.
    ///
    /// A backend may return fewer than requested; `total_notes` is always the
    /// full number of matches.
    async fn find_notes_metadata(
        &self,
        filter: &NoteFilter,
        offset: usize,
        max_notes: usize,
        spec: &NotesMetadataResultSpec,
    ) -> StoreResult<NotesMetadataList>;

    async fn get_note(
        &self,
        guid: &str,
        with_content: bool,
        with_resources_data: bool,
    ) -> StoreResult<RemoteNote>;

    async fn get_note_tag_names(&self, guid: &str) -> StoreResult<Vec<String>>;

    /// Create a note. `tag_names` that do not exist yet are created.
    async fn create_note(&self, note: &RemoteNote) -> StoreResult<RemoteNote>;

    /// Update a note in place. Fields left as `None` keep their stored value.
    async fn update_note(&self, note: &RemoteNote) -> StoreResult<RemoteNote>;

    async fn delete_note(&self, guid: &str) -> StoreResult<()>;

    async fn list_notebooks(&self) -> StoreResult<Vec<Notebook>>;

    async fn create_notebook(&self, name: &str) -> StoreResult<Notebook>;

    async fn list_tags(&self) -> StoreResult<Vec<Tag>>;

    async fn get_tag(&self, guid: &str) -> StoreResult<Tag>;

    async fn get_resource(&self, guid: &str, with_data: bool) -> StoreResult<Resource>;
}
