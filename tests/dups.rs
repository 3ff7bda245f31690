//! Pagination behaviour of the duplicate scan against a scripted store.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use enote::error::ServiceError;
use enote::models::{
    NoteFilter, NoteSummary, Notebook, NotesMetadataList, NotesMetadataResultSpec, RemoteNote,
    Resource, Tag,
};
use enote::progress::NoProgress;
use enote::scan::{collect_titles, find_duplicates};
use enote::store::memory::InMemoryNoteStore;
use enote::store::{NoteStore, StoreResult};

/// Answers listing calls from a queue of canned pages and records offsets.
struct ScriptedStore {
    pages: Mutex<VecDeque<StoreResult<NotesMetadataList>>>,
    calls: Mutex<Vec<(usize, usize)>>,
}

impl ScriptedStore {
    fn new(pages: Vec<StoreResult<NotesMetadataList>>) -> Self {
        Self {
            pages: Mutex::new(pages.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<(usize, usize)> {
        self.calls.lock().unwrap().clone()
    }
}

fn page(start: usize, total: usize, titles: &[&str]) -> StoreResult<NotesMetadataList> {
    Ok(NotesMetadataList {
        start_index: start,
        total_notes: total,
        notes: titles
            .iter()
            .enumerate()
            .map(|(i, t)| NoteSummary {
                guid: format!("g{}", start + i),
                title: Some(t.to_string()),
                ..Default::default()
            })
            .collect(),
    })
}

fn unsupported<T>() -> StoreResult<T> {
    Err(ServiceError::Protocol("not scripted".into()))
}

#[async_trait]
impl NoteStore for ScriptedStore {
    async fn find_notes_metadata(
        &self,
        _filter: &NoteFilter,
        offset: usize,
        max_notes: usize,
        spec: &NotesMetadataResultSpec,
    ) -> StoreResult<NotesMetadataList> {
        assert!(spec.include_title);
        self.calls.lock().unwrap().push((offset, max_notes));
        self.pages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ServiceError::Protocol("script exhausted".into())))
    }

    async fn get_note(&self, _: &str, _: bool, _: bool) -> StoreResult<RemoteNote> {
        unsupported()
    }
    async fn get_note_tag_names(&self, _: &str) -> StoreResult<Vec<String>> {
        unsupported()
    }
    async fn create_note(&self, _: &RemoteNote) -> StoreResult<RemoteNote> {
        unsupported()
    }
    async fn update_note(&self, _: &RemoteNote) -> StoreResult<RemoteNote> {
        unsupported()
    }
    async fn delete_note(&self, _: &str) -> StoreResult<()> {
        unsupported()
    }
    async fn list_notebooks(&self) -> StoreResult<Vec<Notebook>> {
        unsupported()
    }
    async fn create_notebook(&self, _: &str) -> StoreResult<Notebook> {
        unsupported()
    }
    async fn list_tags(&self) -> StoreResult<Vec<Tag>> {
        unsupported()
    }
    async fn get_tag(&self, _: &str) -> StoreResult<Tag> {
        unsupported()
    }
    async fn get_resource(&self, _: &str, _: bool) -> StoreResult<Resource> {
        unsupported()
    }
}

#[tokio::test]
async fn pages_until_total_is_reached() {
    let store = ScriptedStore::new(vec![
        page(0, 5, &["a", "b"]),
        page(2, 5, &["a", "c"]),
        page(4, 5, &["b"]),
    ]);

    let report = find_duplicates(&store, 2, &NoProgress).await.unwrap();
    assert_eq!(report.scanned, 5);
    assert_eq!(report.duplicates, vec!["a", "b"]);
    assert_eq!(store.calls(), vec![(0, 2), (2, 2), (4, 2)]);
}

#[tokio::test]
async fn short_pages_advance_by_what_was_returned() {
    let store = ScriptedStore::new(vec![page(0, 3, &["x"]), page(1, 3, &["y", "x"])]);

    let titles = collect_titles(&store, &NoteFilter::default(), 250, &NoProgress)
        .await
        .unwrap();
    assert_eq!(titles, vec!["x", "y", "x"]);
    assert_eq!(store.calls(), vec![(0, 250), (1, 250)]);
}

#[tokio::test]
async fn empty_account_makes_a_single_request() {
    let store = ScriptedStore::new(vec![page(0, 0, &[])]);

    let report = find_duplicates(&store, 250, &NoProgress).await.unwrap();
    assert_eq!(report.scanned, 0);
    assert!(report.duplicates.is_empty());
    assert_eq!(store.calls().len(), 1);
}

#[tokio::test]
async fn empty_page_before_total_is_an_error() {
    let store = ScriptedStore::new(vec![page(0, 4, &["a", "b"]), page(2, 4, &[])]);

    let err = find_duplicates(&store, 2, &NoProgress).await.unwrap_err();
    assert!(err.to_string().contains("empty page at offset 2 of 4"));
}

#[tokio::test]
async fn total_shrinking_mid_scan_stops_early() {
    let store = ScriptedStore::new(vec![page(0, 6, &["a", "b"]), page(2, 3, &["a"])]);

    let report = find_duplicates(&store, 2, &NoProgress).await.unwrap();
    assert_eq!(report.scanned, 3);
    assert_eq!(report.duplicates, vec!["a"]);
    assert_eq!(store.calls().len(), 2);
}

#[tokio::test]
async fn service_errors_abort_the_scan() {
    let store = ScriptedStore::new(vec![
        page(0, 4, &["a", "a"]),
        Err(ServiceError::Unreachable("connection reset".into())),
    ]);

    let err = find_duplicates(&store, 2, &NoProgress).await.unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to list notes at offset 2"));
    assert!(err.downcast_ref::<ServiceError>().is_some());
}

#[tokio::test]
async fn oversized_page_requests_are_clamped() {
    let store = ScriptedStore::new(vec![page(0, 1, &["only"])]);

    collect_titles(&store, &NoteFilter::default(), 10_000, &NoProgress)
        .await
        .unwrap();
    assert_eq!(store.calls(), vec![(0, 250)]);
}

#[tokio::test]
async fn scan_over_a_capped_in_memory_store() {
    let store = InMemoryNoteStore::new().with_page_cap(3);
    for title in ["Plan", "Todo", "Plan", "Ideas", "Todo", "Plan", "Log"] {
        store
            .create_note(&RemoteNote {
                title: Some(title.to_string()),
                content: Some("<en-note/>".into()),
                ..Default::default()
            })
            .await
            .unwrap();
    }

    let report = find_duplicates(&store, 250, &NoProgress).await.unwrap();
    assert_eq!(report.scanned, 7);
    assert_eq!(report.duplicates, vec!["Plan", "Todo"]);
}
