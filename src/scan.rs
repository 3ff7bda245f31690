//! Duplicate-title scan.
//!
//! Pages through the metadata of every note (titles only), counts how often
//! each title occurs and reports the titles seen more than once. The scan
//! is read-only; any service error aborts it and partial results are dropped.

use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use tracing::{debug, info};

use crate::config::MAX_PAGE_SIZE;
use crate::models::{NoteFilter, NotesMetadataResultSpec};
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::session::Session;
use crate::store::NoteStore;

/// Title -> number of notes carrying it.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TitleIndex {
    counts: BTreeMap<String, usize>,
    total: usize,
}

impl TitleIndex {
    pub fn from_titles<I, S>(titles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut index = Self::default();
        for title in titles {
            index.add(title);
        }
        index
    }

    pub fn add(&mut self, title: impl Into<String>) {
        *self.counts.entry(title.into()).or_insert(0) += 1;
        self.total += 1;
    }

    /// Number of titles indexed; equals the sum of all counts.
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn count(&self, title: &str) -> usize {
        self.counts.get(title).copied().unwrap_or(0)
    }

    /// Titles occurring more than once, sorted.
    pub fn duplicates(&self) -> Vec<&str> {
        self.counts
            .iter()
            .filter(|(_, n)| **n > 1)
            .map(|(title, _)| title.as_str())
            .collect()
    }
}

/// Fetch every title matching `filter`, one page at a time.
///
/// The offset advances by the number of notes actually returned, and the
/// loop stops once it reaches the latest declared total.
pub async fn collect_titles(
    store: &dyn NoteStore,
    filter: &NoteFilter,
    page_size: usize,
    progress: &dyn ProgressReporter,
) -> Result<Vec<String>> {
    let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
    let spec = NotesMetadataResultSpec::titles_only();
    let mut titles = Vec::new();
    let mut offset = 0;

    loop {
        let page = store
            .find_notes_metadata(filter, offset, page_size, &spec)
            .await
            .with_context(|| format!("Failed to list notes at offset {}", offset))?;
        let total = page.total_notes;

        if page.notes.is_empty() {
            if offset < total {
                bail!(
                    "note listing returned an empty page at offset {} of {}",
                    offset,
                    total
                );
            }
            break;
        }

        offset += page.notes.len();
        titles.extend(page.notes.into_iter().map(|n| n.title.unwrap_or_default()));
        debug!(offset, total, "fetched listing page");
        progress.report(ProgressEvent::Scanning {
            fetched: offset as u64,
            total: total as u64,
        });

        if offset >= total {
            break;
        }
    }

    Ok(titles)
}

/// Outcome of a duplicate scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateReport {
    pub scanned: usize,
    pub duplicates: Vec<String>,
}

pub async fn find_duplicates(
    store: &dyn NoteStore,
    page_size: usize,
    progress: &dyn ProgressReporter,
) -> Result<DuplicateReport> {
    let titles = collect_titles(store, &NoteFilter::default(), page_size, progress).await?;
    let index = TitleIndex::from_titles(titles);
    let duplicates: Vec<String> = index.duplicates().into_iter().map(str::to_string).collect();
    info!(
        scanned = index.total(),
        duplicates = duplicates.len(),
        "duplicate scan complete"
    );
    Ok(DuplicateReport {
        scanned: index.total(),
        duplicates,
    })
}

/// `enote dups`: print the number of notes, then each duplicated title.
pub async fn run_dups(session: &Session, progress: &dyn ProgressReporter) -> Result<()> {
    let report = find_duplicates(
        session.store(),
        session.config().service.page_size,
        progress,
    )
    .await?;
    println!("{}", report.scanned);
    for title in &report.duplicates {
        println!("{}", title);
    }
    Ok(())
}
