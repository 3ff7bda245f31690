//! Note operations: send, save, open, revert, delete and search.
//!
//! Local documents are Markdown files. After a successful send, save, open
//! or revert the file is bound to its note through a sidecar
//! ([`crate::binding`]), so later commands know which note to update and
//! whether the file changed since the last sync.
//!
//! | Operation | Remote call |
//! |-----------|-------------|
//! | [`send`] | `create_note` |
//! | [`save`] | `update_note` |
//! | [`open`] | `get_note` + `get_note_tag_names` |
//! | [`delete`] | `delete_note` |
//! | [`search`] | `find_notes_metadata` |

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::binding::{self, NoteBinding};
use crate::codec::{decode_note, decode_note_raw, encode_document, DecodedNote, EncodedNote, NoteContext};
use crate::config::{Config, MAX_PAGE_SIZE};
use crate::enml::{self, EmbeddedSource};
use crate::links::guid_from_link;
use crate::models::{NoteFilter, NotesMetadataResultSpec, RemoteNote};
use crate::session::Session;
use crate::textify::{enml_to_markdown, TextOptions};

/// Printed by `enote new` when no template is configured.
pub const NEW_NOTE_TEMPLATE: &str = "---\ntitle: \nnotebook: \ntags: \n---\n\n";

/// Values used when the document header does not set them.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    pub title: Option<String>,
    pub tags: Option<Vec<String>>,
    pub notebook: Option<String>,
    /// Create the notebook when no notebook has that name.
    pub create_notebook: bool,
}

/// A note with the document applied, plus a notebook name that matched nothing.
#[derive(Debug, Clone)]
pub struct AppliedNote {
    pub note: RemoteNote,
    pub unresolved_notebook: Option<String>,
}

/// Copy the encoded document onto `note`.
///
/// Header fields win; absent ones keep what the note already carries. The
/// notebook name is looked up exactly (case-sensitive).
pub async fn apply_to_note(
    session: &Session,
    mut note: RemoteNote,
    encoded: EncodedNote,
) -> Result<AppliedNote> {
    let meta = encoded.metadata;
    if let Some(title) = meta.title.filter(|t| !t.trim().is_empty()) {
        note.title = Some(title);
    }
    if let Some(tags) = meta.tags {
        note.tag_names = Some(tags);
    }
    let mut unresolved_notebook = None;
    if let Some(name) = meta.notebook.filter(|n| !n.is_empty()) {
        match session.notebook_by_name(&name).await? {
            Some(notebook) => note.notebook_guid = Some(notebook.guid),
            None => unresolved_notebook = Some(name),
        }
    }
    note.content = Some(encoded.content);
    Ok(AppliedNote {
        note,
        unresolved_notebook,
    })
}

/// Create a new note from `text`.
pub async fn send(session: &Session, text: &str, options: &SendOptions) -> Result<RemoteNote> {
    let mut base = RemoteNote {
        title: options.title.clone(),
        tag_names: options.tags.clone(),
        ..Default::default()
    };
    let mut flag_notebook = None;
    if let Some(name) = &options.notebook {
        match session.notebook_by_name(name).await? {
            Some(notebook) => base.notebook_guid = Some(notebook.guid),
            None => flag_notebook = Some(name.clone()),
        }
    }

    let encoded = encode_document(text, &session.config().markdown.render_options());
    let applied = apply_to_note(session, base, encoded).await?;
    let mut note = applied.note;

    let missing = applied
        .unresolved_notebook
        .or_else(|| flag_notebook.filter(|_| note.notebook_guid.is_none()));
    if let Some(name) = missing {
        if !options.create_notebook {
            bail!(
                "Notebook {} not found! Pass --create-notebook to create it",
                name
            );
        }
        let notebook = session.create_notebook(&name).await?;
        info!(notebook = %notebook.name, "notebook created for new note");
        note.notebook_guid = Some(notebook.guid);
    }

    if note.title.as_deref().map_or(true, |t| t.trim().is_empty()) {
        bail!("A title is required: add a 'title:' line to the header or pass --title");
    }

    debug!(title = note.title.as_deref().unwrap_or(""), tags = ?note.tag_names, "posting note");
    let created = session.store().create_note(&note).await?;
    info!(guid = created.guid.as_deref().unwrap_or(""), "note created");
    Ok(created)
}

/// Replace the content of note `guid` with `text`.
///
/// `title` is used when the header has none. An unknown notebook name keeps
/// the note where it is.
pub async fn save(session: &Session, guid: &str, title: &str, text: &str) -> Result<RemoteNote> {
    let base = RemoteNote {
        guid: Some(guid.to_string()),
        title: Some(title.to_string()),
        ..Default::default()
    };
    let encoded = encode_document(text, &session.config().markdown.render_options());
    let applied = apply_to_note(session, base, encoded).await?;
    if let Some(name) = &applied.unresolved_notebook {
        warn!(notebook = %name, "notebook not found, keeping the current one");
    }
    let updated = session.store().update_note(&applied.note).await?;
    info!(guid, "note updated");
    Ok(updated)
}

pub fn read_document(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Cannot read {}", path.display()))
}

pub(crate) fn write_document(path: &Path, text: &str) -> Result<()> {
    std::fs::write(path, text).with_context(|| format!("Cannot write {}", path.display()))
}

/// The note a command acts on, and the local file bound to it, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteTarget {
    pub guid: String,
    pub file: Option<PathBuf>,
}

/// Resolve a guid, a note link, or a Markdown file bound to a note.
pub fn resolve_target(arg: &str) -> Result<NoteTarget> {
    let path = Path::new(arg);
    if path.is_file() {
        let binding = binding::load(path)?
            .with_context(|| format!("{} is not linked to a note", path.display()))?;
        return Ok(NoteTarget {
            guid: binding.guid,
            file: Some(path.to_path_buf()),
        });
    }
    Ok(NoteTarget {
        guid: guid_from_link(arg).to_string(),
        file: None,
    })
}

pub(crate) fn bind(path: &Path, note: &RemoteNote, text: &str) -> Result<()> {
    let guid = note.guid.as_deref().context("The service returned a note without guid")?;
    let binding = NoteBinding::new(guid, note.title.as_deref().unwrap_or(""), text);
    binding::save(path, &binding)
}

/// Send a file. Clips are not bound to the new note.
pub async fn send_file(
    session: &Session,
    path: &Path,
    options: &SendOptions,
    clip: bool,
) -> Result<RemoteNote> {
    let text = read_document(path)?;
    if clip {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut options = options.clone();
        options
            .title
            .get_or_insert_with(|| format!("Clip from {}", name));
        let clipped = clip_document(&text, language_for(path));
        return send(session, &clipped, &options).await;
    }
    let created = send(session, &text, options).await?;
    bind(path, &created, &text)?;
    Ok(created)
}

/// Save a bound file to its note.
pub async fn save_file(session: &Session, path: &Path) -> Result<RemoteNote> {
    let binding = binding::load(path)?.with_context(|| {
        format!(
            "{} is not linked to a note; use `enote send` first",
            path.display()
        )
    })?;
    let text = read_document(path)?;
    let updated = save(session, &binding.guid, &binding.title, &text).await?;
    bind(path, &updated, &text)?;
    Ok(updated)
}

/// Save if the file is bound, send otherwise.
pub async fn push_file(session: &Session, path: &Path, options: &SendOptions) -> Result<RemoteNote> {
    if binding::load(path)?.is_some() {
        save_file(session, path).await
    } else {
        send_file(session, path, options, false).await
    }
}

/// A downloaded note and its decoded text.
#[derive(Debug, Clone)]
pub struct OpenedNote {
    pub note: RemoteNote,
    pub notebook: String,
    pub tags: Vec<String>,
    pub decoded: DecodedNote,
}

/// Download a note by guid or link. `raw` keeps the markup.
pub async fn open(session: &Session, guid_or_link: &str, raw: bool) -> Result<OpenedNote> {
    let guid = guid_from_link(guid_or_link);
    if guid.is_empty() {
        bail!("A note guid or link is required");
    }
    let note = session.store().get_note(guid, true, false).await?;
    let content = note.content.clone().unwrap_or_default();
    let notebook = match note.notebook_guid.as_deref() {
        Some(nb) => session.notebook_name(nb).await?,
        None => String::new(),
    };
    let tags = session.store().get_note_tag_names(guid).await?;

    let decoded = if raw {
        decode_note_raw(&content)
    } else {
        let ctx = NoteContext {
            title: note.title.as_deref().unwrap_or(""),
            tags: &tags,
            notebook: &notebook,
        };
        decode_note(&content, &ctx, &session.config().text.text_options())
    };
    debug!(guid, source = ?decoded.source, "note opened");
    Ok(OpenedNote {
        note,
        notebook,
        tags,
        decoded,
    })
}

/// Download a note into `path` and bind the file to it.
pub async fn open_to_file(
    session: &Session,
    guid_or_link: &str,
    raw: bool,
    path: &Path,
) -> Result<OpenedNote> {
    let opened = open(session, guid_or_link, raw).await?;
    write_document(path, &opened.decoded.text)?;
    if !raw {
        bind(path, &opened.note, &opened.decoded.text)?;
    }
    Ok(opened)
}

/// Replace a bound file with the note's current version.
pub async fn revert_file(session: &Session, path: &Path, force: bool) -> Result<OpenedNote> {
    let binding = binding::load(path)?
        .with_context(|| format!("{} is not linked to a note", path.display()))?;
    if path.exists() && !force {
        let current = read_document(path)?;
        if binding.is_modified(&current) {
            bail!(
                "{} has been modified since the last sync; pass --force to replace it",
                path.display()
            );
        }
    }
    open_to_file(session, &binding.guid, false, path).await
}

/// Delete a note; returns its title.
pub async fn delete(session: &Session, guid_or_link: &str) -> Result<String> {
    let guid = guid_from_link(guid_or_link);
    let note = session.store().get_note(guid, false, false).await?;
    session.store().delete_note(guid).await?;
    info!(guid, "note deleted");
    Ok(note.title.unwrap_or_default())
}

/// One search result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub guid: String,
    pub title: String,
    pub notebook: String,
}

/// Find notes by words, notebook name and tag names.
pub async fn search(
    session: &Session,
    query: &str,
    notebook: Option<&str>,
    tags: &[String],
    limit: Option<usize>,
) -> Result<Vec<SearchHit>> {
    let config = session.config();
    let query = query.trim();
    let mut filter = NoteFilter {
        words: (!query.is_empty()).then(|| query.to_string()),
        order: Some(config.notes.sort_order()?),
        ascending: config.notes.ascending,
        ..Default::default()
    };

    if let Some(name) = notebook {
        let found = session
            .notebook_by_name(name)
            .await?
            .with_context(|| format!("Notebook {} not found!", name))?;
        filter.notebook_guid = Some(found.guid);
    }
    if !tags.is_empty() {
        let mut guids = Vec::with_capacity(tags.len());
        for tag in tags {
            let guid = session
                .tag_guid(tag)
                .await?
                .with_context(|| format!("Tag {} not found!", tag))?;
            guids.push(guid);
        }
        filter.tag_guids = Some(guids);
    }

    let max_notes = limit
        .unwrap_or(config.service.max_notes)
        .clamp(1, MAX_PAGE_SIZE);
    let spec = NotesMetadataResultSpec {
        include_title: true,
        include_notebook_guid: true,
        include_updated: false,
    };
    let page = session
        .store()
        .find_notes_metadata(&filter, 0, max_notes, &spec)
        .await?;

    let mut hits = Vec::with_capacity(page.notes.len());
    for summary in page.notes {
        let notebook = match summary.notebook_guid.as_deref() {
            Some(nb) => session.notebook_name(nb).await?,
            None => String::new(),
        };
        hits.push(SearchHit {
            guid: summary.guid,
            title: summary.title.unwrap_or_default(),
            notebook,
        });
    }
    Ok(hits)
}

/// Strip the common leading indentation of all non-blank lines.
pub fn deindent(text: &str) -> String {
    let indent_of = |line: &str| line.len() - line.trim_start_matches([' ', '\t']).len();
    let strip = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(indent_of)
        .min()
        .unwrap_or(0);
    text.lines()
        .map(|line| line.get(strip..).unwrap_or("").trim_end_matches('\r'))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Wrap `text` in a fenced code block.
pub fn clip_document(text: &str, language: &str) -> String {
    format!("```{}\n{}\n```\n", language, deindent(text))
}

/// Fence language for a file, from its extension.
pub fn language_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "rs" => "rust",
        "py" => "python",
        "js" | "mjs" => "javascript",
        "ts" => "typescript",
        "go" => "go",
        "c" | "h" => "c",
        "cpp" | "cc" | "hpp" => "cpp",
        "java" => "java",
        "rb" => "ruby",
        "sh" | "bash" => "bash",
        "toml" => "toml",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        "xml" | "enex" => "xml",
        "html" | "htm" => "html",
        "css" => "css",
        "sql" => "sql",
        "md" | "markdown" => "markdown",
        "tex" => "latex",
        _ => "",
    }
}

/// Text for `enote new`: the given template, the configured one, or the
/// built-in header snippet.
pub fn new_note_template(config: &Config, template: Option<&Path>) -> Result<String> {
    match template.or(config.notes.default_template.as_deref()) {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read template: {}", path.display())),
        None => Ok(NEW_NOTE_TEMPLATE.to_string()),
    }
}

/// Offline markup to Markdown: the embedded copy when present, else the
/// converter, else the markup itself.
pub fn convert_to_markdown(content: &str, options: &TextOptions) -> String {
    if let EmbeddedSource::Found(source) = enml::find_embedded_source(content) {
        if !source.is_empty() {
            return source;
        }
    }
    enml_to_markdown(content, options).unwrap_or_else(|e| {
        warn!(error = %e, "conversion failed, printing markup");
        content.to_string()
    })
}

/// "just now", "few minutes ago", "few hours ago", "yesterday",
/// "N days ago" (up to a week) or "on dd/mm/yy".
pub fn relative_date(timestamp_ms: i64, now: DateTime<Utc>) -> String {
    let Some(then) = DateTime::<Utc>::from_timestamp_millis(timestamp_ms) else {
        return "at an unknown time".to_string();
    };
    let delta = now.signed_duration_since(then);
    match delta.num_days() {
        0 if delta.num_seconds() <= 60 => "just now".to_string(),
        0 if delta.num_seconds() <= 3600 => "few minutes ago".to_string(),
        0 => "few hours ago".to_string(),
        1 => "yesterday".to_string(),
        n @ 2..=6 => format!("{} days ago", n),
        _ => then.format("on %d/%m/%y").to_string(),
    }
}

/// "Note created X, updated Y, N attachments"
pub fn status_info(note: &RemoteNote, now: DateTime<Utc>) -> String {
    let date = |ts: Option<i64>| match ts {
        Some(ms) => relative_date(ms, now),
        None => "at an unknown time".to_string(),
    };
    format!(
        "Note created {}, updated {}, {} attachments",
        date(note.created),
        date(note.updated),
        note.resource_count()
    )
}

/// Binding state of a local file.
#[derive(Debug, Clone)]
pub struct FileStatus {
    pub binding: Option<NoteBinding>,
    pub modified: bool,
}

pub fn file_status(path: &Path) -> Result<FileStatus> {
    let binding = binding::load(path)?;
    let modified = match &binding {
        Some(b) => b.is_modified(&read_document(path)?),
        None => false,
    };
    Ok(FileStatus { binding, modified })
}

pub fn print_posted(note: &RemoteNote) {
    println!(
        "Successfully posted note: guid:{}",
        note.guid.as_deref().unwrap_or("")
    );
    eprintln!("{}", status_info(note, Utc::now()));
}

pub fn print_updated(note: &RemoteNote) {
    println!(
        "Successfully updated note: guid:{}",
        note.guid.as_deref().unwrap_or("")
    );
    eprintln!("{}", status_info(note, Utc::now()));
}

pub fn run_new(config: &Config, template: Option<&Path>) -> Result<()> {
    print!("{}", new_note_template(config, template)?);
    Ok(())
}

pub async fn run_open(
    session: &Session,
    guid_or_link: &str,
    raw: bool,
    output: Option<&Path>,
) -> Result<()> {
    match output {
        Some(path) => {
            let opened = open_to_file(session, guid_or_link, raw, path).await?;
            println!(
                "Note \"{}\" opened in {}",
                opened.note.title.as_deref().unwrap_or(""),
                path.display()
            );
            eprintln!("{}", status_info(&opened.note, Utc::now()));
        }
        None => {
            let opened = open(session, guid_or_link, raw).await?;
            print!("{}", opened.decoded.text);
        }
    }
    Ok(())
}

pub async fn run_revert(session: &Session, path: &Path, force: bool) -> Result<()> {
    let opened = revert_file(session, path, force).await?;
    println!(
        "Reverted {} to note \"{}\"",
        path.display(),
        opened.note.title.as_deref().unwrap_or("")
    );
    Ok(())
}

/// Delete the note named by `target`; a bound file loses its sidecar.
pub async fn run_delete(session: &Session, target: &str, yes: bool) -> Result<()> {
    let target = resolve_target(target)?;
    let guid = target.guid.as_str();
    if !yes {
        let note = session.store().get_note(guid, false, false).await?;
        let title = note.title.as_deref().unwrap_or("Untitled");
        print!(
            "You are about to delete '{}'.\nYour note will still be recoverable from the Trash.\nDo you want to proceed? [y/N] ",
            title
        );
        std::io::stdout().flush()?;
        let mut answer = String::new();
        std::io::stdin().read_line(&mut answer)?;
        if !matches!(answer.trim(), "y" | "Y" | "yes") {
            println!("Note not deleted.");
            return Ok(());
        }
    }
    let title = delete(session, guid).await?;
    if let Some(file) = &target.file {
        binding::remove(file)?;
    }
    println!("Deleted note '{}'", title);
    Ok(())
}

pub async fn run_search(
    session: &Session,
    query: &str,
    notebook: Option<&str>,
    tags: &[String],
    limit: Option<usize>,
) -> Result<()> {
    let hits = search(session, query, notebook, tags, limit).await?;
    if hits.is_empty() {
        println!("No notes found!");
        return Ok(());
    }
    for hit in hits {
        println!("[{}] » {}  {}", hit.notebook, hit.title, hit.guid);
    }
    Ok(())
}

pub fn run_status(path: &Path) -> Result<()> {
    let status = file_status(path)?;
    let Some(binding) = status.binding else {
        println!("{}: not linked to a note", path.display());
        return Ok(());
    };
    println!("file:     {}", path.display());
    println!("guid:     {}", binding.guid);
    println!("title:    {}", binding.title);
    if let Some(at) = binding.synced_at {
        println!(
            "synced:   {}",
            relative_date(at.timestamp_millis(), Utc::now())
        );
    }
    println!(
        "modified: {}",
        if status.modified { "yes" } else { "no" }
    );
    Ok(())
}
