//! Links between notes.
//!
//! Notes are linked with Markdown links whose target is the desktop
//! client's view URL, `evernote:///view/{user}/{shard}/{guid}/{guid}/`.

use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;

use crate::session::Session;

pub const DEFAULT_LINK_TEMPLATE: &str = "[{title}]({url})";

static NOTE_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\[(.+)\]\(evernote:///view/\d+/s\d+/([0-9a-f-]+)/[0-9a-f-]+/\)")
        .expect("note link pattern is valid")
});

/// A note link found in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteLink {
    pub title: String,
    pub guid: String,
}

/// Accepts a bare guid or any URL whose last path segment is the guid.
pub fn guid_from_link(input: &str) -> &str {
    input
        .trim()
        .split('/')
        .filter(|s| !s.is_empty())
        .last()
        .unwrap_or("")
}

/// All note links in `text`, in order of appearance.
pub fn find_note_links(text: &str) -> Vec<NoteLink> {
    NOTE_LINK_RE
        .captures_iter(text)
        .map(|caps| NoteLink {
            title: caps[1].to_string(),
            guid: caps[2].to_string(),
        })
        .collect()
}

/// Fill `{title}` and `{url}` in `template`.
pub fn format_link(template: &str, title: &str, url: &str) -> String {
    template.replace("{title}", title).replace("{url}", url)
}

/// Link to the note `guid`, titled with its current title.
pub async fn note_link(session: &Session, guid: &str, template: &str) -> Result<String> {
    let guid = guid_from_link(guid);
    let note = session.store().get_note(guid, false, false).await?;
    let url = session.note_link(guid)?;
    Ok(format_link(
        template,
        note.title.as_deref().unwrap_or(""),
        &url,
    ))
}

pub async fn run_link(session: &Session, guid: &str, template: &str) -> Result<()> {
    println!("{}", note_link(session, guid, template).await?);
    Ok(())
}

pub fn run_links(text: &str) {
    let links = find_note_links(text);
    if links.is_empty() {
        println!("Could not find any links in the current note");
        return;
    }
    for link in links {
        println!("{}  {}", link.guid, link.title);
    }
}
