//! ENML envelope and the embedded source comment.
//!
//! Uploaded notes carry a base64 copy of the Markdown they were rendered
//! from, in an XML comment placed right after the `<en-note>` start tag.
//! Downloading a note looks for that comment first and only falls back to a
//! lossy markup conversion when it is missing.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use regex::Regex;

pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;
pub const DOCTYPE: &str = r#"<!DOCTYPE en-note SYSTEM "http://xml.evernote.com/pub/enml2.dtd">"#;

/// Opening marker of the embedded source comment. Notes written by earlier
/// tools use the same marker, so it must not change.
pub const SOURCE_COMMENT_BEGIN: &str = "<!-- Sublime:";
pub const SOURCE_COMMENT_END: &str = "-->";

/// How far past the body start the comment may begin.
const SOURCE_COMMENT_WINDOW: usize = 100;

/// Result of looking for the embedded source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbeddedSource {
    Found(String),
    Missing,
    /// A comment is present but does not decode to UTF-8 text.
    Corrupt(String),
}

/// Wrap a rendered body into a complete note document.
pub fn wrap_envelope(body_xhtml: &str, source_text: &str, body_style: Option<&str>) -> String {
    let style = body_style.unwrap_or("");
    format!(
        "{}{}<en-note style=\"{}\">\n{}\n{}</en-note>",
        XML_DECLARATION,
        DOCTYPE,
        crate::render::escape_xml(style),
        source_comment(source_text),
        body_xhtml
    )
}

/// `<!-- Sublime:{base64}-->`
pub fn source_comment(text: &str) -> String {
    format!(
        "{}{}{}",
        SOURCE_COMMENT_BEGIN,
        STANDARD.encode(text.as_bytes()),
        SOURCE_COMMENT_END
    )
}

/// Byte offset just past the `>` closing the `<en-note ...>` start tag, or 0.
pub fn body_start(content: &str) -> usize {
    content
        .find("<en-note")
        .and_then(|open| content[open..].find('>').map(|close| open + close + 1))
        .unwrap_or(0)
}

/// Byte range of the embedded comment, if it starts close enough to the body start.
fn source_comment_span(content: &str) -> Option<(usize, usize)> {
    let start = body_start(content);
    let rel = content[start..].find(SOURCE_COMMENT_BEGIN)?;
    if rel + SOURCE_COMMENT_BEGIN.len() > SOURCE_COMMENT_WINDOW {
        return None;
    }
    let begin = start + rel;
    let payload = begin + SOURCE_COMMENT_BEGIN.len();
    let end = content[payload..].find(SOURCE_COMMENT_END)? + payload + SOURCE_COMMENT_END.len();
    Some((begin, end))
}

/// Recover the embedded Markdown source from note content.
pub fn find_embedded_source(content: &str) -> EmbeddedSource {
    let Some((begin, end)) = source_comment_span(content) else {
        return EmbeddedSource::Missing;
    };
    let encoded = &content[begin + SOURCE_COMMENT_BEGIN.len()..end - SOURCE_COMMENT_END.len()];
    let cleaned: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    match STANDARD.decode(cleaned.as_bytes()) {
        Ok(bytes) => match String::from_utf8(bytes) {
            Ok(text) => EmbeddedSource::Found(text),
            Err(e) => EmbeddedSource::Corrupt(e.to_string()),
        },
        Err(e) => EmbeddedSource::Corrupt(e.to_string()),
    }
}

/// Remove the embedded comment (and the newline after it).
///
/// Needed once the rendered body is edited remotely: the stale copy would
/// otherwise win over the edit on the next download.
pub fn strip_embedded_source(content: &str) -> String {
    match source_comment_span(content) {
        Some((begin, end)) => {
            let after = if content[end..].starts_with('\n') { end + 1 } else { end };
            format!("{}{}", &content[..begin], &content[after..])
        }
        None => content.to_string(),
    }
}

/// `<en-media type=".." hash=".."/>` for an attachment.
pub fn media_element(mime: &str, hash_hex: &str) -> String {
    format!(
        "<en-media type=\"{}\" hash=\"{}\"/>",
        crate::render::escape_xml(mime),
        hash_hex
    )
}

/// Reference an attachment at the end of the note body.
///
/// Returns `None` when the content does not end with `</en-note>`.
pub fn append_media(content: &str, mime: &str, hash_hex: &str) -> Option<String> {
    let trimmed = content.trim_end();
    let head = trimmed.strip_suffix("</en-note>")?;
    Some(format!("{}{}</en-note>", head, media_element(mime, hash_hex)))
}

/// Drop every `<en-media>` element that references `hash_hex`.
pub fn remove_media(content: &str, hash_hex: &str) -> String {
    let pattern = format!(
        r#"(?is)<en-media\b[^>]*\bhash\s*=\s*["']{}["'][^>]*?(?:/>|>\s*</en-media>)"#,
        regex::escape(hash_hex)
    );
    match Regex::new(&pattern) {
        Ok(re) => re.replace_all(content, "").into_owned(),
        Err(_) => content.to_string(),
    }
}
