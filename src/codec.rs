//! Markdown document <-> note content.
//!
//! [`encode_document`] renders a Markdown document (with optional metadata
//! header) into note content that embeds the original text.
//! [`decode_note`] reverses it: the embedded copy is preferred, the markup
//! converter is the fallback, and the raw content is the last resort.

use crate::enml::{self, EmbeddedSource};
use crate::metadata::{extract_metadata, metadata_header, Metadata};
use crate::render::{render_markdown, RenderOptions};
use crate::textify::{enml_to_markdown, TextOptions};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Rendered note content plus the header fields found in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedNote {
    pub content: String,
    pub metadata: Metadata,
}

/// Render `text` for upload. The whole text, header included, is embedded.
pub fn encode_document(text: &str, options: &RenderOptions) -> EncodedNote {
    let (metadata, body) = extract_metadata(text);
    let xhtml = render_markdown(body, options);
    let content = enml::wrap_envelope(&xhtml, text, options.style_for("body"));
    debug!(
        bytes = content.len(),
        has_header = !metadata.is_empty(),
        "encoded document"
    );
    EncodedNote { content, metadata }
}

/// What the remote note currently says about itself.
#[derive(Debug, Clone, Copy)]
pub struct NoteContext<'a> {
    pub title: &'a str,
    pub tags: &'a [String],
    pub notebook: &'a str,
}

/// Where the decoded text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeSource {
    /// The embedded Markdown copy.
    Embedded,
    /// Lossy conversion of the note markup.
    Converted,
    /// The note markup itself, unconverted.
    Raw,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedNote {
    pub text: String,
    pub source: DecodeSource,
}

/// Turn note content back into an editable Markdown document. Never fails.
pub fn decode_note(content: &str, ctx: &NoteContext<'_>, options: &TextOptions) -> DecodedNote {
    let fresh_header = metadata_header(ctx.title, ctx.tags, ctx.notebook);

    match enml::find_embedded_source(content) {
        EmbeddedSource::Found(source) if !source.is_empty() => {
            let (meta, body) = extract_metadata(&source);
            if meta.is_empty() {
                return DecodedNote {
                    text: format!("{}{}", fresh_header, source),
                    source: DecodeSource::Embedded,
                };
            }
            if header_matches(&meta, ctx) {
                return DecodedNote {
                    text: source,
                    source: DecodeSource::Embedded,
                };
            }
            debug!("embedded header is stale, replacing it");
            DecodedNote {
                text: format!("{}{}", fresh_header, body),
                source: DecodeSource::Embedded,
            }
        }
        EmbeddedSource::Corrupt(reason) => {
            warn!(%reason, "embedded source is unreadable, converting markup");
            convert_markup(content, &fresh_header, options)
        }
        _ => convert_markup(content, &fresh_header, options),
    }
}

/// The "open as markup" mode: content unchanged.
pub fn decode_note_raw(content: &str) -> DecodedNote {
    DecodedNote {
        text: content.to_string(),
        source: DecodeSource::Raw,
    }
}

fn convert_markup(content: &str, header: &str, options: &TextOptions) -> DecodedNote {
    match enml_to_markdown(content, options) {
        Ok(markdown) => DecodedNote {
            text: format!("{}{}", header, markdown),
            source: DecodeSource::Converted,
        },
        Err(e) => {
            warn!(error = %e, "markup conversion failed, keeping raw content");
            DecodedNote {
                text: format!("{}{}", header, content),
                source: DecodeSource::Raw,
            }
        }
    }
}

/// Title and notebook equal, tags equal as sets. A missing field never matches.
fn header_matches(meta: &Metadata, ctx: &NoteContext<'_>) -> bool {
    let Some(tags) = meta.tags.as_ref() else {
        return false;
    };
    let recovered: BTreeSet<&str> = tags.iter().map(String::as_str).collect();
    let remote: BTreeSet<&str> = ctx.tags.iter().map(String::as_str).collect();
    meta.title.as_deref() == Some(ctx.title)
        && meta.notebook.as_deref() == Some(ctx.notebook)
        && recovered == remote
}
