//! Metadata header parsing.
//!
//! A Markdown document may start with a small header:
//!
//! ```text
//! ---
//! title: Weekly review
//! tags: ["work", "review"]
//! notebook: Journal
//! ---
//!
//! Body text...
//! ```
//!
//! `title`, `tags` and `notebook` are understood; any other key is kept in
//! [`Metadata::extra`] so that re-serialising loses nothing.

use regex::Regex;
use std::sync::LazyLock;

static HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\A---[ \t]*\r?\n((?:[ \t]*[^ \t:\r\n]+[ \t]*:[^\r\n]*\r?\n)+)---[ \t]*(?:\r?\n|\z)",
    )
    .expect("metadata header pattern is valid")
});

/// Parsed header fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub title: Option<String>,
    pub tags: Option<Vec<String>>,
    pub notebook: Option<String>,
    /// Unrecognised `key: value` pairs, in document order.
    pub extra: Vec<(String, String)>,
}

impl Metadata {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.tags.is_none() && self.notebook.is_none() && self.extra.is_empty()
    }

    /// Serialise back to a header block. Empty metadata produces an empty string.
    pub fn to_header(&self) -> String {
        if self.is_empty() {
            return String::new();
        }
        let mut out = String::from("---\n");
        if let Some(title) = &self.title {
            out.push_str(&format!("title: {}\n", title));
        }
        if let Some(tags) = &self.tags {
            out.push_str(&format!("tags: {}\n", tags_json(tags)));
        }
        if let Some(notebook) = &self.notebook {
            out.push_str(&format!("notebook: {}\n", notebook));
        }
        for (key, value) in &self.extra {
            out.push_str(&format!("{}: {}\n", key, value));
        }
        out.push_str("---\n\n");
        out
    }

    fn set(&mut self, key: &str, value: &str) {
        match key {
            "title" => self.title = Some(value.to_string()),
            "notebook" => self.notebook = Some(value.to_string()),
            "tags" => self.tags = Some(parse_tags(value)),
            _ => match self.extra.iter_mut().find(|(k, _)| k == key) {
                Some(entry) => entry.1 = value.to_string(),
                None => self.extra.push((key.to_string(), value.to_string())),
            },
        }
    }
}

/// Split a document into its header fields and the remaining body.
///
/// A missing or malformed header yields empty metadata and the text unchanged.
pub fn extract_metadata(text: &str) -> (Metadata, &str) {
    let Some(caps) = HEADER_RE.captures(text) else {
        return (Metadata::default(), text);
    };
    let (Some(whole), Some(block)) = (caps.get(0), caps.get(1)) else {
        return (Metadata::default(), text);
    };

    let mut metadata = Metadata::default();
    for line in block.as_str().lines() {
        if let Some((key, value)) = line.split_once(':') {
            metadata.set(key.trim(), value.trim());
        }
    }

    let rest = text[whole.end()..].trim_start_matches(['\r', '\n']);
    (metadata, rest)
}

/// Parse a tag list: a JSON array of strings, or else comma-separated names.
pub fn parse_tags(value: &str) -> Vec<String> {
    if let Ok(tags) = serde_json::from_str::<Vec<String>>(value) {
        return tags;
    }
    value
        .split(',')
        .map(|t| t.trim_matches(|c| c == ' ' || c == '\t'))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// The header prepended to a freshly downloaded note.
pub fn metadata_header(title: &str, tags: &[String], notebook: &str) -> String {
    format!(
        "---\ntitle: {}\ntags: {}\nnotebook: {}\n---\n\n",
        title,
        tags_json(tags),
        notebook
    )
}

fn tags_json(tags: &[String]) -> String {
    serde_json::to_string(tags).unwrap_or_else(|_| "[]".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_fields_and_body() {
        let text = "---\ntitle: Hello\ntags: a, b\nnotebook: NB\n---\n\nBody\n";
        let (meta, rest) = extract_metadata(text);
        assert_eq!(meta.title.as_deref(), Some("Hello"));
        assert_eq!(meta.tags, Some(vec!["a".to_string(), "b".to_string()]));
        assert_eq!(meta.notebook.as_deref(), Some("NB"));
        assert_eq!(rest, "Body\n");
    }

    #[test]
    fn crlf_documents_have_headers_too() {
        let text = "---\r\ntitle: Hello\r\ntags: a, b\r\n---\r\n\r\nBody\r\n";
        let (meta, rest) = extract_metadata(text);
        assert_eq!(meta.title.as_deref(), Some("Hello"));
        assert_eq!(meta.tags, Some(vec!["a".to_string(), "b".to_string()]));
        assert_eq!(rest, "Body\r\n");
    }

    #[test]
    fn tags_accept_json_lists() {
        let (meta, _) = extract_metadata("---\ntags: [\"x, y\", \"z\"]\n---\nok");
        assert_eq!(meta.tags, Some(vec!["x, y".to_string(), "z".to_string()]));
    }

    #[test]
    fn comma_tags_drop_empty_entries() {
        assert_eq!(parse_tags(" a ,\t, b "), vec!["a".to_string(), "b".to_string()]);
        assert!(parse_tags("").is_empty());
    }

    #[test]
    fn malformed_header_leaves_text_unchanged() {
        let text = "---\ntitle Hello\n---\nBody";
        let (meta, rest) = extract_metadata(text);
        assert!(meta.is_empty());
        assert_eq!(rest, text);

        let unclosed = "---\ntitle: Hello\nBody";
        let (meta, rest) = extract_metadata(unclosed);
        assert!(meta.is_empty());
        assert_eq!(rest, unclosed);
    }

    #[test]
    fn header_must_start_the_document() {
        let text = "intro\n---\ntitle: x\n---\n";
        let (meta, rest) = extract_metadata(text);
        assert!(meta.is_empty());
        assert_eq!(rest, text);
    }

    #[test]
    fn unknown_keys_are_preserved_in_order() {
        let text = "---\nauthor: me\ntitle: T\nsource: web: page\n---\nx";
        let (meta, rest) = extract_metadata(text);
        assert_eq!(
            meta.extra,
            vec![
                ("author".to_string(), "me".to_string()),
                ("source".to_string(), "web: page".to_string())
            ]
        );
        assert_eq!(rest, "x");
    }

    #[test]
    fn serialised_header_reparses_to_the_same_mapping() {
        let meta = Metadata {
            title: Some("Trip: day 1".into()),
            tags: Some(vec!["travel".into(), "a, b".into()]),
            notebook: Some("Journal".into()),
            extra: vec![("mood".into(), "good".into())],
        };
        let body = "# Heading\n\ntext\n";
        let doc = format!("{}{}", meta.to_header(), body);
        let (parsed, rest) = extract_metadata(&doc);
        assert_eq!(parsed, meta);
        assert_eq!(rest, body);
    }

    #[test]
    fn fresh_header_round_trips() {
        let header = metadata_header("T", &["one".to_string()], "NB");
        assert_eq!(header, "---\ntitle: T\ntags: [\"one\"]\nnotebook: NB\n---\n\n");
        let (meta, rest) = extract_metadata(&header);
        assert_eq!(meta.title.as_deref(), Some("T"));
        assert_eq!(meta.tags, Some(vec!["one".to_string()]));
        assert_eq!(rest, "");
    }

    #[test]
    fn empty_metadata_serialises_to_nothing() {
        assert_eq!(Metadata::default().to_header(), "");
    }
}
