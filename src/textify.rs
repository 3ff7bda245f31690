//! Lossy ENML to Markdown conversion.
//!
//! Used when a note carries no embedded Markdown source (it was created in
//! another client, or edited there). Walks the markup with quick-xml and
//! emits an approximation: headings, paragraphs, emphasis, lists, quotes,
//! code blocks, links, images, simple tables and to-do checkboxes. Attachment
//! references (`<en-media>`) are kept verbatim so they survive a re-upload.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

/// Marks used for inline emphasis and list items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextOptions {
    pub emphasis_mark: String,
    pub strong_mark: String,
    pub item_mark: String,
}

impl Default for TextOptions {
    fn default() -> Self {
        Self {
            emphasis_mark: "_".to_string(),
            strong_mark: "**".to_string(),
            item_mark: "*".to_string(),
        }
    }
}

#[derive(Debug, Error)]
#[error("cannot convert note markup at byte {position}: {reason}")]
pub struct ConvertError {
    pub position: u64,
    pub reason: String,
}

/// Convert ENML (or any XHTML fragment) to Markdown.
pub fn enml_to_markdown(content: &str, options: &TextOptions) -> Result<String, ConvertError> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(false);
    reader.config_mut().check_end_names = false;

    let mut conv = Converter::new(options);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => conv.start(&e, false),
            Ok(Event::Empty(e)) => {
                let name = tag_name(e.local_name().as_ref());
                conv.start(&e, true);
                if !SKIPPED_ELEMENTS.contains(&name.as_str()) {
                    conv.end(&name);
                }
            }
            Ok(Event::End(e)) => conv.end(&tag_name(e.local_name().as_ref())),
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape_with(resolve_entity)
                    .map(|c| c.into_owned())
                    .unwrap_or_else(|_| String::from_utf8_lossy(&t).into_owned());
                conv.text(&text);
            }
            Ok(Event::CData(c)) => {
                let raw = c.into_inner();
                conv.text(&String::from_utf8_lossy(&raw));
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ConvertError {
                    position: reader.buffer_position() as u64,
                    reason: e.to_string(),
                })
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(conv.finish())
}

/// Elements whose content is not part of the note text.
const SKIPPED_ELEMENTS: [&str; 5] = ["head", "style", "script", "title", "en-crypt"];

fn tag_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).to_ascii_lowercase()
}

fn attr(e: &BytesStart<'_>, name: &str) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref().eq_ignore_ascii_case(name.as_bytes()))
        .map(|a| match a.unescape_value() {
            Ok(v) => v.into_owned(),
            Err(_) => String::from_utf8_lossy(&a.value).into_owned(),
        })
}

/// XML's predefined entities plus the HTML ones common in notes.
fn resolve_entity(name: &str) -> Option<&'static str> {
    quick_xml::escape::resolve_predefined_entity(name).or(match name {
        "nbsp" => Some(" "),
        "copy" => Some("©"),
        "reg" => Some("®"),
        "trade" => Some("™"),
        "hellip" => Some("…"),
        "mdash" => Some("—"),
        "ndash" => Some("–"),
        "lsquo" => Some("‘"),
        "rsquo" => Some("’"),
        "ldquo" => Some("“"),
        "rdquo" => Some("”"),
        "laquo" => Some("«"),
        "raquo" => Some("»"),
        "bull" => Some("•"),
        "middot" => Some("·"),
        "times" => Some("×"),
        "euro" => Some("€"),
        _ => None,
    })
}

struct Converter<'a> {
    options: &'a TextOptions,
    out: String,
    at_line_start: bool,
    pending: usize,
    quote_depth: usize,
    lists: Vec<Option<u64>>,
    pre_depth: usize,
    links: Vec<Option<String>>,
    skip_depth: usize,
    row: Option<Vec<String>>,
    cell: Option<String>,
    rows_written: usize,
}

impl<'a> Converter<'a> {
    fn new(options: &'a TextOptions) -> Self {
        Self {
            options,
            out: String::new(),
            at_line_start: true,
            pending: 0,
            quote_depth: 0,
            lists: Vec::new(),
            pre_depth: 0,
            links: Vec::new(),
            skip_depth: 0,
            row: None,
            cell: None,
            rows_written: 0,
        }
    }

    fn prefix(&self) -> String {
        format!(
            "{}{}",
            "> ".repeat(self.quote_depth),
            "    ".repeat(self.lists.len().saturating_sub(1))
        )
    }

    /// Ask for `n` line breaks before the next piece of content.
    fn block(&mut self, n: usize) {
        self.pending = self.pending.max(n);
    }

    fn flush_pending(&mut self) {
        let mut remaining = self.pending;
        self.pending = 0;
        if remaining == 0 || self.out.is_empty() {
            return;
        }
        if !self.at_line_start {
            if self.out.ends_with(' ') && !self.out.ends_with("  ") {
                self.out.pop();
            }
            self.out.push('\n');
            self.at_line_start = true;
        }
        remaining -= 1;
        for _ in 0..remaining {
            let prefix = self.prefix();
            self.out.push_str(prefix.trim_end());
            self.out.push('\n');
        }
    }

    fn emit(&mut self, s: &str) {
        if s.is_empty() || self.skip_depth > 0 {
            return;
        }
        if let Some(cell) = self.cell.as_mut() {
            cell.push_str(s);
            return;
        }
        self.flush_pending();
        for ch in s.chars() {
            if self.at_line_start && ch != '\n' {
                let prefix = self.prefix();
                self.out.push_str(&prefix);
                self.at_line_start = false;
            }
            self.out.push(ch);
            if ch == '\n' {
                self.at_line_start = true;
            }
        }
    }

    fn text(&mut self, raw: &str) {
        if self.skip_depth > 0 {
            return;
        }
        if self.pre_depth > 0 {
            self.emit(raw);
            return;
        }
        let mut collapsed = String::with_capacity(raw.len());
        let mut in_space = false;
        for ch in raw.chars() {
            if ch.is_whitespace() {
                if !in_space {
                    collapsed.push(' ');
                }
                in_space = true;
            } else {
                collapsed.push(ch);
                in_space = false;
            }
        }
        let starts_line = match self.cell.as_ref() {
            Some(cell) => cell.is_empty() || cell.ends_with(' '),
            None => {
                self.at_line_start
                    || self.pending > 0
                    || self.out.is_empty()
                    || self.out.ends_with(' ')
            }
        };
        let piece = if starts_line {
            collapsed.trim_start()
        } else {
            collapsed.as_str()
        };
        let piece = piece.to_string();
        self.emit(&piece);
    }

    fn start(&mut self, e: &BytesStart<'_>, empty: bool) {
        let name = tag_name(e.local_name().as_ref());
        match name.as_str() {
            "head" | "style" | "script" | "title" | "en-crypt" if !empty => self.skip_depth += 1,
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = name[1..].parse::<usize>().unwrap_or(1);
                self.block(2);
                self.emit(&format!("{} ", "#".repeat(level)));
            }
            "p" => self.block(2),
            "div" => self.block(1),
            "br" => {
                if self.cell.is_some() {
                    self.emit(" ");
                } else {
                    self.emit("  \n");
                }
            }
            "hr" => {
                self.block(2);
                self.emit("* * *");
                self.block(2);
            }
            "strong" | "b" => {
                let mark = self.options.strong_mark.clone();
                self.emit(&mark);
            }
            "em" | "i" => {
                let mark = self.options.emphasis_mark.clone();
                self.emit(&mark);
            }
            "del" | "s" | "strike" => self.emit("~~"),
            "code" | "tt" if self.pre_depth == 0 => self.emit("`"),
            "pre" => {
                self.block(2);
                let lang = attr(e, "title").unwrap_or_default();
                self.emit(&format!("```{}\n", lang.trim()));
                self.pre_depth += 1;
            }
            "blockquote" => {
                self.block(2);
                self.quote_depth += 1;
            }
            "ul" | "ol" => {
                self.block(if self.lists.is_empty() { 2 } else { 1 });
                let next = if name == "ol" {
                    Some(attr(e, "start").and_then(|s| s.parse().ok()).unwrap_or(1))
                } else {
                    None
                };
                self.lists.push(next);
            }
            "li" => {
                self.block(1);
                let marker = match self.lists.last_mut() {
                    Some(Some(n)) => {
                        let m = format!("{}. ", n);
                        *n += 1;
                        m
                    }
                    _ => format!("{} ", self.options.item_mark),
                };
                self.emit(&marker);
            }
            "a" => {
                let href = attr(e, "href").filter(|h| !h.is_empty());
                if href.is_some() {
                    self.emit("[");
                }
                self.links.push(href);
            }
            "img" => {
                let alt = attr(e, "alt").unwrap_or_default();
                let src = attr(e, "src").unwrap_or_default();
                self.emit(&format!("![{}]({})", alt, src));
            }
            "en-todo" => {
                let checked = attr(e, "checked").is_some_and(|v| v == "true");
                self.emit(if checked { "[x] " } else { "[ ] " });
            }
            "en-media" => {
                let mime = attr(e, "type").unwrap_or_default();
                let hash = attr(e, "hash").unwrap_or_default();
                self.emit(&format!("<en-media type=\"{}\" hash=\"{}\"/>", mime, hash));
            }
            "table" => {
                self.block(2);
                self.rows_written = 0;
            }
            "tr" => self.row = Some(Vec::new()),
            "td" | "th" => self.cell = Some(String::new()),
            _ => {}
        }
    }

    fn end(&mut self, name: &str) {
        match name {
            _ if SKIPPED_ELEMENTS.contains(&name) => {
                self.skip_depth = self.skip_depth.saturating_sub(1)
            }
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "p" => self.block(2),
            "div" => self.block(1),
            "strong" | "b" => {
                let mark = self.options.strong_mark.clone();
                self.emit(&mark);
            }
            "em" | "i" => {
                let mark = self.options.emphasis_mark.clone();
                self.emit(&mark);
            }
            "del" | "s" | "strike" => self.emit("~~"),
            "code" | "tt" if self.pre_depth == 0 => self.emit("`"),
            "pre" => {
                self.pre_depth = self.pre_depth.saturating_sub(1);
                if !self.at_line_start {
                    self.emit("\n");
                }
                self.emit("```");
                self.block(2);
            }
            "blockquote" => {
                self.quote_depth = self.quote_depth.saturating_sub(1);
                self.block(2);
            }
            "ul" | "ol" => {
                self.lists.pop();
                self.block(if self.lists.is_empty() { 2 } else { 1 });
            }
            "a" => {
                if let Some(Some(href)) = self.links.pop() {
                    self.emit(&format!("]({})", href));
                }
            }
            "td" | "th" => {
                if let Some(cell) = self.cell.take() {
                    let cell = cell.trim().replace('|', "\\|");
                    if let Some(row) = self.row.as_mut() {
                        row.push(cell);
                    }
                }
            }
            "tr" => {
                if let Some(row) = self.row.take() {
                    if row.is_empty() {
                        return;
                    }
                    self.block(1);
                    self.emit(&format!("| {} |", row.join(" | ")));
                    if self.rows_written == 0 {
                        let separator = vec!["---"; row.len()].join(" | ");
                        self.emit(&format!("\n| {} |", separator));
                    }
                    self.rows_written += 1;
                }
            }
            "table" => self.block(2),
            _ => {}
        }
    }

    fn finish(self) -> String {
        let mut out = String::with_capacity(self.out.len());
        let mut blank_run = 0;
        for line in self.out.trim().lines() {
            let is_blank = line.trim().is_empty() || line.trim() == ">";
            if is_blank {
                blank_run += 1;
                if blank_run > 1 {
                    continue;
                }
            } else {
                blank_run = 0;
            }
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}
