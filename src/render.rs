//! Markdown to ENML-safe XHTML.
//!
//! A small writer over pulldown-cmark events. The output is well-formed
//! XHTML restricted to what note markup accepts: void elements are self
//! closed, no `class` attribute is ever written, and styling comes from the
//! per-tag [`RenderOptions::inline_css`] map as `style` attributes.

use pulldown_cmark::{Alignment, CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use std::collections::{BTreeMap, HashMap};

/// Markdown extensions and inline styles used when rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    pub tables: bool,
    pub footnotes: bool,
    pub strikethrough: bool,
    pub tasklists: bool,
    /// Tag name to CSS declarations, e.g. `pre` -> `background: #eee;`.
    pub inline_css: BTreeMap<String, String>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            tables: true,
            footnotes: true,
            strikethrough: true,
            tasklists: true,
            inline_css: BTreeMap::new(),
        }
    }
}

impl RenderOptions {
    fn parser_options(&self) -> Options {
        let mut options = Options::empty();
        if self.tables {
            options.insert(Options::ENABLE_TABLES);
        }
        if self.footnotes {
            options.insert(Options::ENABLE_FOOTNOTES);
        }
        if self.strikethrough {
            options.insert(Options::ENABLE_STRIKETHROUGH);
        }
        if self.tasklists {
            options.insert(Options::ENABLE_TASKLISTS);
        }
        options
    }

    pub fn style_for(&self, tag: &str) -> Option<&str> {
        self.inline_css
            .get(tag)
            .map(String::as_str)
            .filter(|s| !s.trim().is_empty())
    }
}

/// Render a Markdown body to XHTML suitable for an `<en-note>` element.
pub fn render_markdown(body: &str, options: &RenderOptions) -> String {
    let parser = Parser::new_ext(body, options.parser_options());
    let mut writer = XhtmlWriter::new(options);
    for event in parser {
        writer.event(event);
    }
    writer.out
}

/// Escape text for element content and attribute values.
pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

struct ImageState {
    src: String,
    title: String,
    alt: String,
}

struct XhtmlWriter<'a> {
    options: &'a RenderOptions,
    out: String,
    image: Option<ImageState>,
    in_table_head: bool,
    alignments: Vec<Alignment>,
    cell: usize,
    footnotes: HashMap<String, usize>,
}

impl<'a> XhtmlWriter<'a> {
    fn new(options: &'a RenderOptions) -> Self {
        Self {
            options,
            out: String::new(),
            image: None,
            in_table_head: false,
            alignments: Vec::new(),
            cell: 0,
            footnotes: HashMap::new(),
        }
    }

    fn open(&mut self, tag: &str, attrs: &[(&str, String)]) {
        self.open_styled(tag, attrs, None);
    }

    fn open_styled(&mut self, tag: &str, attrs: &[(&str, String)], extra_style: Option<&str>) {
        self.out.push('<');
        self.out.push_str(tag);
        self.push_attrs(tag, attrs, extra_style);
        self.out.push('>');
    }

    fn void(&mut self, tag: &str, attrs: &[(&str, String)]) {
        self.out.push('<');
        self.out.push_str(tag);
        self.push_attrs(tag, attrs, None);
        self.out.push_str("/>");
    }

    fn push_attrs(&mut self, tag: &str, attrs: &[(&str, String)], extra_style: Option<&str>) {
        for (name, value) in attrs {
            self.out
                .push_str(&format!(" {}=\"{}\"", name, escape_xml(value)));
        }
        let style = match (self.options.style_for(tag), extra_style) {
            (Some(css), Some(extra)) => Some(format!("{} {}", css, extra)),
            (Some(css), None) => Some(css.to_string()),
            (None, Some(extra)) => Some(extra.to_string()),
            (None, None) => None,
        };
        if let Some(style) = style {
            self.out
                .push_str(&format!(" style=\"{}\"", escape_xml(&style)));
        }
    }

    fn close(&mut self, tag: &str) {
        self.out.push_str("</");
        self.out.push_str(tag);
        self.out.push('>');
    }

    fn newline(&mut self) {
        if !self.out.is_empty() && !self.out.ends_with('\n') {
            self.out.push('\n');
        }
    }

    fn footnote_number(&mut self, name: &str) -> usize {
        let next = self.footnotes.len() + 1;
        *self.footnotes.entry(name.to_string()).or_insert(next)
    }

    fn event(&mut self, event: Event<'_>) {
        if self.image.is_some() {
            match event {
                Event::End(TagEnd::Image) => {
                    if let Some(image) = self.image.take() {
                        let mut attrs = vec![("src", image.src), ("alt", image.alt)];
                        if !image.title.is_empty() {
                            attrs.push(("title", image.title));
                        }
                        self.void("img", &attrs);
                    }
                }
                Event::Text(text) | Event::Code(text) => {
                    if let Some(image) = self.image.as_mut() {
                        image.alt.push_str(&text);
                    }
                }
                _ => {}
            }
            return;
        }

        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => self.out.push_str(&escape_xml(&text)),
            Event::Code(code) => {
                self.open("code", &[]);
                self.out.push_str(&escape_xml(&code));
                self.close("code");
            }
            Event::Html(html) | Event::InlineHtml(html) => self.out.push_str(&html),
            Event::SoftBreak => self.out.push('\n'),
            Event::HardBreak => {
                self.void("br", &[]);
                self.out.push('\n');
            }
            Event::Rule => {
                self.newline();
                self.void("hr", &[]);
                self.out.push('\n');
            }
            Event::TaskListMarker(checked) => {
                self.void("en-todo", &[("checked", checked.to_string())]);
            }
            Event::FootnoteReference(name) => {
                let n = self.footnote_number(&name);
                self.open("sup", &[]);
                self.out.push_str(&format!("[{}]", n));
                self.close("sup");
            }
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph => {
                self.newline();
                self.open("p", &[]);
            }
            Tag::Heading { level, .. } => {
                self.newline();
                self.open(heading_tag(level), &[]);
            }
            Tag::BlockQuote { .. } => {
                self.newline();
                self.open("blockquote", &[]);
                self.out.push('\n');
            }
            Tag::CodeBlock(kind) => {
                self.newline();
                let attrs = match kind {
                    CodeBlockKind::Fenced(info) => {
                        let lang = info.split_whitespace().next().unwrap_or("").to_string();
                        if lang.is_empty() {
                            vec![]
                        } else {
                            vec![("title", lang)]
                        }
                    }
                    CodeBlockKind::Indented => vec![],
                };
                self.open("pre", &attrs);
                self.open("code", &[]);
            }
            Tag::List(Some(start)) => {
                self.newline();
                if start == 1 {
                    self.open("ol", &[]);
                } else {
                    self.open("ol", &[("start", start.to_string())]);
                }
                self.out.push('\n');
            }
            Tag::List(None) => {
                self.newline();
                self.open("ul", &[]);
                self.out.push('\n');
            }
            Tag::Item => self.open("li", &[]),
            Tag::FootnoteDefinition(name) => {
                let n = self.footnote_number(&name);
                self.newline();
                self.open("div", &[]);
                self.open("sup", &[]);
                self.out.push_str(&format!("[{}]", n));
                self.close("sup");
                self.out.push(' ');
            }
            Tag::Table(alignments) => {
                self.newline();
                self.alignments = alignments;
                self.open("table", &[]);
                self.out.push('\n');
            }
            Tag::TableHead => {
                self.in_table_head = true;
                self.cell = 0;
                self.open("thead", &[]);
                self.open("tr", &[]);
            }
            Tag::TableRow => {
                self.cell = 0;
                self.open("tr", &[]);
            }
            Tag::TableCell => {
                let tag = if self.in_table_head { "th" } else { "td" };
                let align = match self.alignments.get(self.cell) {
                    Some(Alignment::Left) => Some("text-align: left;"),
                    Some(Alignment::Center) => Some("text-align: center;"),
                    Some(Alignment::Right) => Some("text-align: right;"),
                    _ => None,
                };
                self.open_styled(tag, &[], align);
            }
            Tag::Emphasis => self.open("em", &[]),
            Tag::Strong => self.open("strong", &[]),
            Tag::Strikethrough => self.open("del", &[]),
            Tag::Link {
                dest_url, title, ..
            } => {
                let mut attrs = vec![("href", dest_url.to_string())];
                if !title.is_empty() {
                    attrs.push(("title", title.to_string()));
                }
                self.open("a", &attrs);
            }
            Tag::Image {
                dest_url, title, ..
            } => {
                self.image = Some(ImageState {
                    src: dest_url.to_string(),
                    title: title.to_string(),
                    alt: String::new(),
                });
            }
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => {
                self.close("p");
                self.out.push('\n');
            }
            TagEnd::Heading(level) => {
                self.close(heading_tag(level));
                self.out.push('\n');
            }
            TagEnd::BlockQuote { .. } => {
                self.newline();
                self.close("blockquote");
                self.out.push('\n');
            }
            TagEnd::CodeBlock => {
                self.close("code");
                self.close("pre");
                self.out.push('\n');
            }
            TagEnd::List(ordered) => {
                self.close(if ordered { "ol" } else { "ul" });
                self.out.push('\n');
            }
            TagEnd::Item => {
                self.close("li");
                self.out.push('\n');
            }
            TagEnd::FootnoteDefinition => {
                self.close("div");
                self.out.push('\n');
            }
            TagEnd::Table => {
                self.close("tbody");
                self.close("table");
                self.out.push('\n');
            }
            TagEnd::TableHead => {
                self.close("tr");
                self.close("thead");
                self.out.push('\n');
                self.in_table_head = false;
                self.open("tbody", &[]);
                self.out.push('\n');
            }
            TagEnd::TableRow => {
                self.close("tr");
                self.out.push('\n');
            }
            TagEnd::TableCell => {
                self.close(if self.in_table_head { "th" } else { "td" });
                self.cell += 1;
            }
            TagEnd::Emphasis => self.close("em"),
            TagEnd::Strong => self.close("strong"),
            TagEnd::Strikethrough => self.close("del"),
            TagEnd::Link => self.close("a"),
            _ => {}
        }
    }
}

fn heading_tag(level: HeadingLevel) -> &'static str {
    match level {
        HeadingLevel::H1 => "h1",
        HeadingLevel::H2 => "h2",
        HeadingLevel::H3 => "h3",
        HeadingLevel::H4 => "h4",
        HeadingLevel::H5 => "h5",
        HeadingLevel::H6 => "h6",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(md: &str) -> String {
        render_markdown(md, &RenderOptions::default())
    }

    #[test]
    fn renders_basic_inline_markup() {
        let html = render("Hello *world* and **bold** `x<y`");
        assert_eq!(
            html,
            "<p>Hello <em>world</em> and <strong>bold</strong> <code>x&lt;y</code></p>\n"
        );
    }

    #[test]
    fn fenced_code_keeps_language_as_title() {
        let html = render("```rust\nfn main() {}\n```\n");
        assert!(html.contains("<pre title=\"rust\"><code>fn main() {}\n</code></pre>"));
        assert!(!html.contains("class="));
    }

    #[test]
    fn void_elements_are_self_closed() {
        let html = render("a  \nb\n\n---\n\n![alt *text*](pic.png)");
        assert!(html.contains("<br/>"));
        assert!(html.contains("<hr/>"));
        assert!(html.contains("<img src=\"pic.png\" alt=\"alt text\"/>"));
    }

    #[test]
    fn task_list_items_become_todos() {
        let html = render("- [x] done\n- [ ] open\n");
        assert!(html.contains("<en-todo checked=\"true\"/>"));
        assert!(html.contains("<en-todo checked=\"false\"/>"));
    }

    #[test]
    fn inline_css_becomes_style_attributes() {
        let mut options = RenderOptions::default();
        options
            .inline_css
            .insert("blockquote".into(), "color: gray;".into());
        let html = render_markdown("> quoted", &options);
        assert!(html.starts_with("<blockquote style=\"color: gray;\">"));
    }

    #[test]
    fn tables_render_with_head_and_body() {
        let html = render("| a | b |\n|:--|--:|\n| 1 | 2 |\n");
        assert!(html.contains("<thead><tr><th style=\"text-align: left;\">a</th>"));
        assert!(html.contains("<tbody>"));
        assert!(html.contains("<td style=\"text-align: right;\">2</td>"));
    }

    #[test]
    fn tables_are_plain_text_when_disabled() {
        let options = RenderOptions {
            tables: false,
            ..RenderOptions::default()
        };
        let html = render_markdown("| a | b |\n|---|---|\n", &options);
        assert!(!html.contains("<table"));
    }

    #[test]
    fn footnotes_are_numbered() {
        let html = render("See[^n].\n\n[^n]: the note\n");
        assert!(html.contains("<sup>[1]</sup>"));
        assert!(html.contains("<div><sup>[1]</sup> "));
    }

    #[test]
    fn ordered_lists_keep_start() {
        let html = render("3. three\n4. four\n");
        assert!(html.starts_with("<ol start=\"3\">"));
    }
}
