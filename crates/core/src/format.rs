//! Lightweight markdown to HTML for the summary panel.
//!
//! Covers what the summarizer actually produces: headings, bullet and
//! numbered lists (nested by indentation), paragraphs, rules, bold, italics
//! and inline code. Everything is HTML-escaped before any markup is added, so
//! the model's output can never inject structure of its own.

use std::sync::LazyLock;

use regex::Regex;

static CODE_SPAN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`([^`]+)`").unwrap());
// Only the asterisk form: underscores show up in identifiers like `__init__`.
static STRONG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*(.+?)\*\*").unwrap());
static EMPHASIS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*([^*\s](?:[^*]*[^*\s])?)\*").unwrap());

/// Escape text for use inside HTML element content or attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn render_emphasis(escaped: &str) -> String {
    let strong = STRONG.replace_all(escaped, "<strong>$1</strong>");
    EMPHASIS
        .replace_all(&strong, "<em>$1</em>")
        .into_owned()
}

/// Render one line of inline markdown.
pub fn render_inline(text: &str) -> String {
    let escaped = escape_html(text);
    let mut out = String::with_capacity(escaped.len());
    let mut last = 0;
    for caps in CODE_SPAN.captures_iter(&escaped) {
        let (Some(whole), Some(code)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        out.push_str(&render_emphasis(&escaped[last..whole.start()]));
        out.push_str("<code>");
        out.push_str(code.as_str());
        out.push_str("</code>");
        last = whole.end();
    }
    out.push_str(&render_emphasis(&escaped[last..]));
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListKind {
    Bullet,
    Ordered,
}

impl ListKind {
    fn tag(self) -> &'static str {
        match self {
            ListKind::Bullet => "ul",
            ListKind::Ordered => "ol",
        }
    }
}

struct OpenList {
    kind: ListKind,
    indent: usize,
    item_open: bool,
}

#[derive(Default)]
struct Renderer {
    out: String,
    paragraph: Vec<String>,
    lists: Vec<OpenList>,
}

impl Renderer {
    fn flush_paragraph(&mut self) {
        if self.paragraph.is_empty() {
            return;
        }
        let text = self.paragraph.join(" ");
        self.paragraph.clear();
        self.out.push_str("<p>");
        self.out.push_str(&render_inline(&text));
        self.out.push_str("</p>\n");
    }

    fn close_top_list(&mut self) {
        if let Some(list) = self.lists.pop() {
            if list.item_open {
                self.out.push_str("</li>\n");
            }
            self.out.push_str(&format!("</{}>\n", list.kind.tag()));
        }
    }

    fn close_lists(&mut self) {
        while !self.lists.is_empty() {
            self.close_top_list();
        }
    }

    fn list_item(&mut self, kind: ListKind, indent: usize, text: &str) {
        self.flush_paragraph();
        while let Some(top) = self.lists.last() {
            if top.indent > indent || (top.indent == indent && top.kind != kind) {
                self.close_top_list();
            } else {
                break;
            }
        }

        match self.lists.last() {
            Some(top) if top.indent == indent => {
                if top.item_open {
                    self.out.push_str("</li>\n");
                }
            }
            _ => {
                self.out.push_str(&format!("<{}>\n", kind.tag()));
                self.lists.push(OpenList {
                    kind,
                    indent,
                    item_open: false,
                });
            }
        }

        self.out.push_str("<li>");
        self.out.push_str(&render_inline(text));
        if let Some(top) = self.lists.last_mut() {
            top.item_open = true;
        }
    }

    fn heading(&mut self, level: usize, text: &str) {
        self.flush_paragraph();
        self.close_lists();
        // h1/h2 belong to the page and the panel title
        let tag = format!("h{}", (level + 2).min(6));
        self.out
            .push_str(&format!("<{tag}>{}</{tag}>\n", render_inline(text)));
    }

    fn rule(&mut self) {
        self.flush_paragraph();
        self.close_lists();
        self.out.push_str("<hr>\n");
    }

    fn text(&mut self, text: &str) {
        self.close_lists();
        self.paragraph.push(text.to_string());
    }

    fn finish(mut self) -> String {
        self.flush_paragraph();
        self.close_lists();
        self.out
    }
}

fn indent_width(line: &str) -> usize {
    line.chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}

fn parse_heading(content: &str) -> Option<(usize, &str)> {
    let level = content.chars().take_while(|&c| c == '#').count();
    if !(1..=6).contains(&level) {
        return None;
    }
    content[level..]
        .strip_prefix(' ')
        .map(|text| (level, text.trim().trim_end_matches('#').trim_end()))
}

fn parse_list_item(content: &str) -> Option<(ListKind, &str)> {
    for marker in ["- ", "* ", "+ "] {
        if let Some(text) = content.strip_prefix(marker) {
            return Some((ListKind::Bullet, text.trim()));
        }
    }

    let digits = content.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    let rest = &content[digits..];
    rest.strip_prefix(". ")
        .or_else(|| rest.strip_prefix(") "))
        .map(|text| (ListKind::Ordered, text.trim()))
}

fn is_rule(content: &str) -> bool {
    let marks: Vec<char> = content.chars().filter(|c| !c.is_whitespace()).collect();
    marks.len() >= 3
        && matches!(marks[0], '-' | '*' | '_')
        && marks.iter().all(|&c| c == marks[0])
}

/// Convert the summarizer's markdown into panel markup.
pub fn render_markdown(markdown: &str) -> String {
    let mut renderer = Renderer::default();

    for line in markdown.lines() {
        let content = line.trim();
        if content.is_empty() {
            renderer.flush_paragraph();
            continue;
        }

        if is_rule(content) {
            renderer.rule();
        } else if let Some((level, text)) = parse_heading(content) {
            renderer.heading(level, text);
        } else if let Some((kind, text)) = parse_list_item(content) {
            renderer.list_item(kind, indent_width(line), text);
        } else {
            renderer.text(content);
        }
    }

    renderer.finish()
}
