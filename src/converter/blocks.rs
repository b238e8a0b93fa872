//! Markdown to a flat list of layout blocks.

use lazy_static::lazy_static;
use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use regex::Regex;

use crate::stylesheet::parse_color;

lazy_static! {
    static ref HTML_TAG_REGEX: Regex = Regex::new(r"<(/?)([A-Za-z][A-Za-z0-9]*)([^>]*)>").unwrap();
    static ref STYLE_ATTR_REGEX: Regex = Regex::new(r#"(?i)style\s*=\s*["']([^"']*)["']"#).unwrap();
    static ref STYLE_COLOR_REGEX: Regex = Regex::new(r"(?i)(?:^|;)\s*color\s*:\s*([^;]+)").unwrap();
    static ref STYLE_SIZE_REGEX: Regex =
        Regex::new(r"(?i)font-size\s*:\s*([0-9]*\.?[0-9]+)\s*(em|%)").unwrap();
}

/// A run of text sharing one style.
#[derive(Clone, Debug, PartialEq)]
pub struct Span {
    pub text: String,
    pub bold: bool,
    pub italic: bool,
    pub color: Option<(f32, f32, f32)>,
    /// Relative to the block's font size.
    pub scale: f32,
}

pub type Cell = Vec<Span>;

#[derive(Clone, Debug, PartialEq)]
pub enum Block {
    Heading { level: usize, spans: Vec<Span> },
    Paragraph(Vec<Span>),
    /// `marker` is empty for continuation paragraphs of an item.
    ListItem { marker: String, depth: usize, spans: Vec<Span> },
    Table { header: Vec<Cell>, rows: Vec<Vec<Cell>> },
    Rule,
}

impl Block {
    #[cfg(test)]
    pub fn text(&self) -> String {
        let join = |spans: &[Span]| spans.iter().map(|s| s.text.as_str()).collect::<String>();
        match self {
            Block::Heading { spans, .. } | Block::Paragraph(spans) | Block::ListItem { spans, .. } => {
                join(spans)
            }
            Block::Table { header, rows } => {
                let mut lines = vec![header.iter().map(|c| join(c)).collect::<Vec<_>>().join("|")];
                lines.extend(
                    rows.iter()
                        .map(|row| row.iter().map(|c| join(c)).collect::<Vec<_>>().join("|")),
                );
                lines.join("\n")
            }
            Block::Rule => "---".to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct HtmlStyle {
    color: Option<(f32, f32, f32)>,
    scale: f32,
}

struct OpenItem {
    marker: String,
    depth: usize,
    emitted: bool,
}

#[derive(Default)]
struct TableState {
    header: Vec<Cell>,
    rows: Vec<Vec<Cell>>,
    row: Vec<Cell>,
    in_head: bool,
}

#[derive(Default)]
struct Builder {
    blocks: Vec<Block>,
    spans: Vec<Span>,
    bold: usize,
    italic: usize,
    html: Vec<HtmlStyle>,
    /// Next number for ordered lists, `None` for bullets.
    lists: Vec<Option<u64>>,
    items: Vec<OpenItem>,
    heading: Option<usize>,
    table: Option<TableState>,
    code: bool,
}

/// Parse `markdown` (with GitHub-style tables) into layout blocks.
pub fn parse(markdown: &str) -> Vec<Block> {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let mut builder = Builder::default();
    for event in Parser::new_ext(markdown, options) {
        builder.event(event);
    }
    builder.flush();
    builder.blocks
}

fn heading_level(level: HeadingLevel) -> usize {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

impl Builder {
    fn event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => {
                if self.code {
                    // Keep code block line structure
                    for (i, line) in text.split('\n').enumerate() {
                        if i > 0 {
                            self.push_text("\n");
                        }
                        self.push_text(line);
                    }
                } else {
                    self.push_text(&text);
                }
            }
            Event::Code(text) => self.push_text(&text),
            Event::InlineHtml(html) | Event::Html(html) => self.html(&html),
            Event::SoftBreak => self.push_text(" "),
            Event::HardBreak => self.push_text("\n"),
            Event::Rule => {
                self.flush();
                self.blocks.push(Block::Rule);
            }
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Heading { level, .. } => {
                self.flush();
                self.heading = Some(heading_level(level));
            }
            Tag::Paragraph | Tag::HtmlBlock | Tag::BlockQuote { .. } => self.flush(),
            Tag::CodeBlock(_) => {
                self.flush();
                self.code = true;
            }
            Tag::List(start) => {
                self.flush();
                self.lists.push(start);
            }
            Tag::Item => {
                self.flush();
                let depth = self.lists.len().saturating_sub(1);
                let marker = match self.lists.last_mut() {
                    Some(Some(n)) => {
                        let marker = format!("{}.", n);
                        *n += 1;
                        marker
                    }
                    _ => "-".to_string(),
                };
                self.items.push(OpenItem {
                    marker,
                    depth,
                    emitted: false,
                });
            }
            Tag::Emphasis => self.italic += 1,
            Tag::Strong => self.bold += 1,
            Tag::Table(_) => {
                self.flush();
                self.table = Some(TableState::default());
            }
            Tag::TableHead => {
                if let Some(table) = self.table.as_mut() {
                    table.in_head = true;
                    table.row.clear();
                }
            }
            Tag::TableRow => {
                if let Some(table) = self.table.as_mut() {
                    table.row.clear();
                }
            }
            Tag::TableCell => self.spans.clear(),
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Heading(_) => {
                let level = self.heading.take().unwrap_or(1);
                let spans = trim_spans(std::mem::take(&mut self.spans));
                if !spans.is_empty() {
                    self.blocks.push(Block::Heading { level, spans });
                }
            }
            TagEnd::Paragraph | TagEnd::HtmlBlock | TagEnd::BlockQuote { .. } => self.flush(),
            TagEnd::CodeBlock => {
                self.flush();
                self.code = false;
            }
            TagEnd::Item => {
                self.flush();
                self.items.pop();
            }
            TagEnd::List(_) => {
                self.flush();
                self.lists.pop();
            }
            TagEnd::Emphasis => self.italic = self.italic.saturating_sub(1),
            TagEnd::Strong => self.bold = self.bold.saturating_sub(1),
            TagEnd::TableCell => {
                let cell = trim_spans(std::mem::take(&mut self.spans));
                if let Some(table) = self.table.as_mut() {
                    table.row.push(cell);
                }
            }
            TagEnd::TableHead => {
                if let Some(table) = self.table.as_mut() {
                    table.header = std::mem::take(&mut table.row);
                    table.in_head = false;
                }
            }
            TagEnd::TableRow => {
                if let Some(table) = self.table.as_mut() {
                    if !table.in_head {
                        let row = std::mem::take(&mut table.row);
                        table.rows.push(row);
                    }
                }
            }
            TagEnd::Table => {
                if let Some(table) = self.table.take() {
                    self.blocks.push(Block::Table {
                        header: table.header,
                        rows: table.rows,
                    });
                }
            }
            _ => {}
        }
    }

    fn current_html(&self) -> HtmlStyle {
        self.html.last().copied().unwrap_or(HtmlStyle {
            color: None,
            scale: 1.0,
        })
    }

    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let html = self.current_html();
        let span = Span {
            text: text.to_string(),
            bold: self.bold > 0,
            italic: self.italic > 0,
            color: html.color,
            scale: html.scale,
        };
        match self.spans.last_mut() {
            Some(last)
                if last.bold == span.bold
                    && last.italic == span.italic
                    && last.color == span.color
                    && last.scale == span.scale =>
            {
                last.text.push_str(&span.text)
            }
            _ => self.spans.push(span),
        }
    }

    /// Apply an HTML fragment: styling tags change the current style, their
    /// text content is kept, everything else is dropped.
    fn html(&mut self, fragment: &str) {
        let mut cursor = 0;
        for caps in HTML_TAG_REGEX.captures_iter(fragment) {
            let whole = caps.get(0).map_or(0..0, |m| m.range());
            let between = fragment[cursor..whole.start].trim_matches('\n');
            self.push_text(between);
            cursor = whole.end;

            let closing = &caps[1] == "/";
            let name = caps[2].to_ascii_lowercase();
            match (name.as_str(), closing) {
                ("br", _) => self.push_text("\n"),
                ("b" | "strong", false) => self.bold += 1,
                ("b" | "strong", true) => self.bold = self.bold.saturating_sub(1),
                ("i" | "em", false) => self.italic += 1,
                ("i" | "em", true) => self.italic = self.italic.saturating_sub(1),
                ("span" | "font" | "div" | "p", false) => {
                    let style = self.parse_style(&caps[3]);
                    self.html.push(style);
                }
                ("span" | "font" | "div" | "p", true) => {
                    self.html.pop();
                }
                _ => {}
            }
        }
        let rest = fragment[cursor..].trim_matches('\n');
        self.push_text(rest);
    }

    fn parse_style(&self, attributes: &str) -> HtmlStyle {
        let inherited = self.current_html();
        let style = STYLE_ATTR_REGEX
            .captures(attributes)
            .map(|caps| caps[1].to_string())
            .unwrap_or_default();
        let color = STYLE_COLOR_REGEX
            .captures(&style)
            .and_then(|caps| parse_color(caps[1].trim()))
            .or(inherited.color);
        let scale = STYLE_SIZE_REGEX
            .captures(&style)
            .and_then(|caps| {
                let value: f32 = caps[1].parse().ok()?;
                Some(if &caps[2] == "%" { value / 100.0 } else { value })
            })
            .map_or(inherited.scale, |s| inherited.scale * s);
        HtmlStyle { color, scale }
    }

    /// Close the current inline run into a paragraph or list item.
    fn flush(&mut self) {
        if self.table.is_some() || self.heading.is_some() {
            return;
        }
        let spans = trim_spans(std::mem::take(&mut self.spans));
        if spans.is_empty() {
            return;
        }
        match self.items.last_mut() {
            Some(item) => {
                let marker = if item.emitted {
                    String::new()
                } else {
                    item.emitted = true;
                    item.marker.clone()
                };
                self.blocks.push(Block::ListItem {
                    marker,
                    depth: item.depth,
                    spans,
                });
            }
            None => self.blocks.push(Block::Paragraph(spans)),
        }
    }
}

/// Drop leading/trailing whitespace of a run and any span left empty.
fn trim_spans(mut spans: Vec<Span>) -> Vec<Span> {
    if let Some(first) = spans.first_mut() {
        first.text = first.text.trim_start().to_string();
    }
    if let Some(last) = spans.last_mut() {
        last.text = last.text.trim_end().to_string();
    }
    spans.retain(|span| !span.text.is_empty());
    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headings_paragraphs_and_emphasis() {
        let blocks = parse("# Convocation\n\nMme./Mlle./Mr. **Dupont**\n\nsuite *ici*");
        assert_eq!(blocks.len(), 3);
        assert!(matches!(&blocks[0], Block::Heading { level: 1, .. }));
        assert_eq!(blocks[0].text(), "Convocation");

        match &blocks[1] {
            Block::Paragraph(spans) => {
                assert_eq!(spans.len(), 2);
                assert_eq!(spans[1].text, "Dupont");
                assert!(spans[1].bold);
            }
            other => panic!("expected paragraph, got {:?}", other),
        }
        assert_eq!(blocks[2].text(), "suite ici");
    }

    #[test]
    fn tables_are_recognised() {
        let md = "Planning :\n\n| Date | Horaire |\n|:-----|:--------|\n| lundi | 08h30 |\n| mardi | 14h00 |\n";
        let blocks = parse(md);
        let table = blocks
            .iter()
            .find(|b| matches!(b, Block::Table { .. }))
            .expect("table block");
        assert_eq!(table.text(), "Date|Horaire\nlundi|08h30\nmardi|14h00");
    }

    #[test]
    fn empty_cells_stay_in_place() {
        let blocks = parse("| Enseignant | Salle |\n|:--|:--|\n| Dupont |  |\n");
        match &blocks[0] {
            Block::Table { header, rows } => {
                assert_eq!(header.len(), 2);
                assert_eq!(rows[0].len(), 2);
                assert!(rows[0][1].is_empty());
            }
            other => panic!("expected table, got {:?}", other),
        }
    }

    #[test]
    fn inline_span_colour_and_size() {
        let blocks =
            parse("<span style=\"color:red; font-size:.8em\">Présence obligatoire</span> ensuite");
        match &blocks[0] {
            Block::Paragraph(spans) => {
                assert_eq!(spans[0].text, "Présence obligatoire");
                assert_eq!(spans[0].color, Some((1.0, 0.0, 0.0)));
                assert!((spans[0].scale - 0.8).abs() < 1e-6);
                assert_eq!(spans[1].color, None);
            }
            other => panic!("expected paragraph, got {:?}", other),
        }
    }

    #[test]
    fn list_items_carry_markers() {
        let blocks = parse("- **Date :** *lundi*\n- **Matière :** *Maths*\n\n1. un\n2. deux\n");
        let markers: Vec<&str> = blocks
            .iter()
            .filter_map(|b| match b {
                Block::ListItem { marker, .. } => Some(marker.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(markers, vec!["-", "-", "1.", "2."]);
        assert_eq!(blocks[0].text(), "Date : lundi");
    }

    #[test]
    fn rule_and_hard_break() {
        let blocks = parse("a  \nb\n\n---\n");
        assert_eq!(blocks[0].text(), "a\nb");
        assert_eq!(blocks[1], Block::Rule);
    }
}
