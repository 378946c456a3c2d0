//! Markdown to styled terminal text.
//!
//! Model answers are markdown. [`render`] walks the pulldown-cmark events and
//! produces text with ANSI styling: bold and italic emphasis, headings,
//! bulleted and numbered lists, indented code blocks and aligned tables. Line
//! breaks inside paragraphs are kept, so command output quoted by the model
//! keeps its shape. Every line gets a two-space left margin.

use crossterm::style::{Attribute, Color, ContentStyle};
use pulldown_cmark::{Event, LinkType, Options, Parser, Tag, TagEnd};

const MARGIN: &str = "  ";
const CODE_INDENT: &str = "  ";

pub fn render(markdown: &str) -> String {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS;
    let mut renderer = Renderer::default();
    for event in Parser::new_ext(markdown, options) {
        renderer.event(event);
    }
    renderer.finish()
}

#[derive(Default)]
struct Table {
    rows: Vec<Vec<String>>,
    row: Vec<String>,
    cell: String,
    has_header: bool,
}

impl Table {
    fn end_row(&mut self) {
        self.rows.push(std::mem::take(&mut self.row));
    }

    fn render(&self, out: &mut String) {
        let columns = self.rows.iter().map(Vec::len).max().unwrap_or(0);
        let widths: Vec<usize> = (0..columns)
            .map(|c| {
                self.rows
                    .iter()
                    .filter_map(|row| row.get(c))
                    .map(|cell| cell.chars().count())
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        for (i, row) in self.rows.iter().enumerate() {
            let line = widths
                .iter()
                .enumerate()
                .map(|(c, width)| {
                    let cell = row.get(c).map(String::as_str).unwrap_or("");
                    format!("{cell:<width$}")
                })
                .collect::<Vec<_>>()
                .join(" │ ");
            let line = line.trim_end();

            if i == 0 && self.has_header {
                out.push_str(&styled(line, bold()));
                out.push('\n');
                let rule = widths
                    .iter()
                    .map(|w| "─".repeat(*w))
                    .collect::<Vec<_>>()
                    .join("─┼─");
                out.push_str(&rule);
            } else {
                out.push_str(line);
            }
            out.push('\n');
        }
    }
}

#[derive(Default)]
struct Renderer {
    out: String,
    bold: u32,
    italic: u32,
    strike: u32,
    heading: bool,
    code_block: bool,
    quote: u32,
    /// One entry per open list: the next number, or `None` for bullets.
    lists: Vec<Option<u64>>,
    item_prefix: bool,
    link: Option<String>,
    table: Option<Table>,
}

impl Renderer {
    fn event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => self.text(&text),
            Event::Code(code) => {
                if let Some(table) = &mut self.table {
                    table.cell.push_str(&code);
                    return;
                }
                self.prefix_item();
                let mut style = self.style();
                style.foreground_color = Some(Color::Cyan);
                self.out.push_str(&styled(&code, style));
            }
            Event::Html(html) | Event::InlineHtml(html) => self.text(&html),
            Event::SoftBreak | Event::HardBreak => match &mut self.table {
                Some(table) => table.cell.push(' '),
                None => self.out.push('\n'),
            },
            Event::Rule => {
                self.block_start();
                self.out.push_str("────────");
                self.out.push('\n');
            }
            Event::TaskListMarker(checked) => {
                self.prefix_item();
                self.out.push_str(if checked { "[x] " } else { "[ ] " });
            }
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph => {
                if self.lists.is_empty() {
                    self.block_start();
                    if self.quote > 0 {
                        self.out.push_str("│ ");
                    }
                }
            }
            Tag::Heading { .. } => {
                self.block_start();
                self.heading = true;
            }
            Tag::BlockQuote(..) => self.quote += 1,
            Tag::CodeBlock(_) => {
                if self.lists.is_empty() {
                    self.block_start();
                } else {
                    self.ensure_newline();
                }
                self.code_block = true;
            }
            Tag::List(first) => {
                if self.lists.is_empty() {
                    self.block_start();
                } else {
                    self.ensure_newline();
                }
                self.lists.push(first);
            }
            Tag::Item => {
                self.ensure_newline();
                self.item_prefix = true;
            }
            Tag::Table(_) => {
                self.block_start();
                self.table = Some(Table::default());
            }
            Tag::TableHead => {
                if let Some(table) = &mut self.table {
                    table.has_header = true;
                }
            }
            Tag::Emphasis => self.italic += 1,
            Tag::Strong => self.bold += 1,
            Tag::Strikethrough => self.strike += 1,
            Tag::Link {
                link_type,
                dest_url,
                ..
            } => {
                if link_type != LinkType::Autolink && self.table.is_none() {
                    self.link = Some(dest_url.to_string());
                }
            }
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => self.ensure_newline(),
            TagEnd::Heading(_) => {
                self.heading = false;
                self.ensure_newline();
            }
            TagEnd::BlockQuote(..) => self.quote = self.quote.saturating_sub(1),
            TagEnd::CodeBlock => self.code_block = false,
            TagEnd::List(_) => {
                self.lists.pop();
            }
            TagEnd::Item => {
                self.ensure_newline();
                if let Some(Some(n)) = self.lists.last_mut() {
                    *n += 1;
                }
            }
            TagEnd::TableHead | TagEnd::TableRow => {
                if let Some(table) = &mut self.table {
                    table.end_row();
                }
            }
            TagEnd::TableCell => {
                if let Some(table) = &mut self.table {
                    let cell = std::mem::take(&mut table.cell);
                    table.row.push(cell.trim().to_string());
                }
            }
            TagEnd::Table => {
                if let Some(table) = self.table.take() {
                    table.render(&mut self.out);
                }
            }
            TagEnd::Emphasis => self.italic = self.italic.saturating_sub(1),
            TagEnd::Strong => self.bold = self.bold.saturating_sub(1),
            TagEnd::Strikethrough => self.strike = self.strike.saturating_sub(1),
            TagEnd::Link => {
                if let Some(url) = self.link.take() {
                    let mut style = ContentStyle::new();
                    style.attributes.set(Attribute::Dim);
                    self.out.push_str(&styled(&format!(" ({url})"), style));
                }
            }
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        if let Some(table) = &mut self.table {
            table.cell.push_str(text);
            return;
        }

        if self.code_block {
            let mut style = ContentStyle::new();
            style.foreground_color = Some(Color::DarkYellow);
            for line in text.lines() {
                self.out.push_str(CODE_INDENT);
                self.out.push_str(&styled(line, style));
                self.out.push('\n');
            }
            return;
        }

        self.prefix_item();
        let style = self.style();
        for (i, line) in text.split('\n').enumerate() {
            if i > 0 {
                self.out.push('\n');
            }
            self.out.push_str(&styled(line, style));
        }
    }

    fn prefix_item(&mut self) {
        if !self.item_prefix {
            return;
        }
        self.item_prefix = false;
        let indent = "  ".repeat(self.lists.len().saturating_sub(1));
        let marker = match self.lists.last() {
            Some(Some(n)) => format!("{n}. "),
            _ => "• ".to_string(),
        };
        self.out.push_str(&indent);
        self.out.push_str(&marker);
    }

    fn style(&self) -> ContentStyle {
        let mut style = ContentStyle::new();
        if self.bold > 0 || self.heading {
            style.attributes.set(Attribute::Bold);
        }
        if self.italic > 0 {
            style.attributes.set(Attribute::Italic);
        }
        if self.strike > 0 {
            style.attributes.set(Attribute::CrossedOut);
        }
        if self.heading {
            style.foreground_color = Some(Color::Magenta);
        }
        style
    }

    fn ensure_newline(&mut self) {
        if !self.out.is_empty() && !self.out.ends_with('\n') {
            self.out.push('\n');
        }
    }

    /// Separate a new block from the previous one with a blank line.
    fn block_start(&mut self) {
        if self.out.is_empty() {
            return;
        }
        self.ensure_newline();
        if !self.out.ends_with("\n\n") {
            self.out.push('\n');
        }
    }

    fn finish(self) -> String {
        let body = self.out.trim_matches('\n');
        if body.is_empty() {
            return String::new();
        }
        let mut rendered = String::new();
        for line in body.split('\n') {
            if !line.is_empty() {
                rendered.push_str(MARGIN);
                rendered.push_str(line);
            }
            rendered.push('\n');
        }
        rendered
    }
}

fn bold() -> ContentStyle {
    let mut style = ContentStyle::new();
    style.attributes.set(Attribute::Bold);
    style
}

fn styled(text: &str, style: ContentStyle) -> String {
    if text.is_empty() || (style.foreground_color.is_none() && style.attributes.is_empty()) {
        text.to_string()
    } else {
        style.apply(text).to_string()
    }
}
