//! Line-oriented terminal renderer.
//!
//! Subscribes to a [`Document`] and prints blocks as they arrive. Only the
//! last block is rendered, and only the part not yet on screen is printed.
//! Text blocks are markdown: they are held back while streaming and rendered
//! once complete. Input blocks are answered from the input reader on a
//! dedicated thread, so a pending terminal read never blocks the async runtime.

use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex};

use crossterm::cursor::MoveTo;
use crossterm::queue;
use crossterm::style::{self, Print, ResetColor, SetForegroundColor};
use crossterm::terminal::{Clear, ClearType};
use kubeinteract_core::InputError;
use tracing::{debug, warn};

use crate::block::{Block, Color, InputOptionBlock, InputTextBlock};
use crate::document::{Document, Subscriber, Subscription};
use crate::markdown;

type SharedInput = Arc<Mutex<Box<dyn BufRead + Send>>>;
type SharedOutput = Arc<Mutex<Box<dyn Write + Send>>>;

/// What has already been printed for the block currently being rendered.
#[derive(Default)]
struct RenderCursor {
    block: Option<Block>,
    rendered: String,
}

pub struct TerminalUi {
    input: SharedInput,
    output: SharedOutput,
    cursor: Mutex<RenderCursor>,
}

impl TerminalUi {
    /// A renderer bound to the process's stdin and stdout.
    pub fn stdio() -> Arc<Self> {
        Self::with_io(
            Box::new(io::BufReader::new(io::stdin())),
            Box::new(io::stdout()),
        )
    }

    pub fn with_io(input: Box<dyn BufRead + Send>, output: Box<dyn Write + Send>) -> Arc<Self> {
        Arc::new(Self {
            input: Arc::new(Mutex::new(input)),
            output: Arc::new(Mutex::new(output)),
            cursor: Mutex::new(RenderCursor::default()),
        })
    }

    /// Start rendering `doc`. Rendering stops when the handle is dropped.
    pub fn subscribe(self: &Arc<Self>, doc: &Document) -> Subscription {
        doc.add_subscription(self.clone())
    }

    pub fn clear_screen(&self) {
        let mut out = lock(&self.output);
        let result = queue!(out, MoveTo(0, 0), Clear(ClearType::All)).and_then(|_| out.flush());
        if let Err(e) = result {
            warn!(error = %e, "Failed to clear screen");
        }
    }

    fn render_text(&self, block: &Block, text: &str, color: Option<Color>) {
        let mut cursor = lock(&self.cursor);
        let suffix = unrendered_suffix(&cursor.rendered, text);
        self.print(suffix, color);
        cursor.block = Some(block.clone());
        cursor.rendered = text.to_string();
    }

    fn render_markdown(&self, block: &Block, text: &str, color: Option<Color>) {
        let mut cursor = lock(&self.cursor);
        if cursor.rendered == text {
            return;
        }
        let suffix = unrendered_suffix(&cursor.rendered, text);
        self.print(&markdown::render(suffix), color);
        cursor.block = Some(block.clone());
        cursor.rendered = text.to_string();
    }

    fn print(&self, text: &str, color: Option<Color>) {
        let mut out = lock(&self.output);
        let result = write_colored(&mut *out, text, color).and_then(|_| out.flush());
        if let Err(e) = result {
            warn!(error = %e, "Failed to write to terminal");
        }
    }

    fn ask_text(&self, block: Arc<InputTextBlock>) {
        self.write_plain("\n>>> ");

        let input = self.input.clone();
        std::thread::spawn(move || {
            let result = read_line(&input);
            if let Err(e) = block.observable().set(result) {
                debug!(error = %e, "Input block was already answered");
            }
        });
    }

    fn ask_option(&self, block: Arc<InputOptionBlock>) {
        self.write_plain(&format!("{}\n", block.prompt()));

        let input = self.input.clone();
        let output = self.output.clone();
        std::thread::spawn(move || {
            let result = loop {
                write_to(&output, "  Enter your choice (number): ");
                match read_line(&input) {
                    Ok(line) => {
                        if let Some(choice) = match_option(block.options(), line.trim()) {
                            break Ok(choice);
                        }
                        write_to(
                            &output,
                            &format!(
                                "  Invalid choice. Please enter one of: {}\n",
                                block.options().join(", ")
                            ),
                        );
                    }
                    Err(e) => break Err(e),
                }
            };
            if let Err(e) = block.observable().set(result) {
                debug!(error = %e, "Option block was already answered");
            }
        });
    }

    fn write_plain(&self, text: &str) {
        write_to(&self.output, text);
    }
}

impl Subscriber for TerminalUi {
    fn document_changed(&self, doc: &Document, block: &Block) {
        let Some(index) = doc.index_of(block) else {
            return;
        };
        if index + 1 != doc.num_blocks() {
            warn!(index, "Update to blocks other than the last block is not supported in terminal mode");
            return;
        }

        {
            let mut cursor = lock(&self.cursor);
            let same = cursor.block.as_ref().is_some_and(|b| b.ptr_eq(block));
            if !same {
                if !cursor.rendered.is_empty() {
                    self.write_plain("\n");
                }
                cursor.block = Some(block.clone());
                cursor.rendered.clear();
            }
        }

        match block {
            Block::Error(b) => self.render_text(block, &b.text(), Some(Color::Red)),
            Block::FunctionCallRequest(b) => {
                self.render_text(block, &b.text(), Some(Color::Green))
            }
            // Markdown can't be rendered incrementally.
            Block::Text(b) if b.streaming() => {}
            Block::Text(b) => self.render_markdown(block, &b.text(), b.color()),
            Block::InputText(b) => self.ask_text(b.clone()),
            Block::InputOption(b) => self.ask_option(b.clone()),
        }
    }
}

/// The part of `text` not yet on screen.
fn unrendered_suffix<'a>(rendered: &str, text: &'a str) -> &'a str {
    if rendered.is_empty() {
        return text;
    }
    match text.strip_prefix(rendered) {
        Some(rest) => rest,
        None => {
            warn!(
                text = %text,
                rendered = %rendered,
                "Text did not match what was already rendered"
            );
            text
        }
    }
}

/// Resolve operator input against the options: exact text or 1-based number.
fn match_option(options: &[String], answer: &str) -> Option<String> {
    if let Some(option) = options.iter().find(|o| o.as_str() == answer) {
        return Some(option.clone());
    }
    answer
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| options.get(i))
        .cloned()
}

fn read_line(input: &SharedInput) -> Result<String, InputError> {
    let mut line = String::new();
    let n = lock(input).read_line(&mut line)?;
    if n == 0 {
        return Err(InputError::EndOfInput);
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn write_to(output: &SharedOutput, text: &str) {
    let mut out = lock(output);
    if let Err(e) = out.write_all(text.as_bytes()).and_then(|_| out.flush()) {
        warn!(error = %e, "Failed to write to terminal");
    }
}

fn write_colored(out: &mut impl Write, text: &str, color: Option<Color>) -> io::Result<()> {
    match color {
        Some(color) => queue!(
            out,
            SetForegroundColor(terminal_color(color)),
            Print(text),
            ResetColor
        ),
        None => queue!(out, Print(text)),
    }
}

fn terminal_color(color: Color) -> style::Color {
    match color {
        Color::Red => style::Color::DarkRed,
        Color::Green => style::Color::DarkGreen,
        Color::White => style::Color::Grey,
    }
}

fn lock<T: ?Sized>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}
