//! Renderable units of a [`Document`](crate::Document).
//!
//! Blocks are shared by reference. Identity is pointer identity of the
//! underlying `Arc`; content is mutated in place and every mutation is
//! announced to the owning document's subscribers.

use std::sync::{Arc, Mutex, OnceLock, Weak};

use crate::document::{Document, DocumentInner};
use crate::observable::Observable;

/// Foreground colors a renderer may apply to a text block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Red,
    Green,
    White,
}

/// Back-reference to the document a block was added to. Set once.
#[derive(Debug, Default)]
struct Attachment(OnceLock<Weak<DocumentInner>>);

impl Attachment {
    fn attach(&self, doc: &Arc<DocumentInner>) -> bool {
        self.0.set(Arc::downgrade(doc)).is_ok()
    }

    fn document(&self) -> Option<Document> {
        self.0
            .get()
            .and_then(Weak::upgrade)
            .map(Document::from_inner)
    }

    fn is_attached(&self) -> bool {
        self.0.get().is_some()
    }

    fn changed(&self, block: Block) {
        if let Some(doc) = self.document() {
            doc.block_changed(&block);
        }
    }
}

#[derive(Debug, Default)]
struct TextState {
    text: String,
    streaming: bool,
}

/// Model output or an informational message.
#[derive(Debug, Default)]
pub struct TextBlock {
    attachment: Attachment,
    state: Mutex<TextState>,
    color: Option<Color>,
}

impl TextBlock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_text(text: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(TextState {
                text: text.into(),
                streaming: false,
            }),
            ..Self::default()
        })
    }

    pub fn with_color(text: impl Into<String>, color: Color) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(TextState {
                text: text.into(),
                streaming: false,
            }),
            color: Some(color),
            ..Self::default()
        })
    }

    pub fn text(&self) -> String {
        self.lock().text.clone()
    }

    pub fn streaming(&self) -> bool {
        self.lock().streaming
    }

    pub fn color(&self) -> Option<Color> {
        self.color
    }

    pub fn append_text(self: &Arc<Self>, text: &str) {
        self.lock().text.push_str(text);
        self.attachment.changed(Block::Text(self.clone()));
    }

    pub fn set_text(self: &Arc<Self>, text: impl Into<String>) {
        self.lock().text = text.into();
        self.attachment.changed(Block::Text(self.clone()));
    }

    pub fn set_streaming(self: &Arc<Self>, streaming: bool) {
        self.lock().streaming = streaming;
        self.attachment.changed(Block::Text(self.clone()));
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TextState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A failure shown to the operator.
#[derive(Debug, Default)]
pub struct ErrorBlock {
    attachment: Attachment,
    text: Mutex<String>,
}

impl ErrorBlock {
    pub fn new(text: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            attachment: Attachment::default(),
            text: Mutex::new(text.into()),
        })
    }

    pub fn text(&self) -> String {
        self.text.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set_text(self: &Arc<Self>, text: impl Into<String>) {
        *self.text.lock().unwrap_or_else(|e| e.into_inner()) = text.into();
        self.attachment.changed(Block::Error(self.clone()));
    }
}

/// A rendering of the action the model wants to run.
#[derive(Debug, Default)]
pub struct FunctionCallRequestBlock {
    attachment: Attachment,
    text: Mutex<String>,
}

impl FunctionCallRequestBlock {
    pub fn new(text: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            attachment: Attachment::default(),
            text: Mutex::new(text.into()),
        })
    }

    pub fn text(&self) -> String {
        self.text.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set_text(self: &Arc<Self>, text: impl Into<String>) {
        *self.text.lock().unwrap_or_else(|e| e.into_inner()) = text.into();
        self.attachment.changed(Block::FunctionCallRequest(self.clone()));
    }
}

/// A request for a free-text line from the operator.
#[derive(Debug, Default)]
pub struct InputTextBlock {
    attachment: Attachment,
    observable: Observable<String>,
}

impl InputTextBlock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn observable(&self) -> &Observable<String> {
        &self.observable
    }
}

/// A request for the operator to pick one of a closed set of options.
#[derive(Debug)]
pub struct InputOptionBlock {
    attachment: Attachment,
    prompt: String,
    options: Vec<String>,
    observable: Observable<String>,
}

impl InputOptionBlock {
    pub fn new<I, S>(prompt: impl Into<String>, options: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::new(Self {
            attachment: Attachment::default(),
            prompt: prompt.into(),
            options: options.into_iter().map(Into::into).collect(),
            observable: Observable::new(),
        })
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }

    pub fn observable(&self) -> &Observable<String> {
        &self.observable
    }
}

/// Any block that can live in a document.
#[derive(Debug, Clone)]
pub enum Block {
    Text(Arc<TextBlock>),
    Error(Arc<ErrorBlock>),
    FunctionCallRequest(Arc<FunctionCallRequestBlock>),
    InputText(Arc<InputTextBlock>),
    InputOption(Arc<InputOptionBlock>),
}

impl Block {
    /// Reference equality.
    pub fn ptr_eq(&self, other: &Block) -> bool {
        match (self, other) {
            (Block::Text(a), Block::Text(b)) => Arc::ptr_eq(a, b),
            (Block::Error(a), Block::Error(b)) => Arc::ptr_eq(a, b),
            (Block::FunctionCallRequest(a), Block::FunctionCallRequest(b)) => Arc::ptr_eq(a, b),
            (Block::InputText(a), Block::InputText(b)) => Arc::ptr_eq(a, b),
            (Block::InputOption(a), Block::InputOption(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// The document this block is attached to, if any.
    pub fn document(&self) -> Option<Document> {
        self.attachment().document()
    }

    pub fn is_attached(&self) -> bool {
        self.attachment().is_attached()
    }

    /// Displayable text of the block (the prompt for option blocks).
    pub fn text(&self) -> String {
        match self {
            Block::Text(b) => b.text(),
            Block::Error(b) => b.text(),
            Block::FunctionCallRequest(b) => b.text(),
            Block::InputText(_) => String::new(),
            Block::InputOption(b) => b.prompt().to_string(),
        }
    }

    pub(crate) fn attach(&self, doc: &Arc<DocumentInner>) -> bool {
        self.attachment().attach(doc)
    }

    fn attachment(&self) -> &Attachment {
        match self {
            Block::Text(b) => &b.attachment,
            Block::Error(b) => &b.attachment,
            Block::FunctionCallRequest(b) => &b.attachment,
            Block::InputText(b) => &b.attachment,
            Block::InputOption(b) => &b.attachment,
        }
    }
}

impl From<Arc<TextBlock>> for Block {
    fn from(b: Arc<TextBlock>) -> Self {
        Block::Text(b)
    }
}

impl From<Arc<ErrorBlock>> for Block {
    fn from(b: Arc<ErrorBlock>) -> Self {
        Block::Error(b)
    }
}

impl From<Arc<FunctionCallRequestBlock>> for Block {
    fn from(b: Arc<FunctionCallRequestBlock>) -> Self {
        Block::FunctionCallRequest(b)
    }
}

impl From<Arc<InputTextBlock>> for Block {
    fn from(b: Arc<InputTextBlock>) -> Self {
        Block::InputText(b)
    }
}

impl From<Arc<InputOptionBlock>> for Block {
    fn from(b: Arc<InputOptionBlock>) -> Self {
        Block::InputOption(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_reference_equality() {
        let a = TextBlock::with_text("same");
        let b = TextBlock::with_text("same");
        let a_block = Block::from(a.clone());
        assert!(a_block.ptr_eq(&Block::from(a)));
        assert!(!a_block.ptr_eq(&Block::from(b)));
    }

    #[test]
    fn different_kinds_never_equal() {
        let text = Block::from(TextBlock::with_text("x"));
        let err = Block::from(ErrorBlock::new("x"));
        assert!(!text.ptr_eq(&err));
    }

    #[test]
    fn unattached_mutation_is_silent() {
        let block = TextBlock::new();
        block.set_streaming(true);
        block.append_text("hello ");
        block.append_text("world");
        assert_eq!(block.text(), "hello world");
        assert!(block.streaming());
        assert!(!Block::from(block).is_attached());
    }

    #[test]
    fn set_text_replaces_content() {
        let block = ErrorBlock::new("first");
        block.set_text("second");
        assert_eq!(block.text(), "second");
    }

    #[test]
    fn option_block_exposes_prompt_and_options() {
        let block = InputOptionBlock::new("Proceed?", ["proceed", "skip"]);
        assert_eq!(block.prompt(), "Proceed?");
        assert_eq!(block.options(), &["proceed".to_string(), "skip".to_string()]);
        assert_eq!(Block::from(block).text(), "Proceed?");
    }

    #[test]
    fn colored_text_block() {
        let block = TextBlock::with_color("note", Color::White);
        assert_eq!(block.color(), Some(Color::White));
        assert_eq!(block.text(), "note");
    }
}
