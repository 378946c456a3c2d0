//! # kubeinteract UI
//!
//! The reactive document that sits between the conversation loop and whatever
//! presents it:
//!
//! - [`Document`]: append-only sequence of [`Block`]s with change notification
//! - [`Observable`]: single-shot rendezvous used by input blocks
//! - [`TerminalUi`]: a [`Subscriber`] that prints to a terminal, rendering
//!   model text as markdown, and answers input blocks from stdin

pub mod block;
pub mod document;
pub mod markdown;
pub mod observable;
pub mod terminal;

pub use block::{
    Block, Color, ErrorBlock, FunctionCallRequestBlock, InputOptionBlock, InputTextBlock,
    TextBlock,
};
pub use document::{Document, Subscriber, Subscription};
pub use observable::Observable;
pub use terminal::TerminalUi;
