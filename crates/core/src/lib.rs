//! # kubeinteract Core
//!
//! Domain types, traits, and error definitions shared by every kubeinteract
//! crate. This crate defines the two capabilities the conversation loop is
//! written against:
//!
//! - [`LlmClient`] / [`Chat`]: a streaming chat backend
//! - [`ToolCatalog`] / [`ToolInvocation`]: the actions the model may request
//!
//! Implementations live in their respective crates, so the loop can be driven
//! by scripted backends and catalogs in tests.

pub mod error;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, InputError, ProtocolError, ProviderError, Result, ToolError};
pub use provider::{
    Candidate, Chat, ChatResponse, ChatStream, FunctionCall, FunctionDefinition, LlmClient, Part,
    Usage,
};
pub use tool::{InvokeToolOptions, Tool, ToolCatalog, ToolInvocation, ToolRegistry};
