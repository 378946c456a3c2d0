//! LLM backend implementations for kubeinteract.
//!
//! All backends implement `kubeinteract_core::LlmClient`.
//! The router builds the configured backend; [`RetryChat`] adds transport
//! retries on top of any chat session.

pub mod openai_compat;
pub mod retry;
pub mod router;

pub use openai_compat::{OpenAiChat, OpenAiCompatClient};
pub use retry::RetryChat;
pub use router::build_from_config;
