//! The kubeinteract conversation loop.
//!
//! A [`Conversation`] drives one operator session:
//!
//! 1. **Send** the query (or the previous round's observations) to the model
//! 2. **Stream** the answer into the document, through the [`ShimChat`] when
//!    the model has no native function calling
//! 3. **Confirm** every requested tool call with the operator
//! 4. **Invoke** approved calls and feed their output back, until the model
//!    answers without calling a tool or the iteration bound is hit

pub mod conversation;
pub mod prompt;
pub mod shim;

pub use conversation::Conversation;
pub use prompt::system_prompt;
pub use shim::ShimChat;

#[cfg(test)]
pub(crate) mod test_helpers;
