//! Error types for the kubeinteract domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all kubeinteract operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Transport errors (LLM backend) ---
    #[error("Provider error: {0}")]
    Provider(ProviderError),

    // --- Tool catalog errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Protocol violations (never retried) ---
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    // --- Human input ---
    #[error("Input error: {0}")]
    Input(#[from] InputError),

    // --- Iteration budget ---
    #[error("Max iterations reached ({iterations})")]
    MaxIterationsReached { iterations: usize },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Filesystem ---
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True when the operator closed input (Ctrl-D or exhausted pipe).
    pub fn is_end_of_input(&self) -> bool {
        matches!(self, Error::Input(InputError::EndOfInput))
    }
}

/// Protocol violations carried through a chat stream surface as
/// [`Error::Protocol`], everything else as [`Error::Provider`].
impl From<ProviderError> for Error {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::Protocol(p) => Error::Protocol(p),
            other => Error::Provider(other),
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request cancelled")]
    Cancelled,

    /// A stream adapter rejected what the backend sent.
    #[error("Protocol violation: {0}")]
    Protocol(ProtocolError),
}

impl ProviderError {
    /// Whether a transport-level retry can be attempted for this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Network(_)
            | ProviderError::Timeout(_)
            | ProviderError::RateLimited { .. } => true,
            ProviderError::ApiError { status_code, .. } => {
                matches!(status_code, 408 | 500 | 502 | 503 | 504)
            }
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool invocation cancelled: {0}")]
    Cancelled(String),
}

/// A peer broke the expected exchange. These are never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("no candidates in LLM response")]
    NoCandidates,

    #[error("no text part found in candidate")]
    NonTextPart,

    #[error("parsing action block {raw:?}: {reason}")]
    MalformedAction { raw: String, reason: String },

    #[error("invalid confirmation choice: {0:?}")]
    InvalidChoice(String),

    #[error("observable already resolved")]
    AlreadyResolved,
}

/// Failure to obtain input from the operator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("end of input")]
    EndOfInput,

    #[error("reading input: {0}")]
    Read(String),
}

impl From<std::io::Error> for InputError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            InputError::EndOfInput
        } else {
            InputError::Read(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn retryable_classification() {
        assert!(ProviderError::Network("reset".into()).is_retryable());
        assert!(ProviderError::RateLimited { retry_after_secs: 5 }.is_retryable());
        assert!(
            ProviderError::ApiError {
                status_code: 503,
                message: "unavailable".into()
            }
            .is_retryable()
        );
        assert!(
            !ProviderError::ApiError {
                status_code: 400,
                message: "bad request".into()
            }
            .is_retryable()
        );
        assert!(!ProviderError::AuthenticationFailed("nope".into()).is_retryable());
        assert!(!ProviderError::Cancelled.is_retryable());
    }

    #[test]
    fn end_of_input_is_distinct() {
        let eof = Error::Input(InputError::EndOfInput);
        let read = Error::Input(InputError::Read("broken pipe".into()));
        assert!(eof.is_end_of_input());
        assert!(!read.is_end_of_input());
    }

    #[test]
    fn io_unexpected_eof_maps_to_end_of_input() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        assert_eq!(InputError::from(io), InputError::EndOfInput);
    }

    #[test]
    fn protocol_violation_in_stream_converts_to_protocol_error() {
        let err: Error = ProviderError::Protocol(ProtocolError::NonTextPart).into();
        assert!(matches!(err, Error::Protocol(ProtocolError::NonTextPart)));
        assert!(!ProviderError::Protocol(ProtocolError::NoCandidates).is_retryable());

        let err: Error = ProviderError::Cancelled.into();
        assert!(matches!(err, Error::Provider(ProviderError::Cancelled)));
    }

    #[test]
    fn malformed_action_keeps_raw_text() {
        let err = ProtocolError::MalformedAction {
            raw: "{not json".into(),
            reason: "EOF while parsing".into(),
        };
        assert!(err.to_string().contains("{not json"));
    }
}
