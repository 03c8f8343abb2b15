//! Error types for the KCP engine

use thiserror::Error;

/// Result type for KCP engine operations
pub type KcpResult<T> = std::result::Result<T, KcpError>;

/// Errors produced by the KCP engine.
///
/// None of these are fatal to the connection. A dead link is reported through
/// [`KcpEngine::is_dead`](crate::KcpEngine::is_dead), not as an error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KcpError {
    #[error("cannot send an empty message")]
    EmptyPayload,

    #[error("message of {size} bytes needs {fragments} fragments (limit {limit})")]
    MessageTooLarge {
        size: usize,
        fragments: usize,
        limit: usize,
    },

    #[error("receive queue is empty")]
    RecvQueueEmpty,

    #[error("next message has not been fully received")]
    IncompleteMessage,

    #[error("buffer too small: message is {needed} bytes, buffer holds {available}")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("packet too short: {len} bytes")]
    PacketTooShort { len: usize },

    #[error("segment declares {declared} payload bytes but only {remaining} remain")]
    LengthOverflow { declared: u32, remaining: usize },

    #[error("conversation mismatch: expected {expected}, got {actual}")]
    ConvMismatch { expected: u32, actual: u32 },

    #[error("unknown command {0}")]
    UnknownCommand(u8),

    #[error("configuration error: {message}")]
    Config { message: String },
}

impl KcpError {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        KcpError::Config {
            message: message.into(),
        }
    }

    /// Errors caused by a malformed or foreign datagram passed to `input`.
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            KcpError::PacketTooShort { .. }
                | KcpError::LengthOverflow { .. }
                | KcpError::ConvMismatch { .. }
                | KcpError::UnknownCommand(_)
        )
    }

    /// Errors caused by the caller; the engine state is untouched.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            KcpError::EmptyPayload
                | KcpError::MessageTooLarge { .. }
                | KcpError::BufferTooSmall { .. }
                | KcpError::Config { .. }
        )
    }

    /// `recv` found nothing deliverable yet; try again after more input.
    pub fn is_would_block(&self) -> bool {
        matches!(self, KcpError::RecvQueueEmpty | KcpError::IncompleteMessage)
    }
}
