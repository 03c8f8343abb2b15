//! Error types for KCP sessions.
//!
//! [`SessionError`] wraps [`kcp_engine::KcpError`] with the I/O, connection
//! and configuration failures of the async driver.

use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SessionError>;

// ── Error types ─────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Engine error: {0}")]
    Engine(#[from] kcp_engine::KcpError),

    #[error("Connection error: {kind}")]
    Connection { kind: ConnectionError },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionError {
    /// Closed locally, or the driver task has exited
    Closed,
    /// A segment exceeded the dead-link retransmission count
    Lost,
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "connection closed"),
            Self::Lost => write!(f, "connection lost"),
        }
    }
}

// ── Constructors ────────────────────────────────────────────────────────

impl SessionError {
    pub fn connection(kind: ConnectionError) -> Self {
        Self::Connection { kind }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

// ── Predicates ──────────────────────────────────────────────────────────

impl SessionError {
    /// The session can no longer carry traffic.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    pub fn is_lost(&self) -> bool {
        matches!(
            self,
            Self::Connection {
                kind: ConnectionError::Lost
            }
        )
    }

    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
            ),
            Self::Engine(e) => e.is_would_block(),
            _ => false,
        }
    }
}
