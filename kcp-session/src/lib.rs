//! # kcp-session: async driver for the KCP engine
//!
//! Runs a [`kcp_engine::KcpEngine`] inside a tokio task, feeding it from an
//! async datagram [`Transport`] and scheduling its updates with
//! [`KcpEngine::check`](kcp_engine::KcpEngine::check).
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────┐
//! │  kcp-session  (this crate)            │
//! │                                       │
//! │  KcpSession      ← user API           │
//! │  actor           ← timer + channels   │
//! │  transport       ← UDP I/O            │
//! ├───────────────────────────────────────┤
//! │  kcp-engine  (dependency)             │
//! │                                       │
//! │  KcpEngine   ← pure sync state machine│
//! │  protocol    ← wire types & constants │
//! └───────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use kcp_session::{KcpSession, SessionConfig, UdpTransport};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = Arc::new(UdpTransport::bind("0.0.0.0:0").await?);
//!     let peer = "127.0.0.1:9000".parse()?;
//!     let config = SessionConfig::new().fast_mode();
//!
//!     let mut session = KcpSession::connect(transport, peer, 0x1001, config).await?;
//!     session.send(Bytes::from_static(b"Hello, KCP!")).await?;
//!     let reply = session.recv().await?;
//!     println!("Received: {:?}", reply);
//!
//!     session.close().await?;
//!     Ok(())
//! }
//! ```

/// Direct access to the engine crate.
pub use kcp_engine;

pub mod config;
pub mod error;
pub mod metrics;
pub mod session;
pub mod transport;

pub use config::SessionConfig;
pub use error::{ConnectionError, Result, SessionError};
pub use kcp_engine::{KcpCoreConfig, KcpStats, NodeDelayConfig};
pub use session::{KcpSession, SessionState};
pub use transport::{Addr, Transport, UdpTransport};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
