//! Synchronous KCP ARQ engine.
//!
//! KCP turns an unreliable datagram channel into a reliable, ordered
//! message channel. This crate holds the protocol state machine only: it
//! performs no I/O and reads no clock. The caller feeds inbound datagrams to
//! [`KcpEngine::input`], ticks [`KcpEngine::update`] with a millisecond
//! timestamp, and collects outbound packets through an [`Output`].
//!
//! ```text
//! ┌────────────────────────────────┐
//! │  kcp-engine                    │
//! │                                │
//! │  protocol  ← wire format       │
//! │  config    ← tuning presets    │
//! │  error     ← KcpError          │
//! │  engine    ← state machine     │
//! └────────────────────────────────┘
//! ```
//!
//! ```
//! use bytes::Bytes;
//! use kcp_engine::{KcpCoreConfig, KcpEngine};
//!
//! let mut a = KcpEngine::new(7, KcpCoreConfig::default(), Vec::new()).unwrap();
//! let mut b = KcpEngine::new(7, KcpCoreConfig::default(), Vec::new()).unwrap();
//!
//! a.send(Bytes::from_static(b"ping")).unwrap();
//! a.update(0);
//! for packet in a.drain_output() {
//!     b.input(packet).unwrap();
//! }
//! assert_eq!(&b.recv().unwrap()[..], b"ping");
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod protocol;

pub use config::{KcpCoreConfig, NodeDelayConfig};
pub use engine::{KcpEngine, LinkState, Output};
pub use error::{KcpError, KcpResult};
pub use protocol::*;
