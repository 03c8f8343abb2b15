//! Configuration types for KCP sessions.
//!
//! [`SessionConfig`] wraps the engine's [`KcpCoreConfig`] with the settings
//! of the async driver (channel capacities, datagram buffer, close linger).

use crate::error::{Result, SessionError};
use std::time::Duration;

pub use kcp_engine::{KcpCoreConfig, NodeDelayConfig};

/// Full session configuration: protocol settings plus runtime settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Protocol settings handed to the engine
    pub kcp: KcpCoreConfig,

    /// Flush right after `send` instead of waiting for the next tick
    pub flush_on_send: bool,
    /// Pending handle commands
    pub command_capacity: usize,
    /// Datagrams read from the transport but not yet fed to the engine
    pub input_capacity: usize,
    /// Reassembled messages not yet taken by `recv`
    pub recv_capacity: usize,
    /// Receive buffer size for one datagram
    pub max_datagram: usize,
    /// How long `close` keeps retransmitting unacknowledged data
    pub close_linger: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            kcp: KcpCoreConfig::default(),
            flush_on_send: true,
            command_capacity: 64,
            input_capacity: 1024,
            recv_capacity: 256,
            max_datagram: 65536,
            close_linger: Duration::from_secs(5),
        }
    }
}

impl From<KcpCoreConfig> for SessionConfig {
    fn from(kcp: KcpCoreConfig) -> Self {
        Self {
            kcp,
            ..Self::default()
        }
    }
}

// ── Builder methods ─────────────────────────────────────────────────────

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    // -- Protocol tuning --

    pub fn kcp(mut self, kcp: KcpCoreConfig) -> Self {
        self.kcp = kcp;
        self
    }

    pub fn mtu(mut self, mtu: u32) -> Self {
        self.kcp.mtu = mtu;
        self
    }

    pub fn window_size(mut self, snd_wnd: u32, rcv_wnd: u32) -> Self {
        self.kcp = self.kcp.window_size(snd_wnd, rcv_wnd);
        self
    }

    pub fn fast_mode(mut self) -> Self {
        self.kcp = self.kcp.fast_mode();
        self
    }

    pub fn turbo_mode(mut self) -> Self {
        self.kcp = self.kcp.turbo_mode();
        self
    }

    pub fn nodelay_config(mut self, config: NodeDelayConfig) -> Self {
        self.kcp = self.kcp.nodelay_config(config);
        self
    }

    pub fn dead_link(mut self, count: u32) -> Self {
        self.kcp = self.kcp.dead_link(count);
        self
    }

    pub fn stream_mode(mut self, enabled: bool) -> Self {
        self.kcp = self.kcp.stream_mode(enabled);
        self
    }

    // -- Runtime tuning --

    pub fn flush_on_send(mut self, enabled: bool) -> Self {
        self.flush_on_send = enabled;
        self
    }

    pub fn recv_capacity(mut self, capacity: usize) -> Self {
        self.recv_capacity = capacity;
        self
    }

    pub fn input_capacity(mut self, capacity: usize) -> Self {
        self.input_capacity = capacity;
        self
    }

    pub fn max_datagram(mut self, size: usize) -> Self {
        self.max_datagram = size;
        self
    }

    pub fn close_linger(mut self, linger: Duration) -> Self {
        self.close_linger = linger;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.kcp.validate()?;
        if self.command_capacity == 0 || self.input_capacity == 0 || self.recv_capacity == 0 {
            return Err(SessionError::config("Channel capacities must be greater than 0"));
        }
        if self.max_datagram < self.kcp.mtu as usize {
            return Err(SessionError::config(format!(
                "Datagram buffer ({} bytes) is smaller than the MTU ({} bytes)",
                self.max_datagram, self.kcp.mtu
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.flush_on_send);
        assert_eq!(config.kcp, KcpCoreConfig::default());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(SessionConfig::new().recv_capacity(0).validate().is_err());
        assert!(SessionConfig::new().max_datagram(512).validate().is_err());
        assert!(SessionConfig::new()
            .mtu(512)
            .max_datagram(512)
            .validate()
            .is_ok());

        let err = SessionConfig::new().mtu(10).validate().unwrap_err();
        assert!(matches!(err, SessionError::Engine(_)));
    }

    #[test]
    fn test_builder_forwards_protocol_settings() {
        let config = SessionConfig::new().turbo_mode().window_size(128, 512).dead_link(8);
        assert!(config.kcp.nodelay.no_congestion_control);
        assert_eq!((config.kcp.snd_wnd, config.kcp.rcv_wnd), (128, 512));
        assert_eq!(config.kcp.dead_link, 8);
    }
}
