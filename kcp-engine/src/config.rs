//! Configuration types for the KCP engine

use crate::error::{KcpError, KcpResult};
use crate::protocol::constants;

/// Node delay configuration for different performance modes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDelayConfig {
    /// Enable no-delay mode (lower minimum RTO, gentler backoff)
    pub nodelay: bool,
    /// Internal update interval in milliseconds, clamped to [10, 5000]
    pub interval: u32,
    /// Fast resend threshold (0 disables fast retransmit)
    pub resend: u32,
    /// Disable congestion control
    pub no_congestion_control: bool,
}

impl NodeDelayConfig {
    /// Normal mode - balanced performance and reliability
    pub fn normal() -> Self {
        Self {
            nodelay: false,
            interval: 40,
            resend: 0,
            no_congestion_control: false,
        }
    }

    /// Fast mode - optimized for low latency
    pub fn fast() -> Self {
        Self {
            nodelay: true,
            interval: 20,
            resend: 2,
            no_congestion_control: false,
        }
    }

    /// Turbo mode - maximum performance, minimum latency
    pub fn turbo() -> Self {
        Self {
            nodelay: true,
            interval: 10,
            resend: 2,
            no_congestion_control: true,
        }
    }

    /// Gaming mode - tightest retransmission for real-time game traffic
    pub fn gaming() -> Self {
        Self {
            nodelay: true,
            interval: 10,
            resend: 1,
            no_congestion_control: true,
        }
    }

    /// Custom configuration
    pub fn custom(nodelay: bool, interval: u32, resend: u32, no_congestion_control: bool) -> Self {
        Self {
            nodelay,
            interval,
            resend,
            no_congestion_control,
        }
    }
}

impl Default for NodeDelayConfig {
    fn default() -> Self {
        Self::normal()
    }
}

/// Protocol configuration for a [`KcpEngine`](crate::KcpEngine).
///
/// Every field can also be changed on a live engine through its setters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KcpCoreConfig {
    /// Maximum transmission unit, header included
    pub mtu: u32,
    /// Send window size in segments
    pub snd_wnd: u32,
    /// Receive window size in segments (raised to at least 256)
    pub rcv_wnd: u32,
    /// Node delay configuration
    pub nodelay: NodeDelayConfig,
    /// Transmissions of one segment after which the link is declared dead
    pub dead_link: u32,
    /// Fast retransmissions allowed per segment (0 = unlimited)
    pub fast_limit: u32,
    /// Override of the minimum RTO derived from `nodelay`
    pub min_rto: Option<u32>,
    /// Enable stream mode (no message boundaries)
    pub stream_mode: bool,
}

impl Default for KcpCoreConfig {
    fn default() -> Self {
        Self {
            mtu: constants::IKCP_MTU_DEF,
            snd_wnd: constants::IKCP_WND_SND,
            rcv_wnd: constants::IKCP_WND_RCV,
            nodelay: NodeDelayConfig::normal(),
            dead_link: constants::IKCP_DEADLINK,
            fast_limit: constants::IKCP_FASTACK_LIMIT,
            min_rto: None,
            stream_mode: false,
        }
    }
}

impl KcpCoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mtu(mut self, mtu: u32) -> Self {
        self.mtu = mtu;
        self
    }

    pub fn send_window(mut self, wnd: u32) -> Self {
        self.snd_wnd = wnd;
        self
    }

    pub fn recv_window(mut self, wnd: u32) -> Self {
        self.rcv_wnd = wnd;
        self
    }

    pub fn window_size(mut self, snd_wnd: u32, rcv_wnd: u32) -> Self {
        self.snd_wnd = snd_wnd;
        self.rcv_wnd = rcv_wnd;
        self
    }

    pub fn normal_mode(mut self) -> Self {
        self.nodelay = NodeDelayConfig::normal();
        self
    }

    pub fn fast_mode(mut self) -> Self {
        self.nodelay = NodeDelayConfig::fast();
        self
    }

    pub fn turbo_mode(mut self) -> Self {
        self.nodelay = NodeDelayConfig::turbo();
        self
    }

    pub fn nodelay_config(mut self, config: NodeDelayConfig) -> Self {
        self.nodelay = config;
        self
    }

    pub fn dead_link(mut self, count: u32) -> Self {
        self.dead_link = count;
        self
    }

    pub fn fast_limit(mut self, limit: u32) -> Self {
        self.fast_limit = limit;
        self
    }

    pub fn min_rto(mut self, rto: u32) -> Self {
        self.min_rto = Some(rto);
        self
    }

    pub fn stream_mode(mut self, enabled: bool) -> Self {
        self.stream_mode = enabled;
        self
    }

    /// Preset for game servers: gaming node delay, small MTU
    pub fn gaming() -> Self {
        Self::default()
            .nodelay_config(NodeDelayConfig::gaming())
            .window_size(128, 256)
            .mtu(1200)
    }

    /// Preset for bulk transfers
    pub fn file_transfer() -> Self {
        Self::default()
            .normal_mode()
            .window_size(256, 256)
            .stream_mode(true)
    }

    /// Validate configuration
    pub fn validate(&self) -> KcpResult<()> {
        if self.mtu < constants::IKCP_MTU_MIN || self.mtu > 65535 {
            return Err(KcpError::config(format!(
                "MTU must be between {} and 65535",
                constants::IKCP_MTU_MIN
            )));
        }
        if self.snd_wnd == 0 || self.rcv_wnd == 0 {
            return Err(KcpError::config("Window sizes must be greater than 0"));
        }
        if self.nodelay.interval == 0 {
            return Err(KcpError::config("Update interval must be greater than 0"));
        }
        if self.dead_link == 0 {
            return Err(KcpError::config("Dead link threshold must be greater than 0"));
        }
        Ok(())
    }
}
