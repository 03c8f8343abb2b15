//! Synchronous KCP protocol engine.
//!
//! The engine owns all per-connection state and is driven by four calls:
//! [`KcpEngine::input`] for inbound datagrams, [`KcpEngine::update`] on a
//! clock tick, and [`KcpEngine::send`] / [`KcpEngine::recv`] for application
//! messages. Wire packets leave through the [`Output`] capability during
//! [`KcpEngine::flush`].

use crate::config::{KcpCoreConfig, NodeDelayConfig};
use crate::error::{KcpError, KcpResult};
use crate::protocol::*;

use bytes::{Buf, Bytes, BytesMut};
use std::collections::VecDeque;
use tracing::{debug, trace, warn};

/// Sink for outbound wire packets.
///
/// `transmit` is called from inside `flush` with a packet no larger than the
/// engine MTU. It must not block; a transport that can block should queue.
pub trait Output {
    fn transmit(&mut self, packet: Bytes);
}

/// Queue packets for the caller to drain, see [`KcpEngine::drain_output`].
impl Output for Vec<Bytes> {
    fn transmit(&mut self, packet: Bytes) {
        self.push(packet);
    }
}

impl<T: Output + ?Sized> Output for &mut T {
    fn transmit(&mut self, packet: Bytes) {
        (**self).transmit(packet);
    }
}

impl<T: Output + ?Sized> Output for Box<T> {
    fn transmit(&mut self, packet: Bytes) {
        (**self).transmit(packet);
    }
}

/// Liveness of the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Alive,
    /// A segment exceeded the dead-link transmission count. Terminal.
    Dead,
}

/// RTT estimator state
#[derive(Debug)]
struct RttState {
    srtt: u32,    // Smoothed RTT
    rttval: u32,  // RTT variance
    rto: u32,     // Retransmission timeout
    min_rto: u32, // Minimum RTO
}

/// Window control state
#[derive(Debug)]
struct WindowState {
    snd: u32,      // Send window size
    rcv: u32,      // Receive window size
    rmt: u32,      // Remote window size
    cwnd: u32,     // Congestion window
    ssthresh: u32, // Slow start threshold
    incr: u32,     // Byte accumulator for congestion avoidance
}

/// Probe state for window probing
#[derive(Debug, Default)]
struct ProbeState {
    flags: u32,
    wait: u32,
    ts: Timestamp,
}

/// Coalesces encoded segments into packets of at most `mtu` bytes.
struct Outbox<O> {
    output: O,
    buffer: BytesMut,
    mtu: usize,
    packets_sent: u64,
}

impl<O: Output> Outbox<O> {
    fn new(output: O, mtu: usize) -> Self {
        Self {
            output,
            buffer: BytesMut::with_capacity(mtu),
            mtu,
            packets_sent: 0,
        }
    }

    fn push(&mut self, header: &KcpHeader, data: &[u8]) {
        if self.buffer.len() + KcpHeader::SIZE + data.len() > self.mtu {
            self.transmit();
        }
        header.encode(&mut self.buffer);
        self.buffer.extend_from_slice(data);
    }

    fn transmit(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let packet = self.buffer.split().freeze();
        self.output.transmit(packet);
        self.packets_sent += 1;
        self.buffer.reserve(self.mtu);
    }
}

/// KCP engine implementing the core protocol logic for one conversation.
pub struct KcpEngine<O: Output> {
    // Core
    conv: ConvId,
    config: KcpCoreConfig,
    mss: u32,
    state: LinkState,

    // Sequence numbers
    snd_una: SeqNum,
    snd_nxt: SeqNum,
    rcv_nxt: SeqNum,

    // Timing and window
    rtt: RttState,
    wnd: WindowState,
    probe: ProbeState,
    current: Timestamp,
    ts_flush: Timestamp,
    updated: bool,

    // Buffers
    snd_queue: VecDeque<KcpSegment>,
    snd_buf: VecDeque<KcpSegment>,
    rcv_buf: VecDeque<KcpSegment>,
    rcv_queue: VecDeque<KcpSegment>,
    ack_list: Vec<(SeqNum, Timestamp)>,

    outbox: Outbox<O>,
    stats: KcpStats,
}

impl<O: Output> KcpEngine<O> {
    /// Create a new KCP engine
    pub fn new(conv: ConvId, config: KcpCoreConfig, output: O) -> KcpResult<Self> {
        config.validate()?;

        let mss = config.mtu - constants::IKCP_OVERHEAD;
        let min_rto = config.min_rto.unwrap_or(if config.nodelay.nodelay {
            constants::IKCP_RTO_NDL
        } else {
            constants::IKCP_RTO_MIN
        });

        let mut engine = Self {
            conv,
            mss,
            state: LinkState::Alive,

            snd_una: 0,
            snd_nxt: 0,
            rcv_nxt: 0,

            rtt: RttState {
                srtt: 0,
                rttval: 0,
                rto: constants::IKCP_RTO_DEF,
                min_rto,
            },

            wnd: WindowState {
                snd: config.snd_wnd,
                rcv: config.rcv_wnd.max(constants::IKCP_WND_RCV),
                rmt: constants::IKCP_WND_RCV,
                cwnd: 1,
                ssthresh: constants::IKCP_THRESH_INIT,
                incr: mss,
            },

            probe: ProbeState::default(),
            current: 0,
            ts_flush: 0,
            updated: false,

            snd_queue: VecDeque::new(),
            snd_buf: VecDeque::new(),
            rcv_buf: VecDeque::new(),
            rcv_queue: VecDeque::new(),
            ack_list: Vec::new(),

            outbox: Outbox::new(output, config.mtu as usize),
            stats: KcpStats::default(),

            config,
        };
        engine.set_interval(engine.config.nodelay.interval);

        Ok(engine)
    }

    /// Queue an application message, splitting it into at most 255 fragments
    /// of `mss` bytes. Nothing is transmitted until the next flush.
    pub fn send(&mut self, data: Bytes) -> KcpResult<()> {
        if data.is_empty() {
            return Err(KcpError::EmptyPayload);
        }

        let mss = self.mss as usize;
        let size = data.len();
        let mut data = data;

        if self.config.stream_mode {
            // Top up the last pending segment before cutting new ones
            if let Some(last) = self.snd_queue.back_mut() {
                if last.data.len() < mss {
                    let take = (mss - last.data.len()).min(data.len());
                    let mut merged = BytesMut::with_capacity(last.data.len() + take);
                    merged.extend_from_slice(&last.data);
                    merged.extend_from_slice(&data[..take]);
                    last.data = merged.freeze();
                    last.header.len = last.data.len() as u32;
                    last.header.frg = 0;
                    data.advance(take);
                }
            }
        }

        let count = data.len().div_ceil(mss);
        if !self.config.stream_mode && count > constants::IKCP_FRG_MAX {
            return Err(KcpError::MessageTooLarge {
                size,
                fragments: count,
                limit: constants::IKCP_FRG_MAX,
            });
        }

        for i in 0..count {
            let start = i * mss;
            let end = (start + mss).min(data.len());
            let frg = if self.config.stream_mode {
                0
            } else {
                (count - i - 1) as u8
            };
            self.snd_queue
                .push_back(KcpSegment::push(self.conv, frg, data.slice(start..end)));
        }

        self.stats.bytes_sent += size as u64;

        trace!(
            conv = %self.conv,
            bytes = size,
            fragments = count,
            "Message queued for sending"
        );

        Ok(())
    }

    /// Size of the next complete message in the receive queue.
    pub fn peek_size(&self) -> KcpResult<usize> {
        let front = self.rcv_queue.front().ok_or(KcpError::RecvQueueEmpty)?;
        if front.header.frg == 0 {
            return Ok(front.data.len());
        }

        if self.rcv_queue.len() < front.header.frg as usize + 1 {
            return Err(KcpError::IncompleteMessage);
        }

        let mut length = 0;
        for segment in &self.rcv_queue {
            length += segment.data.len();
            if segment.header.frg == 0 {
                break;
            }
        }
        Ok(length)
    }

    /// Dequeue the next reassembled message.
    pub fn recv(&mut self) -> KcpResult<Bytes> {
        let size = self.peek_size()?;
        let recover = self.rcv_queue.len() >= self.wnd.rcv as usize;

        let message = if self
            .rcv_queue
            .front()
            .is_some_and(|seg| seg.header.frg == 0)
        {
            self.rcv_queue
                .pop_front()
                .map(|seg| seg.data)
                .unwrap_or_default()
        } else {
            let mut buf = BytesMut::with_capacity(size);
            while let Some(segment) = self.rcv_queue.pop_front() {
                buf.extend_from_slice(&segment.data);
                if segment.header.frg == 0 {
                    break;
                }
            }
            buf.freeze()
        };

        self.after_recv(recover, message.len());
        Ok(message)
    }

    /// Dequeue the next reassembled message into `buf`, returning its length.
    pub fn recv_into(&mut self, buf: &mut [u8]) -> KcpResult<usize> {
        let size = self.peek_size()?;
        if size > buf.len() {
            return Err(KcpError::BufferTooSmall {
                needed: size,
                available: buf.len(),
            });
        }
        let recover = self.rcv_queue.len() >= self.wnd.rcv as usize;

        let mut offset = 0;
        while let Some(segment) = self.rcv_queue.pop_front() {
            let end = offset + segment.data.len();
            buf[offset..end].copy_from_slice(&segment.data);
            offset = end;
            if segment.header.frg == 0 {
                break;
            }
        }

        self.after_recv(recover, offset);
        Ok(offset)
    }

    fn after_recv(&mut self, recover: bool, bytes: usize) {
        self.stats.bytes_received += bytes as u64;

        self.move_to_recv_queue();

        // The queue was full: tell the peer about the reopened window now
        if recover && self.rcv_queue.len() < self.wnd.rcv as usize {
            self.probe.flags |= constants::IKCP_ASK_TELL;
        }

        trace!(conv = %self.conv, bytes, "Message received");
    }

    /// Process one inbound datagram, which may hold several segments.
    ///
    /// On error the remaining segments are skipped; segments already
    /// processed keep their effect.
    pub fn input(&mut self, data: Bytes) -> KcpResult<()> {
        if data.len() < KcpHeader::SIZE {
            return Err(KcpError::PacketTooShort { len: data.len() });
        }

        self.stats.packets_received += 1;
        let original_size = data.len();
        let prev_una = self.snd_una;
        let mut buf = data;

        while buf.len() >= KcpHeader::SIZE {
            let segment = KcpSegment::decode(&mut buf)?;

            if segment.header.conv != self.conv {
                warn!(
                    conv = %self.conv,
                    packet_conv = %segment.header.conv,
                    "Conversation ID mismatch"
                );
                return Err(KcpError::ConvMismatch {
                    expected: self.conv,
                    actual: segment.header.conv,
                });
            }

            let cmd = segment.header.cmd;
            if !matches!(
                cmd,
                constants::IKCP_CMD_PUSH
                    | constants::IKCP_CMD_ACK
                    | constants::IKCP_CMD_WASK
                    | constants::IKCP_CMD_WINS
            ) {
                warn!(conv = %self.conv, cmd, "Unknown command");
                return Err(KcpError::UnknownCommand(cmd));
            }

            self.wnd.rmt = segment.header.wnd as u32;
            self.parse_una(segment.header.una);
            self.shrink_buf();

            match cmd {
                constants::IKCP_CMD_ACK => {
                    let rtt = time_diff(self.current, segment.header.ts);
                    if rtt >= 0 {
                        self.update_ack(rtt as u32);
                    }
                    self.parse_ack(segment.header.sn);
                    self.shrink_buf();
                }

                constants::IKCP_CMD_PUSH => {
                    let sn = segment.header.sn;
                    if seq_before(sn, self.rcv_nxt.wrapping_add(self.wnd.rcv)) {
                        self.ack_list.push((sn, segment.header.ts));

                        if seq_before(sn, self.rcv_nxt) {
                            self.stats.duplicates += 1;
                        } else {
                            self.parse_data(segment);
                        }
                    }
                }

                constants::IKCP_CMD_WASK => {
                    self.probe.flags |= constants::IKCP_ASK_TELL;
                }

                // WINS only carries the window, applied above
                _ => {}
            }
        }

        if seq_after(self.snd_una, prev_una) {
            self.grow_cwnd();
        }

        trace!(
            conv = %self.conv,
            size = original_size,
            snd_una = self.snd_una,
            rcv_nxt = self.rcv_nxt,
            "Packet processed"
        );

        Ok(())
    }

    /// Advance the engine clock to `current` (milliseconds) and flush when
    /// the interval has elapsed.
    pub fn update(&mut self, current: Timestamp) {
        self.current = current;

        if !self.updated {
            self.updated = true;
            self.ts_flush = current;
        }

        let mut slap = time_diff(current, self.ts_flush);
        if !(-constants::IKCP_CLOCK_DRIFT..constants::IKCP_CLOCK_DRIFT).contains(&slap) {
            self.ts_flush = current;
            slap = 0;
        }

        if slap >= 0 {
            let interval = self.config.nodelay.interval;
            self.ts_flush = self.ts_flush.wrapping_add(interval);
            if time_diff(current, self.ts_flush) >= 0 {
                self.ts_flush = current.wrapping_add(interval);
            }
            self.flush();
        }
    }

    /// When `update` should next be called, given the time `current`.
    ///
    /// Returns `current` itself if a flush or retransmission is already due.
    pub fn check(&self, current: Timestamp) -> Timestamp {
        if !self.updated {
            return current;
        }

        let mut ts_flush = self.ts_flush;
        let drift = time_diff(current, ts_flush);
        if !(-constants::IKCP_CLOCK_DRIFT..constants::IKCP_CLOCK_DRIFT).contains(&drift) {
            ts_flush = current;
        }

        if time_diff(current, ts_flush) >= 0 {
            return current;
        }

        let tm_flush = time_diff(ts_flush, current) as u32;
        let mut tm_packet = u32::MAX;

        for segment in &self.snd_buf {
            let diff = time_diff(segment.resendts, current);
            if diff <= 0 {
                return current;
            }
            tm_packet = tm_packet.min(diff as u32);
        }

        let minimal = tm_packet
            .min(tm_flush)
            .min(self.config.nodelay.interval);
        current.wrapping_add(minimal)
    }

    /// Emit pending acks, window probes, and due data segments.
    ///
    /// Does nothing until the first [`update`](Self::update).
    pub fn flush(&mut self) {
        if !self.updated {
            return;
        }

        let current = self.current;
        let wnd = self.wnd_unused();
        let una = self.rcv_nxt;

        // Acks
        let mut ctrl = KcpHeader::new(self.conv, constants::IKCP_CMD_ACK);
        ctrl.wnd = wnd;
        ctrl.una = una;
        for &(sn, ts) in &self.ack_list {
            ctrl.sn = sn;
            ctrl.ts = ts;
            self.outbox.push(&ctrl, &[]);
        }
        self.ack_list.clear();

        // Window probes
        self.schedule_probe(current);
        ctrl.sn = 0;
        ctrl.ts = current;
        if self.probe.flags & constants::IKCP_ASK_SEND != 0 {
            ctrl.cmd = constants::IKCP_CMD_WASK;
            self.outbox.push(&ctrl, &[]);
        }
        if self.probe.flags & constants::IKCP_ASK_TELL != 0 {
            ctrl.cmd = constants::IKCP_CMD_WINS;
            self.outbox.push(&ctrl, &[]);
        }
        self.probe.flags = 0;

        self.move_to_send_buf(current, wnd);

        // Data segments
        let nodelay = self.config.nodelay.nodelay;
        let resend = if self.config.nodelay.resend > 0 {
            self.config.nodelay.resend
        } else {
            u32::MAX
        };
        let rtomin = if nodelay { 0 } else { self.rtt.rto >> 3 };
        let rx_rto = self.rtt.rto;
        let fast_limit = self.config.fast_limit;
        let dead_link = self.config.dead_link;

        let mut lost = false;
        let mut change = false;
        let mut dead = false;

        for segment in self.snd_buf.iter_mut() {
            let needsend = if segment.xmit == 0 {
                segment.xmit = 1;
                segment.rto = rx_rto;
                segment.resendts = current.wrapping_add(segment.rto).wrapping_add(rtomin);
                true
            } else if time_diff(current, segment.resendts) >= 0 {
                segment.xmit += 1;
                // Additive backoff; nodelay halves the step
                let step = if nodelay { rx_rto / 2 } else { rx_rto };
                segment.rto = segment.rto.saturating_add(step).min(constants::IKCP_RTO_MAX);
                segment.resendts = current.wrapping_add(segment.rto);
                self.stats.retransmissions += 1;
                lost = true;
                true
            } else if segment.fastack >= resend
                && (segment.xmit <= fast_limit || fast_limit == 0)
            {
                segment.xmit += 1;
                segment.fastack = 0;
                segment.resendts = current.wrapping_add(segment.rto);
                self.stats.fast_retransmissions += 1;
                change = true;
                true
            } else {
                false
            };

            if needsend {
                segment.header.ts = current;
                segment.header.wnd = wnd;
                segment.header.una = una;
                self.outbox.push(&segment.header, &segment.data);

                if segment.xmit > dead_link {
                    dead = true;
                }
            }
        }

        self.outbox.transmit();
        self.stats.packets_sent = self.outbox.packets_sent;

        if dead && self.state == LinkState::Alive {
            self.state = LinkState::Dead;
            warn!(conv = %self.conv, dead_link, "Link declared dead");
        }

        if change {
            let inflight = self.snd_nxt.wrapping_sub(self.snd_una);
            self.wnd.ssthresh = (inflight / 2).max(constants::IKCP_THRESH_MIN);
            self.wnd.cwnd = self.wnd.ssthresh.saturating_add(resend);
            self.wnd.incr = self.wnd.cwnd.saturating_mul(self.mss);
            debug!(
                conv = %self.conv,
                cwnd = self.wnd.cwnd,
                ssthresh = self.wnd.ssthresh,
                "Fast retransmit"
            );
        }

        if lost {
            self.wnd.ssthresh = (self.wnd.cwnd / 2).max(constants::IKCP_THRESH_MIN);
            self.reset_cwnd();
            debug!(
                conv = %self.conv,
                ssthresh = self.wnd.ssthresh,
                rto = rx_rto,
                "Retransmission timeout"
            );
        }

        if self.wnd.cwnd < 1 {
            self.reset_cwnd();
        }
    }

    // ── Configuration ───────────────────────────────────────────────────

    /// Change the MTU. Fails if it is below 50 bytes or if an already
    /// fragmented segment would no longer fit.
    pub fn set_mtu(&mut self, mtu: u32) -> KcpResult<()> {
        if mtu < constants::IKCP_MTU_MIN || mtu > 65535 {
            return Err(KcpError::config(format!(
                "MTU must be between {} and 65535",
                constants::IKCP_MTU_MIN
            )));
        }

        let mss = mtu - constants::IKCP_OVERHEAD;
        let oversized = self
            .snd_queue
            .iter()
            .chain(self.snd_buf.iter())
            .any(|seg| seg.data.len() > mss as usize);
        if oversized {
            return Err(KcpError::config(
                "pending segments are larger than the new MTU allows",
            ));
        }

        self.config.mtu = mtu;
        self.mss = mss;
        self.outbox.mtu = mtu as usize;
        Ok(())
    }

    /// Set the flush interval, clamped to [10, 5000] ms.
    pub fn set_interval(&mut self, interval: u32) {
        self.config.nodelay.interval =
            interval.clamp(constants::IKCP_INTERVAL_MIN, constants::IKCP_INTERVAL_MAX);
    }

    /// Apply a node delay mode. No-delay lowers the minimum RTO to 30 ms
    /// (unless overridden) and softens timeout backoff.
    pub fn set_nodelay(&mut self, nodelay: NodeDelayConfig) {
        self.rtt.min_rto = self.config.min_rto.unwrap_or(if nodelay.nodelay {
            constants::IKCP_RTO_NDL
        } else {
            constants::IKCP_RTO_MIN
        });
        let interval = nodelay.interval;
        self.config.nodelay = nodelay;
        self.set_interval(interval);
    }

    /// Fast retransmit after `resend` later acks (0 disables).
    pub fn set_fast_resend(&mut self, resend: u32) {
        self.config.nodelay.resend = resend;
    }

    pub fn set_fast_limit(&mut self, limit: u32) {
        self.config.fast_limit = limit;
    }

    pub fn set_congestion_control(&mut self, enabled: bool) {
        self.config.nodelay.no_congestion_control = !enabled;
    }

    /// Set window sizes in segments; 0 leaves a side unchanged. The receive
    /// window never drops below 256 so any legal message fits the queue.
    pub fn set_window_size(&mut self, snd_wnd: u32, rcv_wnd: u32) {
        if snd_wnd > 0 {
            self.wnd.snd = snd_wnd;
            self.config.snd_wnd = snd_wnd;
        }
        if rcv_wnd > 0 {
            self.wnd.rcv = rcv_wnd.max(constants::IKCP_WND_RCV);
            self.config.rcv_wnd = self.wnd.rcv;
        }
    }

    pub fn set_dead_link(&mut self, count: u32) {
        self.config.dead_link = count.max(1);
    }

    pub fn set_min_rto(&mut self, rto: u32) {
        self.config.min_rto = Some(rto);
        self.rtt.min_rto = rto;
    }

    pub fn set_stream_mode(&mut self, enabled: bool) {
        self.config.stream_mode = enabled;
    }

    // ── Accessors ───────────────────────────────────────────────────────

    pub fn conv(&self) -> ConvId {
        self.conv
    }

    pub fn config(&self) -> &KcpCoreConfig {
        &self.config
    }

    pub fn mtu(&self) -> u32 {
        self.config.mtu
    }

    pub fn mss(&self) -> u32 {
        self.mss
    }

    pub fn interval(&self) -> u32 {
        self.config.nodelay.interval
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Check if a segment exhausted its transmissions
    pub fn is_dead(&self) -> bool {
        self.state == LinkState::Dead
    }

    /// Segments queued or in flight, for caller-side backpressure.
    pub fn wait_to_send(&self) -> usize {
        self.snd_queue.len() + self.snd_buf.len()
    }

    pub fn snd_una(&self) -> SeqNum {
        self.snd_una
    }

    pub fn snd_nxt(&self) -> SeqNum {
        self.snd_nxt
    }

    pub fn rcv_nxt(&self) -> SeqNum {
        self.rcv_nxt
    }

    pub fn cwnd(&self) -> u32 {
        self.wnd.cwnd
    }

    pub fn ssthresh(&self) -> u32 {
        self.wnd.ssthresh
    }

    pub fn rmt_wnd(&self) -> u32 {
        self.wnd.rmt
    }

    pub fn snd_wnd(&self) -> u32 {
        self.wnd.snd
    }

    pub fn rcv_wnd(&self) -> u32 {
        self.wnd.rcv
    }

    pub fn rto(&self) -> u32 {
        self.rtt.rto
    }

    pub fn srtt(&self) -> u32 {
        self.rtt.srtt
    }

    pub fn snd_queue_len(&self) -> usize {
        self.snd_queue.len()
    }

    pub fn snd_buf_len(&self) -> usize {
        self.snd_buf.len()
    }

    pub fn rcv_buf_len(&self) -> usize {
        self.rcv_buf.len()
    }

    pub fn rcv_queue_len(&self) -> usize {
        self.rcv_queue.len()
    }

    /// Segments in flight, oldest first
    pub fn in_flight(&self) -> impl Iterator<Item = &KcpSegment> {
        self.snd_buf.iter()
    }

    pub fn output(&self) -> &O {
        &self.outbox.output
    }

    pub fn output_mut(&mut self) -> &mut O {
        &mut self.outbox.output
    }

    /// Get current statistics
    pub fn stats(&self) -> KcpStats {
        KcpStats {
            rtt: self.rtt.srtt,
            rtt_var: self.rtt.rttval,
            rto: self.rtt.rto,
            snd_wnd: self.wnd.snd,
            rcv_wnd: self.wnd.rcv,
            rmt_wnd: self.wnd.rmt,
            cwnd: self.wnd.cwnd,
            ssthresh: self.wnd.ssthresh,
            snd_buf_size: self.snd_buf.len() as u32,
            rcv_buf_size: self.rcv_buf.len() as u32,
            ..self.stats
        }
    }

    // ── Private helpers ─────────────────────────────────────────────────

    fn parse_una(&mut self, una: SeqNum) {
        while self
            .snd_buf
            .front()
            .is_some_and(|seg| seq_before(seg.header.sn, una))
        {
            self.snd_buf.pop_front();
        }
    }

    fn shrink_buf(&mut self) {
        self.snd_una = match self.snd_buf.front() {
            Some(segment) => segment.header.sn,
            None => self.snd_nxt,
        };
    }

    /// Remove the acked segment; every older one was skipped by this ack.
    fn parse_ack(&mut self, sn: SeqNum) {
        if seq_before(sn, self.snd_una) || !seq_before(sn, self.snd_nxt) {
            return;
        }

        let mut acked = None;
        for (i, segment) in self.snd_buf.iter_mut().enumerate() {
            if segment.header.sn == sn {
                acked = Some(i);
                break;
            }
            if !seq_before(segment.header.sn, sn) {
                break;
            }
            segment.fastack += 1;
        }

        if let Some(i) = acked {
            self.snd_buf.remove(i);
        }
    }

    fn update_ack(&mut self, rtt: u32) {
        if self.rtt.srtt == 0 {
            self.rtt.srtt = rtt;
            self.rtt.rttval = rtt / 2;
        } else {
            let delta = rtt.abs_diff(self.rtt.srtt) as u64;
            self.rtt.rttval = ((3 * self.rtt.rttval as u64 + delta) / 4) as u32;
            self.rtt.srtt = ((7 * self.rtt.srtt as u64 + rtt as u64) / 8).max(1) as u32;
        }

        let rto = self
            .rtt
            .srtt
            .saturating_add(self.rtt.rttval.saturating_mul(4).max(1));
        self.rtt.rto = rto.max(self.rtt.min_rto).min(constants::IKCP_RTO_MAX);
    }

    fn parse_data(&mut self, newseg: KcpSegment) {
        let sn = newseg.header.sn;

        if !seq_before(sn, self.rcv_nxt.wrapping_add(self.wnd.rcv)) || seq_before(sn, self.rcv_nxt)
        {
            return;
        }

        // Most arrivals are in order, so scan from the tail
        let mut insert_pos = self.rcv_buf.len();
        let mut repeat = false;

        for (i, segment) in self.rcv_buf.iter().enumerate().rev() {
            if segment.header.sn == sn {
                repeat = true;
                break;
            }
            if seq_after(sn, segment.header.sn) {
                break;
            }
            insert_pos = i;
        }

        if repeat {
            self.stats.duplicates += 1;
        } else {
            self.rcv_buf.insert(insert_pos, newseg);
        }

        self.move_to_recv_queue();
    }

    fn move_to_recv_queue(&mut self) {
        while self.rcv_queue.len() < self.wnd.rcv as usize
            && self
                .rcv_buf
                .front()
                .is_some_and(|seg| seg.header.sn == self.rcv_nxt)
        {
            if let Some(segment) = self.rcv_buf.pop_front() {
                self.rcv_queue.push_back(segment);
                self.rcv_nxt = self.rcv_nxt.wrapping_add(1);
            }
        }
    }

    fn grow_cwnd(&mut self) {
        if self.wnd.cwnd >= self.wnd.rmt {
            return;
        }

        let mss = self.mss;
        if self.wnd.cwnd < self.wnd.ssthresh {
            self.wnd.cwnd += 1;
            self.wnd.incr = self.wnd.incr.saturating_add(mss);
        } else {
            if self.wnd.incr < mss {
                self.wnd.incr = mss;
            }
            self.wnd.incr = self
                .wnd
                .incr
                .saturating_add(mss * mss / self.wnd.incr + mss / 16);
            if (self.wnd.cwnd + 1).saturating_mul(mss) <= self.wnd.incr {
                self.wnd.cwnd += 1;
            }
        }

        if self.wnd.cwnd > self.wnd.rmt {
            self.wnd.cwnd = self.wnd.rmt;
            self.wnd.incr = self.wnd.rmt.saturating_mul(mss);
        }
    }

    fn schedule_probe(&mut self, current: Timestamp) {
        if self.wnd.rmt != 0 {
            self.probe.ts = 0;
            self.probe.wait = 0;
            return;
        }

        if self.probe.wait == 0 {
            self.probe.wait = constants::IKCP_PROBE_INIT;
            self.probe.ts = current.wrapping_add(self.probe.wait);
        } else if time_diff(current, self.probe.ts) >= 0 {
            self.probe.wait = self.probe.wait.max(constants::IKCP_PROBE_INIT);
            self.probe.wait += self.probe.wait / 2;
            self.probe.wait = self.probe.wait.min(constants::IKCP_PROBE_LIMIT);
            self.probe.ts = current.wrapping_add(self.probe.wait);
            self.probe.flags |= constants::IKCP_ASK_SEND;
            debug!(conv = %self.conv, wait = self.probe.wait, "Probing remote window");
        }
    }

    fn move_to_send_buf(&mut self, current: Timestamp, wnd: u16) {
        let mut window = self.wnd.snd.min(self.wnd.rmt);
        if !self.config.nodelay.no_congestion_control {
            window = window.min(self.wnd.cwnd);
        }

        while self.state == LinkState::Alive
            && seq_before(self.snd_nxt, self.snd_una.wrapping_add(window))
        {
            let Some(mut segment) = self.snd_queue.pop_front() else {
                break;
            };

            segment.header.conv = self.conv;
            segment.header.cmd = constants::IKCP_CMD_PUSH;
            segment.header.wnd = wnd;
            segment.header.ts = current;
            segment.header.sn = self.snd_nxt;
            segment.header.una = self.rcv_nxt;
            segment.header.len = segment.data.len() as u32;
            segment.resendts = current;
            segment.rto = self.rtt.rto;
            segment.fastack = 0;
            segment.xmit = 0;

            self.snd_buf.push_back(segment);
            self.snd_nxt = self.snd_nxt.wrapping_add(1);
        }
    }

    fn wnd_unused(&self) -> u16 {
        self.wnd
            .rcv
            .saturating_sub(self.rcv_queue.len() as u32)
            .min(u16::MAX as u32) as u16
    }

    /// Reset congestion window to initial state
    #[inline]
    fn reset_cwnd(&mut self) {
        self.wnd.cwnd = 1;
        self.wnd.incr = self.mss;
    }
}

impl KcpEngine<Vec<Bytes>> {
    /// Take every packet produced since the last call.
    pub fn drain_output(&mut self) -> Vec<Bytes> {
        std::mem::take(&mut self.outbox.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONV: ConvId = 0x1234;

    fn engine(config: KcpCoreConfig) -> KcpEngine<Vec<Bytes>> {
        KcpEngine::new(CONV, config, Vec::new()).unwrap()
    }

    fn segments(packets: &[Bytes]) -> Vec<KcpSegment> {
        let mut out = Vec::new();
        for packet in packets {
            let mut buf = packet.clone();
            while buf.len() >= KcpHeader::SIZE {
                out.push(KcpSegment::decode(&mut buf).unwrap());
            }
        }
        out
    }

    fn encode(segs: &[&KcpSegment]) -> Bytes {
        let mut buf = BytesMut::new();
        for seg in segs {
            seg.encode(&mut buf);
        }
        buf.freeze()
    }

    fn control(cmd: u8, wnd: u16) -> Bytes {
        let mut seg = KcpSegment::new(CONV, cmd, Bytes::new());
        seg.header.wnd = wnd;
        encode(&[&seg])
    }

    #[test]
    fn test_send_rejects_empty_and_oversized() {
        let mut kcp = engine(KcpCoreConfig::default());
        assert_eq!(kcp.send(Bytes::new()), Err(KcpError::EmptyPayload));

        let mss = kcp.mss() as usize;
        let too_big = Bytes::from(vec![0u8; mss * 255 + 1]);
        assert!(matches!(
            kcp.send(too_big),
            Err(KcpError::MessageTooLarge { fragments: 256, .. })
        ));
        assert_eq!(kcp.wait_to_send(), 0);

        kcp.send(Bytes::from(vec![0u8; mss * 255])).unwrap();
        assert_eq!(kcp.snd_queue_len(), 255);
    }

    #[test]
    fn test_fragment_numbers_count_down() {
        let mut kcp = engine(KcpCoreConfig::default().nodelay_config(NodeDelayConfig::custom(
            false, 10, 0, true,
        )));
        kcp.send(Bytes::from(vec![7u8; 3000])).unwrap();
        assert_eq!(kcp.snd_queue_len(), 3);

        kcp.update(0);
        let segs = segments(&kcp.drain_output());
        let frgs: Vec<u8> = segs.iter().map(|s| s.header.frg).collect();
        let sns: Vec<u32> = segs.iter().map(|s| s.header.sn).collect();
        assert_eq!(frgs, vec![2, 1, 0]);
        assert_eq!(sns, vec![0, 1, 2]);
        assert_eq!(segs[0].data.len(), 1376);
        assert_eq!(segs[2].data.len(), 3000 - 2 * 1376);
    }

    #[test]
    fn test_flush_is_noop_before_update() {
        let mut kcp = engine(KcpCoreConfig::default());
        kcp.send(Bytes::from_static(b"early")).unwrap();
        kcp.flush();
        assert!(kcp.drain_output().is_empty());
        assert_eq!(kcp.snd_buf_len(), 0);
    }

    #[test]
    fn test_recv_error_codes() {
        let config = KcpCoreConfig::default().mtu(100);
        let mut tx = engine(config.clone().nodelay_config(NodeDelayConfig::custom(
            false, 10, 0, true,
        )));
        let mut rx = engine(config);
        rx.update(0);
        assert_eq!(rx.recv(), Err(KcpError::RecvQueueEmpty));

        tx.send(Bytes::from(vec![3u8; 200])).unwrap(); // 3 fragments of 76 bytes
        tx.update(0);
        let segs = segments(&tx.drain_output());
        assert_eq!(segs.len(), 3);

        rx.input(encode(&[&segs[0], &segs[1]])).unwrap();
        assert_eq!(rx.rcv_queue_len(), 2);
        assert_eq!(rx.recv(), Err(KcpError::IncompleteMessage));

        rx.input(encode(&[&segs[2]])).unwrap();
        let mut small = [0u8; 100];
        assert_eq!(
            rx.recv_into(&mut small),
            Err(KcpError::BufferTooSmall {
                needed: 200,
                available: 100
            })
        );
        assert_eq!(rx.rcv_queue_len(), 3);

        let mut buf = [0u8; 256];
        assert_eq!(rx.recv_into(&mut buf), Ok(200));
        assert!(buf[..200].iter().all(|&b| b == 3));
        assert_eq!(rx.rcv_queue_len(), 0);
    }

    #[test]
    fn test_duplicate_push_delivered_once() {
        let mut tx = engine(KcpCoreConfig::default());
        let mut rx = engine(KcpCoreConfig::default());
        tx.send(Bytes::from_static(b"once")).unwrap();
        tx.update(0);
        let packet = tx.drain_output().remove(0);

        rx.update(0);
        rx.input(packet.clone()).unwrap();
        rx.input(packet).unwrap();

        assert_eq!(rx.rcv_queue_len(), 1);
        assert_eq!(rx.recv().unwrap(), Bytes::from_static(b"once"));
        assert_eq!(rx.recv(), Err(KcpError::RecvQueueEmpty));
        assert_eq!(rx.stats().duplicates, 1);

        // Both copies are still acknowledged
        rx.flush();
        let acks: Vec<_> = segments(&rx.drain_output())
            .into_iter()
            .filter(|s| s.is_ack())
            .collect();
        assert_eq!(acks.len(), 2);
    }

    #[test]
    fn test_out_of_order_reassembly() {
        let mut tx = engine(KcpCoreConfig::default().nodelay_config(NodeDelayConfig::custom(
            false, 10, 0, true,
        )));
        let mut rx = engine(KcpCoreConfig::default());
        for msg in [&b"one"[..], b"two", b"three"] {
            tx.send(Bytes::copy_from_slice(msg)).unwrap();
        }
        tx.update(0);
        let segs = segments(&tx.drain_output());

        rx.input(encode(&[&segs[2]])).unwrap();
        rx.input(encode(&[&segs[1]])).unwrap();
        assert_eq!(rx.rcv_buf_len(), 2);
        assert_eq!(rx.recv(), Err(KcpError::RecvQueueEmpty));

        rx.input(encode(&[&segs[0]])).unwrap();
        assert_eq!(rx.rcv_buf_len(), 0);
        assert_eq!(rx.rcv_nxt(), 3);
        assert_eq!(&rx.recv().unwrap()[..], b"one");
        assert_eq!(&rx.recv().unwrap()[..], b"two");
        assert_eq!(&rx.recv().unwrap()[..], b"three");
    }

    #[test]
    fn test_input_rejects_malformed_datagrams() {
        let mut kcp = engine(KcpCoreConfig::default());
        assert_eq!(
            kcp.input(Bytes::from_static(&[0u8; 10])),
            Err(KcpError::PacketTooShort { len: 10 })
        );

        let mut foreign = KcpSegment::new(CONV + 1, constants::IKCP_CMD_WINS, Bytes::new());
        foreign.header.wnd = 5;
        assert_eq!(
            kcp.input(encode(&[&foreign])),
            Err(KcpError::ConvMismatch {
                expected: CONV,
                actual: CONV + 1
            })
        );
        assert_eq!(kcp.rmt_wnd(), constants::IKCP_WND_RCV);
    }

    #[test]
    fn test_unknown_command_aborts_remaining_segments() {
        let mut kcp = engine(KcpCoreConfig::default());

        let mut tell = KcpSegment::new(CONV, constants::IKCP_CMD_WINS, Bytes::new());
        tell.header.wnd = 17;
        let bogus = KcpSegment::new(CONV, 99, Bytes::new());
        let mut push = KcpSegment::push(CONV, 0, Bytes::from_static(b"lost"));
        push.header.wnd = 40;

        let result = kcp.input(encode(&[&tell, &bogus, &push]));
        assert_eq!(result, Err(KcpError::UnknownCommand(99)));
        // First segment applied, the push after the error never reached reassembly
        assert_eq!(kcp.rmt_wnd(), 17);
        assert_eq!(kcp.rcv_queue_len(), 0);
        assert_eq!(kcp.rcv_nxt(), 0);
    }

    #[test]
    fn test_rtt_estimator() {
        let mut kcp = engine(KcpCoreConfig::default());
        kcp.update_ack(100);
        assert_eq!(kcp.srtt(), 100);
        assert_eq!(kcp.rtt.rttval, 50);
        assert_eq!(kcp.rto(), 300);

        kcp.update_ack(60);
        // rttval = (150 + 40) / 4, srtt = (700 + 60) / 8
        assert_eq!(kcp.rtt.rttval, 47);
        assert_eq!(kcp.srtt(), 95);
        assert_eq!(kcp.rto(), 95 + 188);

        kcp.set_min_rto(1000);
        kcp.update_ack(95);
        assert_eq!(kcp.rto(), 1000);
    }

    #[test]
    fn test_timeout_collapses_cwnd() {
        let config = KcpCoreConfig::default().window_size(64, 256);
        let mut tx = engine(config.clone());
        let mut rx = engine(config);
        let mut now = 0;

        // Grow the window with lossless traffic
        for _ in 0..40 {
            tx.send(Bytes::from(vec![1u8; 64])).unwrap();
        }
        for _ in 0..60 {
            now += 50;
            tx.update(now);
            for p in tx.drain_output() {
                rx.input(p).unwrap();
            }
            rx.update(now);
            for p in rx.drain_output() {
                tx.input(p).unwrap();
            }
            while rx.recv().is_ok() {}
        }
        assert_eq!(tx.wait_to_send(), 0);
        let grown = tx.cwnd();
        assert!(grown > 2, "cwnd should grow past the initial threshold, got {grown}");

        // Lose everything that follows
        for _ in 0..8 {
            tx.send(Bytes::from(vec![2u8; 64])).unwrap();
        }
        now += 50;
        tx.update(now);
        assert!(!tx.drain_output().is_empty());
        assert_eq!(tx.cwnd(), grown);

        now += 2000;
        tx.update(now);
        assert_eq!(tx.cwnd(), 1);
        assert_eq!(tx.ssthresh(), (grown / 2).max(constants::IKCP_THRESH_MIN));
        assert!(tx.stats().retransmissions > 0);
    }

    #[test]
    fn test_fast_retransmit() {
        let nd = NodeDelayConfig::custom(false, 10, 2, true);
        let mut tx = engine(KcpCoreConfig::default().nodelay_config(nd));
        let mut rx = engine(KcpCoreConfig::default());
        for i in 0..4u8 {
            tx.send(Bytes::from(vec![i; 5])).unwrap();
        }
        tx.update(0);
        rx.update(0);
        let segs = segments(&tx.drain_output());
        assert_eq!(segs.len(), 4);

        // sn 0 is lost, 1..3 arrive and are acked in one datagram
        rx.input(encode(&[&segs[1], &segs[2], &segs[3]])).unwrap();
        rx.flush();
        for p in rx.drain_output() {
            tx.input(p).unwrap();
        }
        assert_eq!(tx.snd_buf_len(), 1);
        assert_eq!(tx.in_flight().next().map(|s| s.fastack), Some(3));

        tx.flush();
        let resent = segments(&tx.drain_output());
        assert_eq!(resent.len(), 1);
        assert_eq!(resent[0].header.sn, 0);
        assert_eq!(tx.stats().fast_retransmissions, 1);
        assert_eq!(tx.stats().retransmissions, 0);
        // inflight 4 -> ssthresh 2, cwnd = ssthresh + resend
        assert_eq!(tx.ssthresh(), 2);
        assert_eq!(tx.cwnd(), 4);
    }

    /// Times at which a lone unacknowledged segment hits the wire.
    fn transmit_times(nodelay: bool, until: Timestamp) -> (Vec<Timestamp>, bool) {
        let nd = NodeDelayConfig::custom(nodelay, 10, 0, true);
        let mut kcp = engine(KcpCoreConfig::default().nodelay_config(nd));
        kcp.send(Bytes::from_static(b"unanswered")).unwrap();

        let mut times = Vec::new();
        let mut now = 0;
        while now <= until && !kcp.is_dead() {
            kcp.update(now);
            if !kcp.drain_output().is_empty() {
                times.push(now);
            }
            now += 10;
        }
        (times, kcp.is_dead())
    }

    #[test]
    fn test_timeout_backoff_is_additive() {
        let step = constants::IKCP_RTO_DEF;
        let (times, dead) = transmit_times(false, 60_000);
        let gaps: Vec<u32> = times.windows(2).map(|w| w[1] - w[0]).collect();
        assert!(gaps.len() >= 10, "{gaps:?}");
        for pair in gaps[1..].windows(2) {
            assert_eq!(pair[1] - pair[0], step, "gaps must grow linearly: {gaps:?}");
        }
        // Default dead-link count is reached well within a minute
        assert!(dead);
        assert_eq!(times.len() as u32, constants::IKCP_DEADLINK + 1);

        let (times, _) = transmit_times(true, 10_000);
        let gaps: Vec<u32> = times.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(&gaps[..4], &[step, step + step / 2, step * 2, step * 2 + step / 2]);
    }

    #[test]
    fn test_sequence_numbers_wrap() {
        let nd = NodeDelayConfig::custom(false, 40, 0, true);
        let mut tx = engine(KcpCoreConfig::default().nodelay_config(nd));
        let mut rx = engine(KcpCoreConfig::default());
        let start = u32::MAX - 2;
        tx.snd_una = start;
        tx.snd_nxt = start;
        rx.rcv_nxt = start;

        // The clock wraps too
        let t0: Timestamp = u32::MAX - 10;
        let payload: Vec<u8> = (0..6000).map(|i| (i % 251) as u8).collect();
        tx.send(Bytes::from(payload.clone())).unwrap();
        tx.update(t0);
        rx.update(t0);

        let segs = segments(&tx.drain_output());
        let sns: Vec<u32> = segs.iter().map(|s| s.header.sn).collect();
        assert_eq!(sns, vec![u32::MAX - 2, u32::MAX - 1, u32::MAX, 0, 1]);

        // Deliver newest first so reassembly has to order across zero
        for seg in segs.iter().rev() {
            rx.input(encode(&[seg])).unwrap();
            if seg.header.sn != start {
                assert_eq!(rx.peek_size(), Err(KcpError::RecvQueueEmpty));
            }
        }
        assert_eq!(rx.rcv_buf_len(), 0);
        assert_eq!(rx.rcv_nxt(), 2);
        assert_eq!(&rx.recv().unwrap()[..], &payload[..]);

        rx.flush();
        let acks = segments(&rx.drain_output());
        assert_eq!(acks.len(), 5);
        assert!(acks.iter().all(|a| a.is_ack() && a.header.una == 2));

        let t1 = t0.wrapping_add(30);
        tx.update(t1);
        for p in acks.iter().map(|a| encode(&[a])) {
            tx.input(p).unwrap();
        }
        assert_eq!(tx.snd_una(), 2);
        assert_eq!(tx.snd_nxt(), 2);
        assert_eq!(tx.snd_buf_len(), 0);
        assert_eq!(tx.srtt(), 30);
        assert_eq!(tx.check(t1), t0.wrapping_add(40));
    }

    #[test]
    fn test_dead_link_stops_admission() {
        let nd = NodeDelayConfig::custom(false, 10, 0, true);
        let mut kcp = engine(KcpCoreConfig::default().nodelay_config(nd).dead_link(3));
        kcp.send(Bytes::from_static(b"doomed")).unwrap();

        let mut now = 0;
        kcp.update(now);
        for _ in 0..10 {
            now += 5000;
            kcp.update(now);
            if kcp.is_dead() {
                break;
            }
        }
        assert!(kcp.is_dead());
        assert_eq!(kcp.in_flight().next().map(|s| s.xmit), Some(4));
        kcp.drain_output();

        let snd_nxt = kcp.snd_nxt();
        kcp.send(Bytes::from_static(b"never")).unwrap();
        kcp.update(now + 100);
        assert_eq!(kcp.snd_nxt(), snd_nxt);
        assert_eq!(kcp.snd_queue_len(), 1);
        assert_eq!(kcp.state(), LinkState::Dead);
    }

    #[test]
    fn test_window_probe_backoff() {
        let mut kcp = engine(KcpCoreConfig::default());
        kcp.set_interval(100);
        kcp.update(0);
        kcp.input(control(constants::IKCP_CMD_WINS, 0)).unwrap();
        assert_eq!(kcp.rmt_wnd(), 0);

        let mut asks = Vec::new();
        let mut now = 0;
        while now < 400_000 {
            now += 100;
            kcp.update(now);
            let sent = segments(&kcp.drain_output());
            if sent.iter().any(|s| s.header.cmd == constants::IKCP_CMD_WASK) {
                asks.push(now);
            }
        }

        assert!(asks.len() >= 5);
        assert_eq!(asks[0], 7100);
        let gaps: Vec<u32> = asks.windows(2).map(|w| w[1] - w[0]).collect();
        for pair in gaps.windows(2) {
            assert!(
                pair[1] > pair[0] || pair[1] >= constants::IKCP_PROBE_LIMIT,
                "probe gaps must grow: {gaps:?}"
            );
        }
        assert!(gaps.iter().all(|&g| g <= constants::IKCP_PROBE_LIMIT + 100));
    }

    #[test]
    fn test_window_ask_answered_with_tell() {
        let mut kcp = engine(KcpCoreConfig::default());
        kcp.update(0);
        kcp.input(control(constants::IKCP_CMD_WASK, 32)).unwrap();
        kcp.flush();

        let sent = segments(&kcp.drain_output());
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].header.cmd, constants::IKCP_CMD_WINS);
        assert_eq!(sent[0].header.wnd as u32, kcp.rcv_wnd());

        kcp.flush();
        assert!(kcp.drain_output().is_empty());
    }

    #[test]
    fn test_check_schedule() {
        let mut kcp = engine(KcpCoreConfig::default());
        assert_eq!(kcp.check(500), 500);

        kcp.update(1000);
        let next = kcp.check(1000);
        assert!(next > 1000 && next <= 1000 + kcp.interval());
        assert_eq!(kcp.check(1000 + kcp.interval()), 1000 + kcp.interval());

        kcp.send(Bytes::from_static(b"x")).unwrap();
        kcp.update(1040);
        let resendts = kcp.in_flight().next().map(|s| s.resendts).unwrap();
        assert_eq!(kcp.check(resendts), resendts);
        // Long silence: schedule is reset instead of firing a burst
        assert_eq!(kcp.check(1040 + 60_000), 1040 + 60_000);
    }

    #[test]
    fn test_update_resets_schedule_after_clock_jump() {
        let mut kcp = engine(KcpCoreConfig::default());
        kcp.update(0);
        kcp.update(50_000);
        let next = kcp.check(50_000);
        assert_eq!(next, 50_000 + kcp.interval());
    }

    #[test]
    fn test_stream_mode_coalesces_writes() {
        let config = KcpCoreConfig::default().stream_mode(true);
        let mut tx = engine(config.clone());
        let mut rx = engine(config);
        tx.send(Bytes::from_static(b"abc")).unwrap();
        tx.send(Bytes::from_static(b"def")).unwrap();
        assert_eq!(tx.snd_queue_len(), 1);

        tx.update(0);
        for p in tx.drain_output() {
            rx.input(p).unwrap();
        }
        assert_eq!(&rx.recv().unwrap()[..], b"abcdef");
    }

    #[test]
    fn test_set_mtu() {
        let mut kcp = engine(KcpCoreConfig::default());
        assert!(kcp.set_mtu(49).is_err());
        assert!(kcp.set_mtu(24).is_err());
        kcp.send(Bytes::from(vec![0u8; 1000])).unwrap();
        assert!(kcp.set_mtu(500).is_err());
        assert_eq!(kcp.mtu(), 1400);
        kcp.set_mtu(1200).unwrap();
        assert_eq!(kcp.mss(), 1176);
    }

    #[test]
    fn test_setters_clamp() {
        let mut kcp = engine(KcpCoreConfig::default());
        kcp.set_interval(1);
        assert_eq!(kcp.interval(), 10);
        kcp.set_interval(99_999);
        assert_eq!(kcp.interval(), 5000);

        kcp.set_window_size(0, 16);
        assert_eq!(kcp.snd_wnd(), constants::IKCP_WND_SND);
        assert_eq!(kcp.rcv_wnd(), constants::IKCP_WND_RCV);

        kcp.set_nodelay(NodeDelayConfig::fast());
        assert_eq!(kcp.rtt.min_rto, constants::IKCP_RTO_NDL);
        kcp.set_nodelay(NodeDelayConfig::normal());
        assert_eq!(kcp.rtt.min_rto, constants::IKCP_RTO_MIN);
    }

    #[test]
    fn test_receive_window_recovery_arms_tell() {
        let mut kcp = engine(KcpCoreConfig::default());
        kcp.update(0);
        for sn in 0..kcp.rcv_wnd() {
            let mut seg = KcpSegment::push(CONV, 0, Bytes::from_static(b"z"));
            seg.header.sn = sn;
            seg.header.wnd = 32;
            kcp.input(encode(&[&seg])).unwrap();
        }
        assert_eq!(kcp.rcv_queue_len() as u32, kcp.rcv_wnd());
        kcp.flush();
        let full = segments(&kcp.drain_output());
        assert!(full.iter().all(|s| s.is_ack()));
        assert_eq!(full.last().map(|s| s.header.wnd), Some(0));

        kcp.recv().unwrap();
        kcp.flush();
        let sent = segments(&kcp.drain_output());
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].header.cmd, constants::IKCP_CMD_WINS);
        assert_eq!(sent[0].header.wnd, 1);
    }
}
