//! KCP wire types, constants, and sequence arithmetic.
//!
//! Every segment starts with a fixed 24-byte big-endian header:
//!
//! ```text
//! 0      4     5     6      8      12     16     20     24
//! +------+-----+-----+------+------+------+------+------+---------+
//! | conv | cmd | frg | wnd  |  ts  |  sn  | una  | len  | payload |
//! +------+-----+-----+------+------+------+------+------+---------+
//! ```

use crate::error::{KcpError, KcpResult};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// KCP protocol constants
pub mod constants {
    pub const IKCP_RTO_NDL: u32 = 30; // no delay min rto
    pub const IKCP_RTO_MIN: u32 = 100; // normal min rto
    pub const IKCP_RTO_DEF: u32 = 200; // default rto
    pub const IKCP_RTO_MAX: u32 = 60000; // max rto
    pub const IKCP_CMD_PUSH: u8 = 81; // cmd: push data
    pub const IKCP_CMD_ACK: u8 = 82; // cmd: ack
    pub const IKCP_CMD_WASK: u8 = 83; // cmd: window probe (ask)
    pub const IKCP_CMD_WINS: u8 = 84; // cmd: window size (tell)
    pub const IKCP_ASK_SEND: u32 = 1; // need to send IKCP_CMD_WASK
    pub const IKCP_ASK_TELL: u32 = 2; // need to send IKCP_CMD_WINS
    pub const IKCP_WND_SND: u32 = 32; // default send window
    pub const IKCP_WND_RCV: u32 = 256; // default (and minimum) receive window
    pub const IKCP_MTU_DEF: u32 = 1400; // default mtu
    pub const IKCP_MTU_MIN: u32 = 50; // smallest accepted mtu
    pub const IKCP_FRG_MAX: usize = 255; // fragments per message
    pub const IKCP_INTERVAL_MIN: u32 = 10;
    pub const IKCP_INTERVAL_MAX: u32 = 5000;
    pub const IKCP_OVERHEAD: u32 = 24; // kcp header overhead
    pub const IKCP_DEADLINK: u32 = 20; // max dead link count
    pub const IKCP_THRESH_INIT: u32 = 2; // initial slow start threshold
    pub const IKCP_THRESH_MIN: u32 = 2; // min slow start threshold
    pub const IKCP_PROBE_INIT: u32 = 7000; // 7 secs to probe window size
    pub const IKCP_PROBE_LIMIT: u32 = 120000; // up to 120 secs to probe window
    pub const IKCP_FASTACK_LIMIT: u32 = 5; // max times to trigger fastack
    pub const IKCP_CLOCK_DRIFT: i32 = 10000; // flush schedule reset bound
}

/// Conversation ID type
pub type ConvId = u32;

/// Sequence number type
pub type SeqNum = u32;

/// Timestamp type (milliseconds, wrapping)
pub type Timestamp = u32;

/// KCP segment header structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KcpHeader {
    pub conv: ConvId,
    pub cmd: u8,
    pub frg: u8,
    pub wnd: u16,
    pub ts: Timestamp,
    pub sn: SeqNum,
    pub una: SeqNum,
    pub len: u32,
}

impl KcpHeader {
    /// Size of KCP header in bytes
    pub const SIZE: usize = constants::IKCP_OVERHEAD as usize;

    /// Create a new header with all counters zeroed
    pub fn new(conv: ConvId, cmd: u8) -> Self {
        Self {
            conv,
            cmd,
            frg: 0,
            wnd: 0,
            ts: 0,
            sn: 0,
            una: 0,
            len: 0,
        }
    }

    /// Encode header into buffer
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.conv);
        buf.put_u8(self.cmd);
        buf.put_u8(self.frg);
        buf.put_u16(self.wnd);
        buf.put_u32(self.ts);
        buf.put_u32(self.sn);
        buf.put_u32(self.una);
        buf.put_u32(self.len);
    }

    /// Decode a header from the front of `buf`, advancing it by [`Self::SIZE`].
    pub fn decode(buf: &mut Bytes) -> KcpResult<Self> {
        if buf.len() < Self::SIZE {
            return Err(KcpError::PacketTooShort { len: buf.len() });
        }

        Ok(Self {
            conv: buf.get_u32(),
            cmd: buf.get_u8(),
            frg: buf.get_u8(),
            wnd: buf.get_u16(),
            ts: buf.get_u32(),
            sn: buf.get_u32(),
            una: buf.get_u32(),
            len: buf.get_u32(),
        })
    }
}

/// KCP segment containing header and data
#[derive(Debug, Clone)]
pub struct KcpSegment {
    pub header: KcpHeader,
    pub data: Bytes,

    // Sender bookkeeping, never on the wire
    pub resendts: Timestamp,
    pub rto: u32,
    pub fastack: u32,
    pub xmit: u32,
}

impl KcpSegment {
    /// Create a new segment
    pub fn new(conv: ConvId, cmd: u8, data: Bytes) -> Self {
        let mut header = KcpHeader::new(conv, cmd);
        header.len = data.len() as u32;

        Self {
            header,
            data,
            resendts: 0,
            rto: 0,
            fastack: 0,
            xmit: 0,
        }
    }

    /// Create a PUSH fragment; `sn` is assigned later, on admission.
    pub fn push(conv: ConvId, frg: u8, data: Bytes) -> Self {
        let mut seg = Self::new(conv, constants::IKCP_CMD_PUSH, data);
        seg.header.frg = frg;
        seg
    }

    /// Create ACK segment
    pub fn ack(conv: ConvId, sn: SeqNum, ts: Timestamp) -> Self {
        let mut seg = Self::new(conv, constants::IKCP_CMD_ACK, Bytes::new());
        seg.header.sn = sn;
        seg.header.ts = ts;
        seg
    }

    /// Encode segment into buffer
    pub fn encode(&self, buf: &mut BytesMut) {
        debug_assert_eq!(self.header.len as usize, self.data.len());
        self.header.encode(buf);
        buf.extend_from_slice(&self.data);
    }

    /// Decode one segment from the front of `buf`.
    ///
    /// The payload is a zero-copy slice; `buf` is left pointing at the next
    /// coalesced segment, if any.
    pub fn decode(buf: &mut Bytes) -> KcpResult<Self> {
        let header = KcpHeader::decode(buf)?;

        if header.len as usize > buf.len() {
            return Err(KcpError::LengthOverflow {
                declared: header.len,
                remaining: buf.len(),
            });
        }

        let data = buf.split_to(header.len as usize);
        Ok(Self::from_parts(header, data))
    }

    fn from_parts(header: KcpHeader, data: Bytes) -> Self {
        Self {
            header,
            data,
            resendts: 0,
            rto: 0,
            fastack: 0,
            xmit: 0,
        }
    }

    /// Check if this is a data segment
    pub fn is_data(&self) -> bool {
        self.header.cmd == constants::IKCP_CMD_PUSH
    }

    /// Check if this is an ACK segment
    pub fn is_ack(&self) -> bool {
        self.header.cmd == constants::IKCP_CMD_ACK
    }
}

/// Read the conversation ID of the first segment in a datagram without
/// decoding it. Owners use this to route datagrams to engines.
pub fn peek_conv(datagram: &[u8]) -> Option<ConvId> {
    if datagram.len() < KcpHeader::SIZE {
        return None;
    }
    let mut head = &datagram[..4];
    Some(head.get_u32())
}

/// Snapshot of per-connection counters
#[derive(Debug, Default, Clone, Copy)]
pub struct KcpStats {
    /// Application bytes accepted by `send`
    pub bytes_sent: u64,
    /// Application bytes delivered by `recv`
    pub bytes_received: u64,
    /// Datagrams handed to the output
    pub packets_sent: u64,
    /// Datagrams fed to `input`
    pub packets_received: u64,
    /// Timeout retransmissions
    pub retransmissions: u64,
    /// Fast retransmissions
    pub fast_retransmissions: u64,
    /// PUSH segments dropped as already received
    pub duplicates: u64,
    /// Smoothed RTT in milliseconds
    pub rtt: u32,
    /// RTT variance
    pub rtt_var: u32,
    /// Current RTO
    pub rto: u32,
    /// Send window size
    pub snd_wnd: u32,
    /// Receive window size
    pub rcv_wnd: u32,
    /// Last window advertised by the peer
    pub rmt_wnd: u32,
    /// Congestion window size
    pub cwnd: u32,
    /// Slow start threshold
    pub ssthresh: u32,
    /// Segments in flight
    pub snd_buf_size: u32,
    /// Out-of-order segments held for reassembly
    pub rcv_buf_size: u32,
}

/// Calculate time difference handling wrapping
#[inline]
pub fn time_diff(later: Timestamp, earlier: Timestamp) -> i32 {
    later.wrapping_sub(earlier) as i32
}

/// Check if a sequence number is before another (handling wrapping)
#[inline]
pub fn seq_before(seq1: SeqNum, seq2: SeqNum) -> bool {
    (seq1.wrapping_sub(seq2) as i32) < 0
}

/// Check if a sequence number is after another (handling wrapping)
#[inline]
pub fn seq_after(seq1: SeqNum, seq2: SeqNum) -> bool {
    (seq1.wrapping_sub(seq2) as i32) > 0
}
