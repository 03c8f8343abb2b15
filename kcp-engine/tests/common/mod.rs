//! Shared test helpers for engine integration tests

#![allow(dead_code)]

use bytes::{Bytes, BytesMut};
use kcp_engine::{KcpCoreConfig, KcpEngine, KcpHeader, KcpSegment};

pub type TestEngine = KcpEngine<Vec<Bytes>>;

pub fn engine(conv: u32, config: KcpCoreConfig) -> TestEngine {
    KcpEngine::new(conv, config, Vec::new()).unwrap()
}

/// Send all output packets from one engine into another engine's input.
pub fn transfer(src: &mut TestEngine, dst: &mut TestEngine) {
    for packet in src.drain_output() {
        let _ = dst.input(packet);
    }
}

/// Split datagrams back into their coalesced segments.
pub fn segments(packets: &[Bytes]) -> Vec<KcpSegment> {
    let mut out = Vec::new();
    for packet in packets {
        let mut buf = packet.clone();
        while buf.len() >= KcpHeader::SIZE {
            out.push(KcpSegment::decode(&mut buf).unwrap());
        }
    }
    out
}

pub fn encode(segments: &[KcpSegment]) -> Bytes {
    let mut buf = BytesMut::new();
    for seg in segments {
        seg.encode(&mut buf);
    }
    buf.freeze()
}

/// Drain every deliverable message.
pub fn drain_recv(engine: &mut TestEngine) -> Vec<Bytes> {
    let mut messages = Vec::new();
    while let Ok(msg) = engine.recv() {
        messages.push(msg);
    }
    messages
}

/// Lossless bidirectional rounds at a fixed clock step. Returns the clock.
pub fn run_rounds(
    a: &mut TestEngine,
    b: &mut TestEngine,
    mut now: u32,
    step: u32,
    rounds: usize,
) -> u32 {
    for _ in 0..rounds {
        now += step;
        a.update(now);
        transfer(a, b);
        b.update(now);
        transfer(b, a);
    }
    now
}
