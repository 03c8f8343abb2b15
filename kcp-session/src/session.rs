//! One KCP conversation driven by tokio.
//!
//! A session owns two tasks. The receive task reads datagrams from the
//! transport and forwards those belonging to this peer and conversation. The
//! actor task owns the [`KcpEngine`] and is the only code touching it: it
//! sleeps until [`KcpEngine::check`] says work is due, runs `update`, ships
//! output, and hands reassembled messages to the application. The
//! [`KcpSession`] handle talks to the actor over channels.

use crate::config::SessionConfig;
use crate::error::{ConnectionError, Result, SessionError};
use crate::metrics::global_metrics;
use crate::transport::Transport;

use bytes::Bytes;
use kcp_engine::{peek_conv, ConvId, KcpEngine, KcpStats, Timestamp};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

/// Lifecycle of a session as seen by its handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    /// `close` was requested; unacknowledged data is still being sent
    Closing,
    Closed,
    /// The dead-link check fired
    Lost,
}

/// Commands sent to the session actor.
enum SessionCmd {
    Send {
        data: Bytes,
        reply: oneshot::Sender<Result<()>>,
    },
    Stats {
        reply: oneshot::Sender<KcpStats>,
    },
    WaitToSend {
        reply: oneshot::Sender<usize>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a running KCP session.
///
/// Dropping the handle stops the session without waiting for unacknowledged
/// data; use [`close`](Self::close) for a graceful shutdown.
pub struct KcpSession<T: Transport> {
    conv: ConvId,
    peer: T::Addr,
    transport: Arc<T>,
    cmd_tx: mpsc::Sender<SessionCmd>,
    data_rx: mpsc::Receiver<Bytes>,
    state_rx: watch::Receiver<SessionState>,
    actor: Option<JoinHandle<()>>,
}

impl<T: Transport> KcpSession<T> {
    /// Start a session with a known peer.
    ///
    /// KCP has no handshake: the session is usable immediately and the peer
    /// learns about it from the first segment.
    pub async fn connect(
        transport: Arc<T>,
        peer: T::Addr,
        conv: ConvId,
        config: SessionConfig,
    ) -> Result<Self> {
        Self::start(transport, peer, conv, config, None)
    }

    /// Wait for the first datagram carrying `conv` and start a session with
    /// its sender. Datagrams for other conversations are discarded.
    pub async fn accept(transport: Arc<T>, conv: ConvId, config: SessionConfig) -> Result<Self> {
        config.validate()?;

        let mut buf = vec![0u8; config.max_datagram];
        loop {
            let (n, from) = match transport.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) if is_transient(&e) => continue,
                Err(e) => return Err(e.into()),
            };

            if peek_conv(&buf[..n]) == Some(conv) {
                info!(conv = %conv, peer = %from, "Accepted KCP session");
                let first = Bytes::copy_from_slice(&buf[..n]);
                return Self::start(transport, from, conv, config, Some(first));
            }
            trace!(peer = %from, len = n, "Ignoring datagram for another conversation");
        }
    }

    fn start(
        transport: Arc<T>,
        peer: T::Addr,
        conv: ConvId,
        config: SessionConfig,
        first: Option<Bytes>,
    ) -> Result<Self> {
        config.validate()?;
        let engine = KcpEngine::new(conv, config.kcp.clone(), Vec::new())?;

        let (cmd_tx, cmd_rx) = mpsc::channel(config.command_capacity);
        let (input_tx, input_rx) = mpsc::channel(config.input_capacity);
        let (data_tx, data_rx) = mpsc::channel(config.recv_capacity);
        let (state_tx, state_rx) = watch::channel(SessionState::Connected);

        let receiver = tokio::spawn(recv_loop(
            transport.clone(),
            peer.clone(),
            conv,
            config.max_datagram,
            input_tx,
        ));

        let actor = SessionActor {
            engine,
            cmd_rx,
            input_rx,
            state_tx,
            transport: transport.clone(),
            peer: peer.clone(),
            clock: SessionClock::new(),
            flush_on_send: config.flush_on_send,
            close_linger: config.close_linger,
        };
        let actor = tokio::spawn(actor.run(first, receiver, data_tx));

        global_metrics().session_opened();
        debug!(conv = %conv, peer = %peer, "KCP session started");

        Ok(Self {
            conv,
            peer,
            transport,
            cmd_tx,
            data_rx,
            state_rx,
            actor: Some(actor),
        })
    }

    /// Queue a message for reliable delivery.
    pub async fn send(&self, data: Bytes) -> Result<()> {
        self.request(|reply| SessionCmd::Send { data, reply })
            .await?
    }

    /// Wait for the next message from the peer.
    ///
    /// Messages already received are still returned after the session ends;
    /// then the error tells whether it was closed or lost.
    pub async fn recv(&mut self) -> Result<Bytes> {
        match self.data_rx.recv().await {
            Some(message) => Ok(message),
            None => Err(self.terminal_error()),
        }
    }

    pub async fn stats(&self) -> Result<KcpStats> {
        self.request(|reply| SessionCmd::Stats { reply }).await
    }

    /// Segments queued or in flight
    pub async fn wait_to_send(&self) -> Result<usize> {
        self.request(|reply| SessionCmd::WaitToSend { reply })
            .await
    }

    /// Flush, then keep retransmitting until everything is acknowledged or
    /// the configured linger expires.
    ///
    /// Messages that arrived before the close can still be taken with
    /// [`recv`](Self::recv) afterwards.
    pub async fn close(&mut self) -> Result<()> {
        // The actor may already be gone; the final state decides the result
        let _ = self.request(|reply| SessionCmd::Close { reply }).await;
        if let Some(actor) = self.actor.take() {
            let _ = actor.await;
        }

        match self.state() {
            SessionState::Lost => Err(SessionError::connection(ConnectionError::Lost)),
            _ => Ok(()),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    pub fn is_alive(&self) -> bool {
        matches!(
            self.state(),
            SessionState::Connected | SessionState::Closing
        )
    }

    pub fn conv(&self) -> ConvId {
        self.conv
    }

    pub fn peer_addr(&self) -> &T::Addr {
        &self.peer
    }

    pub fn local_addr(&self) -> Result<T::Addr> {
        Ok(self.transport.local_addr()?)
    }

    /// Send a command and wait for the reply. Fails with the session's
    /// terminal error if the actor has exited.
    async fn request<R>(&self, cmd: impl FnOnce(oneshot::Sender<R>) -> SessionCmd) -> Result<R> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(cmd(reply))
            .await
            .map_err(|_| self.terminal_error())?;
        rx.await.map_err(|_| self.terminal_error())
    }

    fn terminal_error(&self) -> SessionError {
        match self.state() {
            SessionState::Lost => SessionError::connection(ConnectionError::Lost),
            _ => SessionError::connection(ConnectionError::Closed),
        }
    }
}

/// Millisecond clock for the engine, counted from session start.
struct SessionClock {
    epoch: Instant,
}

impl SessionClock {
    fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    fn now(&self) -> Timestamp {
        self.epoch.elapsed().as_millis() as Timestamp
    }
}

struct SessionActor<T: Transport> {
    engine: KcpEngine<Vec<Bytes>>,
    cmd_rx: mpsc::Receiver<SessionCmd>,
    input_rx: mpsc::Receiver<Bytes>,
    state_tx: watch::Sender<SessionState>,
    transport: Arc<T>,
    peer: T::Addr,
    clock: SessionClock,
    flush_on_send: bool,
    close_linger: Duration,
}

impl<T: Transport> SessionActor<T> {
    /// Drive the engine until the link dies, the handle goes away or a
    /// requested close completes.
    ///
    /// `data_tx` lives outside `self`: a delivery permit borrows it while the
    /// other select arms need `&mut self`.
    async fn run(
        mut self,
        first: Option<Bytes>,
        receiver: JoinHandle<()>,
        data_tx: mpsc::Sender<Bytes>,
    ) {
        let conv = self.engine.conv();

        self.engine.update(self.clock.now());
        if let Some(packet) = first {
            self.input(packet);
        }
        self.flush_output().await;

        let mut linger_until: Option<Instant> = None;
        let mut close_replies = Vec::new();

        let end = loop {
            if self.engine.is_dead() {
                break SessionState::Lost;
            }
            if let Some(deadline) = linger_until {
                if self.engine.wait_to_send() == 0 || Instant::now() >= deadline {
                    break SessionState::Closed;
                }
            }

            let current = self.clock.now();
            let due = self.engine.check(current);
            let wake = Instant::now() + Duration::from_millis(due.wrapping_sub(current) as u64);
            let deliverable = self.engine.peek_size().is_ok();

            tokio::select! {
                biased;

                // Timer first so a busy link cannot starve retransmission
                _ = tokio::time::sleep_until(wake) => {
                    self.engine.update(self.clock.now());
                    self.flush_output().await;
                }

                cmd = self.cmd_rx.recv() => match cmd {
                    Some(SessionCmd::Send { data, reply }) => {
                        let result = self.engine.send(data).map_err(SessionError::from);
                        if result.is_ok() && self.flush_on_send {
                            self.engine.flush();
                            self.flush_output().await;
                        }
                        let _ = reply.send(result);
                    }
                    Some(SessionCmd::Stats { reply }) => {
                        let _ = reply.send(self.engine.stats());
                    }
                    Some(SessionCmd::WaitToSend { reply }) => {
                        let _ = reply.send(self.engine.wait_to_send());
                    }
                    Some(SessionCmd::Close { reply }) => {
                        debug!(conv = %conv, pending = self.engine.wait_to_send(), "Closing KCP session");
                        self.engine.flush();
                        self.flush_output().await;
                        close_replies.push(reply);
                        linger_until.get_or_insert(Instant::now() + self.close_linger);
                        self.state_tx.send_replace(SessionState::Closing);
                    }
                    // Handle dropped
                    None => break SessionState::Closed,
                },

                packet = self.input_rx.recv() => match packet {
                    Some(packet) => self.input(packet),
                    None => {
                        warn!(conv = %conv, "Transport receive loop ended");
                        break SessionState::Closed;
                    }
                },

                permit = data_tx.reserve(), if deliverable => match permit {
                    Ok(permit) => {
                        if let Ok(message) = self.engine.recv() {
                            permit.send(message);
                        }
                    }
                    Err(_) => break SessionState::Closed,
                },
            }
        };

        receiver.abort();

        let stats = self.engine.stats();
        match end {
            SessionState::Lost => warn!(
                conv = %conv,
                retransmissions = stats.retransmissions,
                "KCP session lost: dead link"
            ),
            _ => info!(
                conv = %conv,
                bytes_sent = stats.bytes_sent,
                bytes_received = stats.bytes_received,
                "KCP session closed"
            ),
        }

        self.state_tx.send_replace(end);
        global_metrics().session_closed(&stats, end == SessionState::Lost);
        for reply in close_replies {
            let _ = reply.send(());
        }
    }

    fn input(&mut self, packet: Bytes) {
        if let Err(e) = self.engine.input(packet) {
            debug!(conv = %self.engine.conv(), error = %e, "Dropped malformed datagram");
        }
    }

    /// Send all buffered output packets over the transport.
    async fn flush_output(&mut self) {
        for packet in self.engine.drain_output() {
            if let Err(e) = self.transport.send_to(&packet, &self.peer).await {
                trace!(error = %e, "Transport send_to failed");
            }
        }
    }
}

/// Read datagrams from the transport and forward the ones for this session.
async fn recv_loop<T: Transport>(
    transport: Arc<T>,
    peer: T::Addr,
    conv: ConvId,
    max_datagram: usize,
    input_tx: mpsc::Sender<Bytes>,
) {
    let mut buf = vec![0u8; max_datagram];
    loop {
        let (n, from) = match transport.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) if is_transient(&e) => {
                trace!(error = %e, "Transient receive error");
                continue;
            }
            Err(e) => {
                warn!(error = %e, "Transport receive failed");
                break;
            }
        };

        if from != peer || peek_conv(&buf[..n]) != Some(conv) {
            trace!(peer = %from, len = n, "Ignoring foreign datagram");
            continue;
        }

        if input_tx
            .send(Bytes::copy_from_slice(&buf[..n]))
            .await
            .is_err()
        {
            break;
        }
    }
}

/// ICMP errors surfaced by some platforms on a UDP receive
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}
