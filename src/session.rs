//! One bound transceiver session to an SMSC.
//!
//! A session owns a TCP connection and three concerns on top of it:
//!
//! * a read loop that answers unsolicited PDUs (deliver_sm, enquire_link,
//!   unbind) and routes responses to their waiters by sequence number;
//! * a liveness loop that probes the peer with enquire_link and declares the
//!   connection dead after two consecutive missed responses;
//! * a supervisor that performs the bind handshake and, on any fault, tears
//!   the connection down, fails all pending waiters with `ConnectionLost`,
//!   waits `bind_interval` and binds again.
//!
//! Outbound requests allocate a monotonic sequence number (1-based, wrapping
//! before 0xFFFFFFFF), register a oneshot waiter and serialize their write
//! through a single lock. Submissions additionally take a token from the
//! rate limiter; enquire_link is exempt.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use tokio::time::{interval, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::codec::Frame;
use crate::connection::{FrameReader, FrameWriter};
use crate::datatypes::{
    BindTransceiver, DeliverSmResponse, EnquireLink, EnquireLinkResponse, QuerySm,
    QuerySmResponse, SubmitSm, SubmitSmResponse, Unbind, UnbindResponse,
};
use crate::error::Error;

/// Consecutive enquire_link misses that count as a dead connection.
const LIVENESS_MISS_LIMIT: u32 = 2;

/// Best-effort window for the unbind_resp during graceful close.
const UNBIND_TIMEOUT: Duration = Duration::from_secs(2);

/// Connection lifecycle events, observable by the owner of the receiver
/// returned from [`Session::bind`].
#[derive(Clone, Debug, PartialEq)]
pub enum ConnStatus {
    Connecting,
    Connected,
    Disconnected,
    BindFailed(String),
}

/// Session lifecycle. Transitions are one-way except the rebind path, which
/// re-enters Connecting from Disconnected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Disconnected = 0,
    Connecting = 1,
    Bound = 2,
    Closing = 3,
    Closed = 4,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => SessionState::Connecting,
            2 => SessionState::Bound,
            3 => SessionState::Closing,
            4 => SessionState::Closed,
            _ => SessionState::Disconnected,
        }
    }
}

/// Handler invoked on the read-loop task for unsolicited request PDUs after
/// the wire-level response has been written. Must not block: long work
/// belongs on another task.
pub type PduHandler = Arc<dyn Fn(Frame) + Send + Sync>;

/// Everything a session needs to reach and authenticate with the SMSC.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub id: String,
    /// host:port of the SMSC (conventionally port 2775).
    pub addr: String,
    pub system_id: String,
    pub password: String,
    pub system_type: String,
    pub addr_ton: u8,
    pub addr_npi: u8,
    pub address_range: String,

    /// Bound on connection establishment.
    pub read_timeout: Duration,
    /// Bound on individual socket writes.
    pub write_timeout: Duration,
    /// Interval between liveness probes.
    pub enquire_interval: Duration,
    /// How long each probe may wait for its response.
    pub enquire_timeout: Duration,
    /// How long a request waiter may wait for its response.
    pub resp_timeout: Duration,
    /// Pause between rebind attempts.
    pub bind_interval: Duration,
    /// Submissions per second through the rate limiter.
    pub throttle: u32,
    /// Whether the supervisor reconnects after a fault.
    pub auto_rebind: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            addr: String::new(),
            system_id: String::new(),
            password: String::new(),
            system_type: String::new(),
            addr_ton: 0,
            addr_npi: 0,
            address_range: String::new(),
            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
            enquire_interval: Duration::from_secs(10),
            enquire_timeout: Duration::from_secs(10),
            resp_timeout: Duration::from_secs(15 * 60),
            bind_interval: Duration::from_secs(10),
            throttle: 100,
            auto_rebind: true,
        }
    }
}

/// A transceiver session. Create with [`Session::bind`]; submit with
/// [`Session::submit`]; stop with [`Session::close`].
pub struct Session {
    config: SessionConfig,
    state: AtomicU8,
    seq: AtomicU32,
    concat_ref: AtomicU8,
    pending: StdMutex<HashMap<u32, oneshot::Sender<Frame>>>,
    writer: AsyncMutex<Option<FrameWriter>>,
    limiter: RateLimiter,
    events: mpsc::UnboundedSender<ConnStatus>,
    handler: PduHandler,
    shutdown: CancellationToken,
    last_read: StdMutex<Instant>,
    last_write: StdMutex<Instant>,
}

impl Session {
    /// Spawn a session supervisor that connects and binds to the SMSC,
    /// rebinding on faults until [`Session::close`] is called. Lifecycle
    /// events stream through the returned receiver.
    pub fn bind(
        config: SessionConfig,
        handler: PduHandler,
    ) -> (Arc<Session>, mpsc::UnboundedReceiver<ConnStatus>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let limiter = RateLimiter::new(config.throttle.max(1), 1);

        let session = Arc::new(Session {
            state: AtomicU8::new(SessionState::Disconnected as u8),
            seq: AtomicU32::new(0),
            concat_ref: AtomicU8::new(0),
            pending: StdMutex::new(HashMap::new()),
            writer: AsyncMutex::new(None),
            limiter,
            events: events_tx,
            handler,
            shutdown: CancellationToken::new(),
            last_read: StdMutex::new(Instant::now()),
            last_write: StdMutex::new(Instant::now()),
            config,
        });

        tokio::spawn(Arc::clone(&session).supervise());
        (session, events_rx)
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Instant of the most recent inbound PDU.
    pub fn last_read_at(&self) -> Instant {
        *lock(&self.last_read)
    }

    /// Instant of the most recent outbound write.
    pub fn last_write_at(&self) -> Instant {
        *lock(&self.last_write)
    }

    /// Next 8-bit concatenation reference for a segmented message on this
    /// session. Wraps; uniqueness only matters across concurrent messages.
    pub fn next_concat_ref(&self) -> u8 {
        self.concat_ref.fetch_add(1, Ordering::Relaxed)
    }

    /// Submit one submit_sm and await its response. A non-OK response
    /// status is returned as a normal response: protocol NAKs are per-part
    /// outcomes, not session failures.
    pub async fn submit(&self, pdu: SubmitSm) -> Result<SubmitSmResponse, Error> {
        if self.state() != SessionState::Bound {
            return Err(Error::InvalidState(format!(
                "session {} is {:?}, not bound",
                self.config.id,
                self.state()
            )));
        }

        self.limiter.acquire().await;
        match self
            .request(Frame::SubmitSm(Box::new(pdu)), self.config.resp_timeout)
            .await?
        {
            Frame::SubmitSmResp(resp) => Ok(resp),
            other => Err(Error::UnexpectedPdu {
                expected: "submit_sm_resp",
                actual: other.command_id(),
            }),
        }
    }

    /// Query the SMSC-side state of a previously submitted message.
    pub async fn query(&self, message_id: &str, source_addr: &str) -> Result<QuerySmResponse, Error> {
        if self.state() != SessionState::Bound {
            return Err(Error::InvalidState(format!(
                "session {} is {:?}, not bound",
                self.config.id,
                self.state()
            )));
        }

        match self
            .request(
                Frame::QuerySm(QuerySm::new(0, message_id, source_addr)),
                self.config.resp_timeout,
            )
            .await?
        {
            Frame::QuerySmResp(resp) => Ok(resp),
            other => Err(Error::UnexpectedPdu {
                expected: "query_sm_resp",
                actual: other.command_id(),
            }),
        }
    }

    /// Graceful close: best-effort unbind handshake, then tear everything
    /// down. The supervisor exits and the session ends in `Closed`.
    pub async fn close(&self) {
        if self.state() == SessionState::Bound {
            self.set_state(SessionState::Closing);
            match self
                .request(Frame::Unbind(Unbind::new(0)), UNBIND_TIMEOUT)
                .await
            {
                Ok(_) => debug!(session = %self.config.id, "unbind acknowledged"),
                Err(e) => debug!(session = %self.config.id, "unbind not acknowledged: {e}"),
            }
        }
        self.shutdown.cancel();
    }

    /// Tear the session down without the unbind handshake. Used on drop
    /// paths where nothing can await.
    pub fn abort(&self) {
        self.shutdown.cancel();
    }

    // ---- outbound path ----

    /// Allocate the next sequence number: starts at 1, skips 0 and
    /// 0xFFFFFFFF, and never hands out a number that still has a pending
    /// waiter.
    fn next_seq(&self) -> u32 {
        loop {
            let candidate = self.seq.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
            if candidate == 0 || candidate == u32::MAX {
                continue;
            }
            if !lock(&self.pending).contains_key(&candidate) {
                return candidate;
            }
        }
    }

    /// Send a request frame and await the response with the same sequence
    /// number.
    async fn request(&self, mut frame: Frame, wait: Duration) -> Result<Frame, Error> {
        let seq = self.next_seq();
        frame.set_sequence_number(seq);

        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(seq, tx);

        if let Err(e) = self.write_frame(&frame).await {
            lock(&self.pending).remove(&seq);
            return Err(e);
        }

        match timeout(wait, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(Error::ConnectionLost),
            Err(_) => {
                lock(&self.pending).remove(&seq);
                Err(Error::ResponseTimeout)
            }
        }
    }

    async fn write_frame(&self, frame: &Frame) -> Result<(), Error> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(Error::ConnectionLost)?;

        match timeout(self.config.write_timeout, writer.write_frame(frame)).await {
            Ok(Ok(())) => {
                *lock(&self.last_write) = Instant::now();
                Ok(())
            }
            Ok(Err(e)) => Err(Error::Connection(e)),
            Err(_) => Err(Error::Connection(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "write timed out",
            ))),
        }
    }

    // ---- connection lifecycle ----

    async fn supervise(self: Arc<Self>) {
        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            self.set_state(SessionState::Connecting);
            self.emit(ConnStatus::Connecting);

            match self.establish().await {
                Ok(reader) => {
                    self.set_state(SessionState::Bound);
                    self.emit(ConnStatus::Connected);

                    let conn = self.shutdown.child_token();
                    let read_task =
                        tokio::spawn(Arc::clone(&self).read_loop(reader, conn.clone()));

                    self.liveness_loop(&conn).await;

                    conn.cancel();
                    let _ = read_task.await;

                    *self.writer.lock().await = None;
                    self.fail_pending();
                    if !self.shutdown.is_cancelled() {
                        self.set_state(SessionState::Disconnected);
                        self.emit(ConnStatus::Disconnected);
                    }
                }
                Err(e) => {
                    warn!(session = %self.config.id, addr = %self.config.addr, "bind attempt failed: {e}");
                    *self.writer.lock().await = None;
                    self.emit(ConnStatus::BindFailed(e.to_string()));
                }
            }

            if self.shutdown.is_cancelled() || !self.config.auto_rebind {
                break;
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.bind_interval) => {}
            }
        }

        self.set_state(SessionState::Closed);
        debug!(session = %self.config.id, "supervisor exited");
    }

    /// Open the TCP connection and run the bind handshake. The handshake is
    /// driven inline on the fresh reader, before the read loop exists.
    async fn establish(&self) -> Result<FrameReader, Error> {
        debug!(session = %self.config.id, addr = %self.config.addr, "connecting");

        let stream = timeout(self.config.read_timeout, TcpStream::connect(&self.config.addr))
            .await
            .map_err(|_| {
                Error::Connection(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "connect timed out",
                ))
            })??;

        let (read_half, write_half) = stream.into_split();
        let mut reader = FrameReader::new(read_half);
        *self.writer.lock().await = Some(FrameWriter::new(write_half));

        let seq = self.next_seq();
        let mut bind = BindTransceiver::new(
            seq,
            &self.config.system_id,
            &self.config.password,
            &self.config.system_type,
        );
        bind.addr_ton = self.config.addr_ton;
        bind.addr_npi = self.config.addr_npi;
        bind.address_range = self.config.address_range.clone();
        self.write_frame(&Frame::BindTransceiver(bind)).await?;

        let resp = timeout(self.config.resp_timeout, async {
            loop {
                match reader.read_frame().await? {
                    Some(Frame::BindTransceiverResp(resp)) if resp.sequence_number == seq => {
                        return Ok::<_, Error>(resp);
                    }
                    Some(other) => {
                        trace!(session = %self.config.id, "ignoring {:?} during bind", other.command_id());
                    }
                    None => return Err(Error::ConnectionLost),
                }
            }
        })
        .await
        .map_err(|_| Error::ResponseTimeout)??;

        if !resp.command_status.is_ok() {
            return Err(Error::BindFailed(resp.command_status));
        }

        info!(
            session = %self.config.id,
            smsc = %resp.system_id,
            "bound transceiver to {}",
            self.config.addr
        );
        Ok(reader)
    }

    async fn read_loop(self: Arc<Self>, mut reader: FrameReader, conn: CancellationToken) {
        loop {
            tokio::select! {
                _ = conn.cancelled() => break,
                result = reader.read_frame() => match result {
                    Ok(Some(frame)) => match self.dispatch(frame).await {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(e) => {
                            warn!(session = %self.config.id, "dispatch error: {e}");
                            break;
                        }
                    },
                    Ok(None) => {
                        debug!(session = %self.config.id, "peer closed the connection");
                        break;
                    }
                    Err(e) => {
                        warn!(session = %self.config.id, "framing error, closing: {e}");
                        break;
                    }
                }
            }
        }
        conn.cancel();
    }

    /// Route one inbound frame. Responses go to their waiter; unsolicited
    /// requests get their wire response here and deliver_sm additionally
    /// reaches the PDU handler. Returns false when the connection should
    /// close.
    async fn dispatch(&self, frame: Frame) -> Result<bool, Error> {
        *lock(&self.last_read) = Instant::now();

        if frame.is_response() {
            let seq = frame.sequence_number();
            match lock(&self.pending).remove(&seq) {
                Some(waiter) => {
                    let _ = waiter.send(frame);
                }
                None => trace!(session = %self.config.id, seq, "response without waiter, dropping"),
            }
            return Ok(true);
        }

        match frame {
            Frame::EnquireLink(pdu) => {
                self.write_frame(&Frame::EnquireLinkResp(EnquireLinkResponse::new(
                    pdu.sequence_number,
                )))
                .await?;
            }
            Frame::Unbind(pdu) => {
                info!(session = %self.config.id, "peer requested unbind");
                self.write_frame(&Frame::UnbindResp(UnbindResponse::new(pdu.sequence_number)))
                    .await?;
                self.set_state(SessionState::Closing);
                return Ok(false);
            }
            Frame::DeliverSm(pdu) => {
                let seq = pdu.sequence_number;
                self.write_frame(&Frame::DeliverSmResp(DeliverSmResponse::new(seq)))
                    .await?;
                (self.handler)(Frame::DeliverSm(pdu));
            }
            other => {
                debug!(
                    session = %self.config.id,
                    "ignoring unsolicited {:?}",
                    other.command_id()
                );
            }
        }
        Ok(true)
    }

    /// Probe the peer every `enquire_interval`. Two consecutive misses end
    /// the connection; the supervisor rebinds.
    async fn liveness_loop(&self, conn: &CancellationToken) {
        let mut misses = 0u32;
        let mut ticker = interval(self.config.enquire_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // first tick fires immediately

        loop {
            tokio::select! {
                _ = conn.cancelled() => return,
                _ = self.shutdown.cancelled() => return,
                _ = ticker.tick() => {
                    let probe = self.request(
                        Frame::EnquireLink(EnquireLink::new(0)),
                        self.config.enquire_timeout,
                    );
                    tokio::select! {
                        _ = conn.cancelled() => return,
                        result = probe => match result {
                            Ok(_) => {
                                misses = 0;
                                trace!(session = %self.config.id, "enquire_link ok");
                            }
                            Err(e) => {
                                misses += 1;
                                warn!(
                                    session = %self.config.id,
                                    misses, "enquire_link miss: {e}"
                                );
                                if misses >= LIVENESS_MISS_LIMIT {
                                    error!(session = %self.config.id, "liveness lost, closing connection");
                                    return;
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    fn fail_pending(&self) {
        let waiters: Vec<_> = lock(&self.pending).drain().collect();
        if !waiters.is_empty() {
            debug!(
                session = %self.config.id,
                count = waiters.len(),
                "failing pending waiters after disconnect"
            );
        }
        // dropping the senders resolves every waiter with ConnectionLost
    }

    fn set_state(&self, next: SessionState) {
        let prev = self.state.swap(next as u8, Ordering::AcqRel);
        if prev != next as u8 {
            debug!(
                session = %self.config.id,
                "state {:?} -> {:?}",
                SessionState::from_u8(prev),
                next
            );
        }
    }

    fn emit(&self, status: ConnStatus) {
        let _ = self.events.send(status);
    }
}

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Token bucket: `rate` tokens per second, capacity `burst`. `acquire`
/// suspends until a token is available.
pub struct RateLimiter {
    rate: f64,
    burst: f64,
    state: AsyncMutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    refilled: Instant,
}

impl RateLimiter {
    pub fn new(rate: u32, burst: u32) -> Self {
        Self {
            rate: rate as f64,
            burst: burst as f64,
            state: AsyncMutex::new(BucketState {
                tokens: burst as f64,
                refilled: Instant::now(),
            }),
        }
    }

    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.state.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(bucket.refilled).as_secs_f64();
                bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.burst);
                bucket.refilled = now;

                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return;
                }
                Duration::from_secs_f64((1.0 - bucket.tokens) / self.rate)
            };
            tokio::time::sleep(wait).await;
        }
    }
}
