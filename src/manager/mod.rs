//! The manager: a pool of transceiver sessions, a load balancer in front of
//! them, and the accounting that turns submit responses and delivery
//! receipts back into logical message state.
//!
//! ```no_run
//! use smpp_esme::{Auth, DeliverySetting, Manager, OutboundMessage, Settings};
//!
//! #[tokio::main]
//! async fn main() -> smpp_esme::Result<()> {
//!     let manager = Manager::new(Settings {
//!         url: "localhost:2775".into(),
//!         auth: Auth {
//!             system_id: "esme01".into(),
//!             password: "secret".into(),
//!             ..Auth::default()
//!         },
//!         register: DeliverySetting::Final,
//!         on_message_report: Some(std::sync::Arc::new(|_, message, parts| {
//!             println!("{} -> {:?} ({} parts)", message.id, message.status(), parts.len());
//!         })),
//!         ..Settings::default()
//!     })?;
//!
//!     manager.start().await?;
//!     manager
//!         .send(OutboundMessage::new("Acme", "+15551234", "hello"))
//!         .await?;
//!     manager.wait().await;
//!     Ok(())
//! }
//! ```

mod message;

pub use message::{Message, MessageStatus, OutboundMessage, Part, PartStatus};

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, RwLock as StdRwLock};
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::balancer::{Balancer, RoundRobin};
use crate::codec::Frame;
use crate::datatypes::{DeliverSm, SubmitSm, ESM_CLASS_UDHI};
use crate::error::Error;
use crate::session::{ConnStatus, PduHandler, Session, SessionConfig};
use crate::text;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_THROTTLE: u32 = 100;

/// Depth of the report dispatch queue. Overflow drops the oldest job so a
/// slow callback can delay reports but never block the read loops.
const REPORT_QUEUE_DEPTH: usize = 64;

/// Report callback: fires once after submission and once on the terminal
/// transition. Runs on a dispatch worker, not the session read loop; keep it
/// brief and spawn tasks for anything heavy.
pub type ReportCallback = Arc<dyn Fn(Manager, Arc<Message>, Vec<Arc<Part>>) + Send + Sync>;

/// Low-level PDU hook replacing the default deliver_sm handling. A custom
/// hook that still wants part accounting must call
/// [`Manager::apply_delivery_receipt`] itself, otherwise messages never
/// reach a terminal state.
pub type PduCallback = Arc<dyn Fn(Manager, Frame) + Send + Sync>;

/// SMSC credentials.
#[derive(Clone, Debug, Default)]
pub struct Auth {
    pub system_id: String,
    pub password: String,
    pub system_type: String,
}

/// registered_delivery request flag.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeliverySetting {
    /// No receipt requested.
    #[default]
    None,
    /// Receipt on final outcome, success or failure.
    Final,
    /// Receipt only when delivery failed.
    FailureOnly,
    /// Intermediate notifications as the message progresses.
    Intermediate,
}

impl DeliverySetting {
    pub fn registered_delivery(&self) -> u8 {
        match self {
            DeliverySetting::None => 0x00,
            DeliverySetting::Final => 0x01,
            DeliverySetting::FailureOnly => 0x02,
            DeliverySetting::Intermediate => 0x10,
        }
    }
}

/// Manager configuration. Zero durations and counts fall back to their
/// defaults at construction, so `..Settings::default()` composes well.
pub struct Settings {
    /// Operator-facing identity.
    pub name: String,
    pub slug: String,
    /// Stable id; generated when empty.
    pub id: String,

    /// host:port of the SMSC. Required.
    pub url: String,
    pub auth: Auth,

    /// Bound on connection establishment (10s).
    pub read_timeout: Duration,
    /// Bound on socket writes (10s).
    pub write_timeout: Duration,
    /// Liveness probe interval (10s).
    pub enquiry_interval: Duration,
    /// Liveness probe response window (10s).
    pub enquiry_timeout: Duration,
    /// Pause between rebind attempts after a fault (10s).
    pub bind_interval: Duration,

    /// Upper bound on concurrent sessions (1).
    pub max_connection: usize,
    /// Bind all `max_connection` sessions at start instead of one.
    pub use_all_connection: bool,
    /// Submissions per second per session (100).
    pub throttle: u32,
    /// Session selection policy (round-robin).
    pub balancer: Option<Box<dyn Balancer>>,
    /// Reconnect after transport or liveness faults (enabled by default
    /// through `Settings::default`).
    pub auto_rebind: bool,

    /// Message validity window; rendered as an SMPP relative time.
    pub validity: Option<Duration>,
    /// Delivery-receipt request flag.
    pub register: DeliverySetting,

    // submit_sm defaults
    pub service_type: String,
    pub esm_class: u8,
    pub protocol_id: u8,
    pub priority_flag: u8,
    pub schedule_delivery_time: String,
    pub replace_if_present_flag: u8,

    pub on_message_report: Option<ReportCallback>,
    pub handle_pdu: Option<PduCallback>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            name: String::new(),
            slug: String::new(),
            id: String::new(),
            url: String::new(),
            auth: Auth::default(),
            read_timeout: Duration::ZERO,
            write_timeout: Duration::ZERO,
            enquiry_interval: Duration::ZERO,
            enquiry_timeout: Duration::ZERO,
            bind_interval: Duration::ZERO,
            max_connection: 0,
            use_all_connection: false,
            throttle: 0,
            balancer: None,
            auto_rebind: true,
            validity: None,
            register: DeliverySetting::None,
            service_type: String::new(),
            esm_class: 0,
            protocol_id: 0,
            priority_flag: 0,
            schedule_delivery_time: String::new(),
            replace_if_present_flag: 0,
            on_message_report: None,
            handle_pdu: None,
        }
    }
}

impl Settings {
    fn normalized(mut self) -> Self {
        if self.max_connection == 0 {
            self.max_connection = 1;
        }
        if self.read_timeout.is_zero() {
            self.read_timeout = DEFAULT_TIMEOUT;
        }
        if self.write_timeout.is_zero() {
            self.write_timeout = DEFAULT_TIMEOUT;
        }
        if self.enquiry_interval.is_zero() {
            self.enquiry_interval = DEFAULT_TIMEOUT;
        }
        if self.enquiry_timeout.is_zero() {
            self.enquiry_timeout = DEFAULT_TIMEOUT;
        }
        if self.bind_interval.is_zero() {
            self.bind_interval = DEFAULT_TIMEOUT;
        }
        if self.throttle == 0 {
            self.throttle = DEFAULT_THROTTLE;
        }
        self
    }
}

struct ReportJob {
    message: Arc<Message>,
    parts: Vec<Arc<Part>>,
}

#[derive(Default)]
struct ReportQueue {
    jobs: StdMutex<VecDeque<ReportJob>>,
    notify: Notify,
}

impl ReportQueue {
    fn push(&self, job: ReportJob) {
        {
            let mut jobs = lock(&self.jobs);
            if jobs.len() >= REPORT_QUEUE_DEPTH {
                jobs.pop_front();
                warn!("report queue full, dropping oldest report");
            }
            jobs.push_back(job);
        }
        self.notify.notify_one();
    }

    fn pop(&self) -> Option<ReportJob> {
        lock(&self.jobs).pop_front()
    }
}

struct ManagerInner {
    name: String,
    slug: String,
    id: String,
    settings: Settings,
    auto_rebind: bool,

    balancer: Box<dyn Balancer>,
    sessions: DashMap<String, Arc<Session>>,
    session_ids: StdRwLock<Vec<String>>,

    messages: DashMap<String, Arc<Message>>,
    /// network message id -> part
    parts: DashMap<String, Arc<Part>>,
    /// logical message id -> its parts in submit order
    message_parts: DashMap<String, Vec<Arc<Part>>>,
    /// logical message id -> session id, for replay on reconnect
    retry: DashMap<String, String>,

    report_queue: Arc<ReportQueue>,
    on_report: Option<ReportCallback>,
    handle_pdu: Option<PduCallback>,

    last_message: StdMutex<Option<SystemTime>>,
    last_delivered: StdMutex<Option<SystemTime>>,
    shutdown: CancellationToken,
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        self.shutdown.cancel();
        for entry in self.sessions.iter() {
            entry.value().abort();
        }
    }
}

/// Cheap-to-clone handle over the shared manager state. All operations are
/// callable from any task.
#[derive(Clone)]
pub struct Manager {
    inner: Arc<ManagerInner>,
}

impl Manager {
    /// Validate settings and build the manager. No connection is attempted
    /// here; [`Manager::start`] or the first [`Manager::send`] binds.
    pub fn new(settings: Settings) -> Result<Self, Error> {
        let mut settings = settings.normalized();

        if settings.url.is_empty() {
            return Err(Error::Config("url is required".into()));
        }
        if settings.auth.system_id.is_empty() {
            return Err(Error::Config("auth.system_id is required".into()));
        }

        let id = if settings.id.is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            settings.id.clone()
        };

        let balancer = settings
            .balancer
            .take()
            .unwrap_or_else(|| Box::new(RoundRobin::new()));
        let on_report = settings.on_message_report.take();
        let handle_pdu = settings.handle_pdu.take();

        let inner = Arc::new(ManagerInner {
            name: settings.name.clone(),
            slug: settings.slug.clone(),
            id,
            auto_rebind: settings.auto_rebind,
            balancer,
            sessions: DashMap::new(),
            session_ids: StdRwLock::new(Vec::new()),
            messages: DashMap::new(),
            parts: DashMap::new(),
            message_parts: DashMap::new(),
            retry: DashMap::new(),
            report_queue: Arc::new(ReportQueue::default()),
            on_report,
            handle_pdu,
            last_message: StdMutex::new(None),
            last_delivered: StdMutex::new(None),
            shutdown: CancellationToken::new(),
            settings,
        });

        let manager = Manager { inner };
        if manager.inner.on_report.is_some() {
            manager.spawn_report_worker();
        }
        Ok(manager)
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn slug(&self) -> &str {
        &self.inner.slug
    }

    /// Bind the initial session set: one session, or `max_connection` of
    /// them when `use_all_connection` is set.
    pub async fn start(&self) -> Result<(), Error> {
        if self.inner.settings.use_all_connection {
            while self.inner.sessions.len() < self.inner.settings.max_connection {
                self.spawn_session().await?;
            }
            return Ok(());
        }
        if self.inner.sessions.is_empty() {
            self.spawn_session().await?;
        }
        Ok(())
    }

    /// Bind `count` additional sessions, bounded by `max_connection`.
    pub async fn add_connection(&self, count: usize) -> Result<(), Error> {
        if count == 0 {
            return Ok(());
        }
        let max = self.inner.settings.max_connection;
        let active = self.inner.sessions.len();
        if count > max || active + count > max {
            return Err(Error::InvalidState(format!(
                "cannot exceed {max} sessions ({active} active)"
            )));
        }
        for _ in 0..count {
            self.spawn_session().await?;
        }
        Ok(())
    }

    /// Close and deregister sessions. An empty list removes all of them.
    pub async fn remove_connection(&self, ids: &[String]) -> Result<(), Error> {
        let targets = if ids.is_empty() {
            self.session_ids()
        } else {
            ids.to_vec()
        };
        for id in targets {
            if let Some((_, session)) = self.inner.sessions.remove(&id) {
                session.close().await;
                write_ids(&self.inner.session_ids).retain(|existing| *existing != id);
            }
        }
        Ok(())
    }

    /// Close every session, drop the pool and bind afresh. Message state
    /// survives; session state does not.
    pub async fn rebind(&self) -> Result<(), Error> {
        self.close(None).await?;
        self.inner.sessions.clear();
        write_ids(&self.inner.session_ids).clear();
        self.start().await
    }

    /// Gracefully close one session, or all of them.
    pub async fn close(&self, session_id: Option<&str>) -> Result<(), Error> {
        match session_id {
            Some(id) => {
                let session = self
                    .inner
                    .sessions
                    .get(id)
                    .map(|entry| entry.value().clone())
                    .ok_or_else(|| Error::InvalidState(format!("no session {id}")))?;
                session.close().await;
            }
            None => {
                let sessions: Vec<_> = self
                    .inner
                    .sessions
                    .iter()
                    .map(|entry| entry.value().clone())
                    .collect();
                for session in sessions {
                    session.close().await;
                }
            }
        }
        Ok(())
    }

    /// Block until SIGINT or SIGTERM, then close all sessions.
    pub async fn wait(&self) {
        wait_for_shutdown_signal().await;
        info!(manager = %self.inner.id, "shutdown signal received, closing sessions");
        let _ = self.close(None).await;
        self.inner.shutdown.cancel();
    }

    /// Submit a message through a balancer-picked session.
    pub async fn send(&self, message: OutboundMessage) -> Result<Arc<Message>, Error> {
        self.send_inner(message, None).await
    }

    /// Submit a message pinned to one session.
    pub async fn send_via(
        &self,
        message: OutboundMessage,
        session_id: &str,
    ) -> Result<Arc<Message>, Error> {
        self.send_inner(message, Some(session_id)).await
    }

    /// Live (non-terminal) messages.
    pub fn get_messages(&self) -> Vec<Arc<Message>> {
        self.inner
            .messages
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Parts of a live message, in submit order.
    pub fn parts_of(&self, message_id: &str) -> Vec<Arc<Part>> {
        self.inner
            .message_parts
            .get(message_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.inner
            .session_ids
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn last_message_at(&self) -> Option<SystemTime> {
        *lock(&self.inner.last_message)
    }

    pub fn last_delivered_message_at(&self) -> Option<SystemTime> {
        *lock(&self.inner.last_delivered)
    }

    /// The canonical delivery-receipt aggregation: correlate by the
    /// receipt's id, settle the part, update the message counters and fire
    /// the terminal report when the last part lands. Duplicate receipts for
    /// an already-terminal part are ignored.
    ///
    /// The default PDU handling calls this for every deliver_sm; a custom
    /// `handle_pdu` that wants the accounting must call it too.
    pub fn apply_delivery_receipt(&self, pdu: &DeliverSm) {
        let receipt = pdu.receipt();
        if receipt.id.is_empty() {
            debug!("deliver_sm without a receipt id, ignoring");
            return;
        }

        let Some(part) = self
            .inner
            .parts
            .get(&receipt.id)
            .map(|entry| entry.value().clone())
        else {
            debug!(network_id = %receipt.id, "receipt for unknown part, dropping");
            return;
        };
        let Some(message) = self
            .inner
            .messages
            .get(&part.message_id)
            .map(|entry| entry.value().clone())
        else {
            return;
        };

        let updated = if receipt.stat.is_success() {
            if part.mark_delivered() {
                message.decr_sent();
                message.incr_delivered();
                *lock(&self.inner.last_delivered) = Some(SystemTime::now());
                true
            } else {
                false
            }
        } else {
            let detail = if receipt.err.is_empty() {
                receipt.stat.to_string()
            } else {
                format!("{} (err:{})", receipt.stat, receipt.err)
            };
            if part.mark_receipt_failure(detail) {
                message.decr_sent();
                message.incr_failed();
                true
            } else {
                false
            }
        };

        if !updated {
            trace!(network_id = %receipt.id, "duplicate receipt ignored");
            return;
        }

        debug!(
            message = %message.id,
            network_id = %receipt.id,
            stat = %receipt.stat,
            "delivery receipt applied"
        );

        if message.all_parts_settled() {
            self.finalize(&message);
        }
    }

    // ---- internals ----

    async fn send_inner(
        &self,
        out: OutboundMessage,
        session_id: Option<&str>,
    ) -> Result<Arc<Message>, Error> {
        if self.inner.sessions.is_empty() {
            self.start().await?;
        }
        let session = self.pick_session(session_id)?;

        let message_id = out
            .id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        // a replay reuses the id; purge indices from the failed attempt
        if let Some((_, stale)) = self.inner.message_parts.remove(&message_id) {
            for part in stale {
                if !part.network_id.is_empty() {
                    self.inner.parts.remove(&part.network_id);
                }
            }
        }

        let message = Arc::new(Message::new(message_id.clone(), out));
        self.inner
            .messages
            .insert(message_id.clone(), Arc::clone(&message));
        *lock(&self.inner.last_message) = Some(SystemTime::now());

        let settings = &self.inner.settings;
        let (codec, is_long) = text::find_coding(&message.text);
        let (src_ton, src_npi) = parse_src_phone(&message.from);
        let (dst_ton, dst_npi) = parse_dest_phone(&message.to);

        let (payloads, esm_class) = if is_long {
            (
                codec.segments(session.next_concat_ref()),
                settings.esm_class | ESM_CLASS_UDHI,
            )
        } else {
            (vec![codec.payload().to_vec()], settings.esm_class)
        };
        message.set_total_parts(payloads.len() as u32);

        let validity_period = settings
            .validity
            .map(relative_validity)
            .unwrap_or_default();

        for payload in payloads {
            let pdu = SubmitSm {
                service_type: settings.service_type.clone(),
                source_addr_ton: src_ton,
                source_addr_npi: src_npi,
                source_addr: message.from.clone(),
                dest_addr_ton: dst_ton,
                dest_addr_npi: dst_npi,
                destination_addr: message.to.clone(),
                esm_class,
                protocol_id: settings.protocol_id,
                priority_flag: settings.priority_flag,
                schedule_delivery_time: settings.schedule_delivery_time.clone(),
                validity_period: validity_period.clone(),
                registered_delivery: settings.register.registered_delivery(),
                replace_if_present_flag: settings.replace_if_present_flag,
                data_coding: codec.data_coding(),
                short_message: Bytes::from(payload),
                ..SubmitSm::default()
            };

            match session.submit(pdu).await {
                Ok(resp) => {
                    let part = Arc::new(Part::new(message_id.clone(), resp.message_id.clone()));
                    if resp.command_status.is_ok() {
                        message.incr_sent();
                    } else {
                        part.mark_submit_failure(resp.command_status.to_string());
                        message.incr_failed();
                        warn!(
                            message = %message_id,
                            status = %resp.command_status,
                            "submit_sm rejected by SMSC"
                        );
                    }
                    if !part.network_id.is_empty() {
                        self.inner
                            .parts
                            .insert(part.network_id.clone(), Arc::clone(&part));
                    }
                    self.inner
                        .message_parts
                        .entry(message_id.clone())
                        .or_default()
                        .push(part);
                }
                Err(e) => {
                    warn!(
                        message = %message_id,
                        session = %session.id(),
                        "transport failure during submit, buffering for retry: {e}"
                    );
                    message.mark_failed(Some(format!("unable to send: {e}")));
                    self.inner
                        .retry
                        .insert(message_id.clone(), session.id().to_string());
                    self.enqueue_report(Arc::clone(&message), self.parts_of(&message_id));
                    return Err(e);
                }
            }
        }

        if message.all_parts_settled() {
            // every part was NAKed at submit time
            self.finalize(&message);
        } else {
            message.mark_sent();
            self.enqueue_report(Arc::clone(&message), self.parts_of(&message_id));
        }
        Ok(message)
    }

    fn pick_session(&self, constraint: Option<&str>) -> Result<Arc<Session>, Error> {
        if let Some(id) = constraint {
            return self
                .inner
                .sessions
                .get(id)
                .map(|entry| entry.value().clone())
                .ok_or(Error::NoAvailableSession);
        }
        let ids = self.session_ids();
        let picked = self.inner.balancer.pick(&ids)?;
        self.inner
            .sessions
            .get(&picked)
            .map(|entry| entry.value().clone())
            .ok_or(Error::NoAvailableSession)
    }

    /// Bind one new session and register it once the first bind succeeds.
    fn spawn_session(&self) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + '_>> {
        Box::pin(self.spawn_session_inner())
    }

    async fn spawn_session_inner(&self) -> Result<(), Error> {
        let settings = &self.inner.settings;
        let config = SessionConfig {
            addr: settings.url.clone(),
            system_id: settings.auth.system_id.clone(),
            password: settings.auth.password.clone(),
            system_type: settings.auth.system_type.clone(),
            read_timeout: settings.read_timeout,
            write_timeout: settings.write_timeout,
            enquire_interval: settings.enquiry_interval,
            enquire_timeout: settings.enquiry_timeout,
            bind_interval: settings.bind_interval,
            throttle: settings.throttle,
            auto_rebind: self.inner.auto_rebind,
            ..SessionConfig::default()
        };

        let weak = Arc::downgrade(&self.inner);
        let handler: PduHandler = Arc::new(move |frame| {
            if let Some(inner) = weak.upgrade() {
                (Manager { inner }).handle_frame(frame);
            }
        });

        let (session, mut events) = Session::bind(config, handler);

        // the first conclusive status decides whether setup succeeded
        loop {
            match events.recv().await {
                Some(ConnStatus::Connecting) | Some(ConnStatus::Disconnected) => continue,
                Some(ConnStatus::Connected) => break,
                Some(ConnStatus::BindFailed(reason)) => {
                    session.abort();
                    return Err(Error::InvalidState(format!(
                        "unable to bind session: {reason}"
                    )));
                }
                None => return Err(Error::ConnectionLost),
            }
        }

        let session_id = session.id().to_string();
        self.inner
            .sessions
            .insert(session_id.clone(), Arc::clone(&session));
        write_ids(&self.inner.session_ids).push(session_id.clone());
        info!(manager = %self.inner.id, session = %session_id, "session registered");

        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            while let Some(status) = events.recv().await {
                match status {
                    ConnStatus::Connected => {
                        info!(session = %session_id, "session reconnected");
                        let Some(inner) = weak.upgrade() else { return };
                        (Manager { inner }).drain_retries(&session_id).await;
                    }
                    other => {
                        debug!(session = %session_id, status = ?other, "connection status");
                    }
                }
            }
        });
        Ok(())
    }

    fn handle_frame(&self, frame: Frame) {
        if let Some(custom) = self.inner.handle_pdu.clone() {
            custom(self.clone(), frame);
            return;
        }
        if let Frame::DeliverSm(pdu) = frame {
            self.apply_delivery_receipt(&pdu);
        }
    }

    /// Terminal aggregation, at most once per message: set the final status,
    /// fire the report, evict the message and its parts from live indices.
    fn finalize(&self, message: &Arc<Message>) {
        if !message.try_finalize() {
            return;
        }

        if message.failed_parts() == 0 {
            message.mark_delivered();
        } else {
            message.mark_failed(None);
        }

        info!(
            message = %message.id,
            status = message.status().as_str(),
            delivered = message.delivered_parts(),
            failed = message.failed_parts(),
            "message reached terminal state"
        );

        // evict before reporting so observers never see a terminal message
        // still in the live indices
        self.inner.messages.remove(&message.id);
        self.inner.retry.remove(&message.id);
        let parts = self
            .inner
            .message_parts
            .remove(&message.id)
            .map(|(_, parts)| parts)
            .unwrap_or_default();
        for part in &parts {
            if !part.network_id.is_empty() {
                self.inner.parts.remove(&part.network_id);
            }
        }

        self.enqueue_report(Arc::clone(message), parts);
    }

    fn enqueue_report(&self, message: Arc<Message>, parts: Vec<Arc<Part>>) {
        if self.inner.on_report.is_none() {
            return;
        }
        self.inner.report_queue.push(ReportJob { message, parts });
    }

    fn spawn_report_worker(&self) {
        let weak = Arc::downgrade(&self.inner);
        let queue = Arc::clone(&self.inner.report_queue);
        let shutdown = self.inner.shutdown.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = queue.notify.notified() => {}
                }
                while let Some(job) = queue.pop() {
                    let Some(inner) = weak.upgrade() else { return };
                    let manager = Manager { inner };
                    if let Some(callback) = manager.inner.on_report.clone() {
                        callback(manager.clone(), job.message, job.parts);
                    }
                }
            }
        });
    }

    /// Replay messages whose submission failed transport-level, on the
    /// session that just reconnected. Replays produce fresh network ids.
    async fn drain_retries(&self, session_id: &str) {
        let pending: Vec<String> = self
            .inner
            .retry
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        for message_id in pending {
            let Some(message) = self
                .inner
                .messages
                .get(&message_id)
                .map(|entry| entry.value().clone())
            else {
                self.inner.retry.remove(&message_id);
                continue;
            };

            info!(
                message = %message_id,
                session = %session_id,
                "replaying buffered message after reconnect"
            );
            let out = OutboundMessage {
                id: Some(message_id.clone()),
                from: message.from.clone(),
                to: message.to.clone(),
                text: message.text.clone(),
                user: message.user.clone(),
            };
            match self.send_inner(out, Some(session_id)).await {
                Ok(_) => {
                    self.inner.retry.remove(&message_id);
                }
                Err(e) => {
                    warn!(message = %message_id, "replay failed, keeping in buffer: {e}");
                }
            }
        }
    }
}

/// TON/NPI inference for source addresses: `+`-prefixed numbers are
/// international/ISDN, short codes are network-specific, alphabetic senders
/// are alphanumeric.
fn parse_src_phone(phone: &str) -> (u8, u8) {
    if phone.starts_with('+') {
        return (1, 1);
    }
    if phone.chars().count() <= 5 {
        return (3, 0);
    }
    if !phone.is_empty() && phone.chars().all(char::is_alphabetic) {
        return (5, 0);
    }
    (1, 1)
}

fn parse_dest_phone(phone: &str) -> (u8, u8) {
    if phone.starts_with('+') {
        (1, 1)
    } else {
        (0, 1)
    }
}

/// Render a validity duration as an SMPP relative time string
/// (YYMMDDhhmmss000R with zero years/months).
fn relative_validity(validity: Duration) -> String {
    let secs = validity.as_secs();
    let days = (secs / 86_400).min(99);
    let hours = (secs % 86_400) / 3_600;
    let minutes = (secs % 3_600) / 60;
    let seconds = secs % 60;
    format!("0000{days:02}{hours:02}{minutes:02}{seconds:02}000R")
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            warn!("cannot install SIGTERM handler ({e}), waiting on SIGINT only");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_ids(ids: &StdRwLock<Vec<String>>) -> std::sync::RwLockWriteGuard<'_, Vec<String>> {
    ids.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
