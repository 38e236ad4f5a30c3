//! Logical messages and their per-PDU parts.
//!
//! A [`Message`] is what the application hands to [`Manager::send`]; a
//! [`Part`] is one submit_sm on the wire. Counters are atomics because the
//! send path and the receipt handler update them from different tasks; the
//! terminal transition is guarded by a compare-and-set `finalized` flag so
//! the final report can never fire twice.
//!
//! [`Manager::send`]: crate::manager::Manager::send

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::{Mutex as StdMutex, MutexGuard};
use std::time::SystemTime;

/// What the caller submits. Everything except `from`/`to`/`text` is
/// optional; a missing id is generated.
#[derive(Clone, Debug, Default)]
pub struct OutboundMessage {
    pub id: Option<String>,
    pub from: String,
    pub to: String,
    pub text: String,
    /// Caller-defined correlation value, carried through to reports.
    pub user: Option<String>,
}

impl OutboundMessage {
    pub fn new(from: &str, to: &str, text: &str) -> Self {
        Self {
            id: None,
            from: from.to_string(),
            to: to.to_string(),
            text: text.to_string(),
            user: None,
        }
    }
}

/// Aggregate state of a logical message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageStatus {
    /// Created but not yet (fully) submitted.
    Pending = 0,
    /// All parts submitted; receipts outstanding.
    Sent = 1,
    /// Every part confirmed delivered.
    Delivered = 2,
    /// Terminal with at least one failed part, or submission failed.
    Failed = 3,
}

impl MessageStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => MessageStatus::Sent,
            2 => MessageStatus::Delivered,
            3 => MessageStatus::Failed,
            _ => MessageStatus::Pending,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Pending => "PENDING",
            MessageStatus::Sent => "SENT",
            MessageStatus::Delivered => "DELIVERED",
            MessageStatus::Failed => "FAILED",
        }
    }
}

/// State of one submitted part.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum PartStatus {
    Sent = 0,
    Delivered = 1,
    Failed = 2,
}

impl PartStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => PartStatus::Delivered,
            2 => PartStatus::Failed,
            _ => PartStatus::Sent,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PartStatus::Sent => "SENT",
            PartStatus::Delivered => "DELIVERED",
            PartStatus::Failed => "FAILED",
        }
    }
}

#[derive(Debug, Default)]
struct Timestamps {
    created: Option<SystemTime>,
    sent: Option<SystemTime>,
    delivered: Option<SystemTime>,
    failed: Option<SystemTime>,
}

/// A logical message owned by the manager, alive from send until its
/// terminal report.
#[derive(Debug)]
pub struct Message {
    pub id: String,
    pub from: String,
    pub to: String,
    pub text: String,
    pub user: Option<String>,

    status: AtomicU8,
    finalized: AtomicBool,
    total_parts: AtomicU32,
    sent_parts: AtomicU32,
    delivered_parts: AtomicU32,
    failed_parts: AtomicU32,
    error: StdMutex<Option<String>>,
    times: StdMutex<Timestamps>,
}

impl Message {
    pub(crate) fn new(id: String, out: OutboundMessage) -> Self {
        Self {
            id,
            from: out.from,
            to: out.to,
            text: out.text,
            user: out.user,
            status: AtomicU8::new(MessageStatus::Pending as u8),
            finalized: AtomicBool::new(false),
            total_parts: AtomicU32::new(0),
            sent_parts: AtomicU32::new(0),
            delivered_parts: AtomicU32::new(0),
            failed_parts: AtomicU32::new(0),
            error: StdMutex::new(None),
            times: StdMutex::new(Timestamps {
                created: Some(SystemTime::now()),
                ..Timestamps::default()
            }),
        }
    }

    pub fn status(&self) -> MessageStatus {
        MessageStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn error(&self) -> Option<String> {
        lock(&self.error).clone()
    }

    pub fn total_parts(&self) -> u32 {
        self.total_parts.load(Ordering::Acquire)
    }

    pub fn sent_parts(&self) -> u32 {
        self.sent_parts.load(Ordering::Acquire)
    }

    pub fn delivered_parts(&self) -> u32 {
        self.delivered_parts.load(Ordering::Acquire)
    }

    pub fn failed_parts(&self) -> u32 {
        self.failed_parts.load(Ordering::Acquire)
    }

    pub fn created_at(&self) -> Option<SystemTime> {
        lock(&self.times).created
    }

    pub fn sent_at(&self) -> Option<SystemTime> {
        lock(&self.times).sent
    }

    pub fn delivered_at(&self) -> Option<SystemTime> {
        lock(&self.times).delivered
    }

    pub fn failed_at(&self) -> Option<SystemTime> {
        lock(&self.times).failed
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::Acquire)
    }

    /// Whether every part has reached a terminal state.
    pub fn all_parts_settled(&self) -> bool {
        let total = self.total_parts();
        total > 0 && self.delivered_parts() + self.failed_parts() >= total
    }

    pub(crate) fn set_total_parts(&self, total: u32) {
        self.total_parts.store(total, Ordering::Release);
    }

    pub(crate) fn incr_sent(&self) {
        self.sent_parts.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn decr_sent(&self) {
        let _ = self
            .sent_parts
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                Some(v.saturating_sub(1))
            });
    }

    pub(crate) fn incr_delivered(&self) {
        self.delivered_parts.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn incr_failed(&self) {
        self.failed_parts.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn mark_sent(&self) {
        self.status.store(MessageStatus::Sent as u8, Ordering::Release);
        lock(&self.times).sent = Some(SystemTime::now());
    }

    pub(crate) fn mark_delivered(&self) {
        self.status
            .store(MessageStatus::Delivered as u8, Ordering::Release);
        lock(&self.times).delivered = Some(SystemTime::now());
    }

    pub(crate) fn mark_failed(&self, error: Option<String>) {
        self.status.store(MessageStatus::Failed as u8, Ordering::Release);
        lock(&self.times).failed = Some(SystemTime::now());
        if error.is_some() {
            *lock(&self.error) = error;
        }
    }

    /// Claim the terminal transition. Only the caller that wins the
    /// compare-and-set may aggregate and report.
    pub(crate) fn try_finalize(&self) -> bool {
        self.finalized
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// One submit_sm of a logical message.
#[derive(Debug)]
pub struct Part {
    pub id: String,
    /// Logical message this part belongs to.
    pub message_id: String,
    /// SMSC-assigned id from submit_sm_resp; receipts quote it back.
    pub network_id: String,

    status: AtomicU8,
    error: StdMutex<Option<String>>,
    times: StdMutex<Timestamps>,
}

impl Part {
    /// A part that was accepted by the SMSC (status SENT).
    pub(crate) fn new(message_id: String, network_id: String) -> Self {
        let now = Some(SystemTime::now());
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            message_id,
            network_id,
            status: AtomicU8::new(PartStatus::Sent as u8),
            error: StdMutex::new(None),
            times: StdMutex::new(Timestamps {
                created: now,
                sent: now,
                ..Timestamps::default()
            }),
        }
    }

    pub fn status(&self) -> PartStatus {
        PartStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn error(&self) -> Option<String> {
        lock(&self.error).clone()
    }

    pub fn sent_at(&self) -> Option<SystemTime> {
        lock(&self.times).sent
    }

    pub fn delivered_at(&self) -> Option<SystemTime> {
        lock(&self.times).delivered
    }

    pub fn failed_at(&self) -> Option<SystemTime> {
        lock(&self.times).failed
    }

    /// The SMSC rejected the submit (protocol NAK).
    pub(crate) fn mark_submit_failure(&self, error: String) {
        self.status.store(PartStatus::Failed as u8, Ordering::Release);
        *lock(&self.error) = Some(error);
        lock(&self.times).failed = Some(SystemTime::now());
    }

    /// Receipt confirmed delivery. False when the part was already
    /// terminal (duplicate receipt).
    pub(crate) fn mark_delivered(&self) -> bool {
        if self.transition(PartStatus::Sent, PartStatus::Delivered) {
            lock(&self.times).delivered = Some(SystemTime::now());
            true
        } else {
            false
        }
    }

    /// Receipt reported a non-delivered final state. False on duplicates.
    pub(crate) fn mark_receipt_failure(&self, error: String) -> bool {
        if self.transition(PartStatus::Sent, PartStatus::Failed) {
            *lock(&self.error) = Some(error);
            lock(&self.times).failed = Some(SystemTime::now());
            true
        } else {
            false
        }
    }

    fn transition(&self, from: PartStatus, to: PartStatus) -> bool {
        self.status
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
