use crate::codec::CodecError;
use crate::datatypes::{CommandId, CommandStatus};
use std::io;
use thiserror::Error;

/// Errors surfaced by sessions and the manager.
///
/// A non-OK submit_sm_resp is deliberately *not* in this taxonomy: protocol
/// NAKs are per-part outcomes recorded on the part, and the session stays
/// bound. Everything here either fails a call or tears a connection down.
#[derive(Debug, Error)]
pub enum Error {
    /// Rejected settings, caught at manager construction.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O failure on connect, read or write.
    #[error("connection error: {0}")]
    Connection(#[from] io::Error),

    /// Malformed inbound PDU; the session closes and rebinds.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The SMSC answered a bind with a non-OK status.
    #[error("bind failed: {0}")]
    BindFailed(CommandStatus),

    /// No response arrived within the response timeout.
    #[error("response timeout")]
    ResponseTimeout,

    /// The connection dropped while a request was in flight; pending
    /// waiters all fail with this.
    #[error("connection lost")]
    ConnectionLost,

    /// A response arrived with the right sequence number but wrong type.
    #[error("unexpected PDU: expected {expected}, got {actual:?}")]
    UnexpectedPdu {
        expected: &'static str,
        actual: CommandId,
    },

    /// The balancer had no session to pick from.
    #[error("no available session")]
    NoAvailableSession,

    /// Operation attempted in a state that cannot carry it.
    #[error("invalid state: {0}")]
    InvalidState(String),
}

pub type Result<T> = std::result::Result<T, Error>;
