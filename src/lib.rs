//! SMPP v3.4 client runtime: an outbound ESME that maintains long-lived
//! bound transceiver sessions to an SMSC, submits single and concatenated
//! short messages, and correlates asynchronous delivery receipts back to
//! the originating logical message.
//!
//! The layers, bottom up:
//!
//! * [`codec`] / [`datatypes`] - the binary wire format: 16-byte headers,
//!   ordered mandatory fields, TLV optional parameters.
//! * [`text`] - GSM7/Latin-1/UCS-2 body codecs, coding detection and UDH
//!   segmentation for long messages.
//! * [`session`] - one bound transceiver over TCP: bind handshake,
//!   concurrent request/response correlation by sequence number,
//!   enquire_link liveness, auto-rebind, rate limiting.
//! * [`manager`] - the application surface: a session pool behind a
//!   [`balancer`], per-part accounting, delivery-receipt aggregation and
//!   lifecycle reports.
//!
//! # Sending a message
//!
//! ```no_run
//! use smpp_esme::{Auth, DeliverySetting, Manager, OutboundMessage, Settings};
//!
//! #[tokio::main]
//! async fn main() -> smpp_esme::Result<()> {
//!     let manager = Manager::new(Settings {
//!         name: "Dove Cote".into(),
//!         url: "localhost:2775".into(),
//!         auth: Auth {
//!             system_id: "esme01".into(),
//!             password: "secret".into(),
//!             ..Auth::default()
//!         },
//!         register: DeliverySetting::Final,
//!         on_message_report: Some(std::sync::Arc::new(|_, message, parts| {
//!             println!(
//!                 "message {} is {} ({} parts)",
//!                 message.id,
//!                 message.status().as_str(),
//!                 parts.len()
//!             );
//!         })),
//!         ..Settings::default()
//!     })?;
//!
//!     manager
//!         .send(OutboundMessage::new("Acme", "+15551234", "hello"))
//!         .await?;
//!     manager.wait().await;
//!     Ok(())
//! }
//! ```

pub mod balancer;
pub mod codec;
pub mod connection;
pub mod datatypes;
pub mod error;
pub mod manager;
pub mod receipt;
pub mod session;
pub mod text;

mod macros;

pub use codec::{CodecError, Decodable, Encodable, Frame, PduHeader, PduRegistry, MAX_PDU_SIZE};
pub use error::{Error, Result};
pub use manager::{
    Auth, DeliverySetting, Manager, Message, MessageStatus, OutboundMessage, Part, PartStatus,
    PduCallback, ReportCallback, Settings,
};
pub use receipt::{DeliveryReceipt, ReceiptStat};
pub use session::{ConnStatus, PduHandler, Session, SessionConfig, SessionState};
