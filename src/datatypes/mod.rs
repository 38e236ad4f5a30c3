mod bind_transceiver;
mod command_id;
mod command_status;
mod deliver_sm;
mod enquire_link;
mod generic_nack;
mod query_sm;
mod submit_sm;
pub mod tlv;
mod unbind;

pub use bind_transceiver::{BindTransceiver, BindTransceiverResponse};
pub use command_id::CommandId;
pub use command_status::CommandStatus;
pub use deliver_sm::{DeliverSm, DeliverSmResponse, ESM_CLASS_DELIVERY_RECEIPT};
pub use enquire_link::{EnquireLink, EnquireLinkResponse};
pub use generic_nack::GenericNack;
pub use query_sm::{message_state, QuerySm, QuerySmResponse};
pub use submit_sm::{SubmitSm, SubmitSmResponse};
pub use tlv::{find_tlv, Tlv};
pub use unbind::{Unbind, UnbindResponse};

/// Interface version octet carried in bind PDUs: SMPP v3.4.
pub const INTERFACE_VERSION: u8 = 0x34;

/// esm_class bit signalling that the short_message starts with a UDH.
pub const ESM_CLASS_UDHI: u8 = 0x40;
