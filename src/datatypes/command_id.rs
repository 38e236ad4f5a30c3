// SMPP v3.4 command identifiers (specification Table 4-1), limited to the
// operations a transceiver ESME exchanges with an SMSC.

use num_enum::TryFromPrimitive;

/// The command_id field of the PDU header. Bit 31 is the response indicator:
/// a response id is its request id with the top bit set.
///
/// AlertNotification and Outbind carry no decoder in this runtime but stay in
/// the enum so an SMSC that emits them is handled as an opaque frame instead
/// of a framing error.
#[derive(TryFromPrimitive)]
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandId {
    GenericNack = 0x8000_0000,

    QuerySm = 0x0000_0003,
    QuerySmResp = 0x8000_0003,

    SubmitSm = 0x0000_0004,
    SubmitSmResp = 0x8000_0004,

    DeliverSm = 0x0000_0005,
    DeliverSmResp = 0x8000_0005,

    Unbind = 0x0000_0006,
    UnbindResp = 0x8000_0006,

    BindTransceiver = 0x0000_0009,
    BindTransceiverResp = 0x8000_0009,

    Outbind = 0x0000_000B,

    EnquireLink = 0x0000_0015,
    EnquireLinkResp = 0x8000_0015,

    AlertNotification = 0x0000_0102,
}

impl CommandId {
    /// Whether this id identifies a response PDU.
    pub fn is_response(&self) -> bool {
        (*self as u32) & 0x8000_0000 != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_bit() {
        assert!(!CommandId::SubmitSm.is_response());
        assert!(CommandId::SubmitSmResp.is_response());
        assert!(!CommandId::EnquireLink.is_response());
        assert!(CommandId::EnquireLinkResp.is_response());
        assert!(CommandId::GenericNack.is_response());
    }

    #[test]
    fn response_id_is_request_id_with_top_bit() {
        assert_eq!(
            CommandId::SubmitSmResp as u32,
            CommandId::SubmitSm as u32 | 0x8000_0000
        );
        assert_eq!(
            CommandId::BindTransceiverResp as u32,
            CommandId::BindTransceiver as u32 | 0x8000_0000
        );
    }

    #[test]
    fn unknown_id_fails_conversion() {
        assert!(CommandId::try_from(0x0000_00AAu32).is_err());
    }
}
