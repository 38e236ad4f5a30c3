use crate::datatypes::{CommandId, CommandStatus};
use crate::macros::impl_complete_header_only_pdu;

/// Error response for a PDU the peer could not even classify (bad command id
/// or malformed header). Carries the failure in command_status.
#[derive(Clone, Debug, PartialEq)]
pub struct GenericNack {
    pub command_status: CommandStatus,
    pub sequence_number: u32,
}

impl_complete_header_only_pdu!(GenericNack, CommandId::GenericNack);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Decodable, Encodable, PduHeader};
    use std::io::Cursor;

    #[test]
    fn generic_nack_roundtrip() {
        let original = GenericNack::error(456, CommandStatus::InvalidCommandId);
        let bytes = original.to_bytes().unwrap();

        let mut cursor = Cursor::new(bytes.as_ref());
        let header = PduHeader::decode(&mut cursor).unwrap();
        let mut body = Cursor::new(&bytes.as_ref()[PduHeader::SIZE..]);
        let decoded = GenericNack::decode(header, &mut body).unwrap();
        assert_eq!(original, decoded);
        assert_eq!(decoded.command_status, CommandStatus::InvalidCommandId);
    }
}
