use bytes::{Buf, Bytes, BytesMut};
use std::io::Cursor;

use crate::codec::{
    decode_cstring, decode_u8, encode_cstring, finish_length, CodecError, Decodable, Encodable,
    PduHeader,
};
use crate::datatypes::{CommandId, CommandStatus, Tlv};

/// Submits a short message to the SMSC for onward delivery (Section 4.4.1).
///
/// The mandatory fields appear in wire order. `short_message` is raw octets
/// in the alphabet named by `data_coding`; when a UDH is present (esm_class
/// bit 0x40) its bytes lead the field. Optional parameters trail the body
/// as an ordered TLV list so unknown tags re-serialize untouched.
#[derive(Clone, Debug, PartialEq)]
pub struct SubmitSm {
    pub command_status: CommandStatus,
    pub sequence_number: u32,

    pub service_type: String,
    pub source_addr_ton: u8,
    pub source_addr_npi: u8,
    pub source_addr: String,
    pub dest_addr_ton: u8,
    pub dest_addr_npi: u8,
    pub destination_addr: String,
    pub esm_class: u8,
    pub protocol_id: u8,
    pub priority_flag: u8,
    pub schedule_delivery_time: String,
    pub validity_period: String,
    pub registered_delivery: u8,
    pub replace_if_present_flag: u8,
    pub data_coding: u8,
    pub sm_default_msg_id: u8,
    /// Up to 254 octets; sm_length is derived from this at encode time.
    pub short_message: Bytes,

    pub tlvs: Vec<Tlv>,
}

impl Default for SubmitSm {
    fn default() -> Self {
        Self {
            command_status: CommandStatus::Ok,
            sequence_number: 0,
            service_type: String::new(),
            source_addr_ton: 0,
            source_addr_npi: 0,
            source_addr: String::new(),
            dest_addr_ton: 0,
            dest_addr_npi: 0,
            destination_addr: String::new(),
            esm_class: 0,
            protocol_id: 0,
            priority_flag: 0,
            schedule_delivery_time: String::new(),
            validity_period: String::new(),
            registered_delivery: 0,
            replace_if_present_flag: 0,
            data_coding: 0,
            sm_default_msg_id: 0,
            short_message: Bytes::new(),
            tlvs: Vec::new(),
        }
    }
}

impl SubmitSm {
    /// Field-length checks per Section 4.4.1.
    pub fn validate(&self) -> Result<(), CodecError> {
        if self.service_type.len() > 5 {
            return Err(CodecError::FieldValidation {
                field: "service_type",
                reason: format!("exceeds 5 characters: {}", self.service_type.len()),
            });
        }
        if self.source_addr.len() > 20 {
            return Err(CodecError::FieldValidation {
                field: "source_addr",
                reason: format!("exceeds 20 characters: {}", self.source_addr.len()),
            });
        }
        if self.destination_addr.len() > 20 {
            return Err(CodecError::FieldValidation {
                field: "destination_addr",
                reason: format!("exceeds 20 characters: {}", self.destination_addr.len()),
            });
        }
        if self.schedule_delivery_time.len() > 16 {
            return Err(CodecError::FieldValidation {
                field: "schedule_delivery_time",
                reason: format!("exceeds 16 characters: {}", self.schedule_delivery_time.len()),
            });
        }
        if self.validity_period.len() > 16 {
            return Err(CodecError::FieldValidation {
                field: "validity_period",
                reason: format!("exceeds 16 characters: {}", self.validity_period.len()),
            });
        }
        if self.short_message.len() > 254 {
            return Err(CodecError::FieldValidation {
                field: "short_message",
                reason: format!("exceeds 254 octets: {}", self.short_message.len()),
            });
        }
        Ok(())
    }
}

impl Encodable for SubmitSm {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        self.validate()?;

        let start = buf.len();
        PduHeader {
            command_length: 0,
            command_id: CommandId::SubmitSm,
            command_status: self.command_status,
            sequence_number: self.sequence_number,
        }
        .encode(buf);

        encode_cstring(buf, &self.service_type, 6);
        buf.extend_from_slice(&[self.source_addr_ton, self.source_addr_npi]);
        encode_cstring(buf, &self.source_addr, 21);
        buf.extend_from_slice(&[self.dest_addr_ton, self.dest_addr_npi]);
        encode_cstring(buf, &self.destination_addr, 21);
        buf.extend_from_slice(&[self.esm_class, self.protocol_id, self.priority_flag]);
        encode_cstring(buf, &self.schedule_delivery_time, 17);
        encode_cstring(buf, &self.validity_period, 17);
        buf.extend_from_slice(&[
            self.registered_delivery,
            self.replace_if_present_flag,
            self.data_coding,
            self.sm_default_msg_id,
            self.short_message.len() as u8,
        ]);
        buf.extend_from_slice(&self.short_message);

        for tlv in &self.tlvs {
            tlv.encode(buf);
        }

        finish_length(buf, start);
        Ok(())
    }
}

impl Decodable for SubmitSm {
    fn command_id() -> CommandId {
        CommandId::SubmitSm
    }

    fn decode(header: PduHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        Self::validate_header(&header)?;

        let service_type = decode_cstring(buf, 6, "service_type")?;
        let source_addr_ton = decode_u8(buf, "source_addr_ton")?;
        let source_addr_npi = decode_u8(buf, "source_addr_npi")?;
        let source_addr = decode_cstring(buf, 21, "source_addr")?;
        let dest_addr_ton = decode_u8(buf, "dest_addr_ton")?;
        let dest_addr_npi = decode_u8(buf, "dest_addr_npi")?;
        let destination_addr = decode_cstring(buf, 21, "destination_addr")?;
        let esm_class = decode_u8(buf, "esm_class")?;
        let protocol_id = decode_u8(buf, "protocol_id")?;
        let priority_flag = decode_u8(buf, "priority_flag")?;
        let schedule_delivery_time = decode_cstring(buf, 17, "schedule_delivery_time")?;
        let validity_period = decode_cstring(buf, 17, "validity_period")?;
        let registered_delivery = decode_u8(buf, "registered_delivery")?;
        let replace_if_present_flag = decode_u8(buf, "replace_if_present_flag")?;
        let data_coding = decode_u8(buf, "data_coding")?;
        let sm_default_msg_id = decode_u8(buf, "sm_default_msg_id")?;
        let sm_length = decode_u8(buf, "sm_length")? as usize;

        if buf.remaining() < sm_length {
            return Err(CodecError::FieldValidation {
                field: "short_message",
                reason: format!("sm_length {sm_length} exceeds remaining body"),
            });
        }
        let short_message = buf.copy_to_bytes(sm_length);
        let tlvs = Tlv::decode_all(buf)?;

        Ok(Self {
            command_status: header.command_status,
            sequence_number: header.sequence_number,
            service_type,
            source_addr_ton,
            source_addr_npi,
            source_addr,
            dest_addr_ton,
            dest_addr_npi,
            destination_addr,
            esm_class,
            protocol_id,
            priority_flag,
            schedule_delivery_time,
            validity_period,
            registered_delivery,
            replace_if_present_flag,
            data_coding,
            sm_default_msg_id,
            short_message,
            tlvs,
        })
    }
}

/// Response to submit_sm. On success `message_id` carries the SMSC-assigned
/// id later quoted by delivery receipts; on failure the body may be absent.
#[derive(Clone, Debug, PartialEq)]
pub struct SubmitSmResponse {
    pub command_status: CommandStatus,
    pub sequence_number: u32,

    pub message_id: String,
    pub tlvs: Vec<Tlv>,
}

impl SubmitSmResponse {
    pub fn new(sequence_number: u32, message_id: &str) -> Self {
        Self {
            command_status: CommandStatus::Ok,
            sequence_number,
            message_id: message_id.to_string(),
            tlvs: Vec::new(),
        }
    }

    pub fn error(sequence_number: u32, status: CommandStatus) -> Self {
        Self {
            command_status: status,
            sequence_number,
            message_id: String::new(),
            tlvs: Vec::new(),
        }
    }
}

impl Encodable for SubmitSmResponse {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        let start = buf.len();
        PduHeader {
            command_length: 0,
            command_id: CommandId::SubmitSmResp,
            command_status: self.command_status,
            sequence_number: self.sequence_number,
        }
        .encode(buf);

        encode_cstring(buf, &self.message_id, 65);
        for tlv in &self.tlvs {
            tlv.encode(buf);
        }

        finish_length(buf, start);
        Ok(())
    }
}

impl Decodable for SubmitSmResponse {
    fn command_id() -> CommandId {
        CommandId::SubmitSmResp
    }

    fn decode(header: PduHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        Self::validate_header(&header)?;

        let message_id = if buf.has_remaining() {
            decode_cstring(buf, 65, "message_id")?
        } else {
            String::new()
        };
        let tlvs = Tlv::decode_all(buf)?;

        Ok(Self {
            command_status: header.command_status,
            sequence_number: header.sequence_number,
            message_id,
            tlvs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<T: Encodable + Decodable + PartialEq + std::fmt::Debug>(pdu: &T) -> T {
        let bytes = pdu.to_bytes().unwrap();
        let mut cursor = Cursor::new(bytes.as_ref());
        let header = PduHeader::decode(&mut cursor).unwrap();
        assert_eq!(header.command_length as usize, bytes.len());
        let mut body = Cursor::new(&bytes.as_ref()[PduHeader::SIZE..]);
        T::decode(header, &mut body).unwrap()
    }

    fn sample() -> SubmitSm {
        SubmitSm {
            sequence_number: 5,
            source_addr_ton: 5,
            source_addr: "Acme".into(),
            dest_addr_ton: 1,
            dest_addr_npi: 1,
            destination_addr: "15551234".into(),
            registered_delivery: 1,
            short_message: Bytes::from_static(b"hello"),
            ..SubmitSm::default()
        }
    }

    #[test]
    fn submit_sm_roundtrip() {
        let original = sample();
        assert_eq!(roundtrip(&original), original);
    }

    #[test]
    fn submit_sm_roundtrip_with_tlvs() {
        let mut original = sample();
        original.tlvs.push(Tlv::new(
            crate::datatypes::tlv::tags::USER_MESSAGE_REFERENCE,
            Bytes::from_static(&[0x00, 0x07]),
        ));
        // unknown vendor tag must survive untouched
        original
            .tlvs
            .push(Tlv::new(0x1501, Bytes::from_static(&[0xDE, 0xAD])));
        assert_eq!(roundtrip(&original), original);
    }

    #[test]
    fn submit_sm_roundtrip_binary_body() {
        let mut original = sample();
        original.data_coding = 0x08;
        // UCS-2 payload with embedded zero bytes
        original.short_message = Bytes::from_static(&[0x00, 0x68, 0x00, 0x69, 0x09, 0x28]);
        assert_eq!(roundtrip(&original), original);
    }

    #[test]
    fn oversized_short_message_fails_validation() {
        let mut pdu = sample();
        pdu.short_message = Bytes::from(vec![0x41; 255]);
        assert!(pdu.to_bytes().is_err());
    }

    #[test]
    fn oversized_address_fails_validation() {
        let mut pdu = sample();
        pdu.destination_addr = "123456789012345678901".into();
        assert!(pdu.to_bytes().is_err());
    }

    #[test]
    fn submit_sm_response_roundtrip() {
        let original = SubmitSmResponse::new(5, "ab-12-cd");
        assert_eq!(roundtrip(&original), original);
    }

    #[test]
    fn submit_sm_response_nak_roundtrip() {
        let original = SubmitSmResponse::error(6, CommandStatus::InvalidDestinationAddress);
        let decoded = roundtrip(&original);
        assert_eq!(
            decoded.command_status,
            CommandStatus::InvalidDestinationAddress
        );
        assert!(decoded.message_id.is_empty());
    }
}
