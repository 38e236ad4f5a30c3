use bytes::{Buf, Bytes, BytesMut};
use std::io::Cursor;

use crate::codec::{
    decode_cstring, decode_u8, encode_cstring, finish_length, CodecError, Decodable, Encodable,
    PduHeader,
};
use crate::datatypes::{CommandId, CommandStatus, Tlv};
use crate::receipt::DeliveryReceipt;

/// Delivers a mobile-originated message or a delivery receipt from the SMSC
/// to the ESME (Section 4.6.1). Shares the submit_sm mandatory field list.
///
/// Delivery receipts are recognizable by esm_class bit 0x04 and carry the
/// keyed `id:... stat:... err:...` text in `short_message`.
#[derive(Clone, Debug, PartialEq)]
pub struct DeliverSm {
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
    /// Not used for deliver_sm; NULL on the wire.
    pub schedule_delivery_time: String,
    /// Not used for deliver_sm; NULL on the wire.
    pub validity_period: String,
    pub registered_delivery: u8,
    pub replace_if_present_flag: u8,
    pub data_coding: u8,
    pub sm_default_msg_id: u8,
    pub short_message: Bytes,

    pub tlvs: Vec<Tlv>,
}

/// esm_class bit marking a PDU that contains an SMSC delivery receipt.
pub const ESM_CLASS_DELIVERY_RECEIPT: u8 = 0x04;

impl Default for DeliverSm {
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

impl DeliverSm {
    pub fn is_delivery_receipt(&self) -> bool {
        self.esm_class & ESM_CLASS_DELIVERY_RECEIPT != 0
    }

    /// Parse the short_message body as a delivery receipt. Tolerant: returns
    /// whatever keys were present, never an error, because the keyed format
    /// is convention rather than contract.
    pub fn receipt(&self) -> DeliveryReceipt {
        DeliveryReceipt::parse(&String::from_utf8_lossy(&self.short_message))
    }
}

impl Encodable for DeliverSm {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        if self.short_message.len() > 254 {
            return Err(CodecError::FieldValidation {
                field: "short_message",
                reason: format!("exceeds 254 octets: {}", self.short_message.len()),
            });
        }

        let start = buf.len();
        PduHeader {
            command_length: 0,
            command_id: CommandId::DeliverSm,
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

impl Decodable for DeliverSm {
    fn command_id() -> CommandId {
        CommandId::DeliverSm
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

/// Response to deliver_sm; the message_id field is unused and NULL.
#[derive(Clone, Debug, PartialEq)]
pub struct DeliverSmResponse {
    pub command_status: CommandStatus,
    pub sequence_number: u32,

    pub message_id: String,
}

impl DeliverSmResponse {
    pub fn new(sequence_number: u32) -> Self {
        Self {
            command_status: CommandStatus::Ok,
            sequence_number,
            message_id: String::new(),
        }
    }
}

impl Encodable for DeliverSmResponse {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        let start = buf.len();
        PduHeader {
            command_length: 0,
            command_id: CommandId::DeliverSmResp,
            command_status: self.command_status,
            sequence_number: self.sequence_number,
        }
        .encode(buf);

        encode_cstring(buf, &self.message_id, 65);

        finish_length(buf, start);
        Ok(())
    }
}

impl Decodable for DeliverSmResponse {
    fn command_id() -> CommandId {
        CommandId::DeliverSmResp
    }

    fn decode(header: PduHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        Self::validate_header(&header)?;

        let message_id = if buf.has_remaining() {
            decode_cstring(buf, 65, "message_id")?
        } else {
            String::new()
        };

        Ok(Self {
            command_status: header.command_status,
            sequence_number: header.sequence_number,
            message_id,
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
        let mut body = Cursor::new(&bytes.as_ref()[PduHeader::SIZE..]);
        T::decode(header, &mut body).unwrap()
    }

    fn receipt_pdu() -> DeliverSm {
        DeliverSm {
            sequence_number: 11,
            source_addr: "15551234".into(),
            destination_addr: "Acme".into(),
            esm_class: ESM_CLASS_DELIVERY_RECEIPT,
            short_message: Bytes::from_static(
                b"id:ab12 sub:001 dlvrd:001 submit date:2402141200 done date:2402141201 stat:DELIVRD err:000 text:hi",
            ),
            ..DeliverSm::default()
        }
    }

    #[test]
    fn deliver_sm_roundtrip() {
        let original = receipt_pdu();
        assert_eq!(roundtrip(&original), original);
    }

    #[test]
    fn delivery_receipt_detection_and_parse() {
        let pdu = receipt_pdu();
        assert!(pdu.is_delivery_receipt());

        let receipt = pdu.receipt();
        assert_eq!(receipt.id, "ab12");
        assert!(receipt.stat.is_success());
    }

    #[test]
    fn deliver_sm_response_roundtrip() {
        let original = DeliverSmResponse::new(11);
        assert_eq!(roundtrip(&original), original);
    }
}
