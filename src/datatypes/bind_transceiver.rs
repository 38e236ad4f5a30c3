use bytes::{Buf, BytesMut};
use std::io::Cursor;

use crate::codec::{
    decode_cstring, decode_u8, encode_cstring, finish_length, CodecError, Decodable, Encodable,
    PduHeader,
};
use crate::datatypes::{CommandId, CommandStatus, Tlv, INTERFACE_VERSION};

/// Session-establishment handshake for a transceiver bind: the ESME
/// authenticates and gains both submit and deliver capability on one
/// connection (Section 4.2.5).
#[derive(Clone, Debug, PartialEq)]
pub struct BindTransceiver {
    pub command_status: CommandStatus,
    pub sequence_number: u32,

    /// Identifies the ESME to the SMSC. Max 15 chars (16 with terminator).
    pub system_id: String,
    /// Authentication password. Max 8 chars (9 with terminator).
    pub password: String,
    /// Categorizes the ESME (e.g. "VMS", "OTA"). Max 12 chars.
    pub system_type: String,
    /// SMPP version the ESME speaks; 0x34 for this runtime.
    pub interface_version: u8,
    pub addr_ton: u8,
    pub addr_npi: u8,
    /// Address range the ESME serves when receiving. Usually empty.
    pub address_range: String,
}

impl BindTransceiver {
    pub fn new(sequence_number: u32, system_id: &str, password: &str, system_type: &str) -> Self {
        Self {
            command_status: CommandStatus::Ok,
            sequence_number,
            system_id: system_id.to_string(),
            password: password.to_string(),
            system_type: system_type.to_string(),
            interface_version: INTERFACE_VERSION,
            addr_ton: 0,
            addr_npi: 0,
            address_range: String::new(),
        }
    }
}

impl Encodable for BindTransceiver {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        let start = buf.len();
        PduHeader {
            command_length: 0,
            command_id: CommandId::BindTransceiver,
            command_status: self.command_status,
            sequence_number: self.sequence_number,
        }
        .encode(buf);

        encode_cstring(buf, &self.system_id, 16);
        encode_cstring(buf, &self.password, 9);
        encode_cstring(buf, &self.system_type, 13);
        buf.extend_from_slice(&[self.interface_version, self.addr_ton, self.addr_npi]);
        encode_cstring(buf, &self.address_range, 41);

        finish_length(buf, start);
        Ok(())
    }
}

impl Decodable for BindTransceiver {
    fn command_id() -> CommandId {
        CommandId::BindTransceiver
    }

    fn decode(header: PduHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        Self::validate_header(&header)?;

        Ok(Self {
            command_status: header.command_status,
            sequence_number: header.sequence_number,
            system_id: decode_cstring(buf, 16, "system_id")?,
            password: decode_cstring(buf, 9, "password")?,
            system_type: decode_cstring(buf, 13, "system_type")?,
            interface_version: decode_u8(buf, "interface_version")?,
            addr_ton: decode_u8(buf, "addr_ton")?,
            addr_npi: decode_u8(buf, "addr_npi")?,
            address_range: decode_cstring(buf, 41, "address_range")?,
        })
    }
}

/// Response to bind_transceiver. A failed bind may arrive with an empty body;
/// the system_id then decodes as empty.
#[derive(Clone, Debug, PartialEq)]
pub struct BindTransceiverResponse {
    pub command_status: CommandStatus,
    pub sequence_number: u32,

    /// SMSC identifier.
    pub system_id: String,
    /// Optional parameters (sc_interface_version).
    pub tlvs: Vec<Tlv>,
}

impl BindTransceiverResponse {
    pub fn new(sequence_number: u32, system_id: &str) -> Self {
        Self {
            command_status: CommandStatus::Ok,
            sequence_number,
            system_id: system_id.to_string(),
            tlvs: Vec::new(),
        }
    }

    pub fn error(sequence_number: u32, status: CommandStatus) -> Self {
        Self {
            command_status: status,
            sequence_number,
            system_id: String::new(),
            tlvs: Vec::new(),
        }
    }
}

impl Encodable for BindTransceiverResponse {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        let start = buf.len();
        PduHeader {
            command_length: 0,
            command_id: CommandId::BindTransceiverResp,
            command_status: self.command_status,
            sequence_number: self.sequence_number,
        }
        .encode(buf);

        encode_cstring(buf, &self.system_id, 16);
        for tlv in &self.tlvs {
            tlv.encode(buf);
        }

        finish_length(buf, start);
        Ok(())
    }
}

impl Decodable for BindTransceiverResponse {
    fn command_id() -> CommandId {
        CommandId::BindTransceiverResp
    }

    fn decode(header: PduHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        Self::validate_header(&header)?;

        let system_id = if buf.has_remaining() {
            decode_cstring(buf, 16, "system_id")?
        } else {
            String::new()
        };
        let tlvs = Tlv::decode_all(buf)?;

        Ok(Self {
            command_status: header.command_status,
            sequence_number: header.sequence_number,
            system_id,
            tlvs,
        })
    }
}
