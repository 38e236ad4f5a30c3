use bytes::{Buf, BytesMut};
use std::io::Cursor;

use crate::codec::{
    decode_cstring, decode_u8, encode_cstring, finish_length, CodecError, Decodable, Encodable,
    PduHeader,
};
use crate::datatypes::{CommandId, CommandStatus};

/// Queries the state of a previously submitted message (Section 4.8.1).
/// The source address must match the original submit_sm.
#[derive(Clone, Debug, PartialEq)]
pub struct QuerySm {
    pub command_status: CommandStatus,
    pub sequence_number: u32,

    pub message_id: String,
    pub source_addr_ton: u8,
    pub source_addr_npi: u8,
    pub source_addr: String,
}

impl QuerySm {
    pub fn new(sequence_number: u32, message_id: &str, source_addr: &str) -> Self {
        Self {
            command_status: CommandStatus::Ok,
            sequence_number,
            message_id: message_id.to_string(),
            source_addr_ton: 0,
            source_addr_npi: 0,
            source_addr: source_addr.to_string(),
        }
    }
}

impl Encodable for QuerySm {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        let start = buf.len();
        PduHeader {
            command_length: 0,
            command_id: CommandId::QuerySm,
            command_status: self.command_status,
            sequence_number: self.sequence_number,
        }
        .encode(buf);

        encode_cstring(buf, &self.message_id, 65);
        buf.extend_from_slice(&[self.source_addr_ton, self.source_addr_npi]);
        encode_cstring(buf, &self.source_addr, 21);

        finish_length(buf, start);
        Ok(())
    }
}

impl Decodable for QuerySm {
    fn command_id() -> CommandId {
        CommandId::QuerySm
    }

    fn decode(header: PduHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        Self::validate_header(&header)?;

        Ok(Self {
            command_status: header.command_status,
            sequence_number: header.sequence_number,
            message_id: decode_cstring(buf, 65, "message_id")?,
            source_addr_ton: decode_u8(buf, "source_addr_ton")?,
            source_addr_npi: decode_u8(buf, "source_addr_npi")?,
            source_addr: decode_cstring(buf, 21, "source_addr")?,
        })
    }
}

/// Message states reported in query_sm_resp (Section 5.2.28).
pub mod message_state {
    pub const ENROUTE: u8 = 1;
    pub const DELIVERED: u8 = 2;
    pub const EXPIRED: u8 = 3;
    pub const DELETED: u8 = 4;
    pub const UNDELIVERABLE: u8 = 5;
    pub const ACCEPTED: u8 = 6;
    pub const UNKNOWN: u8 = 7;
    pub const REJECTED: u8 = 8;
}

/// Response to query_sm. `final_date` is NULL while the message is still
/// in flight.
#[derive(Clone, Debug, PartialEq)]
pub struct QuerySmResponse {
    pub command_status: CommandStatus,
    pub sequence_number: u32,

    pub message_id: String,
    pub final_date: String,
    pub message_state: u8,
    pub error_code: u8,
}

impl QuerySmResponse {
    pub fn new(sequence_number: u32, message_id: &str, state: u8) -> Self {
        Self {
            command_status: CommandStatus::Ok,
            sequence_number,
            message_id: message_id.to_string(),
            final_date: String::new(),
            message_state: state,
            error_code: 0,
        }
    }
}

impl Encodable for QuerySmResponse {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        let start = buf.len();
        PduHeader {
            command_length: 0,
            command_id: CommandId::QuerySmResp,
            command_status: self.command_status,
            sequence_number: self.sequence_number,
        }
        .encode(buf);

        encode_cstring(buf, &self.message_id, 65);
        encode_cstring(buf, &self.final_date, 17);
        buf.extend_from_slice(&[self.message_state, self.error_code]);

        finish_length(buf, start);
        Ok(())
    }
}

impl Decodable for QuerySmResponse {
    fn command_id() -> CommandId {
        CommandId::QuerySmResp
    }

    fn decode(header: PduHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        Self::validate_header(&header)?;

        if !buf.has_remaining() {
            // NAKed queries may come back header-only
            return Ok(Self {
                command_status: header.command_status,
                sequence_number: header.sequence_number,
                message_id: String::new(),
                final_date: String::new(),
                message_state: 0,
                error_code: 0,
            });
        }

        Ok(Self {
            command_status: header.command_status,
            sequence_number: header.sequence_number,
            message_id: decode_cstring(buf, 65, "message_id")?,
            final_date: decode_cstring(buf, 17, "final_date")?,
            message_state: decode_u8(buf, "message_state")?,
            error_code: decode_u8(buf, "error_code")?,
        })
    }
}
