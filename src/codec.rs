// SMPP v3.4 codec - separates the wire format from the PDU domain models.
//
// Every PDU implements the Encodable/Decodable traits rather than living in
// one monolithic frame parser. The PduRegistry maps command ids to decoders
// so the read path stays extensible.

use crate::datatypes::{CommandId, CommandStatus};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::HashMap;
use std::io::Cursor;
use thiserror::Error;

/// Maximum allowed PDU size, inclusive of the 16-byte header.
pub const MAX_PDU_SIZE: u32 = 69632;

/// SMPP v3.4 PDU header (16 bytes, common to all PDUs).
#[derive(Debug, Clone, PartialEq)]
pub struct PduHeader {
    pub command_length: u32,
    pub command_id: CommandId,
    pub command_status: CommandStatus,
    pub sequence_number: u32,
}

impl PduHeader {
    pub const SIZE: usize = 16;

    /// Decode a PDU header from the buffer, validating length bounds and
    /// reserved sequence numbers.
    pub fn decode(buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        if buf.remaining() < Self::SIZE {
            return Err(CodecError::Incomplete);
        }

        let command_length = buf.get_u32();
        let command_id_raw = buf.get_u32();
        let command_id = CommandId::try_from(command_id_raw)
            .map_err(|_| CodecError::InvalidCommandId(command_id_raw))?;
        let command_status = CommandStatus::from(buf.get_u32());
        let sequence_number = buf.get_u32();

        if command_length < Self::SIZE as u32 || command_length > MAX_PDU_SIZE {
            return Err(CodecError::InvalidPduLength {
                length: command_length,
                min: Self::SIZE as u32,
                max: MAX_PDU_SIZE,
            });
        }

        // 0 and 0xFFFFFFFF are reserved by the allocator contract.
        if sequence_number == 0 || sequence_number == u32::MAX {
            return Err(CodecError::ReservedSequenceNumber(sequence_number));
        }

        Ok(PduHeader {
            command_length,
            command_id,
            command_status,
            sequence_number,
        })
    }

    /// Encode the header to the buffer.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.command_length);
        buf.put_u32(self.command_id as u32);
        buf.put_u32(u32::from(self.command_status));
        buf.put_u32(self.sequence_number);
    }
}

/// Types that can be encoded to their binary PDU form.
///
/// `encode` appends a complete PDU (header included) to `buf`; the
/// command_length field is patched in place once the body size is known, so
/// encoding into a shared buffer is safe.
pub trait Encodable {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError>;

    /// Convenience: encode into a fresh buffer and freeze it.
    fn to_bytes(&self) -> Result<Bytes, CodecError> {
        let mut buf = BytesMut::new();
        self.encode(&mut buf)?;
        Ok(buf.freeze())
    }
}

/// Types that can be decoded from a PDU body.
///
/// `decode` receives a cursor scoped to exactly the PDU body
/// (`command_length - 16` bytes), so decoders that consume "until
/// end-of-PDU" (TLV tails) cannot run into the next frame.
pub trait Decodable: Sized {
    fn decode(header: PduHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError>;

    /// The command_id this PDU type answers to.
    fn command_id() -> CommandId;

    fn validate_header(header: &PduHeader) -> Result<(), CodecError> {
        if header.command_id != Self::command_id() {
            return Err(CodecError::UnexpectedCommandId {
                expected: Self::command_id(),
                actual: header.command_id,
            });
        }
        Ok(())
    }
}

/// Codec errors with enough context to debug a misbehaving peer.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("incomplete PDU: need more data")]
    Incomplete,

    #[error("invalid command_id: {0:#010x}")]
    InvalidCommandId(u32),

    #[error("invalid PDU length: {length}, must be {min}-{max}")]
    InvalidPduLength { length: u32, min: u32, max: u32 },

    #[error("reserved sequence number: {0}")]
    ReservedSequenceNumber(u32),

    #[error("unexpected command_id: expected {expected:?}, got {actual:?}")]
    UnexpectedCommandId {
        expected: CommandId,
        actual: CommandId,
    },

    #[error("field '{field}' validation failed: {reason}")]
    FieldValidation { field: &'static str, reason: String },

    #[error("UTF-8 decoding error in field '{field}': {source}")]
    Utf8Error {
        field: &'static str,
        #[source]
        source: std::string::FromUtf8Error,
    },

    #[error("cannot serialize an unknown PDU")]
    UnknownPdu,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Patch the command_length of a PDU that was encoded starting at `start`.
pub(crate) fn finish_length(buf: &mut BytesMut, start: usize) {
    let length = (buf.len() - start) as u32;
    buf[start..start + 4].copy_from_slice(&length.to_be_bytes());
}

/// Decode a variable-length null-terminated C-string, bounded by `max_len`
/// (terminator included). Consumes the terminator.
pub fn decode_cstring(
    buf: &mut Cursor<&[u8]>,
    max_len: usize,
    field: &'static str,
) -> Result<String, CodecError> {
    let start = buf.position() as usize;
    let data = *buf.get_ref();
    let limit = data.len().saturating_sub(start).min(max_len);
    let slice = &data[start..start + limit];

    let end = slice
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| CodecError::FieldValidation {
            field,
            reason: format!("missing null terminator within {max_len} bytes"),
        })?;

    let value = String::from_utf8(slice[..end].to_vec())
        .map_err(|source| CodecError::Utf8Error { field, source })?;
    buf.set_position((start + end + 1) as u64);
    Ok(value)
}

pub fn decode_u8(buf: &mut Cursor<&[u8]>, field: &'static str) -> Result<u8, CodecError> {
    if buf.remaining() < 1 {
        return Err(CodecError::FieldValidation {
            field,
            reason: "truncated".into(),
        });
    }
    Ok(buf.get_u8())
}

/// Encode a C-string: content truncated to `max_len - 1`, then a single NUL.
/// No padding; SMPP C-strings are variable length on the wire.
pub fn encode_cstring(buf: &mut BytesMut, value: &str, max_len: usize) {
    let bytes = value.as_bytes();
    let actual = bytes.len().min(max_len - 1);
    buf.put_slice(&bytes[..actual]);
    buf.put_u8(0);
}

/// Generic frame type over every PDU this runtime speaks.
#[derive(Debug)]
pub enum Frame {
    BindTransceiver(crate::datatypes::BindTransceiver),
    BindTransceiverResp(crate::datatypes::BindTransceiverResponse),

    Unbind(crate::datatypes::Unbind),
    UnbindResp(crate::datatypes::UnbindResponse),

    EnquireLink(crate::datatypes::EnquireLink),
    EnquireLinkResp(crate::datatypes::EnquireLinkResponse),

    SubmitSm(Box<crate::datatypes::SubmitSm>),
    SubmitSmResp(crate::datatypes::SubmitSmResponse),

    DeliverSm(Box<crate::datatypes::DeliverSm>),
    DeliverSmResp(crate::datatypes::DeliverSmResponse),

    QuerySm(crate::datatypes::QuerySm),
    QuerySmResp(crate::datatypes::QuerySmResponse),

    GenericNack(crate::datatypes::GenericNack),

    /// Known command id with no registered decoder (e.g. alert_notification).
    Unknown { header: PduHeader, body: Bytes },
}

impl Frame {
    pub fn command_id(&self) -> CommandId {
        match self {
            Frame::BindTransceiver(_) => CommandId::BindTransceiver,
            Frame::BindTransceiverResp(_) => CommandId::BindTransceiverResp,
            Frame::Unbind(_) => CommandId::Unbind,
            Frame::UnbindResp(_) => CommandId::UnbindResp,
            Frame::EnquireLink(_) => CommandId::EnquireLink,
            Frame::EnquireLinkResp(_) => CommandId::EnquireLinkResp,
            Frame::SubmitSm(_) => CommandId::SubmitSm,
            Frame::SubmitSmResp(_) => CommandId::SubmitSmResp,
            Frame::DeliverSm(_) => CommandId::DeliverSm,
            Frame::DeliverSmResp(_) => CommandId::DeliverSmResp,
            Frame::QuerySm(_) => CommandId::QuerySm,
            Frame::QuerySmResp(_) => CommandId::QuerySmResp,
            Frame::GenericNack(_) => CommandId::GenericNack,
            Frame::Unknown { header, .. } => header.command_id,
        }
    }

    pub fn sequence_number(&self) -> u32 {
        match self {
            Frame::BindTransceiver(pdu) => pdu.sequence_number,
            Frame::BindTransceiverResp(pdu) => pdu.sequence_number,
            Frame::Unbind(pdu) => pdu.sequence_number,
            Frame::UnbindResp(pdu) => pdu.sequence_number,
            Frame::EnquireLink(pdu) => pdu.sequence_number,
            Frame::EnquireLinkResp(pdu) => pdu.sequence_number,
            Frame::SubmitSm(pdu) => pdu.sequence_number,
            Frame::SubmitSmResp(pdu) => pdu.sequence_number,
            Frame::DeliverSm(pdu) => pdu.sequence_number,
            Frame::DeliverSmResp(pdu) => pdu.sequence_number,
            Frame::QuerySm(pdu) => pdu.sequence_number,
            Frame::QuerySmResp(pdu) => pdu.sequence_number,
            Frame::GenericNack(pdu) => pdu.sequence_number,
            Frame::Unknown { header, .. } => header.sequence_number,
        }
    }

    /// Overwrite the sequence number before the frame goes out.
    pub fn set_sequence_number(&mut self, seq: u32) {
        match self {
            Frame::BindTransceiver(pdu) => pdu.sequence_number = seq,
            Frame::BindTransceiverResp(pdu) => pdu.sequence_number = seq,
            Frame::Unbind(pdu) => pdu.sequence_number = seq,
            Frame::UnbindResp(pdu) => pdu.sequence_number = seq,
            Frame::EnquireLink(pdu) => pdu.sequence_number = seq,
            Frame::EnquireLinkResp(pdu) => pdu.sequence_number = seq,
            Frame::SubmitSm(pdu) => pdu.sequence_number = seq,
            Frame::SubmitSmResp(pdu) => pdu.sequence_number = seq,
            Frame::DeliverSm(pdu) => pdu.sequence_number = seq,
            Frame::DeliverSmResp(pdu) => pdu.sequence_number = seq,
            Frame::QuerySm(pdu) => pdu.sequence_number = seq,
            Frame::QuerySmResp(pdu) => pdu.sequence_number = seq,
            Frame::GenericNack(pdu) => pdu.sequence_number = seq,
            Frame::Unknown { header, .. } => header.sequence_number = seq,
        }
    }

    pub fn is_response(&self) -> bool {
        self.command_id().is_response()
    }

    /// Serialize the frame to its binary form.
    pub fn to_bytes(&self) -> Result<Bytes, CodecError> {
        match self {
            Frame::BindTransceiver(pdu) => pdu.to_bytes(),
            Frame::BindTransceiverResp(pdu) => pdu.to_bytes(),
            Frame::Unbind(pdu) => pdu.to_bytes(),
            Frame::UnbindResp(pdu) => pdu.to_bytes(),
            Frame::EnquireLink(pdu) => pdu.to_bytes(),
            Frame::EnquireLinkResp(pdu) => pdu.to_bytes(),
            Frame::SubmitSm(pdu) => pdu.to_bytes(),
            Frame::SubmitSmResp(pdu) => pdu.to_bytes(),
            Frame::DeliverSm(pdu) => pdu.to_bytes(),
            Frame::DeliverSmResp(pdu) => pdu.to_bytes(),
            Frame::QuerySm(pdu) => pdu.to_bytes(),
            Frame::QuerySmResp(pdu) => pdu.to_bytes(),
            Frame::GenericNack(pdu) => pdu.to_bytes(),
            Frame::Unknown { .. } => Err(CodecError::UnknownPdu),
        }
    }
}

type DecoderFn =
    Box<dyn Fn(PduHeader, &mut Cursor<&[u8]>) -> Result<Frame, CodecError> + Send + Sync>;

/// Registry of PDU decoders, keyed by command id.
pub struct PduRegistry {
    decoders: HashMap<CommandId, DecoderFn>,
}

impl PduRegistry {
    /// Registry with every PDU the transceiver runtime speaks, both
    /// directions (the test fakes reuse it server-side).
    pub fn new() -> Self {
        use crate::datatypes::*;

        let mut registry = Self {
            decoders: HashMap::new(),
        };

        registry.register::<EnquireLink, _>(Frame::EnquireLink);
        registry.register::<EnquireLinkResponse, _>(Frame::EnquireLinkResp);
        registry.register::<Unbind, _>(Frame::Unbind);
        registry.register::<UnbindResponse, _>(Frame::UnbindResp);
        registry.register::<GenericNack, _>(Frame::GenericNack);

        registry.register::<BindTransceiver, _>(Frame::BindTransceiver);
        registry.register::<BindTransceiverResponse, _>(Frame::BindTransceiverResp);

        registry.register::<SubmitSm, _>(|pdu| Frame::SubmitSm(Box::new(pdu)));
        registry.register::<SubmitSmResponse, _>(Frame::SubmitSmResp);
        registry.register::<DeliverSm, _>(|pdu| Frame::DeliverSm(Box::new(pdu)));
        registry.register::<DeliverSmResponse, _>(Frame::DeliverSmResp);

        registry.register::<QuerySm, _>(Frame::QuerySm);
        registry.register::<QuerySmResponse, _>(Frame::QuerySmResp);

        registry
    }

    fn register<T, F>(&mut self, frame_constructor: F)
    where
        T: Decodable + 'static,
        F: Fn(T) -> Frame + Send + Sync + 'static,
    {
        let decoder = Box::new(move |header: PduHeader, buf: &mut Cursor<&[u8]>| {
            let pdu = T::decode(header, buf)?;
            Ok(frame_constructor(pdu))
        });
        self.decoders.insert(T::command_id(), decoder);
    }

    /// Decode a PDU body given its already-decoded header. `buf` must span
    /// exactly the body. Ids without a decoder come back as `Frame::Unknown`
    /// for forward compatibility.
    pub fn decode_pdu(
        &self,
        header: PduHeader,
        buf: &mut Cursor<&[u8]>,
    ) -> Result<Frame, CodecError> {
        match self.decoders.get(&header.command_id) {
            Some(decoder) => decoder(header, buf),
            None => {
                let body = buf.copy_to_bytes(buf.remaining());
                tracing::warn!(
                    command_id = format_args!("{:#010x}", header.command_id as u32),
                    "no decoder registered, treating PDU as opaque"
                );
                Ok(Frame::Unknown { header, body })
            }
        }
    }

    pub fn is_registered(&self, command_id: CommandId) -> bool {
        self.decoders.contains_key(&command_id)
    }
}

impl Default for PduRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::{EnquireLink, EnquireLinkResponse, GenericNack, Unbind};

    #[test]
    fn pdu_header_roundtrip() {
        let header = PduHeader {
            command_length: 24,
            command_id: CommandId::EnquireLink,
            command_status: CommandStatus::Ok,
            sequence_number: 42,
        };

        let mut buf = BytesMut::new();
        header.encode(&mut buf);

        let mut cursor = Cursor::new(buf.as_ref());
        let decoded = PduHeader::decode(&mut cursor).unwrap();
        assert_eq!(header, decoded);
    }

    #[test]
    fn pdu_header_rejects_bad_length() {
        let mut data = vec![];
        data.extend_from_slice(&8u32.to_be_bytes()); // < header size
        data.extend_from_slice(&0x15u32.to_be_bytes());
        data.extend_from_slice(&0u32.to_be_bytes());
        data.extend_from_slice(&1u32.to_be_bytes());

        let mut cursor = Cursor::new(data.as_slice());
        assert!(matches!(
            PduHeader::decode(&mut cursor),
            Err(CodecError::InvalidPduLength { .. })
        ));
    }

    #[test]
    fn pdu_header_rejects_oversize() {
        let mut data = vec![];
        data.extend_from_slice(&(MAX_PDU_SIZE + 1).to_be_bytes());
        data.extend_from_slice(&0x15u32.to_be_bytes());
        data.extend_from_slice(&0u32.to_be_bytes());
        data.extend_from_slice(&1u32.to_be_bytes());

        let mut cursor = Cursor::new(data.as_slice());
        assert!(matches!(
            PduHeader::decode(&mut cursor),
            Err(CodecError::InvalidPduLength { .. })
        ));
    }

    #[test]
    fn pdu_header_rejects_reserved_sequence() {
        let mut data = vec![];
        data.extend_from_slice(&16u32.to_be_bytes());
        data.extend_from_slice(&0x15u32.to_be_bytes());
        data.extend_from_slice(&0u32.to_be_bytes());
        data.extend_from_slice(&0u32.to_be_bytes()); // reserved seq

        let mut cursor = Cursor::new(data.as_slice());
        assert!(matches!(
            PduHeader::decode(&mut cursor),
            Err(CodecError::ReservedSequenceNumber(0))
        ));
    }

    #[test]
    fn cstring_roundtrip_is_variable_length() {
        let mut buf = BytesMut::new();
        encode_cstring(&mut buf, "hello", 10);
        assert_eq!(buf.as_ref(), b"hello\0");

        let mut cursor = Cursor::new(buf.as_ref());
        let decoded = decode_cstring(&mut cursor, 10, "test").unwrap();
        assert_eq!(decoded, "hello");
        assert_eq!(cursor.position(), 6);
    }

    #[test]
    fn cstring_truncates_to_field_max() {
        let mut buf = BytesMut::new();
        encode_cstring(&mut buf, "abcdefghij", 6);
        assert_eq!(buf.as_ref(), b"abcde\0");
    }

    #[test]
    fn cstring_missing_terminator_is_an_error() {
        let data = b"abcdef";
        let mut cursor = Cursor::new(&data[..]);
        assert!(matches!(
            decode_cstring(&mut cursor, 4, "test"),
            Err(CodecError::FieldValidation { field: "test", .. })
        ));
    }

    #[test]
    fn registry_decodes_header_only_pdus() {
        let registry = PduRegistry::new();

        for (bytes, expect_id) in [
            (
                EnquireLink::new(1).to_bytes().unwrap(),
                CommandId::EnquireLink,
            ),
            (Unbind::new(2).to_bytes().unwrap(), CommandId::Unbind),
            (
                GenericNack::error(3, CommandStatus::InvalidCommandId)
                    .to_bytes()
                    .unwrap(),
                CommandId::GenericNack,
            ),
        ] {
            let mut cursor = Cursor::new(bytes.as_ref());
            let header = PduHeader::decode(&mut cursor).unwrap();
            let mut body = Cursor::new(&bytes.as_ref()[PduHeader::SIZE..]);
            let frame = registry.decode_pdu(header, &mut body).unwrap();
            assert_eq!(frame.command_id(), expect_id);
        }
    }

    #[test]
    fn registry_preserves_unknown_pdu_body() {
        let registry = PduRegistry::new();
        // alert_notification is a known id without a registered decoder
        let header = PduHeader {
            command_length: 20,
            command_id: CommandId::AlertNotification,
            command_status: CommandStatus::Ok,
            sequence_number: 9,
        };
        let body = [0x01u8, 0x02, 0x03, 0x04];
        let mut cursor = Cursor::new(&body[..]);

        match registry.decode_pdu(header, &mut cursor).unwrap() {
            Frame::Unknown { header, body } => {
                assert_eq!(header.command_id, CommandId::AlertNotification);
                assert_eq!(body.as_ref(), &[0x01, 0x02, 0x03, 0x04]);
            }
            other => panic!("expected Unknown frame, got {other:?}"),
        }
    }

    #[test]
    fn frame_accessors() {
        let mut frame = Frame::EnquireLink(EnquireLink::new(42));
        assert_eq!(frame.command_id(), CommandId::EnquireLink);
        assert_eq!(frame.sequence_number(), 42);
        assert!(!frame.is_response());

        frame.set_sequence_number(43);
        assert_eq!(frame.sequence_number(), 43);

        let frame = Frame::EnquireLinkResp(EnquireLinkResponse::new(7));
        assert!(frame.is_response());
    }
}
