use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io::Cursor;

use crate::codec::CodecError;

/// TLV tag constants used by this runtime. The registry decodes any tag; the
/// constants just name the ones we read or write ourselves.
pub mod tags {
    pub const USER_MESSAGE_REFERENCE: u16 = 0x0204;
    pub const SAR_MSG_REF_NUM: u16 = 0x020C;
    pub const SAR_TOTAL_SEGMENTS: u16 = 0x020E;
    pub const SAR_SEGMENT_SEQNUM: u16 = 0x020F;
    pub const SC_INTERFACE_VERSION: u16 = 0x0210;
    pub const NETWORK_ERROR_CODE: u16 = 0x0423;
    pub const MESSAGE_PAYLOAD: u16 = 0x0424;
    pub const MORE_MESSAGES_TO_SEND: u16 = 0x0426;
    pub const RECEIPTED_MESSAGE_ID: u16 = 0x001E;
    pub const MESSAGE_STATE: u16 = 0x0427;
}

/// A tag-length-value optional parameter. Unknown tags round-trip verbatim:
/// the decoder never interprets the value and the encoder writes exactly what
/// was read.
#[derive(Clone, Debug, PartialEq)]
pub struct Tlv {
    /// Identifies the optional parameter.
    pub tag: u16,

    /// Length of the value field in octets, excluding tag and length.
    pub length: u16,

    /// Raw parameter data.
    pub value: Bytes,
}

impl Tlv {
    /// TLV with the length derived from the value.
    pub fn new(tag: u16, value: impl Into<Bytes>) -> Self {
        let value = value.into();
        Self {
            tag,
            length: value.len() as u16,
            value,
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.tag);
        buf.put_u16(self.length);
        buf.extend_from_slice(&self.value);
    }

    pub fn encoded_size(&self) -> usize {
        4 + self.value.len()
    }

    pub fn decode(buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        if buf.remaining() < 4 {
            return Err(CodecError::FieldValidation {
                field: "tlv",
                reason: "truncated tag/length".into(),
            });
        }

        let tag = buf.get_u16();
        let length = buf.get_u16();

        if buf.remaining() < length as usize {
            return Err(CodecError::FieldValidation {
                field: "tlv",
                reason: format!("value truncated: need {length} bytes"),
            });
        }

        let value = buf.copy_to_bytes(length as usize);
        Ok(Self { tag, length, value })
    }

    /// Decode TLVs until the cursor is exhausted, preserving order.
    pub fn decode_all(buf: &mut Cursor<&[u8]>) -> Result<Vec<Self>, CodecError> {
        let mut tlvs = Vec::new();
        while buf.has_remaining() {
            tlvs.push(Self::decode(buf)?);
        }
        Ok(tlvs)
    }
}

/// Look up a TLV by tag in an ordered parameter list.
pub fn find_tlv(tlvs: &[Tlv], tag: u16) -> Option<&Tlv> {
    tlvs.iter().find(|tlv| tlv.tag == tag)
}
