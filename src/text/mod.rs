//! Message-body codecs and long-message segmentation.
//!
//! Coding detection tries GSM7 first, then Latin-1, then falls back to
//! UCS-2 (UTF-16BE). GSM7 here means the ASCII-representable subset of the
//! GSM 03.38 alphabet carried as unpacked septets; text with accented GSM
//! specials deliberately selects Latin-1 instead, matching the behavior the
//! delivery pipeline was built against.
//!
//! A body longer than its coding's single-PDU limit is split into segments,
//! each prefixed with a 6-byte concatenation UDH (`05 00 03 REF TOTAL IDX`)
//! and submitted as an independent submit_sm with esm_class bit 0x40 set.

pub mod gsm7;

/// Single-PDU payload limit for GSM7, in septets.
pub const GSM7_SINGLE_MAX: usize = 160;
/// Per-segment payload for concatenated GSM7, in septets.
pub const GSM7_SEGMENT_MAX: usize = 153;
/// Single-PDU payload limit for 8-bit and UCS-2 codings, in octets.
pub const OCTET_SINGLE_MAX: usize = 140;
/// Per-segment payload for concatenated 8-bit and UCS-2, in octets.
pub const OCTET_SEGMENT_MAX: usize = 134;

/// Length of the concatenation UDH this runtime emits.
pub const UDH_LEN: usize = 6;

/// An encoded message body tagged with its coding.
#[derive(Clone, Debug, PartialEq)]
pub enum Codec {
    /// GSM 03.38 default alphabet, unpacked septets (data_coding 0x00).
    Gsm7(Vec<u8>),
    /// ISO-8859-1 (data_coding 0x03).
    Latin1(Vec<u8>),
    /// UCS-2 / UTF-16BE (data_coding 0x08).
    Ucs2(Vec<u8>),
    /// Octet-unspecified pass-through (data_coding 0x04). Never chosen by
    /// detection; for callers that already have encoded payloads.
    Binary(Vec<u8>),
}

impl Codec {
    /// The data_coding octet for submit_sm.
    pub fn data_coding(&self) -> u8 {
        match self {
            Codec::Gsm7(_) => 0x00,
            Codec::Latin1(_) => 0x03,
            Codec::Binary(_) => 0x04,
            Codec::Ucs2(_) => 0x08,
        }
    }

    pub fn payload(&self) -> &[u8] {
        match self {
            Codec::Gsm7(b) | Codec::Latin1(b) | Codec::Ucs2(b) | Codec::Binary(b) => b,
        }
    }

    /// Largest payload that fits a single submit_sm for this coding.
    pub fn single_limit(&self) -> usize {
        match self {
            Codec::Gsm7(_) => GSM7_SINGLE_MAX,
            _ => OCTET_SINGLE_MAX,
        }
    }

    /// Payload budget per segment once a UDH is in play.
    pub fn segment_limit(&self) -> usize {
        match self {
            Codec::Gsm7(_) => GSM7_SEGMENT_MAX,
            _ => OCTET_SEGMENT_MAX,
        }
    }

    pub fn is_long(&self) -> bool {
        self.payload().len() > self.single_limit()
    }

    /// Split the payload into UDH-prefixed segments, 1-indexed, all carrying
    /// the same 8-bit reference. Boundaries never split a GSM7 escape pair
    /// or a UTF-16 surrogate pair.
    pub fn segments(&self, reference: u8) -> Vec<Vec<u8>> {
        let payload = self.payload();
        let limit = self.segment_limit();

        let mut chunks: Vec<&[u8]> = Vec::new();
        let mut rest = payload;
        while !rest.is_empty() {
            let mut cut = limit.min(rest.len());
            if cut < rest.len() {
                match self {
                    Codec::Gsm7(_) => {
                        if rest[cut - 1] == gsm7::ESCAPE {
                            cut -= 1;
                        }
                    }
                    Codec::Ucs2(_) => {
                        cut &= !1;
                        if cut >= 2 {
                            let unit = u16::from_be_bytes([rest[cut - 2], rest[cut - 1]]);
                            if (0xD800..0xDC00).contains(&unit) {
                                cut -= 2;
                            }
                        }
                    }
                    _ => {}
                }
            }
            chunks.push(&rest[..cut]);
            rest = &rest[cut..];
        }

        let total = chunks.len() as u8;
        chunks
            .iter()
            .enumerate()
            .map(|(index, chunk)| {
                let mut segment = Vec::with_capacity(UDH_LEN + chunk.len());
                segment.extend_from_slice(&[0x05, 0x00, 0x03, reference, total, index as u8 + 1]);
                segment.extend_from_slice(chunk);
                segment
            })
            .collect()
    }
}

/// Select the densest coding that can carry `text` and report whether the
/// result needs segmentation.
pub fn find_coding(text: &str) -> (Codec, bool) {
    if let Some(septets) = gsm7::encode(text) {
        let long = septets.len() > GSM7_SINGLE_MAX;
        return (Codec::Gsm7(septets), long);
    }

    if text.chars().all(|c| (c as u32) <= 0xFF) {
        let bytes: Vec<u8> = text.chars().map(|c| c as u8).collect();
        let long = bytes.len() > OCTET_SINGLE_MAX;
        return (Codec::Latin1(bytes), long);
    }

    let bytes: Vec<u8> = text
        .encode_utf16()
        .flat_map(|unit| unit.to_be_bytes())
        .collect();
    let long = bytes.len() > OCTET_SINGLE_MAX;
    (Codec::Ucs2(bytes), long)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_ascii_is_short_gsm7() {
        let (codec, long) = find_coding("hello");
        assert!(matches!(codec, Codec::Gsm7(_)));
        assert_eq!(codec.data_coding(), 0x00);
        assert!(!long);
    }

    #[test]
    fn gsm7_over_160_septets_is_long() {
        let text = "a".repeat(161);
        let (codec, long) = find_coding(&text);
        assert!(matches!(codec, Codec::Gsm7(_)));
        assert!(long);
    }

    #[test]
    fn gsm7_exactly_160_is_short() {
        let text = "a".repeat(160);
        let (_, long) = find_coding(&text);
        assert!(!long);
    }

    #[test]
    fn accented_latin_selects_latin1() {
        let (codec, long) = find_coding("café");
        assert!(matches!(codec, Codec::Latin1(_)));
        assert_eq!(codec.data_coding(), 0x03);
        assert_eq!(codec.payload(), &[b'c', b'a', b'f', 0xE9]);
        assert!(!long);
    }

    #[test]
    fn devanagari_selects_ucs2() {
        let (codec, long) = find_coding("नमस्ते");
        assert!(matches!(codec, Codec::Ucs2(_)));
        assert_eq!(codec.data_coding(), 0x08);
        assert_eq!(codec.payload().len(), 12); // 6 code units
        assert!(!long);
    }

    #[test]
    fn seventy_one_devanagari_chars_are_long() {
        let text = "अ".repeat(71);
        let (codec, long) = find_coding(&text);
        assert!(matches!(codec, Codec::Ucs2(_)));
        assert!(long);
    }

    #[test]
    fn ucs2_200_units_make_three_segments() {
        let text = "अ".repeat(200); // 400 octets encoded
        let (codec, long) = find_coding(&text);
        assert!(long);

        let segments = codec.segments(0x2A);
        assert_eq!(segments.len(), 3);

        for (i, segment) in segments.iter().enumerate() {
            assert_eq!(&segment[..4], &[0x05, 0x00, 0x03, 0x2A]);
            assert_eq!(segment[4], 3);
            assert_eq!(segment[5], i as u8 + 1);
            // UCS-2 chunks stay code-unit aligned
            assert_eq!((segment.len() - UDH_LEN) % 2, 0);
        }

        let total: usize = segments.iter().map(|s| s.len() - UDH_LEN).sum();
        assert_eq!(total, 400);
    }

    #[test]
    fn gsm7_segments_do_not_split_escape_pairs() {
        // 152 plain chars then an escaped char straddling the 153 boundary
        let mut text = "a".repeat(152);
        text.push('{');
        text.push_str(&"b".repeat(40));
        let (codec, long) = find_coding(&text);
        assert!(long);

        let segments = codec.segments(1);
        assert_eq!(segments.len(), 2);
        // first chunk ends before the escape, so it holds the 152 plain chars
        assert_eq!(segments[0].len() - UDH_LEN, 152);
        let second = &segments[1][UDH_LEN..];
        assert_eq!(second[0], gsm7::ESCAPE);
        assert_eq!(second[1], 0x28);
    }

    #[test]
    fn single_message_has_no_segments_overhead() {
        let (codec, long) = find_coding("short message");
        assert!(!long);
        let segments = codec.segments(9);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0][4], 1);
    }
}
