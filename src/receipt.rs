//! Delivery-receipt body parsing.
//!
//! Receipts arrive as deliver_sm whose short_message is a keyed ASCII string:
//!
//! ```text
//! id:IIIII sub:SSS dlvrd:DDD submit date:YYMMDDhhmm done date:YYMMDDhhmm stat:DDDDDDD err:E text:...
//! ```
//!
//! The format is an appendix convention, not a normative part of the
//! protocol, and SMSCs drift on it. The parser extracts the keys it knows,
//! ignores everything else, and never fails: a receipt that cannot be
//! correlated is simply dropped upstream.

use std::fmt;

/// Final state reported by the SMSC in the `stat` field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReceiptStat {
    Delivered,
    Expired,
    Deleted,
    Undeliverable,
    Accepted,
    Unknown,
    Rejected,
    Enroute,
    /// A stat value outside the conventional vocabulary, kept verbatim.
    Other(String),
}

impl ReceiptStat {
    pub fn parse(value: &str) -> Self {
        match value {
            "DELIVRD" => Self::Delivered,
            "EXPIRED" => Self::Expired,
            "DELETED" => Self::Deleted,
            "UNDELIV" => Self::Undeliverable,
            "ACCEPTD" => Self::Accepted,
            "UNKNOWN" => Self::Unknown,
            "REJECTD" => Self::Rejected,
            "ENROUTE" => Self::Enroute,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Delivered => "DELIVRD",
            Self::Expired => "EXPIRED",
            Self::Deleted => "DELETED",
            Self::Undeliverable => "UNDELIV",
            Self::Accepted => "ACCEPTD",
            Self::Unknown => "UNKNOWN",
            Self::Rejected => "REJECTD",
            Self::Enroute => "ENROUTE",
            Self::Other(s) => s,
        }
    }

    /// Whether the part reached the handset.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Delivered)
    }

    /// Whether the SMSC will not report again for this part.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            Self::Delivered | Self::Expired | Self::Deleted | Self::Undeliverable | Self::Rejected
        )
    }
}

impl fmt::Display for ReceiptStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed delivery receipt. Fields missing from the body decode as empty.
#[derive(Clone, Debug, PartialEq)]
pub struct DeliveryReceipt {
    /// SMSC message id, matching the submit_sm_resp message_id of the part.
    pub id: String,
    pub sub: String,
    pub dlvrd: String,
    pub submit_date: String,
    pub done_date: String,
    pub stat: ReceiptStat,
    pub err: String,
    pub text: String,
}

impl DeliveryReceipt {
    /// Extract known keys from a receipt body. Tolerates missing keys,
    /// reordered keys and extra vendor keys.
    pub fn parse(body: &str) -> Self {
        Self {
            id: extract(body, "id:"),
            sub: extract(body, "sub:"),
            dlvrd: extract(body, "dlvrd:"),
            submit_date: extract(body, "submit date:"),
            done_date: extract(body, "done date:"),
            stat: ReceiptStat::parse(&extract(body, "stat:")),
            err: extract(body, "err:"),
            text: extract_tail(body, "text:"),
        }
    }
}

/// Value of `key` up to the next space, or empty when the key is absent.
fn extract(body: &str, key: &str) -> String {
    match find_key(body, key) {
        Some(start) => {
            let value = &body[start..];
            match value.find(' ') {
                Some(end) => value[..end].to_string(),
                None => value.to_string(),
            }
        }
        None => String::new(),
    }
}

/// Value of `key` to end of body; the free-text tail may contain spaces.
fn extract_tail(body: &str, key: &str) -> String {
    match find_key(body, key) {
        Some(start) => body[start..].to_string(),
        None => String::new(),
    }
}

/// Position right after `key`, requiring the key to start the body or follow
/// a space so `submit date:` is never found inside `done date:`.
fn find_key(body: &str, key: &str) -> Option<usize> {
    let mut offset = 0;
    while let Some(pos) = body[offset..].find(key) {
        let absolute = offset + pos;
        if absolute == 0 || body.as_bytes()[absolute - 1] == b' ' {
            return Some(absolute + key.len());
        }
        offset = absolute + key.len();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = "id:0123456789 sub:001 dlvrd:001 submit date:2402141200 \
                        done date:2402141201 stat:DELIVRD err:000 text:hello world";

    #[test]
    fn full_receipt() {
        let receipt = DeliveryReceipt::parse(BODY);
        assert_eq!(receipt.id, "0123456789");
        assert_eq!(receipt.sub, "001");
        assert_eq!(receipt.dlvrd, "001");
        assert_eq!(receipt.submit_date, "2402141200");
        assert_eq!(receipt.done_date, "2402141201");
        assert_eq!(receipt.stat, ReceiptStat::Delivered);
        assert_eq!(receipt.err, "000");
        assert_eq!(receipt.text, "hello world");
    }

    #[test]
    fn failed_receipt() {
        let receipt =
            DeliveryReceipt::parse("id:77 sub:001 dlvrd:000 stat:UNDELIV err:034 text:");
        assert_eq!(receipt.stat, ReceiptStat::Undeliverable);
        assert!(!receipt.stat.is_success());
        assert!(receipt.stat.is_final());
        assert_eq!(receipt.err, "034");
    }

    #[test]
    fn missing_keys_decode_empty() {
        let receipt = DeliveryReceipt::parse("id:42 stat:DELIVRD");
        assert_eq!(receipt.id, "42");
        assert_eq!(receipt.sub, "");
        assert_eq!(receipt.done_date, "");
        assert!(receipt.stat.is_success());
    }

    #[test]
    fn garbage_body_yields_empty_receipt() {
        let receipt = DeliveryReceipt::parse("not a receipt at all");
        assert!(receipt.id.is_empty());
        assert_eq!(receipt.stat, ReceiptStat::Other(String::new()));
    }

    #[test]
    fn submit_date_not_confused_with_done_date() {
        let receipt = DeliveryReceipt::parse("done date:2211011200 submit date:2211011100 id:5");
        assert_eq!(receipt.submit_date, "2211011100");
        assert_eq!(receipt.done_date, "2211011200");
    }

    #[test]
    fn vendor_stat_is_preserved() {
        let receipt = DeliveryReceipt::parse("id:9 stat:QUEUED");
        assert_eq!(receipt.stat, ReceiptStat::Other("QUEUED".into()));
        assert!(!receipt.stat.is_final());
        assert_eq!(receipt.stat.as_str(), "QUEUED");
    }

    #[test]
    fn accepted_is_not_final() {
        let receipt = DeliveryReceipt::parse("id:9 stat:ACCEPTD");
        assert_eq!(receipt.stat, ReceiptStat::Accepted);
        assert!(!receipt.stat.is_final());
    }
}
