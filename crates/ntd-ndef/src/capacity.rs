//! Size arithmetic shared by encode, preflight and the CLI `info` command.

use ntd_profile::TagProfile;
use ntd_schemas::NftRecord;

use crate::{EncodeOptions, PayloadLayout, CHECK_LEN, MIME_TYPE};

/// Payload bytes for `record` under `layout`, including the integrity tag.
pub fn payload_len(record: &NftRecord, layout: PayloadLayout) -> usize {
    let fields = match layout {
        PayloadLayout::Current => {
            1 + record.version.as_deref().map_or(0, str::len)
                + 1
                + record.nft_id.len()
                + 1
                + record.offer.len()
        }
        PayloadLayout::Legacy => 1 + record.nft_id.len() + 1 + record.offer.len(),
    };
    1 + fields + CHECK_LEN
}

/// NDEF record length (header, type length, payload length, type, payload).
pub fn record_len(payload_len: usize) -> usize {
    let pl_field = if payload_len < 256 { 1 } else { 4 };
    1 + 1 + pl_field + MIME_TYPE.len() + payload_len
}

fn tlv_header_len(record_len: usize) -> usize {
    if record_len < 0xFF {
        2
    } else {
        4
    }
}

/// Bytes occupied on the tag by a message carrying `payload_len` bytes.
pub fn message_len(payload_len: usize, with_terminator: bool) -> usize {
    let rec = record_len(payload_len);
    tlv_header_len(rec) + rec + usize::from(with_terminator)
}

/// Everything that is not payload: TLV header, record header, type and
/// terminator.
pub fn framing_overhead(payload_len: usize) -> usize {
    message_len(payload_len, true) - payload_len
}

/// Largest payload that fits the profile under `opts`.
pub fn max_payload_len(profile: &TagProfile, opts: EncodeOptions) -> usize {
    let capacity = usize::from(profile.total_bytes);
    let fits = |p: usize| {
        message_len(p, true) <= capacity
            || (opts.allow_any_length && message_len(p, false) <= capacity)
    };
    // Framing only grows with the payload, so the first fit from the top wins.
    (0..=capacity).rev().find(|&p| fits(p)).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ntd_profile::{profile_by_kind, TagKind};

    #[test]
    fn short_record_overhead_is_28() {
        assert_eq!(framing_overhead(10), 28);
        assert_eq!(framing_overhead(116), 28);
    }

    #[test]
    fn long_tlv_and_long_record_add_bytes() {
        // record_len 255 switches to the 3-byte TLV length.
        assert_eq!(framing_overhead(230), 30);
        // payload 256 switches to the 4-byte payload length.
        assert_eq!(framing_overhead(256), 33);
    }

    #[test]
    fn ntag213_budget() {
        let p = profile_by_kind(TagKind::Ntag213);
        assert_eq!(max_payload_len(p, EncodeOptions::default()), 116);
        let relaxed = EncodeOptions {
            allow_any_length: true,
            ..EncodeOptions::default()
        };
        assert_eq!(max_payload_len(p, relaxed), 117);
    }

    #[test]
    fn ntag215_budget() {
        let p = profile_by_kind(TagKind::Ntag215);
        assert_eq!(max_payload_len(p, EncodeOptions::default()), 471);
    }

    #[test]
    fn payload_len_counts_absent_version_as_one_byte() {
        let r = NftRecord::new("abc", "de", None).unwrap();
        assert_eq!(payload_len(&r, PayloadLayout::Current), 1 + 1 + 4 + 3 + 4);
        assert_eq!(payload_len(&r, PayloadLayout::Legacy), 1 + 4 + 3 + 4);
    }
}
