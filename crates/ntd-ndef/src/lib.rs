//! ntd-ndef
//!
//! NDEF codec for NFT records on Type 2 tags.
//!
//! # Byte layout
//!
//! ```text
//! TLV      03 LL | 03 FF HH LL        NDEF Message TLV (1- or 3-byte length)
//! record   D2 | C2                    MB|ME|TNF=MIME, SR when payload < 256
//!          16                         type length (22)
//!          PL | P3 P2 P1 P0           payload length (SR: 1 byte, else 4 BE)
//!          "application/x-nft-data"
//!          payload                    see below
//! TLV      FE                         terminator (omitted only when the
//!                                     message fills memory exactly and
//!                                     allow_any_length is set)
//!
//! payload  01 | 00                    layout: current | legacy
//!          [len version]              current layout only; len 0 = absent
//!          len nft_id
//!          len offer
//!          C0 C1 C2 C3                first 4 bytes of SHA-256(layout..offer)
//! ```
//!
//! Encoding never truncates. A message that does not fit the profile is
//! rejected with [`CodecError::PayloadTooLarge`].

mod capacity;
mod error;

pub use capacity::{framing_overhead, max_payload_len, message_len, payload_len, record_len};
pub use error::CodecError;

use ntd_profile::TagProfile;
use ntd_schemas::{NftRecord, MAX_FIELD_LEN};
use sha2::{Digest, Sha256};
use tracing::debug;

pub const MIME_TYPE: &str = "application/x-nft-data";

pub(crate) const TLV_NULL: u8 = 0x00;
pub(crate) const TLV_LOCK_CONTROL: u8 = 0x01;
pub(crate) const TLV_MEMORY_CONTROL: u8 = 0x02;
pub(crate) const TLV_NDEF: u8 = 0x03;
pub(crate) const TLV_TERMINATOR: u8 = 0xFE;

const FLAG_MB: u8 = 0x80;
const FLAG_ME: u8 = 0x40;
const FLAG_CF: u8 = 0x20;
const FLAG_SR: u8 = 0x10;
const FLAG_IL: u8 = 0x08;
const TNF_MASK: u8 = 0x07;
const TNF_MIME: u8 = 0x02;

const LAYOUT_LEGACY: u8 = 0x00;
const LAYOUT_CURRENT: u8 = 0x01;

pub(crate) const CHECK_LEN: usize = 4;

/// Payload field layout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PayloadLayout {
    /// version, nft_id, offer.
    #[default]
    Current,
    /// nft_id, offer. Carries no version.
    Legacy,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EncodeOptions {
    pub layout: PayloadLayout,
    /// Drop the terminator TLV when it is the only thing that does not fit.
    pub allow_any_length: bool,
}

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

fn check_field(name: &str, value: &str) -> Result<(), CodecError> {
    if value.len() > MAX_FIELD_LEN {
        return Err(CodecError::InvalidRecord(format!(
            "{name} is {} bytes, field max is {MAX_FIELD_LEN}",
            value.len()
        )));
    }
    Ok(())
}

fn build_payload(record: &NftRecord, layout: PayloadLayout) -> Result<Vec<u8>, CodecError> {
    // Re-validate: fields are public and may not have come through NftRecord::new.
    NftRecord::new(
        record.nft_id.clone(),
        record.offer.clone(),
        record.version.clone(),
    )
    .map_err(|e| CodecError::InvalidRecord(e.to_string()))?;

    let mut fields: Vec<(&str, &str)> = Vec::with_capacity(3);
    let layout_byte = match layout {
        PayloadLayout::Current => {
            fields.push(("version", record.version.as_deref().unwrap_or("")));
            LAYOUT_CURRENT
        }
        PayloadLayout::Legacy => {
            if record.version.is_some() {
                return Err(CodecError::InvalidRecord(
                    "legacy layout cannot carry a version".to_string(),
                ));
            }
            LAYOUT_LEGACY
        }
    };
    fields.push(("nft_id", &record.nft_id));
    fields.push(("offer", &record.offer));

    let mut payload = Vec::with_capacity(payload_len(record, layout));
    payload.push(layout_byte);
    for (name, f) in fields {
        check_field(name, f)?;
        payload.push(f.len() as u8);
        payload.extend_from_slice(f.as_bytes());
    }
    let check = integrity_tag(&payload);
    payload.extend_from_slice(&check);
    Ok(payload)
}

fn integrity_tag(body: &[u8]) -> [u8; CHECK_LEN] {
    let digest = Sha256::digest(body);
    let mut out = [0u8; CHECK_LEN];
    out.copy_from_slice(&digest[..CHECK_LEN]);
    out
}

/// Encode `record` into the bytes of the tag's NDEF data area.
///
/// The returned buffer is not padded; the reader pads the final page.
pub fn encode(
    record: &NftRecord,
    profile: &TagProfile,
    opts: EncodeOptions,
) -> Result<Vec<u8>, CodecError> {
    let payload = build_payload(record, opts.layout)?;
    let p = payload.len();
    let capacity = usize::from(profile.total_bytes);

    let with_terminator = message_len(p, true);
    let terminator = if with_terminator <= capacity {
        true
    } else if opts.allow_any_length && message_len(p, false) <= capacity {
        false
    } else {
        let needed = if opts.allow_any_length {
            message_len(p, false)
        } else {
            with_terminator
        };
        return Err(CodecError::PayloadTooLarge { needed, capacity });
    };

    let rec_len = record_len(p);
    let mut out = Vec::with_capacity(message_len(p, terminator));

    out.push(TLV_NDEF);
    if rec_len < 0xFF {
        out.push(rec_len as u8);
    } else {
        out.push(0xFF);
        out.extend_from_slice(&(rec_len as u16).to_be_bytes());
    }

    let short = p < 256;
    let mut header = FLAG_MB | FLAG_ME | TNF_MIME;
    if short {
        header |= FLAG_SR;
    }
    out.push(header);
    out.push(MIME_TYPE.len() as u8);
    if short {
        out.push(p as u8);
    } else {
        out.extend_from_slice(&(p as u32).to_be_bytes());
    }
    out.extend_from_slice(MIME_TYPE.as_bytes());
    out.extend_from_slice(&payload);

    if terminator {
        out.push(TLV_TERMINATOR);
    }

    debug!(
        profile = profile.name,
        payload_len = p,
        message_len = out.len(),
        terminator,
        "encoded nft record"
    );
    Ok(out)
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

fn malformed(reason: impl Into<String>) -> CodecError {
    CodecError::MalformedNdef(reason.into())
}

/// Read a TLV length at `pos`. Returns (length, bytes consumed).
fn read_tlv_len(bytes: &[u8], pos: usize) -> Result<(usize, usize), CodecError> {
    let first = *bytes
        .get(pos)
        .ok_or_else(|| malformed("truncated TLV length"))?;
    if first != 0xFF {
        return Ok((usize::from(first), 1));
    }
    let hi = bytes.get(pos + 1);
    let lo = bytes.get(pos + 2);
    match (hi, lo) {
        (Some(h), Some(l)) => Ok((usize::from(u16::from_be_bytes([*h, *l])), 3)),
        _ => Err(malformed("truncated 3-byte TLV length")),
    }
}

/// Locate the NDEF Message TLV value inside the data area.
fn find_ndef_value(area: &[u8]) -> Result<&[u8], CodecError> {
    let mut pos = 0usize;
    loop {
        let tag = *area
            .get(pos)
            .ok_or_else(|| malformed("no NDEF message TLV found"))?;
        match tag {
            TLV_NULL => pos += 1,
            TLV_LOCK_CONTROL | TLV_MEMORY_CONTROL => {
                let (len, used) = read_tlv_len(area, pos + 1)?;
                pos += 1 + used + len;
            }
            TLV_NDEF => {
                let (len, used) = read_tlv_len(area, pos + 1)?;
                let start = pos + 1 + used;
                let end = start + len;
                if end > area.len() {
                    return Err(malformed(format!(
                        "NDEF TLV claims {len} bytes but only {} remain on the tag",
                        area.len().saturating_sub(start)
                    )));
                }
                return Ok(&area[start..end]);
            }
            TLV_TERMINATOR => return Err(malformed("terminator TLV before NDEF message")),
            other => return Err(malformed(format!("unknown TLV type 0x{other:02X}"))),
        }
    }
}

fn parse_record(msg: &[u8]) -> Result<&[u8], CodecError> {
    if msg.len() < 3 {
        return Err(malformed("NDEF record header truncated"));
    }
    let header = msg[0];
    if header & FLAG_MB == 0 || header & FLAG_ME == 0 {
        return Err(malformed("expected a single-record message (MB and ME set)"));
    }
    if header & FLAG_CF != 0 {
        return Err(malformed("chunked records are not supported"));
    }
    if header & FLAG_IL != 0 {
        return Err(malformed("record ID field is not expected"));
    }
    if header & TNF_MASK != TNF_MIME {
        return Err(malformed(format!(
            "expected MIME media TNF, got 0x{:02X}",
            header & TNF_MASK
        )));
    }

    let type_len = usize::from(msg[1]);
    if type_len != MIME_TYPE.len() {
        return Err(malformed(format!(
            "wrong type length {type_len}, expected {}",
            MIME_TYPE.len()
        )));
    }

    let (payload_len, mut pos) = if header & FLAG_SR != 0 {
        (usize::from(msg[2]), 3)
    } else {
        if msg.len() < 6 {
            return Err(malformed("long payload length truncated"));
        }
        let n = u32::from_be_bytes([msg[2], msg[3], msg[4], msg[5]]) as usize;
        (n, 6)
    };

    let type_end = pos + type_len;
    let ty = msg
        .get(pos..type_end)
        .ok_or_else(|| malformed("record type truncated"))?;
    if ty != MIME_TYPE.as_bytes() {
        return Err(malformed(format!(
            "bad MIME type '{}'",
            String::from_utf8_lossy(ty)
        )));
    }
    pos = type_end;

    let end = pos + payload_len;
    if end > msg.len() {
        return Err(malformed(format!(
            "truncated payload: header says {payload_len} bytes, {} present",
            msg.len() - pos
        )));
    }
    if end < msg.len() {
        return Err(malformed("trailing bytes after NDEF record"));
    }
    Ok(&msg[pos..end])
}

fn parse_payload(payload: &[u8]) -> Result<NftRecord, CodecError> {
    if payload.len() < 1 + CHECK_LEN {
        return Err(malformed("payload too short"));
    }
    let (body, check) = payload.split_at(payload.len() - CHECK_LEN);
    let expected = integrity_tag(body);
    if check != expected {
        let mut found = [0u8; CHECK_LEN];
        found.copy_from_slice(check);
        return Err(CodecError::ChecksumMismatch { expected, found });
    }

    let field_count = match body[0] {
        LAYOUT_CURRENT => 3,
        LAYOUT_LEGACY => 2,
        other => return Err(malformed(format!("unknown payload layout 0x{other:02X}"))),
    };

    let mut fields: Vec<String> = Vec::with_capacity(field_count);
    let mut pos = 1usize;
    for _ in 0..field_count {
        let len = usize::from(
            *body
                .get(pos)
                .ok_or_else(|| malformed("payload field length missing"))?,
        );
        let raw = body
            .get(pos + 1..pos + 1 + len)
            .ok_or_else(|| malformed("payload field truncated"))?;
        let s = std::str::from_utf8(raw).map_err(|_| malformed("payload field is not text"))?;
        fields.push(s.to_string());
        pos += 1 + len;
    }
    if pos != body.len() {
        return Err(malformed("trailing bytes after payload fields"));
    }

    let mut it = fields.into_iter();
    let version = if field_count == 3 { it.next() } else { None };
    let nft_id = it.next().unwrap_or_default();
    let offer = it.next().unwrap_or_default();

    NftRecord::new(nft_id, offer, version)
        .map_err(|e| malformed(format!("decoded record is invalid: {e}")))
}

/// Decode the NDEF data area of a tag.
///
/// Bytes beyond `profile.total_bytes` are ignored; a TLV that claims to reach
/// past the tag's capacity is malformed.
pub fn decode(bytes: &[u8], profile: &TagProfile) -> Result<NftRecord, CodecError> {
    let limit = bytes.len().min(usize::from(profile.total_bytes));
    let area = &bytes[..limit];
    let msg = find_ndef_value(area)?;
    let payload = parse_record(msg)?;
    parse_payload(payload)
}

/// Layout byte of an encoded record, if the bytes decode that far.
pub fn detect_layout(bytes: &[u8], profile: &TagProfile) -> Result<PayloadLayout, CodecError> {
    let limit = bytes.len().min(usize::from(profile.total_bytes));
    let payload = parse_record(find_ndef_value(&bytes[..limit])?)?;
    match payload.first() {
        Some(&LAYOUT_CURRENT) => Ok(PayloadLayout::Current),
        Some(&LAYOUT_LEGACY) => Ok(PayloadLayout::Legacy),
        Some(other) => Err(malformed(format!("unknown payload layout 0x{other:02X}"))),
        None => Err(malformed("empty payload")),
    }
}

// ---------------------------------------------------------------------------
// Hex helpers (CLI encode/decode)
// ---------------------------------------------------------------------------

pub fn hex_dump(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn parse_hex(raw: &str) -> Result<Vec<u8>, CodecError> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(compact).map_err(|e| malformed(format!("invalid hex input: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ntd_profile::{profile_by_kind, TagKind};

    fn rec(version: Option<&str>) -> NftRecord {
        NftRecord::new(
            "nft1qxyz8d2f3kq8m5s0wyk4g5xj0p7k9e3l2q6r0t9v8s7u6w5y4x3z2a1b0c",
            "OFR01",
            version.map(str::to_string),
        )
        .unwrap()
    }

    #[test]
    fn framing_bytes_are_type2_ndef() {
        let p = profile_by_kind(TagKind::Ntag213);
        let out = encode(&rec(Some("DT001")), p, EncodeOptions::default()).unwrap();
        assert_eq!(out[0], TLV_NDEF);
        assert_eq!(usize::from(out[1]), out.len() - 3);
        assert_eq!(out[2], 0xD2);
        assert_eq!(out[3], 22);
        assert_eq!(&out[5..27], MIME_TYPE.as_bytes());
        assert_eq!(*out.last().unwrap(), TLV_TERMINATOR);
    }

    #[test]
    fn absent_version_round_trips_as_none() {
        let p = profile_by_kind(TagKind::Ntag215);
        let r = rec(None);
        let out = encode(&r, p, EncodeOptions::default()).unwrap();
        assert_eq!(decode(&out, p).unwrap(), r);
        assert_eq!(detect_layout(&out, p).unwrap(), PayloadLayout::Current);
    }

    #[test]
    fn legacy_layout_refuses_version() {
        let p = profile_by_kind(TagKind::Ntag215);
        let opts = EncodeOptions {
            layout: PayloadLayout::Legacy,
            allow_any_length: false,
        };
        assert!(matches!(
            encode(&rec(Some("DT001")), p, opts),
            Err(CodecError::InvalidRecord(_))
        ));
        let out = encode(&rec(None), p, opts).unwrap();
        assert_eq!(detect_layout(&out, p).unwrap(), PayloadLayout::Legacy);
        assert_eq!(decode(&out, p).unwrap(), rec(None));
    }

    #[test]
    fn flipped_payload_byte_is_checksum_mismatch() {
        let p = profile_by_kind(TagKind::Ntag213);
        let mut out = encode(&rec(Some("DT001")), p, EncodeOptions::default()).unwrap();
        // Inside the nft_id text.
        out[40] ^= 0x01;
        assert!(matches!(
            decode(&out, p),
            Err(CodecError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn wrong_mime_type_is_malformed() {
        let p = profile_by_kind(TagKind::Ntag213);
        let mut out = encode(&rec(None), p, EncodeOptions::default()).unwrap();
        out[5] = b'b';
        let err = decode(&out, p).unwrap_err();
        assert!(err.to_string().contains("bad MIME type"), "{err}");
    }

    #[test]
    fn wrong_type_length_is_malformed() {
        let p = profile_by_kind(TagKind::Ntag213);
        let mut out = encode(&rec(None), p, EncodeOptions::default()).unwrap();
        out[3] = 21;
        let err = decode(&out, p).unwrap_err();
        assert!(err.to_string().contains("wrong type length"), "{err}");
    }

    #[test]
    fn truncated_buffer_is_malformed() {
        let p = profile_by_kind(TagKind::Ntag213);
        let out = encode(&rec(None), p, EncodeOptions::default()).unwrap();
        let cut = &out[..out.len() - 10];
        assert!(matches!(decode(cut, p), Err(CodecError::MalformedNdef(_))));
    }

    #[test]
    fn blank_tag_is_malformed_not_panic() {
        let p = profile_by_kind(TagKind::Ntag213);
        assert!(matches!(
            decode(&[0u8; 144], p),
            Err(CodecError::MalformedNdef(_))
        ));
        assert!(matches!(decode(&[], p), Err(CodecError::MalformedNdef(_))));
    }

    #[test]
    fn leading_null_and_lock_control_tlvs_are_skipped() {
        let p = profile_by_kind(TagKind::Ntag215);
        let out = encode(&rec(Some("DT001")), p, EncodeOptions::default()).unwrap();
        let mut area = vec![TLV_NULL, TLV_LOCK_CONTROL, 0x03, 0xA0, 0x10, 0x44];
        area.extend_from_slice(&out);
        assert_eq!(decode(&area, p).unwrap(), rec(Some("DT001")));
    }

    #[test]
    fn hex_helpers_round_trip() {
        let bytes = vec![0x03, 0x1A, 0xD2, 0xFE];
        let dumped = hex_dump(&bytes);
        assert_eq!(dumped, "03 1A D2 FE");
        assert_eq!(parse_hex(&dumped).unwrap(), bytes);
        assert!(parse_hex("0Z").is_err());
    }
}
