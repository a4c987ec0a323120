//! ntd-profile
//!
//! Tag Profile Registry.
//!
//! Static capability table for the supported NFC Forum Type 2 tag families.
//! The registry is the only place capacity and lock geometry live: the NDEF
//! codec asks it for the usable byte budget and the write/lock state machine
//! asks it for the lockable page range. Nobody else hardcodes these numbers.
//!
//! Pure lookup. No IO.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// TagKind
// ---------------------------------------------------------------------------

/// Closed set of supported tag families.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TagKind {
    Ntag213,
    Ntag215,
    Ntag216,
    Type2A,
}

impl TagKind {
    /// Stable text name used in CSV artifacts and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            TagKind::Ntag213 => "NTAG213",
            TagKind::Ntag215 => "NTAG215",
            TagKind::Ntag216 => "NTAG216",
            TagKind::Type2A => "NTAG21x_2A",
        }
    }

    pub fn parse(raw: &str) -> Result<TagKind, UnsupportedTagKind> {
        profile_for(TagMarker::Name(raw)).map(|p| p.kind)
    }
}

impl fmt::Display for TagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// PageRange
// ---------------------------------------------------------------------------

/// Inclusive range of tag pages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRange {
    pub start: u16,
    pub end: u16,
}

impl PageRange {
    pub const fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    pub fn page_count(&self) -> u16 {
        self.end.saturating_sub(self.start) + 1
    }

    pub fn contains(&self, page: u16) -> bool {
        page >= self.start && page <= self.end
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}..=0x{:02X}", self.start, self.end)
    }
}

// ---------------------------------------------------------------------------
// TagProfile
// ---------------------------------------------------------------------------

/// Capability row for one tag family.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TagProfile {
    pub kind: TagKind,
    pub name: &'static str,
    /// Usable NDEF memory in bytes (user data area starting at page 4).
    pub total_bytes: u16,
    pub page_size: u8,
    pub lockable_page_start: u16,
    pub lockable_page_end: u16,
    /// Storage-size byte reported by GET_VERSION / version pages.
    pub product_type: u8,
    /// Byte 2 of the capability container written at page 3.
    pub cc_size_byte: u8,
    /// Page holding the dynamic lock bytes.
    pub dynamic_lock_page: u16,
    /// Dynamic lock bytes that, once set, freeze `lockable_pages()`.
    pub dynamic_lock_bytes: &'static [u8],
}

impl TagProfile {
    pub fn lockable_pages(&self) -> PageRange {
        PageRange::new(self.lockable_page_start, self.lockable_page_end)
    }

    /// First page of the NDEF data area.
    pub fn data_start_page(&self) -> u16 {
        DATA_START_PAGE
    }

    /// Number of pages needed to hold `total_bytes`.
    pub fn data_page_count(&self) -> u16 {
        let ps = u16::from(self.page_size);
        self.total_bytes.div_ceil(ps)
    }

    /// Lock bytes the state machine writes (and later expects to read back).
    pub fn expected_lock_bits(&self) -> Vec<u8> {
        self.dynamic_lock_bytes.to_vec()
    }

    /// `true` when every expected lock bit is set in `read`.
    ///
    /// Extra bits set on the tag are tolerated; missing bits are not.
    pub fn lock_bits_set(&self, read: &[u8]) -> bool {
        if read.len() < self.dynamic_lock_bytes.len() {
            return false;
        }
        self.dynamic_lock_bytes
            .iter()
            .zip(read)
            .all(|(want, got)| got & want == *want)
    }

    /// `true` when any of this profile's lock bits is set in `read`.
    pub fn any_lock_bit_set(&self, read: &[u8]) -> bool {
        self.dynamic_lock_bytes
            .iter()
            .zip(read)
            .any(|(mask, got)| got & mask != 0)
    }
}

impl fmt::Display for TagProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} bytes)", self.name, self.total_bytes)
    }
}

pub const DATA_START_PAGE: u16 = 0x04;

static PROFILES: [TagProfile; 4] = [
    TagProfile {
        kind: TagKind::Ntag213,
        name: "NTAG213",
        total_bytes: 144,
        page_size: 4,
        lockable_page_start: 0x04,
        lockable_page_end: 0x27,
        product_type: 0x0F,
        cc_size_byte: 0x12,
        dynamic_lock_page: 0x28,
        dynamic_lock_bytes: &[0xFF, 0xFF, 0x00],
    },
    TagProfile {
        kind: TagKind::Ntag215,
        name: "NTAG215",
        total_bytes: 504,
        page_size: 4,
        lockable_page_start: 0x04,
        lockable_page_end: 0x81,
        product_type: 0x11,
        cc_size_byte: 0x3E,
        dynamic_lock_page: 0x82,
        dynamic_lock_bytes: &[0xFF, 0xFF, 0x00],
    },
    TagProfile {
        kind: TagKind::Ntag216,
        name: "NTAG216",
        total_bytes: 888,
        page_size: 4,
        lockable_page_start: 0x04,
        lockable_page_end: 0xE1,
        product_type: 0x13,
        cc_size_byte: 0x6D,
        dynamic_lock_page: 0xE2,
        dynamic_lock_bytes: &[0xFF, 0xFF, 0xFF],
    },
    TagProfile {
        kind: TagKind::Type2A,
        name: "NTAG21x_2A",
        total_bytes: 1016,
        page_size: 4,
        lockable_page_start: 0x04,
        lockable_page_end: 0x101,
        product_type: 0x2A,
        cc_size_byte: 0x7F,
        dynamic_lock_page: 0x102,
        dynamic_lock_bytes: &[0xFF, 0xFF, 0xFF],
    },
];

// ---------------------------------------------------------------------------
// Lookup
// ---------------------------------------------------------------------------

/// What a reader (or a CSV file) tells us about a tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TagMarker<'a> {
    TotalBytes(u16),
    ProductType(u8),
    CcSize(u8),
    Name(&'a str),
}

impl fmt::Display for TagMarker<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagMarker::TotalBytes(n) => write!(f, "total_bytes={n}"),
            TagMarker::ProductType(b) => write!(f, "product_type=0x{b:02X}"),
            TagMarker::CcSize(b) => write!(f, "cc_size=0x{b:02X}"),
            TagMarker::Name(s) => write!(f, "name={s}"),
        }
    }
}

/// No registry row matches the marker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnsupportedTagKind {
    pub marker: String,
}

impl fmt::Display for UnsupportedTagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported tag kind: {}", self.marker)
    }
}

impl std::error::Error for UnsupportedTagKind {}

/// Exact-match lookup. Name matching is case-insensitive.
pub fn profile_for(marker: TagMarker<'_>) -> Result<&'static TagProfile, UnsupportedTagKind> {
    let hit = PROFILES.iter().find(|p| match marker {
        TagMarker::TotalBytes(n) => p.total_bytes == n,
        TagMarker::ProductType(b) => p.product_type == b,
        TagMarker::CcSize(b) => p.cc_size_byte == b,
        TagMarker::Name(s) => p.name.eq_ignore_ascii_case(s.trim()),
    });

    hit.ok_or_else(|| UnsupportedTagKind {
        marker: marker.to_string(),
    })
}

pub fn profile_by_kind(kind: TagKind) -> &'static TagProfile {
    match kind {
        TagKind::Ntag213 => &PROFILES[0],
        TagKind::Ntag215 => &PROFILES[1],
        TagKind::Ntag216 => &PROFILES[2],
        TagKind::Type2A => &PROFILES[3],
    }
}

pub fn all_profiles() -> &'static [TagProfile] {
    &PROFILES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacities_match_datasheets() {
        let caps: Vec<u16> = all_profiles().iter().map(|p| p.total_bytes).collect();
        assert_eq!(caps, vec![144, 504, 888, 1016]);
    }

    #[test]
    fn every_marker_resolves_to_same_row() {
        for p in all_profiles() {
            assert_eq!(profile_for(TagMarker::TotalBytes(p.total_bytes)).unwrap(), p);
            assert_eq!(profile_for(TagMarker::ProductType(p.product_type)).unwrap(), p);
            assert_eq!(profile_for(TagMarker::CcSize(p.cc_size_byte)).unwrap(), p);
            assert_eq!(profile_for(TagMarker::Name(p.name)).unwrap(), p);
            assert_eq!(profile_by_kind(p.kind), p);
        }
    }

    #[test]
    fn near_miss_capacity_is_unsupported() {
        let err = profile_for(TagMarker::TotalBytes(143)).unwrap_err();
        assert!(err.to_string().contains("total_bytes=143"));
        assert!(profile_for(TagMarker::Name("ULTRALIGHT")).is_err());
    }

    #[test]
    fn kind_names_round_trip() {
        for p in all_profiles() {
            assert_eq!(TagKind::parse(p.kind.as_str()).unwrap(), p.kind);
        }
        assert_eq!(TagKind::parse("ntag215").unwrap(), TagKind::Ntag215);
    }

    #[test]
    fn lock_bits_require_every_expected_bit() {
        let p = profile_by_kind(TagKind::Ntag216);
        assert!(p.lock_bits_set(&[0xFF, 0xFF, 0xFF, 0x00]));
        assert!(!p.lock_bits_set(&[0xFF, 0xFF, 0x7F, 0x00]));
        assert!(!p.lock_bits_set(&[0xFF, 0xFF]));
        assert!(p.any_lock_bit_set(&[0x00, 0x01, 0x00]));
        assert!(!p.any_lock_bit_set(&[0x00, 0x00, 0x00]));
    }

    #[test]
    fn lockable_range_covers_whole_data_area() {
        for p in all_profiles() {
            let range = p.lockable_pages();
            let last_data_page = DATA_START_PAGE + p.data_page_count() - 1;
            assert_eq!(range.start, DATA_START_PAGE, "{}", p.name);
            assert_eq!(range.end, last_data_page, "{}", p.name);
            assert_eq!(
                usize::from(range.page_count()) * usize::from(p.page_size),
                usize::from(p.total_bytes),
                "{}",
                p.name
            );
            assert!(!range.contains(p.dynamic_lock_page), "{}", p.name);
            assert!(p.dynamic_lock_page > last_data_page, "{}", p.name);
        }
        assert_eq!(profile_by_kind(TagKind::Ntag213).data_page_count(), 36);
    }
}
