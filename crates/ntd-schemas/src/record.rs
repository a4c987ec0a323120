use serde::{Deserialize, Serialize};
use std::fmt;

/// Version written by the scan step when the operator does not pass one.
pub const DEFAULT_VERSION: &str = "DT001";

/// Every field is length-prefixed with a single byte on the tag.
pub const MAX_FIELD_LEN: usize = 255;

/// Offer codes are 64 characters; the legacy layout used 5.
pub const STANDARD_OFFER_LEN: usize = 64;
pub const LEGACY_OFFER_LEN: usize = 5;

/// The data written to one tag.
///
/// `nft_id` and `offer` are opaque tokens: only length and charset are
/// checked. An absent version is `None`; `Some("")` is normalised to `None`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NftRecord {
    pub nft_id: String,
    pub offer: String,
    pub version: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordError {
    Empty { field: &'static str },
    TooLong { field: &'static str, len: usize, max: usize },
    BadChar { field: &'static str, ch: char },
    OfferLength { expected: usize, got: usize },
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordError::Empty { field } => write!(f, "{field} is required"),
            RecordError::TooLong { field, len, max } => {
                write!(f, "{field} too long ({len} bytes, max {max})")
            }
            RecordError::BadChar { field, ch } => {
                write!(f, "{field} contains unsupported character {ch:?}")
            }
            RecordError::OfferLength { expected, got } => write!(
                f,
                "offer code must be exactly {expected} characters, got {got}"
            ),
        }
    }
}

impl std::error::Error for RecordError {}

fn check_token(field: &'static str, value: &str) -> Result<(), RecordError> {
    if value.is_empty() {
        return Err(RecordError::Empty { field });
    }
    if value.len() > MAX_FIELD_LEN {
        return Err(RecordError::TooLong {
            field,
            len: value.len(),
            max: MAX_FIELD_LEN,
        });
    }
    // Printable ASCII only; commas are the CSV delimiter.
    if let Some(ch) = value.chars().find(|c| !c.is_ascii_graphic() || *c == ',') {
        return Err(RecordError::BadChar { field, ch });
    }
    Ok(())
}

impl NftRecord {
    /// Build and validate a record. Fields are trimmed.
    pub fn new(
        nft_id: impl Into<String>,
        offer: impl Into<String>,
        version: Option<String>,
    ) -> Result<Self, RecordError> {
        let nft_id = nft_id.into().trim().to_string();
        let offer = offer.into().trim().to_string();
        let version = version
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        check_token("nft_id", &nft_id)?;
        check_token("offer", &offer)?;
        if let Some(v) = &version {
            check_token("version", v)?;
        }

        Ok(Self {
            nft_id,
            offer,
            version,
        })
    }

    /// Copy of this record with the version dropped (legacy two-field layout).
    pub fn without_version(&self) -> Self {
        Self {
            version: None,
            ..self.clone()
        }
    }

    /// Offer-length policy.
    ///
    /// `strict` demands the exact standard (or legacy) length; otherwise only
    /// the field maximum applies.
    pub fn validate_offer_length(&self, strict: bool, legacy: bool) -> Result<(), RecordError> {
        let got = self.offer.chars().count();
        if strict {
            let expected = if legacy {
                LEGACY_OFFER_LEN
            } else {
                STANDARD_OFFER_LEN
            };
            if got != expected {
                return Err(RecordError::OfferLength { expected, got });
            }
            return Ok(());
        }
        if self.offer.len() > MAX_FIELD_LEN {
            return Err(RecordError::TooLong {
                field: "offer",
                len: self.offer.len(),
                max: MAX_FIELD_LEN,
            });
        }
        Ok(())
    }
}

impl fmt::Display for NftRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "version={} nft_id={} offer={}",
            self.version.as_deref().unwrap_or("-"),
            self.nft_id,
            self.offer
        )
    }
}
