use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 7-byte UID rendered as hex.
pub const UID_HEX_LEN: usize = 14;

/// Hardware identifier of a Type 2 tag, normalised to 14 upper-case hex chars.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Uid(String);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UidError {
    pub raw: String,
}

impl fmt::Display for UidError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid tag uid '{}': expected {} hex characters",
            self.raw, UID_HEX_LEN
        )
    }
}

impl std::error::Error for UidError {}

impl Uid {
    /// Accepts `04A1B2C3D4E5F6`, lower case, or reader-style `04 A1 B2 ...`.
    pub fn parse(raw: &str) -> Result<Uid, UidError> {
        let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
        if compact.len() != UID_HEX_LEN || hex::decode(&compact).is_err() {
            return Err(UidError {
                raw: raw.to_string(),
            });
        }
        Ok(Uid(compact.to_ascii_uppercase()))
    }

    pub fn from_bytes(bytes: [u8; 7]) -> Uid {
        Uid(hex::encode_upper(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Uid {
    type Err = UidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uid::parse(s)
    }
}

impl TryFrom<String> for Uid {
    type Error = UidError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Uid::parse(&value)
    }
}

impl From<Uid> for String {
    fn from(uid: Uid) -> Self {
        uid.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_spaced_form_normalises() {
        let uid = Uid::parse("04 a1 b2 c3 d4 e5 f6").unwrap();
        assert_eq!(uid.as_str(), "04A1B2C3D4E5F6");
        assert_eq!(uid, Uid::from_bytes([0x04, 0xA1, 0xB2, 0xC3, 0xD4, 0xE5, 0xF6]));
    }

    #[test]
    fn wrong_length_or_non_hex_rejected() {
        assert!(Uid::parse("04A1B2C3D4E5").is_err());
        assert!(Uid::parse("04A1B2C3D4E5F6AA").is_err());
        assert!(Uid::parse("04A1B2C3D4E5FZ").is_err());
        assert!(Uid::parse("").is_err());
    }

    #[test]
    fn serde_goes_through_validation() {
        let ok: Uid = serde_json::from_str("\"04a1b2c3d4e5f6\"").unwrap();
        assert_eq!(ok.as_str(), "04A1B2C3D4E5F6");
        assert!(serde_json::from_str::<Uid>("\"nope\"").is_err());
    }
}
