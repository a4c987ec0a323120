use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CodecError {
    /// Encoded message would not fit the tag. Sizes in bytes.
    PayloadTooLarge { needed: usize, capacity: usize },
    MalformedNdef(String),
    ChecksumMismatch { expected: [u8; 4], found: [u8; 4] },
    InvalidRecord(String),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::PayloadTooLarge { needed, capacity } => write!(
                f,
                "payload too large: needs {needed} bytes, tag holds {capacity}"
            ),
            CodecError::MalformedNdef(reason) => write!(f, "malformed NDEF: {reason}"),
            CodecError::ChecksumMismatch { expected, found } => write!(
                f,
                "checksum mismatch: expected {}, found {}",
                hex::encode_upper(expected),
                hex::encode_upper(found)
            ),
            CodecError::InvalidRecord(reason) => write!(f, "invalid record: {reason}"),
        }
    }
}

impl std::error::Error for CodecError {}
