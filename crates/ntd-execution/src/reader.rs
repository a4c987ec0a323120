use std::fmt;

use ntd_profile::{PageRange, TagMarker};
use ntd_schemas::Uid;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReaderError {
    /// Tag left the field mid-operation.
    TagRemoved,
    /// Nothing happened before the reader's idle timeout.
    Timeout,
    Io(String),
}

impl fmt::Display for ReaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReaderError::TagRemoved => write!(f, "tag removed from reader"),
            ReaderError::Timeout => write!(f, "reader timed out"),
            ReaderError::Io(msg) => write!(f, "reader I/O error: {msg}"),
        }
    }
}

impl std::error::Error for ReaderError {}

/// Hardware boundary for a single-slot Type 2 reader.
///
/// Calls block. `read_block`/`write_block` operate on the whole NDEF data area
/// starting at page 4; the reader pads writes to a page boundary.
pub trait TagReader {
    /// Block until a tag is in the field and return its UID.
    fn wait_for_tag(&mut self) -> Result<Uid, ReaderError>;

    /// Block until `uid` has left the field.
    fn wait_for_removal(&mut self, uid: &Uid) -> Result<(), ReaderError>;

    /// What the tag reports about itself (GET_VERSION or capability container).
    fn identify(&mut self, uid: &Uid) -> Result<TagMarker<'static>, ReaderError>;

    fn read_block(&mut self, uid: &Uid) -> Result<Vec<u8>, ReaderError>;

    fn write_block(&mut self, uid: &Uid, bytes: &[u8]) -> Result<(), ReaderError>;

    /// Set the dynamic lock bits covering `pages`. Irreversible on real tags.
    fn set_lock_bits(&mut self, uid: &Uid, pages: PageRange) -> Result<(), ReaderError>;

    /// Raw dynamic lock bytes covering `pages`.
    fn read_lock_bits(&mut self, uid: &Uid, pages: PageRange) -> Result<Vec<u8>, ReaderError>;
}

impl<R: TagReader + ?Sized> TagReader for &mut R {
    fn wait_for_tag(&mut self) -> Result<Uid, ReaderError> {
        (**self).wait_for_tag()
    }
    fn wait_for_removal(&mut self, uid: &Uid) -> Result<(), ReaderError> {
        (**self).wait_for_removal(uid)
    }
    fn identify(&mut self, uid: &Uid) -> Result<TagMarker<'static>, ReaderError> {
        (**self).identify(uid)
    }
    fn read_block(&mut self, uid: &Uid) -> Result<Vec<u8>, ReaderError> {
        (**self).read_block(uid)
    }
    fn write_block(&mut self, uid: &Uid, bytes: &[u8]) -> Result<(), ReaderError> {
        (**self).write_block(uid, bytes)
    }
    fn set_lock_bits(&mut self, uid: &Uid, pages: PageRange) -> Result<(), ReaderError> {
        (**self).set_lock_bits(uid, pages)
    }
    fn read_lock_bits(&mut self, uid: &Uid, pages: PageRange) -> Result<Vec<u8>, ReaderError> {
        (**self).read_lock_bits(uid, pages)
    }
}
