//! Deterministic in-memory Type 2 reader.
//!
//! A "tag deck" is a set of simulated tags plus the order in which they are
//! placed on the reader. Design decisions:
//! - A presented tag stays on the reader until `wait_for_removal`; repeated
//!   `wait_for_tag` calls return it again (operator retrying in place).
//! - With nothing on the reader and nothing left to present,
//!   `wait_for_tag` sleeps for the idle timeout and returns `Timeout`.
//! - Writes are padded to whole pages and refused past user memory or once
//!   the tag is locked.
//! - Lock bits are the profile's dynamic lock bytes. No partial locking.
//! - No randomness. No clock except the optional idle sleep.
//!
//! Decks load from and save to JSON so a `batch` run can be inspected with
//! `read` afterwards.

mod deck;

pub use deck::{DeckFile, DeckTag};

use anyhow::{Context, Result};
use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use ntd_execution::{ReaderError, TagReader};
use ntd_profile::{profile_by_kind, PageRange, TagKind, TagMarker, TagProfile};
use ntd_schemas::Uid;

/// One simulated tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimTag {
    pub uid: Uid,
    pub profile: &'static TagProfile,
    /// User memory from page 4, `profile.total_bytes` long.
    pub memory: Vec<u8>,
    pub lock: Vec<u8>,
    /// The next N writes fail with an I/O error.
    pub fail_writes: u32,
    /// `set_lock_bits` reports success but changes nothing.
    pub lock_stuck: bool,
}

impl SimTag {
    pub fn blank(uid: Uid, kind: TagKind) -> Self {
        let profile = profile_by_kind(kind);
        Self {
            uid,
            profile,
            memory: vec![0; usize::from(profile.total_bytes)],
            lock: vec![0; profile.dynamic_lock_bytes.len()],
            fail_writes: 0,
            lock_stuck: false,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.profile.any_lock_bit_set(&self.lock)
    }
}

#[derive(Clone, Debug, Default)]
pub struct SimReader {
    tags: BTreeMap<Uid, SimTag>,
    queue: VecDeque<Uid>,
    present: Option<Uid>,
    /// Deck named its own presentation order.
    scripted: bool,
    idle_timeout: Duration,
}

impl SimReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idle_timeout(mut self, idle: Duration) -> Self {
        self.idle_timeout = idle;
        self
    }

    /// Register a tag without presenting it.
    pub fn add_tag(&mut self, tag: SimTag) {
        self.tags.insert(tag.uid.clone(), tag);
    }

    /// Queue `uid` to be placed on the reader.
    pub fn present(&mut self, uid: Uid) {
        self.queue.push_back(uid);
    }

    pub fn tag(&self, uid: &Uid) -> Option<&SimTag> {
        self.tags.get(uid)
    }

    pub fn tag_mut(&mut self, uid: &Uid) -> Option<&mut SimTag> {
        self.tags.get_mut(uid)
    }

    /// Present `uids` in this order, unless the deck scripted its own.
    ///
    /// An unscripted deck stands in for an operator who places tags in the
    /// order they are asked for. Unknown UIDs are ignored.
    pub fn follow_plan<'a>(&mut self, uids: impl IntoIterator<Item = &'a Uid>) {
        if self.scripted {
            return;
        }
        self.queue = uids
            .into_iter()
            .filter(|u| self.tags.contains_key(*u))
            .cloned()
            .collect();
    }

    /// Tags still waiting to be presented.
    pub fn pending_presentations(&self) -> usize {
        self.queue.len()
    }

    pub fn from_deck(deck: DeckFile) -> Result<Self> {
        let mut reader = Self::new();
        let mut order = Vec::with_capacity(deck.tags.len());
        for t in deck.tags {
            let tag = t.into_sim_tag()?;
            order.push(tag.uid.clone());
            reader.add_tag(tag);
        }
        reader.scripted = !deck.presentations.is_empty();
        let presentations = if reader.scripted {
            deck.presentations
        } else {
            order
        };
        for uid in presentations {
            anyhow::ensure!(
                reader.tags.contains_key(&uid),
                "deck presents unknown tag {uid}"
            );
            reader.present(uid);
        }
        Ok(reader)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read tag deck {}", path.display()))?;
        let deck: DeckFile = serde_json::from_str(&raw)
            .with_context(|| format!("parse tag deck {}", path.display()))?;
        Self::from_deck(deck).with_context(|| format!("load tag deck {}", path.display()))
    }

    /// Deck reflecting current tag contents. Presentations are not saved:
    /// a reloaded deck presents every tag once, in UID order.
    pub fn to_deck(&self) -> DeckFile {
        DeckFile {
            tags: self.tags.values().map(DeckTag::from_sim_tag).collect(),
            presentations: Vec::new(),
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(&self.to_deck()).context("serialize tag deck")?;
        fs::write(path, json + "\n").with_context(|| format!("write tag deck {}", path.display()))
    }

    fn present_tag(&mut self, uid: &Uid) -> Result<&mut SimTag, ReaderError> {
        if self.present.as_ref() != Some(uid) {
            return Err(ReaderError::TagRemoved);
        }
        self.tags
            .get_mut(uid)
            .ok_or_else(|| ReaderError::Io(format!("unknown tag {uid}")))
    }
}

impl TagReader for SimReader {
    fn wait_for_tag(&mut self) -> Result<Uid, ReaderError> {
        if let Some(uid) = &self.present {
            return Ok(uid.clone());
        }
        match self.queue.pop_front() {
            Some(uid) => {
                debug!(%uid, "sim: tag placed on reader");
                self.present = Some(uid.clone());
                Ok(uid)
            }
            None => {
                if !self.idle_timeout.is_zero() {
                    std::thread::sleep(self.idle_timeout);
                }
                Err(ReaderError::Timeout)
            }
        }
    }

    fn wait_for_removal(&mut self, uid: &Uid) -> Result<(), ReaderError> {
        if self.present.as_ref() == Some(uid) {
            debug!(%uid, "sim: tag removed from reader");
            self.present = None;
        }
        Ok(())
    }

    fn identify(&mut self, uid: &Uid) -> Result<TagMarker<'static>, ReaderError> {
        let tag = self.present_tag(uid)?;
        Ok(TagMarker::ProductType(tag.profile.product_type))
    }

    fn read_block(&mut self, uid: &Uid) -> Result<Vec<u8>, ReaderError> {
        Ok(self.present_tag(uid)?.memory.clone())
    }

    fn write_block(&mut self, uid: &Uid, bytes: &[u8]) -> Result<(), ReaderError> {
        let tag = self.present_tag(uid)?;
        if tag.fail_writes > 0 {
            tag.fail_writes -= 1;
            return Err(ReaderError::Io("simulated write failure".to_string()));
        }
        if tag.is_locked() {
            return Err(ReaderError::Io("write to locked page".to_string()));
        }
        let page = usize::from(tag.profile.page_size);
        let padded = bytes.len().div_ceil(page) * page;
        if padded > tag.memory.len() {
            return Err(ReaderError::Io(format!(
                "write of {} bytes past end of {}-byte user memory",
                bytes.len(),
                tag.memory.len()
            )));
        }
        tag.memory[..bytes.len()].copy_from_slice(bytes);
        tag.memory[bytes.len()..padded].fill(0);
        Ok(())
    }

    fn set_lock_bits(&mut self, uid: &Uid, pages: PageRange) -> Result<(), ReaderError> {
        let tag = self.present_tag(uid)?;
        if pages != tag.profile.lockable_pages() {
            return Err(ReaderError::Io(format!(
                "unsupported lock range {pages}, tag locks {}",
                tag.profile.lockable_pages()
            )));
        }
        if !tag.lock_stuck {
            for (have, want) in tag.lock.iter_mut().zip(tag.profile.dynamic_lock_bytes) {
                *have |= *want;
            }
        }
        Ok(())
    }

    fn read_lock_bits(&mut self, uid: &Uid, _pages: PageRange) -> Result<Vec<u8>, ReaderError> {
        Ok(self.present_tag(uid)?.lock.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uid(n: u8) -> Uid {
        Uid::from_bytes([0x04, 0x10, 0x20, 0x30, 0x40, 0x50, n])
    }

    fn reader() -> SimReader {
        let mut r = SimReader::new();
        r.add_tag(SimTag::blank(uid(1), TagKind::Ntag213));
        r.add_tag(SimTag::blank(uid(2), TagKind::Ntag215));
        r.present(uid(1));
        r.present(uid(2));
        r
    }

    #[test]
    fn tag_stays_until_removed() {
        let mut r = reader();
        assert_eq!(r.wait_for_tag().unwrap(), uid(1));
        assert_eq!(r.wait_for_tag().unwrap(), uid(1));
        r.wait_for_removal(&uid(1)).unwrap();
        assert_eq!(r.wait_for_tag().unwrap(), uid(2));
        r.wait_for_removal(&uid(2)).unwrap();
        assert_eq!(r.wait_for_tag().unwrap_err(), ReaderError::Timeout);
    }

    #[test]
    fn io_on_absent_tag_is_removed() {
        let mut r = reader();
        assert_eq!(r.read_block(&uid(1)).unwrap_err(), ReaderError::TagRemoved);
    }

    #[test]
    fn writes_pad_and_respect_capacity() {
        let mut r = reader();
        r.wait_for_tag().unwrap();
        r.write_block(&uid(1), &[0xAA; 5]).unwrap();
        let mem = r.read_block(&uid(1)).unwrap();
        assert_eq!(&mem[..8], &[0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0, 0, 0]);
        assert!(matches!(
            r.write_block(&uid(1), &[0u8; 145]),
            Err(ReaderError::Io(_))
        ));
    }

    #[test]
    fn lock_then_write_is_refused() {
        let mut r = reader();
        r.wait_for_tag().unwrap();
        let pages = profile_by_kind(TagKind::Ntag213).lockable_pages();
        r.set_lock_bits(&uid(1), pages).unwrap();
        assert_eq!(r.read_lock_bits(&uid(1), pages).unwrap(), vec![0xFF, 0xFF, 0x00]);
        assert!(r.write_block(&uid(1), &[1]).is_err());
    }

    #[test]
    fn unscripted_reader_follows_plan_order() {
        let mut r = reader();
        r.follow_plan([&uid(2), &uid(7), &uid(1)]);
        assert_eq!(r.pending_presentations(), 2);
        assert_eq!(r.wait_for_tag().unwrap(), uid(2));
    }
}
