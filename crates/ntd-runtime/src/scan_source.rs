use anyhow::Result;
use tracing::debug;

use ntd_execution::{ReaderError, TagReader};
use ntd_profile::profile_for;
use ntd_reconcile::{ScanEvent, ScanSource};
use ntd_schemas::ScanEntry;

/// Scan source backed by a tag reader.
///
/// Each call waits for one tag, identifies it, checks its lock bits and then
/// waits for it to leave the field. Reader I/O trouble on a presented tag
/// becomes [`ScanEvent::Rejected`]; the session keeps going.
pub struct ReaderScanSource<R> {
    reader: R,
    timeout_limit: Option<u32>,
    timeouts_in_row: u32,
}

impl<R: TagReader> ReaderScanSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            timeout_limit: None,
            timeouts_in_row: 0,
        }
    }

    /// Report [`ScanEvent::Stopped`] after `n` timeouts in a row.
    pub fn with_timeout_limit(mut self, n: u32) -> Self {
        self.timeout_limit = Some(n);
        self
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    fn inspect(&mut self, uid: &ntd_schemas::Uid) -> Result<ScanEvent, ReaderError> {
        let marker = self.reader.identify(uid)?;
        let profile = match profile_for(marker) {
            Ok(p) => p,
            Err(e) => {
                return Ok(ScanEvent::Rejected {
                    uid: Some(uid.clone()),
                    reason: e.to_string(),
                })
            }
        };
        let lock = self.reader.read_lock_bits(uid, profile.lockable_pages())?;
        if profile.any_lock_bit_set(&lock) {
            return Ok(ScanEvent::Locked(uid.clone()));
        }
        Ok(ScanEvent::Tag(ScanEntry::new(uid.clone(), profile)))
    }
}

impl<R: TagReader> ScanSource for ReaderScanSource<R> {
    fn scan_next_tag(&mut self) -> Result<ScanEvent> {
        let uid = match self.reader.wait_for_tag() {
            Ok(uid) => uid,
            Err(ReaderError::Timeout) => {
                self.timeouts_in_row += 1;
                if self.timeout_limit.is_some_and(|n| self.timeouts_in_row >= n) {
                    debug!(timeouts = self.timeouts_in_row, "reader idle, ending scan");
                    return Ok(ScanEvent::Stopped);
                }
                return Ok(ScanEvent::Timeout);
            }
            Err(e) => {
                return Ok(ScanEvent::Rejected {
                    uid: None,
                    reason: e.to_string(),
                })
            }
        };
        self.timeouts_in_row = 0;

        let event = self.inspect(&uid).unwrap_or_else(|e| ScanEvent::Rejected {
            uid: Some(uid.clone()),
            reason: e.to_string(),
        });
        if let Err(e) = self.reader.wait_for_removal(&uid) {
            debug!(%uid, error = %e, "removal not confirmed after scan");
        }
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ntd_profile::{PageRange, TagMarker};
    use ntd_schemas::Uid;
    use std::collections::VecDeque;

    /// Presents `(uid, product_type, lock)` triples, then times out.
    struct Desk(VecDeque<(Uid, u8, Vec<u8>)>, Option<(Uid, u8, Vec<u8>)>);

    impl TagReader for Desk {
        fn wait_for_tag(&mut self) -> Result<Uid, ReaderError> {
            self.1 = self.0.pop_front();
            self.1.as_ref().map(|t| t.0.clone()).ok_or(ReaderError::Timeout)
        }
        fn wait_for_removal(&mut self, _uid: &Uid) -> Result<(), ReaderError> {
            self.1 = None;
            Ok(())
        }
        fn identify(&mut self, _uid: &Uid) -> Result<TagMarker<'static>, ReaderError> {
            let t = self.1.as_ref().ok_or(ReaderError::TagRemoved)?;
            Ok(TagMarker::ProductType(t.1))
        }
        fn read_block(&mut self, _uid: &Uid) -> Result<Vec<u8>, ReaderError> {
            Ok(Vec::new())
        }
        fn write_block(&mut self, _uid: &Uid, _bytes: &[u8]) -> Result<(), ReaderError> {
            Err(ReaderError::Io("read only".into()))
        }
        fn set_lock_bits(&mut self, _uid: &Uid, _pages: PageRange) -> Result<(), ReaderError> {
            Err(ReaderError::Io("read only".into()))
        }
        fn read_lock_bits(&mut self, _uid: &Uid, _pages: PageRange) -> Result<Vec<u8>, ReaderError> {
            let t = self.1.as_ref().ok_or(ReaderError::TagRemoved)?;
            Ok(t.2.clone())
        }
    }

    fn u(n: u8) -> Uid {
        Uid::from_bytes([0x04, 1, 2, 3, 4, 5, n])
    }

    #[test]
    fn classifies_each_presentation() {
        let desk = Desk(
            VecDeque::from(vec![
                (u(1), 0x11, vec![0, 0, 0]),
                (u(2), 0x11, vec![0xFF, 0xFF, 0]),
                (u(3), 0x99, vec![0, 0, 0]),
            ]),
            None,
        );
        let mut src = ReaderScanSource::new(desk).with_timeout_limit(2);

        assert!(matches!(src.scan_next_tag().unwrap(), ScanEvent::Tag(e) if e.uid == u(1)));
        assert_eq!(src.scan_next_tag().unwrap(), ScanEvent::Locked(u(2)));
        assert!(matches!(
            src.scan_next_tag().unwrap(),
            ScanEvent::Rejected { uid: Some(ref x), ref reason } if *x == u(3) && reason.contains("0x99")
        ));
        assert_eq!(src.scan_next_tag().unwrap(), ScanEvent::Timeout);
        assert_eq!(src.scan_next_tag().unwrap(), ScanEvent::Stopped);
    }
}
