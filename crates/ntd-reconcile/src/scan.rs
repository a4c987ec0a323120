//! Scan step: record which tags are on the desk, in presentation order.

use anyhow::Result;
use serde_json::json;
use std::collections::HashSet;
use tracing::{info, warn};

use ntd_schemas::{record_or_warn, EventKind, LogEntry, OperationLog, ScanEntry, Uid};

/// What one presentation at the reader produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScanEvent {
    Tag(ScanEntry),
    /// Tag already has lock bits set. Never recorded.
    Locked(Uid),
    /// Tag was read but cannot be used (unsupported kind, unreadable).
    Rejected { uid: Option<Uid>, reason: String },
    /// Nothing presented before the source gave up waiting.
    Timeout,
    /// Operator ended the session.
    Stopped,
}

pub trait ScanSource {
    fn scan_next_tag(&mut self) -> Result<ScanEvent>;
}

impl<S: ScanSource + ?Sized> ScanSource for &mut S {
    fn scan_next_tag(&mut self) -> Result<ScanEvent> {
        (**self).scan_next_tag()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub recorded: usize,
    pub duplicates_ignored: usize,
    pub locked_refused: usize,
    pub rejected: usize,
    pub timeouts: usize,
    /// Stopped before the target was reached.
    pub stopped_early: bool,
}

/// Accumulates scan entries until `target` tags are recorded or the source
/// stops. A session can resume from an earlier inventory.
#[derive(Debug)]
pub struct ScanSession {
    target: Option<usize>,
    entries: Vec<ScanEntry>,
    seen: HashSet<Uid>,
}

impl ScanSession {
    /// `target` is the number of assignments to cover; `None` scans until stopped.
    pub fn new(target: Option<usize>) -> Self {
        Self::resume(Vec::new(), target)
    }

    pub fn resume(existing: Vec<ScanEntry>, target: Option<usize>) -> Self {
        let seen = existing.iter().map(|e| e.uid.clone()).collect();
        Self {
            target,
            entries: existing,
            seen,
        }
    }

    pub fn entries(&self) -> &[ScanEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<ScanEntry> {
        self.entries
    }

    pub fn remaining(&self) -> Option<usize> {
        self.target.map(|t| t.saturating_sub(self.entries.len()))
    }

    fn is_complete(&self) -> bool {
        self.remaining() == Some(0)
    }

    /// Drive `source` until complete or stopped.
    ///
    /// `on_recorded` runs for each newly recorded entry (the CLI appends it to
    /// the inventory file there). Its error ends the session.
    pub fn run<S, L, F>(&mut self, source: &mut S, log: &mut L, mut on_recorded: F) -> Result<ScanReport>
    where
        S: ScanSource + ?Sized,
        L: OperationLog + ?Sized,
        F: FnMut(&ScanEntry) -> Result<()>,
    {
        let mut report = ScanReport::default();

        while !self.is_complete() {
            match source.scan_next_tag()? {
                ScanEvent::Tag(entry) => {
                    if self.seen.contains(&entry.uid) {
                        warn!(uid = %entry.uid, "tag already scanned, ignoring");
                        report.duplicates_ignored += 1;
                        continue;
                    }
                    on_recorded(&entry)?;
                    record_or_warn(
                        log,
                        LogEntry::new(
                            EventKind::ScanRecorded,
                            Some(&entry.uid),
                            json!({
                                "position": self.entries.len() + 1,
                                "tag_kind": entry.detected_profile.kind.as_str(),
                            }),
                        ),
                    );
                    info!(
                        uid = %entry.uid,
                        tag_kind = entry.detected_profile.name,
                        remaining = ?self.remaining().map(|r| r.saturating_sub(1)),
                        "tag recorded"
                    );
                    self.seen.insert(entry.uid.clone());
                    self.entries.push(entry);
                    report.recorded += 1;
                }
                ScanEvent::Locked(uid) => {
                    warn!(%uid, "tag is locked, not recording");
                    report.locked_refused += 1;
                }
                ScanEvent::Rejected { uid, reason } => {
                    warn!(uid = ?uid.as_ref().map(Uid::as_str), %reason, "tag rejected");
                    report.rejected += 1;
                }
                ScanEvent::Timeout => {
                    warn!("no tag presented before timeout, still scanning");
                    report.timeouts += 1;
                }
                ScanEvent::Stopped => {
                    report.stopped_early = !self.is_complete() && self.target.is_some();
                    if let Some(left) = self.remaining().filter(|r| *r > 0) {
                        warn!(unassigned = left, "scan stopped with assignments left");
                    }
                    break;
                }
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ntd_profile::{profile_by_kind, TagKind};
    use ntd_schemas::NullLog;
    use std::collections::VecDeque;

    struct Queue(VecDeque<ScanEvent>);

    impl ScanSource for Queue {
        fn scan_next_tag(&mut self) -> Result<ScanEvent> {
            Ok(self.0.pop_front().unwrap_or(ScanEvent::Stopped))
        }
    }

    fn entry(n: u8) -> ScanEntry {
        ScanEntry::new(
            Uid::from_bytes([0x04, 0, 0, 0, 0, 0, n]),
            profile_by_kind(TagKind::Ntag213),
        )
    }

    #[test]
    fn stops_at_target_and_skips_noise() {
        let mut src = Queue(VecDeque::from(vec![
            ScanEvent::Tag(entry(1)),
            ScanEvent::Timeout,
            ScanEvent::Tag(entry(1)),
            ScanEvent::Locked(entry(9).uid),
            ScanEvent::Tag(entry(2)),
            ScanEvent::Tag(entry(3)),
        ]));
        let mut session = ScanSession::new(Some(2));
        let mut sunk = Vec::new();
        let report = session
            .run(&mut src, &mut NullLog, |e| {
                sunk.push(e.uid.clone());
                Ok(())
            })
            .unwrap();

        assert_eq!(session.entries(), &[entry(1), entry(2)]);
        assert_eq!(sunk, vec![entry(1).uid, entry(2).uid]);
        assert_eq!(report.duplicates_ignored, 1);
        assert_eq!(report.locked_refused, 1);
        assert_eq!(report.timeouts, 1);
        assert!(!report.stopped_early);
        // Third tag was never pulled.
        assert_eq!(src.0.len(), 1);
    }

    #[test]
    fn resume_counts_existing_and_refuses_their_uids() {
        let mut src = Queue(VecDeque::from(vec![
            ScanEvent::Tag(entry(1)),
            ScanEvent::Stopped,
        ]));
        let mut session = ScanSession::resume(vec![entry(1)], Some(3));
        let report = session.run(&mut src, &mut NullLog, |_| Ok(())).unwrap();
        assert_eq!(report.duplicates_ignored, 1);
        assert!(report.stopped_early);
        assert_eq!(session.remaining(), Some(2));
    }
}
