use std::collections::VecDeque;
use tracing::debug;

use ntd_execution::{CancelFlag, ReaderError, TagReader};
use ntd_profile::{PageRange, TagMarker};
use ntd_schemas::Uid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReaderOp {
    WaitForTag,
    WaitForRemoval,
    Identify,
    ReadBlock,
    WriteBlock,
    SetLockBits,
    ReadLockBits,
}

/// One call that reached the wrapper, and whether it succeeded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReaderCall {
    pub op: ReaderOp,
    pub uid: Option<Uid>,
    pub ok: bool,
}

struct Injection {
    op: ReaderOp,
    uid: Option<Uid>,
    error: ReaderError,
    remaining: u32,
}

/// Wraps a reader and fails chosen calls.
///
/// Injected errors never reach the inner reader, so a failed `write_block`
/// leaves the tag untouched.
pub struct FaultyReader<R> {
    inner: R,
    injections: Vec<Injection>,
    wrong_tags: VecDeque<Uid>,
    cancel_after: Option<(ReaderOp, CancelFlag)>,
    calls: Vec<ReaderCall>,
}

impl<R: TagReader> FaultyReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            injections: Vec::new(),
            wrong_tags: VecDeque::new(),
            cancel_after: None,
            calls: Vec::new(),
        }
    }

    /// Fail the next `times` calls of `op` on any tag.
    pub fn fail(mut self, op: ReaderOp, error: ReaderError, times: u32) -> Self {
        self.injections.push(Injection {
            op,
            uid: None,
            error,
            remaining: times,
        });
        self
    }

    /// Fail the next `times` calls of `op` on `uid` only.
    pub fn fail_for(mut self, uid: Uid, op: ReaderOp, error: ReaderError, times: u32) -> Self {
        self.injections.push(Injection {
            op,
            uid: Some(uid),
            error,
            remaining: times,
        });
        self
    }

    /// The next `wait_for_tag` reports `uid` instead of whatever is present.
    pub fn present_wrong_tag(mut self, uid: Uid) -> Self {
        self.wrong_tags.push_back(uid);
        self
    }

    /// Trip `cancel` right after the first successful `op`, the way a
    /// Ctrl-C lands while the reader is busy.
    pub fn cancel_after(mut self, op: ReaderOp, cancel: CancelFlag) -> Self {
        self.cancel_after = Some((op, cancel));
        self
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    pub fn calls(&self) -> &[ReaderCall] {
        &self.calls
    }

    /// Successful calls of `op` on `uid`.
    pub fn committed(&self, op: ReaderOp, uid: &Uid) -> usize {
        self.calls
            .iter()
            .filter(|c| c.op == op && c.ok && c.uid.as_ref() == Some(uid))
            .count()
    }

    fn injected(&mut self, op: ReaderOp, uid: Option<&Uid>) -> Option<ReaderError> {
        let hit = self.injections.iter_mut().find(|i| {
            i.op == op && i.remaining > 0 && (i.uid.is_none() || i.uid.as_ref() == uid)
        })?;
        hit.remaining -= 1;
        debug!(?op, error = %hit.error, "injected reader fault");
        Some(hit.error.clone())
    }

    fn call<T>(
        &mut self,
        op: ReaderOp,
        uid: Option<&Uid>,
        f: impl FnOnce(&mut R) -> Result<T, ReaderError>,
    ) -> Result<T, ReaderError> {
        let result = match self.injected(op, uid) {
            Some(err) => Err(err),
            None => f(&mut self.inner),
        };
        self.calls.push(ReaderCall {
            op,
            uid: uid.cloned(),
            ok: result.is_ok(),
        });
        if result.is_ok() && self.cancel_after.as_ref().is_some_and(|(o, _)| *o == op) {
            if let Some((_, cancel)) = self.cancel_after.take() {
                debug!(?op, "cancelling after reader call");
                cancel.cancel();
            }
        }
        result
    }
}

impl<R: TagReader> TagReader for FaultyReader<R> {
    fn wait_for_tag(&mut self) -> Result<Uid, ReaderError> {
        if let Some(wrong) = self.wrong_tags.pop_front() {
            self.calls.push(ReaderCall {
                op: ReaderOp::WaitForTag,
                uid: Some(wrong.clone()),
                ok: true,
            });
            return Ok(wrong);
        }
        self.call(ReaderOp::WaitForTag, None, |r| r.wait_for_tag())
    }

    fn wait_for_removal(&mut self, uid: &Uid) -> Result<(), ReaderError> {
        self.call(ReaderOp::WaitForRemoval, Some(uid), |r| r.wait_for_removal(uid))
    }

    fn identify(&mut self, uid: &Uid) -> Result<TagMarker<'static>, ReaderError> {
        self.call(ReaderOp::Identify, Some(uid), |r| r.identify(uid))
    }

    fn read_block(&mut self, uid: &Uid) -> Result<Vec<u8>, ReaderError> {
        self.call(ReaderOp::ReadBlock, Some(uid), |r| r.read_block(uid))
    }

    fn write_block(&mut self, uid: &Uid, bytes: &[u8]) -> Result<(), ReaderError> {
        self.call(ReaderOp::WriteBlock, Some(uid), |r| r.write_block(uid, bytes))
    }

    fn set_lock_bits(&mut self, uid: &Uid, pages: PageRange) -> Result<(), ReaderError> {
        self.call(ReaderOp::SetLockBits, Some(uid), |r| r.set_lock_bits(uid, pages))
    }

    fn read_lock_bits(&mut self, uid: &Uid, pages: PageRange) -> Result<Vec<u8>, ReaderError> {
        self.call(ReaderOp::ReadLockBits, Some(uid), |r| r.read_lock_bits(uid, pages))
    }
}
