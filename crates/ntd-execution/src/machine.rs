use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use ntd_ndef::{decode, encode, EncodeOptions};
use ntd_profile::profile_for;
use ntd_schemas::{
    record_or_warn, EventKind, LogEntry, OperationLog, OutcomeStatus, WriteOutcome, WritePlanItem,
};

use crate::{
    FailReason, Fault, FaultContext, FaultDecision, LockDecision, Operator, ReaderError, TagReader,
    TagState,
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Cooperative stop request.
///
/// Honoured only where the tag's real state is settled: before a write is
/// started, or at the lock prompt after a verified write. A write always runs
/// on to its read-back, and a chosen lock always runs on to its lock check.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MachineConfig {
    pub lock_requested: bool,
    /// Overwrite a tag that already carries a different record.
    pub force: bool,
    pub encode: EncodeOptions,
    /// Attempts per tag before giving up. 0 = unlimited.
    pub max_attempts: u32,
}

/// How one tag ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TagRun {
    pub outcome: WriteOutcome,
    pub final_state: TagState,
    /// Operator (or cancellation) asked to stop the batch.
    pub quit: bool,
    /// Operator declined locking for the rest of the run.
    pub decline_all: bool,
    pub attempts: u32,
}

// ---------------------------------------------------------------------------
// Machine
// ---------------------------------------------------------------------------

enum Step {
    Next(TagState),
    Fault(Fault),
}

#[derive(Default)]
struct Progress {
    attempts: u32,
    /// Record read back and matched. Never reset within a run.
    verified: bool,
    /// After re-detecting, jump straight back to Locking.
    resume_lock: bool,
    /// Wrong tag to wait out before detecting again.
    pending_removal: Option<ntd_schemas::Uid>,
    quit: bool,
    decline_all: bool,
}

fn fault_from(err: ReaderError, io: fn(String) -> Fault) -> Fault {
    match err {
        ReaderError::TagRemoved => Fault::TagRemoved,
        other => io(other.to_string()),
    }
}

/// States where stopping leaves the tag exactly as the outcome reports it.
fn cancel_point(state: &TagState, p: &Progress) -> bool {
    match state {
        // Re-detecting for a lock retry: lock bits may already be partly set.
        TagState::Detecting => !p.resume_lock,
        TagState::Formatting | TagState::Writing | TagState::LockPending => true,
        _ => false,
    }
}

/// Drives one plan item through the write/lock lifecycle.
pub struct WriteMachine<'a, R: ?Sized, O: ?Sized, L: ?Sized> {
    reader: &'a mut R,
    operator: &'a mut O,
    log: &'a mut L,
    config: MachineConfig,
    cancel: CancelFlag,
}

impl<'a, R, O, L> WriteMachine<'a, R, O, L>
where
    R: TagReader + ?Sized,
    O: Operator + ?Sized,
    L: OperationLog + ?Sized,
{
    pub fn new(reader: &'a mut R, operator: &'a mut O, log: &'a mut L, config: MachineConfig) -> Self {
        Self {
            reader,
            operator,
            log,
            config,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run `item` to a terminal state. Exactly one outcome is produced.
    ///
    /// `locks_declined` carries a run-wide "decline all" from earlier tags.
    pub fn run(&mut self, item: &WritePlanItem, locks_declined: bool) -> TagRun {
        let mut p = Progress {
            attempts: 1,
            decline_all: locks_declined,
            ..Progress::default()
        };
        let mut state = TagState::Idle;
        self.transition(item, &mut state, TagState::Detecting);

        while !state.is_terminal() {
            if self.cancel.is_cancelled() && cancel_point(&state, &p) {
                p.quit = true;
                let next = if p.verified {
                    TagState::Done {
                        locked: false,
                        detail: Some("cancelled".to_string()),
                    }
                } else {
                    TagState::Skipped("cancelled".to_string())
                };
                self.transition(item, &mut state, next);
                break;
            }

            let step = match &state {
                TagState::Detecting => self.detect(item, &mut p),
                TagState::Formatting => self.format(item),
                TagState::Writing => self.write(item),
                TagState::Verifying => self.verify(item, &mut p),
                TagState::LockPending => self.lock_pending(item, &mut p),
                TagState::Locking => self.lock(item),
                TagState::VerifyingLock => self.verify_lock(item),
                TagState::Idle => Step::Next(TagState::Detecting),
                TagState::Done { .. } | TagState::Failed(_) | TagState::Skipped(_) => break,
            };

            let next = match step {
                Step::Next(s) => s,
                Step::Fault(fault) => self.handle_fault(item, &state, fault, &mut p),
            };
            self.transition(item, &mut state, next);
        }

        let outcome = self.outcome(item, &state);
        TagRun {
            outcome,
            final_state: state,
            quit: p.quit,
            decline_all: p.decline_all && !locks_declined,
            attempts: p.attempts,
        }
    }

    // -- states --------------------------------------------------------------

    fn detect(&mut self, item: &WritePlanItem, p: &mut Progress) -> Step {
        if let Some(wrong) = p.pending_removal.take() {
            if let Err(e) = self.reader.wait_for_removal(&wrong) {
                p.pending_removal = Some(wrong);
                return Step::Fault(match e {
                    ReaderError::Timeout => Fault::DetectTimeout,
                    other => fault_from(other, Fault::ReaderIo),
                });
            }
        }

        match self.reader.wait_for_tag() {
            Ok(uid) if uid == item.uid => {
                debug!(%uid, "planned tag presented");
                if p.resume_lock {
                    p.resume_lock = false;
                    Step::Next(TagState::Locking)
                } else {
                    Step::Next(TagState::Formatting)
                }
            }
            Ok(found) => Step::Fault(Fault::UnexpectedTag {
                expected: item.uid.clone(),
                found,
            }),
            Err(ReaderError::Timeout) => Step::Fault(Fault::DetectTimeout),
            Err(e) => Step::Fault(fault_from(e, Fault::ReaderIo)),
        }
    }

    fn format(&mut self, item: &WritePlanItem) -> Step {
        let uid = &item.uid;
        let marker = match self.reader.identify(uid) {
            Ok(m) => m,
            Err(e) => return Step::Fault(fault_from(e, Fault::ReaderIo)),
        };
        let profile = match profile_for(marker) {
            Ok(p) => p,
            Err(e) => return Step::Next(TagState::Failed(FailReason::UnsupportedTag(e.to_string()))),
        };
        if profile.kind != item.detected_profile.kind {
            return Step::Next(TagState::Failed(FailReason::ProfileMismatch {
                expected: item.detected_profile.kind,
                found: profile.kind,
            }));
        }

        let lock = match self.reader.read_lock_bits(uid, profile.lockable_pages()) {
            Ok(b) => b,
            Err(e) => return Step::Fault(fault_from(e, Fault::ReaderIo)),
        };
        if profile.any_lock_bit_set(&lock) {
            return Step::Next(TagState::Failed(FailReason::TagAlreadyLocked));
        }

        let data = match self.reader.read_block(uid) {
            Ok(d) => d,
            Err(e) => return Step::Fault(fault_from(e, Fault::ReaderIo)),
        };
        match decode(&data, profile) {
            Ok(existing) if existing == item.record => {
                debug!(%uid, "tag already carries this record, rewriting");
            }
            Ok(existing) if !self.config.force => {
                return Step::Next(TagState::Failed(FailReason::ExistingRecord(
                    existing.to_string(),
                )));
            }
            Ok(existing) => {
                warn!(%uid, %existing, "overwriting existing record (force)");
            }
            Err(e) => {
                debug!(%uid, error = %e, "no readable record on tag");
            }
        }
        Step::Next(TagState::Writing)
    }

    fn write(&mut self, item: &WritePlanItem) -> Step {
        let bytes = match encode(&item.record, item.detected_profile, self.config.encode) {
            Ok(b) => b,
            Err(e) => return Step::Next(TagState::Failed(FailReason::Encode(e))),
        };
        match self.reader.write_block(&item.uid, &bytes) {
            Ok(()) => Step::Next(TagState::Verifying),
            Err(e) => Step::Fault(fault_from(e, Fault::WriteIoError)),
        }
    }

    fn verify(&mut self, item: &WritePlanItem, p: &mut Progress) -> Step {
        let data = match self.reader.read_block(&item.uid) {
            Ok(d) => d,
            Err(e) => return Step::Fault(fault_from(e, Fault::VerifyMismatch)),
        };
        match decode(&data, item.detected_profile) {
            Ok(r) if r == item.record => {
                p.verified = true;
                if !self.config.lock_requested {
                    Step::Next(TagState::Done {
                        locked: false,
                        detail: None,
                    })
                } else if p.decline_all {
                    Step::Next(TagState::Done {
                        locked: false,
                        detail: Some("lock declined".to_string()),
                    })
                } else {
                    Step::Next(TagState::LockPending)
                }
            }
            Ok(r) => Step::Fault(Fault::VerifyMismatch(format!("read back {r}"))),
            Err(e) => Step::Fault(Fault::VerifyMismatch(e.to_string())),
        }
    }

    fn lock_pending(&mut self, item: &WritePlanItem, p: &mut Progress) -> Step {
        let decision = self.operator.confirm_lock(&item.uid);
        record_or_warn(
            self.log,
            LogEntry::new(
                EventKind::OperatorDecision,
                Some(&item.uid),
                json!({ "prompt": "lock", "decision": decision.as_str() }),
            )
            .with_state(TagState::LockPending.name()),
        );
        let unlocked = |detail: &str| TagState::Done {
            locked: false,
            detail: Some(detail.to_string()),
        };
        match decision {
            LockDecision::Lock => Step::Next(TagState::Locking),
            LockDecision::SkipLock => Step::Next(unlocked("lock skipped")),
            LockDecision::DeclineAll => {
                p.decline_all = true;
                Step::Next(unlocked("lock declined"))
            }
            LockDecision::Quit => {
                p.quit = true;
                Step::Next(unlocked("operator quit"))
            }
        }
    }

    fn lock(&mut self, item: &WritePlanItem) -> Step {
        let pages = item.detected_profile.lockable_pages();
        match self.reader.set_lock_bits(&item.uid, pages) {
            Ok(()) => Step::Next(TagState::VerifyingLock),
            Err(e) => Step::Fault(fault_from(e, Fault::LockIoError)),
        }
    }

    fn verify_lock(&mut self, item: &WritePlanItem) -> Step {
        let profile = item.detected_profile;
        let bits = match self.reader.read_lock_bits(&item.uid, profile.lockable_pages()) {
            Ok(b) => b,
            Err(e) => return Step::Fault(fault_from(e, Fault::LockIoError)),
        };
        if profile.lock_bits_set(&bits) {
            Step::Next(TagState::Done {
                locked: true,
                detail: None,
            })
        } else {
            Step::Next(TagState::Failed(FailReason::LockVerificationFailed {
                expected: hex::encode_upper(profile.expected_lock_bits()),
                found: hex::encode_upper(&bits),
            }))
        }
    }

    // -- faults --------------------------------------------------------------

    fn handle_fault(
        &mut self,
        item: &WritePlanItem,
        state: &TagState,
        fault: Fault,
        p: &mut Progress,
    ) -> TagState {
        warn!(
            uid = %item.uid,
            state = state.name(),
            attempt = p.attempts,
            code = fault.code(),
            cause = %fault,
            "tag fault"
        );
        record_or_warn(
            self.log,
            LogEntry::new(
                EventKind::Fault,
                Some(&item.uid),
                json!({
                    "code": fault.code(),
                    "cause": fault.to_string(),
                    "attempt": p.attempts,
                }),
            )
            .with_state(state.name()),
        );

        if self.config.max_attempts > 0 && p.attempts >= self.config.max_attempts {
            return TagState::Failed(FailReason::RetryLimit {
                attempts: p.attempts,
            });
        }

        let ctx = FaultContext {
            uid: item.uid.clone(),
            state: state.clone(),
            fault: fault.clone(),
            attempt: p.attempts,
        };
        let decision = self.operator.on_fault(&ctx);
        record_or_warn(
            self.log,
            LogEntry::new(
                EventKind::OperatorDecision,
                Some(&item.uid),
                json!({ "prompt": "fault", "decision": decision.as_str() }),
            )
            .with_state(state.name()),
        );

        match decision {
            FaultDecision::Retry => {
                p.attempts += 1;
                let lock_stage = matches!(state, TagState::Locking | TagState::VerifyingLock);
                match fault {
                    Fault::UnexpectedTag { found, .. } => {
                        p.pending_removal = Some(found);
                        TagState::Detecting
                    }
                    Fault::TagRemoved if lock_stage => {
                        p.resume_lock = true;
                        TagState::Detecting
                    }
                    _ if lock_stage => TagState::Locking,
                    _ => TagState::Detecting,
                }
            }
            FaultDecision::Skip if p.verified => TagState::Done {
                locked: false,
                detail: Some("lock skipped".to_string()),
            },
            FaultDecision::Skip => TagState::Skipped("operator skip".to_string()),
            FaultDecision::Quit => {
                p.quit = true;
                if p.verified {
                    TagState::Done {
                        locked: false,
                        detail: Some("operator quit".to_string()),
                    }
                } else {
                    TagState::Skipped("operator quit".to_string())
                }
            }
        }
    }

    // -- bookkeeping ---------------------------------------------------------

    fn transition(&mut self, item: &WritePlanItem, state: &mut TagState, next: TagState) {
        debug!(uid = %item.uid, from = %state, to = %next, "transition");
        record_or_warn(
            self.log,
            LogEntry::new(
                EventKind::Transition,
                Some(&item.uid),
                json!({ "from": state.to_string(), "to": next.to_string() }),
            )
            .with_state(state.name()),
        );
        *state = next;
    }

    fn outcome(&mut self, item: &WritePlanItem, state: &TagState) -> WriteOutcome {
        let (status, detail) = match state {
            TagState::Done { locked: true, .. } => (OutcomeStatus::Locked, None),
            TagState::Done { detail, .. } => (OutcomeStatus::Written, detail.clone()),
            TagState::Failed(reason) => (OutcomeStatus::Failed, Some(reason.to_string())),
            TagState::Skipped(reason) => (OutcomeStatus::Skipped, Some(reason.clone())),
            other => (
                OutcomeStatus::Failed,
                Some(format!("ended in non-terminal state {other}")),
            ),
        };
        let outcome = WriteOutcome::new(item.uid.clone(), status, detail);

        if status == OutcomeStatus::Failed {
            warn!(uid = %item.uid, detail = ?outcome.error_detail, "tag failed");
        } else {
            info!(uid = %item.uid, status = %status, detail = ?outcome.error_detail, "tag finished");
        }
        record_or_warn(
            self.log,
            LogEntry::new(
                EventKind::Outcome,
                Some(&item.uid),
                json!({ "status": status.as_str(), "detail": outcome.error_detail }),
            )
            .with_state(state.name()),
        );
        outcome
    }
}
