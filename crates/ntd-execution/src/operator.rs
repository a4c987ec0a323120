use ntd_schemas::{Uid, WritePlanItem};

use crate::{Fault, TagState};

/// Everything the operator sees when asked about a fault.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FaultContext {
    pub uid: Uid,
    /// State the fault happened in.
    pub state: TagState,
    pub fault: Fault,
    /// 1-based attempt on this tag.
    pub attempt: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultDecision {
    Retry,
    Skip,
    Quit,
}

impl FaultDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            FaultDecision::Retry => "retry",
            FaultDecision::Skip => "skip",
            FaultDecision::Quit => "quit",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockDecision {
    Lock,
    /// Leave this tag unlocked.
    SkipLock,
    /// Leave this and every later tag in the run unlocked.
    DeclineAll,
    Quit,
}

impl LockDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockDecision::Lock => "lock",
            LockDecision::SkipLock => "skip_lock",
            LockDecision::DeclineAll => "decline_all",
            LockDecision::Quit => "quit",
        }
    }
}

/// The human at the desk. Calls block until they answer.
pub trait Operator {
    fn on_fault(&mut self, ctx: &FaultContext) -> FaultDecision;

    /// Asked once per tag after a verified write, only when locking is on.
    fn confirm_lock(&mut self, uid: &Uid) -> LockDecision;

    /// The machine is about to wait for `item`. `position` is 1-based.
    fn announce(&mut self, _item: &WritePlanItem, _position: usize, _total: usize) {}
}

impl<O: Operator + ?Sized> Operator for &mut O {
    fn on_fault(&mut self, ctx: &FaultContext) -> FaultDecision {
        (**self).on_fault(ctx)
    }
    fn confirm_lock(&mut self, uid: &Uid) -> LockDecision {
        (**self).confirm_lock(uid)
    }
    fn announce(&mut self, item: &WritePlanItem, position: usize, total: usize) {
        (**self).announce(item, position, total)
    }
}
