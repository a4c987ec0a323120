use std::collections::VecDeque;

use ntd_execution::{CancelFlag, FaultContext, FaultDecision, LockDecision, Operator};
use ntd_schemas::{Uid, WritePlanItem};

/// Answers prompts from a script, then falls back to fixed defaults.
///
/// Defaults are `Skip` for faults and `Lock` for lock prompts, so an
/// under-scripted test terminates instead of retrying forever.
pub struct ScriptedOperator {
    fault_answers: VecDeque<FaultDecision>,
    lock_answers: VecDeque<LockDecision>,
    fault_default: FaultDecision,
    lock_default: LockDecision,
    cancel_at: Option<(usize, CancelFlag)>,
    pub faults_seen: Vec<FaultContext>,
    pub lock_prompts: Vec<Uid>,
    /// `(uid, position, total)` per announce.
    pub announced: Vec<(Uid, usize, usize)>,
}

impl Default for ScriptedOperator {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedOperator {
    pub fn new() -> Self {
        Self {
            fault_answers: VecDeque::new(),
            lock_answers: VecDeque::new(),
            fault_default: FaultDecision::Skip,
            lock_default: LockDecision::Lock,
            cancel_at: None,
            faults_seen: Vec::new(),
            lock_prompts: Vec::new(),
            announced: Vec::new(),
        }
    }

    pub fn on_faults(mut self, answers: impl IntoIterator<Item = FaultDecision>) -> Self {
        self.fault_answers.extend(answers);
        self
    }

    pub fn on_locks(mut self, answers: impl IntoIterator<Item = LockDecision>) -> Self {
        self.lock_answers.extend(answers);
        self
    }

    pub fn fault_default(mut self, d: FaultDecision) -> Self {
        self.fault_default = d;
        self
    }

    pub fn lock_default(mut self, d: LockDecision) -> Self {
        self.lock_default = d;
        self
    }

    /// Trip `flag` when item `position` (1-based) is announced.
    pub fn cancel_on_announce(mut self, position: usize, flag: CancelFlag) -> Self {
        self.cancel_at = Some((position, flag));
        self
    }
}

impl Operator for ScriptedOperator {
    fn on_fault(&mut self, ctx: &FaultContext) -> FaultDecision {
        self.faults_seen.push(ctx.clone());
        self.fault_answers.pop_front().unwrap_or(self.fault_default)
    }

    fn confirm_lock(&mut self, uid: &Uid) -> LockDecision {
        self.lock_prompts.push(uid.clone());
        self.lock_answers.pop_front().unwrap_or(self.lock_default)
    }

    fn announce(&mut self, item: &WritePlanItem, position: usize, total: usize) {
        self.announced.push((item.uid.clone(), position, total));
        if let Some((at, flag)) = &self.cancel_at {
            if *at == position {
                flag.cancel();
            }
        }
    }
}
