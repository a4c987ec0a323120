//! Review gate.
//!
//! The scan step prints the plan hash. The batch step can demand that the
//! operator echo it back; a different hash means the file changed since it
//! was reviewed and nothing is written.

use crate::WritePlan;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReviewGate {
    Permitted,
    Blocked { expected: String, acknowledged: String },
}

impl ReviewGate {
    pub fn is_permitted(&self) -> bool {
        matches!(self, ReviewGate::Permitted)
    }

    pub fn is_blocked(&self) -> bool {
        !self.is_permitted()
    }
}

/// Compare the acknowledged hash with the plan's. Case and surrounding
/// whitespace are ignored; prefixes are not accepted.
pub fn check_review_gate(plan: &WritePlan, acknowledged_hash: &str) -> ReviewGate {
    let ack = acknowledged_hash.trim().to_ascii_lowercase();
    if ack == plan.plan_hash {
        ReviewGate::Permitted
    } else {
        ReviewGate::Blocked {
            expected: plan.plan_hash.clone(),
            acknowledged: ack,
        }
    }
}
