use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Uid;

/// Terminal status of one tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Written,
    Locked,
    Skipped,
    Failed,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Written => "written",
            OutcomeStatus::Locked => "locked",
            OutcomeStatus::Skipped => "skipped",
            OutcomeStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of how one plan item ended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOutcome {
    pub uid: Uid,
    pub status: OutcomeStatus,
    pub error_detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl WriteOutcome {
    pub fn new(uid: Uid, status: OutcomeStatus, error_detail: Option<String>) -> Self {
        Self {
            uid,
            status,
            error_detail,
            timestamp: Utc::now(),
        }
    }
}

/// Aggregate of one batch run. Owned by the orchestrator.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub written: usize,
    pub locked: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Items never reached because the run was quit.
    pub not_attempted: Vec<Uid>,
    pub quit: bool,
    pub outcomes: Vec<WriteOutcome>,
}

impl RunSummary {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Append-only.
    pub fn record(&mut self, outcome: WriteOutcome) {
        match outcome.status {
            OutcomeStatus::Written => self.written += 1,
            OutcomeStatus::Locked => self.locked += 1,
            OutcomeStatus::Skipped => self.skipped += 1,
            OutcomeStatus::Failed => self.failed += 1,
        }
        self.outcomes.push(outcome);
    }

    pub fn mark_not_attempted(&mut self, uid: Uid) {
        self.not_attempted.push(uid);
    }

    pub fn statuses(&self) -> Vec<OutcomeStatus> {
        self.outcomes.iter().map(|o| o.status).collect()
    }

    /// Exit-code policy: every tag written or locked, nothing left behind.
    pub fn is_full_success(&self) -> bool {
        !self.quit
            && self.failed == 0
            && self.skipped == 0
            && self.not_attempted.is_empty()
            && self.written + self.locked == self.total
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total={} written={} locked={} skipped={} failed={} not_attempted={} quit={}",
            self.total,
            self.written,
            self.locked,
            self.skipped,
            self.failed,
            self.not_attempted.len(),
            self.quit
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uid(n: u8) -> Uid {
        Uid::from_bytes([0x04, 0, 0, 0, 0, 0, n])
    }

    #[test]
    fn counters_follow_outcomes() {
        let mut s = RunSummary::new(3);
        s.record(WriteOutcome::new(uid(1), OutcomeStatus::Locked, None));
        s.record(WriteOutcome::new(uid(2), OutcomeStatus::Written, None));
        s.record(WriteOutcome::new(
            uid(3),
            OutcomeStatus::Skipped,
            Some("operator skip".into()),
        ));
        assert_eq!((s.written, s.locked, s.skipped, s.failed), (1, 1, 1, 0));
        assert!(!s.is_full_success());
    }

    #[test]
    fn full_success_requires_everything_done() {
        let mut s = RunSummary::new(2);
        s.record(WriteOutcome::new(uid(1), OutcomeStatus::Written, None));
        assert!(!s.is_full_success());
        s.record(WriteOutcome::new(uid(2), OutcomeStatus::Locked, None));
        assert!(s.is_full_success());
        s.quit = true;
        assert!(!s.is_full_success());
    }

    #[test]
    fn status_serialises_lowercase() {
        let json = serde_json::to_string(&OutcomeStatus::Locked).unwrap();
        assert_eq!(json, "\"locked\"");
    }
}
