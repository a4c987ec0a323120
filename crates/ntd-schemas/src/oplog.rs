//! Operation-log collaborator contract.
//!
//! The core emits one entry per state transition and one per outcome. Where
//! the entries end up (JSONL file, memory, nowhere) is the sink's concern.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::Uid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    RunStarted,
    ScanRecorded,
    PlanWritten,
    Transition,
    Fault,
    OperatorDecision,
    Outcome,
    RunFinished,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::RunStarted => "RUN_STARTED",
            EventKind::ScanRecorded => "SCAN_RECORDED",
            EventKind::PlanWritten => "PLAN_WRITTEN",
            EventKind::Transition => "TRANSITION",
            EventKind::Fault => "FAULT",
            EventKind::OperatorDecision => "OPERATOR_DECISION",
            EventKind::Outcome => "OUTCOME",
            EventKind::RunFinished => "RUN_FINISHED",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub event_kind: EventKind,
    pub uid: Option<Uid>,
    /// State-machine state the entry was emitted from, when there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub detail: Value,
}

impl LogEntry {
    pub fn new(event_kind: EventKind, uid: Option<&Uid>, detail: Value) -> Self {
        Self {
            timestamp: Utc::now(),
            event_kind,
            uid: uid.cloned(),
            state: None,
            detail,
        }
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }
}

/// Append-only sink.
pub trait OperationLog {
    fn record(&mut self, entry: LogEntry) -> Result<()>;
}

impl<L: OperationLog + ?Sized> OperationLog for &mut L {
    fn record(&mut self, entry: LogEntry) -> Result<()> {
        (**self).record(entry)
    }
}

impl<L: OperationLog + ?Sized> OperationLog for Box<L> {
    fn record(&mut self, entry: LogEntry) -> Result<()> {
        (**self).record(entry)
    }
}

/// Record `entry`, reporting a sink failure as a warning.
///
/// A tag that is mid-write must not be abandoned because the log disk is full.
pub fn record_or_warn<L: OperationLog + ?Sized>(log: &mut L, entry: LogEntry) {
    let kind = entry.event_kind;
    if let Err(err) = log.record(entry) {
        tracing::warn!(event_kind = %kind, error = %err, "operation log write failed");
    }
}

/// Discards everything. For offline commands that have no run.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLog;

impl OperationLog for NullLog {
    fn record(&mut self, _entry: LogEntry) -> Result<()> {
        Ok(())
    }
}
