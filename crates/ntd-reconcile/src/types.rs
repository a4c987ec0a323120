use std::fmt;

use ntd_schemas::{NftRecord, Uid, WritePlanItem};

/// One row of the assignment file, not yet validated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssignmentRow {
    pub nft_id: String,
    pub offer: String,
    pub version: Option<String>,
}

impl AssignmentRow {
    pub fn new(nft_id: impl Into<String>, offer: impl Into<String>) -> Self {
        Self {
            nft_id: nft_id.into(),
            offer: offer.into(),
            version: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

/// Ordered plan plus the hash of its canonical rendering.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WritePlan {
    pub items: Vec<WritePlanItem>,
    pub plan_hash: String,
}

impl WritePlan {
    /// Build a plan from items; the hash is always recomputed.
    pub fn from_items(items: Vec<WritePlanItem>) -> Self {
        let plan_hash = crate::engine::plan_hash(&items);
        Self { items, plan_hash }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &NftRecord> {
        self.items.iter().map(|i| &i.record)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileError {
    /// Same UID scanned twice. Rows are 1-based positions in the scan.
    DuplicateUid {
        uid: Uid,
        first_row: usize,
        second_row: usize,
    },
    RowCountMismatch {
        scanned: usize,
        assignments: usize,
    },
    /// Row is 1-based in the assignment sequence.
    InvalidAssignment { row: usize, reason: String },
}

impl fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileError::DuplicateUid {
                uid,
                first_row,
                second_row,
            } => write!(
                f,
                "duplicate UID {uid}: scanned at rows {first_row} and {second_row}"
            ),
            ReconcileError::RowCountMismatch {
                scanned,
                assignments,
            } => write!(
                f,
                "row count mismatch: {scanned} tags scanned, {assignments} assignments"
            ),
            ReconcileError::InvalidAssignment { row, reason } => {
                write!(f, "invalid assignment at row {row}: {reason}")
            }
        }
    }
}

impl std::error::Error for ReconcileError {}
