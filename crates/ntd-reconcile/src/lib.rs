//! ntd-reconcile
//!
//! Pairs the tags the operator scanned with the NFT assignments they are to
//! receive, and guards the hand-off to the batch step.
//!
//! - `reconcile` is positional: scan row *i* gets assignment row *i*.
//! - Duplicate UIDs are refused before any plan exists.
//! - The plan carries a hash so the batch step can prove it is executing the
//!   plan the operator reviewed (`check_review_gate`).
//!
//! `engine`, `gate` and `types` are pure. `csv_io` and `scan` touch files and
//! readers and return `anyhow::Result`.

mod csv_io;
mod engine;
mod gate;
mod scan;
mod types;

pub use csv_io::{
    append_inventory_row, read_assignments, read_inventory, read_plan, write_inventory,
    write_plan, ASSIGNMENT_HEADERS, INVENTORY_HEADERS, PLAN_HEADERS,
};
pub use engine::{find_duplicate_uid, plan_hash, reconcile, reconcile_with_default};
pub use gate::{check_review_gate, ReviewGate};
pub use scan::{ScanEvent, ScanReport, ScanSession, ScanSource};
pub use types::{AssignmentRow, ReconcileError, WritePlan};
