//! ntd-runtime
//!
//! Batch orchestration: structural preflight over the whole plan, then one
//! state-machine run per tag in plan order. Also the reader-backed source the
//! scan step pulls tags from.
//!
//! Preflight failures abort before any tag is touched. Per-tag problems are
//! the state machine's business and end up in the [`RunSummary`].

mod orchestrator;
mod preflight;
mod scan_source;

pub use orchestrator::BatchOrchestrator;
pub use preflight::{preflight, BatchOptions, PreflightError, PreparedItem};
pub use scan_source::ReaderScanSource;

pub use ntd_schemas::RunSummary;
