//! ntd-schemas
//!
//! Shared data model for the tag desk: tag identity, NFT records, plan items,
//! per-tag outcomes, the run summary, and the operation-log contract.

mod oplog;
mod outcome;
mod record;
mod uid;

pub use oplog::{record_or_warn, EventKind, LogEntry, NullLog, OperationLog};
pub use outcome::{OutcomeStatus, RunSummary, WriteOutcome};
pub use record::{
    NftRecord, RecordError, DEFAULT_VERSION, LEGACY_OFFER_LEN, MAX_FIELD_LEN, STANDARD_OFFER_LEN,
};
pub use uid::{Uid, UidError, UID_HEX_LEN};

use ntd_profile::TagProfile;

/// One physically presented tag, as recorded by the scan step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanEntry {
    pub uid: Uid,
    pub detected_profile: &'static TagProfile,
}

impl ScanEntry {
    pub fn new(uid: Uid, detected_profile: &'static TagProfile) -> Self {
        Self {
            uid,
            detected_profile,
        }
    }
}

/// A tag paired with the record it must receive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WritePlanItem {
    pub uid: Uid,
    pub detected_profile: &'static TagProfile,
    pub record: NftRecord,
}
