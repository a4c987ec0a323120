use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

use ntd_execution::MachineConfig;
use ntd_ndef::{encode, CodecError, EncodeOptions, PayloadLayout};
use ntd_schemas::{RecordError, Uid, WritePlanItem};

/// Run-wide switches, after config and CLI flags are merged.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOptions {
    pub lock_tags: bool,
    pub force: bool,
    /// 5-character offers, two-field payload without version.
    pub legacy_offer: bool,
    /// Any offer up to the field limit; codec may drop the terminator.
    pub allow_any_length: bool,
    /// 0 = unlimited.
    pub max_attempts: u32,
}

impl BatchOptions {
    pub fn encode_options(&self) -> EncodeOptions {
        EncodeOptions {
            layout: if self.legacy_offer {
                PayloadLayout::Legacy
            } else {
                PayloadLayout::Current
            },
            allow_any_length: self.allow_any_length,
        }
    }

    pub fn machine_config(&self) -> MachineConfig {
        MachineConfig {
            lock_requested: self.lock_tags,
            force: self.force,
            encode: self.encode_options(),
            max_attempts: self.max_attempts,
        }
    }
}

/// Plan item that passed preflight. `item.record` is what will be written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreparedItem {
    pub item: WritePlanItem,
    pub encoded_len: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PreflightError {
    EmptyPlan,
    /// Offer fails the length policy. `position` is 1-based.
    OfferPolicy {
        position: usize,
        uid: Uid,
        source: RecordError,
    },
    /// Record does not fit (or cannot be encoded for) the scanned tag.
    Capacity {
        position: usize,
        uid: Uid,
        source: CodecError,
    },
}

impl fmt::Display for PreflightError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreflightError::EmptyPlan => write!(f, "plan has no items"),
            PreflightError::OfferPolicy {
                position,
                uid,
                source,
            } => write!(f, "item {position} ({uid}): {source}"),
            PreflightError::Capacity {
                position,
                uid,
                source,
            } => write!(f, "item {position} ({uid}): {source}"),
        }
    }
}

impl std::error::Error for PreflightError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PreflightError::EmptyPlan => None,
            PreflightError::OfferPolicy { source, .. } => Some(source),
            PreflightError::Capacity { source, .. } => Some(source),
        }
    }
}

/// Structural checks over the whole plan. Nothing touches a reader.
///
/// Under the legacy layout the version is stripped from every record, since
/// the two-field payload cannot carry it.
pub fn preflight(
    items: &[WritePlanItem],
    opts: &BatchOptions,
) -> Result<Vec<PreparedItem>, PreflightError> {
    if items.is_empty() {
        return Err(PreflightError::EmptyPlan);
    }

    let strict = !opts.allow_any_length;
    let encode_opts = opts.encode_options();
    let mut prepared = Vec::with_capacity(items.len());

    for (i, item) in items.iter().enumerate() {
        let position = i + 1;
        let mut item = item.clone();

        if opts.legacy_offer && item.record.version.is_some() {
            info!(uid = %item.uid, version = ?item.record.version, "legacy layout: version dropped");
            item.record = item.record.without_version();
        }

        item.record
            .validate_offer_length(strict, opts.legacy_offer)
            .map_err(|source| PreflightError::OfferPolicy {
                position,
                uid: item.uid.clone(),
                source,
            })?;

        let encoded = encode(&item.record, item.detected_profile, encode_opts).map_err(|source| {
            PreflightError::Capacity {
                position,
                uid: item.uid.clone(),
                source,
            }
        })?;
        debug!(
            uid = %item.uid,
            bytes = encoded.len(),
            capacity = item.detected_profile.total_bytes,
            "preflight ok"
        );

        prepared.push(PreparedItem {
            item,
            encoded_len: encoded.len(),
        });
    }
    Ok(prepared)
}
