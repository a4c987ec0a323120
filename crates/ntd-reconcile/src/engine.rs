use sha2::{Digest, Sha256};
use std::collections::HashMap;

use ntd_schemas::{NftRecord, ScanEntry, Uid, WritePlanItem};

use crate::{AssignmentRow, ReconcileError, WritePlan};

/// First UID that appears twice, with both 1-based positions.
pub fn find_duplicate_uid<'a, I>(uids: I) -> Option<(Uid, usize, usize)>
where
    I: IntoIterator<Item = &'a Uid>,
{
    let mut seen: HashMap<&Uid, usize> = HashMap::new();
    for (i, uid) in uids.into_iter().enumerate() {
        if let Some(first) = seen.get(uid) {
            return Some((uid.clone(), *first, i + 1));
        }
        seen.insert(uid, i + 1);
    }
    None
}

/// Positional pairing with no default version.
pub fn reconcile(
    scan: &[ScanEntry],
    rows: &[AssignmentRow],
) -> Result<WritePlan, ReconcileError> {
    reconcile_with_default(scan, rows, None)
}

/// Positional pairing. Rows without a version get `default_version`.
///
/// Check order: duplicate UIDs, then row counts, then each assignment.
pub fn reconcile_with_default(
    scan: &[ScanEntry],
    rows: &[AssignmentRow],
    default_version: Option<&str>,
) -> Result<WritePlan, ReconcileError> {
    if let Some((uid, first_row, second_row)) = find_duplicate_uid(scan.iter().map(|e| &e.uid)) {
        return Err(ReconcileError::DuplicateUid {
            uid,
            first_row,
            second_row,
        });
    }

    if scan.len() != rows.len() {
        return Err(ReconcileError::RowCountMismatch {
            scanned: scan.len(),
            assignments: rows.len(),
        });
    }

    let mut items = Vec::with_capacity(scan.len());
    for (i, (entry, row)) in scan.iter().zip(rows).enumerate() {
        let version = row
            .version
            .clone()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| default_version.map(str::to_string));
        let record = NftRecord::new(row.nft_id.clone(), row.offer.clone(), version).map_err(
            |e| ReconcileError::InvalidAssignment {
                row: i + 1,
                reason: e.to_string(),
            },
        )?;
        items.push(WritePlanItem {
            uid: entry.uid.clone(),
            detected_profile: entry.detected_profile,
            record,
        });
    }

    Ok(WritePlan::from_items(items))
}

/// SHA-256 (hex) over the canonical rendering of the plan.
///
/// The rendering is the plan header followed by one line per item,
/// `uid,version,nft_id,offer,tag_kind`, LF-terminated. Fields never contain
/// commas, so no quoting is involved.
pub fn plan_hash(items: &[WritePlanItem]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(crate::PLAN_HEADERS.join(",").as_bytes());
    hasher.update(b"\n");
    for item in items {
        let line = format!(
            "{},{},{},{},{}\n",
            item.uid,
            item.record.version.as_deref().unwrap_or(""),
            item.record.nft_id,
            item.record.offer,
            item.detected_profile.kind.as_str()
        );
        hasher.update(line.as_bytes());
    }
    hex::encode(hasher.finalize())
}
