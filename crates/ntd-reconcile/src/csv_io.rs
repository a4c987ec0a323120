//! File formats exchanged between the scan, reconcile and batch steps.
//!
//! | file        | header                                  |
//! |-------------|-----------------------------------------|
//! | assignments | `nft_id,offer[,version]` (any order)    |
//! | inventory   | `uid,tag_kind`                          |
//! | plan        | `uid,version,nft_id,offer,tag_kind`     |
//!
//! Inventory and plan headers must match exactly; those files are machine
//! written and a different header means someone edited the wrong file.

use anyhow::{bail, Context, Result};
use std::fs::{self, OpenOptions};
use std::path::Path;

use ntd_profile::{profile_for, TagMarker};
use ntd_schemas::{NftRecord, ScanEntry, Uid, WritePlanItem};

use crate::engine::find_duplicate_uid;
use crate::{AssignmentRow, WritePlan};

pub const ASSIGNMENT_HEADERS: [&str; 3] = ["nft_id", "offer", "version"];
pub const INVENTORY_HEADERS: [&str; 2] = ["uid", "tag_kind"];
pub const PLAN_HEADERS: [&str; 5] = ["uid", "version", "nft_id", "offer", "tag_kind"];

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create_dir_all {}", parent.display()))?;
        }
    }
    Ok(())
}

fn check_exact_headers(path: &Path, got: &csv::StringRecord, want: &[&str]) -> Result<()> {
    let got: Vec<&str> = got.iter().map(str::trim).collect();
    if got != want {
        bail!(
            "{}: header mismatch: expected {:?}, found {:?}",
            path.display(),
            want,
            got
        );
    }
    Ok(())
}

fn profile_from_kind(raw: &str) -> Result<&'static ntd_profile::TagProfile> {
    profile_for(TagMarker::Name(raw)).map_err(anyhow::Error::new)
}

// ---------------------------------------------------------------------------
// Assignments
// ---------------------------------------------------------------------------

/// Read the assignment file. Columns are located by name; `version` is optional.
pub fn read_assignments(path: impl AsRef<Path>) -> Result<Vec<AssignmentRow>> {
    let path = path.as_ref();
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("open assignment file {}", path.display()))?;

    let headers = rdr
        .headers()
        .with_context(|| format!("read header of {}", path.display()))?
        .clone();
    let col = |name: &str| headers.iter().position(|h| h == name);
    let (Some(nft_col), Some(offer_col)) = (col("nft_id"), col("offer")) else {
        bail!(
            "{}: assignment file needs nft_id and offer columns, found {:?}",
            path.display(),
            headers.iter().collect::<Vec<_>>()
        );
    };
    let version_col = col("version");

    let mut rows = Vec::new();
    for (i, rec) in rdr.records().enumerate() {
        let rec = rec.with_context(|| format!("{}: row {}", path.display(), i + 1))?;
        let field = |c: usize| rec.get(c).unwrap_or("").to_string();
        rows.push(AssignmentRow {
            nft_id: field(nft_col),
            offer: field(offer_col),
            version: version_col.map(field).filter(|v| !v.is_empty()),
        });
    }
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Inventory
// ---------------------------------------------------------------------------

pub fn read_inventory(path: impl AsRef<Path>) -> Result<Vec<ScanEntry>> {
    let path = path.as_ref();
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("open inventory file {}", path.display()))?;
    let headers = rdr
        .headers()
        .with_context(|| format!("read header of {}", path.display()))?
        .clone();
    check_exact_headers(path, &headers, &INVENTORY_HEADERS)?;

    let mut out = Vec::new();
    for (i, rec) in rdr.records().enumerate() {
        let row = i + 1;
        let rec = rec.with_context(|| format!("{}: row {row}", path.display()))?;
        let uid = Uid::parse(rec.get(0).unwrap_or(""))
            .with_context(|| format!("{}: row {row}", path.display()))?;
        let profile = profile_from_kind(rec.get(1).unwrap_or(""))
            .with_context(|| format!("{}: row {row}", path.display()))?;
        out.push(ScanEntry::new(uid, profile));
    }
    Ok(out)
}

pub fn write_inventory(path: impl AsRef<Path>, entries: &[ScanEntry]) -> Result<()> {
    let path = path.as_ref();
    ensure_parent(path)?;
    let mut w = csv::Writer::from_path(path)
        .with_context(|| format!("create inventory file {}", path.display()))?;
    w.write_record(INVENTORY_HEADERS)?;
    for e in entries {
        w.write_record([e.uid.as_str(), e.detected_profile.kind.as_str()])?;
    }
    w.flush()
        .with_context(|| format!("flush inventory file {}", path.display()))?;
    Ok(())
}

/// Append one scanned tag, writing the header first when the file is new.
pub fn append_inventory_row(path: impl AsRef<Path>, entry: &ScanEntry) -> Result<()> {
    let path = path.as_ref();
    ensure_parent(path)?;
    let is_new = fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open inventory file {}", path.display()))?;
    let mut w = csv::Writer::from_writer(file);
    if is_new {
        w.write_record(INVENTORY_HEADERS)?;
    }
    w.write_record([entry.uid.as_str(), entry.detected_profile.kind.as_str()])?;
    w.flush()
        .with_context(|| format!("flush inventory file {}", path.display()))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// Read a plan file and recompute its hash.
///
/// Every row is re-validated and duplicate UIDs are refused, so a hand-edited
/// plan gets the same checks as a reconciled one.
pub fn read_plan(path: impl AsRef<Path>) -> Result<WritePlan> {
    let path = path.as_ref();
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("open plan file {}", path.display()))?;
    let headers = rdr
        .headers()
        .with_context(|| format!("read header of {}", path.display()))?
        .clone();
    check_exact_headers(path, &headers, &PLAN_HEADERS)?;

    let mut items = Vec::new();
    for (i, rec) in rdr.records().enumerate() {
        let row = i + 1;
        let ctx = || format!("{}: row {row}", path.display());
        let rec = rec.with_context(ctx)?;
        let get = |c: usize| rec.get(c).unwrap_or("");

        let uid = Uid::parse(get(0)).with_context(ctx)?;
        let version = Some(get(1).to_string()).filter(|v| !v.is_empty());
        let record = NftRecord::new(get(2), get(3), version)
            .map_err(anyhow::Error::new)
            .with_context(ctx)?;
        let detected_profile = profile_from_kind(get(4)).with_context(ctx)?;

        items.push(WritePlanItem {
            uid,
            detected_profile,
            record,
        });
    }

    if let Some((uid, first, second)) = find_duplicate_uid(items.iter().map(|i| &i.uid)) {
        bail!(
            "{}: duplicate UID {uid} at rows {first} and {second}",
            path.display()
        );
    }

    Ok(WritePlan::from_items(items))
}

pub fn write_plan(path: impl AsRef<Path>, plan: &WritePlan) -> Result<()> {
    let path = path.as_ref();
    ensure_parent(path)?;
    let mut w = csv::Writer::from_path(path)
        .with_context(|| format!("create plan file {}", path.display()))?;
    w.write_record(PLAN_HEADERS)?;
    for item in &plan.items {
        w.write_record([
            item.uid.as_str(),
            item.record.version.as_deref().unwrap_or(""),
            item.record.nft_id.as_str(),
            item.record.offer.as_str(),
            item.detected_profile.kind.as_str(),
        ])?;
    }
    w.flush()
        .with_context(|| format!("flush plan file {}", path.display()))?;
    Ok(())
}
