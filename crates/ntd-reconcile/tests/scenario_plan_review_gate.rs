//! Scenario: Plan File Review Gate
//!
//! # Invariant under test
//! The hash printed when the plan is written is the hash recomputed when the
//! batch step reads it back. Any edit to the file between review and batch
//! blocks the gate.
//!
//! GREEN when:
//! - write_plan then read_plan preserves items and plan_hash.
//! - The gate permits the printed hash (any case).
//! - Editing one offer in the file blocks the gate.
//! - A plan file with a duplicated UID is refused on read.

use ntd_profile::{profile_by_kind, TagKind};
use ntd_reconcile::{
    check_review_gate, read_plan, reconcile, write_plan, AssignmentRow, ReviewGate,
};
use ntd_schemas::{ScanEntry, Uid};
use std::fs;

fn plan() -> ntd_reconcile::WritePlan {
    let scan = vec![
        ScanEntry::new(
            Uid::parse("04A1B2C3D4E5F6").unwrap(),
            profile_by_kind(TagKind::Ntag213),
        ),
        ScanEntry::new(
            Uid::parse("04A1B2C3D4E5F7").unwrap(),
            profile_by_kind(TagKind::Ntag216),
        ),
    ];
    let rows = vec![
        AssignmentRow::new("nft1alpha", "OFRAA").with_version("DT001"),
        AssignmentRow::new("nft1bravo", "OFRBB"),
    ];
    reconcile(&scan, &rows).unwrap()
}

#[test]
fn written_plan_reads_back_with_same_hash() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("full_nfc_data.csv");
    let original = plan();
    write_plan(&path, &original).unwrap();

    let text = fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("uid,version,nft_id,offer,tag_kind\n"));
    assert!(text.contains("04A1B2C3D4E5F7,,nft1bravo,OFRBB,NTAG216"));

    let back = read_plan(&path).unwrap();
    assert_eq!(back, original);
    assert!(check_review_gate(&back, &original.plan_hash.to_uppercase()).is_permitted());
}

#[test]
fn edited_plan_is_blocked() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("full_nfc_data.csv");
    let original = plan();
    write_plan(&path, &original).unwrap();

    let edited = fs::read_to_string(&path).unwrap().replace("OFRBB", "OFRXX");
    fs::write(&path, edited).unwrap();

    let back = read_plan(&path).unwrap();
    match check_review_gate(&back, &original.plan_hash) {
        ReviewGate::Blocked { expected, acknowledged } => {
            assert_eq!(expected, back.plan_hash);
            assert_eq!(acknowledged, original.plan_hash);
        }
        ReviewGate::Permitted => panic!("edited plan must not pass the gate"),
    }
}

#[test]
fn duplicated_uid_in_plan_file_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("full_nfc_data.csv");
    fs::write(
        &path,
        "uid,version,nft_id,offer,tag_kind\n\
         04A1B2C3D4E5F6,DT001,nft1a,OFRAA,NTAG213\n\
         04a1b2c3d4e5f6,DT001,nft1b,OFRBB,NTAG213\n",
    )
    .unwrap();
    let err = read_plan(&path).unwrap_err();
    assert!(format!("{err:#}").contains("duplicate UID 04A1B2C3D4E5F6"));
}
