//! Scenario: the whole desk workflow against a simulated reader.
//!
//! scan → inventory CSV → reconcile with assignments → plan CSV → review
//! gate → batch (hash-chained operation log) → read back.
//!
//! # Invariants under test
//! - Scan records tags in presentation order and refuses a locked tag.
//! - The plan read back from disk hashes the same as the plan written.
//! - A stale acknowledged hash blocks the batch; the right one permits it.
//! - Every plan item ends written, and the tag decodes to its assignment.
//! - The operation log produced by scan and batch verifies as one chain.
//!
//! GREEN when: all three tags decode to their rows and the log verifies.

use ntd_audit::{verify_hash_chain, OperationLogWriter};
use ntd_execution::TagReader;
use ntd_profile::TagKind;
use ntd_reader_sim::{SimReader, SimTag};
use ntd_reconcile::{
    check_review_gate, read_assignments, read_inventory, read_plan, reconcile_with_default,
    write_inventory, write_plan, ScanSession,
};
use ntd_runtime::{BatchOptions, BatchOrchestrator, ReaderScanSource};
use ntd_schemas::DEFAULT_VERSION;
use ntd_testkit::{standard_offer, uid, ScriptedOperator};
use tempfile::tempdir;

#[test]
fn scan_reconcile_batch_read_back() {
    let dir = tempdir().unwrap();
    let inventory = dir.path().join("tag_inventory.csv");
    let assignments = dir.path().join("assignments.csv");
    let plan_path = dir.path().join("full_nfc_data.csv");
    let oplog = dir.path().join("operations.jsonl");

    // Desk: a locked tag shows up between the usable ones.
    let mut sim = SimReader::new();
    sim.add_tag(SimTag::blank(uid(1), TagKind::Ntag215));
    sim.add_tag(SimTag::blank(uid(2), TagKind::Ntag213));
    sim.add_tag(SimTag::blank(uid(3), TagKind::Ntag216));
    let mut locked = SimTag::blank(uid(9), TagKind::Ntag215);
    locked.lock = vec![0xFF, 0xFF, 0x00];
    sim.add_tag(locked);
    for n in [2, 9, 1, 3] {
        sim.present(uid(n));
    }

    let mut csv = String::from("nft_id,offer,version\n");
    for n in 1..=3u8 {
        let version = if n == 2 { "DT002" } else { "" };
        csv.push_str(&format!("nft1row{n},{},{version}\n", standard_offer(n)));
    }
    std::fs::write(&assignments, csv).unwrap();
    let rows = read_assignments(&assignments).unwrap();

    // -- scan --
    let mut log = OperationLogWriter::open(&oplog, true).unwrap();
    let mut source = ReaderScanSource::new(sim).with_timeout_limit(1);
    let mut session = ScanSession::new(Some(rows.len()));
    let report = session.run(&mut source, &mut log, |_| Ok(())).unwrap();
    assert_eq!(report.recorded, 3);
    assert_eq!(report.locked_refused, 1);
    write_inventory(&inventory, session.entries()).unwrap();

    // -- reconcile --
    let scanned = read_inventory(&inventory).unwrap();
    let order: Vec<_> = scanned.iter().map(|e| e.uid.clone()).collect();
    assert_eq!(order, vec![uid(2), uid(1), uid(3)]);
    let plan = reconcile_with_default(&scanned, &rows, Some(DEFAULT_VERSION)).unwrap();
    write_plan(&plan_path, &plan).unwrap();

    let reviewed = read_plan(&plan_path).unwrap();
    assert_eq!(reviewed.plan_hash, plan.plan_hash);
    assert!(check_review_gate(&reviewed, &"0".repeat(64)).is_blocked());
    assert!(check_review_gate(&reviewed, &plan.plan_hash.to_uppercase()).is_permitted());

    // -- batch --
    let mut reader = source.into_inner();
    for item in &reviewed.items {
        reader.present(item.uid.clone());
    }
    let mut operator = ScriptedOperator::new();
    let summary = BatchOrchestrator::new(&mut reader, &mut operator, &mut log, BatchOptions::default())
        .execute(&reviewed.items)
        .unwrap();
    assert!(summary.is_full_success(), "{summary}");

    // -- read back --
    for (item, row) in reviewed.items.iter().zip(&rows) {
        let tag = reader.tag(&item.uid).unwrap();
        let record = ntd_ndef::decode(&tag.memory, tag.profile).unwrap();
        assert_eq!(record.nft_id, row.nft_id);
        assert_eq!(record.offer, row.offer);
    }
    let versions: Vec<_> = reviewed
        .items
        .iter()
        .map(|i| i.record.version.as_deref().unwrap_or(""))
        .collect();
    assert_eq!(versions, vec![DEFAULT_VERSION, "DT002", DEFAULT_VERSION]);
    assert_eq!(reader.wait_for_tag().unwrap_err(), ntd_execution::ReaderError::Timeout);

    let verdict = verify_hash_chain(&oplog).unwrap();
    assert!(verdict.is_valid(), "{verdict:?}");
}
