//! Scenario: tags that must not be written.
//!
//! # Invariants under test
//! - A tag of a different family than scanned fails with a profile mismatch.
//! - A tag with lock bits already set fails before any write.
//! - A tag carrying a different record fails unless `force` is set.
//! - A tag already carrying the same record is rewritten and verified.
//! - None of these ask the operator anything.
//!
//! GREEN when: every unsafe tag ends `failed` with zero committed writes.

use ntd_execution::{FailReason, MachineConfig, TagState, WriteMachine};
use ntd_ndef::{encode, EncodeOptions};
use ntd_profile::TagKind;
use ntd_reader_sim::SimTag;
use ntd_schemas::{NftRecord, OutcomeStatus, WritePlanItem};
use ntd_testkit::{plan_item, uid, FaultyReader, MemoryLog, ReaderOp, ScriptedOperator};

fn reader_with(tag: SimTag) -> FaultyReader<ntd_reader_sim::SimReader> {
    let mut sim = ntd_reader_sim::SimReader::new();
    let u = tag.uid.clone();
    sim.add_tag(tag);
    sim.present(u);
    FaultyReader::new(sim)
}

fn run(
    reader: &mut FaultyReader<ntd_reader_sim::SimReader>,
    item: &WritePlanItem,
    force: bool,
) -> (TagState, ScriptedOperator) {
    let mut operator = ScriptedOperator::new();
    let mut log = MemoryLog::new();
    let config = MachineConfig {
        force,
        ..MachineConfig::default()
    };
    let state = WriteMachine::new(reader, &mut operator, &mut log, config)
        .run(item, false)
        .final_state;
    (state, operator)
}

#[test]
fn profile_mismatch() {
    let item = plan_item(1, TagKind::Ntag213);
    let mut reader = reader_with(SimTag::blank(uid(1), TagKind::Ntag215));

    let (state, operator) = run(&mut reader, &item, false);

    assert_eq!(
        state,
        TagState::Failed(FailReason::ProfileMismatch {
            expected: TagKind::Ntag213,
            found: TagKind::Ntag215,
        })
    );
    assert!(operator.faults_seen.is_empty());
    assert_eq!(reader.committed(ReaderOp::WriteBlock, &uid(1)), 0);
}

#[test]
fn already_locked() {
    let item = plan_item(2, TagKind::Ntag215);
    let mut tag = SimTag::blank(uid(2), TagKind::Ntag215);
    tag.lock = vec![0x01, 0x00, 0x00];
    let mut reader = reader_with(tag);

    let (state, _) = run(&mut reader, &item, true);

    assert_eq!(state, TagState::Failed(FailReason::TagAlreadyLocked));
    assert_eq!(reader.committed(ReaderOp::WriteBlock, &uid(2)), 0);
}

#[test]
fn existing_record_needs_force() {
    let item = plan_item(3, TagKind::Ntag215);
    let other = NftRecord::new("nft1other", "X".repeat(64), None).unwrap();
    let mut tag = SimTag::blank(uid(3), TagKind::Ntag215);
    let bytes = encode(&other, item.detected_profile, EncodeOptions::default()).unwrap();
    tag.memory[..bytes.len()].copy_from_slice(&bytes);

    let mut reader = reader_with(tag.clone());
    let (state, _) = run(&mut reader, &item, false);
    assert!(matches!(state, TagState::Failed(FailReason::ExistingRecord(ref r)) if r.contains("nft1other")));
    assert_eq!(reader.committed(ReaderOp::WriteBlock, &uid(3)), 0);

    let mut reader = reader_with(tag);
    let (state, _) = run(&mut reader, &item, true);
    assert!(matches!(state, TagState::Done { locked: false, .. }));
    assert_eq!(reader.committed(ReaderOp::WriteBlock, &uid(3)), 1);
}

#[test]
fn same_record_is_rewritten() {
    let item = plan_item(4, TagKind::Ntag216);
    let mut tag = SimTag::blank(uid(4), TagKind::Ntag216);
    let bytes = encode(&item.record, item.detected_profile, EncodeOptions::default()).unwrap();
    tag.memory[..bytes.len()].copy_from_slice(&bytes);
    let mut reader = reader_with(tag);

    let mut operator = ScriptedOperator::new();
    let mut log = MemoryLog::new();
    let run = WriteMachine::new(&mut reader, &mut operator, &mut log, MachineConfig::default())
        .run(&item, false);

    assert_eq!(run.outcome.status, OutcomeStatus::Written);
    assert_eq!(reader.committed(ReaderOp::WriteBlock, &uid(4)), 1);
}
