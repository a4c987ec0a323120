//! Scenario: locking requested for the run.
//!
//! # Invariants under test
//! - Confirming the lock sets and verifies the lock bits: outcome `locked`.
//! - "Decline all" leaves the tag written and suppresses every later prompt.
//! - "Skip lock" affects only the current tag.
//! - A lock that does not stick fails the tag; the record stays written.
//! - The lock range covers every page a large record occupies.
//!
//! GREEN when: outcomes follow the operator's lock answers and the lock
//! prompt count matches the tags actually asked about.

use ntd_execution::{FailReason, LockDecision, MachineConfig, TagState, WriteMachine};
use ntd_ndef::EncodeOptions;
use ntd_profile::{TagKind, DATA_START_PAGE};
use ntd_runtime::{BatchOptions, BatchOrchestrator};
use ntd_schemas::{NftRecord, OutcomeStatus};
use ntd_testkit::{plan_item, sim_for_plan, uid, MemoryLog, ScriptedOperator};

fn locking() -> BatchOptions {
    BatchOptions {
        lock_tags: true,
        ..BatchOptions::default()
    }
}

#[test]
fn confirm_then_decline_all() {
    let items: Vec<_> = (1..=4).map(|n| plan_item(n, TagKind::Ntag215)).collect();
    let mut reader = sim_for_plan(&items);
    let mut operator = ScriptedOperator::new().on_locks([
        LockDecision::Lock,
        LockDecision::SkipLock,
        LockDecision::DeclineAll,
    ]);
    let mut log = MemoryLog::new();

    let summary = BatchOrchestrator::new(&mut reader, &mut operator, &mut log, locking())
        .execute(&items)
        .unwrap();

    assert_eq!(
        summary.statuses(),
        vec![
            OutcomeStatus::Locked,
            OutcomeStatus::Written,
            OutcomeStatus::Written,
            OutcomeStatus::Written,
        ]
    );
    let details: Vec<_> = summary
        .outcomes
        .iter()
        .map(|o| o.error_detail.as_deref())
        .collect();
    assert_eq!(
        details,
        vec![None, Some("lock skipped"), Some("lock declined"), Some("lock declined")]
    );
    // Item 4 is never asked.
    assert_eq!(operator.lock_prompts, vec![uid(1), uid(2), uid(3)]);

    assert!(reader.tag(&uid(1)).unwrap().is_locked());
    for n in 2..=4 {
        assert!(!reader.tag(&uid(n)).unwrap().is_locked());
    }
    // Written but unlocked still counts as success.
    assert!(summary.is_full_success());
}

#[test]
fn lock_that_does_not_stick_fails_the_tag() {
    let item = plan_item(5, TagKind::Ntag216);
    let mut reader = sim_for_plan(std::slice::from_ref(&item));
    reader.tag_mut(&uid(5)).unwrap().lock_stuck = true;
    let mut operator = ScriptedOperator::new();
    let mut log = MemoryLog::new();

    let config = MachineConfig {
        lock_requested: true,
        ..MachineConfig::default()
    };
    let run = WriteMachine::new(&mut reader, &mut operator, &mut log, config).run(&item, false);

    assert_eq!(run.outcome.status, OutcomeStatus::Failed);
    assert_eq!(
        run.final_state,
        TagState::Failed(FailReason::LockVerificationFailed {
            expected: "FFFFFF".into(),
            found: "000000".into(),
        })
    );
    assert!(operator.faults_seen.is_empty());

    let tag = reader.tag(&uid(5)).unwrap();
    assert_eq!(
        ntd_ndef::decode(&tag.memory, item.detected_profile).unwrap(),
        item.record
    );
}

#[test]
fn quit_at_lock_prompt_keeps_write_and_stops_run() {
    let items: Vec<_> = (1..=3).map(|n| plan_item(n, TagKind::Ntag213)).collect();
    let mut reader = sim_for_plan(&items);
    let mut operator = ScriptedOperator::new().on_locks([LockDecision::Lock, LockDecision::Quit]);
    let mut log = MemoryLog::new();

    let summary = BatchOrchestrator::new(&mut reader, &mut operator, &mut log, locking())
        .execute(&items)
        .unwrap();

    assert_eq!(
        summary.statuses(),
        vec![OutcomeStatus::Locked, OutcomeStatus::Written]
    );
    assert_eq!(summary.outcomes[1].error_detail.as_deref(), Some("operator quit"));
    assert_eq!(summary.not_attempted, vec![uid(3)]);
    assert!(summary.quit);
}

#[test]
fn large_type2a_record_is_fully_covered_by_lock() {
    let mut item = plan_item(6, TagKind::Type2A);
    item.record = NftRecord::new("n".repeat(255), "o".repeat(255), Some("v".repeat(255))).unwrap();
    let opts = BatchOptions {
        lock_tags: true,
        allow_any_length: true,
        ..BatchOptions::default()
    };
    let profile = item.detected_profile;
    let message = ntd_ndef::encode(&item.record, profile, EncodeOptions::default()).unwrap();
    let last_written_page = DATA_START_PAGE + (message.len() as u16).div_ceil(4) - 1;
    assert!(message.len() > 504);

    let items = vec![item];
    let mut reader = sim_for_plan(&items);
    let mut operator = ScriptedOperator::new();
    let mut log = MemoryLog::new();
    let summary = BatchOrchestrator::new(&mut reader, &mut operator, &mut log, opts)
        .execute(&items)
        .unwrap();

    assert_eq!(summary.statuses(), vec![OutcomeStatus::Locked]);
    assert!(profile.lockable_pages().contains(last_written_page));
    assert!(profile.dynamic_lock_page > last_written_page);
    assert!(reader.tag(&uid(6)).unwrap().is_locked());
}
