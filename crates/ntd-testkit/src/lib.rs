//! ntd-testkit
//!
//! Scripted collaborators for scenario tests: a fault-injecting reader that
//! wraps any [`TagReader`], an operator that answers from a script, and an
//! in-memory operation log. Plus a few builders for plan items and decks.

mod faulty_reader;
mod memory_log;
mod scripted_operator;

pub use faulty_reader::{FaultyReader, ReaderCall, ReaderOp};
pub use memory_log::MemoryLog;
pub use scripted_operator::ScriptedOperator;

use ntd_profile::{profile_by_kind, TagKind};
use ntd_reader_sim::{SimReader, SimTag};
use ntd_schemas::{NftRecord, Uid, WritePlanItem};

/// Deterministic UID `04 00 00 00 00 00 nn`.
pub fn uid(n: u8) -> Uid {
    Uid::from_bytes([0x04, 0x00, 0x00, 0x00, 0x00, 0x00, n])
}

/// 64-character offer code derived from `n`.
pub fn standard_offer(n: u8) -> String {
    format!("{:0>64}", format!("OFR{n:03}"))
}

/// Plan item with a standard-length offer and the default version.
pub fn plan_item(n: u8, kind: TagKind) -> WritePlanItem {
    let record = NftRecord::new(
        format!("nft1desk{n:03}"),
        standard_offer(n),
        Some(ntd_schemas::DEFAULT_VERSION.to_string()),
    );
    WritePlanItem {
        uid: uid(n),
        detected_profile: profile_by_kind(kind),
        // Built from constants that always validate.
        record: record.unwrap_or_else(|e| panic!("testkit record invalid: {e}")),
    }
}

/// Simulated reader holding one blank tag per item, presented in plan order.
pub fn sim_for_plan(items: &[WritePlanItem]) -> SimReader {
    let mut reader = SimReader::new();
    for item in items {
        reader.add_tag(SimTag::blank(item.uid.clone(), item.detected_profile.kind));
        reader.present(item.uid.clone());
    }
    reader
}
