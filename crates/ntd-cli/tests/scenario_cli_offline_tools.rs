//! Scenario: offline commands need no reader and no config.
//!
//! GREEN when:
//! - `encode` output decodes back to the same fields through `decode`
//! - `encode` refuses a record that does not fit the tag
//! - `info` prints the payload budget of every profile
//! - `reconcile` pairs inventory and assignments into a plan and prints its hash
//! - `reconcile` records PLAN_WRITTEN with the plan hash in the operation log
//! - `config-hash` hashes the shipped base layer

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;

fn ntd() -> Command {
    let mut cmd = Command::cargo_bin("ntd").expect("ntd binary");
    cmd.env_remove("NTD_CONFIG").env("RUST_LOG", "warn");
    cmd
}

fn field(stdout: &[u8], key: &str) -> String {
    let text = String::from_utf8_lossy(stdout);
    let prefix = format!("{key}=");
    text.lines()
        .find_map(|l| l.strip_prefix(&prefix))
        .unwrap_or_else(|| panic!("no {key}= in output:\n{text}"))
        .to_string()
}

fn offer() -> String {
    format!("{:0<64}", "OFR001")
}

#[test]
fn encode_output_decodes_with_same_fields() -> anyhow::Result<()> {
    let out = ntd()
        .args(["encode", "--kind", "NTAG213", "--nft-id", "nft1desk001"])
        .args(["--offer", &offer(), "--version", "DT001"])
        .output()?;
    assert!(out.status.success());
    let hex = field(&out.stdout, "hex");
    assert!(hex.starts_with("03 "), "TLV first: {hex}");
    assert!(hex.ends_with(" FE"), "terminator last: {hex}");

    ntd()
        .args(["decode", "--kind", "NTAG213", &hex])
        .assert()
        .success()
        .stdout(predicate::str::contains("layout=current"))
        .stdout(predicate::str::contains("version=DT001"))
        .stdout(predicate::str::contains("nft_id=nft1desk001"))
        .stdout(predicate::str::contains(format!("offer={}", offer())));
    Ok(())
}

#[test]
fn legacy_encode_drops_the_version() -> anyhow::Result<()> {
    let out = ntd()
        .args(["encode", "--kind", "NTAG215", "--nft-id", "nft1old"])
        .args(["--offer", "ABCDE", "--version", "DT001", "--legacy-offer"])
        .output()?;
    assert!(out.status.success());
    let hex = field(&out.stdout, "hex");

    ntd()
        .args(["decode", "--kind", "NTAG215", &hex])
        .assert()
        .success()
        .stdout(predicate::str::contains("layout=legacy"))
        .stdout(predicate::str::contains("version=\n"));
    Ok(())
}

#[test]
fn oversized_record_is_refused() {
    let nft_id = format!("nft1{}", "x".repeat(60));
    ntd()
        .args(["encode", "--kind", "NTAG213", "--nft-id", &nft_id])
        .args(["--offer", &offer()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("payload too large"));
}

#[test]
fn decode_rejects_garbage() {
    ntd()
        .args(["decode", "--kind", "NTAG216", "03 05 D2 00"])
        .assert()
        .failure();
    ntd()
        .args(["decode", "--kind", "MIFARE", "00"])
        .assert()
        .failure();
}

#[test]
fn info_lists_every_profile() {
    ntd()
        .arg("info")
        .assert()
        .success()
        .stdout(predicate::str::contains("NTAG213 total_bytes=144"))
        .stdout(predicate::str::contains("max_payload=116 max_payload_any_length=117"))
        .stdout(predicate::str::contains("NTAG215"))
        .stdout(predicate::str::contains("NTAG216"));
}

#[test]
fn reconcile_writes_plan_and_prints_hash() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    fs::write(
        dir.path().join("assignments.csv"),
        format!("nft_id,offer,version\nnft1a,{o},\nnft1b,{o},DT002\n", o = offer()),
    )?;
    fs::write(
        dir.path().join("inventory.csv"),
        "uid,tag_kind\n04000000000001,NTAG215\n04000000000002,NTAG216\n",
    )?;

    let out = ntd()
        .current_dir(dir.path())
        .args(["reconcile", "--assignments", "assignments.csv"])
        .args(["--inventory", "inventory.csv", "--plan", "plan.csv"])
        .output()?;
    assert!(out.status.success());
    assert_eq!(field(&out.stdout, "plan_items"), "2");
    assert_eq!(field(&out.stdout, "plan_hash").len(), 64);

    let plan = fs::read_to_string(dir.path().join("plan.csv"))?;
    assert!(plan.starts_with("uid,version,nft_id,offer,tag_kind"));
    assert!(plan.contains("04000000000001,DT001,nft1a,"));
    assert!(plan.contains("04000000000002,DT002,nft1b,"));

    let log = fs::read_to_string(dir.path().join("output").join("operations.jsonl"))?;
    let line = log
        .lines()
        .find(|l| l.contains("\"PLAN_WRITTEN\""))
        .expect("PLAN_WRITTEN line");
    assert!(line.contains(&field(&out.stdout, "plan_hash")));
    Ok(())
}

#[test]
fn reconcile_refuses_count_mismatch() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    fs::write(
        dir.path().join("assignments.csv"),
        format!("nft_id,offer\nnft1a,{o}\nnft1b,{o}\n", o = offer()),
    )?;
    fs::write(
        dir.path().join("inventory.csv"),
        "uid,tag_kind\n04000000000001,NTAG215\n",
    )?;

    ntd()
        .current_dir(dir.path())
        .args(["reconcile", "--assignments", "assignments.csv"])
        .args(["--inventory", "inventory.csv", "--plan", "plan.csv"])
        .assert()
        .failure();
    assert!(!dir.path().join("plan.csv").exists());
    Ok(())
}

#[test]
fn config_hash_of_base_layer() -> anyhow::Result<()> {
    let base = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("config")
        .join("ntd.yaml")
        .canonicalize()?;

    let first = ntd().arg("config-hash").arg(&base).output()?;
    let second = ntd().arg("config-hash").arg(&base).output()?;
    assert!(first.status.success());
    let hash = field(&first.stdout, "config_hash");
    assert_eq!(hash.len(), 64);
    assert_eq!(hash, field(&second.stdout, "config_hash"));
    Ok(())
}
