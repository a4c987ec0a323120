//! `ntd batch` and `ntd write`.
//!
//! The state machine blocks on the reader and on operator prompts, so a run
//! executes on a `spawn_blocking` worker. Ctrl-C sets the cancel flag; the
//! machine stops at the next state boundary, never mid-write.

use anyhow::{bail, Context, Result};
use std::process::ExitCode;
use tracing::{info, warn};

use ntd_audit::OperationLogWriter;
use ntd_config::ConfigCommand;
use ntd_execution::{CancelFlag, TagReader};
use ntd_profile::profile_for;
use ntd_reader_sim::SimReader;
use ntd_reconcile::{check_review_gate, read_plan, ReviewGate};
use ntd_runtime::{preflight, BatchOptions, BatchOrchestrator, PreparedItem, RunSummary};
use ntd_schemas::{NftRecord, WritePlanItem};

use super::{batch_options, open_log, Ctx, WriteFlags, EXIT_INCOMPLETE};
use crate::terminal::TerminalOperator;

pub async fn batch(
    ctx: &Ctx,
    plan: Option<String>,
    plan_hash: Option<String>,
    flags: WriteFlags,
) -> Result<ExitCode> {
    let settings = ctx.settings(ConfigCommand::Batch)?.settings;
    let plan_path = plan.unwrap_or_else(|| settings.paths.plan_file.clone());
    let plan = read_plan(&plan_path)?;
    info!(items = plan.len(), plan_hash = %plan.plan_hash, path = %plan_path, "plan loaded");

    match plan_hash {
        Some(ack) => {
            if let ReviewGate::Blocked {
                expected,
                acknowledged,
            } = check_review_gate(&plan, &ack)
            {
                bail!(
                    "PLAN_HASH_MISMATCH: {plan_path} hashes to {expected}, acknowledged {acknowledged}; review the plan again"
                );
            }
            info!("plan hash acknowledged");
        }
        None if settings.batch.require_plan_hash => {
            bail!("PLAN_HASH_REQUIRED: batch.require_plan_hash is set; pass --plan-hash from scan/reconcile");
        }
        None => {}
    }

    let opts = batch_options(&settings, flags);
    let prepared = preflight(&plan.items, &opts).context("PREFLIGHT_FAILED")?;
    println!("preflight_ok=true items={}", prepared.len());

    let (mut reader, deck) = ctx.open_reader(&settings)?;
    reader.follow_plan(prepared.iter().map(|p| &p.item.uid));
    let log = open_log(&settings)?;
    let run_id = log.run_id();

    let (summary, reader) = run_blocking(reader, log, prepared, opts).await?;
    reader.save(&deck)?;

    println!("run_id={run_id}");
    Ok(report(&summary))
}

pub async fn write_one(
    ctx: &Ctx,
    nft_id: String,
    offer: String,
    version: Option<String>,
    flags: WriteFlags,
) -> Result<ExitCode> {
    let settings = ctx.settings(ConfigCommand::Write)?.settings;
    let opts = batch_options(&settings, flags);
    let version = version.or_else(|| Some(settings.batch.default_version.clone()));
    let record = NftRecord::new(nft_id, offer, version)?;

    let (mut reader, deck) = ctx.open_reader(&settings)?;
    let uid = reader.wait_for_tag().context("no tag on the reader")?;
    let marker = reader
        .identify(&uid)
        .with_context(|| format!("identify {uid}"))?;
    let profile = profile_for(marker)?;
    info!(%uid, tag_kind = profile.name, "tag on reader");

    let item = WritePlanItem {
        uid,
        detected_profile: profile,
        record,
    };
    let prepared = preflight(std::slice::from_ref(&item), &opts).context("PREFLIGHT_FAILED")?;

    let log = open_log(&settings)?;
    let (summary, reader) = run_blocking(reader, log, prepared, opts).await?;
    reader.save(&deck)?;
    Ok(report(&summary))
}

async fn run_blocking(
    mut reader: SimReader,
    mut log: OperationLogWriter,
    prepared: Vec<PreparedItem>,
    opts: BatchOptions,
) -> Result<(RunSummary, SimReader)> {
    let cancel = CancelFlag::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("ctrl-c: stopping after the current step");
                cancel.cancel();
            }
        })
    };

    let worker = tokio::task::spawn_blocking(move || {
        let stdin = std::io::stdin();
        let mut operator = TerminalOperator::new(stdin.lock(), std::io::stderr());
        let summary = BatchOrchestrator::new(&mut reader, &mut operator, &mut log, opts)
            .with_cancel(cancel)
            .run(&prepared);
        (summary, reader)
    });

    let result = worker.await.context("batch worker panicked");
    watcher.abort();
    result
}

fn report(summary: &RunSummary) -> ExitCode {
    for o in &summary.outcomes {
        println!(
            "outcome uid={} status={} detail={}",
            o.uid,
            o.status,
            o.error_detail.as_deref().unwrap_or("")
        );
    }
    for uid in &summary.not_attempted {
        println!("not_attempted uid={uid}");
    }
    println!("summary {summary}");

    if summary.is_full_success() {
        println!("full_success=true");
        ExitCode::SUCCESS
    } else {
        println!("full_success=false");
        ExitCode::from(EXIT_INCOMPLETE)
    }
}
