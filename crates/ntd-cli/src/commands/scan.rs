//! `ntd scan` and `ntd reconcile`.

use anyhow::{bail, Context, Result};
use clap::Args;
use serde_json::json;
use std::path::Path;
use std::process::ExitCode;
use tracing::{info, warn};

use ntd_config::ConfigCommand;
use ntd_reconcile::{
    append_inventory_row, read_assignments, read_inventory, reconcile_with_default,
    write_inventory, write_plan, AssignmentRow, ScanSession, WritePlan,
};
use ntd_runtime::ReaderScanSource;
use ntd_schemas::{record_or_warn, EventKind, LogEntry, OperationLog, ScanEntry};

use super::{open_log, Ctx, EXIT_INCOMPLETE};
use crate::terminal::PromptedScanSource;

#[derive(Args)]
pub struct ScanArgs {
    /// Assignment CSV (`nft_id,offer[,version]`). Its row count is the scan target.
    #[arg(long)]
    pub assignments: String,

    /// Inventory CSV. Defaults to paths.inventory_file.
    #[arg(long)]
    pub inventory: Option<String>,

    /// Plan CSV. Defaults to paths.plan_file.
    #[arg(long)]
    pub plan: Option<String>,

    /// Version for rows that carry none. Defaults to batch.default_version.
    #[arg(long)]
    pub default_version: Option<String>,

    /// Keep tags already in the inventory and scan only the rest.
    #[arg(long, default_value_t = false)]
    pub resume: bool,
}

#[derive(Args)]
pub struct ReconcileArgs {
    #[arg(long)]
    pub assignments: String,

    #[arg(long)]
    pub inventory: Option<String>,

    #[arg(long)]
    pub plan: Option<String>,

    #[arg(long)]
    pub default_version: Option<String>,
}

fn load_rows(path: &str) -> Result<Vec<AssignmentRow>> {
    let rows = read_assignments(path)?;
    if rows.is_empty() {
        bail!("{path}: assignment file has no rows");
    }
    info!(rows = rows.len(), path, "assignments loaded");
    Ok(rows)
}

/// Pair, write the plan file and print its hash.
fn write_reviewed_plan(
    scan: &[ScanEntry],
    rows: &[AssignmentRow],
    default_version: &str,
    plan_path: &str,
) -> Result<WritePlan> {
    let plan = reconcile_with_default(scan, rows, Some(default_version))
        .context("reconcile scan with assignments")?;
    write_plan(plan_path, &plan)?;
    info!(items = plan.len(), plan_hash = %plan.plan_hash, path = plan_path, "plan written");

    println!("plan_file={plan_path}");
    println!("plan_items={}", plan.len());
    println!("plan_hash={}", plan.plan_hash);
    Ok(plan)
}

pub fn scan(ctx: &Ctx, args: ScanArgs) -> Result<ExitCode> {
    let loaded = ctx.settings(ConfigCommand::Scan)?;
    let settings = &loaded.settings;
    let rows = load_rows(&args.assignments)?;

    let inventory = args
        .inventory
        .unwrap_or_else(|| settings.paths.inventory_file.clone());
    let plan_path = args.plan.unwrap_or_else(|| settings.paths.plan_file.clone());
    let default_version = args
        .default_version
        .unwrap_or_else(|| settings.batch.default_version.clone());

    let existing = if args.resume && Path::new(&inventory).exists() {
        let entries = read_inventory(&inventory)?;
        info!(already = entries.len(), "resuming scan");
        entries
    } else {
        write_inventory(&inventory, &[])?;
        Vec::new()
    };

    let (mut reader, _deck) = ctx.open_reader(settings)?;
    let mut log = open_log(settings)?;

    let mut session = ScanSession::resume(existing, Some(rows.len()));
    let stdin = std::io::stdin();
    let mut source = PromptedScanSource::new(
        ReaderScanSource::new(&mut reader),
        stdin.lock(),
        std::io::stderr(),
    );
    let report = session.run(&mut source, &mut log, |entry| {
        append_inventory_row(&inventory, entry)
    })?;

    println!("inventory_file={inventory}");
    println!(
        "scan_recorded={} duplicates_ignored={} locked_refused={} rejected={} timeouts={}",
        report.recorded,
        report.duplicates_ignored,
        report.locked_refused,
        report.rejected,
        report.timeouts
    );

    let entries = session.into_entries();
    if entries.len() < rows.len() {
        warn!(
            scanned = entries.len(),
            assignments = rows.len(),
            "scan incomplete, plan not written (rerun with --resume)"
        );
        println!("plan_written=false remaining={}", rows.len() - entries.len());
        return Ok(ExitCode::from(EXIT_INCOMPLETE));
    }

    let plan = write_reviewed_plan(&entries, &rows, &default_version, &plan_path)?;
    record_plan(&mut log, &plan, &plan_path, loaded.config_hash.as_deref());
    Ok(ExitCode::SUCCESS)
}

pub fn reconcile(ctx: &Ctx, args: ReconcileArgs) -> Result<ExitCode> {
    let loaded = ctx.settings(ConfigCommand::Reconcile)?;
    let settings = &loaded.settings;
    let rows = load_rows(&args.assignments)?;
    let inventory = args
        .inventory
        .unwrap_or_else(|| settings.paths.inventory_file.clone());
    let plan_path = args.plan.unwrap_or_else(|| settings.paths.plan_file.clone());
    let default_version = args
        .default_version
        .unwrap_or_else(|| settings.batch.default_version.clone());

    let scanned = read_inventory(&inventory)?;
    let plan = write_reviewed_plan(&scanned, &rows, &default_version, &plan_path)?;
    let mut log = open_log(settings)?;
    record_plan(&mut log, &plan, &plan_path, loaded.config_hash.as_deref());
    Ok(ExitCode::SUCCESS)
}

fn record_plan<L: OperationLog + ?Sized>(
    log: &mut L,
    plan: &WritePlan,
    path: &str,
    config_hash: Option<&str>,
) {
    record_or_warn(
        log,
        LogEntry::new(
            EventKind::PlanWritten,
            None,
            json!({
                "path": path,
                "items": plan.len(),
                "plan_hash": plan.plan_hash,
                "config_hash": config_hash,
            }),
        ),
    );
}
