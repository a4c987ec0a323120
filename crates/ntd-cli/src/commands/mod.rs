//! Command handlers for the `ntd` binary.
//!
//! Shared plumbing (config layers, reader, operation log, flag merging) lives
//! here. Command-specific logic lives in the submodules.

pub mod batch;
pub mod scan;
pub mod tag;

use anyhow::{bail, Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{info, warn};

use ntd_audit::{verify_hash_chain, OperationLogWriter, VerifyResult};
use ntd_config::{ConfigCommand, Settings, UnusedKeyPolicy};
use ntd_reader_sim::SimReader;
use ntd_runtime::BatchOptions;

/// Comma-separated config layers used when no `--config` is given.
pub const ENV_CONFIG: &str = "NTD_CONFIG";

/// Exit code for a run that finished but not everything was written.
pub const EXIT_INCOMPLETE: u8 = 2;

/// Write-behaviour switches shared by `batch` and `write`. Flags only ever
/// turn a setting on; leave them off to keep the config value.
#[derive(Args, Debug, Clone, Copy, Default)]
pub struct WriteFlags {
    /// Ask to lock each tag after a verified write.
    #[arg(long, default_value_t = false)]
    pub lock: bool,

    /// Overwrite tags that already carry a different record.
    #[arg(long, default_value_t = false)]
    pub force: bool,

    /// 5-character offers, two-field payload without version.
    #[arg(long, default_value_t = false)]
    pub legacy_offer: bool,

    /// Accept any offer length up to 255 bytes.
    #[arg(long, default_value_t = false)]
    pub allow_any_length: bool,

    /// Attempts per tag before it fails. 0 = unlimited.
    #[arg(long)]
    pub max_attempts: Option<u32>,
}

pub fn batch_options(settings: &Settings, flags: WriteFlags) -> BatchOptions {
    let b = &settings.batch;
    BatchOptions {
        lock_tags: b.lock_tags || flags.lock,
        force: b.force || flags.force,
        legacy_offer: b.legacy_offer || flags.legacy_offer,
        allow_any_length: b.allow_any_length || flags.allow_any_length,
        max_attempts: flags.max_attempts.unwrap_or(b.max_attempts),
    }
}

pub struct Loaded {
    pub settings: Settings,
    /// `None` when running on built-in defaults.
    pub config_hash: Option<String>,
}

/// Global CLI options.
pub struct Ctx {
    config_paths: Vec<String>,
    strict_config: bool,
    deck: Option<String>,
}

impl Ctx {
    pub fn new(config_paths: Vec<String>, strict_config: bool, deck: Option<String>) -> Self {
        Self {
            config_paths,
            strict_config,
            deck,
        }
    }

    fn layer_paths(&self) -> Vec<String> {
        if !self.config_paths.is_empty() {
            return self.config_paths.clone();
        }
        std::env::var(ENV_CONFIG)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Merge config layers for `command` and report keys it never reads.
    pub fn settings(&self, command: ConfigCommand) -> Result<Loaded> {
        let paths = self.layer_paths();
        if paths.is_empty() {
            info!("no config layers given, using built-in defaults");
            return Ok(Loaded {
                settings: Settings::default(),
                config_hash: None,
            });
        }

        let loaded = ntd_config::load_layered_yaml(&paths)?;
        let policy = if self.strict_config {
            UnusedKeyPolicy::Fail
        } else {
            UnusedKeyPolicy::Warn
        };
        let report = ntd_config::report_unused_keys(command, &loaded.config_json, policy)?;
        for key in &report.unused_leaf_pointers {
            warn!(command = command.as_str(), key = %key, "config key not used by this command");
        }
        let settings = loaded.settings()?;
        info!(config_hash = %loaded.config_hash, layers = paths.len(), "config loaded");
        Ok(Loaded {
            settings,
            config_hash: Some(loaded.config_hash),
        })
    }

    /// Open the simulated reader. Returns the deck path so the caller can
    /// save tag contents back after a run.
    pub fn open_reader(&self, settings: &Settings) -> Result<(SimReader, PathBuf)> {
        let Some(deck) = self.deck.clone().or_else(|| settings.reader.deck.clone()) else {
            bail!("no reader configured: pass --deck or set reader.deck (no hardware driver is built in)");
        };
        let path = PathBuf::from(deck);
        let reader = SimReader::load(&path)?
            .with_idle_timeout(Duration::from_millis(settings.reader.idle_timeout_ms));
        info!(deck = %path.display(), "simulated reader ready");
        Ok((reader, path))
    }
}

pub fn open_log(settings: &Settings) -> Result<OperationLogWriter> {
    let path = &settings.paths.operations_log;
    let log = OperationLogWriter::open(path, settings.log.hash_chain)
        .with_context(|| format!("open operation log {path}"))?;
    info!(run_id = %log.run_id(), path = %path, "operation log open");
    Ok(log)
}

pub fn verify_log(ctx: &Ctx, path: Option<String>) -> Result<ExitCode> {
    let path = match path {
        Some(p) => p,
        None => ctx.settings(ConfigCommand::Batch)?.settings.paths.operations_log,
    };
    match verify_hash_chain(&path)? {
        VerifyResult::Valid { lines } => {
            println!("chain_valid=true lines={lines} path={path}");
            Ok(ExitCode::SUCCESS)
        }
        VerifyResult::Broken { line, reason } => {
            println!("chain_valid=false line={line} path={path}");
            println!("reason={reason}");
            Ok(ExitCode::FAILURE)
        }
    }
}
