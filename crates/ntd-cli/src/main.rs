use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process::ExitCode;

mod commands;
mod terminal;

use commands::{batch, scan, tag, Ctx, WriteFlags};

#[derive(Parser)]
#[command(name = "ntd")]
#[command(about = "NFT Tag Desk CLI", long_about = None)]
struct Cli {
    /// Config layers in merge order (base -> site). Falls back to NTD_CONFIG.
    #[arg(long = "config", global = true)]
    config_paths: Vec<String>,

    /// Fail instead of warn when a config key is never read by the command.
    #[arg(long, global = true, default_value_t = false)]
    strict_config: bool,

    /// Tag deck for the simulated reader. Overrides reader.deck.
    #[arg(long, global = true)]
    deck: Option<String>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record presented tags into the inventory, then write the plan
    Scan(scan::ScanArgs),

    /// Pair an existing inventory with the assignment file and write the plan
    Reconcile(scan::ReconcileArgs),

    /// Write (and optionally lock) every tag in the plan
    Batch {
        /// Plan file. Defaults to paths.plan_file.
        #[arg(long)]
        plan: Option<String>,

        /// Plan hash printed by scan/reconcile; a mismatch blocks the batch.
        #[arg(long)]
        plan_hash: Option<String>,

        #[command(flatten)]
        flags: WriteFlags,
    },

    /// Write one record onto whatever tag is on the reader
    Write {
        #[arg(long)]
        nft_id: String,

        #[arg(long)]
        offer: String,

        /// Defaults to batch.default_version. Pass "" for none.
        #[arg(long)]
        version: Option<String>,

        #[command(flatten)]
        flags: WriteFlags,
    },

    /// Identify the tag on the reader and decode its record
    Read {
        /// Also dump the raw data area.
        #[arg(long, default_value_t = false)]
        hex: bool,
    },

    /// Print the supported tag profiles and their payload budgets
    Info,

    /// Encode a record for a tag kind and print the bytes
    Encode(tag::EncodeArgs),

    /// Decode hex bytes read from a tag
    Decode {
        #[arg(long, value_parser = tag::parse_kind)]
        kind: ntd_profile::TagKind,

        /// Data area bytes, spaces allowed.
        hex: String,
    },

    /// Operation log utilities
    Log {
        #[command(subcommand)]
        cmd: LogCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> site)
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

#[derive(Subcommand)]
enum LogCmd {
    /// Check the hash chain of an operation log. Defaults to paths.operations_log.
    Verify { path: Option<String> },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Silent if the files do not exist.
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::dotenv();

    init_tracing();

    let cli = Cli::parse();
    let ctx = Ctx::new(cli.config_paths, cli.strict_config, cli.deck);

    match cli.cmd {
        Commands::Scan(args) => scan::scan(&ctx, args),
        Commands::Reconcile(args) => scan::reconcile(&ctx, args),
        Commands::Batch {
            plan,
            plan_hash,
            flags,
        } => batch::batch(&ctx, plan, plan_hash, flags).await,
        Commands::Write {
            nft_id,
            offer,
            version,
            flags,
        } => batch::write_one(&ctx, nft_id, offer, version, flags).await,
        Commands::Read { hex } => tag::read(&ctx, hex),
        Commands::Info => tag::info(),
        Commands::Encode(args) => tag::encode(args),
        Commands::Decode { kind, hex } => tag::decode(kind, &hex),
        Commands::Log { cmd } => match cmd {
            LogCmd::Verify { path } => commands::verify_log(&ctx, path),
        },
        Commands::ConfigHash { paths } => {
            let loaded = ntd_config::load_layered_yaml(&paths)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Logs go to stderr; stdout carries `key=value` results.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}
