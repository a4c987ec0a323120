//! Single-tag and offline commands: `read`, `info`, `encode`, `decode`.

use anyhow::{Context, Result};
use clap::Args;
use std::process::ExitCode;
use tracing::warn;

use ntd_config::ConfigCommand;
use ntd_execution::TagReader;
use ntd_ndef::{
    decode as decode_record, detect_layout, encode as encode_record, hex_dump, max_payload_len,
    parse_hex, payload_len, EncodeOptions, PayloadLayout,
};
use ntd_profile::{all_profiles, profile_by_kind, profile_for, TagKind, TagProfile};
use ntd_schemas::NftRecord;

use super::Ctx;

pub fn parse_kind(raw: &str) -> Result<TagKind, String> {
    TagKind::parse(raw).map_err(|e| e.to_string())
}

fn layout_name(layout: PayloadLayout) -> &'static str {
    match layout {
        PayloadLayout::Current => "current",
        PayloadLayout::Legacy => "legacy",
    }
}

fn print_record(record: &NftRecord) {
    println!("version={}", record.version.as_deref().unwrap_or(""));
    println!("nft_id={}", record.nft_id);
    println!("offer={}", record.offer);
}

#[derive(Args)]
pub struct EncodeArgs {
    #[arg(long, value_parser = parse_kind)]
    pub kind: TagKind,

    #[arg(long)]
    pub nft_id: String,

    #[arg(long)]
    pub offer: String,

    #[arg(long)]
    pub version: Option<String>,

    /// Two-field layout; any version is dropped.
    #[arg(long, default_value_t = false)]
    pub legacy_offer: bool,

    #[arg(long, default_value_t = false)]
    pub allow_any_length: bool,
}

pub fn encode(args: EncodeArgs) -> Result<ExitCode> {
    let profile = profile_by_kind(args.kind);
    let mut record = NftRecord::new(args.nft_id, args.offer, args.version)?;
    let layout = if args.legacy_offer {
        record = record.without_version();
        PayloadLayout::Legacy
    } else {
        PayloadLayout::Current
    };
    let opts = EncodeOptions {
        layout,
        allow_any_length: args.allow_any_length,
    };

    let bytes = encode_record(&record, profile, opts)?;
    println!("tag_kind={}", profile.kind);
    println!("layout={}", layout_name(opts.layout));
    println!("payload_len={}", payload_len(&record, opts.layout));
    println!("bytes={} capacity={}", bytes.len(), profile.total_bytes);
    println!("hex={}", hex_dump(&bytes));
    Ok(ExitCode::SUCCESS)
}

pub fn decode(kind: TagKind, hex: &str) -> Result<ExitCode> {
    let profile = profile_by_kind(kind);
    let bytes = parse_hex(hex)?;
    let layout = detect_layout(&bytes, profile)?;
    let record = decode_record(&bytes, profile)?;
    println!("tag_kind={}", profile.kind);
    println!("layout={}", layout_name(layout));
    print_record(&record);
    Ok(ExitCode::SUCCESS)
}

pub fn info() -> Result<ExitCode> {
    let any = EncodeOptions {
        allow_any_length: true,
        ..EncodeOptions::default()
    };
    for p in all_profiles() {
        println!(
            "{} total_bytes={} pages=0x{:02X}..=0x{:02X} lock_page=0x{:02X} product_type=0x{:02X} cc_size=0x{:02X} max_payload={} max_payload_any_length={}",
            p.name,
            p.total_bytes,
            p.lockable_page_start,
            p.lockable_page_end,
            p.dynamic_lock_page,
            p.product_type,
            p.cc_size_byte,
            max_payload_len(p, EncodeOptions::default()),
            max_payload_len(p, any),
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn print_tag_contents(profile: &TagProfile, data: &[u8], show_hex: bool) {
    match detect_layout(data, profile).and_then(|l| decode_record(data, profile).map(|r| (l, r))) {
        Ok((layout, record)) => {
            println!("record=present layout={}", layout_name(layout));
            print_record(&record);
        }
        Err(e) => println!("record=none reason={e}"),
    }
    if show_hex {
        let used = data.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
        println!("hex={}", hex_dump(&data[..used]));
    }
}

pub fn read(ctx: &Ctx, show_hex: bool) -> Result<ExitCode> {
    let settings = ctx.settings(ConfigCommand::Read)?.settings;
    let (mut reader, _deck) = ctx.open_reader(&settings)?;

    let uid = reader.wait_for_tag().context("no tag on the reader")?;
    let marker = reader
        .identify(&uid)
        .with_context(|| format!("identify {uid}"))?;
    let profile = profile_for(marker)?;
    let lock = reader
        .read_lock_bits(&uid, profile.lockable_pages())
        .with_context(|| format!("read lock bits of {uid}"))?;
    let data = reader
        .read_block(&uid)
        .with_context(|| format!("read {uid}"))?;

    println!("uid={uid}");
    println!("tag_kind={} total_bytes={}", profile.kind, profile.total_bytes);
    println!("locked={}", profile.lock_bits_set(&lock));
    print_tag_contents(profile, &data, show_hex);

    if let Err(e) = reader.wait_for_removal(&uid) {
        warn!(%uid, error = %e, "tag removal not confirmed");
    }
    Ok(ExitCode::SUCCESS)
}
