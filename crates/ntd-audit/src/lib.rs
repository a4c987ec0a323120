//! ntd-audit
//!
//! Append-only operation log. One JSON object per line, keys sorted, each line
//! optionally chained to the previous one by SHA-256 so edits after the fact
//! are detectable with [`verify_hash_chain`].
//!
//! A log file outlives a single run: opening an existing file resumes the
//! chain from its last line, and every line carries the `run_id` that wrote it.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use ntd_schemas::{EventKind, LogEntry, OperationLog, Uid};

/// Namespace for deterministic event ids.
const EVENT_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6e74_6431_6f70_6c6f_6700_0000_0000_0001);

pub struct OperationLogWriter {
    path: PathBuf,
    hash_chain: bool,
    run_id: Uuid,
    last_hash: Option<String>,
    /// Lines in the file so far, across runs.
    seq: u64,
}

impl OperationLogWriter {
    /// Open (or create) the log at `path` for a fresh run.
    pub fn open(path: impl AsRef<Path>, hash_chain: bool) -> Result<Self> {
        Self::open_with_run_id(path, hash_chain, Uuid::new_v4())
    }

    pub fn open_with_run_id(path: impl AsRef<Path>, hash_chain: bool, run_id: Uuid) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create_dir_all {}", parent.display()))?;
            }
        }

        let (seq, last_hash) = if path.exists() {
            resume_state(&path)?
        } else {
            (0, None)
        };
        debug!(path = %path.display(), seq, %run_id, "operation log opened");

        // Unchained lines after chained ones would break verification.
        let hash_chain = if !hash_chain && last_hash.is_some() {
            warn!(path = %path.display(), "log is already hash-chained; keeping the chain on");
            true
        } else {
            hash_chain
        };

        Ok(Self {
            path,
            hash_chain,
            run_id,
            last_hash,
            seq,
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn last_hash(&self) -> Option<&str> {
        self.last_hash.as_deref()
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Append one entry and return the line as written.
    pub fn append(&mut self, entry: LogEntry) -> Result<LogRecord> {
        let event_id = derive_event_id(self.last_hash.as_deref(), &entry.detail, self.seq)?;

        let mut rec = LogRecord {
            event_id,
            run_id: self.run_id,
            seq: self.seq,
            ts_utc: entry.timestamp,
            event_kind: entry.event_kind,
            uid: entry.uid,
            state: entry.state,
            detail: entry.detail,
            hash_prev: None,
            hash_self: None,
        };

        if self.hash_chain {
            rec.hash_prev = self.last_hash.clone();
            let h = compute_record_hash(&rec)?;
            rec.hash_self = Some(h);
        }

        let line = canonical_json_line(&rec)?;
        append_line(&self.path, &line)?;

        // Only advance the chain once the line is on disk.
        self.seq += 1;
        if self.hash_chain {
            self.last_hash = rec.hash_self.clone();
        }
        Ok(rec)
    }
}

impl OperationLog for OperationLogWriter {
    fn record(&mut self, entry: LogEntry) -> Result<()> {
        self.append(entry).map(|_| ())
    }
}

/// One line of the operation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub event_id: Uuid,
    pub run_id: Uuid,
    pub seq: u64,
    pub ts_utc: DateTime<Utc>,
    pub event_kind: EventKind,
    pub uid: Option<Uid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub detail: Value,
    pub hash_prev: Option<String>,
    pub hash_self: Option<String>,
}

fn resume_state(path: &Path) -> Result<(u64, Option<String>)> {
    let content =
        fs::read_to_string(path).with_context(|| format!("read operation log {}", path.display()))?;
    let mut seq = 0u64;
    let mut last: Option<&str> = None;
    for line in content.lines().filter(|l| !l.trim().is_empty()) {
        seq += 1;
        last = Some(line);
    }
    let last_hash = match last {
        Some(line) => {
            let rec: LogRecord = serde_json::from_str(line.trim())
                .with_context(|| format!("parse last line of {}", path.display()))?;
            rec.hash_self
        }
        None => None,
    };
    Ok((seq, last_hash))
}

/// Event id is a v5 UUID over chain position and content. No RNG.
pub fn derive_event_id(prev_hash: Option<&str>, detail: &Value, seq: u64) -> Result<Uuid> {
    let detail_json = serde_json::to_string(&sort_keys(detail)).context("serialize detail")?;
    let name = format!("{}|{}|{}", prev_hash.unwrap_or("-"), seq, detail_json);
    Ok(Uuid::new_v5(&EVENT_ID_NAMESPACE, name.as_bytes()))
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open operation log {}", path.display()))?;
    // One write call per line keeps lines whole.
    let mut buf = String::with_capacity(line.len() + 1);
    buf.push_str(line);
    buf.push('\n');
    f.write_all(buf.as_bytes())
        .context("write operation log line failed")?;
    Ok(())
}

fn canonical_json_line<T: Serialize>(v: &T) -> Result<String> {
    let raw = serde_json::to_value(v).context("serialize log record failed")?;
    serde_json::to_string(&sort_keys(&raw)).context("json stringify failed")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = serde_json::Map::new();
            for k in keys {
                out.insert(k.clone(), sort_keys(&map[k]));
            }
            Value::Object(out)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

/// Hash over the canonical line with `hash_self` cleared.
pub fn compute_record_hash(rec: &LogRecord) -> Result<String> {
    let mut clone = rec.clone();
    clone.hash_self = None;
    let canonical = canonical_json_line(&clone)?;
    Ok(hex::encode(Sha256::digest(canonical.as_bytes())))
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    Valid { lines: usize },
    /// First broken line (1-based).
    Broken { line: usize, reason: String },
}

impl VerifyResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, VerifyResult::Valid { .. })
    }
}

pub fn verify_hash_chain(path: impl AsRef<Path>) -> Result<VerifyResult> {
    let path = path.as_ref();
    let content =
        fs::read_to_string(path).with_context(|| format!("read operation log {}", path.display()))?;
    verify_hash_chain_str(&content)
}

/// Same as [`verify_hash_chain`] over in-memory JSONL.
///
/// A line that does not parse is reported as a break, not an error.
pub fn verify_hash_chain_str(content: &str) -> Result<VerifyResult> {
    let mut prev_hash: Option<String> = None;
    let mut count = 0usize;

    for (i, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let rec: LogRecord = match serde_json::from_str(trimmed) {
            Ok(r) => r,
            Err(e) => {
                return Ok(VerifyResult::Broken {
                    line: i + 1,
                    reason: format!("unparseable line: {e}"),
                })
            }
        };
        count += 1;

        if rec.hash_prev != prev_hash {
            return Ok(VerifyResult::Broken {
                line: i + 1,
                reason: format!(
                    "hash_prev mismatch: expected {:?}, got {:?}",
                    prev_hash, rec.hash_prev
                ),
            });
        }

        if let Some(claimed) = &rec.hash_self {
            let recomputed = compute_record_hash(&rec)?;
            if *claimed != recomputed {
                return Ok(VerifyResult::Broken {
                    line: i + 1,
                    reason: format!("hash_self mismatch: claimed {claimed}, recomputed {recomputed}"),
                });
            }
        }

        prev_hash = rec.hash_self;
    }

    Ok(VerifyResult::Valid { lines: count })
}
