use serde::{Deserialize, Serialize};

use ntd_schemas::DEFAULT_VERSION;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub batch: BatchSettings,
    pub paths: PathSettings,
    pub log: LogSettings,
    pub reader: ReaderSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    /// Ask to lock each tag after a verified write.
    pub lock_tags: bool,
    /// Version stamped on assignment rows that carry none.
    pub default_version: String,
    /// 5-character offers and the two-field payload layout.
    pub legacy_offer: bool,
    /// Relax the offer-length policy and let the codec drop the terminator.
    pub allow_any_length: bool,
    /// Overwrite tags that already carry a different record.
    pub force: bool,
    /// Per-tag attempt ceiling. 0 means unlimited.
    pub max_attempts: u32,
    /// Refuse to run a plan unless its hash is acknowledged.
    pub require_plan_hash: bool,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            lock_tags: false,
            default_version: DEFAULT_VERSION.to_string(),
            legacy_offer: false,
            allow_any_length: false,
            force: false,
            max_attempts: 0,
            require_plan_hash: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub output_dir: String,
    pub inventory_file: String,
    pub plan_file: String,
    pub operations_log: String,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            output_dir: "output".to_string(),
            inventory_file: "output/tag_inventory.csv".to_string(),
            plan_file: "output/full_nfc_data.csv".to_string(),
            operations_log: "output/operations.jsonl".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Chain every operation-log line to the previous one with SHA-256.
    pub hash_chain: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self { hash_chain: true }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderSettings {
    /// Tag deck file for the simulated reader.
    pub deck: Option<String>,
    /// How long a wait for a tag may idle before it faults. 0 waits forever.
    pub idle_timeout_ms: u64,
}
