use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use ntd_profile::{profile_for, TagMarker};
use ntd_schemas::Uid;

use crate::SimTag;

/// On-disk tag deck.
///
/// ```json
/// {
///   "tags": [
///     { "uid": "04A1B2C3D4E5F6", "kind": "NTAG215" },
///     { "uid": "04A1B2C3D4E5F7", "kind": "NTAG216", "fail_writes": 1 }
///   ],
///   "presentations": ["04A1B2C3D4E5F7", "04A1B2C3D4E5F6"]
/// }
/// ```
///
/// Without `presentations` every tag is presented once, in file order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeckFile {
    pub tags: Vec<DeckTag>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub presentations: Vec<Uid>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeckTag {
    pub uid: Uid,
    /// Tag kind name as used in CSV files.
    pub kind: String,
    /// User memory as hex. Missing or short memory is zero-filled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock: Option<String>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub fail_writes: u32,
    #[serde(default, skip_serializing_if = "is_false")]
    pub lock_stuck: bool,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

fn is_false(b: &bool) -> bool {
    !*b
}

fn hex_into(field: &str, raw: &str, dest: &mut [u8]) -> Result<()> {
    let bytes = hex::decode(raw.trim()).with_context(|| format!("{field} is not hex"))?;
    anyhow::ensure!(
        bytes.len() <= dest.len(),
        "{field} is {} bytes, tag holds {}",
        bytes.len(),
        dest.len()
    );
    dest[..bytes.len()].copy_from_slice(&bytes);
    Ok(())
}

impl DeckTag {
    pub fn into_sim_tag(self) -> Result<SimTag> {
        let profile = profile_for(TagMarker::Name(&self.kind))
            .with_context(|| format!("tag {}", self.uid))?;
        let mut tag = SimTag::blank(self.uid, profile.kind);
        if let Some(raw) = &self.memory {
            hex_into("memory", raw, &mut tag.memory).with_context(|| format!("tag {}", tag.uid))?;
        }
        if let Some(raw) = &self.lock {
            hex_into("lock", raw, &mut tag.lock).with_context(|| format!("tag {}", tag.uid))?;
        }
        tag.fail_writes = self.fail_writes;
        tag.lock_stuck = self.lock_stuck;
        Ok(tag)
    }

    pub fn from_sim_tag(tag: &SimTag) -> Self {
        // Trailing zeros are implied on load.
        let used = tag
            .memory
            .iter()
            .rposition(|b| *b != 0)
            .map_or(0, |i| i + 1);
        Self {
            uid: tag.uid.clone(),
            kind: tag.profile.kind.as_str().to_string(),
            memory: (used > 0).then(|| hex::encode_upper(&tag.memory[..used])),
            lock: tag
                .lock
                .iter()
                .any(|b| *b != 0)
                .then(|| hex::encode_upper(&tag.lock)),
            fail_writes: tag.fail_writes,
            lock_stuck: tag.lock_stuck,
        }
    }
}
