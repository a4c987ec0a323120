use anyhow::{bail, Result};

use ntd_schemas::{EventKind, LogEntry, OperationLog, Uid};

/// Operation log kept in memory. Can be told to fail every write.
#[derive(Debug, Default)]
pub struct MemoryLog {
    pub entries: Vec<LogEntry>,
    broken: bool,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every `record` fails.
    pub fn broken() -> Self {
        Self {
            entries: Vec::new(),
            broken: true,
        }
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.entries.iter().map(|e| e.event_kind).collect()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.entries.iter().filter(|e| e.event_kind == kind).count()
    }

    pub fn for_uid<'a>(&'a self, uid: &'a Uid) -> impl Iterator<Item = &'a LogEntry> + 'a {
        self.entries
            .iter()
            .filter(move |e| e.uid.as_ref() == Some(uid))
    }

    /// `"from->to"` for every transition logged for `uid`.
    pub fn transitions(&self, uid: &Uid) -> Vec<String> {
        self.for_uid(uid)
            .filter(|e| e.event_kind == EventKind::Transition)
            .map(|e| {
                format!(
                    "{}->{}",
                    e.detail["from"].as_str().unwrap_or("?"),
                    e.detail["to"].as_str().unwrap_or("?")
                )
            })
            .collect()
    }
}

impl OperationLog for MemoryLog {
    fn record(&mut self, entry: LogEntry) -> Result<()> {
        if self.broken {
            bail!("memory log is broken");
        }
        self.entries.push(entry);
        Ok(())
    }
}
