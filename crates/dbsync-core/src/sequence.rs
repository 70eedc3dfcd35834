use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Next counter value to install per table after an import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencePlan {
    entries: BTreeMap<String, SequenceEntry>,
}

/// One planned sequence reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceEntry {
    pub column: String,
    pub next_value: i64,
}

impl SequencePlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// `max + 1`, or `1` for an empty table.
    pub fn next_value(max_primary_key: Option<i64>) -> i64 {
        max_primary_key.map_or(1, |max| max.saturating_add(1).max(1))
    }

    /// Plan a reset from the observed maximum key.
    pub fn record(&mut self, table: &str, column: &str, max_primary_key: Option<i64>) {
        self.entries.insert(
            table.to_string(),
            SequenceEntry {
                column: column.to_string(),
                next_value: Self::next_value(max_primary_key),
            },
        );
    }

    pub fn get(&self, table: &str) -> Option<&SequenceEntry> {
        self.entries.get(table)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SequenceEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
