//! Change containers and the counters reported around them.
//!
//! Row contents are opaque here; the change-tracking engine owns their
//! meaning. Only the shape needed to move them between replicas is modelled.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One table's worth of changed rows inside a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerTable {
    #[serde(rename = "n")]
    pub table_name: String,
    #[serde(rename = "s", default, skip_serializing_if = "Option::is_none")]
    pub schema_name: Option<String>,
    #[serde(rename = "r", default)]
    pub rows: Vec<Vec<Value>>,
}

impl ContainerTable {
    /// Creates an empty table container.
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            schema_name: None,
            rows: Vec::new(),
        }
    }

    /// Appends a row.
    pub fn push_row(&mut self, row: Vec<Value>) {
        self.rows.push(row);
    }
}

/// A rows batch: the payload of one upload or download step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerSet {
    #[serde(rename = "t", default)]
    pub tables: Vec<ContainerTable>,
}

impl ContainerSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of rows across all tables.
    #[must_use]
    pub fn rows_count(&self) -> usize {
        self.tables.iter().map(|t| t.rows.len()).sum()
    }

    /// Returns true if no table holds any row.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows_count() == 0
    }

    /// Returns the container for `table_name`, creating it if needed.
    pub fn table_mut(&mut self, table_name: &str) -> &mut ContainerTable {
        let pos = match self.tables.iter().position(|t| t.table_name == table_name) {
            Some(pos) => pos,
            None => {
                self.tables.push(ContainerTable::new(table_name));
                self.tables.len() - 1
            }
        };
        &mut self.tables[pos]
    }
}

/// Per-table counters of applied changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableChangesApplied {
    #[serde(rename = "tn")]
    pub table_name: String,
    #[serde(rename = "sn", default, skip_serializing_if = "Option::is_none")]
    pub schema_name: Option<String>,
    #[serde(rename = "a", default)]
    pub applied: u64,
    #[serde(rename = "rc", default)]
    pub resolved_conflicts: u64,
    #[serde(rename = "f", default)]
    pub failed: u64,
}

/// Changes applied on one side of the session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseChangesApplied {
    #[serde(rename = "tca", default)]
    pub table_changes_applied: Vec<TableChangesApplied>,
}

impl DatabaseChangesApplied {
    #[must_use]
    pub fn total_applied(&self) -> u64 {
        self.table_changes_applied.iter().map(|t| t.applied).sum()
    }

    #[must_use]
    pub fn total_resolved_conflicts(&self) -> u64 {
        self.table_changes_applied
            .iter()
            .map(|t| t.resolved_conflicts)
            .sum()
    }

    #[must_use]
    pub fn total_failed(&self) -> u64 {
        self.table_changes_applied.iter().map(|t| t.failed).sum()
    }
}

/// Per-table counters of selected changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableChangesSelected {
    #[serde(rename = "n")]
    pub table_name: String,
    #[serde(rename = "s", default, skip_serializing_if = "Option::is_none")]
    pub schema_name: Option<String>,
    #[serde(rename = "d", default)]
    pub deletes: u64,
    #[serde(rename = "u", default)]
    pub upserts: u64,
}

/// Changes selected for sending on one side of the session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseChangesSelected {
    #[serde(rename = "tcs", default)]
    pub table_changes_selected: Vec<TableChangesSelected>,
}

impl DatabaseChangesSelected {
    #[must_use]
    pub fn total_selected(&self) -> u64 {
        self.table_changes_selected
            .iter()
            .map(|t| t.deletes + t.upserts)
            .sum()
    }
}

/// One persisted part of a batched change set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchPartInfo {
    #[serde(rename = "file")]
    pub file_name: String,
    #[serde(rename = "index")]
    pub index: u32,
    #[serde(rename = "last", default)]
    pub is_last: bool,
    #[serde(rename = "rc", default)]
    pub rows_count: u64,
}

/// Summary of a batched change set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchInfo {
    #[serde(rename = "parts", default)]
    pub parts: Vec<BatchPartInfo>,
    #[serde(rename = "rc", default)]
    pub rows_count: u64,
    #[serde(rename = "ts", default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl BatchInfo {
    /// Number of parts in the batch.
    #[must_use]
    pub fn batch_count(&self) -> usize {
        self.parts.len()
    }
}
