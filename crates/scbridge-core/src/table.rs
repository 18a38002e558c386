//! The voice table — one row per live remote synth instance.
//!
//! Schema-on-write: the column set starts at `name`/`id`/`type`/`status` and
//! grows whenever a new parameter name shows up in traffic. Columns are never
//! removed; rows that never set a column read as empty. This mirrors how the
//! engine reports state — arbitrary synth params, no fixed record shape.

use std::collections::HashMap;

use serde::Serialize;

pub const COL_NAME: &str = "name";
pub const COL_ID: &str = "id";
pub const COL_TYPE: &str = "type";
pub const COL_STATUS: &str = "status";

/// The only status value ever written: confirmed kills delete the row
/// outright (matching the optimistic local kill), so a "killed" status never
/// appears in a live table — killed is an event verb, not a row state.
pub const STATUS_PLAYING: &str = "playing";

/// Dynamic-column table keyed by engine-assigned node id.
///
/// Not internally synchronized — the owning registry serializes all access.
#[derive(Debug, Default)]
pub struct VoiceTable {
    columns: Vec<String>,
    rows: Vec<HashMap<String, String>>,
}

/// Point-in-time copy of the table, column-ordered, for status endpoints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSnapshot {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl VoiceTable {
    pub fn new() -> Self {
        Self {
            columns: [COL_NAME, COL_ID, COL_TYPE, COL_STATUS]
                .iter()
                .map(ToString::to_string)
                .collect(),
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Add a column if it is not already present. Append-only and idempotent;
    /// existing rows implicitly hold the empty default.
    pub fn ensure_column(&mut self, name: &str) {
        if !self.columns.iter().any(|c| c == name) {
            self.columns.push(name.to_string());
        }
    }

    /// Append a row from explicit cell values, growing columns as needed.
    /// Cells for columns not listed default to empty.
    pub fn append_row<'a>(&mut self, cells: impl IntoIterator<Item = (&'a str, String)>) {
        let mut row = HashMap::new();
        for (col, value) in cells {
            self.ensure_column(col);
            row.insert(col.to_string(), value);
        }
        self.rows.push(row);
    }

    /// Cell value, empty string if the row never set that column.
    pub fn value(&self, row: usize, col: &str) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map_or("", String::as_str)
    }

    /// Write one cell, growing the column set if needed. A stale row index
    /// is a no-op and must not mutate the schema either.
    pub fn set(&mut self, row: usize, col: &str, value: String) {
        if row >= self.rows.len() {
            return;
        }
        self.ensure_column(col);
        self.rows[row].insert(col.to_string(), value);
    }

    /// Index of the row whose id cell parses to `id`, if any.
    pub fn row_by_id(&self, id: i64) -> Option<usize> {
        self.rows
            .iter()
            .position(|r| r.get(COL_ID).and_then(|v| v.parse::<i64>().ok()) == Some(id))
    }

    /// Indices of all rows carrying this logical name.
    pub fn rows_by_name(&self, name: &str) -> Vec<usize> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, r)| r.get(COL_NAME).map(String::as_str) == Some(name))
            .map(|(i, _)| i)
            .collect()
    }

    /// Remove the row matching this id. Returns whether a row was removed.
    pub fn remove_by_id(&mut self, id: i64) -> bool {
        match self.row_by_id(id) {
            Some(i) => {
                self.rows.remove(i);
                true
            }
            None => false,
        }
    }

    /// Remove one row by index.
    pub fn remove_row(&mut self, row: usize) {
        if row < self.rows.len() {
            self.rows.remove(row);
        }
    }

    pub fn snapshot(&self) -> TableSnapshot {
        TableSnapshot {
            columns: self.columns.clone(),
            rows: self
                .rows
                .iter()
                .map(|r| {
                    self.columns
                        .iter()
                        .map(|c| r.get(c).cloned().unwrap_or_default())
                        .collect()
                })
                .collect(),
        }
    }
}
