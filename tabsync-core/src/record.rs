//! Source records parsed from day sheet rows, and their persisted sync state.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::cell::CellValue;
use crate::error::{SyncError, SyncResult};

/// Where a record lives: the sheet and its absolute zero-based row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowIdentity {
    pub sheet_id: u64,
    pub row: usize,
    /// Zero-based offset from the first row of the day's range.
    pub offset: usize,
}

impl RowIdentity {
    /// Fragment selecting the whole row, e.g. `#gid=12&range=5:5`.
    pub fn relative_link(&self) -> String {
        let row = self.row + 1;
        format!("#gid={}&range={}:{}", self.sheet_id, row, row)
    }

    /// The row fragment prefixed with the workbook URL when one is known.
    pub fn link(&self, base_url: Option<&str>) -> String {
        format!("{}{}", base_url.unwrap_or_default(), self.relative_link())
    }
}

/// Destination calendar name -> external event id.
///
/// Persisted as a JSON object in the row's state cell. It is the only state
/// that survives between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncState(BTreeMap<String, String>);

impl SyncState {
    pub fn new() -> Self {
        SyncState::default()
    }

    pub fn get(&self, destination: &str) -> Option<&str> {
        self.0.get(destination).map(String::as_str)
    }

    pub fn insert(&mut self, destination: impl Into<String>, event_id: impl Into<String>) {
        self.0.insert(destination.into(), event_id.into());
    }

    /// Fold `other` over `self`. Entries only present in `self` are kept.
    pub fn merge(mut self, other: SyncState) -> SyncState {
        self.0.extend(other.0);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn encode(&self) -> String {
        // A map of strings always serializes
        serde_json::to_string(&self.0).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn decode(content: &str) -> SyncResult<Self> {
        serde_json::from_str(content)
            .map_err(|e| SyncError::Serialization(format!("Invalid sync state '{}': {}", content, e)))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SyncState {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        SyncState(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// One day sheet row's intent, rebuilt on every parse.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    pub day: NaiveDate,
    /// Last day of a multi-day record; `None` means the record ends on `day`.
    pub end_day: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub group: String,
    pub name: String,
    pub location: Option<String>,
    /// Populated attributes, in configured order.
    pub attributes: Vec<(String, CellValue)>,
    pub identity: RowIdentity,
    pub sync_state: Option<SyncState>,
}

impl SourceRecord {
    pub fn last_day(&self) -> NaiveDate {
        self.end_day.unwrap_or(self.day)
    }

    pub fn attribute(&self, label: &str) -> Option<&CellValue> {
        self.attributes
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, v)| v)
    }
}
