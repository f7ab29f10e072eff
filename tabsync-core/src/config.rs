//! Sync configuration: sheet schemas, destinations and group routing.
//!
//! The same structure is accepted as JSON (the format stored in cell A1 of
//! the `SYNC_CONFIG` sheet) or as TOML on disk. Keys are camelCase.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use chrono::Weekday;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{SyncError, SyncResult};
use crate::store::{Sheet, Workbook};

/// Name of the sheet whose A1 cell holds the JSON sync configuration.
pub const CONFIG_SHEET_NAME: &str = "SYNC_CONFIG";

const DEFAULT_SHEET_NAME_FORMAT: &str = "%-m/%-d %a";

/// Column offsets (x) and row bounds (y) of a day sheet. All zero-based.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaySheetSchema {
    pub x_start_time: usize,
    pub x_end_time: usize,
    /// Optional end date for events spanning several days.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_end_date: Option<usize>,
    pub x_event_group: usize,
    pub x_event_name: usize,
    pub x_location: usize,
    pub x_should_sync: usize,
    pub x_calendar_sync_data: usize,
    pub y_start: usize,
    /// Last data row; defaults to the sheet's last row.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_end: Option<usize>,
}

/// Column offsets and row bounds of the overview sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverviewSheetSchema {
    pub x_start_date: usize,
    pub x_start_time: usize,
    pub x_end_time: usize,
    pub x_event_group: usize,
    pub x_event_name: usize,
    pub x_location: usize,
    pub y_start: usize,
    /// Last body row; defaults to the sheet's last row.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_end: Option<usize>,
}

/// Ordered label -> column mapping. Document order is kept, since it decides
/// the order of blocks in rendered descriptions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeColumns(Vec<(String, usize)>);

impl AttributeColumns {
    pub fn new(entries: Vec<(String, usize)>) -> Self {
        AttributeColumns(entries)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.0.iter().map(|(label, x)| (label.as_str(), *x))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for AttributeColumns {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (label, x) in &self.0 {
            map.serialize_entry(label, x)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for AttributeColumns {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ColumnsVisitor;

        impl<'de> Visitor<'de> for ColumnsVisitor {
            type Value = AttributeColumns;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of attribute label to column offset")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::new();
                while let Some((label, x)) = access.next_entry::<String, usize>()? {
                    entries.push((label, x));
                }
                Ok(AttributeColumns(entries))
            }
        }

        deserializer.deserialize_map(ColumnsVisitor)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverviewConfig {
    pub sheet_name: String,
    pub schema: OverviewSheetSchema,
    /// Attribute label -> overview column.
    #[serde(rename = "fieldsOfInterest", default)]
    pub attributes: AttributeColumns,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaySheetConfig {
    pub schema: DaySheetSchema,
    /// Attribute label -> day sheet column.
    #[serde(rename = "fieldsOfInterest", default)]
    pub attributes: AttributeColumns,
    /// Every destination calendar name the day sheets may sync to.
    #[serde(rename = "calendars")]
    pub destinations: Vec<String>,
    /// Group tag -> destination calendar names.
    #[serde(rename = "eventGroupToCalendarNames")]
    pub groups: BTreeMap<String, Vec<String>>,
}

impl DaySheetConfig {
    /// Destinations configured for `group`, or `None` if the group is unknown.
    pub fn destinations_for(&self, group: &str) -> Option<&[String]> {
        self.groups.get(group).map(Vec::as_slice)
    }
}

fn default_week_start() -> Weekday {
    Weekday::Sun
}

fn default_sheet_name_format() -> String {
    DEFAULT_SHEET_NAME_FORMAT.to_string()
}

/// How the rolling window is laid out over day sheets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowConfig {
    #[serde(default = "default_week_start")]
    pub week_start: Weekday,
    /// `chrono` format string turning a day into its sheet name.
    #[serde(default = "default_sheet_name_format")]
    pub sheet_name_format: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        WindowConfig {
            week_start: default_week_start(),
            sheet_name_format: default_sheet_name_format(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    pub overview: OverviewConfig,
    pub day_sheet: DaySheetConfig,
    #[serde(default)]
    pub window: WindowConfig,
}

impl SyncConfig {
    pub fn from_json(content: &str) -> SyncResult<Self> {
        let config: SyncConfig =
            serde_json::from_str(content).map_err(|e| SyncError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> SyncResult<Self> {
        let config: SyncConfig =
            toml::from_str(content).map_err(|e| SyncError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.toml` or `.json` file, chosen by extension.
    pub fn load(path: &Path) -> SyncResult<Self> {
        let content = std::fs::read_to_string(path)?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&content),
            _ => Self::from_toml(&content),
        }
    }

    /// Read the JSON configuration held in A1 of the `SYNC_CONFIG` sheet.
    pub fn from_workbook<W: Workbook>(workbook: &mut W) -> SyncResult<Self> {
        tracing::info!("Fetching sync config from sheet {}", CONFIG_SHEET_NAME);

        let sheet = workbook
            .sheet_mut(CONFIG_SHEET_NAME)
            .ok_or_else(|| SyncError::Lookup(format!("Could not find sheet {CONFIG_SHEET_NAME}")))?;

        let rows = sheet.values(0, 0)?;
        let content = rows
            .first()
            .and_then(|row| row.first())
            .and_then(|cell| cell.as_text())
            .ok_or_else(|| {
                SyncError::Config(format!("Sheet {CONFIG_SHEET_NAME} has no configuration in A1"))
            })?;

        Self::from_json(&content)
    }

    /// Reject group routes that point at calendars not listed as destinations.
    pub fn validate(&self) -> SyncResult<()> {
        let day_sheet = &self.day_sheet;

        for (group, names) in &day_sheet.groups {
            if let Some(unknown) = names.iter().find(|n| !day_sheet.destinations.contains(*n)) {
                return Err(SyncError::Config(format!(
                    "Group '{}' routes to calendar '{}' which is not listed in calendars",
                    group, unknown
                )));
            }
        }

        if self.window.sheet_name_format.is_empty() {
            return Err(SyncError::Config("sheetNameFormat must not be empty".into()));
        }

        Ok(())
    }
}
