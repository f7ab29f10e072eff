//! Cell values read from and written to sheets.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// The contents of a single sheet cell.
///
/// Hosts hand back loosely typed values; this is the closed set the engine
/// understands. `Empty` stands for a blank cell.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellValue {
    #[default]
    Empty,
    Number(f64),
    Boolean(bool),
    Timestamp(NaiveDateTime),
    Text(String),
}

impl CellValue {
    pub fn text(value: impl Into<String>) -> Self {
        CellValue::Text(value.into())
    }

    /// Whether the host would treat this value as "set".
    pub fn is_truthy(&self) -> bool {
        match self {
            CellValue::Empty => false,
            CellValue::Number(n) => *n != 0.0 && !n.is_nan(),
            CellValue::Boolean(b) => *b,
            CellValue::Timestamp(_) => true,
            CellValue::Text(s) => !s.is_empty(),
        }
    }

    /// A cell with nothing in it. `false` and `0` are values, not blanks.
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// A checkbox cell is checked only when it holds `true`.
    pub fn is_checked(&self) -> bool {
        matches!(self, CellValue::Boolean(true))
    }

    /// The value rendered as text, or `None` when the cell is falsy.
    pub fn as_text(&self) -> Option<String> {
        self.is_truthy().then(|| self.to_string())
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            CellValue::Number(n) => write!(f, "{n}"),
            CellValue::Boolean(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            CellValue::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S")),
            CellValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Boolean(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<NaiveDateTime> for CellValue {
    fn from(value: NaiveDateTime) -> Self {
        CellValue::Timestamp(value)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_truthiness_follows_host_rules() {
        assert!(!CellValue::Empty.is_truthy());
        assert!(!CellValue::text("").is_truthy());
        assert!(!CellValue::Number(0.0).is_truthy());
        assert!(!CellValue::Boolean(false).is_truthy());
        assert!(CellValue::text("x").is_truthy());
        assert!(CellValue::Number(2.5).is_truthy());
    }

    #[test]
    fn test_false_and_zero_are_not_blank() {
        assert!(CellValue::Empty.is_blank());
        assert!(CellValue::text("").is_blank());
        assert!(!CellValue::Boolean(false).is_blank());
        assert!(!CellValue::Number(0.0).is_blank());
    }

    #[test]
    fn test_only_true_is_checked() {
        assert!(CellValue::Boolean(true).is_checked());
        assert!(!CellValue::text("TRUE").is_checked());
        assert!(!CellValue::Number(1.0).is_checked());
    }

    #[test]
    fn test_display() {
        assert_eq!(CellValue::Number(3.0).to_string(), "3");
        assert_eq!(CellValue::Number(2.5).to_string(), "2.5");
        let ts = NaiveDate::from_ymd_opt(2025, 3, 9)
            .unwrap()
            .and_hms_opt(9, 15, 0)
            .unwrap();
        assert_eq!(CellValue::Timestamp(ts).to_string(), "2025-03-09 09:15:00");
        assert_eq!(CellValue::Empty.as_text(), None);
    }
}
