//! Error types for the tabsync engine.

use thiserror::Error;

/// Errors that can occur while syncing sheets and calendars.
///
/// Every variant is fatal for the operation that raised it. Rows that are
/// merely skipped are logged instead and never surface here.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("[sheet={sheet}, row={row}] {message}")]
    InvalidRow {
        sheet: String,
        /// 1-based row number, as shown to the person editing the sheet.
        row: usize,
        message: String,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Lookup error: {0}")]
    Lookup(String),

    #[error("Could not perform requested operation: another sync operation already in progress")]
    SyncInProgress,

    #[error("Consistency error: {0}")]
    Consistency(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl SyncError {
    pub(crate) fn invalid_row(sheet: &str, y: usize, message: impl Into<String>) -> Self {
        SyncError::InvalidRow {
            sheet: sheet.to_string(),
            row: y + 1,
            message: message.into(),
        }
    }
}

/// Result type alias for tabsync operations.
pub type SyncResult<T> = Result<T, SyncError>;
