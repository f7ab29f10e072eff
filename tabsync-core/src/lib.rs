//! Core engine for tabsync.
//!
//! Reads per-day sheets of a workbook, reconciles their rows with external
//! calendars and materializes a rolling two-week overview sheet. The engine
//! only talks to the capability traits in [`store`]:
//! - `memory` provides in-memory implementations
//! - `ics` provides a calendar backed by a directory of `.ics` files

pub mod cell;
pub mod config;
pub mod dates;
pub mod day_sync;
pub mod error;
pub mod ics;
pub mod lock;
pub mod memory;
pub mod overview;
pub mod parser;
pub mod reconcile;
pub mod record;
pub mod store;
pub mod target;
pub mod window;

pub use cell::CellValue;
pub use config::SyncConfig;
pub use day_sync::{DaySync, SyncedRecord};
pub use error::{SyncError, SyncResult};
pub use record::{RowIdentity, SourceRecord, SyncState};
pub use window::WindowOrchestrator;
