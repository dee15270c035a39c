//! Core module - fundamental types and utilities

pub mod cell;
pub mod codes;
pub mod config;
pub mod record;
pub mod workbook;

pub use cell::Cell;
pub use codes::{CodeAllocator, LocalizationSet};
pub use config::Config;
pub use record::{LocalizationMessage, MasterRecord, RecordKind};
pub use workbook::{Row, Sheet, Workbook, WorkbookError};
