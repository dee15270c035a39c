//! Template readers
//!
//! Each reader turns one sheet of a master-data template into normalized
//! [`MasterRecord`]s plus the localization messages derived from the
//! human-readable names it saw. Readers are pure functions over a [`Sheet`];
//! opening the workbook is the caller's job.

pub mod boundary;
pub mod employee;
pub mod localization;
pub mod masters;
pub mod tenant;
pub mod workflow;

use crate::core::record::{LocalizationMessage, MasterRecord};

/// Locale of every derived localization message
pub const DERIVED_LOCALE: &str = "en_IN";

/// Module for tenant and common-master labels
pub const COMMON_MODULE: &str = "rainmaker-common";

/// Module for complaint-type labels
pub const PGR_MODULE: &str = "rainmaker-pgr";

/// Output of reading one sheet
#[derive(Debug, Clone, Default)]
pub struct ParsedSheet {
    pub records: Vec<MasterRecord>,
    pub localizations: Vec<LocalizationMessage>,
    /// Rows dropped because their identifying cells were blank
    pub skipped: usize,
}

impl ParsedSheet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Split a comma-joined cell into trimmed, non-empty parts
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_list() {
        assert_eq!(split_list("GRO, PGR_LME ,,"), vec!["GRO", "PGR_LME"]);
        assert!(split_list(" ").is_empty());
    }
}
