//! Localization sheet

use crate::core::codes::LocalizationSet;
use crate::core::record::LocalizationMessage;
use crate::core::workbook::{Sheet, WorkbookError};
use crate::reader::{COMMON_MODULE, PGR_MODULE};

pub const LOCALIZATION_SHEETS: [&str; 2] = ["Localization", "localization"];

/// Module a message belongs to, judged from its code
pub fn infer_module(code: &str) -> &'static str {
    if code.starts_with("SERVICEDFS.") {
        PGR_MODULE
    } else {
        COMMON_MODULE
    }
}

/// Read `Code` / `Message` rows; `Module` and `Locale` columns are optional
///
/// Later rows repeating a code are dropped.
pub fn read_localizations(
    sheet: &Sheet,
    default_locale: &str,
) -> Result<(Vec<LocalizationMessage>, usize), WorkbookError> {
    sheet.require_columns(&["Code", "Message"])?;

    let mut messages = LocalizationSet::new();
    let mut skipped = 0;
    for row in sheet.rows() {
        let (Some(code), Some(message)) = (row.text("Code"), row.text("Message")) else {
            skipped += 1;
            continue;
        };
        let module = row
            .text("Module")
            .unwrap_or_else(|| infer_module(&code).to_string());
        let locale = row
            .text("Locale")
            .unwrap_or_else(|| default_locale.to_string());
        if !messages.push(LocalizationMessage::new(&code, &message, &module, &locale)) {
            tracing::debug!(code = %code, "duplicate localization code ignored");
            skipped += 1;
        }
    }
    Ok((messages.into_vec(), skipped))
}
