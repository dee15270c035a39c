//! Normalized spreadsheet cell values
//!
//! Every value read from a workbook passes through [`Cell`] before any
//! business logic looks at it. Missing cells, empty strings, whitespace-only
//! strings and the literal `nan` token all collapse to [`Cell::Absent`].

use chrono::NaiveDateTime;
use serde_json::Value;
use std::fmt;

/// Token spreadsheet tooling writes for an empty numeric cell
const NAN_TOKEN: &str = "nan";

/// A single normalized cell
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Absent,
    Text(String),
    Number(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
}

impl Cell {
    /// Build a cell from raw text, collapsing blank markers to `Absent`
    pub fn from_text(raw: &str) -> Self {
        if is_blank(raw) {
            Cell::Absent
        } else {
            Cell::Text(raw.to_string())
        }
    }

    /// Build a cell from a float, treating NaN as absent
    pub fn from_number(n: f64) -> Self {
        if n.is_nan() {
            Cell::Absent
        } else {
            Cell::Number(n)
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Cell::Absent)
    }

    /// Stringified, trimmed value; `None` when absent
    ///
    /// Whole numbers render without a fractional part so codes and phone
    /// numbers typed as numbers read back the way they were entered.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::Absent => None,
            Cell::Text(s) => Some(s.trim().to_string()),
            Cell::Number(n) => Some(format_number(*n)),
            Cell::Bool(b) => Some(if *b { "TRUE" } else { "FALSE" }.to_string()),
            Cell::DateTime(dt) => Some(format_datetime(dt)),
        }
    }

    /// Numeric value, parsing text when needed
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            Cell::Text(s) => s.trim().parse::<f64>().ok().filter(|n| !n.is_nan()),
            Cell::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Integer value, truncating floats (`"24.0"` reads as 24)
    pub fn as_i64(&self) -> Option<i64> {
        self.as_f64().map(|n| n.trunc() as i64)
    }

    /// Boolean flag: only `TRUE` (any case) or a boolean `true` cell counts
    pub fn is_true(&self) -> bool {
        match self {
            Cell::Bool(b) => *b,
            other => other
                .as_text()
                .map(|s| s.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }

    /// Milliseconds since the Unix epoch for date-like cells
    ///
    /// Date cells convert directly, numbers are taken as already being epoch
    /// millis, text is parsed as `YYYY-MM-DD` or `DD/MM/YYYY`.
    pub fn as_epoch_millis(&self) -> Option<i64> {
        match self {
            Cell::DateTime(dt) => Some(dt.and_utc().timestamp_millis()),
            Cell::Number(n) => Some(n.trunc() as i64),
            Cell::Text(s) => parse_date_text(s.trim()).map(|dt| dt.and_utc().timestamp_millis()),
            _ => None,
        }
    }

    /// JSON representation used when a cell is copied verbatim into a payload
    pub fn to_json(&self) -> Value {
        match self {
            Cell::Absent => Value::Null,
            Cell::Text(s) => Value::String(s.trim().to_string()),
            Cell::Number(n) => {
                if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
                    Value::from(*n as i64)
                } else {
                    serde_json::Number::from_f64(*n)
                        .map(Value::Number)
                        .unwrap_or(Value::Null)
                }
            }
            Cell::Bool(b) => Value::Bool(*b),
            Cell::DateTime(dt) => Value::String(format_datetime(dt)),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_text() {
            Some(s) => write!(f, "{}", s),
            None => Ok(()),
        }
    }
}

/// True for empty, whitespace-only, or the `nan` token
pub fn is_blank(raw: &str) -> bool {
    let trimmed = raw.trim();
    trimmed.is_empty() || trimmed == NAN_TOKEN
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

fn format_datetime(dt: &NaiveDateTime) -> String {
    if dt.time() == chrono::NaiveTime::MIN {
        dt.format("%Y-%m-%d").to_string()
    } else {
        dt.format("%Y-%m-%dT%H:%M:%S").to_string()
    }
}

fn parse_date_text(s: &str) -> Option<NaiveDateTime> {
    for fmt in ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y"] {
        if let Ok(date) = chrono::NaiveDate::parse_from_str(s, fmt) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").ok()
}
