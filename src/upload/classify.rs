//! Response classification
//!
//! The backends report "already exists" only in error text, so duplicates
//! are recognized by case-insensitive phrase matching. The vocabulary lives
//! here, apart from the upload loop.

use std::fmt;

use crate::upload::transport::{HttpResponse, TransportError};

/// Longest error message kept for a failed record
pub const RECORD_MESSAGE_LIMIT: usize = 500;

/// Longest error message kept for a failed localization batch
pub const BATCH_MESSAGE_LIMIT: usize = 400;

/// Phrases that mark a record-level duplicate
pub const RECORD_MARKERS: [&str; 2] = ["already exists", "duplicate"];

/// Extra phrases the localization service uses
pub const LOCALIZATION_MARKERS: [&str; 3] = [
    "duplicate_records",
    "duplicatemessageidentityexception",
    "unique_message_entry",
];

/// What one call achieved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Created,
    AlreadyExists,
    Failed(Failure),
}

impl Outcome {
    /// Created and already-exists both leave the target in the desired state
    pub fn is_ok(&self) -> bool {
        !matches!(self, Outcome::Failed(_))
    }

    pub fn status_label(&self) -> &'static str {
        match self {
            Outcome::Created => "CREATED",
            Outcome::AlreadyExists => "EXISTS",
            Outcome::Failed(_) => "FAILED",
        }
    }
}

/// Why a call failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// HTTP status, absent for transport errors
    pub status_code: Option<u16>,
    pub message: String,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "HTTP {}: {}", code, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Turns a response into an [`Outcome`]
pub trait Classifier {
    fn classify(&self, result: &Result<HttpResponse, TransportError>) -> Outcome;
}

/// Substring matcher over a fixed set of duplicate phrases
#[derive(Debug, Clone)]
pub struct DuplicateVocabulary {
    markers: Vec<String>,
    message_limit: usize,
}

impl DuplicateVocabulary {
    pub fn new<I, S>(markers: I, message_limit: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            markers: markers
                .into_iter()
                .map(|m| m.as_ref().to_lowercase())
                .collect(),
            message_limit,
        }
    }

    /// Vocabulary for per-record endpoints
    pub fn records() -> Self {
        Self::new(RECORD_MARKERS, RECORD_MESSAGE_LIMIT)
    }

    /// Vocabulary for localization batches
    pub fn localization() -> Self {
        Self::new(
            RECORD_MARKERS.iter().chain(LOCALIZATION_MARKERS.iter()),
            BATCH_MESSAGE_LIMIT,
        )
    }

    /// Add configured phrases
    pub fn extend<I, S>(mut self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.markers
            .extend(extra.into_iter().map(|m| m.as_ref().to_lowercase()));
        self
    }

    pub fn is_duplicate(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.markers.iter().any(|m| lower.contains(m.as_str()))
    }
}

impl Classifier for DuplicateVocabulary {
    fn classify(&self, result: &Result<HttpResponse, TransportError>) -> Outcome {
        match result {
            Ok(resp) if resp.is_success() => Outcome::Created,
            Ok(resp) if self.is_duplicate(&resp.body) => Outcome::AlreadyExists,
            Ok(resp) => Outcome::Failed(Failure {
                status_code: Some(resp.status),
                message: truncate_chars(&resp.body, self.message_limit),
            }),
            Err(err) => Outcome::Failed(Failure {
                status_code: None,
                message: truncate_chars(&err.to_string(), self.message_limit),
            }),
        }
    }
}

/// Keep at most `limit` characters
pub fn truncate_chars(s: &str, limit: usize) -> String {
    s.chars().take(limit).collect()
}
