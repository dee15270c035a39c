//! Synthetic code allocation and localization de-duplication
//!
//! Both are plain values owned by the reader loop that uses them, so two
//! parses never share counters.

use std::collections::{HashMap, HashSet};

use crate::core::record::LocalizationMessage;

/// Allocates `PREFIX_n` codes in order of first appearance of a name
///
/// Names are grouped by exact string: "Roads" and "roads" get different codes.
#[derive(Debug, Clone)]
pub struct CodeAllocator {
    prefix: String,
    width: usize,
    assigned: HashMap<String, String>,
    issued: usize,
}

impl CodeAllocator {
    pub fn new(prefix: &str) -> Self {
        Self::with_width(prefix, 0)
    }

    /// Zero-pad ordinals to `width` digits (`ADMIN2_001`)
    pub fn with_width(prefix: &str, width: usize) -> Self {
        Self {
            prefix: prefix.to_string(),
            width,
            assigned: HashMap::new(),
            issued: 0,
        }
    }

    /// Code for `name`, and whether it was allocated by this call
    pub fn code_for(&mut self, name: &str) -> (String, bool) {
        if let Some(code) = self.assigned.get(name) {
            return (code.clone(), false);
        }
        let code = self.next();
        self.assigned.insert(name.to_string(), code.clone());
        (code, true)
    }

    /// A fresh code not bound to any name
    pub fn next(&mut self) -> String {
        self.issued += 1;
        format!("{}_{:0width$}", self.prefix, self.issued, width = self.width)
    }

    /// Previously assigned code for a name
    pub fn get(&self, name: &str) -> Option<&str> {
        self.assigned.get(name).map(String::as_str)
    }

    /// Name → code pairs handed out so far
    pub fn assignments(&self) -> &HashMap<String, String> {
        &self.assigned
    }
}

/// Ordered localization messages with at most one message per code
#[derive(Debug, Clone, Default)]
pub struct LocalizationSet {
    messages: Vec<LocalizationMessage>,
    seen: HashSet<String>,
}

impl LocalizationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a message; returns false when the code was already present
    pub fn push(&mut self, message: LocalizationMessage) -> bool {
        if !self.seen.insert(message.code.clone()) {
            return false;
        }
        self.messages.push(message);
        true
    }

    pub fn contains(&self, code: &str) -> bool {
        self.seen.contains(code)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn into_vec(self) -> Vec<LocalizationMessage> {
        self.messages
    }
}

/// Uppercase a code and normalize separators (`.`, `-`, space) to `_`
pub fn localization_key(code: &str) -> String {
    code.trim()
        .chars()
        .map(|c| match c {
            '.' | '-' | ' ' => '_',
            other => other.to_ascii_uppercase(),
        })
        .collect()
}

/// `"street light  not working"` → `"StreetLightNotWorking"`
pub fn camel_code(name: &str) -> String {
    name.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(|c| c.to_lowercase()))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}
