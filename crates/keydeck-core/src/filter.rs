// ── Key filter ──
//
// The process-wide pattern restricting which keys are visible inside
// loaded databases. Validated once at construction; equality is by
// pattern text, which is what the "filter unchanged" short-circuit in
// DatabaseNode::plan_keys_load compares.

use std::fmt;

use regex::Regex;

use crate::error::CoreError;

/// A validated key-name filter.
#[derive(Debug, Clone)]
pub struct KeyFilter {
    pattern: String,
    regex: Regex,
}

impl KeyFilter {
    /// Compile `pattern`. Empty or malformed patterns are rejected with
    /// [`CoreError::InvalidFilter`].
    pub fn new(pattern: &str) -> Result<Self, CoreError> {
        let trimmed = pattern.trim();
        if trimmed.is_empty() {
            return Err(CoreError::InvalidFilter {
                reason: "pattern is empty".into(),
            });
        }

        let regex = Regex::new(trimmed).map_err(|e| CoreError::InvalidFilter {
            reason: e.to_string(),
        })?;

        Ok(Self {
            pattern: trimmed.to_owned(),
            regex,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn matches(&self, key: &str) -> bool {
        self.regex.is_match(key)
    }
}

impl PartialEq for KeyFilter {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}

impl Eq for KeyFilter {}

impl fmt::Display for KeyFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}
