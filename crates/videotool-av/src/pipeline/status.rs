//! Turning output lines into status records.

use std::collections::BTreeMap;

use regex::Regex;

use crate::{Error, Result};

/// Named fields captured from one status line.
pub type StatusFields = BTreeMap<String, String>;

/// A labelled pattern. Its named capture groups become the record's fields.
#[derive(Debug, Clone)]
pub struct StatusPattern {
    label: String,
    regex: Regex,
}

impl StatusPattern {
    /// Compile `pattern` under `label`.
    pub fn new(label: impl Into<String>, pattern: &str) -> Result<Self> {
        let label = label.into();
        let regex = Regex::new(pattern).map_err(|e| Error::invalid_pattern(&label, e.to_string()))?;
        Ok(Self { label, regex })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    /// Search `line`; on a match return the named groups that took part.
    pub fn parse(&self, line: &str) -> Option<StatusFields> {
        let caps = self.regex.captures(line)?;
        Some(
            self.regex
                .capture_names()
                .flatten()
                .filter_map(|name| {
                    caps.name(name)
                        .map(|m| (name.to_string(), m.as_str().to_string()))
                })
                .collect(),
        )
    }
}

/// Every `(label, fields)` record in `line`, in pattern order.
pub fn parse_line<'a>(
    patterns: &'a [StatusPattern],
    line: &'a str,
) -> impl Iterator<Item = (&'a str, StatusFields)> + 'a {
    patterns
        .iter()
        .filter_map(move |p| p.parse(line).map(|fields| (p.label(), fields)))
}
