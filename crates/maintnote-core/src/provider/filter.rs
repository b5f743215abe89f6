//! Include / exclude filters on notification content.

use std::collections::BTreeMap;

use regex::Regex;

use crate::data::NotificationData;
use crate::parsers::patterns::strip_line_breaks;

/// Regular expressions per fragment tag.
///
/// A filter matches a notification when any fragment with a listed tag has
/// content (decoded lossily, CR/LF removed) in which any of that tag's
/// expressions is found.
#[derive(Debug, Clone, Default)]
pub struct DataFilter {
    rules: BTreeMap<String, Vec<Regex>>,
}

impl DataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile `patterns` for every tag.
    pub fn from_patterns(patterns: &BTreeMap<String, Vec<String>>) -> Result<Self, regex::Error> {
        let mut filter = Self::new();
        for (data_type, expressions) in patterns {
            let compiled = expressions
                .iter()
                .map(|expression| Regex::new(expression))
                .collect::<Result<Vec<_>, _>>()?;
            filter.rules.insert(data_type.clone(), compiled);
        }
        Ok(filter)
    }

    /// Add one expression for `data_type`.
    pub fn with_pattern(mut self, data_type: &str, expression: &str) -> Result<Self, regex::Error> {
        self.rules
            .entry(data_type.to_string())
            .or_default()
            .push(Regex::new(expression)?);
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Tags this filter looks at.
    pub fn data_types(&self) -> Vec<&str> {
        self.rules.keys().map(String::as_str).collect()
    }

    /// Whether any listed fragment matches. `kind` only labels log lines.
    pub fn matches(&self, data: &NotificationData, kind: &str) -> bool {
        let mut last_content = None;

        for part in data.data_parts() {
            let Some(expressions) = self.rules.get(&part.data_type) else {
                continue;
            };

            let content = strip_line_breaks(&String::from_utf8_lossy(&part.content));
            if expressions.iter().any(|re| re.is_match(&content)) {
                tracing::debug!(filter = kind, data_type = %part.data_type, "Matching filter expression");
                return true;
            }
            last_content = Some(content);
        }

        match last_content {
            Some(content) => {
                tracing::warn!(filter = kind, content = %content, "Not matching any filter expression")
            }
            None => tracing::warn!(
                filter = kind,
                data_types = ?self.data_types(),
                "Not matching any filter expression because the notification lacks the expected data types"
            ),
        }
        false
    }
}
