//! Noise suppression rules for tunnel output.
//!
//! A line is noise when any rule's pattern matches it, case-insensitively,
//! anywhere in the line. Rules are checked in order and the first match wins.

use regex::{Regex, RegexBuilder};

/// Error type for filter construction.
#[derive(thiserror::Error, Debug)]
pub enum FilterError {
    /// Invalid regex pattern.
    #[error("Invalid filter pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },
}

/// A single case-insensitive suppression pattern.
#[derive(Debug, Clone)]
pub struct FilterRule {
    pattern: Regex,
    description: String,
}

impl FilterRule {
    /// Create a new rule.
    ///
    /// # Errors
    ///
    /// Returns `FilterError::InvalidPattern` if the regex is invalid.
    pub fn new(pattern: &str, description: impl Into<String>) -> Result<Self, FilterError> {
        let compiled = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|source| FilterError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })?;
        Ok(Self {
            pattern: compiled,
            description: description.into(),
        })
    }

    /// Check if the line matches this rule.
    #[must_use]
    pub fn matches(&self, line: &str) -> bool {
        self.pattern.is_match(line)
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Get the pattern string (for debugging/display).
    #[must_use]
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }
}

/// Ordered, immutable set of suppression rules.
///
/// Shared read-only between the output reader and the log tailer so both
/// sources obey the same policy.
#[derive(Debug, Clone, Default)]
pub struct OutputFilter {
    rules: Vec<FilterRule>,
}

impl OutputFilter {
    /// A filter that suppresses nothing.
    #[must_use]
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Create a filter with the built-in tunnel noise rules.
    #[must_use]
    pub fn with_default_rules() -> Self {
        let rules = Self::default_rules()
            .into_iter()
            .filter_map(|result| match result {
                Ok(rule) => Some(rule),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to compile default filter rule");
                    None
                }
            })
            .collect();
        Self { rules }
    }

    /// Build a filter from an optional default set plus extra patterns.
    ///
    /// # Errors
    ///
    /// Returns `FilterError::InvalidPattern` for the first extra pattern
    /// that does not compile.
    pub fn from_patterns<S: AsRef<str>>(
        include_defaults: bool,
        patterns: &[S],
    ) -> Result<Self, FilterError> {
        let mut filter = if include_defaults {
            Self::with_default_rules()
        } else {
            Self::new()
        };
        for pattern in patterns {
            let pattern = pattern.as_ref();
            filter.rules.push(FilterRule::new(pattern, "configured")?);
        }
        Ok(filter)
    }

    /// Whether the line is noise that must not be forwarded.
    #[must_use]
    pub fn is_noise(&self, line: &str) -> bool {
        self.check(line).is_some()
    }

    /// Returns the first rule matching the line, if any.
    #[must_use]
    pub fn check(&self, line: &str) -> Option<&FilterRule> {
        self.rules.iter().find(|rule| rule.matches(line))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn rules(&self) -> &[FilterRule] {
        &self.rules
    }

    fn default_rules() -> Vec<Result<FilterRule, FilterError>> {
        vec![
            FilterRule::new(r"\[I\].*io timeout", "Info-level io timeout"),
            FilterRule::new(
                r"\[I\].*0x[0-9a-fA-F]+.*io timeout",
                "Info-level io timeout with connection address",
            ),
            FilterRule::new(r"io timeout", "Any io timeout"),
            FilterRule::new(
                r"\[I\].*socks5 client udp construct",
                "SOCKS5 UDP association chatter",
            ),
            FilterRule::new(
                r"\[E\].*socks5 client res\.rep 5",
                "SOCKS5 connection refused replies",
            ),
            FilterRule::new(
                r"\[E\].*socks5 session handshake",
                "SOCKS5 handshake failures",
            ),
        ]
    }
}
