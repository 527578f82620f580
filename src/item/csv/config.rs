use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CsvError;

/// Rule deciding which output fields get wrapped in quote characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QuotePolicy {
    /// Quote every non-null field.
    #[default]
    All,
    /// Quote a field only when its content would otherwise be ambiguous.
    Minimal,
}

/// Settings shared by the tokenizer and the writer.
///
/// A configuration is built once, validated, and then copied into every reader
/// or writer created from it, so later mutations never affect a running session.
///
/// # Examples
///
/// ```
/// use csv_batch_rs::item::csv::config::{CsvConfig, QuotePolicy};
///
/// let config = CsvConfig::new()
///     .separator('\t')
///     .quote_policy(QuotePolicy::Minimal)
///     .null_string("NULL")
///     .skip_lines(1);
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvConfig {
    pub separator: char,
    /// `None` disables quoting.
    pub quote: Option<char>,
    /// `None` disables escaping.
    pub escape: Option<char>,
    pub quote_policy: QuotePolicy,
    pub null_string: Option<String>,
    pub ignore_case_null_string: bool,
    pub ignore_leading_whitespaces: bool,
    pub ignore_trailing_whitespaces: bool,
    pub ignore_empty_lines: bool,
    /// Regular expressions matched against whole physical lines.
    pub ignore_line_patterns: Vec<String>,
    pub skip_lines: usize,
    pub line_separator: String,
    /// Replacement for line breaks embedded in quoted values on read.
    pub break_string: Option<String>,
    pub utf8_bom: bool,
    pub variable_columns: bool,
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self {
            separator: ',',
            quote: Some('"'),
            escape: Some('\\'),
            quote_policy: QuotePolicy::All,
            null_string: None,
            ignore_case_null_string: false,
            ignore_leading_whitespaces: false,
            ignore_trailing_whitespaces: false,
            ignore_empty_lines: false,
            ignore_line_patterns: Vec::new(),
            skip_lines: 0,
            line_separator: "\r\n".to_string(),
            break_string: None,
            utf8_bom: false,
            variable_columns: true,
        }
    }
}

impl CsvConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn separator(mut self, separator: char) -> Self {
        self.separator = separator;
        self
    }

    pub fn quote(mut self, quote: char) -> Self {
        self.quote = Some(quote);
        self
    }

    pub fn no_quote(mut self) -> Self {
        self.quote = None;
        self
    }

    pub fn escape(mut self, escape: char) -> Self {
        self.escape = Some(escape);
        self
    }

    pub fn no_escape(mut self) -> Self {
        self.escape = None;
        self
    }

    pub fn quote_policy(mut self, policy: QuotePolicy) -> Self {
        self.quote_policy = policy;
        self
    }

    pub fn null_string(mut self, null_string: impl Into<String>) -> Self {
        self.null_string = Some(null_string.into());
        self
    }

    pub fn ignore_case_null_string(mut self, yes: bool) -> Self {
        self.ignore_case_null_string = yes;
        self
    }

    pub fn ignore_leading_whitespaces(mut self, yes: bool) -> Self {
        self.ignore_leading_whitespaces = yes;
        self
    }

    pub fn ignore_trailing_whitespaces(mut self, yes: bool) -> Self {
        self.ignore_trailing_whitespaces = yes;
        self
    }

    pub fn ignore_empty_lines(mut self, yes: bool) -> Self {
        self.ignore_empty_lines = yes;
        self
    }

    /// Adds a pattern; any physical line fully matching it is skipped on read.
    pub fn ignore_line_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.ignore_line_patterns.push(pattern.into());
        self
    }

    pub fn skip_lines(mut self, lines: usize) -> Self {
        self.skip_lines = lines;
        self
    }

    pub fn line_separator(mut self, separator: impl Into<String>) -> Self {
        self.line_separator = separator.into();
        self
    }

    pub fn break_string(mut self, replacement: impl Into<String>) -> Self {
        self.break_string = Some(replacement.into());
        self
    }

    pub fn utf8_bom(mut self, yes: bool) -> Self {
        self.utf8_bom = yes;
        self
    }

    pub fn variable_columns(mut self, yes: bool) -> Self {
        self.variable_columns = yes;
        self
    }

    /// Checks the character combination and the ignore-line patterns.
    ///
    /// Separator, quote and escape characters must be pairwise distinct and none
    /// of them may be a carriage return or a line feed.
    pub fn validate(&self) -> Result<(), CsvError> {
        let mut chars = vec![("separator", self.separator)];
        if let Some(quote) = self.quote {
            chars.push(("quote", quote));
        }
        if let Some(escape) = self.escape {
            chars.push(("escape", escape));
        }

        for (i, (name, c)) in chars.iter().enumerate() {
            if *c == '\r' || *c == '\n' {
                return Err(CsvError::Config(format!(
                    "{} character must not be a line break",
                    name
                )));
            }
            if let Some((other, _)) = chars[i + 1..].iter().find(|(_, o)| o == c) {
                return Err(CsvError::Config(format!(
                    "{} and {} characters must differ (both {:?})",
                    name, other, c
                )));
            }
        }

        if self.line_separator.is_empty() {
            return Err(CsvError::Config(
                "line separator must not be empty".to_string(),
            ));
        }

        self.compile_ignore_patterns()?;
        Ok(())
    }

    /// Compiles the ignore-line patterns, anchored so they match whole lines.
    pub(crate) fn compile_ignore_patterns(&self) -> Result<Vec<Regex>, CsvError> {
        self.ignore_line_patterns
            .iter()
            .map(|pattern| {
                Regex::new(&format!("^(?:{})$", pattern)).map_err(|error| {
                    CsvError::Config(format!("invalid ignore pattern {:?}: {}", pattern, error))
                })
            })
            .collect()
    }

    /// Whether `value` spells the null sentinel. An unset sentinel matches the empty string.
    pub(crate) fn is_null_string(&self, value: &str) -> bool {
        match &self.null_string {
            Some(null) if self.ignore_case_null_string => {
                null.to_lowercase() == value.to_lowercase()
            }
            Some(null) => null == value,
            None => value.is_empty(),
        }
    }

    #[cfg(feature = "json")]
    /// Parses a JSON document into a validated configuration.
    pub fn from_json(json: &str) -> Result<Self, CsvError> {
        let config: CsvConfig = serde_json::from_str(json)
            .map_err(|error| CsvError::Config(error.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    #[cfg(feature = "json")]
    pub fn to_json(&self) -> Result<String, CsvError> {
        serde_json::to_string_pretty(self).map_err(|error| CsvError::Config(error.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_should_be_valid() {
        let config = CsvConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.separator, ',');
        assert_eq!(config.quote, Some('"'));
        assert_eq!(config.escape, Some('\\'));
        assert_eq!(config.line_separator, "\r\n");
    }

    #[test]
    fn separator_equal_to_quote_should_fail() {
        let config = CsvConfig::new().separator('"');

        let error = config.validate().unwrap_err();
        assert!(matches!(error, CsvError::Config(_)));
    }

    #[test]
    fn quote_equal_to_escape_should_fail() {
        let config = CsvConfig::new().escape('"');

        assert!(matches!(config.validate(), Err(CsvError::Config(_))));
    }

    #[test]
    fn disabled_characters_should_not_collide() {
        let config = CsvConfig::new().separator('"').no_quote().no_escape();

        assert!(config.validate().is_ok());
    }

    #[test]
    fn line_break_characters_should_fail() {
        assert!(CsvConfig::new().separator('\n').validate().is_err());
        assert!(CsvConfig::new().quote('\r').validate().is_err());
        assert!(CsvConfig::new().escape('\n').validate().is_err());
    }

    #[test]
    fn invalid_ignore_pattern_should_fail() {
        let config = CsvConfig::new().ignore_line_pattern("(unclosed");

        assert!(matches!(config.validate(), Err(CsvError::Config(_))));
    }

    #[test]
    fn ignore_patterns_should_match_whole_lines() {
        let config = CsvConfig::new().ignore_line_pattern("#.*");
        let patterns = config.compile_ignore_patterns().unwrap();

        assert!(patterns[0].is_match("# comment"));
        assert!(!patterns[0].is_match("a,# not a comment"));
    }

    #[test]
    fn null_string_should_respect_case_rule() {
        let sensitive = CsvConfig::new().null_string("NULL");
        assert!(sensitive.is_null_string("NULL"));
        assert!(!sensitive.is_null_string("null"));

        let insensitive = CsvConfig::new()
            .null_string("NULL")
            .ignore_case_null_string(true);
        assert!(insensitive.is_null_string("null"));

        let unset = CsvConfig::new();
        assert!(unset.is_null_string(""));
        assert!(!unset.is_null_string("NULL"));
    }

    #[cfg(feature = "json")]
    #[test]
    fn config_should_load_from_json() {
        let config = CsvConfig::from_json(
            r#"{"separator": ";", "quote_policy": "Minimal", "null_string": "NULL"}"#,
        )
        .unwrap();

        assert_eq!(config.separator, ';');
        assert_eq!(config.quote_policy, QuotePolicy::Minimal);
        assert_eq!(config.null_string.as_deref(), Some("NULL"));
        assert_eq!(config.quote, Some('"'));

        let json = config.to_json().unwrap();
        assert_eq!(CsvConfig::from_json(&json).unwrap(), config);
    }

    #[cfg(feature = "json")]
    #[test]
    fn invalid_json_config_should_fail_validation() {
        let result = CsvConfig::from_json(r#"{"separator": "\\"}"#);

        assert!(matches!(result, Err(CsvError::Config(_))));
    }
}
