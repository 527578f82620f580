use std::fmt::{Display, Write};

use chrono::{
    FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc,
    format::{Item, StrftimeItems},
};
use serde::{Deserialize, Serialize};

use crate::error::CsvError;

use super::value::{Value, ValueType};

/// What a [`FormatSpec`] pattern describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormatKind {
    /// Decimal pattern such as `#,##0.00`; `¤` stands for the currency symbol.
    Number,
    /// chrono strftime pattern for a date.
    Date,
    /// chrono strftime pattern for a time of day.
    Time,
    /// chrono strftime pattern for a date and time.
    DateTime,
    /// `true-text/false-text`, for instance `yes/no`.
    Boolean,
}

/// A typed value format attached to a column binding.
///
/// Partial formats bound to the same field (a date column and a time column, say)
/// are combined with [`FormatSpec::merge`].
///
/// # Examples
///
/// ```
/// use csv_batch_rs::mapping::format::{FormatKind, FormatSpec};
///
/// let date = FormatSpec::date("%Y/%m/%d");
/// let time = FormatSpec::time("%H:%M");
///
/// let merged = date.merge(&time).unwrap();
/// assert_eq!(merged.kind, FormatKind::DateTime);
/// assert_eq!(merged.pattern, "%Y/%m/%d %H:%M");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatSpec {
    pub kind: FormatKind,
    pub pattern: String,
    /// Language tag (`de`, `fr_FR`, ...) selecting number separators.
    #[serde(default)]
    pub locale: Option<String>,
    /// Fixed offset (`+09:00`, `UTC`) applied to date-time values.
    #[serde(default)]
    pub timezone: Option<String>,
    /// ISO 4217 code substituted for `¤` in number patterns.
    #[serde(default)]
    pub currency: Option<String>,
}

impl FormatSpec {
    fn with_kind(kind: FormatKind, pattern: impl Into<String>) -> Self {
        Self {
            kind,
            pattern: pattern.into(),
            locale: None,
            timezone: None,
            currency: None,
        }
    }

    pub fn number(pattern: impl Into<String>) -> Self {
        Self::with_kind(FormatKind::Number, pattern)
    }

    pub fn date(pattern: impl Into<String>) -> Self {
        Self::with_kind(FormatKind::Date, pattern)
    }

    pub fn time(pattern: impl Into<String>) -> Self {
        Self::with_kind(FormatKind::Time, pattern)
    }

    pub fn date_time(pattern: impl Into<String>) -> Self {
        Self::with_kind(FormatKind::DateTime, pattern)
    }

    pub fn boolean(true_text: &str, false_text: &str) -> Self {
        Self::with_kind(FormatKind::Boolean, format!("{}/{}", true_text, false_text))
    }

    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    pub fn timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    pub fn currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    /// Combines two partial formats bound to one field into a single format.
    ///
    /// Patterns are joined with a space; a date merged with a time yields a
    /// date-time. Number and boolean formats cannot be merged, and conflicting
    /// locales, timezones or currencies are rejected.
    pub fn merge(&self, other: &FormatSpec) -> Result<FormatSpec, CsvError> {
        use FormatKind::*;

        let kind = match (self.kind, other.kind) {
            (Date, Date) => Date,
            (Time, Time) => Time,
            (Date, Time) | (Time, Date) => DateTime,
            (DateTime, Date | Time | DateTime) | (Date | Time, DateTime) => DateTime,
            (a, b) => {
                return Err(CsvError::Config(format!(
                    "cannot merge {:?} format with {:?} format",
                    a, b
                )));
            }
        };

        Ok(FormatSpec {
            kind,
            pattern: format!("{} {}", self.pattern, other.pattern),
            locale: merge_option("locale", &self.locale, &other.locale)?,
            timezone: merge_option("timezone", &self.timezone, &other.timezone)?,
            currency: merge_option("currency", &self.currency, &other.currency)?,
        })
    }

    /// Checks the pattern and timezone without converting anything.
    pub fn validate(&self) -> Result<(), CsvError> {
        match self.kind {
            FormatKind::Number => {
                NumberPattern::parse(&self.pattern)?;
            }
            FormatKind::Boolean => {
                self.boolean_texts()?;
            }
            FormatKind::Date | FormatKind::Time | FormatKind::DateTime => {
                if StrftimeItems::new(&self.pattern).any(|item| matches!(item, Item::Error)) {
                    return Err(CsvError::Config(format!(
                        "invalid date pattern {:?}",
                        self.pattern
                    )));
                }
            }
        }
        if self.timezone.is_some() {
            self.offset()?;
        }
        Ok(())
    }

    /// Parses non-empty text into a value of type `value_type`.
    pub(crate) fn parse_text(&self, text: &str, value_type: ValueType) -> Result<Value, CsvError> {
        let text = text.trim();
        let parsed = match self.kind {
            FormatKind::Number => self.parse_number(text, value_type)?,
            FormatKind::Boolean => {
                let (yes, no) = self.boolean_texts()?;
                if text.eq_ignore_ascii_case(yes) {
                    Value::Bool(true)
                } else if text.eq_ignore_ascii_case(no) {
                    Value::Bool(false)
                } else {
                    return Err(CsvError::Conversion(format!(
                        "{:?} is neither {:?} nor {:?}",
                        text, yes, no
                    )));
                }
            }
            FormatKind::Date => NaiveDate::parse_from_str(text, &self.pattern)
                .map(Value::Date)
                .map_err(|error| self.parse_error(text, error))?,
            FormatKind::Time => NaiveTime::parse_from_str(text, &self.pattern)
                .map(Value::Time)
                .map_err(|error| self.parse_error(text, error))?,
            FormatKind::DateTime => {
                let local = NaiveDateTime::parse_from_str(text, &self.pattern)
                    .map_err(|error| self.parse_error(text, error))?;
                Value::DateTime(self.to_utc(local)?)
            }
        };

        match (parsed, value_type) {
            (Value::Date(date), ValueType::DateTime) => {
                Ok(Value::DateTime(date.and_time(NaiveTime::MIN)))
            }
            (Value::DateTime(datetime), ValueType::Date) => Ok(Value::Date(datetime.date())),
            (Value::DateTime(datetime), ValueType::Time) => Ok(Value::Time(datetime.time())),
            (value, ValueType::Text) => Ok(Value::Text(value.to_string())),
            (value, _) => Ok(value),
        }
    }

    /// Renders a non-null value with this format.
    pub(crate) fn render_value(&self, value: &Value) -> Result<String, CsvError> {
        match (self.kind, value) {
            (FormatKind::Number, Value::Integer(_) | Value::Float(_)) => {
                Ok(self.render_number(value)?)
            }
            (FormatKind::Boolean, Value::Bool(b)) => {
                let (yes, no) = self.boolean_texts()?;
                Ok(if *b { yes } else { no }.to_string())
            }
            (FormatKind::Date | FormatKind::DateTime, Value::Date(date)) => {
                write_formatted(date.format(&self.pattern))
            }
            (FormatKind::Time | FormatKind::DateTime, Value::Time(time)) => {
                write_formatted(time.format(&self.pattern))
            }
            (FormatKind::Date | FormatKind::Time | FormatKind::DateTime, Value::DateTime(dt)) => {
                let local = self.to_local(*dt)?;
                write_formatted(local.format(&self.pattern))
            }
            (kind, value) => Err(CsvError::Conversion(format!(
                "cannot render {:?} with a {:?} format",
                value, kind
            ))),
        }
    }

    fn parse_error(&self, text: &str, error: impl Display) -> CsvError {
        CsvError::Conversion(format!(
            "cannot parse {:?} with pattern {:?}: {}",
            text, self.pattern, error
        ))
    }

    fn boolean_texts(&self) -> Result<(&str, &str), CsvError> {
        self.pattern.split_once('/').ok_or_else(|| {
            CsvError::Config(format!(
                "boolean pattern {:?} must look like true/false",
                self.pattern
            ))
        })
    }

    fn offset(&self) -> Result<FixedOffset, CsvError> {
        match &self.timezone {
            None => utc_offset(),
            Some(timezone) => parse_offset(timezone),
        }
    }

    fn to_utc(&self, local: NaiveDateTime) -> Result<NaiveDateTime, CsvError> {
        let offset = self.offset()?;
        offset
            .from_local_datetime(&local)
            .single()
            .map(|datetime| datetime.naive_utc())
            .ok_or_else(|| CsvError::Conversion(format!("{} is ambiguous in {}", local, offset)))
    }

    fn to_local(&self, utc: NaiveDateTime) -> Result<NaiveDateTime, CsvError> {
        let offset = self.offset()?;
        Ok(Utc.from_utc_datetime(&utc).with_timezone(&offset).naive_local())
    }

    fn separators(&self) -> (char, char) {
        let language = self
            .locale
            .as_deref()
            .and_then(|locale| locale.split(['_', '-']).next())
            .unwrap_or("en")
            .to_ascii_lowercase();

        match language.as_str() {
            "de" | "es" | "it" | "nl" | "pt" | "da" | "id" | "tr" => (',', '.'),
            "fr" | "ru" | "sv" | "pl" | "cs" | "fi" | "nb" | "uk" => (',', ' '),
            _ => ('.', ','),
        }
    }

    fn currency_symbol(&self) -> String {
        match self.currency.as_deref() {
            Some("USD") => "$".to_string(),
            Some("EUR") => "€".to_string(),
            Some("GBP") => "£".to_string(),
            Some("JPY") | Some("CNY") => "¥".to_string(),
            Some(code) => code.to_string(),
            None => String::new(),
        }
    }

    fn render_number(&self, value: &Value) -> Result<String, CsvError> {
        let pattern = NumberPattern::parse(&self.pattern)?;
        let (decimal, grouping) = self.separators();

        let (negative, mut int_digits, mut frac_digits) = match value {
            Value::Integer(i) => (*i < 0, i.unsigned_abs().to_string(), String::new()),
            Value::Float(f) if f.is_finite() => {
                let fixed = format!("{:.*}", pattern.max_frac, f.abs());
                let (int, frac) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));
                let negative = *f < 0.0 && fixed.bytes().any(|b| (b'1'..=b'9').contains(&b));
                (negative, int.to_string(), frac.to_string())
            }
            other => {
                return Err(CsvError::Conversion(format!(
                    "cannot render {:?} as a number",
                    other
                )));
            }
        };

        while frac_digits.len() > pattern.min_frac && frac_digits.ends_with('0') {
            frac_digits.pop();
        }
        while frac_digits.len() < pattern.min_frac {
            frac_digits.push('0');
        }
        while int_digits.len() < pattern.min_int {
            int_digits.insert(0, '0');
        }

        let mut out = String::new();
        if negative {
            out.push('-');
        }
        let symbol = self.currency_symbol();
        out.push_str(&pattern.prefix.replace('¤', &symbol));
        match pattern.grouping {
            Some(size) => {
                let len = int_digits.len();
                for (i, digit) in int_digits.chars().enumerate() {
                    if i > 0 && (len - i) % size == 0 {
                        out.push(grouping);
                    }
                    out.push(digit);
                }
            }
            None => out.push_str(&int_digits),
        }
        if !frac_digits.is_empty() {
            out.push(decimal);
            out.push_str(&frac_digits);
        }
        out.push_str(&pattern.suffix.replace('¤', &symbol));
        Ok(out)
    }

    fn parse_number(&self, text: &str, value_type: ValueType) -> Result<Value, CsvError> {
        let pattern = NumberPattern::parse(&self.pattern)?;
        let (decimal, grouping) = self.separators();
        let symbol = self.currency_symbol();
        let prefix = pattern.prefix.replace('¤', &symbol);
        let suffix = pattern.suffix.replace('¤', &symbol);

        let (negative, body) = match text.strip_prefix('-') {
            Some(rest) => (true, rest.trim_start()),
            None => (false, text),
        };
        let body = body.strip_prefix(prefix.trim()).unwrap_or(body).trim();
        let body = body.strip_suffix(suffix.trim()).unwrap_or(body).trim();

        let mut digits = String::with_capacity(body.len() + 1);
        if negative {
            digits.push('-');
        }
        for c in body.chars() {
            if c == grouping || (grouping == ' ' && c == '\u{a0}') {
                continue;
            }
            digits.push(if c == decimal { '.' } else { c });
        }

        let invalid = || {
            CsvError::Conversion(format!(
                "cannot parse {:?} with pattern {:?}",
                text, self.pattern
            ))
        };
        match value_type {
            ValueType::Integer if !digits.contains('.') => {
                digits.parse::<i64>().map(Value::Integer).map_err(|_| invalid())
            }
            ValueType::Integer => {
                let float = digits.parse::<f64>().map_err(|_| invalid())?;
                if float.fract() != 0.0 {
                    return Err(CsvError::Conversion(format!(
                        "{:?} is not an integer",
                        text
                    )));
                }
                Ok(Value::Integer(float as i64))
            }
            ValueType::Float => digits.parse::<f64>().map(Value::Float).map_err(|_| invalid()),
            ValueType::Text => {
                digits.parse::<f64>().map_err(|_| invalid())?;
                Ok(Value::Text(digits))
            }
            other => Err(CsvError::Conversion(format!(
                "number format cannot produce {:?}",
                other
            ))),
        }
    }
}

fn merge_option(
    what: &str,
    left: &Option<String>,
    right: &Option<String>,
) -> Result<Option<String>, CsvError> {
    match (left, right) {
        (Some(a), Some(b)) if a != b => Err(CsvError::Config(format!(
            "cannot merge formats with different {}s ({} and {})",
            what, a, b
        ))),
        (Some(a), _) => Ok(Some(a.clone())),
        (None, b) => Ok(b.clone()),
    }
}

fn write_formatted(formatted: impl Display) -> Result<String, CsvError> {
    let mut out = String::new();
    write!(out, "{}", formatted)
        .map_err(|_| CsvError::Conversion("pattern does not apply to this value".to_string()))?;
    Ok(out)
}

fn utc_offset() -> Result<FixedOffset, CsvError> {
    FixedOffset::east_opt(0).ok_or_else(|| CsvError::Config("invalid UTC offset".to_string()))
}

/// Parses `UTC`, `Z`, or a fixed offset such as `+09:00`, `-0530` or `+09`.
fn parse_offset(timezone: &str) -> Result<FixedOffset, CsvError> {
    let trimmed = timezone.trim();
    if trimmed.eq_ignore_ascii_case("utc") || trimmed.eq_ignore_ascii_case("z") {
        return utc_offset();
    }
    // chrono's `%z` wants minutes, so an hour-only offset gets them appended.
    let full = if trimmed.len() == 3 {
        format!("{}:00", trimmed)
    } else {
        trimmed.to_string()
    };
    full.parse::<FixedOffset>()
        .map_err(|e| CsvError::Config(format!("invalid timezone {:?}: {}", timezone, e)))
}

/// The pieces of a decimal pattern like `¤#,##0.00 net`.
#[derive(Debug, PartialEq)]
struct NumberPattern {
    prefix: String,
    suffix: String,
    min_int: usize,
    grouping: Option<usize>,
    min_frac: usize,
    max_frac: usize,
}

impl NumberPattern {
    fn parse(pattern: &str) -> Result<Self, CsvError> {
        let is_body = |c: char| matches!(c, '#' | '0' | ',' | '.');
        let start = pattern.find(is_body).ok_or_else(|| {
            CsvError::Config(format!("number pattern {:?} has no digits", pattern))
        })?;
        let end = pattern[start..]
            .find(|c: char| !is_body(c))
            .map_or(pattern.len(), |i| start + i);

        let body = &pattern[start..end];
        let (int_part, frac_part) = body.split_once('.').unwrap_or((body, ""));
        if frac_part.contains([',', '.']) {
            return Err(CsvError::Config(format!(
                "malformed number pattern {:?}",
                pattern
            )));
        }

        let grouping = match int_part.rfind(',') {
            Some(i) => {
                let size = int_part.len() - i - 1;
                if size == 0 {
                    return Err(CsvError::Config(format!(
                        "malformed grouping in number pattern {:?}",
                        pattern
                    )));
                }
                Some(size)
            }
            None => None,
        };

        Ok(Self {
            prefix: pattern[..start].to_string(),
            suffix: pattern[end..].to_string(),
            min_int: int_part.chars().filter(|c| *c == '0').count(),
            grouping,
            min_frac: frac_part.chars().filter(|c| *c == '0').count(),
            max_frac: frac_part.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_pattern_should_be_decomposed() {
        let pattern = NumberPattern::parse("¤#,##0.0# net").unwrap();

        assert_eq!(
            pattern,
            NumberPattern {
                prefix: "¤".to_string(),
                suffix: " net".to_string(),
                min_int: 1,
                grouping: Some(3),
                min_frac: 1,
                max_frac: 2,
            }
        );
        assert!(NumberPattern::parse("abc").is_err());
    }

    #[test]
    fn should_render_and_parse_grouped_decimals() {
        let format = FormatSpec::number("#,##0.00");

        assert_eq!(format.render_value(&Value::Float(1234567.891)).unwrap(), "1,234,567.89");
        assert_eq!(format.render_value(&Value::Integer(-5)).unwrap(), "-5.00");
        assert_eq!(
            format.parse_text("1,234,567.89", ValueType::Float).unwrap(),
            Value::Float(1234567.89)
        );
        assert_eq!(
            format.parse_text("1,000.00", ValueType::Integer).unwrap(),
            Value::Integer(1000)
        );
        assert!(format.parse_text("1,000.50", ValueType::Integer).is_err());
    }

    #[test]
    fn should_use_locale_separators_and_currency() {
        let format = FormatSpec::number("#,##0.00 ¤").locale("de_DE").currency("EUR");

        assert_eq!(format.render_value(&Value::Float(1234.5)).unwrap(), "1.234,50 €");
        assert_eq!(
            format.parse_text("-1.234,50 €", ValueType::Float).unwrap(),
            Value::Float(-1234.5)
        );
    }

    #[test]
    fn optional_fraction_digits_should_be_trimmed() {
        let format = FormatSpec::number("0.##");

        assert_eq!(format.render_value(&Value::Float(2.5)).unwrap(), "2.5");
        assert_eq!(format.render_value(&Value::Float(2.0)).unwrap(), "2");
        assert_eq!(format.render_value(&Value::Float(-0.001)).unwrap(), "0");
    }

    #[test]
    fn should_render_and_parse_dates() {
        let format = FormatSpec::date("%Y/%m/%d");
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();

        assert_eq!(format.render_value(&Value::Date(date)).unwrap(), "2024/03/09");
        assert_eq!(
            format.parse_text("2024/03/09", ValueType::Date).unwrap(),
            Value::Date(date)
        );
        assert!(format.parse_text("09.03.2024", ValueType::Date).is_err());
    }

    #[test]
    fn date_time_should_shift_by_timezone() {
        let format = FormatSpec::date_time("%Y-%m-%d %H:%M").timezone("+09:00");
        let utc = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(15, 30, 0)
            .unwrap();

        assert_eq!(format.render_value(&Value::DateTime(utc)).unwrap(), "2024-01-02 00:30");
        assert_eq!(
            format.parse_text("2024-01-02 00:30", ValueType::DateTime).unwrap(),
            Value::DateTime(utc)
        );
    }

    #[test]
    fn partial_pattern_should_render_part_of_date_time() {
        let value = Value::DateTime(
            NaiveDate::from_ymd_opt(2024, 5, 6)
                .unwrap()
                .and_hms_opt(7, 8, 9)
                .unwrap(),
        );

        assert_eq!(FormatSpec::date("%d.%m.%Y").render_value(&value).unwrap(), "06.05.2024");
        assert_eq!(FormatSpec::time("%H:%M:%S").render_value(&value).unwrap(), "07:08:09");
    }

    #[test]
    fn time_format_should_not_render_dates() {
        let format = FormatSpec::time("%Y %H");
        let time = NaiveTime::from_hms_opt(1, 2, 3).unwrap();

        assert!(matches!(
            format.render_value(&Value::Time(time)),
            Err(CsvError::Conversion(_))
        ));
    }

    #[test]
    fn merge_should_combine_date_and_time() {
        let merged = FormatSpec::date("%Y-%m-%d")
            .timezone("UTC")
            .merge(&FormatSpec::time("%H:%M"))
            .unwrap();

        assert_eq!(merged.kind, FormatKind::DateTime);
        assert_eq!(merged.pattern, "%Y-%m-%d %H:%M");
        assert_eq!(merged.timezone.as_deref(), Some("UTC"));
    }

    #[test]
    fn merge_should_reject_incompatible_formats() {
        assert!(FormatSpec::number("0").merge(&FormatSpec::date("%Y")).is_err());
        assert!(
            FormatSpec::date("%Y")
                .timezone("+01:00")
                .merge(&FormatSpec::time("%H").timezone("+02:00"))
                .is_err()
        );
    }

    #[test]
    fn boolean_format_should_map_texts() {
        let format = FormatSpec::boolean("yes", "no");

        assert_eq!(format.parse_text("YES", ValueType::Bool).unwrap(), Value::Bool(true));
        assert_eq!(format.render_value(&Value::Bool(false)).unwrap(), "no");
        assert!(format.parse_text("maybe", ValueType::Bool).is_err());
    }

    #[test]
    fn validate_should_reject_bad_patterns_and_timezones() {
        assert!(FormatSpec::date("%Q").validate().is_err());
        assert!(FormatSpec::date("%Y").timezone("Mars/Olympus").validate().is_err());
        assert!(FormatSpec::date_time("%Y-%m-%dT%H:%M").timezone("-05:30").validate().is_ok());
        assert!(FormatSpec::number("#,##0").validate().is_ok());
    }

    #[test]
    fn offsets_should_parse() {
        assert_eq!(parse_offset("+09:00").unwrap().local_minus_utc(), 9 * 3600);
        assert_eq!(parse_offset("-0530").unwrap().local_minus_utc(), -(5 * 3600 + 30 * 60));
        assert_eq!(parse_offset("Z").unwrap().local_minus_utc(), 0);
        assert_eq!(parse_offset("+09").unwrap().local_minus_utc(), 9 * 3600);
        assert_eq!(parse_offset(" utc ").unwrap().local_minus_utc(), 0);
        assert!(parse_offset("9").is_err());
        assert!(parse_offset("+9:3").is_err());
    }
}
