use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::CsvError;

use super::{
    format::FormatSpec,
    value::{Value, ValueType},
};

/// Converts between CSV field text and typed [`Value`]s.
pub trait ValueConverter: Send + Sync {
    /// Converts a field into a value of `value_type`; `None` always yields [`Value::Null`].
    fn parse(&self, text: Option<&str>, value_type: ValueType) -> Result<Value, CsvError>;

    /// Converts a value back into field text; [`Value::Null`] yields `None`.
    fn render(&self, value: &Value) -> Result<Option<String>, CsvError>;
}

/// Converter used when no format is bound: ISO dates, plain decimal numbers,
/// `true`/`false` booleans.
///
/// Empty text converts to null for every type except text.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConverter;

const DATE_TIME_PATTERNS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

impl ValueConverter for DefaultConverter {
    fn parse(&self, text: Option<&str>, value_type: ValueType) -> Result<Value, CsvError> {
        let Some(text) = text else {
            return Ok(Value::Null);
        };
        if value_type == ValueType::Text {
            return Ok(Value::Text(text.to_string()));
        }

        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(Value::Null);
        }
        let invalid = |what: &str| {
            CsvError::Conversion(format!("cannot convert {:?} into {}", text, what))
        };

        match value_type {
            ValueType::Text => Ok(Value::Text(text.to_string())),
            ValueType::Bool => {
                if trimmed.eq_ignore_ascii_case("true") {
                    Ok(Value::Bool(true))
                } else if trimmed.eq_ignore_ascii_case("false") {
                    Ok(Value::Bool(false))
                } else {
                    Err(invalid("a boolean"))
                }
            }
            ValueType::Integer => trimmed
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|_| invalid("an integer")),
            ValueType::Float => trimmed
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| invalid("a number")),
            ValueType::Date => NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .map(Value::Date)
                .map_err(|_| invalid("a date")),
            ValueType::Time => NaiveTime::parse_from_str(trimmed, "%H:%M:%S%.f")
                .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
                .map(Value::Time)
                .map_err(|_| invalid("a time")),
            ValueType::DateTime => DATE_TIME_PATTERNS
                .iter()
                .find_map(|pattern| NaiveDateTime::parse_from_str(trimmed, pattern).ok())
                .map(Value::DateTime)
                .ok_or_else(|| invalid("a date-time")),
        }
    }

    fn render(&self, value: &Value) -> Result<Option<String>, CsvError> {
        match value {
            Value::Null => Ok(None),
            other => Ok(Some(other.to_string())),
        }
    }
}

impl ValueConverter for FormatSpec {
    fn parse(&self, text: Option<&str>, value_type: ValueType) -> Result<Value, CsvError> {
        match text {
            None => Ok(Value::Null),
            Some(text) if text.trim().is_empty() && value_type != ValueType::Text => {
                Ok(Value::Null)
            }
            Some(text) => self.parse_text(text, value_type),
        }
    }

    fn render(&self, value: &Value) -> Result<Option<String>, CsvError> {
        match value {
            Value::Null => Ok(None),
            Value::Text(text) => Ok(Some(text.clone())),
            other => self.render_value(other).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_converter_should_parse_iso_forms() {
        let converter = DefaultConverter;

        assert_eq!(
            converter.parse(Some("2024-02-29"), ValueType::Date).unwrap(),
            Value::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap())
        );
        assert_eq!(
            converter
                .parse(Some("2024-02-29T08:00:00"), ValueType::DateTime)
                .unwrap(),
            converter
                .parse(Some("2024-02-29 08:00:00"), ValueType::DateTime)
                .unwrap()
        );
        assert_eq!(
            converter.parse(Some("TRUE"), ValueType::Bool).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            converter.parse(Some(" 42 "), ValueType::Integer).unwrap(),
            Value::Integer(42)
        );
    }

    #[test]
    fn empty_text_should_be_null_except_for_text() {
        let converter = DefaultConverter;

        assert_eq!(converter.parse(Some(""), ValueType::Integer).unwrap(), Value::Null);
        assert_eq!(
            converter.parse(Some(""), ValueType::Text).unwrap(),
            Value::Text(String::new())
        );
        assert_eq!(converter.parse(None, ValueType::Text).unwrap(), Value::Null);
    }

    #[test]
    fn invalid_text_should_be_conversion_error() {
        let result = DefaultConverter.parse(Some("twelve"), ValueType::Integer);

        assert!(matches!(result, Err(CsvError::Conversion(_))));
    }

    #[test]
    fn render_should_map_null_to_none() {
        assert_eq!(DefaultConverter.render(&Value::Null).unwrap(), None);
        assert_eq!(
            DefaultConverter.render(&Value::Integer(7)).unwrap(),
            Some("7".to_string())
        );
    }

    #[test]
    fn format_spec_should_convert_through_trait() {
        let format = FormatSpec::date("%d/%m/%Y");
        let date = NaiveDate::from_ymd_opt(2023, 12, 31).unwrap();

        assert_eq!(
            format.parse(Some("31/12/2023"), ValueType::Date).unwrap(),
            Value::Date(date)
        );
        assert_eq!(
            format.render(&Value::Date(date)).unwrap(),
            Some("31/12/2023".to_string())
        );
        assert_eq!(format.parse(Some(""), ValueType::Date).unwrap(), Value::Null);
    }
}
