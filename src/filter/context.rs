use crate::{
    error::CsvError,
    mapping::{record::Record, value::Value},
};

use super::predicate::Target;

/// Source of the values a predicate compares.
pub trait FilterContext {
    /// Current value of `target`; unknown names are errors, never silently null.
    fn resolve(&self, target: &Target) -> Result<Value, CsvError>;
}

/// A raw row, optionally with the header used for name lookup.
#[derive(Debug, Clone, Copy)]
pub struct RowContext<'a> {
    header: Option<&'a [String]>,
    values: &'a [Option<String>],
    line: usize,
}

impl<'a> RowContext<'a> {
    pub fn new(header: Option<&'a [String]>, values: &'a [Option<String>]) -> Self {
        Self {
            header,
            values,
            line: 0,
        }
    }

    /// Line reported in out-of-range errors.
    pub fn at_line(mut self, line: usize) -> Self {
        self.line = line;
        self
    }

    fn value_at(&self, position: usize) -> Result<Value, CsvError> {
        match self.values.get(position) {
            Some(value) => Ok(Value::from(value.clone())),
            None => Err(CsvError::format(
                self.line,
                format!(
                    "column {} is out of range for a row of {} values",
                    position,
                    self.values.len()
                ),
            )),
        }
    }
}

impl FilterContext for RowContext<'_> {
    fn resolve(&self, target: &Target) -> Result<Value, CsvError> {
        match target {
            Target::Position(position) => self.value_at(*position),
            Target::Column(name) => {
                let header = self.header.ok_or(CsvError::MissingHeader)?;
                let position = header
                    .iter()
                    .position(|column| column == name)
                    .ok_or_else(|| {
                        CsvError::Mapping(format!("column {:?} is not in the header", name))
                    })?;
                self.value_at(position)
            }
            Target::Field(name) => Err(CsvError::Mapping(format!(
                "field {:?} cannot be resolved on a raw row",
                name
            ))),
        }
    }
}

/// A mapped record, resolved by field name.
pub struct RecordContext<'a, T> {
    record: &'a T,
}

impl<'a, T: Record> RecordContext<'a, T> {
    pub fn new(record: &'a T) -> Self {
        Self { record }
    }
}

impl<T: Record> FilterContext for RecordContext<'_, T> {
    fn resolve(&self, target: &Target) -> Result<Value, CsvError> {
        match target {
            Target::Field(name) => self
                .record
                .get(name)
                .ok_or_else(|| CsvError::Mapping(format!("record has no field {:?}", name))),
            other => Err(CsvError::Mapping(format!(
                "{:?} cannot be resolved on a record, use a field target",
                other
            ))),
        }
    }
}
