use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::CsvError;

use super::{format::FormatSpec, record::Record};

/// Highest zero-based column position a binding may use.
pub const MAX_POSITION: usize = u16::MAX as usize;

/// Direction(s) in which a column binding is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Access {
    #[default]
    ReadWrite,
    /// Read from CSV into the field, never written back.
    InputOnly,
    /// Written from the field, ignored on read.
    OutputOnly,
}

impl Access {
    pub fn reads(&self) -> bool {
        !matches!(self, Access::OutputOnly)
    }

    pub fn writes(&self) -> bool {
        !matches!(self, Access::InputOnly)
    }
}

/// Binds one CSV column, by zero-based position or by header name, to a record field.
///
/// When both are set the position locates the column and the name is what
/// gets written in the header row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnBinding {
    pub position: Option<usize>,
    pub name: Option<String>,
    pub field: String,
    #[serde(default)]
    pub format: Option<FormatSpec>,
    #[serde(default)]
    pub access: Access,
}

impl ColumnBinding {
    pub fn at(position: usize, field: impl Into<String>) -> Self {
        Self {
            position: Some(position),
            name: None,
            field: field.into(),
            format: None,
            access: Access::ReadWrite,
        }
    }

    pub fn named(name: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            position: None,
            name: Some(name.into()),
            field: field.into(),
            format: None,
            access: Access::ReadWrite,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_position(mut self, position: usize) -> Self {
        self.position = Some(position);
        self
    }

    pub fn format(mut self, format: FormatSpec) -> Self {
        self.format = Some(format);
        self
    }

    pub fn access(mut self, access: Access) -> Self {
        self.access = access;
        self
    }

    /// Text written for this column in a header row.
    pub fn header_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.field)
    }

    /// Index of this column in a row read with `header`.
    pub fn resolve(&self, header: Option<&[String]>) -> Result<usize, CsvError> {
        if let Some(position) = self.position {
            return Ok(position);
        }
        let Some(name) = self.name.as_deref() else {
            return Err(CsvError::Mapping(format!(
                "binding for field {:?} has neither position nor name",
                self.field
            )));
        };
        let header = header.ok_or(CsvError::MissingHeader)?;

        header
            .iter()
            .position(|column| column == name)
            .ok_or_else(|| CsvError::Mapping(format!("column {:?} is not in the header", name)))
    }
}

/// Ordered column bindings for one record type.
///
/// # Examples
///
/// ```
/// use csv_batch_rs::mapping::column::{Access, ColumnBinding, ColumnMapping};
///
/// let mapping = ColumnMapping::new()
///     .column(0, "id")
///     .named("Customer", "customer")
///     .bind(ColumnBinding::at(1, "secret").access(Access::InputOnly))
///     .column(2, "total");
///
/// assert!(mapping.requires_header());
/// assert_eq!(mapping.header(), vec!["id", "", "total", "Customer"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    bindings: Vec<ColumnBinding>,
}

impl ColumnMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// One read-write binding per field of `T`, positioned and named in declaration order.
    pub fn derive<T: Record>() -> Self {
        let bindings = T::fields()
            .iter()
            .enumerate()
            .map(|(i, field)| ColumnBinding::at(i, field.name).with_name(field.name))
            .collect();
        Self { bindings }
    }

    pub fn column(self, position: usize, field: impl Into<String>) -> Self {
        self.bind(ColumnBinding::at(position, field))
    }

    pub fn named(self, name: impl Into<String>, field: impl Into<String>) -> Self {
        self.bind(ColumnBinding::named(name, field))
    }

    pub fn bind(mut self, binding: ColumnBinding) -> Self {
        self.bindings.push(binding);
        self
    }

    pub fn bindings(&self) -> &[ColumnBinding] {
        &self.bindings
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Whether reading needs a header row to locate some column.
    pub fn requires_header(&self) -> bool {
        self.bindings
            .iter()
            .any(|binding| binding.access.reads() && binding.position.is_none())
    }

    /// Checks the bindings against the fields of `T`.
    pub fn validate<T: Record>(&self) -> Result<(), CsvError> {
        if self.bindings.is_empty() {
            return Err(CsvError::Config("column mapping has no bindings".to_string()));
        }

        let mut positions = HashSet::new();
        let mut names = HashSet::new();
        for binding in &self.bindings {
            if T::field(&binding.field).is_none() {
                return Err(CsvError::Mapping(format!(
                    "record has no field {:?}",
                    binding.field
                )));
            }
            if binding.position.is_none() && binding.name.is_none() {
                return Err(CsvError::Config(format!(
                    "binding for field {:?} has neither position nor name",
                    binding.field
                )));
            }
            if let Some(position) = binding.position {
                if position > MAX_POSITION {
                    return Err(CsvError::Config(format!(
                        "column {} is beyond the last supported position {}",
                        position, MAX_POSITION
                    )));
                }
                if !positions.insert(position) {
                    return Err(CsvError::Config(format!(
                        "column {} is bound more than once",
                        position
                    )));
                }
            }
            if let Some(name) = &binding.name {
                if !names.insert(name.as_str()) {
                    return Err(CsvError::Config(format!(
                        "column {:?} is bound more than once",
                        name
                    )));
                }
            }
            if let Some(format) = &binding.format {
                format.validate()?;
            }
        }
        Ok(())
    }

    /// Output layout: writable bindings by position, gaps as `None`, then
    /// name-only bindings in declaration order.
    pub fn output_columns(&self) -> Vec<Option<&ColumnBinding>> {
        let writable = || self.bindings.iter().filter(|b| b.access.writes());

        let width = writable().filter_map(|b| b.position).max().map_or(0, |max| max + 1);
        let mut columns: Vec<Option<&ColumnBinding>> = vec![None; width];
        for binding in writable() {
            match binding.position {
                Some(position) => columns[position] = Some(binding),
                None => columns.push(Some(binding)),
            }
        }
        columns
    }

    /// Header row matching [`output_columns`](Self::output_columns); gaps are empty names.
    pub fn header(&self) -> Vec<String> {
        self.output_columns()
            .into_iter()
            .map(|column| column.map_or_else(String::new, |b| b.header_name().to_string()))
            .collect()
    }
}
