use std::{collections::BTreeMap, sync::Arc};

use parking_lot::Mutex;

use crate::{
    error::CsvError,
    filter::{
        context::{FilterContext, RowContext},
        predicate::Target,
    },
    item::csv::Row,
};

use super::{RowMapper, RowRenderer, value::Value};

/// Items are the rows themselves.
#[derive(Debug, Clone, Default)]
pub struct RowMapping {
    header: Option<Vec<String>>,
}

impl RowMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Header row written before the rows.
    pub fn with_header(header: Vec<String>) -> Self {
        Self {
            header: Some(header),
        }
    }
}

impl RowMapper for RowMapping {
    type Item = Row;

    fn map_row(&self, _header: Option<&[String]>, row: Row) -> Result<Row, CsvError> {
        Ok(row)
    }

    fn item_context<'a>(
        &self,
        header: Option<&'a [String]>,
        item: &'a Row,
    ) -> Option<Box<dyn FilterContext + 'a>> {
        Some(Box::new(RowContext::new(header, item)))
    }
}

impl RowRenderer for RowMapping {
    type Item = Row;

    fn header(&self, _first: Option<&Row>) -> Option<Vec<String>> {
        self.header.clone()
    }

    fn render(&self, item: &Row) -> Result<Row, CsvError> {
        Ok(item.clone())
    }

    fn item_context<'a>(
        &self,
        header: Option<&'a [String]>,
        item: &'a Row,
    ) -> Option<Box<dyn FilterContext + 'a>> {
        Some(Box::new(RowContext::new(header, item)))
    }
}

/// Row values keyed by zero-based column position.
pub type PositionMap = BTreeMap<usize, Option<String>>;

/// Items are [`PositionMap`]s; missing positions are written as null.
#[derive(Debug, Clone, Default)]
pub struct PositionMapMapping {
    header: Option<Vec<String>>,
}

impl PositionMapMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(header: Vec<String>) -> Self {
        Self {
            header: Some(header),
        }
    }
}

struct PositionMapContext<'a>(&'a PositionMap);

impl FilterContext for PositionMapContext<'_> {
    fn resolve(&self, target: &Target) -> Result<Value, CsvError> {
        match target {
            Target::Position(position) => self
                .0
                .get(position)
                .map(|value| Value::from(value.clone()))
                .ok_or_else(|| CsvError::Mapping(format!("no value at position {}", position))),
            other => Err(CsvError::Mapping(format!(
                "{:?} cannot be resolved on a position map",
                other
            ))),
        }
    }
}

impl RowMapper for PositionMapMapping {
    type Item = PositionMap;

    fn map_row(&self, _header: Option<&[String]>, row: Row) -> Result<PositionMap, CsvError> {
        Ok(row.into_iter().enumerate().collect())
    }

    fn item_context<'a>(
        &self,
        _header: Option<&'a [String]>,
        item: &'a PositionMap,
    ) -> Option<Box<dyn FilterContext + 'a>> {
        Some(Box::new(PositionMapContext(item)))
    }
}

impl RowRenderer for PositionMapMapping {
    type Item = PositionMap;

    fn header(&self, _first: Option<&PositionMap>) -> Option<Vec<String>> {
        self.header.clone()
    }

    fn render(&self, item: &PositionMap) -> Result<Row, CsvError> {
        let width = item.keys().next_back().map_or(0, |last| last + 1);
        let mut row = vec![None; width];
        for (position, value) in item {
            row[*position] = value.clone();
        }
        Ok(row)
    }

    fn item_context<'a>(
        &self,
        _header: Option<&'a [String]>,
        item: &'a PositionMap,
    ) -> Option<Box<dyn FilterContext + 'a>> {
        Some(Box::new(PositionMapContext(item)))
    }
}

/// A row whose values are addressed by header name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedRow {
    header: Arc<[String]>,
    values: Row,
}

impl NamedRow {
    pub fn new(header: impl Into<Arc<[String]>>, values: Row) -> Self {
        Self {
            header: header.into(),
            values,
        }
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn values(&self) -> &[Option<String>] {
        &self.values
    }

    /// Value of column `name`; `None` for null, short rows and unknown names.
    pub fn get(&self, name: &str) -> Option<&str> {
        let position = self.header.iter().position(|column| column == name)?;
        self.values.get(position)?.as_deref()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.header.iter().any(|column| column == name)
    }

    /// Pairs of column name and value, in header order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.header.iter().enumerate().map(|(i, name)| {
            (
                name.as_str(),
                self.values.get(i).and_then(|value| value.as_deref()),
            )
        })
    }
}

/// Items are [`NamedRow`]s; a header row is required on read.
#[derive(Debug, Default)]
pub struct NameMapMapping {
    header: Mutex<Option<Arc<[String]>>>,
}

impl NameMapMapping {
    pub fn new() -> Self {
        Self::default()
    }

    fn shared_header(&self, header: &[String]) -> Arc<[String]> {
        let mut cached = self.header.lock();
        match cached.as_ref() {
            Some(shared) if &**shared == header => shared.clone(),
            _ => {
                let shared: Arc<[String]> = header.into();
                *cached = Some(shared.clone());
                shared
            }
        }
    }
}

impl RowMapper for NameMapMapping {
    type Item = NamedRow;

    fn check_header(&self, header: Option<&[String]>) -> Result<(), CsvError> {
        header.map(|_| ()).ok_or(CsvError::MissingHeader)
    }

    fn map_row(&self, header: Option<&[String]>, row: Row) -> Result<NamedRow, CsvError> {
        let header = header.ok_or(CsvError::MissingHeader)?;
        Ok(NamedRow {
            header: self.shared_header(header),
            values: row,
        })
    }

    fn item_context<'a>(
        &self,
        _header: Option<&'a [String]>,
        item: &'a NamedRow,
    ) -> Option<Box<dyn FilterContext + 'a>> {
        Some(Box::new(RowContext::new(Some(&*item.header), &item.values)))
    }
}

impl RowRenderer for NameMapMapping {
    type Item = NamedRow;

    fn header(&self, first: Option<&NamedRow>) -> Option<Vec<String>> {
        first.map(|row| row.header.to_vec())
    }

    fn render(&self, item: &NamedRow) -> Result<Row, CsvError> {
        Ok(item.values.clone())
    }

    fn item_context<'a>(
        &self,
        _header: Option<&'a [String]>,
        item: &'a NamedRow,
    ) -> Option<Box<dyn FilterContext + 'a>> {
        Some(Box::new(RowContext::new(Some(&*item.header), &item.values)))
    }
}
