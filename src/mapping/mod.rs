//! Conversion between CSV rows and items.
//!
//! [`RowMapper`] turns a row read from CSV into an item and [`RowRenderer`] does the
//! reverse. Plain rows, position-keyed maps, header-keyed rows and typed
//! [`Record`](record::Record)s are supported out of the box.

use crate::{error::CsvError, filter::context::FilterContext, item::csv::Row};

pub mod column;
pub mod converter;
pub mod format;
pub mod record;
pub mod record_mapping;
pub mod row;
pub mod value;

/// Builds items from rows.
pub trait RowMapper {
    type Item;

    /// Called once with the header row (if any) before the first data row.
    fn check_header(&self, _header: Option<&[String]>) -> Result<(), CsvError> {
        Ok(())
    }

    fn map_row(&self, header: Option<&[String]>, row: Row) -> Result<Self::Item, CsvError>;

    /// Context used to run a record filter on a mapped item, `None` when the
    /// item type cannot be filtered.
    fn item_context<'a>(
        &self,
        _header: Option<&'a [String]>,
        _item: &'a Self::Item,
    ) -> Option<Box<dyn FilterContext + 'a>> {
        None
    }
}

/// Turns items into rows.
pub trait RowRenderer {
    type Item;

    /// Header row to write, given the first item when one is known.
    fn header(&self, first: Option<&Self::Item>) -> Option<Vec<String>>;

    fn render(&self, item: &Self::Item) -> Result<Row, CsvError>;

    fn item_context<'a>(
        &self,
        _header: Option<&'a [String]>,
        _item: &'a Self::Item,
    ) -> Option<Box<dyn FilterContext + 'a>> {
        None
    }
}
