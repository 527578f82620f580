use std::{marker::PhantomData, sync::Arc};

use log::debug;

use crate::{
    core::item::{ItemProcessor, ItemProcessorResult},
    item::csv::Row,
    mapping::record::Record,
};

use super::{
    context::{RecordContext, RowContext},
    predicate::Filter,
};

/// Drops rows rejected by a filter; positions and header names resolve against the row.
pub struct RowFilterProcessor<F> {
    filter: F,
    header: Option<Arc<[String]>>,
}

impl<F: Filter> RowFilterProcessor<F> {
    pub fn new(filter: F) -> Self {
        Self {
            filter,
            header: None,
        }
    }

    /// Header used to resolve column names.
    pub fn header(mut self, header: Vec<String>) -> Self {
        self.header = Some(header.into());
        self
    }
}

impl<F: Filter> ItemProcessor<Row, Row> for RowFilterProcessor<F> {
    fn process(&self, item: &Row) -> ItemProcessorResult<Row> {
        let context = RowContext::new(self.header.as_deref(), item);
        if self.filter.accept(&context)? {
            Ok(Some(item.clone()))
        } else {
            debug!("Row filtered out: {:?}", item);
            Ok(None)
        }
    }
}

/// Drops records rejected by a filter on their fields.
pub struct RecordFilterProcessor<F, T> {
    filter: F,
    record: PhantomData<fn() -> T>,
}

impl<F: Filter, T: Record> RecordFilterProcessor<F, T> {
    pub fn new(filter: F) -> Self {
        Self {
            filter,
            record: PhantomData,
        }
    }
}

impl<F: Filter, T: Record + Clone> ItemProcessor<T, T> for RecordFilterProcessor<F, T> {
    fn process(&self, item: &T) -> ItemProcessorResult<T> {
        if self.filter.accept(&RecordContext::new(item))? {
            Ok(Some(item.clone()))
        } else {
            debug!("Record filtered out");
            Ok(None)
        }
    }
}
