use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use log::debug;
use parking_lot::Mutex;

use crate::{
    core::item::{ItemWriter, ItemWriterResult},
    error::CsvError,
    filter::{context::RowContext, predicate::Filter},
    mapping::RowRenderer,
};

use super::{config::CsvConfig, csv_writer::CsvWriter};

#[derive(Default)]
struct HeaderState {
    written: bool,
    header: Option<Vec<String>>,
}

/// Renders items to rows and writes them as CSV.
///
/// The header row, when enabled, is written once: on [`open`](Self::open) if the
/// renderer knows it without an item, otherwise before the first item. The
/// record filter runs on items before rendering and the row filter on the
/// rendered rows.
///
/// # Examples
///
/// ```
/// use csv_batch_rs::impl_record;
/// use csv_batch_rs::item::csv::{config::CsvConfig, item_writer::CsvItemWriterBuilder};
/// use csv_batch_rs::mapping::record_mapping::RecordMapping;
///
/// #[derive(Debug, Default)]
/// struct City {
///     name: String,
///     population: i64,
/// }
///
/// impl_record!(City { name: String, population: i64 });
///
/// let writer = CsvItemWriterBuilder::new()
///     .config(CsvConfig::new().line_separator("\n"))
///     .has_headers(true)
///     .from_writer(Vec::new(), RecordMapping::<City>::derived().unwrap())
///     .unwrap();
///
/// writer
///     .write_items(&[City { name: "Oslo".into(), population: 709_000 }])
///     .unwrap();
///
/// let output = String::from_utf8(writer.into_inner().unwrap()).unwrap();
/// assert_eq!(output, "\"name\",\"population\"\n\"Oslo\",\"709000\"\n");
/// ```
pub struct CsvItemWriter<W: Write, M> {
    writer: CsvWriter<W>,
    renderer: M,
    has_headers: bool,
    filter: Option<Box<dyn Filter>>,
    record_filter: Option<Box<dyn Filter>>,
    state: Mutex<HeaderState>,
}

impl<W: Write, M: RowRenderer> CsvItemWriter<W, M> {
    /// Writes the header row if the renderer can produce it without an item.
    pub fn open(&self) -> Result<(), CsvError> {
        if self.writer.is_closed() {
            return Err(CsvError::Closed);
        }
        let mut state = self.state.lock();
        self.write_header(&mut state, None)
    }

    pub fn write_items(&self, items: &[M::Item]) -> Result<(), CsvError> {
        if self.writer.is_closed() {
            return Err(CsvError::Closed);
        }
        let mut state = self.state.lock();

        for item in items {
            self.write_header(&mut state, Some(item))?;
            let header = state.header.as_deref();

            if let Some(filter) = &self.record_filter {
                let context = self.renderer.item_context(header, item).ok_or_else(|| {
                    CsvError::Config("items of this renderer cannot be filtered".to_string())
                })?;
                if !filter.accept(context.as_ref())? {
                    debug!("Item filtered out before rendering");
                    continue;
                }
            }

            let row = self.renderer.render(item)?;

            if let Some(filter) = &self.filter {
                let context = RowContext::new(header, &row).at_line(self.writer.row_count() + 1);
                if !filter.accept(&context)? {
                    debug!("Row filtered out: {:?}", row);
                    continue;
                }
            }

            self.writer.write_values(&row)?;
        }
        Ok(())
    }

    pub fn flush(&self) -> Result<(), CsvError> {
        self.writer.flush()
    }

    /// Flushes and closes the sink; later writes fail with [`CsvError::Closed`].
    pub fn close(&self) -> Result<(), CsvError> {
        self.writer.close()
    }

    pub fn is_closed(&self) -> bool {
        self.writer.is_closed()
    }

    /// Rows written so far, header included.
    pub fn row_count(&self) -> usize {
        self.writer.row_count()
    }

    pub fn into_inner(self) -> Result<W, CsvError> {
        self.writer.into_inner()
    }

    fn write_header(&self, state: &mut HeaderState, first: Option<&M::Item>) -> Result<(), CsvError> {
        if !self.has_headers || state.written {
            return Ok(());
        }
        let Some(header) = self.renderer.header(first) else {
            // A header may still come from the first item.
            if first.is_none() {
                return Ok(());
            }
            return Err(CsvError::MissingHeader);
        };

        let fields: Vec<Option<&str>> = header.iter().map(|name| Some(name.as_str())).collect();
        self.writer.write_values(&fields)?;
        debug!("Wrote header: {:?}", header);
        state.header = Some(header);
        state.written = true;
        Ok(())
    }
}

impl<W: Write, M: RowRenderer> ItemWriter<M::Item> for CsvItemWriter<W, M> {
    fn write(&self, items: &[M::Item]) -> ItemWriterResult {
        self.write_items(items)
    }

    fn flush(&self) -> ItemWriterResult {
        CsvItemWriter::flush(self)
    }

    fn open(&self) -> ItemWriterResult {
        CsvItemWriter::open(self)
    }

    fn close(&self) -> ItemWriterResult {
        CsvItemWriter::close(self)
    }
}

/// Builder for [`CsvItemWriter`].
#[derive(Default)]
pub struct CsvItemWriterBuilder {
    config: CsvConfig,
    has_headers: bool,
    filter: Option<Box<dyn Filter>>,
    record_filter: Option<Box<dyn Filter>>,
}

impl CsvItemWriterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: CsvConfig) -> Self {
        self.config = config;
        self
    }

    pub fn has_headers(mut self, yes: bool) -> Self {
        self.has_headers = yes;
        self
    }

    /// Filter applied to rendered rows.
    pub fn filter(mut self, filter: impl Filter + 'static) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    /// Filter applied to items before rendering.
    pub fn record_filter(mut self, filter: impl Filter + 'static) -> Self {
        self.record_filter = Some(Box::new(filter));
        self
    }

    pub fn from_writer<W: Write, M: RowRenderer>(
        self,
        wtr: W,
        renderer: M,
    ) -> Result<CsvItemWriter<W, M>, CsvError> {
        Ok(CsvItemWriter {
            writer: CsvWriter::new(wtr, &self.config)?,
            renderer,
            has_headers: self.has_headers,
            filter: self.filter,
            record_filter: self.record_filter,
            state: Mutex::new(HeaderState::default()),
        })
    }

    pub fn from_path<P: AsRef<Path>, M: RowRenderer>(
        self,
        path: P,
        renderer: M,
    ) -> Result<CsvItemWriter<BufWriter<File>, M>, CsvError> {
        self.config.validate()?;
        let file = File::create(path)?;
        self.from_writer(BufWriter::new(file), renderer)
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;
    use crate::{
        filter::predicate::{Predicate, Target},
        item::csv::{Row, config::QuotePolicy},
        mapping::row::{NameMapMapping, NamedRow, RowMapping},
    };

    fn minimal() -> CsvConfig {
        CsvConfig::new()
            .quote_policy(QuotePolicy::Minimal)
            .line_separator("\n")
    }

    fn row(values: &[Option<&str>]) -> Row {
        values.iter().map(|v| v.map(str::to_string)).collect()
    }

    #[test]
    fn header_should_be_written_on_open_once() -> Result<(), Box<dyn Error>> {
        let writer = CsvItemWriterBuilder::new()
            .config(minimal())
            .has_headers(true)
            .from_writer(Vec::new(), RowMapping::with_header(vec!["a".into(), "b".into()]))?;

        writer.open()?;
        writer.write_items(&[row(&[Some("1"), Some("2")])])?;
        writer.write_items(&[row(&[Some("3"), None])])?;

        let output = String::from_utf8(writer.into_inner()?)?;
        assert_eq!(output, "a,b\n1,2\n3,\n");
        Ok(())
    }

    #[test]
    fn named_rows_should_write_header_from_first_item() -> Result<(), Box<dyn Error>> {
        let writer = CsvItemWriterBuilder::new()
            .config(minimal())
            .has_headers(true)
            .from_writer(Vec::new(), NameMapMapping::new())?;
        let header = vec!["id".to_string(), "name".to_string()];

        writer.open()?;
        assert_eq!(writer.row_count(), 0);
        writer.write_items(&[
            NamedRow::new(header.clone(), row(&[Some("1"), Some("Ada")])),
            NamedRow::new(header, row(&[Some("2"), Some("Grace")])),
        ])?;

        let output = String::from_utf8(writer.into_inner()?)?;
        assert_eq!(output, "id,name\n1,Ada\n2,Grace\n");
        Ok(())
    }

    #[test]
    fn filters_should_suppress_rows() -> Result<(), Box<dyn Error>> {
        let writer = CsvItemWriterBuilder::new()
            .config(minimal())
            .has_headers(true)
            .filter(Predicate::ne(Target::column("status"), "deleted"))
            .from_writer(
                Vec::new(),
                RowMapping::with_header(vec!["id".into(), "status".into()]),
            )?;

        writer.write_items(&[
            row(&[Some("1"), Some("active")]),
            row(&[Some("2"), Some("deleted")]),
            row(&[Some("3"), None]),
        ])?;

        let output = String::from_utf8(writer.into_inner()?)?;
        assert_eq!(output, "id,status\n1,active\n3,\n");
        Ok(())
    }

    #[test]
    fn required_header_without_source_should_fail() -> Result<(), Box<dyn Error>> {
        let writer = CsvItemWriterBuilder::new()
            .config(minimal())
            .has_headers(true)
            .from_writer(Vec::new(), RowMapping::new())?;

        writer.open()?;
        let result = writer.write_items(&[row(&[Some("1"), Some("2")])]);

        assert!(matches!(result, Err(CsvError::MissingHeader)));
        assert_eq!(writer.row_count(), 0);
        Ok(())
    }

    #[test]
    fn write_after_close_should_fail() -> Result<(), Box<dyn Error>> {
        let writer = CsvItemWriterBuilder::new().from_writer(Vec::new(), RowMapping::new())?;
        writer.write_items(&[row(&[Some("x")])])?;

        writer.close()?;

        assert!(matches!(writer.write_items(&[]), Err(CsvError::Closed)));
        assert!(matches!(writer.flush(), Err(CsvError::Closed)));
        assert!(matches!(writer.open(), Err(CsvError::Closed)));
        Ok(())
    }
}
