use std::{
    fs::File,
    io::{BufRead, BufReader, Read},
    path::Path,
    sync::Arc,
};

use log::debug;
use parking_lot::Mutex;

use crate::{
    core::item::{ItemReader, ItemReaderResult},
    error::CsvError,
    filter::{context::RowContext, predicate::Filter},
    mapping::RowMapper,
};

use super::{config::CsvConfig, csv_reader::CsvReader};

struct CursorState {
    header: Option<Arc<[String]>>,
    started: bool,
    skipped: usize,
    returned: usize,
}

/// Reads CSV rows and maps them to items.
///
/// The header row, when enabled, is read once after the skipped lines. Each
/// data row goes through the row filter, then the mapper, then the record
/// filter; `offset` and `limit` count the items that pass both filters.
///
/// # Examples
///
/// ```
/// use csv_batch_rs::filter::predicate::{Predicate, Target};
/// use csv_batch_rs::item::csv::item_reader::CsvItemReaderBuilder;
/// use csv_batch_rs::mapping::row::NameMapMapping;
///
/// let data = "city,country\nParis,FR\nBerlin,DE\nLyon,FR\n";
///
/// let reader = CsvItemReaderBuilder::new()
///     .has_headers(true)
///     .filter(Predicate::eq(Target::column("country"), "FR"))
///     .from_reader(data.as_bytes(), NameMapMapping::new())
///     .unwrap();
///
/// let first = reader.read_item().unwrap().unwrap();
/// assert_eq!(first.get("city"), Some("Paris"));
///
/// let second = reader.read_item().unwrap().unwrap();
/// assert_eq!(second.get("city"), Some("Lyon"));
///
/// assert!(reader.read_item().unwrap().is_none());
/// ```
pub struct CsvItemReader<R, M> {
    reader: CsvReader<R>,
    mapper: M,
    has_headers: bool,
    filter: Option<Box<dyn Filter>>,
    record_filter: Option<Box<dyn Filter>>,
    offset: usize,
    limit: Option<usize>,
    state: Mutex<CursorState>,
}

impl<R: BufRead, M: RowMapper> CsvItemReader<R, M> {
    /// Header row, reading it first if no item has been read yet.
    pub fn header(&self) -> Result<Option<Vec<String>>, CsvError> {
        let mut state = self.state.lock();
        self.start(&mut state)?;
        Ok(state.header.as_deref().map(<[String]>::to_vec))
    }

    /// Reads the next accepted item, or `None` when the input is exhausted or
    /// the limit is reached.
    pub fn read_item(&self) -> Result<Option<M::Item>, CsvError> {
        let mut state = self.state.lock();
        self.start(&mut state)?;
        let header = state.header.clone();
        let header = header.as_deref();

        loop {
            if self.limit.is_some_and(|limit| state.returned >= limit) {
                return Ok(None);
            }
            let Some(row) = self.reader.read_values()? else {
                return Ok(None);
            };

            if let Some(filter) = &self.filter {
                let line = self.reader.start_line_number();
                let context = RowContext::new(header, &row).at_line(line);
                if !filter.accept(&context)? {
                    debug!("Row at line {} filtered out", line);
                    continue;
                }
            }

            let item = self.mapper.map_row(header, row)?;

            if let Some(filter) = &self.record_filter {
                let context = self.mapper.item_context(header, &item).ok_or_else(|| {
                    CsvError::Config("items of this mapper cannot be filtered".to_string())
                })?;
                if !filter.accept(context.as_ref())? {
                    debug!(
                        "Item at line {} filtered out",
                        self.reader.start_line_number()
                    );
                    continue;
                }
            }

            if state.skipped < self.offset {
                state.skipped += 1;
                continue;
            }
            state.returned += 1;
            return Ok(Some(item));
        }
    }

    pub fn line_number(&self) -> usize {
        self.reader.line_number()
    }

    pub fn close(&self) -> Result<(), CsvError> {
        self.reader.close()
    }

    pub fn is_closed(&self) -> bool {
        self.reader.is_closed()
    }

    fn start(&self, state: &mut CursorState) -> Result<(), CsvError> {
        if state.started {
            return Ok(());
        }

        if self.has_headers {
            match self.reader.read_values()? {
                Some(row) => {
                    let header: Vec<String> = row.into_iter().map(Option::unwrap_or_default).collect();
                    debug!("Read header: {:?}", header);
                    state.header = Some(header.into());
                }
                None => {
                    debug!("Input is empty, no header row");
                    state.started = true;
                    return Ok(());
                }
            }
        }

        self.mapper.check_header(state.header.as_deref())?;
        state.started = true;
        Ok(())
    }
}

impl<R: BufRead, M: RowMapper> ItemReader<M::Item> for CsvItemReader<R, M> {
    fn read(&self) -> ItemReaderResult<M::Item> {
        self.read_item()
    }
}

/// Builder for [`CsvItemReader`].
#[derive(Default)]
pub struct CsvItemReaderBuilder {
    config: CsvConfig,
    has_headers: bool,
    filter: Option<Box<dyn Filter>>,
    record_filter: Option<Box<dyn Filter>>,
    offset: usize,
    limit: Option<usize>,
}

impl CsvItemReaderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: CsvConfig) -> Self {
        self.config = config;
        self
    }

    /// Whether the first data line is a header row.
    pub fn has_headers(mut self, yes: bool) -> Self {
        self.has_headers = yes;
        self
    }

    /// Filter applied to raw rows before mapping.
    pub fn filter(mut self, filter: impl Filter + 'static) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    /// Filter applied to mapped items.
    pub fn record_filter(mut self, filter: impl Filter + 'static) -> Self {
        self.record_filter = Some(Box::new(filter));
        self
    }

    /// Number of accepted items to skip.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Maximum number of items to return.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn from_buf_reader<R: BufRead, M: RowMapper>(
        self,
        rdr: R,
        mapper: M,
    ) -> Result<CsvItemReader<R, M>, CsvError> {
        Ok(CsvItemReader {
            reader: CsvReader::new(rdr, &self.config)?,
            mapper,
            has_headers: self.has_headers,
            filter: self.filter,
            record_filter: self.record_filter,
            offset: self.offset,
            limit: self.limit,
            state: Mutex::new(CursorState {
                header: None,
                started: false,
                skipped: 0,
                returned: 0,
            }),
        })
    }

    pub fn from_reader<R: Read, M: RowMapper>(
        self,
        rdr: R,
        mapper: M,
    ) -> Result<CsvItemReader<BufReader<R>, M>, CsvError> {
        self.from_buf_reader(BufReader::new(rdr), mapper)
    }

    pub fn from_path<P: AsRef<Path>, M: RowMapper>(
        self,
        path: P,
        mapper: M,
    ) -> Result<CsvItemReader<BufReader<File>, M>, CsvError> {
        self.config.validate()?;
        let file = File::open(path)?;
        self.from_reader(file, mapper)
    }
}
