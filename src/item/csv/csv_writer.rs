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
};

use super::{
    Row,
    config::{CsvConfig, QuotePolicy},
};

struct WriterState<W> {
    sink: Option<W>,
    rows: usize,
}

/// Serializes rows of optional strings with the quoting rules the reader expects.
///
/// Null fields are written as the null sentinel, never quoted. Under
/// [`QuotePolicy::All`] every other field is quoted; under [`QuotePolicy::Minimal`]
/// only fields that would otherwise be read back differently are.
///
/// A row needs at least one field, since an empty line reads back as a single
/// null field. A row holding one null field renders as the bare sentinel, or as
/// an empty line when no sentinel is set, which `ignore_empty_lines` then skips.
///
/// # Examples
///
/// ```
/// use csv_batch_rs::item::csv::{config::CsvConfig, csv_writer::CsvWriter};
///
/// let config = CsvConfig::new().null_string("NULL");
/// let writer = CsvWriter::new(Vec::new(), &config).unwrap();
///
/// writer.write_values(&[Some("aaa"), Some("b\nb\\\\b"), Some("c\"cc")]).unwrap();
/// writer.write_values(&[Some("zzz"), Some("yyy"), None]).unwrap();
///
/// let output = String::from_utf8(writer.into_inner().unwrap()).unwrap();
/// assert_eq!(
///     output,
///     "\"aaa\",\"b\nb\\\\\\\\b\",\"c\\\"cc\"\r\n\"zzz\",\"yyy\",NULL\r\n"
/// );
/// ```
pub struct CsvWriter<W: Write> {
    config: CsvConfig,
    state: Mutex<WriterState<W>>,
}

impl<W: Write> CsvWriter<W> {
    /// Creates a writer after validating `config`.
    pub fn new(writer: W, config: &CsvConfig) -> Result<Self, CsvError> {
        config.validate()?;

        Ok(Self {
            config: config.clone(),
            state: Mutex::new(WriterState {
                sink: Some(writer),
                rows: 0,
            }),
        })
    }

    pub fn config(&self) -> &CsvConfig {
        &self.config
    }

    /// Writes one row followed by the configured line separator.
    pub fn write_values<S: AsRef<str>>(&self, values: &[Option<S>]) -> Result<(), CsvError> {
        let mut state = self.state.lock();
        let row_number = state.rows + 1;
        let sink = state.sink.as_mut().ok_or(CsvError::Closed)?;
        if values.is_empty() {
            return Err(CsvError::format(row_number, "cannot write a row without fields"));
        }

        let mut line = String::new();
        if row_number == 1 && self.config.utf8_bom {
            line.push('\u{feff}');
        }
        for (i, value) in values.iter().enumerate() {
            if i > 0 {
                line.push(self.config.separator);
            }
            self.render_field(value.as_ref().map(AsRef::as_ref), row_number, &mut line)?;
        }
        line.push_str(&self.config.line_separator);

        sink.write_all(line.as_bytes())?;
        state.rows = row_number;
        Ok(())
    }

    /// Number of rows written so far, header included.
    pub fn row_count(&self) -> usize {
        self.state.lock().rows
    }

    pub fn flush(&self) -> Result<(), CsvError> {
        let mut state = self.state.lock();
        let sink = state.sink.as_mut().ok_or(CsvError::Closed)?;
        sink.flush()?;
        Ok(())
    }

    /// Flushes and releases the underlying sink. Closing twice is a no-op;
    /// writing or flushing afterwards fails.
    pub fn close(&self) -> Result<(), CsvError> {
        let mut state = self.state.lock();
        if let Some(mut sink) = state.sink.take() {
            sink.flush()?;
            debug!("Closed CSV writer after {} rows", state.rows);
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().sink.is_none()
    }

    /// Flushes and returns the underlying sink.
    pub fn into_inner(self) -> Result<W, CsvError> {
        let state = self.state.into_inner();
        let mut sink = state.sink.ok_or(CsvError::Closed)?;
        sink.flush()?;
        Ok(sink)
    }

    fn render_field(
        &self,
        value: Option<&str>,
        row_number: usize,
        out: &mut String,
    ) -> Result<(), CsvError> {
        let Some(value) = value else {
            out.push_str(self.config.null_string.as_deref().unwrap_or(""));
            return Ok(());
        };

        match self.config.quote {
            Some(quote) if self.needs_quotes(value) => {
                out.push(quote);
                for c in value.chars() {
                    if c == quote {
                        out.push(self.config.escape.unwrap_or(quote));
                    } else if Some(c) == self.config.escape {
                        out.push(c);
                    }
                    out.push(c);
                }
                out.push(quote);
            }
            Some(_) => out.push_str(value),
            None => self.render_unquoted(value, row_number, out)?,
        }
        Ok(())
    }

    fn render_unquoted(
        &self,
        value: &str,
        row_number: usize,
        out: &mut String,
    ) -> Result<(), CsvError> {
        let separator = self.config.separator;
        let Some(escape) = self.config.escape else {
            if value.contains(|c: char| c == separator || c == '\r' || c == '\n') {
                return Err(CsvError::format(
                    row_number,
                    "value contains a separator or line break but quoting and escaping are disabled",
                ));
            }
            out.push_str(value);
            return Ok(());
        };

        let mut chars = value.chars().peekable();
        while let Some(c) = chars.next() {
            if c == separator || c == escape || c == '\n' {
                out.push(escape);
            } else if c == '\r' {
                out.push(escape);
                if chars.peek() == Some(&'\n') {
                    chars.next();
                    out.push_str("\r\n");
                    continue;
                }
            }
            out.push(c);
        }
        Ok(())
    }

    fn needs_quotes(&self, value: &str) -> bool {
        match self.config.quote_policy {
            QuotePolicy::All => true,
            QuotePolicy::Minimal => {
                let separator = self.config.separator;
                let quote = self.config.quote;
                let escape = self.config.escape;

                self.config.is_null_string(value)
                    || value.starts_with(char::is_whitespace)
                    || value.ends_with(char::is_whitespace)
                    || value.chars().any(|c| {
                        c == separator
                            || c == '\r'
                            || c == '\n'
                            || Some(c) == quote
                            || Some(c) == escape
                    })
            }
        }
    }
}

impl CsvWriter<BufWriter<File>> {
    pub fn from_path<P: AsRef<Path>>(path: P, config: &CsvConfig) -> Result<Self, CsvError> {
        Self::new(BufWriter::new(File::create(path)?), config)
    }
}

impl<W: Write> ItemWriter<Row> for CsvWriter<W> {
    fn write(&self, items: &[Row]) -> ItemWriterResult {
        for row in items {
            self.write_values(row)?;
        }
        Ok(())
    }

    fn flush(&self) -> ItemWriterResult {
        CsvWriter::flush(self)
    }

    fn close(&self) -> ItemWriterResult {
        CsvWriter::close(self)
    }
}
