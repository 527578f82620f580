//! CSV support for reading and writing delimited text.
//!
//! This module provides a streaming tokenizer and writer with configurable separator,
//! quote and escape characters, plus item readers and writers that map rows to
//! records, maps or plain rows.
//!
//! # Module Architecture
//!
//! The CSV module is layered:
//!
//! 1. **CsvConfig**: separator, quote, escape, quote policy, null sentinel,
//!    trimming and line-skipping rules shared by both directions.
//!
//! 2. **CsvReader / CsvWriter**: the token layer. The reader turns a character
//!    stream into rows of optional strings, following quoted fields across
//!    physical lines; the writer is its mirror image, so whatever it writes
//!    reads back unchanged with the same configuration.
//!
//! 3. **CsvItemReader / CsvItemWriter**: the item layer. A [`RowMapper`] or
//!    [`RowRenderer`] converts between rows and items, and optional filters drop
//!    rows or items on the way.
//!
//! All of them implement the core `ItemReader` and `ItemWriter` traits, so they
//! plug into a [`Step`](crate::core::step::Step).
//!
//! # Null values
//!
//! A null field is written as the configured null sentinel, never quoted. On
//! read, an unquoted field equal to the sentinel is null. Without a sentinel, an
//! unquoted empty field is null and a quoted empty field (`""`) is the empty string.
//!
//! # Examples
//!
//! ## Reading rows
//!
//! ```
//! use csv_batch_rs::item::csv::{config::CsvConfig, csv_reader::CsvReader};
//!
//! let data = "# exported\nid;name\n1;\"Smith; John\"\n2;NULL\n";
//! let config = CsvConfig::new()
//!     .separator(';')
//!     .null_string("NULL")
//!     .ignore_line_pattern("#.*");
//!
//! let reader = CsvReader::from_reader(data.as_bytes(), &config).unwrap();
//!
//! let header = reader.read_values().unwrap().unwrap();
//! assert_eq!(header, vec![Some("id".to_string()), Some("name".to_string())]);
//!
//! let first = reader.read_values().unwrap().unwrap();
//! assert_eq!(first[1].as_deref(), Some("Smith; John"));
//!
//! let second = reader.read_values().unwrap().unwrap();
//! assert_eq!(second[1], None);
//! ```
//!
//! ## Loading and saving records
//!
//! ```
//! use csv_batch_rs::impl_record;
//! use csv_batch_rs::item::csv::{
//!     config::{CsvConfig, QuotePolicy},
//!     item_reader::CsvItemReaderBuilder,
//!     item_writer::CsvItemWriterBuilder,
//!     load, save,
//! };
//! use csv_batch_rs::mapping::record_mapping::RecordMapping;
//!
//! #[derive(Debug, Default, Clone, PartialEq)]
//! struct Person {
//!     name: String,
//!     age: Option<i64>,
//! }
//!
//! impl_record!(Person { name: String, age: Option<i64> });
//!
//! let config = CsvConfig::new()
//!     .quote_policy(QuotePolicy::Minimal)
//!     .line_separator("\n");
//!
//! let people = vec![
//!     Person { name: "Alice".into(), age: Some(28) },
//!     Person { name: "Bob, Jr.".into(), age: None },
//! ];
//!
//! let writer = CsvItemWriterBuilder::new()
//!     .config(config.clone())
//!     .has_headers(true)
//!     .from_writer(Vec::new(), RecordMapping::<Person>::derived().unwrap())
//!     .unwrap();
//! save(&writer, &people).unwrap();
//! let output = String::from_utf8(writer.into_inner().unwrap()).unwrap();
//! assert_eq!(output, "name,age\nAlice,28\n\"Bob, Jr.\",\n");
//!
//! let reader = CsvItemReaderBuilder::new()
//!     .config(config)
//!     .has_headers(true)
//!     .from_reader(output.as_bytes(), RecordMapping::<Person>::derived().unwrap())
//!     .unwrap();
//! assert_eq!(load(&reader).unwrap(), people);
//! ```

use std::io::{BufRead, Write};

use crate::{
    error::CsvError,
    mapping::{RowMapper, RowRenderer},
};

use self::{item_reader::CsvItemReader, item_writer::CsvItemWriter};

/// One logical row: field values in column order, `None` for null fields.
pub type Row = Vec<Option<String>>;

/// Tokenizer and writer configuration.
pub mod config;

/// A parsed field with its source position.
pub mod token;

/// A module providing the CSV tokenizer.
pub mod csv_reader;

/// A module providing the CSV row writer.
pub mod csv_writer;

/// A module providing facilities for reading CSV data as items.
pub mod item_reader;

/// A module providing facilities for writing items as CSV data.
pub mod item_writer;

/// Reads every remaining item of `reader`.
pub fn load<R: BufRead, M: RowMapper>(
    reader: &CsvItemReader<R, M>,
) -> Result<Vec<M::Item>, CsvError> {
    let mut items = Vec::new();
    while let Some(item) = reader.read_item()? {
        items.push(item);
    }
    Ok(items)
}

/// Writes `items` to `writer`, header included, and flushes it. The writer stays open.
pub fn save<W: Write, M: RowRenderer>(
    writer: &CsvItemWriter<W, M>,
    items: &[M::Item],
) -> Result<(), CsvError> {
    writer.open()?;
    writer.write_items(items)?;
    writer.flush()
}
