#![cfg_attr(docsrs, feature(doc_cfg))]
//#![warn(missing_docs)]

/*!
 # CSV batch toolkit for Rust

 Reads and writes delimiter-separated values (CSV, TSV, ...) one row at a time, maps
 rows to typed records and back, and filters rows or records with composable
 predicates. Every reader and writer plugs into a chunk-oriented step, so a load
 can be filtered, transformed and written in a few lines.

 ## Core Concepts

- **CsvConfig:** separator, quote and escape characters, quote policy, null
  sentinel, whitespace trimming and line skipping rules.
- **CsvReader / CsvWriter:** the token layer. Quoted fields may span several
  physical lines; whatever the writer produces reads back unchanged.
- **RowMapper / RowRenderer:** convert rows to items and back. Items can be raw
  rows, position-keyed maps, header-keyed rows or [`Record`](mapping::record::Record)s
  described by a [`ColumnMapping`](mapping::column::ColumnMapping).
- **Predicate:** a tree of comparisons, ranges, null checks and AND/OR/NOT over
  column positions, header names or record fields.
- **ItemReader / ItemProcessor / ItemWriter / Step:** the batch plumbing moving
  items from a reader to a writer in chunks.

 ## Features

| **Feature**   | **Description**                                               |
|---------------|---------------------------------------------------------------|
| json          | Enables loading and saving `CsvConfig` as JSON                |
| logger        | Enables a logger `ItemWriter`, useful for debugging purposes  |
| full          | Enables all available features                                |

 ## Getting Started

```rust
# use csv_batch_rs::{
#     core::step::{StepBuilder, StepStatus},
#     error::CsvError,
#     filter::{
#         predicate::{Predicate, Target},
#         processor::RecordFilterProcessor,
#     },
#     impl_record,
#     item::csv::{
#         config::CsvConfig, item_reader::CsvItemReaderBuilder,
#         item_writer::CsvItemWriterBuilder,
#     },
#     mapping::record_mapping::RecordMapping,
# };
# use std::env::temp_dir;
#[derive(Debug, Default, Clone)]
struct Car {
    year: i64,
    make: String,
    model: String,
}

impl_record!(Car { year: i64, make: String, model: String });

fn main() -> Result<(), CsvError> {
    let csv = "year;make;model
1948;Porsche;356
1995;Peugeot;205
2021;Mazda;CX-30
1967;Ford;\"Mustang; fastback\"";

    let config = CsvConfig::new().separator(';');

    let reader = CsvItemReaderBuilder::new()
        .config(config)
        .has_headers(true)
        .from_reader(csv.as_bytes(), RecordMapping::<Car>::derived()?)?;

    let processor = RecordFilterProcessor::new(Predicate::lt(Target::field("year"), 2000));

    let writer = CsvItemWriterBuilder::new()
        .has_headers(true)
        .from_path(temp_dir().join("cars.csv"), RecordMapping::<Car>::derived()?)?;

    let step = StepBuilder::new()
        .name("old-cars")
        .reader(&reader)
        .processor(&processor)
        .writer(&writer)
        .chunk(2)
        .skip_limit(2)
        .build()?;

    let execution = step.execute();

    assert_eq!(execution.status, StepStatus::Success);
    assert_eq!(execution.write_count, 3);

    Ok(())
}
```

 ## License
 Licensed under either of

 -   Apache License, Version 2.0
     ([LICENSE-APACHE](LICENSE-APACHE) or <http://www.apache.org/licenses/LICENSE-2.0>)
 -   MIT license
     ([LICENSE-MIT](LICENSE-MIT) or <http://opensource.org/licenses/MIT>)

 at your option.
 */

/// Core module for batch operations
pub mod core;

/// Error types
pub mod error;

#[doc(inline)]
pub use error::*;

/// Row and record filtering
pub mod filter;

/// CSV readers and writers
pub mod item;

/// Row to item mapping and value conversion
pub mod mapping;
