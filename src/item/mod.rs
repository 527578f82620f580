/// This module provides the CSV tokenizer, writer, item reader and item writer.
pub mod csv;

#[cfg(feature = "logger")]
/// This module provides a logger item writer, useful for debugging pipelines.
pub mod logger;
