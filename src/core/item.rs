use crate::error::CsvError;

/// Result of a single read: `Ok(None)` once the source is exhausted.
pub type ItemReaderResult<R> = Result<Option<R>, CsvError>;

/// Result of processing an item: `Ok(None)` drops the item.
pub type ItemProcessorResult<W> = Result<Option<W>, CsvError>;

pub type ItemWriterResult = Result<(), CsvError>;

/// A source of items, read one at a time.
pub trait ItemReader<R> {
    /// Reads the next item.
    ///
    /// # Returns
    /// - `Ok(Some(item))` when an item was read
    /// - `Ok(None)` when there are no more items
    /// - `Err(CsvError)` when reading or mapping failed
    fn read(&self) -> ItemReaderResult<R>;
}

/// Transforms or drops an item between reading and writing.
pub trait ItemProcessor<R, W> {
    fn process(&self, item: &R) -> ItemProcessorResult<W>;
}

/// A sink of items, written one chunk at a time.
pub trait ItemWriter<W> {
    fn write(&self, items: &[W]) -> ItemWriterResult;

    fn flush(&self) -> ItemWriterResult {
        Ok(())
    }

    fn open(&self) -> ItemWriterResult {
        Ok(())
    }

    fn close(&self) -> ItemWriterResult {
        Ok(())
    }
}

/// Processor forwarding every item unchanged.
#[derive(Default)]
pub struct PassThroughProcessor;

impl<R: Clone> ItemProcessor<R, R> for PassThroughProcessor {
    fn process(&self, item: &R) -> ItemProcessorResult<R> {
        Ok(Some(item.clone()))
    }
}
