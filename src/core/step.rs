use std::time::{Duration, Instant};

use log::{debug, error, info};
use uuid::Uuid;

use crate::error::CsvError;

use super::{
    build_name,
    item::{ItemProcessor, ItemReader, ItemWriter},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Success,
    /// Too many read errors, or the reader could not be used.
    ReadError,
    ProcessorError,
    /// Too many write errors, or the writer could not be opened or closed.
    WriteError,
}

/// Outcome and counters of one step run.
#[derive(Debug)]
pub struct StepExecution {
    pub id: Uuid,
    pub name: String,
    pub status: StepStatus,
    pub start: Instant,
    pub end: Instant,
    pub duration: Duration,
    pub read_count: usize,
    /// Items the processor dropped.
    pub filter_count: usize,
    pub write_count: usize,
    pub read_error_count: usize,
    pub process_error_count: usize,
    pub write_error_count: usize,
}

impl StepExecution {
    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success
    }

    /// Turns an unsuccessful run into [`CsvError::Step`].
    pub fn into_result(self) -> Result<Self, CsvError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(CsvError::Step(self.name))
        }
    }
}

#[derive(Default)]
struct Counters {
    read: usize,
    filtered: usize,
    written: usize,
    read_errors: usize,
    process_errors: usize,
    write_errors: usize,
}

impl Counters {
    fn errors(&self) -> usize {
        self.read_errors + self.process_errors + self.write_errors
    }
}

/// Reads items, passes them through a processor and writes them in chunks.
///
/// Errors are counted and logged; the step stops with an error status once
/// their total exceeds the skip limit.
///
/// # Examples
///
/// ```
/// use csv_batch_rs::core::step::{StepBuilder, StepStatus};
/// use csv_batch_rs::filter::{
///     predicate::{Predicate, Target},
///     processor::RowFilterProcessor,
/// };
/// use csv_batch_rs::item::csv::{config::CsvConfig, csv_reader::CsvReader, csv_writer::CsvWriter};
///
/// let input = "1,keep\n2,drop\n3,keep\n";
/// let config = CsvConfig::new().line_separator("\n");
///
/// let reader = CsvReader::from_reader(input.as_bytes(), &config).unwrap();
/// let processor = RowFilterProcessor::new(Predicate::eq(Target::Position(1), "keep"));
/// let writer = CsvWriter::new(Vec::new(), &config).unwrap();
///
/// let step = StepBuilder::new()
///     .name("copy")
///     .reader(&reader)
///     .processor(&processor)
///     .writer(&writer)
///     .chunk(2)
///     .build()
///     .unwrap();
///
/// let execution = step.execute();
/// assert_eq!(execution.status, StepStatus::Success);
/// assert_eq!(execution.read_count, 3);
/// assert_eq!(execution.filter_count, 1);
/// assert_eq!(execution.write_count, 2);
/// ```
pub struct Step<'a, R, W> {
    id: Uuid,
    name: String,
    reader: &'a dyn ItemReader<R>,
    processor: &'a dyn ItemProcessor<R, W>,
    writer: &'a dyn ItemWriter<W>,
    chunk_size: usize,
    skip_limit: usize,
}

impl<R, W> Step<'_, R, W> {
    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn get_id(&self) -> Uuid {
        self.id
    }

    pub fn execute(&self) -> StepExecution {
        let start = Instant::now();
        let mut counters = Counters::default();

        info!("Start of step: {}, id: {}", self.name, self.id);

        let status = match self.writer.open() {
            Ok(()) => self.run_chunks(&mut counters),
            Err(err) => {
                error!("Cannot open writer of step {}: {}", self.name, err);
                StepStatus::WriteError
            }
        };

        let status = match self.writer.close() {
            Ok(()) => status,
            Err(err) => {
                error!("Cannot close writer of step {}: {}", self.name, err);
                if status == StepStatus::Success {
                    StepStatus::WriteError
                } else {
                    status
                }
            }
        };

        info!(
            "End of step: {}, id: {}, status: {:?}",
            self.name, self.id, status
        );

        StepExecution {
            id: self.id,
            name: self.name.clone(),
            status,
            start,
            end: Instant::now(),
            duration: start.elapsed(),
            read_count: counters.read,
            filter_count: counters.filtered,
            write_count: counters.written,
            read_error_count: counters.read_errors,
            process_error_count: counters.process_errors,
            write_error_count: counters.write_errors,
        }
    }

    fn run_chunks(&self, counters: &mut Counters) -> StepStatus {
        let mut read_items: Vec<R> = Vec::with_capacity(self.chunk_size);

        loop {
            let finished = match self.read_chunk(&mut read_items, counters) {
                Ok(finished) => finished,
                Err(status) => return status,
            };

            let processed_items = match self.process_chunk(&read_items, counters) {
                Ok(items) => items,
                Err(status) => return status,
            };

            if let Err(status) = self.write_chunk(&processed_items, counters) {
                return status;
            }

            if finished {
                return StepStatus::Success;
            }
        }
    }

    fn is_skip_limit_reached(&self, counters: &Counters) -> bool {
        counters.errors() > self.skip_limit
    }

    /// Fills `read_items`; `Ok(true)` once the reader is exhausted.
    fn read_chunk(&self, read_items: &mut Vec<R>, counters: &mut Counters) -> Result<bool, StepStatus> {
        debug!("Start reading chunk");
        read_items.clear();

        while read_items.len() < self.chunk_size {
            match self.reader.read() {
                Ok(Some(item)) => {
                    read_items.push(item);
                    counters.read += 1;
                }
                Ok(None) => {
                    debug!("End reading chunk: FINISHED");
                    return Ok(true);
                }
                Err(err) => {
                    counters.read_errors += 1;
                    error!("Error occurred during read item: {}", err);
                    if is_fatal(&err) || self.is_skip_limit_reached(counters) {
                        return Err(StepStatus::ReadError);
                    }
                }
            }
        }

        debug!("End reading chunk: FULL");
        Ok(false)
    }

    fn process_chunk(&self, read_items: &[R], counters: &mut Counters) -> Result<Vec<W>, StepStatus> {
        debug!("Start processing chunk");
        let mut processed_items = Vec::with_capacity(read_items.len());

        for item in read_items {
            match self.processor.process(item) {
                Ok(Some(processed)) => processed_items.push(processed),
                Ok(None) => counters.filtered += 1,
                Err(err) => {
                    counters.process_errors += 1;
                    error!("Error occurred during process item: {}", err);
                    if self.is_skip_limit_reached(counters) {
                        return Err(StepStatus::ProcessorError);
                    }
                }
            }
        }

        debug!("End processing chunk");
        Ok(processed_items)
    }

    fn write_chunk(&self, processed_items: &[W], counters: &mut Counters) -> Result<(), StepStatus> {
        if processed_items.is_empty() {
            return Ok(());
        }
        debug!("Start writing chunk");

        match self.writer.write(processed_items).and_then(|()| self.writer.flush()) {
            Ok(()) => {
                counters.written += processed_items.len();
                debug!("End writing chunk");
                Ok(())
            }
            Err(err) => {
                counters.write_errors += processed_items.len();
                error!("ItemWriter error: {}", err);
                if is_fatal(&err) || self.is_skip_limit_reached(counters) {
                    Err(StepStatus::WriteError)
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// Errors that cannot go away by skipping the item.
fn is_fatal(err: &CsvError) -> bool {
    matches!(err, CsvError::Closed | CsvError::Io(_) | CsvError::Config(_))
}

/// Builder for [`Step`]. Reader, processor and writer are required.
pub struct StepBuilder<'a, R, W> {
    name: Option<String>,
    reader: Option<&'a dyn ItemReader<R>>,
    processor: Option<&'a dyn ItemProcessor<R, W>>,
    writer: Option<&'a dyn ItemWriter<W>>,
    chunk_size: usize,
    skip_limit: usize,
}

impl<R, W> Default for StepBuilder<'_, R, W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, R, W> StepBuilder<'a, R, W> {
    pub fn new() -> Self {
        Self {
            name: None,
            reader: None,
            processor: None,
            writer: None,
            chunk_size: 1,
            skip_limit: 0,
        }
    }

    /// Name used in logs; a random one is generated when unset.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn reader(mut self, reader: &'a impl ItemReader<R>) -> Self {
        self.reader = Some(reader);
        self
    }

    pub fn processor(mut self, processor: &'a impl ItemProcessor<R, W>) -> Self {
        self.processor = Some(processor);
        self
    }

    pub fn writer(mut self, writer: &'a impl ItemWriter<W>) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn chunk(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Number of failed items tolerated before the step stops.
    pub fn skip_limit(mut self, skip_limit: usize) -> Self {
        self.skip_limit = skip_limit;
        self
    }

    pub fn build(self) -> Result<Step<'a, R, W>, CsvError> {
        let missing = |what: &str| CsvError::Config(format!("step needs a {}", what));

        if self.chunk_size == 0 {
            return Err(CsvError::Config("chunk size must be at least 1".to_string()));
        }

        Ok(Step {
            id: Uuid::new_v4(),
            name: self.name.unwrap_or_else(build_name),
            reader: self.reader.ok_or_else(|| missing("reader"))?,
            processor: self.processor.ok_or_else(|| missing("processor"))?,
            writer: self.writer.ok_or_else(|| missing("writer"))?,
            chunk_size: self.chunk_size,
            skip_limit: self.skip_limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use super::*;
    use crate::core::item::{ItemProcessorResult, ItemReaderResult, ItemWriterResult, PassThroughProcessor};

    struct VecReader {
        items: RefCell<Vec<Result<i64, CsvError>>>,
    }

    impl VecReader {
        fn new(mut items: Vec<Result<i64, CsvError>>) -> Self {
            items.reverse();
            Self {
                items: RefCell::new(items),
            }
        }
    }

    impl ItemReader<i64> for VecReader {
        fn read(&self) -> ItemReaderResult<i64> {
            self.items.borrow_mut().pop().transpose()
        }
    }

    #[derive(Default)]
    struct VecWriter {
        items: RefCell<Vec<i64>>,
        chunks: Cell<usize>,
    }

    impl ItemWriter<i64> for VecWriter {
        fn write(&self, items: &[i64]) -> ItemWriterResult {
            self.items.borrow_mut().extend_from_slice(items);
            self.chunks.set(self.chunks.get() + 1);
            Ok(())
        }
    }

    struct EvenProcessor;

    impl ItemProcessor<i64, i64> for EvenProcessor {
        fn process(&self, item: &i64) -> ItemProcessorResult<i64> {
            if *item < 0 {
                return Err(CsvError::Conversion(format!("negative item {}", item)));
            }
            Ok((item % 2 == 0).then_some(*item))
        }
    }

    fn format_error() -> CsvError {
        CsvError::Format {
            line: 1,
            message: "bad row".to_string(),
        }
    }

    #[test]
    fn should_write_in_chunks() -> Result<(), CsvError> {
        let reader = VecReader::new((1..=5).map(Ok).collect());
        let writer = VecWriter::default();

        let step = StepBuilder::new()
            .name("numbers")
            .reader(&reader)
            .processor(&PassThroughProcessor)
            .writer(&writer)
            .chunk(2)
            .build()?;
        let execution = step.execute();

        assert!(execution.is_success());
        assert_eq!(execution.name, "numbers");
        assert_eq!(execution.read_count, 5);
        assert_eq!(execution.write_count, 5);
        assert_eq!(writer.chunks.get(), 3);
        assert_eq!(*writer.items.borrow(), vec![1, 2, 3, 4, 5]);
        Ok(())
    }

    #[test]
    fn processor_should_filter_and_count_errors() -> Result<(), CsvError> {
        let reader = VecReader::new(vec![Ok(1), Ok(2), Ok(-3), Ok(4)]);
        let writer = VecWriter::default();

        let step = StepBuilder::new()
            .reader(&reader)
            .processor(&EvenProcessor)
            .writer(&writer)
            .chunk(10)
            .skip_limit(1)
            .build()?;
        let execution = step.execute();

        assert_eq!(execution.status, StepStatus::Success);
        assert_eq!(execution.filter_count, 1);
        assert_eq!(execution.process_error_count, 1);
        assert_eq!(*writer.items.borrow(), vec![2, 4]);
        Ok(())
    }

    #[test]
    fn read_errors_beyond_skip_limit_should_fail_step() -> Result<(), CsvError> {
        let reader = VecReader::new(vec![Ok(1), Err(format_error()), Err(format_error()), Ok(2)]);
        let writer = VecWriter::default();

        let step = StepBuilder::new()
            .reader(&reader)
            .processor(&PassThroughProcessor)
            .writer(&writer)
            .skip_limit(1)
            .build()?;
        let execution = step.execute();

        assert_eq!(execution.status, StepStatus::ReadError);
        assert_eq!(execution.read_error_count, 2);
        assert_eq!(*writer.items.borrow(), vec![1]);
        assert!(matches!(execution.into_result(), Err(CsvError::Step(_))));
        Ok(())
    }

    #[test]
    fn build_should_require_components() {
        let reader = VecReader::new(vec![]);

        let result = StepBuilder::<i64, i64>::new().reader(&reader).build();

        assert!(matches!(result, Err(CsvError::Config(_))));
    }
}
