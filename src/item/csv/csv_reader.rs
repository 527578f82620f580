use std::{
    fs::File,
    io::{self, BufRead, BufReader, Read},
    mem,
    path::Path,
};

use log::debug;
use parking_lot::Mutex;
use regex::Regex;

use crate::{
    core::item::{ItemReader, ItemReaderResult},
    error::CsvError,
};

use super::{Row, config::CsvConfig, token::CsvToken};

/// A physical line without its terminator.
struct PhysicalLine {
    text: String,
    /// `"\n"`, `"\r"`, `"\r\n"`, or empty for a last line without terminator.
    terminator: &'static str,
}

/// Splits a byte stream into physical lines ending at LF, CR or CRLF.
struct LineSource<R> {
    inner: R,
    first: bool,
}

impl<R: BufRead> LineSource<R> {
    fn new(inner: R) -> Self {
        Self { inner, first: true }
    }

    fn next_line(&mut self) -> io::Result<Option<PhysicalLine>> {
        let mut bytes = Vec::new();
        let terminator;

        loop {
            let (consumed, found) = {
                let buf = self.inner.fill_buf()?;
                if buf.is_empty() {
                    if bytes.is_empty() {
                        return Ok(None);
                    }
                    terminator = "";
                    break;
                }
                match buf.iter().position(|b| *b == b'\n' || *b == b'\r') {
                    Some(i) => {
                        bytes.extend_from_slice(&buf[..i]);
                        (i + 1, Some(buf[i]))
                    }
                    None => {
                        bytes.extend_from_slice(buf);
                        (buf.len(), None)
                    }
                }
            };
            self.inner.consume(consumed);

            match found {
                Some(b'\n') => {
                    terminator = "\n";
                    break;
                }
                Some(_) => {
                    let lf = self.inner.fill_buf()?.first() == Some(&b'\n');
                    if lf {
                        self.inner.consume(1);
                        terminator = "\r\n";
                    } else {
                        terminator = "\r";
                    }
                    break;
                }
                None => continue,
            }
        }

        let mut text = String::from_utf8(bytes)
            .map_err(|error| io::Error::new(io::ErrorKind::InvalidData, error))?;
        if self.first {
            self.first = false;
            if let Some(stripped) = text.strip_prefix('\u{feff}') {
                text = stripped.to_string();
            }
        }

        Ok(Some(PhysicalLine { text, terminator }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum FieldState {
    Start,
    Unquoted,
    Quoted,
    QuoteClosed,
}

enum Feed {
    Done,
    NeedMore,
}

/// Accumulates the tokens of one logical row, fed one physical line at a time.
struct RowTokenizer<'a> {
    config: &'a CsvConfig,
    line: usize,
    state: FieldState,
    field: String,
    enclosed: bool,
    quoted_len: usize,
    field_start_line: usize,
    tokens: Vec<CsvToken>,
}

impl<'a> RowTokenizer<'a> {
    fn new(config: &'a CsvConfig, line: usize) -> Self {
        Self {
            config,
            line,
            state: FieldState::Start,
            field: String::new(),
            enclosed: false,
            quoted_len: 0,
            field_start_line: line,
            tokens: Vec::new(),
        }
    }

    fn feed(&mut self, text: &str, terminator: &str) -> Feed {
        let separator = self.config.separator;
        let quote = self.config.quote;
        let escape = self.config.escape;
        let chars: Vec<char> = text.chars().collect();
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            match self.state {
                FieldState::Start => {
                    if c == separator {
                        self.end_field();
                    } else if self.config.ignore_leading_whitespaces && c.is_whitespace() {
                        // skipped
                    } else if Some(c) == quote {
                        self.enclosed = true;
                        self.state = FieldState::Quoted;
                    } else {
                        self.state = FieldState::Unquoted;
                        continue;
                    }
                }
                FieldState::Unquoted => {
                    if c == separator {
                        self.end_field();
                    } else if quote.is_none() && Some(c) == escape {
                        match chars.get(i + 1) {
                            Some(&next) if next == separator || Some(next) == escape => {
                                self.field.push(next);
                                i += 1;
                            }
                            Some(_) => self.field.push(c),
                            None if terminator.is_empty() => self.field.push(c),
                            None => {
                                self.field.push_str(terminator);
                                return Feed::NeedMore;
                            }
                        }
                    } else {
                        self.field.push(c);
                    }
                }
                FieldState::Quoted => {
                    if Some(c) == escape {
                        match chars.get(i + 1) {
                            Some(&next) => {
                                self.field.push(next);
                                i += 1;
                            }
                            None => {
                                self.push_break(terminator);
                                return Feed::NeedMore;
                            }
                        }
                    } else if Some(c) == quote {
                        if chars.get(i + 1) == Some(&c) {
                            self.field.push(c);
                            i += 1;
                        } else {
                            self.state = FieldState::QuoteClosed;
                            self.quoted_len = self.field.len();
                        }
                    } else {
                        self.field.push(c);
                    }
                }
                FieldState::QuoteClosed => {
                    if c == separator {
                        self.end_field();
                    } else {
                        self.field.push(c);
                    }
                }
            }
            i += 1;
        }

        if self.state == FieldState::Quoted {
            self.push_break(terminator);
            return Feed::NeedMore;
        }
        self.end_field();
        Feed::Done
    }

    fn push_break(&mut self, terminator: &str) {
        match &self.config.break_string {
            Some(replacement) if !terminator.is_empty() => self.field.push_str(replacement),
            _ => self.field.push_str(terminator),
        }
    }

    fn end_field(&mut self) {
        let mut value = mem::take(&mut self.field);

        if self.config.ignore_trailing_whitespaces {
            let keep = if self.enclosed { self.quoted_len } else { 0 };
            let trimmed = keep + value[keep..].trim_end().len();
            value.truncate(trimmed);
        }

        let value = if !self.enclosed && self.config.is_null_string(&value) {
            None
        } else {
            Some(value)
        };

        self.tokens.push(CsvToken::new(
            value,
            self.field_start_line,
            self.line,
            self.enclosed,
        ));

        self.state = FieldState::Start;
        self.enclosed = false;
        self.quoted_len = 0;
        self.field_start_line = self.line;
    }
}

struct ReaderState<R> {
    source: Option<LineSource<R>>,
    line_number: usize,
    start_line_number: usize,
    end_line_number: usize,
    skipped: usize,
    columns: Option<usize>,
}

impl<R: BufRead> ReaderState<R> {
    fn next_row(
        &mut self,
        config: &CsvConfig,
        ignore_patterns: &[Regex],
    ) -> Result<Option<Vec<CsvToken>>, CsvError> {
        let source = self.source.as_mut().ok_or(CsvError::Closed)?;

        let mut line = loop {
            let Some(line) = source.next_line()? else {
                return Ok(None);
            };
            self.line_number += 1;

            if self.skipped < config.skip_lines {
                self.skipped += 1;
                debug!("Skipping line {}", self.line_number);
                continue;
            }
            if config.ignore_empty_lines && line.text.is_empty() {
                debug!("Ignoring empty line {}", self.line_number);
                continue;
            }
            if ignore_patterns.iter().any(|p| p.is_match(&line.text)) {
                debug!("Ignoring line {} matching an ignore pattern", self.line_number);
                continue;
            }
            break line;
        };

        let start_line = self.line_number;
        let mut tokenizer = RowTokenizer::new(config, start_line);
        loop {
            match tokenizer.feed(&line.text, line.terminator) {
                Feed::Done => break,
                Feed::NeedMore => match source.next_line()? {
                    Some(next) => {
                        self.line_number += 1;
                        tokenizer.line = self.line_number;
                        line = next;
                    }
                    None => {
                        return Err(CsvError::format(
                            tokenizer.field_start_line,
                            "unterminated quoted field",
                        ));
                    }
                },
            }
        }

        let tokens = tokenizer.tokens;
        self.start_line_number = start_line;
        self.end_line_number = self.line_number;

        if !config.variable_columns {
            let expected = *self.columns.get_or_insert(tokens.len());
            if tokens.len() != expected {
                return Err(CsvError::format(
                    start_line,
                    format!("expected {} columns but found {}", expected, tokens.len()),
                ));
            }
        }

        Ok(Some(tokens))
    }
}

/// The tokenizer: turns a character stream into logical rows.
///
/// A logical row may span several physical lines when a quoted field embeds line
/// breaks. Skip lines, empty lines and ignore patterns are applied to raw physical
/// lines before tokenization.
///
/// All cursor state sits behind a mutex, so a reader can be shared between threads;
/// concurrent calls are serialized.
///
/// # Examples
///
/// ```
/// use csv_batch_rs::item::csv::{config::CsvConfig, csv_reader::CsvReader};
///
/// let data = "\"aaa\",\"b\nb\\\\b\",\"c\\\"cc\"\r\nzzz,yyy,NULL\r\n";
/// let config = CsvConfig::new().null_string("NULL");
/// let reader = CsvReader::from_reader(data.as_bytes(), &config).unwrap();
///
/// let row = reader.read_values().unwrap().unwrap();
/// assert_eq!(row, vec![Some("aaa".into()), Some("b\nb\\b".into()), Some("c\"cc".into())]);
/// assert_eq!(reader.start_line_number(), 1);
/// assert_eq!(reader.end_line_number(), 2);
///
/// let row = reader.read_values().unwrap().unwrap();
/// assert_eq!(row, vec![Some("zzz".into()), Some("yyy".into()), None]);
///
/// assert!(reader.read_values().unwrap().is_none());
/// ```
pub struct CsvReader<R> {
    config: CsvConfig,
    ignore_patterns: Vec<Regex>,
    state: Mutex<ReaderState<R>>,
}

impl<R: BufRead> CsvReader<R> {
    /// Creates a tokenizer over a buffered reader after validating `config`.
    pub fn new(reader: R, config: &CsvConfig) -> Result<Self, CsvError> {
        config.validate()?;
        let ignore_patterns = config.compile_ignore_patterns()?;

        Ok(Self {
            config: config.clone(),
            ignore_patterns,
            state: Mutex::new(ReaderState {
                source: Some(LineSource::new(reader)),
                line_number: 0,
                start_line_number: 0,
                end_line_number: 0,
                skipped: 0,
                columns: None,
            }),
        })
    }

    /// Reads the next logical row as tokens, or `None` at end of stream.
    pub fn read_tokens(&self) -> Result<Option<Vec<CsvToken>>, CsvError> {
        let mut state = self.state.lock();
        state.next_row(&self.config, &self.ignore_patterns)
    }

    /// Reads the next logical row as field values, or `None` at end of stream.
    pub fn read_values(&self) -> Result<Option<Row>, CsvError> {
        Ok(self
            .read_tokens()?
            .map(|tokens| tokens.into_iter().map(CsvToken::into_value).collect()))
    }

    pub fn config(&self) -> &CsvConfig {
        &self.config
    }

    /// Number of physical lines consumed so far.
    pub fn line_number(&self) -> usize {
        self.state.lock().line_number
    }

    /// Physical line where the last row started.
    pub fn start_line_number(&self) -> usize {
        self.state.lock().start_line_number
    }

    /// Physical line where the last row ended.
    pub fn end_line_number(&self) -> usize {
        self.state.lock().end_line_number
    }

    /// Releases the underlying stream. Closing twice is a no-op; reading afterwards fails.
    pub fn close(&self) -> Result<(), CsvError> {
        let mut state = self.state.lock();
        if state.source.take().is_some() {
            debug!("Closed CSV reader after {} lines", state.line_number);
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().source.is_none()
    }
}

impl<R: Read> CsvReader<BufReader<R>> {
    pub fn from_reader(reader: R, config: &CsvConfig) -> Result<Self, CsvError> {
        Self::new(BufReader::new(reader), config)
    }
}

impl CsvReader<BufReader<File>> {
    pub fn from_path<P: AsRef<Path>>(path: P, config: &CsvConfig) -> Result<Self, CsvError> {
        Self::new(BufReader::new(File::open(path)?), config)
    }
}

impl<R: BufRead> ItemReader<Row> for CsvReader<R> {
    fn read(&self) -> ItemReaderResult<Row> {
        self.read_values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(data: &str, config: &CsvConfig) -> Vec<Row> {
        let reader = CsvReader::from_reader(data.as_bytes(), config).unwrap();
        let mut rows = Vec::new();
        while let Some(row) = reader.read_values().unwrap() {
            rows.push(row);
        }
        rows
    }

    fn text(values: &[&str]) -> Row {
        values.iter().map(|v| Some(v.to_string())).collect()
    }

    #[test]
    fn should_read_multi_line_quoted_field() {
        let data = "\"aaa\",\"b\nb\\\\b\",\"c\\\"cc\"\r\nzzz,yyy,NULL";
        let config = CsvConfig::new().null_string("NULL");
        let reader = CsvReader::from_reader(data.as_bytes(), &config).unwrap();

        let tokens = reader.read_tokens().unwrap().unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].value.as_deref(), Some("aaa"));
        assert!(tokens[0].enclosed);
        assert_eq!(tokens[1].value.as_deref(), Some("b\nb\\b"));
        assert_eq!((tokens[1].start_line, tokens[1].end_line), (1, 2));
        assert_eq!(tokens[2].value.as_deref(), Some("c\"cc"));
        assert_eq!((reader.start_line_number(), reader.end_line_number()), (1, 2));

        let tokens = reader.read_tokens().unwrap().unwrap();
        assert_eq!(tokens[2].value, None);
        assert!(!tokens[2].enclosed);
        assert_eq!(reader.line_number(), 3);

        assert!(reader.read_tokens().unwrap().is_none());
    }

    #[test]
    fn should_accept_doubled_quotes() {
        let rows = rows("\"a\"\"b\",c\n", &CsvConfig::new());

        assert_eq!(rows, vec![text(&["a\"b", "c"])]);
    }

    #[test]
    fn should_split_on_cr_lf_and_crlf() {
        let rows = rows("a,b\rc,d\r\ne,f\ng,h", &CsvConfig::new());

        assert_eq!(
            rows,
            vec![
                text(&["a", "b"]),
                text(&["c", "d"]),
                text(&["e", "f"]),
                text(&["g", "h"])
            ]
        );
    }

    #[test]
    fn should_keep_embedded_crlf_or_replace_it_with_break_string() {
        let data = "\"x\r\ny\",z";

        assert_eq!(rows(data, &CsvConfig::new()), vec![text(&["x\r\ny", "z"])]);

        let config = CsvConfig::new().break_string(" ");
        assert_eq!(rows(data, &config), vec![text(&["x y", "z"])]);
    }

    #[test]
    fn should_skip_leading_lines() {
        let config = CsvConfig::new().skip_lines(1);
        let reader = CsvReader::from_reader("# generated\na,b\nc,d\n".as_bytes(), &config).unwrap();

        assert_eq!(reader.read_values().unwrap(), Some(text(&["a", "b"])));
        assert_eq!(reader.start_line_number(), 2);
        assert_eq!(reader.read_values().unwrap(), Some(text(&["c", "d"])));
        assert_eq!(reader.read_values().unwrap(), None);
    }

    #[test]
    fn should_ignore_empty_and_matching_lines() {
        let config = CsvConfig::new()
            .ignore_empty_lines(true)
            .ignore_line_pattern("#.*");
        let rows = rows("a,b\n\n# comment\nc,d\n", &config);

        assert_eq!(rows, vec![text(&["a", "b"]), text(&["c", "d"])]);
    }

    #[test]
    fn empty_line_should_yield_single_null_field_when_not_ignored() {
        let rows = rows("a\n\nb\n", &CsvConfig::new());

        assert_eq!(rows, vec![text(&["a"]), vec![None], text(&["b"])]);
    }

    #[test]
    fn should_trim_whitespace_outside_quotes_only() {
        let config = CsvConfig::new()
            .ignore_leading_whitespaces(true)
            .ignore_trailing_whitespaces(true);
        let rows = rows("  a  ,  \" b \"  , c\n", &config);

        assert_eq!(rows, vec![text(&["a", " b ", "c"])]);
    }

    #[test]
    fn should_keep_whitespace_without_trimming() {
        let rows = rows(" a ,b\n", &CsvConfig::new());

        assert_eq!(rows, vec![text(&[" a ", "b"])]);
    }

    #[test]
    fn should_distinguish_null_from_quoted_sentinel() {
        let config = CsvConfig::new().null_string("NULL");
        let rows = rows("NULL,\"NULL\",,\"\"\n", &config);

        assert_eq!(
            rows,
            vec![vec![
                None,
                Some("NULL".to_string()),
                Some(String::new()),
                Some(String::new())
            ]]
        );
    }

    #[test]
    fn unset_null_string_should_read_unquoted_empty_as_null() {
        let rows = rows("a,,\"\"\n", &CsvConfig::new());

        assert_eq!(rows, vec![vec![Some("a".to_string()), None, Some(String::new())]]);
    }

    #[test]
    fn null_string_may_ignore_case() {
        let config = CsvConfig::new()
            .null_string("NULL")
            .ignore_case_null_string(true);

        assert_eq!(rows("null,Null\n", &config), vec![vec![None, None]]);
    }

    #[test]
    fn escape_should_protect_separator_when_quoting_disabled() {
        let config = CsvConfig::new().no_quote();
        let rows = rows("a\\,b,c\\\\d,e\\f\n", &config);

        assert_eq!(rows, vec![text(&["a,b", "c\\d", "e\\f"])]);
    }

    #[test]
    fn escaped_line_break_should_continue_row_when_quoting_disabled() {
        let config = CsvConfig::new().no_quote();
        let reader = CsvReader::from_reader("a\\\nb,c\nd\n".as_bytes(), &config).unwrap();

        assert_eq!(reader.read_values().unwrap(), Some(text(&["a\nb", "c"])));
        assert_eq!(reader.end_line_number(), 2);
        assert_eq!(reader.read_values().unwrap(), Some(text(&["d"])));
    }

    #[test]
    fn quote_character_may_be_literal_when_quoting_disabled() {
        let config = CsvConfig::new().no_quote();

        assert_eq!(rows("\"a\",b\n", &config), vec![text(&["\"a\"", "b"])]);
    }

    #[test]
    fn text_after_closing_quote_should_be_appended() {
        assert_eq!(rows("\"ab\"cd,e\n", &CsvConfig::new()), vec![text(&["abcd", "e"])]);
    }

    #[test]
    fn unterminated_quote_should_fail() {
        let reader =
            CsvReader::from_reader("a,b\n\"open,\nstill open".as_bytes(), &CsvConfig::new()).unwrap();

        assert!(reader.read_values().unwrap().is_some());
        let error = reader.read_values().unwrap_err();
        assert!(matches!(error, CsvError::Format { line: 2, .. }));
    }

    #[test]
    fn should_strip_utf8_bom() {
        assert_eq!(rows("\u{feff}a,b\n", &CsvConfig::new()), vec![text(&["a", "b"])]);
    }

    #[test]
    fn fixed_columns_should_reject_ragged_rows() {
        let config = CsvConfig::new().variable_columns(false);
        let reader = CsvReader::from_reader("a,b\nc\n".as_bytes(), &config).unwrap();

        assert!(reader.read_values().is_ok());
        assert!(matches!(
            reader.read_values(),
            Err(CsvError::Format { line: 2, .. })
        ));
    }

    #[test]
    fn custom_separator_and_quote() {
        let config = CsvConfig::new().separator('\t').quote('\'');

        assert_eq!(
            rows("'a\tb'\tc\n", &config),
            vec![text(&["a\tb", "c"])]
        );
    }

    #[test]
    fn read_after_close_should_fail() {
        let reader = CsvReader::from_reader("a\n".as_bytes(), &CsvConfig::new()).unwrap();

        reader.close().unwrap();
        reader.close().unwrap();

        assert!(reader.is_closed());
        assert!(matches!(reader.read_values(), Err(CsvError::Closed)));
    }

    #[test]
    fn invalid_config_should_fail_before_reading() {
        let config = CsvConfig::new().separator('"');

        assert!(matches!(
            CsvReader::from_reader("a".as_bytes(), &config),
            Err(CsvError::Config(_))
        ));
    }

    #[test]
    fn empty_input_should_yield_end_of_stream() {
        let reader = CsvReader::from_reader("".as_bytes(), &CsvConfig::new()).unwrap();

        assert!(reader.read_values().unwrap().is_none());
    }
}
