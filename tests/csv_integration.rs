mod common;

use std::{error::Error, fs::read_to_string};

use common::{init_logger, row};
use csv_batch_rs::{
    CsvError,
    item::csv::{
        Row,
        config::{CsvConfig, QuotePolicy},
        csv_reader::CsvReader,
        csv_writer::CsvWriter,
    },
};

fn read_all(data: &str, config: &CsvConfig) -> Result<Vec<Row>, CsvError> {
    let reader = CsvReader::from_reader(data.as_bytes(), config)?;
    let mut rows = Vec::new();
    while let Some(row) = reader.read_values()? {
        rows.push(row);
    }
    Ok(rows)
}

fn write_all(rows: &[Row], config: &CsvConfig) -> Result<String, Box<dyn Error>> {
    let writer = CsvWriter::new(Vec::new(), config)?;
    for row in rows {
        writer.write_values(row)?;
    }
    Ok(String::from_utf8(writer.into_inner()?)?)
}

#[test]
fn writer_should_produce_expected_document() -> Result<(), Box<dyn Error>> {
    init_logger();
    let config = CsvConfig::new()
        .separator(',')
        .quote('"')
        .escape('\\')
        .null_string("NULL")
        .line_separator("\r\n");

    let output = write_all(
        &[
            row(&[Some("aaa"), Some("b\nb\\\\b"), Some("c\"cc")]),
            row(&[Some("zzz"), Some("yyy"), None]),
        ],
        &config,
    )?;

    assert_eq!(
        output,
        "\"aaa\",\"b\nb\\\\\\\\b\",\"c\\\"cc\"\r\n\"zzz\",\"yyy\",NULL\r\n"
    );
    Ok(())
}

#[test]
fn quoted_field_should_span_physical_lines() -> Result<(), Box<dyn Error>> {
    let config = CsvConfig::new().null_string("NULL");
    let reader = CsvReader::from_reader(
        "\"aaa\",\"b\nb\\\\b\",\"c\\\"cc\"\r\n\"zzz\",\"yyy\",NULL\r\n".as_bytes(),
        &config,
    )?;

    let tokens = reader.read_tokens()?.ok_or("missing first row")?;
    let values: Vec<_> = tokens.iter().map(|t| t.value.as_deref()).collect();
    assert_eq!(values, vec![Some("aaa"), Some("b\nb\\b"), Some("c\"cc")]);
    assert!(tokens.iter().all(|t| t.enclosed));
    assert_eq!((tokens[1].start_line, tokens[1].end_line), (1, 2));
    assert_eq!((reader.start_line_number(), reader.end_line_number()), (1, 2));

    let second = reader.read_values()?.ok_or("missing second row")?;
    assert_eq!(second, row(&[Some("zzz"), Some("yyy"), None]));
    assert_eq!(reader.start_line_number(), 3);

    assert!(reader.read_values()?.is_none());
    Ok(())
}

#[test]
fn skipped_lines_should_never_be_tokenized() -> Result<(), Box<dyn Error>> {
    let config = CsvConfig::new().skip_lines(1);

    let rows = read_all("\"never closed\na,b\nc,d\n", &config)?;

    assert_eq!(rows, vec![row(&[Some("a"), Some("b")]), row(&[Some("c"), Some("d")])]);
    Ok(())
}

#[test]
fn unterminated_quote_should_be_format_error() {
    let result = read_all("a,\"b\nc\n", &CsvConfig::new());

    assert!(matches!(result, Err(CsvError::Format { line: 1, .. })));
}

#[test]
fn reading_policies_should_combine() -> Result<(), Box<dyn Error>> {
    let config = CsvConfig::new()
        .ignore_empty_lines(true)
        .ignore_line_pattern("--.*")
        .ignore_leading_whitespaces(true)
        .ignore_trailing_whitespaces(true)
        .null_string("n/a")
        .ignore_case_null_string(true);
    let data = "\u{feff}-- comment\n  id , name \n\n1,  \"  Ada  \"  \n2,N/A\n";

    let rows = read_all(data, &config)?;

    assert_eq!(
        rows,
        vec![
            row(&[Some("id"), Some("name")]),
            row(&[Some("1"), Some("  Ada  ")]),
            row(&[Some("2"), None]),
        ]
    );
    Ok(())
}

#[test]
fn break_string_should_replace_embedded_line_breaks() -> Result<(), Box<dyn Error>> {
    let config = CsvConfig::new().break_string(" / ");

    let rows = read_all("\"one\r\ntwo\nthree\",x\n", &config)?;

    assert_eq!(rows, vec![row(&[Some("one / two / three"), Some("x")])]);
    Ok(())
}

#[test]
fn fixed_width_should_reject_ragged_rows() {
    let config = CsvConfig::new().variable_columns(false);

    let result = read_all("a,b\nc,d\ne\n", &config);

    assert!(matches!(result, Err(CsvError::Format { line: 3, .. })));
}

#[test]
fn rows_should_round_trip_across_configurations() -> Result<(), Box<dyn Error>> {
    let rows = vec![
        row(&[Some("plain"), Some("with,comma"), Some("with\"quote"), Some("back\\slash")]),
        row(&[Some("multi\nline"), Some("crlf\r\nline"), None, Some("")]),
        row(&[Some(" lead"), Some("trail "), Some("NULL"), Some("tab\there")]),
    ];
    let configs = [
        CsvConfig::new(),
        CsvConfig::new().quote_policy(QuotePolicy::Minimal),
        CsvConfig::new().null_string("NULL"),
        CsvConfig::new()
            .quote_policy(QuotePolicy::Minimal)
            .null_string("NULL")
            .line_separator("\n"),
        CsvConfig::new().no_escape().separator(';'),
        CsvConfig::new().separator('\t').quote('\'').escape('^'),
        CsvConfig::new().no_quote().null_string("\\N"),
    ];

    for config in configs {
        let output = write_all(&rows, &config)?;

        assert_eq!(read_all(&output, &config)?, rows, "config: {:?}", config);
    }
    Ok(())
}

#[test]
fn null_sentinel_should_stay_distinct_from_text() -> Result<(), Box<dyn Error>> {
    let rows = vec![row(&[Some("NULL"), None, Some("null")])];

    for policy in [QuotePolicy::All, QuotePolicy::Minimal] {
        let config = CsvConfig::new()
            .quote_policy(policy)
            .null_string("NULL")
            .ignore_case_null_string(true)
            .line_separator("\n");

        let output = write_all(&rows, &config)?;

        assert_eq!(output, "\"NULL\",NULL,\"null\"\n", "{:?}", policy);
        assert_eq!(read_all(&output, &config)?, rows);
    }
    Ok(())
}

#[test]
fn output_should_be_readable_by_csv_crate() -> Result<(), Box<dyn Error>> {
    let rows = vec![
        row(&[Some("id"), Some("comment")]),
        row(&[Some("1"), Some("said \"hi\", left")]),
        row(&[Some("2"), Some("two\r\nlines")]),
    ];
    let config = CsvConfig::new()
        .no_escape()
        .quote_policy(QuotePolicy::Minimal)
        .line_separator("\n");

    let output = write_all(&rows, &config)?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(output.as_bytes());
    let parsed: Vec<Row> = reader
        .records()
        .map(|record| record.map(|r| r.iter().map(|f| Some(f.to_string())).collect()))
        .collect::<Result<_, _>>()?;
    assert_eq!(parsed, rows);
    Ok(())
}

#[test]
fn csv_crate_output_should_be_readable() -> Result<(), Box<dyn Error>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["name", "quote"])?;
    writer.write_record(["Ada", "\"Talk is cheap\", they said"])?;
    writer.write_record(["Grace", "multi\nline"])?;
    let data = String::from_utf8(writer.into_inner()?)?;

    let rows = read_all(&data, &CsvConfig::new().no_escape())?;

    assert_eq!(
        rows,
        vec![
            row(&[Some("name"), Some("quote")]),
            row(&[Some("Ada"), Some("\"Talk is cheap\", they said")]),
            row(&[Some("Grace"), Some("multi\nline")]),
        ]
    );
    Ok(())
}

#[test]
fn file_should_round_trip_with_bom() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("cities.csv");
    let config = CsvConfig::new().utf8_bom(true);
    let rows = vec![
        row(&[Some("city"), Some("country")]),
        row(&[Some("Zürich"), Some("CH")]),
    ];

    let writer = CsvWriter::from_path(&path, &config)?;
    for r in &rows {
        writer.write_values(r)?;
    }
    writer.close()?;

    let content = read_to_string(&path)?;
    assert!(content.starts_with('\u{feff}'));
    assert_eq!(content.matches('\u{feff}').count(), 1);

    let reader = CsvReader::from_path(&path, &config)?;
    let mut read = Vec::new();
    while let Some(r) = reader.read_values()? {
        read.push(r);
    }
    assert_eq!(read, rows);
    Ok(())
}

#[test]
fn tsv_without_quotes_should_escape_tabs() -> Result<(), Box<dyn Error>> {
    let config = CsvConfig::new()
        .separator('\t')
        .no_quote()
        .line_separator("\n");
    let rows = vec![row(&[Some("a\tb"), Some("c")])];

    let output = write_all(&rows, &config)?;

    assert_eq!(output, "a\\\tb\tc\n");
    assert_eq!(read_all(&output, &config)?, rows);
    Ok(())
}
