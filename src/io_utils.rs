//! I/O utilities for reading raw grids and exporting tables.
//!
//! All file I/O in multi-lookup flows through this module. It provides:
//!
//! - **Delimiter resolution**: extension-based auto-detection (`.csv` → comma,
//!   `.tsv` → tab) with manual override support.
//! - **Encoding**: input decoding and output transcoding via `encoding_rs`,
//!   defaulting to UTF-8.
//! - **Grid reading**: files are read without a header assumption. Every line
//!   becomes a grid row and ragged lines are allowed, because header detection
//!   decides later which row holds the labels.
//! - **stdin/stdout**: the `-` path convention routes through standard streams.

use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Read, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8};
use log::info;

use crate::{data, sheet::Grid, table::Table};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    })
}

pub fn resolve_output_delimiter(path: Option<&Path>, provided: Option<u8>, fallback: u8) -> u8 {
    if let Some(delim) = provided {
        return delim;
    }
    if let Some(path) = path {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("tsv") => return DEFAULT_TSV_DELIMITER,
            Some(ext) if ext.eq_ignore_ascii_case("csv") => return DEFAULT_CSV_DELIMITER,
            _ => {}
        }
    }
    fallback
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(false)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true);
    builder.from_reader(reader)
}

pub fn open_csv_reader_from_path(path: &Path, delimiter: u8) -> Result<csv::Reader<Box<dyn Read>>> {
    let reader: Box<dyn Read> = if is_dash(path) {
        Box::new(std::io::stdin().lock())
    } else {
        Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Opening input file {path:?}"))?,
        ))
    };
    Ok(open_csv_reader(reader, delimiter))
}

/// Reads every record of a delimited source into a grid of typed cells.
pub fn read_grid<R>(reader: &mut csv::Reader<R>, encoding: &'static Encoding) -> Result<Grid>
where
    R: Read,
{
    let mut grid = Vec::new();
    for (row_idx, record) in reader.byte_records().enumerate() {
        let record = record.with_context(|| format!("Reading row {}", row_idx + 1))?;
        let decoded = decode_record(&record, encoding)
            .with_context(|| format!("Decoding row {}", row_idx + 1))?;
        grid.push(data::infer_row(&decoded));
    }
    Ok(grid)
}

pub fn read_grid_from_path(
    path: &Path,
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<Grid> {
    let mut reader = open_csv_reader_from_path(path, delimiter)?;
    read_grid(&mut reader, encoding).with_context(|| format!("Reading {path:?}"))
}

pub fn open_csv_writer(
    path: Option<&Path>,
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<csv::Writer<Box<dyn Write>>> {
    let base: Box<dyn Write> = match path {
        Some(p) if !is_dash(p) => Box::new(BufWriter::new(
            File::create(p).with_context(|| format!("Creating output file {p:?}"))?,
        )),
        _ => Box::new(std::io::stdout()),
    };

    let writer: Box<dyn Write> = if encoding == UTF_8 {
        base
    } else {
        Box::new(TranscodingWriter::new(base, encoding))
    };

    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Necessary)
        .double_quote(true);
    Ok(builder.from_writer(writer))
}

pub fn write_table<W>(writer: &mut csv::Writer<W>, table: &Table) -> Result<()>
where
    W: Write,
{
    writer
        .write_record(table.columns())
        .context("Writing header row")?;
    for (row_idx, row) in table.display_rows().iter().enumerate() {
        writer
            .write_record(row)
            .with_context(|| format!("Writing row {}", row_idx + 2))?;
    }
    writer.flush().context("Flushing output")?;
    Ok(())
}

pub fn export_table(
    table: &Table,
    path: Option<&Path>,
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<()> {
    let mut writer = open_csv_writer(path, delimiter, encoding)?;
    write_table(&mut writer, table)?;
    if let Some(path) = path.filter(|p| !is_dash(p)) {
        info!(
            "Wrote {} row(s) across {} column(s) to {:?}",
            table.row_count(),
            table.column_count(),
            path
        );
    }
    Ok(())
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(anyhow!(
            "Failed to decode text with encoding {}",
            encoding.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

pub fn decode_record(record: &csv::ByteRecord, encoding: &'static Encoding) -> Result<Vec<String>> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}

struct TranscodingWriter<W: Write> {
    inner: W,
    encoding: &'static Encoding,
    buffer: Vec<u8>,
}

impl<W: Write> TranscodingWriter<W> {
    fn new(inner: W, encoding: &'static Encoding) -> Self {
        Self {
            inner,
            encoding,
            buffer: Vec::new(),
        }
    }

    // Encodes the longest valid UTF-8 prefix and keeps a trailing partial
    // sequence buffered until more bytes arrive or `force` is set.
    fn flush_buffer(&mut self, force: bool) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let valid_up_to = match std::str::from_utf8(&self.buffer) {
            Ok(_) => self.buffer.len(),
            Err(err) => {
                if err.error_len().is_some() {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "Invalid UTF-8 sequence in output stream",
                    ));
                }
                err.valid_up_to()
            }
        };
        if valid_up_to > 0 {
            let text = String::from_utf8(self.buffer.drain(..valid_up_to).collect())
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            self.encode_and_write(&text)?;
        }
        if force && !self.buffer.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Incomplete UTF-8 sequence at end of output stream",
            ));
        }
        Ok(())
    }

    fn encode_and_write(&mut self, text: &str) -> io::Result<()> {
        let (encoded, _output_encoding, had_errors) = self.encoding.encode(text);
        if had_errors {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Failed to encode text using {}", self.encoding.name()),
            ));
        }
        self.inner.write_all(encoded.as_ref())
    }
}

impl<W: Write> Write for TranscodingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        self.flush_buffer(false)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_buffer(true)?;
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Value;
    use encoding_rs::WINDOWS_1252;

    #[test]
    fn read_grid_keeps_ragged_preamble_rows() {
        let input = "Monthly report\n\nid,name\n1,Alice\n";
        let mut reader = open_csv_reader(input.as_bytes(), b',');
        let grid = read_grid(&mut reader, UTF_8).unwrap();
        assert_eq!(grid.len(), 3);
        assert_eq!(grid[0], vec![Value::text("Monthly report")]);
        assert_eq!(grid[2], vec![Value::Integer(1), Value::text("Alice")]);
    }

    #[test]
    fn read_grid_decodes_legacy_encodings() {
        let (bytes, _, _) = WINDOWS_1252.encode("name\ncafé\n");
        let mut reader = open_csv_reader(bytes.as_ref(), b',');
        let grid = read_grid(&mut reader, WINDOWS_1252).unwrap();
        assert_eq!(grid[1], vec![Value::text("café")]);
    }

    #[test]
    fn delimiter_follows_extension() {
        assert_eq!(resolve_input_delimiter(Path::new("a.TSV"), None), b'\t');
        assert_eq!(resolve_input_delimiter(Path::new("a.csv"), None), b',');
        assert_eq!(resolve_input_delimiter(Path::new("a.tsv"), Some(b';')), b';');
        assert_eq!(
            resolve_output_delimiter(Some(Path::new("out.tsv")), None, b','),
            b'\t'
        );
        assert_eq!(resolve_output_delimiter(None, None, b'|'), b'|');
    }

    #[test]
    fn transcoding_writer_handles_split_sequences() {
        let mut sink = Vec::new();
        {
            let mut writer = TranscodingWriter::new(&mut sink, WINDOWS_1252);
            let bytes = "é".as_bytes();
            writer.write_all(&bytes[..1]).unwrap();
            writer.write_all(&bytes[1..]).unwrap();
            writer.flush().unwrap();
        }
        assert_eq!(sink, vec![0xE9]);
    }

    #[test]
    fn write_table_emits_header_then_rows() {
        let table = Table::new(
            vec!["id".into(), "city".into()],
            vec![vec![Value::Integer(1), Value::text("X, Y")]],
        );
        let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
        write_table(&mut writer, &table).unwrap();
        let bytes = writer.into_inner().unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "id,city\n1,\"X, Y\"\n");
    }
}
