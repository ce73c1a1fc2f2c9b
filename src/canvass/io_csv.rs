// Primitives for reading CSV files.

use std::fs;

use crate::canvass::io_common::{assemble_rows, decode_text};
use crate::canvass::*;
use canvass_core::bulk::RawRow;

/// Reads a CSV file whose first record holds the headers.
///
/// Files that are not UTF-8 are read as Windows-1252. Records may have fewer
/// or more fields than the header; missing cells are treated as absent and
/// extra cells are ignored.
pub fn read_csv_rows(path: &str) -> CanvassResult<Vec<RawRow>> {
    let bytes = fs::read(path).context(OpeningFileSnafu { path })?;
    let text = decode_text(bytes);
    let rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut records = rdr.into_records();
    let header: Vec<String> = match records.next() {
        Some(line_r) => line_r
            .context(CsvLineParseSnafu { lineno: 1_usize })?
            .iter()
            .map(|s| s.to_string())
            .collect(),
        None => return Ok(Vec::new()),
    };
    debug!("read_csv_rows: header: {:?}", header);

    let mut lines: Vec<Vec<String>> = Vec::new();
    for (idx, line_r) in records.enumerate() {
        let lineno = idx + 2;
        let line = line_r.context(CsvLineParseSnafu { lineno })?;
        lines.push(line.iter().map(|s| s.to_string()).collect());
    }
    let rows = assemble_rows(&header, lines);
    info!("Read {} rows from {:?}", rows.len(), path);
    Ok(rows)
}
