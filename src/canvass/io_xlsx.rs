// Primitives for reading Excel spreadsheets.

use calamine::{open_workbook, DataType, Reader, Xlsx};

use crate::canvass::io_common::assemble_rows;
use crate::canvass::*;
use canvass_core::bulk::RawRow;

/// The text of a cell. Whole numbers are written without a decimal part, so an
/// ID typed as a number reads back as `12345678` and not `12345678.0`.
pub fn cell_text(cell: &DataType) -> String {
    match cell {
        DataType::Empty => "".to_string(),
        DataType::String(s) => s.clone(),
        DataType::Int(i) => i.to_string(),
        DataType::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        other => other.to_string(),
    }
}

fn get_range(path: &str, worksheet_name: Option<&str>) -> CanvassResult<calamine::Range<DataType>> {
    debug!(
        "get_range: path: {:?} worksheet: {:?}",
        path, worksheet_name
    );
    let mut workbook: Xlsx<_> = open_workbook(path).context(OpeningExcelSnafu { path })?;
    match worksheet_name {
        Some(name) => workbook
            .worksheet_range(name)
            .context(MissingWorksheetSnafu { path, name })?
            .context(OpeningExcelSnafu { path }),
        None => workbook
            .worksheet_range_at(0)
            .context(EmptyExcelSnafu { path })?
            .context(OpeningExcelSnafu { path }),
    }
}

/// Reads the rows of a worksheet. The first row holds the headers.
pub fn read_xlsx_rows(path: &str, worksheet_name: Option<&str>) -> CanvassResult<Vec<RawRow>> {
    let wrange = get_range(path, worksheet_name)?;
    let mut iter = wrange.rows();
    let header: Vec<String> = match iter.next() {
        Some(row) => row.iter().map(cell_text).collect(),
        None => return Ok(Vec::new()),
    };
    debug!("read_xlsx_rows: header: {:?}", header);
    let rows = assemble_rows(&header, iter.map(|row| row.iter().map(cell_text).collect()));
    info!("Read {} rows from {:?}", rows.len(), path);
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_cells_read_as_integers() {
        assert_eq!(cell_text(&DataType::Float(12345678.0)), "12345678");
        assert_eq!(cell_text(&DataType::Float(3001234567.0)), "3001234567");
        assert_eq!(cell_text(&DataType::Int(42)), "42");
        assert_eq!(cell_text(&DataType::Float(4.5)), "4.5");
        assert_eq!(cell_text(&DataType::String("MESA 4".to_string())), "MESA 4");
        assert_eq!(cell_text(&DataType::Empty), "");
    }

    #[test]
    fn missing_workbook_is_an_error() {
        let res = read_xlsx_rows("/nonexistent/voters.xlsx", None);
        assert!(matches!(res, Err(CanvassError::OpeningExcel { .. })));
    }
}
