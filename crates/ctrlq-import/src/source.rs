//! Row sources: delimited text and spreadsheets.

use calamine::{open_workbook, Data, Reader, Xlsx};
use std::path::Path;

use crate::error::{ImportError, ImportResult};

/// One source row with its 1-based position in the file, for diagnostics.
#[derive(Debug, Clone)]
pub struct RowData {
    pub number: usize,
    pub cells: Vec<String>,
}

/// A parsed source: header plus data rows.
#[derive(Debug, Clone)]
pub struct SheetRows {
    pub header: Vec<String>,
    pub rows: Vec<RowData>,
}

/// Read a delimited text source. The first non-empty line is the header;
/// quoted fields may embed delimiters and line breaks.
pub fn read_delimited(path: &Path, delimiter: u8) -> ImportResult<SheetRows> {
    let file = std::fs::File::open(path).map_err(|source| ImportError::Source {
        path: path.display().to_string(),
        source,
    })?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(file);

    let mut header: Option<Vec<String>> = None;
    let mut rows: Vec<RowData> = Vec::new();

    for (index, record) in reader.records().enumerate() {
        let record = record?;
        let cells: Vec<String> = record.iter().map(|cell| cell.to_string()).collect();
        if cells.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        match header {
            None => header = Some(cells),
            Some(_) => rows.push(RowData {
                number: index + 1,
                cells,
            }),
        }
    }

    let header = header.ok_or(ImportError::EmptySource)?;
    Ok(SheetRows { header, rows })
}

/// Read a named sheet from an xlsx workbook. Row 1 is the header.
pub fn read_spreadsheet(path: &Path, sheet: &str) -> ImportResult<SheetRows> {
    let mut workbook: Xlsx<_> =
        open_workbook(path).map_err(|e: calamine::XlsxError| ImportError::Spreadsheet {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

    let range = workbook
        .worksheet_range(sheet)
        .map_err(|_| ImportError::SheetNotFound(sheet.to_string()))?;

    let mut iter = range.rows();
    let header: Vec<String> = iter
        .next()
        .ok_or(ImportError::EmptySource)?
        .iter()
        .map(cell_to_string)
        .collect();

    let rows: Vec<RowData> = iter
        .enumerate()
        .map(|(index, cells)| RowData {
            number: index + 2,
            cells: cells.iter().map(cell_to_string).collect(),
        })
        .filter(|row| row.cells.iter().any(|cell| !cell.is_empty()))
        .collect();

    Ok(SheetRows { header, rows })
}

/// Render a spreadsheet cell the way the delimited reader would have seen
/// it. Integral floats lose their `.0` so integer columns coerce cleanly.
fn cell_to_string(data: &Data) -> String {
    match data {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::DateTime(dt) => dt.as_f64().to_string(),
        Data::Error(e) => format!("{:?}", e),
    }
}
