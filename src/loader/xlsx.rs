use std::io::Cursor;

use calamine::{Data, Range, Reader, Xlsx};

use super::{FileParser, ParseError};
use crate::document::{DocumentBody, DocumentKind, SheetRows};

/// Parser for Excel workbooks
///
/// Every sheet is kept, in workbook order. Cells are stringified and rows are
/// anchored at A1, so a sheet whose data starts at C3 still has two leading
/// rows and columns of empty cells.
pub struct XlsxParser;

impl FileParser for XlsxParser {
    fn kind(&self) -> DocumentKind {
        DocumentKind::Spreadsheet
    }

    fn parse(&self, bytes: &[u8]) -> Result<DocumentBody, ParseError> {
        let mut workbook: Xlsx<_> =
            Xlsx::new(Cursor::new(bytes)).map_err(|e| ParseError::Corrupt(e.to_string()))?;

        let mut sheets = Vec::new();
        for name in workbook.sheet_names() {
            let range = workbook
                .worksheet_range(&name)
                .map_err(|e| ParseError::Corrupt(format!("sheet '{}': {}", name, e)))?;
            sheets.push((name, sheet_rows(&range)));
        }

        normalize_sheets(sheets)
    }
}

/// Assemble the spreadsheet body, rejecting workbooks without any sheet
pub(crate) fn normalize_sheets(sheets: Vec<(String, SheetRows)>) -> Result<DocumentBody, ParseError> {
    if sheets.is_empty() {
        return Err(ParseError::NoSheets);
    }
    Ok(DocumentBody::spreadsheet(sheets))
}

fn sheet_rows(range: &Range<Data>) -> SheetRows {
    let (start_row, start_col) = match range.start() {
        Some(start) if !range.is_empty() => start,
        _ => return Vec::new(),
    };

    let lead_cols = start_col as usize;
    let width = lead_cols + range.width();

    let mut rows: SheetRows = (0..start_row).map(|_| vec![String::new(); width]).collect();
    for row in range.rows() {
        let mut cells = vec![String::new(); lead_cols];
        cells.extend(row.iter().map(|cell| cell.to_string()));
        rows.push(cells);
    }

    rows
}
