use std::path::Path;

use indexmap::IndexMap;
use rust_xlsxwriter::{Workbook, XlsxError};
use thiserror::Error;

use crate::document::{DocumentBody, NormalizedDocument, SheetRows};

/// Largest sheet rust_xlsxwriter (and Excel) can address
const MAX_ROWS: usize = 1_048_576;
const MAX_COLS: usize = 16_384;

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Failed to write workbook: {0}")]
    Xlsx(#[from] XlsxError),

    #[error("Sheet '{0}' exceeds the worksheet size limit")]
    TooLarge(String),
}

/// A rendered file ready to be sent to the client
#[derive(Debug)]
pub struct Export {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

/// Render a stored document back into a downloadable file
///
/// Spreadsheets become `.xlsx` workbooks, text documents plain UTF-8 `.txt`.
///
/// # Arguments
/// * `document` - The normalized record to render
///
/// # Returns
/// * `Result<Export, ExportError>` - File name, MIME type and bytes
///
/// # Examples
/// ```
/// use docshare::document::{DocumentBody, NormalizedDocument};
/// use docshare::downloader::export;
///
/// let document = NormalizedDocument {
///     name: "memo.docx".to_string(),
///     size: 5,
///     body: DocumentBody::text("Hello"),
/// };
/// let file = export(&document).unwrap();
/// assert_eq!(file.file_name, "memo.txt");
/// assert_eq!(file.bytes, b"Hello");
/// ```
pub fn export(document: &NormalizedDocument) -> Result<Export, ExportError> {
    match &document.body {
        DocumentBody::Spreadsheet {
            content,
            sheet_names,
        } => Ok(Export {
            file_name: with_extension(&document.name, "xlsx"),
            content_type: XLSX_CONTENT_TYPE,
            bytes: to_xlsx(sheet_names, content)?,
        }),
        DocumentBody::TextDocument { content } => Ok(Export {
            file_name: with_extension(&document.name, "txt"),
            content_type: TEXT_CONTENT_TYPE,
            bytes: to_text(content),
        }),
    }
}

/// Convert sheet grids to XLSX format
///
/// One worksheet per entry of `sheet_names`, in that order. Every cell is
/// written as a string; empty cells are left blank.
///
/// # Arguments
/// * `sheet_names` - Worksheet names in output order
/// * `content` - Rows of cell strings keyed by sheet name
///
/// # Returns
/// * `Result<Vec<u8>, ExportError>` - XLSX file content as bytes
///
/// # Errors
/// * `ExportError::Xlsx` if a sheet name is not a valid worksheet name
/// * `ExportError::TooLarge` if a sheet exceeds 1,048,576 rows or 16,384
///   columns
pub fn to_xlsx(
    sheet_names: &[String],
    content: &IndexMap<String, SheetRows>,
) -> Result<Vec<u8>, ExportError> {
    let mut workbook = Workbook::new();

    for name in sheet_names {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(name)?;

        let Some(rows) = content.get(name) else {
            continue;
        };
        if rows.len() > MAX_ROWS || rows.iter().any(|r| r.len() > MAX_COLS) {
            return Err(ExportError::TooLarge(name.clone()));
        }

        for (r, row) in rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                if value.is_empty() {
                    continue;
                }
                // Bounds checked above
                worksheet.write_string(r as u32, c as u16, value)?;
            }
        }
    }

    Ok(workbook.save_to_buffer()?)
}

/// UTF-8 bytes of a text document
pub fn to_text(content: &str) -> Vec<u8> {
    content.as_bytes().to_vec()
}

fn with_extension(name: &str, extension: &str) -> String {
    let stem = Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("document");
    format!("{}.{}", stem, extension)
}
