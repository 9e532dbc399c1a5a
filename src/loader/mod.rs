//! File ingestion
//!
//! Turns uploaded bytes into [`NormalizedDocument`]s. Each supported file family
//! has one [`FileParser`]; the [`ParserRegistry`] picks the parser from the file
//! name's extension so call sites never branch on suffixes themselves.

mod docx;
mod registry;
mod xlsx;

pub use docx::DocxParser;
pub use registry::ParserRegistry;
pub use xlsx::XlsxParser;

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::document::{DocumentBody, DocumentKind, NormalizedDocument};

/// Message shown when a whole upload batch yields nothing usable
pub const NOTHING_ACCEPTED_MESSAGE: &str =
    "Invalid or empty file. Please upload a valid .docx or .xlsx file.";

/// Core trait that all file parsers implement
pub trait FileParser: Send + Sync {
    /// Tag of the documents this parser produces
    fn kind(&self) -> DocumentKind;

    /// Decode raw file bytes into a document body
    fn parse(&self, bytes: &[u8]) -> Result<DocumentBody, ParseError>;
}

/// A file as received from a client: its declared name and raw contents
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// Reasons a single file is rejected
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Unsupported file type: {0}")]
    Unsupported(String),

    #[error("Workbook contains no sheets")]
    NoSheets,

    #[error("Document contains no text")]
    EmptyText,

    #[error("Failed to decode file: {0}")]
    Corrupt(String),
}

/// Failure of a whole upload batch
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("{}", NOTHING_ACCEPTED_MESSAGE)]
    NothingAccepted,
}

/// Parse a batch of uploads concurrently
///
/// Each file is decoded on tokio's blocking pool. Accepted documents are
/// returned in upload order; rejected files are dropped without individual
/// reporting. The batch only fails when no file at all is accepted.
///
/// # Arguments
/// * `registry` - Parsers keyed by extension, shared across tasks
/// * `files` - Uploaded files in the order they were received
///
/// # Errors
/// * `BatchError::NothingAccepted` if every file was rejected, or none sent
pub async fn parse_batch(
    registry: Arc<ParserRegistry>,
    files: Vec<UploadedFile>,
) -> Result<Vec<NormalizedDocument>, BatchError> {
    let handles: Vec<_> = files
        .into_iter()
        .map(|file| {
            let registry = Arc::clone(&registry);
            tokio::task::spawn_blocking(move || {
                let result = registry.parse(&file);
                (file.name, result)
            })
        })
        .collect();

    let mut accepted = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle.await {
            Ok((_, Ok(document))) => accepted.push(document),
            Ok((name, Err(e))) => debug!(file = %name, error = %e, "upload rejected"),
            Err(e) => warn!(error = %e, "parser task failed"),
        }
    }

    if accepted.is_empty() {
        return Err(BatchError::NothingAccepted);
    }

    Ok(accepted)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::io::{Cursor, Write};

    use rust_xlsxwriter::Workbook;
    use zip::ZipWriter;
    use zip::write::FileOptions;

    /// Build an xlsx workbook; each sheet is a name and rows of string cells
    pub fn xlsx(sheets: &[(&str, &[&[&str]])]) -> Vec<u8> {
        let mut workbook = Workbook::new();
        for (name, rows) in sheets {
            let worksheet = workbook.add_worksheet();
            worksheet.set_name(*name).unwrap();
            for (r, row) in rows.iter().enumerate() {
                for (c, cell) in row.iter().enumerate() {
                    worksheet.write_string(r as u32, c as u16, *cell).unwrap();
                }
            }
        }
        workbook.save_to_buffer().unwrap()
    }

    /// Build a minimal docx whose body is the given WordprocessingML fragment
    pub fn docx(body: &str) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("word/document.xml", FileOptions::default())
            .unwrap();
        write!(
            writer,
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}</w:body></w:document>"#,
            body
        )
        .unwrap();
        writer.finish().unwrap().into_inner()
    }

    /// A docx with one paragraph per entry
    pub fn docx_paragraphs(paragraphs: &[&str]) -> Vec<u8> {
        let body: String = paragraphs
            .iter()
            .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
            .collect();
        docx(&body)
    }
}
