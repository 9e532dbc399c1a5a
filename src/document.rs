//! Normalized document records
//!
//! Every upload, whatever its source format, ends up as a [`NormalizedDocument`]:
//! the file name, its byte size and a [`DocumentBody`] tagged by document type.
//! Once persisted it becomes a [`StoredDocument`] carrying the store-generated id
//! and the owner token of the uploading session.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rows of a single sheet, each row an ordered list of cell strings
pub type SheetRows = Vec<Vec<String>>;

/// Type tag of a normalized document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentKind {
    #[serde(alias = "xlsx")]
    Spreadsheet,
    #[serde(alias = "docx")]
    TextDocument,
}

impl DocumentKind {
    /// Tag as written to the wire and to the store
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Spreadsheet => "spreadsheet",
            DocumentKind::TextDocument => "text-document",
        }
    }

    /// Parse a stored tag, accepting the legacy `xlsx`/`docx` spellings
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "spreadsheet" | "xlsx" => Some(DocumentKind::Spreadsheet),
            "text-document" | "docx" => Some(DocumentKind::TextDocument),
            _ => None,
        }
    }
}

/// Payload of a document, one variant per supported file family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DocumentBody {
    #[serde(alias = "xlsx", rename_all = "camelCase")]
    Spreadsheet {
        content: IndexMap<String, SheetRows>,
        sheet_names: Vec<String>,
    },
    #[serde(alias = "docx")]
    TextDocument { content: String },
}

/// Ways a document body can break the normalized-record invariants
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvariantError {
    #[error("Spreadsheet has no sheets")]
    NoSheets,

    #[error("Spreadsheet content does not match sheetNames")]
    SheetNamesMismatch,

    #[error("Sheet '{0}' has no rows")]
    EmptySheet(String),

    #[error("Text document is empty")]
    EmptyText,
}

impl DocumentBody {
    /// Build a spreadsheet body from sheets in workbook order
    ///
    /// Sheets without rows are stored as a single row holding one empty cell so
    /// that every declared sheet keeps a key in `content`.
    pub fn spreadsheet(sheets: Vec<(String, SheetRows)>) -> Self {
        let mut content = IndexMap::with_capacity(sheets.len());
        let mut sheet_names = Vec::with_capacity(sheets.len());

        for (name, rows) in sheets {
            let rows = if rows.is_empty() { empty_sheet() } else { rows };
            sheet_names.push(name.clone());
            content.insert(name, rows);
        }

        DocumentBody::Spreadsheet {
            content,
            sheet_names,
        }
    }

    pub fn text(content: impl Into<String>) -> Self {
        DocumentBody::TextDocument {
            content: content.into(),
        }
    }

    pub fn kind(&self) -> DocumentKind {
        match self {
            DocumentBody::Spreadsheet { .. } => DocumentKind::Spreadsheet,
            DocumentBody::TextDocument { .. } => DocumentKind::TextDocument,
        }
    }

    /// Put spreadsheet `content` in `sheet_names` order, then validate
    ///
    /// JSON objects carry no key order, so a client may send `content` keys
    /// in any order. Only the set of keys has to match `sheet_names`.
    ///
    /// # Errors
    /// * `SheetNamesMismatch` if the keys of `content` and the entries of
    ///   `sheet_names` are not the same set of distinct names
    /// * Any error [`DocumentBody::validate`] reports
    pub fn canonicalize(&mut self) -> Result<(), InvariantError> {
        if let DocumentBody::Spreadsheet {
            content,
            sheet_names,
        } = self
        {
            let positions: HashMap<&str, usize> = sheet_names
                .iter()
                .enumerate()
                .map(|(i, name)| (name.as_str(), i))
                .collect();

            let same_set = positions.len() == sheet_names.len()
                && positions.len() == content.len()
                && content.keys().all(|k| positions.contains_key(k.as_str()));
            if !same_set {
                return Err(InvariantError::SheetNamesMismatch);
            }

            content.sort_by(|a, _, b, _| positions[a.as_str()].cmp(&positions[b.as_str()]));
        }

        self.validate()
    }

    /// Check the invariants a body must hold before it is persisted
    pub fn validate(&self) -> Result<(), InvariantError> {
        match self {
            DocumentBody::Spreadsheet {
                content,
                sheet_names,
            } => {
                if sheet_names.is_empty() {
                    return Err(InvariantError::NoSheets);
                }
                if content.len() != sheet_names.len() || !content.keys().eq(sheet_names.iter()) {
                    return Err(InvariantError::SheetNamesMismatch);
                }
                if let Some((name, _)) = content.iter().find(|(_, rows)| rows.is_empty()) {
                    return Err(InvariantError::EmptySheet(name.clone()));
                }
                Ok(())
            }
            DocumentBody::TextDocument { content } => {
                if content.trim().is_empty() {
                    Err(InvariantError::EmptyText)
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// Representation of an empty sheet: one row, one empty cell
pub fn empty_sheet() -> SheetRows {
    vec![vec![String::new()]]
}

/// A parsed upload before it is persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedDocument {
    pub name: String,
    pub size: u64,
    #[serde(flatten)]
    pub body: DocumentBody,
}

/// A persisted document as returned by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDocument {
    pub id: String,
    #[serde(flatten)]
    pub document: NormalizedDocument,
    pub owner_token: String,
    pub created_at: DateTime<Utc>,
}
