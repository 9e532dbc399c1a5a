use std::collections::HashMap;

use super::{DocxParser, FileParser, ParseError, UploadedFile, XlsxParser};
use crate::document::NormalizedDocument;

/// Dispatch table from file extension to parser
pub struct ParserRegistry {
    /// Lower-cased extension -> parser
    map: HashMap<String, Box<dyn FileParser>>,
}

impl ParserRegistry {
    /// Create a registry with no parsers registered
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Registry with the built-in `xlsx` and `docx` parsers
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("xlsx", XlsxParser);
        registry.register("docx", DocxParser);
        registry
    }

    /// Register a parser for a file extension given without the dot
    pub fn register(&mut self, extension: impl Into<String>, parser: impl FileParser + 'static) {
        self.map
            .insert(extension.into().to_lowercase(), Box::new(parser));
    }

    /// Select the parser for a file name, if its extension is supported
    pub fn select(&self, file_name: &str) -> Option<&dyn FileParser> {
        let ext = extension_of(file_name)?;
        self.map.get(&ext).map(|p| &**p)
    }

    /// Parse an upload into a normalized document
    ///
    /// Unsupported extensions are rejected before any bytes are decoded.
    ///
    /// # Arguments
    /// * `file` - Uploaded file name and raw bytes
    ///
    /// # Returns
    /// * `Result<NormalizedDocument, ParseError>` - Name, byte size and body
    ///
    /// # Errors
    /// * `ParseError::Unsupported` for an unregistered extension
    /// * Any error of the selected parser
    pub fn parse(&self, file: &UploadedFile) -> Result<NormalizedDocument, ParseError> {
        let parser = self
            .select(&file.name)
            .ok_or_else(|| ParseError::Unsupported(file.name.clone()))?;

        let body = parser.parse(&file.bytes)?;

        Ok(NormalizedDocument {
            name: file.name.clone(),
            size: file.bytes.len() as u64,
            body,
        })
    }

    /// List all registered extensions
    pub fn registered_extensions(&self) -> Vec<&str> {
        let mut extensions: Vec<&str> = self.map.keys().map(|s| s.as_str()).collect();
        extensions.sort_unstable();
        extensions
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Lower-cased text after the last dot of the final path segment
///
/// A bare `.xlsx` counts as having the extension `xlsx`.
fn extension_of(file_name: &str) -> Option<String> {
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    base.rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty())
        .map(str::to_lowercase)
}
