use std::io::{Cursor, Read};

use quick_xml::Reader;
use quick_xml::events::Event;
use zip::ZipArchive;

use super::{FileParser, ParseError};
use crate::document::{DocumentBody, DocumentKind};

/// Main document part inside a docx package
const DOCUMENT_PART: &str = "word/document.xml";

/// Parser for Word documents, extracting raw text only
///
/// Paragraphs are separated by a blank line; tabs and line breaks inside runs
/// are kept. Formatting, images and tables' layout are dropped.
pub struct DocxParser;

impl FileParser for DocxParser {
    fn kind(&self) -> DocumentKind {
        DocumentKind::TextDocument
    }

    fn parse(&self, bytes: &[u8]) -> Result<DocumentBody, ParseError> {
        let xml = read_document_part(bytes)?;
        let text = extract_text(&xml)?;

        if text.trim().is_empty() {
            return Err(ParseError::EmptyText);
        }

        Ok(DocumentBody::text(text))
    }
}

fn read_document_part(bytes: &[u8]) -> Result<String, ParseError> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|e| ParseError::Corrupt(e.to_string()))?;

    let mut part = archive
        .by_name(DOCUMENT_PART)
        .map_err(|e| ParseError::Corrupt(format!("{}: {}", DOCUMENT_PART, e)))?;

    let mut xml = String::new();
    part.read_to_string(&mut xml)
        .map_err(|e| ParseError::Corrupt(format!("{}: {}", DOCUMENT_PART, e)))?;

    Ok(xml)
}

fn extract_text(xml: &str) -> Result<String, ParseError> {
    let mut reader = Reader::from_str(xml);
    let mut text = String::new();
    let mut in_run = false;
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"r" => in_run = true,
                b"t" if in_run => in_text = true,
                _ => {}
            },
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"r" => in_run = false,
                b"t" => in_text = false,
                b"p" => text.push_str("\n\n"),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" if in_run => text.push('\t'),
                b"br" | b"cr" if in_run => text.push('\n'),
                b"p" => text.push_str("\n\n"),
                _ => {}
            },
            Ok(Event::Text(t)) if in_text => {
                let unescaped = t
                    .unescape()
                    .map_err(|e| ParseError::Corrupt(format!("bad text run: {}", e)))?;
                text.push_str(&unescaped);
            }
            Ok(Event::CData(t)) if in_text => text.push_str(&String::from_utf8_lossy(&t)),
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ParseError::Corrupt(format!(
                    "malformed XML at position {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
            _ => {}
        }
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::fixtures;

    fn text_of(bytes: &[u8]) -> String {
        match DocxParser.parse(bytes).unwrap() {
            DocumentBody::TextDocument { content } => content,
            other => panic!("expected text, got {:?}", other),
        }
    }

    #[test]
    fn paragraphs_are_separated_by_blank_lines() {
        let bytes = fixtures::docx_paragraphs(&["First", "Second"]);
        assert_eq!(text_of(&bytes), "First\n\nSecond\n\n");
    }

    #[test]
    fn runs_tabs_and_breaks_are_kept() {
        let bytes = fixtures::docx(
            "<w:p><w:pPr><w:tabs><w:tab w:val=\"left\" w:pos=\"720\"/></w:tabs></w:pPr>\
             <w:r><w:t>Fish</w:t></w:r><w:r><w:tab/><w:t xml:space=\"preserve\"> &amp; chips</w:t></w:r>\
             <w:r><w:br/><w:t>served</w:t></w:r></w:p>",
        );
        assert_eq!(text_of(&bytes), "Fish\t & chips\nserved\n\n");
    }

    #[test]
    fn whitespace_only_document_is_rejected() {
        let bytes = fixtures::docx_paragraphs(&["  ", ""]);
        assert!(matches!(
            DocxParser.parse(&bytes),
            Err(ParseError::EmptyText)
        ));
    }

    #[test]
    fn archive_without_document_part_is_corrupt() {
        let err = DocxParser.parse(&fixtures::xlsx(&[("S", &[&["a"]])])).unwrap_err();
        assert!(matches!(err, ParseError::Corrupt(msg) if msg.contains(DOCUMENT_PART)));
    }
}
