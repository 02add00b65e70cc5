//! PDF extraction from the document information dictionary.
//!
//! PDFs have no publisher field. A non-standard `Publisher` key wins when a
//! tool bothered to write one, otherwise the `Producer` stands in for it.

use crate::error::{ErrorKind, Result};
use crate::{FormatExtractor, Record};
use exn::ResultExt;
use lopdf::{Dictionary, Document, Object};
use std::path::Path;
use tracing::instrument;

#[derive(Debug, Clone, Copy, Default)]
pub struct Pdf;

impl FormatExtractor for Pdf {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn extensions(&self) -> &[&'static str] {
        &["pdf"]
    }

    #[instrument(skip_all, fields(path = %path.display()))]
    fn extract(&self, path: &Path) -> Result<Record> {
        if !path.is_file() {
            exn::bail!(ErrorKind::Read(path.to_path_buf()));
        }
        let document = Document::load(path).or_raise(|| ErrorKind::MalformedPdf)?;
        let Some(info) = info_dictionary(&document) else {
            tracing::debug!(path = %path.display(), "PDF has no information dictionary");
            return Ok(Record::default());
        };
        let field = |key: &[u8]| text(&document, info, key);
        Ok(Record::new(
            field(b"Title"),
            field(b"Author").map(|a| split_authors(&a)).unwrap_or_default(),
            field(b"Publisher").or_else(|| field(b"Producer")),
        ))
    }
}

fn resolve<'a>(document: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => document.get_object(*id).ok(),
        direct => Some(direct),
    }
}

fn info_dictionary(document: &Document) -> Option<&Dictionary> {
    let info = document.trailer.get(b"Info").ok()?;
    resolve(document, info)?.as_dict().ok()
}

fn text(document: &Document, info: &Dictionary, key: &[u8]) -> Option<String> {
    let bytes = resolve(document, info.get(key).ok()?)?.as_str().ok()?;
    Some(decode_text(bytes))
}

/// Decodes a PDF text string: UTF-16 when it carries a byte-order mark,
/// otherwise UTF-8 if valid, otherwise Latin-1 (close enough to
/// PDFDocEncoding for metadata).
fn decode_text(bytes: &[u8]) -> String {
    let utf16 = |rest: &[u8], from: fn([u8; 2]) -> u16| {
        let units: Vec<u16> = rest.chunks_exact(2).map(|pair| from([pair[0], pair[1]])).collect();
        String::from_utf16_lossy(&units)
    };
    let text = match bytes {
        [0xFE, 0xFF, rest @ ..] => utf16(rest, u16::from_be_bytes),
        [0xFF, 0xFE, rest @ ..] => utf16(rest, u16::from_le_bytes),
        [0xEF, 0xBB, 0xBF, rest @ ..] => String::from_utf8_lossy(rest).into_owned(),
        _ => match std::str::from_utf8(bytes) {
            Ok(text) => text.to_string(),
            Err(_) => bytes.iter().map(|&b| char::from(b)).collect(),
        },
    };
    text.replace('\0', "")
}

/// Authors arrive as one free-form string; semicolons are the only separator
/// that doesn't also appear inside names ("Smith, John").
fn split_authors(authors: &str) -> Vec<String> {
    authors.split(';').map(str::trim).filter(|a| !a.is_empty()).map(str::to_string).collect()
}
