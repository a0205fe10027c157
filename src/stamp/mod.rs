//! Protocol header stamping.
//!
//! Every page gets two lines near its top edge: the organization header and
//! `-- Protocollo informatico n. {number} del {dd/mm/yyyy} --`.

use chrono::NaiveDate;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use thiserror::Error;

use crate::config::StampConfig;
use crate::registry::number::ProtocolNumber;

/// Resource name of the stamp font inside each page
const FONT_KEY: &[u8] = b"FRegStamp";
/// A4 portrait, used when a page carries no usable MediaBox
const DEFAULT_TOP: f32 = 842.0;
const MAX_TREE_DEPTH: usize = 32;

#[derive(Debug, Error)]
pub enum StampError {
    #[error("invalid pdf: {0}")]
    InvalidPdf(String),

    #[error("failed to render stamp: {0}")]
    Render(String),
}

/// Renders protocol headers onto documents
pub trait Stamper: Send + Sync {
    /// Number of pages, or `InvalidPdf` when the bytes cannot be parsed
    fn page_count(&self, pdf: &[u8]) -> Result<usize, StampError>;

    /// Return a copy of `pdf` with the header drawn on every page
    fn stamp(&self, pdf: &[u8], number: &ProtocolNumber, date: NaiveDate) -> Result<Vec<u8>, StampError>;
}

pub struct PdfStamper {
    config: StampConfig,
}

impl PdfStamper {
    pub fn new(config: StampConfig) -> Self {
        Self { config }
    }

    /// The two header lines, top line first
    pub fn header_lines(&self, number: &ProtocolNumber, date: NaiveDate) -> [String; 2] {
        [
            self.config.header.clone(),
            format!(
                "-- Protocollo informatico n. {} del {} --",
                number,
                date.format("%d/%m/%Y")
            ),
        ]
    }

    fn header_content(&self, top: f32, lines: &[String; 2]) -> Content {
        let [r, g, b] = self.config.color;
        let x = self.config.margin_left;
        let mut operations = vec![
            // close the `q` prepended ahead of the original content
            Operation::new("Q", vec![]),
            Operation::new("q", vec![]),
        ];

        for (i, line) in lines.iter().enumerate() {
            let y = top - 30.0 - 10.0 * i as f32;
            operations.extend([
                Operation::new("BT", vec![]),
                Operation::new("rg", vec![r.into(), g.into(), b.into()]),
                Operation::new("Tf", vec![Object::Name(FONT_KEY.to_vec()), self.config.font_size.into()]),
                Operation::new("Td", vec![x.into(), y.into()]),
                Operation::new("Tj", vec![Object::string_literal(win_ansi(line))]),
                Operation::new("ET", vec![]),
            ]);
        }

        operations.push(Operation::new("Q", vec![]));
        Content { operations }
    }
}

impl Stamper for PdfStamper {
    fn page_count(&self, pdf: &[u8]) -> Result<usize, StampError> {
        let doc = Document::load_mem(pdf).map_err(|e| StampError::InvalidPdf(e.to_string()))?;
        Ok(doc.get_pages().len())
    }

    fn stamp(&self, pdf: &[u8], number: &ProtocolNumber, date: NaiveDate) -> Result<Vec<u8>, StampError> {
        let mut doc = Document::load_mem(pdf).map_err(|e| StampError::InvalidPdf(e.to_string()))?;
        let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
        if pages.is_empty() {
            return Err(StampError::InvalidPdf("document has no pages".to_string()));
        }

        let lines = self.header_lines(number, date);
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica-Bold",
            "Encoding" => "WinAnsiEncoding",
        });

        for page_id in pages {
            let top = page_top(&doc, page_id);
            register_font(&mut doc, page_id, font_id)?;

            let encoded = self
                .header_content(top, &lines)
                .encode()
                .map_err(|e| StampError::Render(e.to_string()))?;
            append_contents(&mut doc, page_id, encoded)?;
        }

        let mut out = Vec::with_capacity(pdf.len() + 1024);
        doc.save_to(&mut out).map_err(|e| StampError::Render(e.to_string()))?;
        Ok(out)
    }
}

/// Wrap the existing page content in `q`/`Q` and append the stamp after it
fn append_contents(doc: &mut Document, page_id: ObjectId, stamp: Vec<u8>) -> Result<(), StampError> {
    let existing: Vec<Object> = match doc.get_dictionary(page_id).and_then(|p| p.get(b"Contents")) {
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Ok(Object::Array(items)) => items.clone(),
        _ => Vec::new(),
    };

    let prefix_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let stamp_id = doc.add_object(Stream::new(Dictionary::new(), stamp));

    let mut contents = Vec::with_capacity(existing.len() + 2);
    contents.push(Object::Reference(prefix_id));
    contents.extend(existing);
    contents.push(Object::Reference(stamp_id));

    let page = doc
        .get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|e| StampError::InvalidPdf(e.to_string()))?;
    page.set("Contents", Object::Array(contents));
    Ok(())
}

/// Give the page its own resource dictionary (copied from the inherited one)
/// with the stamp font added
fn register_font(doc: &mut Document, page_id: ObjectId, font_id: ObjectId) -> Result<(), StampError> {
    let mut resources = inherited(doc, page_id, b"Resources")
        .and_then(|obj| resolve_dict(doc, &obj))
        .unwrap_or_else(Dictionary::new);

    let mut fonts = match resources.get(b"Font") {
        Ok(obj) => resolve_dict(doc, obj).unwrap_or_else(Dictionary::new),
        Err(_) => Dictionary::new(),
    };
    fonts.set(FONT_KEY.to_vec(), Object::Reference(font_id));
    resources.set("Font", Object::Dictionary(fonts));

    let page = doc
        .get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|e| StampError::InvalidPdf(e.to_string()))?;
    page.set("Resources", Object::Dictionary(resources));
    Ok(())
}

/// Upper edge of the page's MediaBox
fn page_top(doc: &Document, page_id: ObjectId) -> f32 {
    let media_box = inherited(doc, page_id, b"MediaBox").and_then(|obj| match obj {
        Object::Reference(id) => doc.get_object(id).ok().cloned(),
        other => Some(other),
    });

    match media_box {
        Some(Object::Array(values)) if values.len() == 4 => {
            let lower = number(&values[1]);
            let upper = number(&values[3]);
            match (lower, upper) {
                (Some(l), Some(u)) => l.max(u),
                _ => DEFAULT_TOP,
            }
        }
        _ => DEFAULT_TOP,
    }
}

/// Look up an inheritable page attribute, walking up the page tree
fn inherited(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut current = Some(page_id);
    for _ in 0..MAX_TREE_DEPTH {
        let dict = doc.get_dictionary(current?).ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(value.clone());
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }
    None
}

fn resolve_dict(doc: &Document, obj: &Object) -> Option<Dictionary> {
    match obj {
        Object::Dictionary(d) => Some(d.clone()),
        Object::Reference(id) => doc.get_dictionary(*id).ok().cloned(),
        _ => None,
    }
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

/// Standard 14 fonts with WinAnsiEncoding: Latin-1 maps directly, the rest becomes `?`
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}
