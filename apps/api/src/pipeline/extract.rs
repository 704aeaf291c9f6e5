//! Document Extractor: turns raw upload bytes into normalised plain text.
//!
//! Every media type maps to a fixed chain of readers. The first reader that yields
//! non-empty text wins; if the whole chain comes up empty the caller receives
//! [`EXTRACTION_FAILED_TEXT`] instead of an error. Readers are isolated with
//! `catch_unwind`, so a panicking third-party parser counts as an empty result.
//!
//! PDF chain: text layer (`pdf-extract`) → page-wise (`lopdf`) → raw literal scan →
//! layout-aware content-stream walk.

use std::io::Read;
use std::panic::{self, AssertUnwindSafe};

use lopdf::content::Content;
use lopdf::Object;
use quick_xml::events::Event;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_DOC: &str = "application/msword";
pub const MIME_TEXT: &str = "text/plain";

/// Placeholder returned when no reader recovered any text. Downstream stages treat it
/// as ordinary (low-information) resume text.
pub const EXTRACTION_FAILED_TEXT: &str =
    "Document text extraction failed - no readable text could be recovered from this file.";

/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;
/// Shortest printable run kept when recovering text from legacy binary `.doc` files.
const MIN_PRINTABLE_RUN: usize = 4;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
}

/// Which reader produced an [`ExtractedText`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    PdfTextLayer,
    PdfPages,
    PdfLiteralScan,
    PdfLayout,
    Docx,
    LegacyDoc,
    PlainText,
    Failed,
}

/// Broad document family resolved from the declared media type (and sniffed bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Pdf,
    Docx,
    LegacyDoc,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedText {
    pub text: String,
    pub strategy: ExtractionStrategy,
}

impl ExtractedText {
    fn failed() -> Self {
        Self {
            text: EXTRACTION_FAILED_TEXT.to_string(),
            strategy: ExtractionStrategy::Failed,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.strategy == ExtractionStrategy::Failed
    }
}

type Reader = fn(&[u8]) -> Result<String, ExtractError>;

const PDF_READERS: [(ExtractionStrategy, Reader); 4] = [
    (ExtractionStrategy::PdfTextLayer, read_pdf_text_layer),
    (ExtractionStrategy::PdfPages, read_pdf_pages),
    (ExtractionStrategy::PdfLiteralScan, read_pdf_literals),
    (ExtractionStrategy::PdfLayout, read_pdf_layout),
];

const DOCX_READERS: [(ExtractionStrategy, Reader); 1] = [(ExtractionStrategy::Docx, read_docx)];

const LEGACY_DOC_READERS: [(ExtractionStrategy, Reader); 2] = [
    (ExtractionStrategy::Docx, read_docx),
    (ExtractionStrategy::LegacyDoc, read_printable_runs),
];

const TEXT_READERS: [(ExtractionStrategy, Reader); 1] =
    [(ExtractionStrategy::PlainText, read_lossy_utf8)];

/// Extracts normalised text from `bytes`. Never fails and never panics; identical
/// input always yields identical output.
pub fn extract(bytes: &[u8], declared_media_type: &str) -> ExtractedText {
    let kind = resolve_media_kind(declared_media_type, None, bytes);
    let readers: &[(ExtractionStrategy, Reader)] = match kind {
        MediaKind::Pdf => &PDF_READERS,
        MediaKind::Docx => &DOCX_READERS,
        MediaKind::LegacyDoc => &LEGACY_DOC_READERS,
        MediaKind::Text => &TEXT_READERS,
    };
    run_readers(bytes, readers)
}

/// Resolves the media family from the declared type, falling back to the filename
/// extension and then magic bytes when the declared type is missing or generic.
pub fn resolve_media_kind(declared: &str, filename: Option<&str>, bytes: &[u8]) -> MediaKind {
    let declared = declared
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match declared.as_str() {
        MIME_PDF => return MediaKind::Pdf,
        MIME_DOCX => return MediaKind::Docx,
        MIME_DOC => return MediaKind::LegacyDoc,
        "" | "application/octet-stream" | "binary/octet-stream" => {}
        _ if declared.starts_with("text/") => return MediaKind::Text,
        _ => {}
    }

    let extension = filename
        .and_then(|f| f.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("pdf") => return MediaKind::Pdf,
        Some("docx") => return MediaKind::Docx,
        Some("doc") => return MediaKind::LegacyDoc,
        _ => {}
    }

    if bytes.starts_with(b"%PDF-") {
        MediaKind::Pdf
    } else if bytes.len() > 4 && bytes.starts_with(b"PK") {
        MediaKind::Docx
    } else {
        MediaKind::Text
    }
}

/// Media type string to use for a file whose upload carried no useful type.
pub fn infer_media_type(declared: Option<&str>, filename: &str, bytes: &[u8]) -> String {
    match resolve_media_kind(declared.unwrap_or_default(), Some(filename), bytes) {
        MediaKind::Pdf => MIME_PDF,
        MediaKind::Docx => MIME_DOCX,
        MediaKind::LegacyDoc => MIME_DOC,
        MediaKind::Text => MIME_TEXT,
    }
    .to_string()
}

fn run_readers(bytes: &[u8], readers: &[(ExtractionStrategy, Reader)]) -> ExtractedText {
    for (strategy, reader) in readers {
        match panic::catch_unwind(AssertUnwindSafe(|| reader(bytes))) {
            Ok(Ok(raw)) => {
                let text = normalize_text(&raw);
                if !text.is_empty() {
                    debug!("{strategy:?} recovered {} chars", text.chars().count());
                    return ExtractedText {
                        text,
                        strategy: *strategy,
                    };
                }
                debug!("{strategy:?} produced no text");
            }
            Ok(Err(e)) => debug!("{strategy:?} failed: {e}"),
            Err(_) => warn!("{strategy:?} reader panicked; trying next strategy"),
        }
    }
    warn!("All extraction strategies came up empty");
    ExtractedText::failed()
}

/// Drops NUL/BOM, unifies line endings, strips trailing whitespace per line,
/// collapses each run of blank lines to one and trims the result.
pub fn normalize_text(text: &str) -> String {
    let cleaned = text
        .replace('\u{0000}', "")
        .replace('\u{FEFF}', "")
        .replace("\r\n", "\n")
        .replace('\r', "\n");

    let mut out = String::with_capacity(cleaned.len());
    let mut blank_run = 0usize;
    for line in cleaned.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
            out.push('\n');
        } else {
            blank_run = 0;
            out.push_str(line);
            out.push('\n');
        }
    }
    out.trim().to_string()
}

// ────────────────────────────────────────────────────────────────────────────
// PDF readers
// ────────────────────────────────────────────────────────────────────────────

fn read_pdf_text_layer(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

fn load_pdf(bytes: &[u8]) -> Result<lopdf::Document, ExtractError> {
    lopdf::Document::load_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

/// Extracts page by page so one broken page does not sink the document.
fn read_pdf_pages(bytes: &[u8]) -> Result<String, ExtractError> {
    let doc = load_pdf(bytes)?;
    let mut pages = Vec::new();
    for page_number in doc.get_pages().keys() {
        match doc.extract_text(&[*page_number]) {
            Ok(text) => pages.push(text),
            Err(e) => debug!("lopdf skipped page {page_number}: {e}"),
        }
    }
    Ok(pages.join("\n\n"))
}

/// Scans raw bytes for string operands of `Tj`, `'`, `"` and `TJ`. Only useful for
/// uncompressed content streams, but needs no object graph at all.
fn read_pdf_literals(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut out = String::new();
    let mut pending: Vec<String> = Vec::new();
    let mut in_array = false;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'(' => {
                let (literal, next) = parse_literal(bytes, i + 1);
                pending.push(latin1_to_string(&literal));
                i = next;
                continue;
            }
            b'[' => {
                in_array = true;
                pending.clear();
            }
            b']' => in_array = false,
            b'T' if !in_array && bytes.get(i + 1) == Some(&b'j') => {
                flush_line(&mut out, &mut pending, "");
                i += 2;
                continue;
            }
            b'T' if !in_array && bytes.get(i + 1) == Some(&b'J') => {
                flush_line(&mut out, &mut pending, "");
                i += 2;
                continue;
            }
            b'\'' | b'"' if !in_array && !pending.is_empty() => {
                flush_line(&mut out, &mut pending, "");
            }
            b'\n' | b'\r' => {}
            _ if !in_array && !bytes[i].is_ascii_whitespace() && !pending.is_empty() => {
                // String operands not followed by a show operator (e.g. metadata)
                if bytes[i].is_ascii_alphabetic() {
                    pending.clear();
                }
            }
            _ => {}
        }
        i += 1;
    }

    Ok(out)
}

fn flush_line(out: &mut String, pending: &mut Vec<String>, separator: &str) {
    if pending.is_empty() {
        return;
    }
    out.push_str(&pending.join(separator));
    out.push('\n');
    pending.clear();
}

/// Parses a PDF literal string starting just after the opening `(`.
/// Returns the decoded bytes and the index just after the closing `)`.
fn parse_literal(bytes: &[u8], start: usize) -> (Vec<u8>, usize) {
    let mut out = Vec::new();
    let mut depth = 1usize;
    let mut i = start;

    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'\\' => {
                let Some(&next) = bytes.get(i + 1) else {
                    break;
                };
                i += 2;
                match next {
                    b'n' => out.push(b'\n'),
                    b'r' => out.push(b'\r'),
                    b't' => out.push(b'\t'),
                    b'b' | b'f' => {}
                    b'0'..=b'7' => {
                        let mut value = u32::from(next - b'0');
                        let mut digits = 1;
                        while digits < 3 {
                            match bytes.get(i) {
                                Some(d @ b'0'..=b'7') => {
                                    value = value * 8 + u32::from(d - b'0');
                                    i += 1;
                                    digits += 1;
                                }
                                _ => break,
                            }
                        }
                        out.push((value & 0xFF) as u8);
                    }
                    b'\r' | b'\n' => {}
                    other => out.push(other),
                }
                continue;
            }
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return (out, i + 1);
                }
            }
            _ => {}
        }
        out.push(b);
        i += 1;
    }

    (out, i)
}

/// Walks decoded content streams and emits line breaks on text positioning operators,
/// which keeps multi-column resumes roughly line-aligned.
fn read_pdf_layout(bytes: &[u8]) -> Result<String, ExtractError> {
    let doc = load_pdf(bytes)?;
    let mut pages = Vec::new();

    for (page_number, page_id) in doc.get_pages() {
        let raw = match doc.get_page_content(page_id) {
            Ok(raw) => raw,
            Err(e) => {
                debug!("layout reader skipped page {page_number}: {e}");
                continue;
            }
        };
        let content = match Content::decode(&raw) {
            Ok(content) => content,
            Err(e) => {
                debug!("layout reader could not decode page {page_number}: {e}");
                continue;
            }
        };

        let mut page = String::new();
        for op in &content.operations {
            match op.operator.as_str() {
                "Tj" => {
                    if let Some(text) = op.operands.last().and_then(object_text) {
                        page.push_str(&text);
                    }
                }
                "'" | "\"" => {
                    page.push('\n');
                    if let Some(text) = op.operands.last().and_then(object_text) {
                        page.push_str(&text);
                    }
                }
                "TJ" => {
                    if let Some(Object::Array(items)) = op.operands.first() {
                        for item in items {
                            match item {
                                Object::Integer(n) if *n < -200 => page.push(' '),
                                Object::Real(n) if *n < -200.0 => page.push(' '),
                                other => {
                                    if let Some(text) = object_text(other) {
                                        page.push_str(&text);
                                    }
                                }
                            }
                        }
                    }
                }
                "Td" | "TD" => {
                    let dy = op.operands.get(1).and_then(object_number).unwrap_or(0.0);
                    if dy.abs() > f32::EPSILON {
                        page.push('\n');
                    } else {
                        page.push(' ');
                    }
                }
                "T*" | "ET" => page.push('\n'),
                _ => {}
            }
        }
        pages.push(page);
    }

    Ok(pages.join("\n\n"))
}

fn object_text(object: &Object) -> Option<String> {
    match object {
        Object::String(bytes, _) => Some(decode_pdf_string(bytes)),
        _ => None,
    }
}

fn object_number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(n) => Some(*n as f32),
        Object::Real(n) => Some(*n),
        _ => None,
    }
}

fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        latin1_to_string(bytes)
    }
}

fn latin1_to_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

// ────────────────────────────────────────────────────────────────────────────
// Word-processor readers
// ────────────────────────────────────────────────────────────────────────────

fn read_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|e| ExtractError::Ooxml(format!("word/document.xml: {e}")))?;

    let mut xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut xml)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Ooxml(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }

    docx_paragraphs(&xml)
}

/// Collects `w:t` runs, one output line per `w:p` paragraph.
fn docx_paragraphs(xml: &[u8]) -> Result<String, ExtractError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(te)) if in_text => {
                out.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => out.push('\t'),
                b"br" | b"cr" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(out)
}

/// Recovers readable runs from a legacy binary Word file. Text in these files is
/// stored either as 8-bit runs or as UTF-16LE runs, so both are scanned.
fn read_printable_runs(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut runs: Vec<String> = Vec::new();

    let mut current = String::new();
    for &b in bytes {
        if b.is_ascii_graphic() || b == b' ' {
            current.push(b as char);
        } else {
            push_run(&mut runs, &mut current);
        }
    }
    push_run(&mut runs, &mut current);

    for pair in bytes.chunks_exact(2) {
        let (lo, hi) = (pair[0], pair[1]);
        if hi == 0 && (lo.is_ascii_graphic() || lo == b' ') {
            current.push(lo as char);
        } else {
            push_run(&mut runs, &mut current);
        }
    }
    push_run(&mut runs, &mut current);

    Ok(runs.join("\n"))
}

fn push_run(runs: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if trimmed.len() >= MIN_PRINTABLE_RUN && trimmed.chars().any(|c| c.is_ascii_alphabetic()) {
        runs.push(trimmed.to_string());
    }
    current.clear();
}

fn read_lossy_utf8(bytes: &[u8]) -> Result<String, ExtractError> {
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::Operation;
    use lopdf::{dictionary, Stream};
    use std::io::Write;

    fn build_pdf(lines: &[&str]) -> Vec<u8> {
        let mut doc = lopdf::Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![72.into(), 720.into()]),
        ];
        for line in lines {
            operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
            operations.push(Operation::new("Td", vec![0.into(), (-14).into()]));
        }
        operations.push(Operation::new("ET", vec![]));

        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode content"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut out = Vec::new();
        doc.save_to(&mut out).expect("save pdf");
        out
    }

    fn build_docx(paragraphs: &[&str]) -> Vec<u8> {
        let body: String = paragraphs
            .iter()
            .map(|p| format!("<w:p><w:r><w:t xml:space=\"preserve\">{p}</w:t></w:r></w:p>"))
            .collect();
        let xml = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
             <w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\
             <w:body>{body}</w:body></w:document>"
        );

        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut cursor);
            let options = zip::write::SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Stored);
            writer
                .start_file("word/document.xml", options)
                .expect("start entry");
            writer.write_all(xml.as_bytes()).expect("write entry");
            writer.finish().expect("finish zip");
        }
        cursor.into_inner()
    }

    #[test]
    fn test_pdf_text_is_recovered() {
        let pdf = build_pdf(&["Jane Doe", "Backend Engineer"]);
        let extracted = extract(&pdf, MIME_PDF);
        assert!(!extracted.is_failed(), "strategy: {:?}", extracted.strategy);
        assert!(extracted.text.contains("Jane Doe"), "text: {}", extracted.text);
    }

    #[test]
    fn test_literal_scan_reads_show_operators() {
        let raw = b"BT /F1 12 Tf 72 720 Td (Hello \\(world\\)) Tj 0 -14 Td [(Py) -10 (thon)] TJ ET";
        let text = read_pdf_literals(raw).unwrap();
        assert_eq!(text, "Hello (world)\nPython\n");
    }

    #[test]
    fn test_literal_octal_escape() {
        let (bytes, next) = parse_literal(b"caf\\351) Tj", 0);
        assert_eq!(latin1_to_string(&bytes), "café");
        assert_eq!(next, 8);
    }

    #[test]
    fn test_layout_reader_breaks_lines_on_positioning() {
        let pdf = build_pdf(&["First line", "Second line"]);
        let text = normalize_text(&read_pdf_layout(&pdf).unwrap());
        assert_eq!(text, "First line\nSecond line");
    }

    #[test]
    fn test_garbage_pdf_yields_sentinel() {
        let extracted = extract(b"%PDF-1.4 this is not really a pdf", MIME_PDF);
        assert!(extracted.is_failed());
        assert_eq!(extracted.text, EXTRACTION_FAILED_TEXT);
    }

    #[test]
    fn test_docx_paragraphs_become_lines() {
        let docx = build_docx(&["Jane Doe", "Python &amp; PostgreSQL"]);
        let extracted = extract(&docx, MIME_DOCX);
        assert_eq!(extracted.strategy, ExtractionStrategy::Docx);
        assert_eq!(extracted.text, "Jane Doe\nPython & PostgreSQL");
    }

    #[test]
    fn test_invalid_docx_yields_sentinel() {
        let extracted = extract(b"not a zip", MIME_DOCX);
        assert!(extracted.is_failed());
    }

    #[test]
    fn test_legacy_doc_recovers_printable_runs() {
        let mut bytes = vec![0xD0, 0xCF, 0x11, 0xE0, 0x00, 0x01];
        bytes.extend_from_slice(b"Experienced Rust developer");
        bytes.extend_from_slice(&[0x00, 0x02, 0x03]);
        let extracted = extract(&bytes, MIME_DOC);
        assert_eq!(extracted.strategy, ExtractionStrategy::LegacyDoc);
        assert!(extracted.text.contains("Experienced Rust developer"));
    }

    #[test]
    fn test_plain_text_invalid_utf8_is_replaced() {
        let extracted = extract(b"Skills: Rust\xFF Go", "text/plain");
        assert_eq!(extracted.strategy, ExtractionStrategy::PlainText);
        assert_eq!(extracted.text, "Skills: Rust\u{FFFD} Go");
    }

    #[test]
    fn test_empty_input_yields_sentinel() {
        assert!(extract(b"", "text/plain").is_failed());
        assert!(extract(b"   \n\n  ", "application/octet-stream").is_failed());
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let inputs: [(&[u8], &str); 4] = [
            (b"plain resume text", MIME_TEXT),
            (b"%PDF-broken", MIME_PDF),
            (b"PK\x03\x04broken", MIME_DOCX),
            (b"\x00\x01\x02", "application/octet-stream"),
        ];
        for (bytes, media_type) in inputs {
            assert_eq!(extract(bytes, media_type), extract(bytes, media_type));
        }
    }

    #[test]
    fn test_resolve_media_kind_falls_back_to_extension_and_magic() {
        assert_eq!(
            resolve_media_kind("application/octet-stream", Some("cv.PDF"), b""),
            MediaKind::Pdf
        );
        assert_eq!(resolve_media_kind("", None, b"%PDF-1.7"), MediaKind::Pdf);
        assert_eq!(resolve_media_kind("", Some("cv.doc"), b""), MediaKind::LegacyDoc);
        assert_eq!(
            resolve_media_kind("text/plain; charset=utf-8", Some("cv.pdf"), b""),
            MediaKind::Text
        );
    }

    #[test]
    fn test_normalize_collapses_blank_runs() {
        let text = "\u{FEFF}Name\r\n\r\n\r\n\r\nSkills  \nRust\u{0000}";
        assert_eq!(normalize_text(text), "Name\n\nSkills\nRust");
    }
}
