//! Text extraction adapters.
//!
//! An [`Extractor`] turns one file into zero or more [`TextUnit`]s. The
//! default [`FileExtractor`] handles the whole allow-list: PDF (one unit
//! per page), DOCX (paragraph text), CSV (one unit per row), and every
//! text-like type (the file as UTF-8). Failures are returned as
//! [`ExtractError`]s, never panics, so the ingestion pipeline can record
//! them per file and carry on.

use std::io::Read;
use std::path::Path;

use crate::models::{DocumentRecord, TextUnit};

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("unsupported file type: {0}")]
    UnsupportedType(String),
    #[error("could not read file: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("DOCX extraction failed: {0}")]
    Docx(String),
    #[error("CSV extraction failed: {0}")]
    Csv(#[from] csv::Error),
}

/// Converts a scanned file into text units.
pub trait Extractor: Send + Sync {
    fn extract(&self, doc: &DocumentRecord) -> Result<Vec<TextUnit>, ExtractError>;
}

/// Built-in extractor for every supported file type.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileExtractor;

impl Extractor for FileExtractor {
    fn extract(&self, doc: &DocumentRecord) -> Result<Vec<TextUnit>, ExtractError> {
        match doc.file_type.as_str() {
            "pdf" => extract_pdf(&std::fs::read(&doc.path)?),
            "docx" => extract_docx(&std::fs::read(&doc.path)?).map(|text| vec![TextUnit::new(text)]),
            "csv" => extract_csv(&read_utf8(&doc.path)?),
            "txt" | "md" | "py" | "js" | "html" | "css" | "json" | "tsx" | "jsx" | "ts" | "yaml"
            | "yml" => Ok(vec![TextUnit::new(read_utf8(&doc.path)?)]),
            other => Err(ExtractError::UnsupportedType(other.to_string())),
        }
    }
}

fn read_utf8(path: &Path) -> Result<String, ExtractError> {
    Ok(std::fs::read_to_string(path)?)
}

fn extract_pdf(bytes: &[u8]) -> Result<Vec<TextUnit>, ExtractError> {
    let text =
        pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))?;

    // Pages are separated by form feeds in the extracted text
    let units = text
        .split('\u{c}')
        .enumerate()
        .filter(|(_, page)| !page.trim().is_empty())
        .map(|(i, page)| TextUnit::new(page).with_meta("page", i as u64))
        .collect();
    Ok(units)
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractError::Docx("word/document.xml not found".to_string()))?;

    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Docx(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }

    extract_paragraph_text(&doc_xml)
}

/// Collect `<w:t>` runs, breaking lines at the end of each `<w:p>`.
fn extract_paragraph_text(xml: &[u8]) -> Result<String, ExtractError> {
    use quick_xml::events::Event;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
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
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim_end().to_string())
}

/// One unit per data row, rendered as `header: value` lines.
fn extract_csv(content: &str) -> Result<Vec<TextUnit>, ExtractError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(content.as_bytes());
    let headers = reader.headers()?.clone();
    if headers.is_empty() {
        return Ok(Vec::new());
    }

    let mut units = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        let text = headers
            .iter()
            .enumerate()
            .map(|(i, header)| {
                let value = record.get(i).unwrap_or("");
                format!("{}: {}", header.trim(), value.trim())
            })
            .collect::<Vec<_>>()
            .join("\n");
        units.push(TextUnit::new(text).with_meta("row", row as u64));
    }
    Ok(units)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn record_for(path: &Path, file_type: &str) -> DocumentRecord {
        DocumentRecord {
            name: path.file_name().unwrap().to_string_lossy().to_string(),
            path: path.to_path_buf(),
            relative_path: path.file_name().unwrap().to_string_lossy().to_string(),
            size: 0,
            size_mb: 0.0,
            modified: String::new(),
            file_type: file_type.to_string(),
            fingerprint: String::new(),
        }
    }

    fn docx_with_paragraphs(paragraphs: &[&str]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            let body: String = paragraphs
                .iter()
                .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
                .collect();
            let xml = format!(
                "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
                body
            );
            zip.write_all(xml.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        buf
    }

    #[test]
    fn text_file_is_one_unit() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("notes.md");
        std::fs::write(&path, "# Title\n\nBody").unwrap();
        let units = FileExtractor.extract(&record_for(&path, "md")).unwrap();
        assert_eq!(units, vec![TextUnit::new("# Title\n\nBody")]);
    }

    #[test]
    fn invalid_utf8_text_is_an_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("bad.txt");
        std::fs::write(&path, [0xff, 0xfe, 0x00, 0xc3]).unwrap();
        let err = FileExtractor.extract(&record_for(&path, "txt")).unwrap_err();
        assert!(matches!(err, ExtractError::Io(_)));
    }

    #[test]
    fn invalid_pdf_is_an_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("bad.pdf");
        std::fs::write(&path, b"not a pdf").unwrap();
        let err = FileExtractor.extract(&record_for(&path, "pdf")).unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn docx_paragraphs_become_lines() {
        let bytes = docx_with_paragraphs(&["First paragraph", "Second &amp; last"]);
        let text = extract_docx(&bytes).unwrap();
        assert_eq!(text, "First paragraph\nSecond & last");
    }

    #[test]
    fn invalid_docx_is_an_error() {
        let err = extract_docx(b"not a zip").unwrap_err();
        assert!(matches!(err, ExtractError::Docx(_)));
    }

    #[test]
    fn csv_rows_render_with_headers() {
        let units = extract_csv("name,food\nAda,\"pizza, pasta\"\r\nLin,sushi\n").unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].text, "name: Ada\nfood: pizza, pasta");
        assert_eq!(units[1].text, "name: Lin\nfood: sushi");
        assert_eq!(units[1].metadata.get("row"), Some(&serde_json::json!(1)));
    }

    #[test]
    fn csv_quoted_fields_keep_quotes_and_newlines() {
        let units = extract_csv("note,by\n\"say \"\"hi\"\"\",Ada\n\"line one\nline two\",Lin\n").unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].text, "note: say \"hi\"\nby: Ada");
        assert_eq!(units[1].text, "note: line one\nline two\nby: Lin");
    }

    #[test]
    fn csv_ragged_and_blank_rows() {
        let units = extract_csv("a,b\n1\n,\n\n3,4,5\n").unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].text, "a: 1\nb: ");
        assert_eq!(units[1].text, "a: 3\nb: 4");
        assert_eq!(units[1].metadata.get("row"), Some(&serde_json::json!(2)));
    }

    #[test]
    fn header_only_csv_has_no_units() {
        assert!(extract_csv("a,b,c\n").unwrap().is_empty());
    }

    #[test]
    fn unsupported_type_is_an_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("x.bin");
        std::fs::write(&path, b"x").unwrap();
        let err = FileExtractor.extract(&record_for(&path, "bin")).unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedType(_)));
    }
}
