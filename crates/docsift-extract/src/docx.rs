//! DOCX content extractor.
//!
//! A `.docx` file is a zip archive. Body text lives in `word/document.xml`
//! as runs of `<w:t>` elements grouped into `<w:p>` paragraphs. The title,
//! if any, comes from `docProps/core.xml`.

use async_trait::async_trait;
use docsift_core::{
    ContentExtractor, ContentMetadataInfo, DocumentFormat, ExtractError, ExtractedContent,
};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::{Cursor, Read};
use tracing::debug;
use zip::ZipArchive;

const DOCUMENT_PART: &str = "word/document.xml";
const CORE_PROPS_PART: &str = "docProps/core.xml";

/// Largest decompressed size accepted for one archive part.
const MAX_PART_BYTES: u64 = 64 * 1024 * 1024;

/// Extractor for Office Open XML word processing documents.
pub struct DocxExtractor;

impl DocxExtractor {
    /// Create a new DOCX extractor.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for DocxExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentExtractor for DocxExtractor {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Docx
    }

    fn name(&self) -> &str {
        "docx"
    }

    async fn extract(&self, data: &[u8]) -> Result<ExtractedContent, ExtractError> {
        debug!("Extracting DOCX ({} bytes)", data.len());

        let bytes = data.to_vec();
        tokio::task::spawn_blocking(move || extract_docx(&bytes, MAX_PART_BYTES))
            .await
            .map_err(|e| ExtractError::Failed(format!("DOCX parser aborted: {e}")))?
    }
}

fn extract_docx(bytes: &[u8], part_limit: u64) -> Result<ExtractedContent, ExtractError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ExtractError::Parse(format!("not a DOCX archive: {e}")))?;

    let document = read_part(&mut archive, DOCUMENT_PART, part_limit)?
        .ok_or_else(|| ExtractError::Parse(format!("missing {DOCUMENT_PART}")))?;
    let text = document_text(&document)?;

    let title = read_part(&mut archive, CORE_PROPS_PART, part_limit)?
        .and_then(|core| core_title(&core));

    Ok(ExtractedContent {
        text,
        metadata: ContentMetadataInfo {
            title,
            ..Default::default()
        },
    })
}

fn read_part(
    archive: &mut ZipArchive<Cursor<&[u8]>>,
    name: &str,
    limit: u64,
) -> Result<Option<String>, ExtractError> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(ExtractError::Parse(format!("cannot open {name}: {e}"))),
    };

    if file.size() > limit {
        return Err(too_large(name, limit));
    }

    // The declared size can lie, so the read is capped as well.
    let mut xml = String::new();
    (&mut file)
        .take(limit.saturating_add(1))
        .read_to_string(&mut xml)
        .map_err(|e| ExtractError::Parse(format!("cannot read {name}: {e}")))?;
    if xml.len() as u64 > limit {
        return Err(too_large(name, limit));
    }
    Ok(Some(xml))
}

fn too_large(name: &str, limit: u64) -> ExtractError {
    ExtractError::Parse(format!("{name} expands past {limit} bytes"))
}

/// Concatenate the text runs of `word/document.xml`, one line per paragraph.
fn document_text(xml: &str) -> Result<String, ExtractError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut text = String::new();
    let mut in_text_run = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text_run = true,
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text_run = false,
                b"p" => text.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => text.push('\t'),
                b"br" | b"cr" => text.push('\n'),
                _ => {}
            },
            Ok(Event::Text(e)) if in_text_run => {
                let run = e
                    .unescape()
                    .map_err(|err| ExtractError::Parse(format!("bad text run: {err}")))?;
                text.push_str(&run);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ExtractError::Parse(format!(
                    "malformed {DOCUMENT_PART} at {}: {e}",
                    reader.buffer_position()
                )))
            }
            Ok(_) => {}
        }
    }

    Ok(text)
}

/// The `dc:title` of `docProps/core.xml`, if present and non-blank.
fn core_title(xml: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    let mut in_title = false;
    let mut title = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"title" => in_title = true,
            Ok(Event::End(e)) if e.local_name().as_ref() == b"title" => break,
            Ok(Event::Text(e)) if in_title => title.push_str(&e.unescape().ok()?),
            Ok(Event::Eof) | Err(_) => break,
            Ok(_) => {}
        }
    }

    let title = title.trim();
    (!title.is_empty()).then(|| title.to_string())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

    /// Build an in-memory DOCX whose body holds one paragraph per entry.
    pub(crate) fn build_docx(paragraphs: &[&str], title: Option<&str>) -> Vec<u8> {
        let body: String = paragraphs
            .iter()
            .map(|p| format!("<w:p><w:r><w:t xml:space=\"preserve\">{p}</w:t></w:r></w:p>"))
            .collect();
        let document = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
             <w:document xmlns:w=\"{W_NS}\"><w:body>{body}</w:body></w:document>"
        );

        let mut buffer = Cursor::new(Vec::new());
        {
            let mut zip = ZipWriter::new(&mut buffer);
            let options = SimpleFileOptions::default();
            zip.start_file(DOCUMENT_PART, options).unwrap();
            zip.write_all(document.as_bytes()).unwrap();
            if let Some(title) = title {
                zip.start_file(CORE_PROPS_PART, options).unwrap();
                write!(
                    zip,
                    "<cp:coreProperties xmlns:cp=\"cp\" xmlns:dc=\"http://purl.org/dc/elements/1.1/\">\
                     <dc:title>{title}</dc:title></cp:coreProperties>"
                )
                .unwrap();
            }
            zip.finish().unwrap();
        }
        buffer.into_inner()
    }

    #[test]
    fn test_format() {
        let extractor = DocxExtractor::new();
        assert_eq!(extractor.format(), DocumentFormat::Docx);
        assert_eq!(extractor.name(), "docx");
    }

    #[tokio::test]
    async fn test_extract_paragraphs() {
        let bytes = build_docx(&["First paragraph.", "Second one."], None);
        let content = DocxExtractor::new().extract(&bytes).await.unwrap();

        assert_eq!(content.text, "First paragraph.\nSecond one.\n");
        assert!(content.metadata.title.is_none());
    }

    #[tokio::test]
    async fn test_extract_unescapes_entities() {
        let bytes = build_docx(&["Fish &amp; chips &lt;hot&gt;"], None);
        let content = DocxExtractor::new().extract(&bytes).await.unwrap();
        assert_eq!(content.text.trim_end(), "Fish & chips <hot>");
    }

    #[tokio::test]
    async fn test_extract_title() {
        let bytes = build_docx(&["body"], Some("Quarterly Report"));
        let content = DocxExtractor::new().extract(&bytes).await.unwrap();
        assert_eq!(content.metadata.title.as_deref(), Some("Quarterly Report"));
    }

    #[tokio::test]
    async fn test_extract_empty_document() {
        let bytes = build_docx(&[], None);
        let content = DocxExtractor::new().extract(&bytes).await.unwrap();
        assert!(content.text.is_empty());
    }

    #[tokio::test]
    async fn test_extract_not_a_zip() {
        let err = DocxExtractor::new()
            .extract(b"plain text pretending to be docx")
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Parse(_)));
    }

    #[tokio::test]
    async fn test_extract_zip_without_document() {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut zip = ZipWriter::new(&mut buffer);
            zip.start_file("readme.txt", SimpleFileOptions::default())
                .unwrap();
            zip.write_all(b"hello").unwrap();
            zip.finish().unwrap();
        }

        let err = DocxExtractor::new()
            .extract(&buffer.into_inner())
            .await
            .unwrap_err();
        match err {
            ExtractError::Parse(msg) => assert!(msg.contains(DOCUMENT_PART)),
            other => panic!("Expected Parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_oversized_part_is_rejected() {
        let filler = "x".repeat(8 * 1024);
        let bytes = build_docx(&[filler.as_str()], None);
        assert!(bytes.len() < 4 * 1024);

        let err = extract_docx(&bytes, 4 * 1024).unwrap_err();
        match err {
            ExtractError::Parse(msg) => assert!(msg.contains("expands past"), "{msg}"),
            other => panic!("Expected Parse error, got {other:?}"),
        }
        assert!(extract_docx(&bytes, MAX_PART_BYTES).is_ok());
    }

    #[test]
    fn test_document_text_tabs_and_breaks() {
        let xml = format!(
            "<w:document xmlns:w=\"{W_NS}\"><w:body><w:p><w:r><w:t>a</w:t><w:tab/>\
             <w:t>b</w:t><w:br/><w:t>c</w:t></w:r></w:p></w:body></w:document>"
        );
        assert_eq!(document_text(&xml).unwrap(), "a\tb\nc\n");
    }

    #[test]
    fn test_document_text_ignores_non_run_text() {
        let xml = format!(
            "<w:document xmlns:w=\"{W_NS}\"><w:body><w:p><w:instrText>PAGE</w:instrText>\
             <w:r><w:t>shown</w:t></w:r></w:p></w:body></w:document>"
        );
        assert_eq!(document_text(&xml).unwrap(), "shown\n");
    }
}
