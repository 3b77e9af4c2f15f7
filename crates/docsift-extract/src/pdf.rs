//! PDF content extractor.
//!
//! Uses pdf-extract for the text layer. Scanned PDFs without a text layer
//! produce little or no text and are rejected downstream as having no
//! extractable text.

use async_trait::async_trait;
use docsift_core::{
    ContentExtractor, ContentMetadataInfo, DocumentFormat, ExtractError, ExtractedContent,
};
use tracing::debug;

/// Every PDF starts with this marker.
const PDF_MAGIC: &[u8] = b"%PDF-";

/// Extractor for PDF documents.
pub struct PdfExtractor;

impl PdfExtractor {
    /// Create a new PDF extractor.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for PdfExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentExtractor for PdfExtractor {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Pdf
    }

    fn name(&self) -> &str {
        "pdf"
    }

    async fn extract(&self, data: &[u8]) -> Result<ExtractedContent, ExtractError> {
        if !looks_like_pdf(data) {
            return Err(ExtractError::Parse("missing PDF header".to_string()));
        }

        debug!("Extracting PDF ({} bytes)", data.len());

        // pdf-extract is synchronous and may panic on malformed input; a
        // panic surfaces as a join error.
        let bytes = data.to_vec();
        let text = tokio::task::spawn_blocking(move || extract_pdf_text(&bytes))
            .await
            .map_err(|e| ExtractError::Failed(format!("PDF parser aborted: {e}")))?
            .map_err(|e| ExtractError::Parse(format!("PDF extraction failed: {e}")))?;

        let page_count = estimate_page_count(&text);

        Ok(ExtractedContent {
            text,
            metadata: ContentMetadataInfo {
                page_count: Some(page_count),
                ..Default::default()
            },
        })
    }
}

/// Whether the bytes start with the PDF marker, allowing leading whitespace.
fn looks_like_pdf(data: &[u8]) -> bool {
    let start = data
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(data.len());
    data[start..].starts_with(PDF_MAGIC)
}

/// Extract text from PDF bytes using pdf-extract.
fn extract_pdf_text(bytes: &[u8]) -> Result<String, String> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| e.to_string())
}

/// Estimate page count from form feeds, falling back to text length.
fn estimate_page_count(text: &str) -> u32 {
    let form_feeds = text.matches('\x0C').count();
    if form_feeds > 0 {
        return (form_feeds + 1) as u32;
    }

    // ~3000 chars per page on average
    std::cmp::max(1, (text.len() / 3000) as u32)
}
