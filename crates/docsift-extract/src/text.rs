//! Plain text extractor.

use async_trait::async_trait;
use docsift_core::{
    ContentExtractor, ContentMetadataInfo, DocumentFormat, ExtractError, ExtractedContent,
};

/// UTF-8 byte order mark.
const BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Extractor for UTF-8 plain text.
pub struct TextExtractor;

impl TextExtractor {
    /// Create a new text extractor.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for TextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentExtractor for TextExtractor {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::PlainText
    }

    fn name(&self) -> &str {
        "text"
    }

    async fn extract(&self, data: &[u8]) -> Result<ExtractedContent, ExtractError> {
        let data = data.strip_prefix(BOM).unwrap_or(data);
        let text = std::str::from_utf8(data).map_err(|e| {
            ExtractError::Parse(format!(
                "not valid UTF-8 at byte {}",
                e.valid_up_to()
            ))
        })?;

        // Normalize Windows line endings
        let text = text.replace("\r\n", "\n");
        let title = text
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(|line| line.chars().take(120).collect::<String>());

        Ok(ExtractedContent {
            text,
            metadata: ContentMetadataInfo {
                title,
                ..Default::default()
            },
        })
    }
}
