//! Extractor registry mapping document formats to extractors.

use docsift_core::{ContentExtractor, DocumentFormat, ExtractError, ExtractedContent};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::ocr::TextRecognizer;
use crate::{DocxExtractor, ImageExtractor, PdfExtractor, TextExtractor};

/// Registry of content extractors, one per format.
pub struct ExtractorRegistry {
    extractors: HashMap<DocumentFormat, Arc<dyn ContentExtractor>>,
}

impl ExtractorRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            extractors: HashMap::new(),
        }
    }

    /// Registry with the built-in extractor for every format.
    ///
    /// Image documents are recognized with `recognizer`.
    #[must_use]
    pub fn with_defaults(recognizer: Arc<dyn TextRecognizer>) -> Self {
        let mut registry = Self::new();
        registry.register(PdfExtractor::new());
        registry.register(DocxExtractor::new());
        registry.register(ImageExtractor::new(recognizer));
        registry.register(TextExtractor::new());
        registry
    }

    /// Register an extractor under the format it reports.
    ///
    /// Replaces any extractor previously registered for that format.
    pub fn register<E: ContentExtractor + 'static>(&mut self, extractor: E) {
        self.register_arc(Arc::new(extractor));
    }

    /// Register a shared extractor.
    pub fn register_arc(&mut self, extractor: Arc<dyn ContentExtractor>) {
        let format = extractor.format();
        if let Some(previous) = self.extractors.insert(format, extractor) {
            debug!("Replaced {} extractor for {}", previous.name(), format);
        }
    }

    /// Get the extractor for a format.
    #[must_use]
    pub fn get(&self, format: DocumentFormat) -> Option<Arc<dyn ContentExtractor>> {
        self.extractors.get(&format).cloned()
    }

    /// Whether an extractor is registered for the format.
    #[must_use]
    pub fn supports(&self, format: DocumentFormat) -> bool {
        self.extractors.contains_key(&format)
    }

    /// Registered formats, in declaration order.
    #[must_use]
    pub fn formats(&self) -> Vec<DocumentFormat> {
        DocumentFormat::ALL
            .iter()
            .copied()
            .filter(|f| self.supports(*f))
            .collect()
    }

    /// Extract content from document bytes of the given format.
    pub async fn extract(
        &self,
        format: DocumentFormat,
        data: &[u8],
    ) -> Result<ExtractedContent, ExtractError> {
        let extractor = self
            .get(format)
            .ok_or_else(|| ExtractError::UnsupportedFormat(format.to_string()))?;

        extractor.extract(data).await
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
