//! Image content extractor.
//!
//! Decodes the image to validate it, then runs OCR through a
//! [`TextRecognizer`].

use async_trait::async_trait;
use docsift_core::{
    ContentExtractor, ContentMetadataInfo, DocumentFormat, ExtractError, ExtractedContent,
};
use image::GenericImageView;
use std::sync::Arc;
use tracing::debug;

use crate::ocr::{TesseractRecognizer, TextRecognizer};

/// Extractor for raster images.
pub struct ImageExtractor {
    recognizer: Arc<dyn TextRecognizer>,
}

impl ImageExtractor {
    /// Create an image extractor using the given recognizer.
    pub fn new(recognizer: Arc<dyn TextRecognizer>) -> Self {
        Self { recognizer }
    }
}

impl Default for ImageExtractor {
    fn default() -> Self {
        Self::new(Arc::new(TesseractRecognizer::default()))
    }
}

#[async_trait]
impl ContentExtractor for ImageExtractor {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Image
    }

    fn name(&self) -> &str {
        "image"
    }

    async fn extract(&self, data: &[u8]) -> Result<ExtractedContent, ExtractError> {
        let bytes = data.to_vec();
        let (width, height, format) =
            tokio::task::spawn_blocking(move || decode_image_metadata(&bytes))
                .await
                .map_err(|e| ExtractError::Failed(format!("Task join error: {e}")))?
                .map_err(|e| ExtractError::Parse(format!("Image decode failed: {e}")))?;

        debug!(
            "Running OCR ({}) on {}x{} {} image",
            self.recognizer.name(),
            width,
            height,
            format
        );

        let text = self.recognizer.recognize(data).await?;

        Ok(ExtractedContent {
            text,
            metadata: ContentMetadataInfo::default(),
        })
    }
}

/// Decode image to get dimensions and format.
fn decode_image_metadata(bytes: &[u8]) -> Result<(u32, u32, String), String> {
    let img = image::load_from_memory(bytes).map_err(|e| format!("Failed to load image: {e}"))?;

    let (width, height) = img.dimensions();

    let format = image::guess_format(bytes).map_or_else(
        |_| "unknown".to_string(),
        |f| format!("{f:?}").to_lowercase(),
    );

    Ok((width, height, format))
}
