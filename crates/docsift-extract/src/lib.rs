//! # docsift-extract
//!
//! Text extraction for the formats docsift accepts.
//!
//! Every extractor works on the raw bytes of a submitted document and
//! produces [`ExtractedContent`](docsift_core::ExtractedContent) for the
//! embedding stage.
//!
//! ## Supported Formats
//!
//! | Extractor | Format | Notes |
//! |-----------|--------|-------|
//! | [`PdfExtractor`] | `pdf` | Text layer only; scanned pages yield no text |
//! | [`DocxExtractor`] | `docx` | Paragraph text from `word/document.xml`, title from core properties |
//! | [`ImageExtractor`] | `image` | OCR through a [`TextRecognizer`] |
//! | [`TextExtractor`] | `plaintext` | UTF-8, BOM stripped, CRLF normalized |
//!
//! ## Usage
//!
//! ```rust,ignore
//! use docsift_core::DocumentFormat;
//! use docsift_extract::{ExtractorRegistry, TesseractRecognizer};
//! use std::sync::Arc;
//!
//! let registry = ExtractorRegistry::with_defaults(Arc::new(TesseractRecognizer::default()));
//! let content = registry.extract(DocumentFormat::Pdf, &bytes).await?;
//! println!("Extracted {} chars", content.text.len());
//! ```
//!
//! CPU-bound parsers run on the blocking thread pool so a slow document
//! never stalls the async runtime.

pub mod docx;
pub mod image;
pub mod ocr;
pub mod pdf;
pub mod registry;
pub mod text;

pub use docx::DocxExtractor;
pub use image::ImageExtractor;
pub use ocr::{TesseractRecognizer, TextRecognizer};
pub use pdf::PdfExtractor;
pub use registry::ExtractorRegistry;
pub use text::TextExtractor;
