//! Text extraction: local Tesseract OCR, remote vision transcription and the
//! arbiter choosing between them.

mod arbiter;
mod preprocessing;
mod tesseract;
mod vision;

pub use arbiter::{arbitrate, Selection};
pub use preprocessing::ImagePreprocessor;
pub use tesseract::TesseractOcr;
pub use vision::{VisionExtractor, TRANSCRIBE_INSTRUCTION};

use std::fmt;

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::OcrError;
use crate::models::document::{MediaType, RawDocument};
use crate::pdf::{PdfExtractor, PdfProcessor};

/// Which extractor produced a piece of text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionSource {
    /// Offline preprocessing + Tesseract.
    Local,
    /// Remote multimodal transcription.
    Remote,
}

impl fmt::Display for ExtractionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionSource::Local => f.write_str("local"),
            ExtractionSource::Remote => f.write_str("remote"),
        }
    }
}

/// Text candidate produced by one extractor.
///
/// "No text found" is an empty, successful result; failures are empty and
/// unsuccessful. Neither is an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub source: ExtractionSource,
    pub text: String,
    pub success: bool,
}

impl ExtractionResult {
    pub fn succeeded(source: ExtractionSource, text: impl Into<String>) -> Self {
        Self {
            source,
            text: text.into(),
            success: true,
        }
    }

    pub fn failed(source: ExtractionSource) -> Self {
        Self {
            source,
            text: String::new(),
            success: false,
        }
    }

    /// Length in Unicode scalar values.
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// Synchronous, CPU-bound text extractor run on a blocking worker.
pub trait LocalOcr: Send + Sync {
    /// Recognize all text in the document.
    fn recognize(&self, doc: &RawDocument) -> Result<String, OcrError>;
}

/// Run the local extractor, absorbing any failure into an empty result.
pub fn extract_local(ocr: &dyn LocalOcr, doc: &RawDocument) -> ExtractionResult {
    match ocr.recognize(doc) {
        Ok(text) => {
            let text = text.trim().to_string();
            debug!("Local extraction produced {} chars", text.chars().count());
            ExtractionResult::succeeded(ExtractionSource::Local, text)
        }
        Err(e) => {
            warn!("Local extraction failed: {}", e);
            ExtractionResult::failed(ExtractionSource::Local)
        }
    }
}

/// A document decoded for OCR.
pub enum DocumentPages {
    /// Raster pages in document order.
    Images(Vec<DynamicImage>),
    /// A PDF without page images; its embedded text layer.
    TextLayer(String),
}

/// Decode a document into page images (up to `max_pages` for PDFs, 0 = all).
pub fn document_pages(doc: &RawDocument, max_pages: usize) -> Result<DocumentPages, OcrError> {
    if doc.is_empty() {
        return Err(OcrError::Decode("document has no bytes".to_string()));
    }

    match doc.media_type() {
        MediaType::Image(subtype) => {
            let image = image::load_from_memory(doc.bytes())
                .map_err(|e| OcrError::Decode(format!("image/{}: {}", subtype, e)))?;
            Ok(DocumentPages::Images(vec![image]))
        }
        MediaType::Pdf => {
            let pdf = PdfExtractor::from_bytes(doc.bytes())?;
            let pages = pdf.page_images(max_pages)?;
            if pages.is_empty() {
                debug!("PDF has no page images, using text layer");
                Ok(DocumentPages::TextLayer(pdf.extract_text()?))
            } else {
                Ok(DocumentPages::Images(pages))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};
    use std::io::Cursor;

    struct FixedOcr(Result<&'static str, &'static str>);

    impl LocalOcr for FixedOcr {
        fn recognize(&self, _doc: &RawDocument) -> Result<String, OcrError> {
            self.0
                .map(str::to_string)
                .map_err(|e| OcrError::EngineFailed(e.to_string()))
        }
    }

    fn png_document() -> RawDocument {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(8, 4, Luma([200])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        RawDocument::new(buf, MediaType::Image("png".to_string()))
    }

    #[test]
    fn test_extract_local_trims_text() {
        let result = extract_local(&FixedOcr(Ok("  INVOICE 42 \n\n")), &png_document());
        assert_eq!(
            result,
            ExtractionResult::succeeded(ExtractionSource::Local, "INVOICE 42")
        );
    }

    #[test]
    fn test_extract_local_absorbs_failure() {
        let result = extract_local(&FixedOcr(Err("boom")), &png_document());
        assert_eq!(result, ExtractionResult::failed(ExtractionSource::Local));
    }

    #[test]
    fn test_document_pages_decodes_image() {
        match document_pages(&png_document(), 10).unwrap() {
            DocumentPages::Images(pages) => {
                assert_eq!(pages.len(), 1);
                assert_eq!((pages[0].width(), pages[0].height()), (8, 4));
            }
            DocumentPages::TextLayer(_) => panic!("expected image pages"),
        }
    }

    #[test]
    fn test_document_pages_rejects_corrupt_input() {
        let doc = RawDocument::new(b"garbage".to_vec(), MediaType::Image("png".to_string()));
        assert!(matches!(document_pages(&doc, 10), Err(OcrError::Decode(_))));

        let doc = RawDocument::new(b"garbage".to_vec(), MediaType::Pdf);
        assert!(matches!(document_pages(&doc, 10), Err(OcrError::Pdf(_))));
    }

    #[test]
    fn test_char_count_uses_scalar_values() {
        let result = ExtractionResult::succeeded(ExtractionSource::Remote, "Zürich €");
        assert_eq!(result.char_count(), 8);
    }
}
