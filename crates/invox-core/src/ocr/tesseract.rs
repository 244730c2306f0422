//! Local extractor: preprocessing followed by the Tesseract command-line
//! engine.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

use image::GrayImage;
use tracing::{debug, info};

use super::preprocessing::ImagePreprocessor;
use super::{document_pages, DocumentPages, LocalOcr};
use crate::error::OcrError;
use crate::models::config::{InvoxConfig, OcrConfig};
use crate::models::document::RawDocument;

/// Tesseract-backed local OCR.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    binary: PathBuf,
    language: String,
    engine_mode: u8,
    page_segmentation_mode: u8,
    max_pages: usize,
    preprocessor: ImagePreprocessor,
}

impl TesseractOcr {
    pub fn new(config: &OcrConfig) -> Self {
        Self {
            binary: config.tesseract_path.clone(),
            language: config.language.clone(),
            engine_mode: config.engine_mode,
            page_segmentation_mode: config.page_segmentation_mode,
            max_pages: 10,
            preprocessor: ImagePreprocessor::from_config(config),
        }
    }

    pub fn from_config(config: &InvoxConfig) -> Self {
        Self::new(&config.ocr).with_max_pages(config.pdf.max_pages)
    }

    /// Limit the number of PDF pages processed (0 = all).
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Whether the configured binary can be executed.
    pub fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Command-line arguments for one page image.
    fn args(&self, image_path: &Path) -> Vec<String> {
        vec![
            image_path.display().to_string(),
            "stdout".to_string(),
            "--oem".to_string(),
            self.engine_mode.to_string(),
            "--psm".to_string(),
            self.page_segmentation_mode.to_string(),
            "-l".to_string(),
            self.language.clone(),
        ]
    }

    fn run_tesseract(&self, image_path: &Path) -> Result<String, OcrError> {
        let output = Command::new(&self.binary).args(self.args(image_path)).output();

        match output {
            Ok(output) if output.status.success() => {
                Ok(String::from_utf8_lossy(&output.stdout).to_string())
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(OcrError::EngineFailed(format!(
                    "tesseract exited with {}: {}",
                    output.status,
                    stderr.trim()
                )))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(
                OcrError::EngineUnavailable(format!("{} not found", self.binary.display())),
            ),
            Err(e) => Err(OcrError::Io(e)),
        }
    }

    /// OCR one binarized page through a temporary PNG.
    fn recognize_page(&self, page: &GrayImage) -> Result<String, OcrError> {
        let file = tempfile::Builder::new()
            .prefix("invox-page-")
            .suffix(".png")
            .tempfile()?;
        page.save_with_format(file.path(), image::ImageFormat::Png)
            .map_err(|e| OcrError::Preprocessing(format!("failed to write page image: {}", e)))?;

        self.run_tesseract(file.path())
    }
}

impl LocalOcr for TesseractOcr {
    fn recognize(&self, doc: &RawDocument) -> Result<String, OcrError> {
        let start = Instant::now();

        let images = match document_pages(doc, self.max_pages)? {
            DocumentPages::Images(images) => images,
            DocumentPages::TextLayer(text) => return Ok(text.trim().to_string()),
        };

        let mut texts = Vec::with_capacity(images.len());
        for (idx, image) in images.iter().enumerate() {
            let binary = self.preprocessor.prepare(image)?;
            let text = self.recognize_page(&binary)?;
            debug!("Page {}: {} chars", idx + 1, text.trim().len());
            texts.push(text.trim().to_string());
        }

        let text = join_pages(&texts);
        info!(
            "Tesseract recognized {} pages in {} ms",
            texts.len(),
            start.elapsed().as_millis()
        );
        Ok(text)
    }
}

/// Join page texts with a blank line, skipping empty pages.
fn join_pages(pages: &[String]) -> String {
    pages
        .iter()
        .filter(|p| !p.is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::document::MediaType;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_args_use_configured_modes() {
        let ocr = TesseractOcr::new(&OcrConfig::default());
        assert_eq!(
            ocr.args(Path::new("/tmp/page.png")),
            vec!["/tmp/page.png", "stdout", "--oem", "3", "--psm", "6", "-l", "eng"]
        );
    }

    #[test]
    fn test_join_pages() {
        let pages = vec!["Page one".to_string(), String::new(), "Page two".to_string()];
        assert_eq!(join_pages(&pages), "Page one\n\nPage two");
        assert_eq!(join_pages(&[]), "");
    }

    #[test]
    fn test_missing_binary_is_unavailable() {
        let config = OcrConfig {
            tesseract_path: PathBuf::from("/nonexistent/tesseract-binary"),
            ..OcrConfig::default()
        };
        let ocr = TesseractOcr::new(&config);
        assert!(!ocr.is_available());

        let page = GrayImage::from_pixel(4, 4, image::Luma([255]));
        assert!(matches!(
            ocr.recognize_page(&page),
            Err(OcrError::EngineUnavailable(_))
        ));
    }

    #[test]
    fn test_undecodable_document_fails() {
        let ocr = TesseractOcr::new(&OcrConfig::default());
        let doc = RawDocument::new(vec![0u8; 16], MediaType::Image("jpeg".to_string()));
        assert!(matches!(ocr.recognize(&doc), Err(OcrError::Decode(_))));
    }
}
