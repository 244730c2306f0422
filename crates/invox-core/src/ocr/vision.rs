//! Remote extractor: transcription by a multimodal chat model.

use std::io::Cursor;
use std::sync::Arc;

use base64::Engine;
use tracing::{debug, warn};

use super::{document_pages, DocumentPages, ExtractionResult, ExtractionSource};
use crate::error::OcrError;
use crate::llm::{ChatMessage, ChatModel, ChatRequest, ContentPart};
use crate::models::config::InvoxConfig;
use crate::models::document::{MediaType, RawDocument};

/// Instruction sent with every transcription request.
pub const TRANSCRIBE_INSTRUCTION: &str = "Extract all text from this invoice. \
Transcribe it verbatim and maintain the original structure and formatting: \
keep line breaks and the alignment of tables and columns. \
Return only the extracted text, without explanations or commentary.";

/// Vision transcription over a [`ChatModel`].
#[derive(Clone)]
pub struct VisionExtractor {
    model: Arc<dyn ChatModel>,
    model_name: String,
    max_tokens: u32,
    max_pages: usize,
    enabled: bool,
}

impl VisionExtractor {
    pub fn new(model: Arc<dyn ChatModel>, model_name: impl Into<String>) -> Self {
        Self {
            model,
            model_name: model_name.into(),
            max_tokens: 1000,
            max_pages: 10,
            enabled: true,
        }
    }

    pub fn from_config(model: Arc<dyn ChatModel>, config: &InvoxConfig) -> Self {
        Self::new(model, config.vision.model.clone())
            .with_max_tokens(config.vision.max_tokens)
            .with_max_pages(config.pdf.max_pages)
            .with_enabled(config.vision.enabled)
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Transcribe the document, absorbing any failure into an empty result.
    pub async fn extract(&self, doc: &RawDocument) -> ExtractionResult {
        match self.transcribe(doc).await {
            Ok(text) => {
                debug!("Remote extraction produced {} chars", text.chars().count());
                ExtractionResult::succeeded(ExtractionSource::Remote, text)
            }
            Err(OcrError::Disabled) => {
                debug!("Remote extraction disabled");
                ExtractionResult::failed(ExtractionSource::Remote)
            }
            Err(e) => {
                warn!("Remote extraction failed: {}", e);
                ExtractionResult::failed(ExtractionSource::Remote)
            }
        }
    }

    /// One request carrying every page image; single attempt.
    pub async fn transcribe(&self, doc: &RawDocument) -> Result<String, OcrError> {
        if !self.enabled {
            return Err(OcrError::Disabled);
        }

        // PDF parsing and PNG encoding stay off the async executor
        let pages = doc.clone();
        let max_pages = self.max_pages;
        let images = tokio::task::spawn_blocking(move || image_parts(&pages, max_pages))
            .await
            .map_err(|e| OcrError::EngineFailed(format!("page encoding worker failed: {}", e)))??;

        let mut parts = vec![ContentPart::text(TRANSCRIBE_INSTRUCTION)];
        parts.extend(images);

        let request = ChatRequest::new(&self.model_name, vec![ChatMessage::user_parts(parts)])
            .with_max_tokens(self.max_tokens);

        let reply = self.model.complete(&request).await?;
        Ok(reply.trim().to_string())
    }
}

/// Images pass through with their declared type; PDF pages are
/// re-encoded as PNG.
fn image_parts(doc: &RawDocument, max_pages: usize) -> Result<Vec<ContentPart>, OcrError> {
    let b64 = base64::engine::general_purpose::STANDARD;

    match doc.media_type() {
        MediaType::Image(_) => {
            if doc.is_empty() {
                return Err(OcrError::Decode("document has no bytes".to_string()));
            }
            let essence = doc.media_type().essence();
            Ok(vec![ContentPart::data_url(&essence, &b64.encode(doc.bytes()))])
        }
        MediaType::Pdf => match document_pages(doc, max_pages)? {
            DocumentPages::Images(pages) => pages
                .iter()
                .map(|page| {
                    let mut png = Vec::new();
                    page.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
                        .map_err(|e| OcrError::Decode(format!("PNG encoding failed: {}", e)))?;
                    Ok(ContentPart::data_url("image/png", &b64.encode(&png)))
                })
                .collect(),
            DocumentPages::TextLayer(_) => Err(OcrError::Decode(
                "PDF has no page images to transcribe".to_string(),
            )),
        },
    }
}
