//! Uploaded documents and their declared media types.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Declared media type of an uploaded document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    /// `image/<subtype>`.
    Image(String),
    /// `application/pdf`.
    Pdf,
}

impl MediaType {
    /// Parse a declared content type, rejecting anything that is not an
    /// image or a PDF.
    pub fn parse(content_type: &str) -> Result<Self, ValidationError> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if essence == "application/pdf" {
            return Ok(MediaType::Pdf);
        }

        match essence.strip_prefix("image/") {
            Some(subtype) if !subtype.is_empty() => Ok(MediaType::Image(subtype.to_string())),
            _ => Err(ValidationError::UnsupportedMediaType(content_type.to_string())),
        }
    }

    /// Canonical `type/subtype` string.
    pub fn essence(&self) -> String {
        match self {
            MediaType::Image(subtype) => format!("image/{}", subtype),
            MediaType::Pdf => "application/pdf".to_string(),
        }
    }

    pub fn is_pdf(&self) -> bool {
        matches!(self, MediaType::Pdf)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.essence())
    }
}

/// Document content handed to the extractors.
///
/// Cloning shares the byte buffer, so a copy can be moved onto a blocking
/// worker without duplicating the payload.
#[derive(Debug, Clone)]
pub struct RawDocument {
    bytes: Arc<[u8]>,
    media_type: MediaType,
}

impl RawDocument {
    pub fn new(bytes: impl Into<Arc<[u8]>>, media_type: MediaType) -> Self {
        Self {
            bytes: bytes.into(),
            media_type,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn media_type(&self) -> &MediaType {
        &self.media_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// A document as received at the ingestion boundary, before validation.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Client-supplied filename.
    pub filename: String,
    /// Client-declared content type.
    pub content_type: String,
    /// Payload.
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_accepts_images_and_pdf() {
        assert_eq!(MediaType::parse("application/pdf"), Ok(MediaType::Pdf));
        assert_eq!(
            MediaType::parse("image/png"),
            Ok(MediaType::Image("png".to_string()))
        );
        assert_eq!(
            MediaType::parse("Image/JPEG; charset=binary"),
            Ok(MediaType::Image("jpeg".to_string()))
        );
    }

    #[test]
    fn test_media_type_rejects_others() {
        for declared in ["text/plain", "application/json", "image/", "", "imagepng"] {
            assert_eq!(
                MediaType::parse(declared),
                Err(ValidationError::UnsupportedMediaType(declared.to_string())),
                "{declared} should be rejected"
            );
        }
    }

    #[test]
    fn test_raw_document_clone_shares_bytes() {
        let doc = RawDocument::new(vec![1u8, 2, 3], MediaType::Pdf);
        let copy = doc.clone();
        assert_eq!(copy.bytes().as_ptr(), doc.bytes().as_ptr());
        assert_eq!(copy.len(), 3);
    }
}
