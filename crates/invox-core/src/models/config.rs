//! Configuration structures for the extraction pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration for the invox pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InvoxConfig {
    /// Local OCR configuration.
    pub ocr: OcrConfig,

    /// PDF processing configuration.
    pub pdf: PdfConfig,

    /// Remote API connection settings.
    pub api: ApiConfig,

    /// Remote vision transcription.
    pub vision: VisionConfig,

    /// Structuring capability.
    pub structuring: StructuringConfig,

    /// Persistence and upload staging.
    pub storage: StorageConfig,
}

/// Local OCR engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Tesseract executable.
    pub tesseract_path: PathBuf,

    /// Tesseract language pack(s), e.g. "eng" or "eng+deu".
    pub language: String,

    /// Tesseract engine mode (3 = legacy + LSTM, whichever is available).
    pub engine_mode: u8,

    /// Tesseract page segmentation mode (6 = single uniform block of text).
    pub page_segmentation_mode: u8,

    /// Maximum image dimension (longer side) before preprocessing.
    pub max_image_size: u32,

    /// Non-local-means filter strength.
    pub denoise_strength: f32,

    /// Non-local-means patch size (odd).
    pub denoise_template_window: u32,

    /// Non-local-means search window size (odd).
    pub denoise_search_window: u32,

    /// Adaptive threshold neighbourhood size (odd).
    pub threshold_block_size: u32,

    /// Constant subtracted from the weighted neighbourhood mean.
    pub threshold_offset: f32,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            tesseract_path: PathBuf::from("tesseract"),
            language: "eng".to_string(),
            engine_mode: 3,
            page_segmentation_mode: 6,
            max_image_size: 2048,
            denoise_strength: 3.0,
            denoise_template_window: 7,
            denoise_search_window: 21,
            threshold_block_size: 11,
            threshold_offset: 2.0,
        }
    }
}

/// PDF processing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfConfig {
    /// Maximum pages to rasterize and OCR (0 = unlimited).
    pub max_pages: usize,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self { max_pages: 10 }
    }
}

/// OpenAI-compatible API connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL, without the `/chat/completions` suffix.
    pub base_url: String,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    /// Per-request timeout in seconds (unset = wait indefinitely).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: None,
        }
    }
}

/// Remote vision transcription settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// Run the remote extractor at all.
    pub enabled: bool,

    /// Multimodal model name.
    pub model: String,

    /// Reply length cap.
    pub max_tokens: u32,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: "gpt-4o".to_string(),
            max_tokens: 1000,
        }
    }
}

/// Structuring capability settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StructuringConfig {
    /// Language model name.
    pub model: String,

    /// Sampling temperature; keep low for repeatable output.
    pub temperature: f32,
}

impl Default for StructuringConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4".to_string(),
            temperature: 0.1,
        }
    }
}

/// Persistence and upload staging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file.
    pub database_path: PathBuf,

    /// Directory where uploads are staged while being processed.
    pub upload_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("invoices.db"),
            upload_dir: PathBuf::from("./uploads"),
        }
    }
}

impl InvoxConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }

    /// Apply `UPLOAD_DIR` and `INVOX_DATABASE` from the environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(
            std::env::var("UPLOAD_DIR").ok(),
            std::env::var("INVOX_DATABASE").ok(),
        )
    }

    fn with_overrides(mut self, upload_dir: Option<String>, database: Option<String>) -> Self {
        if let Some(dir) = upload_dir.filter(|d| !d.trim().is_empty()) {
            self.storage.upload_dir = PathBuf::from(dir);
        }
        if let Some(db) = database.filter(|d| !d.trim().is_empty()) {
            self.storage.database_path = PathBuf::from(db);
        }
        self
    }

    /// Read the API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_document_ocr_settings() {
        let config = InvoxConfig::default();
        assert_eq!(config.ocr.engine_mode, 3);
        assert_eq!(config.ocr.page_segmentation_mode, 6);
        assert_eq!(config.ocr.threshold_block_size, 11);
        assert_eq!(config.structuring.temperature, 0.1);
        assert_eq!(config.api.timeout_secs, None);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: InvoxConfig =
            serde_json::from_str(r#"{"storage": {"database_path": "/tmp/x.db"}}"#).unwrap();
        assert_eq!(config.storage.database_path, PathBuf::from("/tmp/x.db"));
        assert_eq!(config.storage.upload_dir, PathBuf::from("./uploads"));
        assert_eq!(config.vision.model, "gpt-4o");
    }

    #[test]
    fn test_overrides() {
        let config = InvoxConfig::default()
            .with_overrides(Some("/var/uploads".to_string()), Some("  ".to_string()));
        assert_eq!(config.storage.upload_dir, PathBuf::from("/var/uploads"));
        assert_eq!(config.storage.database_path, PathBuf::from("invoices.db"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = InvoxConfig::default();
        config.ocr.language = "eng+deu".to_string();
        config.save(&path).unwrap();

        let loaded = InvoxConfig::from_file(&path).unwrap();
        assert_eq!(loaded.ocr.language, "eng+deu");
    }
}
