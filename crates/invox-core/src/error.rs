//! Error types for the invox-core library.

use thiserror::Error;

use crate::models::invoice::{InvoiceId, InvoiceStatus};

/// Main error type for the invox library.
#[derive(Error, Debug)]
pub enum InvoxError {
    /// The upload was rejected before any processing.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The structuring capability failed or replied with garbage.
    #[error("structuring failed: {0}")]
    Structuring(#[from] StructuringError),

    /// Persisting or reading invoice records failed.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// A lifecycle operation was refused.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// Remote client construction error.
    #[error("LLM client error: {0}")]
    Llm(#[from] LlmError),

    /// I/O error (staging, config files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking worker panicked or was cancelled.
    #[error("worker task failed: {0}")]
    Task(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors raised at the ingestion boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Only `image/*` and `application/pdf` are accepted.
    #[error("unsupported media type '{0}': only image and PDF files are allowed")]
    UnsupportedMediaType(String),

    /// The payload has no bytes.
    #[error("empty document payload")]
    EmptyPayload,
}

/// Errors related to PDF processing.
#[derive(Error, Debug)]
pub enum PdfError {
    /// Failed to open/parse the PDF file.
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    /// Failed to extract text from PDF.
    #[error("failed to extract text: {0}")]
    TextExtraction(String),

    /// The PDF is encrypted and cannot be processed.
    #[error("PDF is encrypted")]
    Encrypted,

    /// The PDF is empty or has no pages.
    #[error("PDF has no pages")]
    NoPages,

    /// Invalid page number requested.
    #[error("invalid page number: {0}")]
    InvalidPage(u32),
}

/// Errors from either text extractor. These never leave the extraction
/// stage: they are logged and turned into an empty result.
#[derive(Error, Debug)]
pub enum OcrError {
    /// The document could not be decoded into page images.
    #[error("failed to decode document: {0}")]
    Decode(String),

    /// PDF handling failed.
    #[error("PDF error: {0}")]
    Pdf(#[from] PdfError),

    /// Image preprocessing failed.
    #[error("preprocessing failed: {0}")]
    Preprocessing(String),

    /// The OCR engine binary is missing.
    #[error("OCR engine not available: {0}")]
    EngineUnavailable(String),

    /// The OCR engine ran but reported failure.
    #[error("OCR engine failed: {0}")]
    EngineFailed(String),

    /// The remote vision capability failed.
    #[error("vision capability failed: {0}")]
    Remote(#[from] LlmError),

    /// Remote extraction is switched off in configuration.
    #[error("remote extraction disabled")]
    Disabled,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors talking to a chat-completions capability.
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    /// No API key configured.
    #[error("API key not set (expected in ${0})")]
    MissingApiKey(String),

    /// Failed to reach the service.
    #[error("connection error: {0}")]
    Connection(String),

    /// The service answered with a non-success status.
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// The response envelope could not be decoded.
    #[error("failed to parse response: {0}")]
    Parse(String),

    /// The response carried no message content.
    #[error("response contained no content")]
    EmptyResponse,
}

/// Errors from the structuring engine. Always surfaced to the caller.
#[derive(Error, Debug, Clone)]
pub enum StructuringError {
    /// The capability could not be reached or returned an error.
    #[error("structuring capability error: {0}")]
    Capability(#[from] LlmError),

    /// The reply was not a single JSON object.
    #[error("failed to parse structuring reply: {error}")]
    MalformedReply {
        /// Parser diagnostic.
        error: String,
        /// The reply text exactly as received.
        raw_response: String,
    },
}

impl StructuringError {
    /// The unparsed reply, when the failure was a malformed reply.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            StructuringError::MalformedReply { raw_response, .. } => Some(raw_response),
            StructuringError::Capability(_) => None,
        }
    }
}

/// Errors from the invoice store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to (de)serialize the audit payload.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Creating the database directory failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored column held a value that does not decode.
    #[error("corrupt column {column}: {value}")]
    Corrupt { column: &'static str, value: String },

    /// The connection lock was poisoned by a panicking thread.
    #[error("store lock poisoned")]
    Poisoned,
}

/// Errors from lifecycle operations on persisted invoices.
#[derive(Error, Debug)]
pub enum LifecycleError {
    /// No invoice with that id.
    #[error("invoice {0} not found")]
    NotFound(InvoiceId),

    /// The requested transition is not allowed from the current status.
    #[error("invoice {id} is {from}, cannot mark it {to}")]
    InvalidTransition {
        id: InvoiceId,
        from: InvoiceStatus,
        to: InvoiceStatus,
    },

    /// Underlying storage failure.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for the invox library.
pub type Result<T> = std::result::Result<T, InvoxError>;
