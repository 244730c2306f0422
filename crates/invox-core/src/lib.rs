//! Core library for invoice document extraction.
//!
//! This crate provides:
//! - Local OCR (image preprocessing + Tesseract) and remote vision transcription
//! - Arbitration between the two text candidates
//! - LLM structuring of raw text into typed invoice records
//! - SQLite persistence and the pending/approved/rejected review lifecycle

pub mod error;
pub mod lifecycle;
pub mod llm;
pub mod models;
pub mod ocr;
pub mod pdf;
pub mod pipeline;
pub mod staging;
pub mod store;
pub mod structuring;

pub use error::{InvoxError, Result};
pub use lifecycle::InvoiceLedger;
pub use llm::{ChatModel, OpenAiClient};
pub use models::config::InvoxConfig;
pub use models::document::{MediaType, RawDocument, Upload};
pub use models::invoice::{Invoice, InvoiceId, InvoiceStatus, LineItem, StructuredInvoice};
pub use ocr::{ExtractionResult, ExtractionSource, LocalOcr, TesseractOcr, VisionExtractor};
pub use pipeline::{IngestOutcome, InvoicePipeline};
pub use store::{InvoiceStore, SqliteStore};
pub use structuring::StructuringEngine;
