//! End-to-end ingestion: validation, staging, dual extraction, arbitration,
//! structuring and persistence.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{InvoxError, Result, ValidationError};
use crate::lifecycle::InvoiceLedger;
use crate::llm::{ChatModel, OpenAiClient};
use crate::models::config::InvoxConfig;
use crate::models::document::{MediaType, RawDocument, Upload};
use crate::models::invoice::{InvoiceId, StructuredInvoice};
use crate::ocr::{
    arbitrate, extract_local, ExtractionResult, ExtractionSource, LocalOcr, Selection,
    TesseractOcr, VisionExtractor,
};
use crate::staging::UploadStaging;
use crate::store::SqliteStore;
use crate::structuring::StructuringEngine;

/// Result of ingesting one document.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub invoice_id: InvoiceId,
    pub invoice: StructuredInvoice,
    /// Extractor whose text was structured.
    pub source: ExtractionSource,
}

/// The assembled pipeline. Built once and shared.
#[derive(Clone)]
pub struct InvoicePipeline {
    local: Arc<dyn LocalOcr>,
    vision: VisionExtractor,
    structurer: StructuringEngine,
    ledger: InvoiceLedger,
    staging: UploadStaging,
}

impl InvoicePipeline {
    pub fn new(
        local: Arc<dyn LocalOcr>,
        vision: VisionExtractor,
        structurer: StructuringEngine,
        ledger: InvoiceLedger,
        staging: UploadStaging,
    ) -> Self {
        Self {
            local,
            vision,
            structurer,
            ledger,
            staging,
        }
    }

    /// Wire Tesseract, the OpenAI-compatible client and the SQLite store
    /// from configuration.
    pub fn from_config(config: &InvoxConfig) -> Result<Self> {
        let model: Arc<dyn ChatModel> = Arc::new(OpenAiClient::from_config(config)?);
        let store = Arc::new(SqliteStore::open(&config.storage.database_path)?);

        Ok(Self::new(
            Arc::new(TesseractOcr::from_config(config)),
            VisionExtractor::from_config(model.clone(), config),
            StructuringEngine::from_config(model, config),
            InvoiceLedger::new(store),
            UploadStaging::new(&config.storage.upload_dir),
        ))
    }

    pub fn ledger(&self) -> &InvoiceLedger {
        &self.ledger
    }

    /// Process one upload into a persisted pending invoice.
    ///
    /// Extraction failures are absorbed; validation, structuring and
    /// persistence failures are returned. The staged copy of the upload is
    /// removed on every path.
    pub async fn process(&self, upload: Upload) -> Result<IngestOutcome> {
        let start = Instant::now();

        let media_type = MediaType::parse(&upload.content_type)?;
        if upload.bytes.is_empty() {
            return Err(ValidationError::EmptyPayload.into());
        }

        info!(
            "Processing {} ({}, {} bytes)",
            upload.filename,
            media_type,
            upload.bytes.len()
        );

        let staged = self.staging.stage(&upload.filename, &upload.bytes)?;
        let doc = RawDocument::new(staged.read()?, media_type);

        let selection = self.extract(&doc).await;
        if selection.text.trim().is_empty() {
            warn!("No text extracted from {}", upload.filename);
        }

        let invoice = self.structurer.structure(&selection.text).await?;

        let ledger = self.ledger.clone();
        let filename = upload.filename;
        let record = tokio::task::spawn_blocking(move || ledger.ingest(&invoice, &filename))
            .await
            .map_err(|e| InvoxError::Task(e.to_string()))??;

        if let Err(e) = staged.discard() {
            warn!("Failed to remove staged upload: {}", e);
        }

        info!(
            "Invoice {} ingested from {} text in {} ms",
            record.id,
            selection.source,
            start.elapsed().as_millis()
        );

        Ok(IngestOutcome {
            invoice_id: record.id,
            invoice: record.data,
            source: selection.source,
        })
    }

    /// Run both extractors concurrently and arbitrate.
    async fn extract(&self, doc: &RawDocument) -> Selection {
        let local = Arc::clone(&self.local);
        let local_doc = doc.clone();
        let local_task =
            tokio::task::spawn_blocking(move || extract_local(local.as_ref(), &local_doc));

        let (local, remote) = tokio::join!(local_task, self.vision.extract(doc));

        let local = local.unwrap_or_else(|e| {
            warn!("Local extraction worker failed: {}", e);
            ExtractionResult::failed(ExtractionSource::Local)
        });

        debug!(
            "Extraction: local success={}, remote success={}",
            local.success, remote.success
        );
        arbitrate(local, remote)
    }
}
