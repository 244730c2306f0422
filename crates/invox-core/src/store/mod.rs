//! Persistence of invoice records.

mod sqlite;

pub use sqlite::SqliteStore;

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::models::invoice::{Invoice, InvoiceId, InvoiceStatus, StructuredInvoice};

/// Storage backend for invoice headers and their line items.
///
/// Implementations are synchronous; async callers run them on a blocking
/// worker.
pub trait InvoiceStore: Send + Sync {
    /// Insert a pending header and all of its line items atomically.
    fn insert(&self, filename: &str, data: &StructuredInvoice) -> Result<Invoice, StoreError>;

    /// Fetch one invoice with its line items.
    fn get(&self, id: InvoiceId) -> Result<Option<Invoice>, StoreError>;

    /// All invoices in insertion order, optionally restricted to a status.
    fn list(&self, status: Option<InvoiceStatus>) -> Result<Vec<Invoice>, StoreError>;

    /// Set the status to `to` and stamp `updated_at`. With `from`, only if the
    /// status is currently `from`. Returns whether a row changed.
    fn transition(
        &self,
        id: InvoiceId,
        from: Option<InvoiceStatus>,
        to: InvoiceStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;
}
