//! Record lifecycle: ingestion of structured invoices and review
//! transitions (any -> approved, pending -> rejected).

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::error::LifecycleError;
use crate::models::invoice::{Invoice, InvoiceId, InvoiceStatus, StructuredInvoice};
use crate::store::InvoiceStore;

/// Lifecycle manager over an [`InvoiceStore`].
#[derive(Clone)]
pub struct InvoiceLedger {
    store: Arc<dyn InvoiceStore>,
}

impl InvoiceLedger {
    pub fn new(store: Arc<dyn InvoiceStore>) -> Self {
        Self { store }
    }

    /// Persist a new pending record with all of its line items.
    pub fn ingest(&self, data: &StructuredInvoice, filename: &str) -> Result<Invoice, LifecycleError> {
        let invoice = self.store.insert(filename, data)?;
        info!(
            "Ingested invoice {} from {} ({} line items)",
            invoice.id,
            filename,
            invoice.data.line_items.len()
        );
        Ok(invoice)
    }

    pub fn get(&self, id: InvoiceId) -> Result<Option<Invoice>, LifecycleError> {
        Ok(self.store.get(id)?)
    }

    /// Like [`get`](Self::get) but an unknown id is an error.
    pub fn require(&self, id: InvoiceId) -> Result<Invoice, LifecycleError> {
        self.get(id)?.ok_or(LifecycleError::NotFound(id))
    }

    pub fn list(&self, status: Option<InvoiceStatus>) -> Result<Vec<Invoice>, LifecycleError> {
        Ok(self.store.list(status)?)
    }

    /// Mark an existing record approved, whatever its current status, and
    /// refresh its update timestamp.
    pub fn approve(&self, id: InvoiceId) -> Result<Invoice, LifecycleError> {
        if !self
            .store
            .transition(id, None, InvoiceStatus::Approved, Utc::now())?
        {
            return Err(LifecycleError::NotFound(id));
        }

        info!("Invoice {} marked {}", id, InvoiceStatus::Approved);
        self.require(id)
    }

    /// Mark a pending record rejected. Rejecting a rejected record is a
    /// no-op; an approved record cannot be rejected.
    pub fn reject(&self, id: InvoiceId) -> Result<Invoice, LifecycleError> {
        let to = InvoiceStatus::Rejected;
        let current = self.require(id)?;

        if current.status == to {
            return Ok(current);
        }
        if current.status != InvoiceStatus::Pending {
            return Err(LifecycleError::InvalidTransition {
                id,
                from: current.status,
                to,
            });
        }

        if !self
            .store
            .transition(id, Some(InvoiceStatus::Pending), to, Utc::now())?
        {
            // Changed between the read and the update
            let now = self.require(id)?;
            if now.status == to {
                return Ok(now);
            }
            return Err(LifecycleError::InvalidTransition {
                id,
                from: now.status,
                to,
            });
        }

        info!("Invoice {} marked {}", id, to);
        self.require(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use pretty_assertions::assert_eq;

    fn ledger() -> InvoiceLedger {
        InvoiceLedger::new(Arc::new(SqliteStore::open_in_memory().unwrap()))
    }

    #[test]
    fn test_ingest_creates_pending_record() {
        let ledger = ledger();
        let invoice = ledger
            .ingest(&StructuredInvoice::new("text"), "scan.png")
            .unwrap();

        assert_eq!(invoice.status, InvoiceStatus::Pending);
        assert_eq!(invoice.data.total_amount, None);
        assert_eq!(ledger.get(invoice.id).unwrap(), Some(invoice));
    }

    #[test]
    fn test_approve_pending() {
        let ledger = ledger();
        let invoice = ledger.ingest(&StructuredInvoice::new("t"), "a.png").unwrap();

        let approved = ledger.approve(invoice.id).unwrap();
        assert_eq!(approved.status, InvoiceStatus::Approved);
        assert!(approved.updated_at >= invoice.updated_at);
        assert_eq!(approved.data, invoice.data);
    }

    #[test]
    fn test_approve_unknown_creates_nothing() {
        let ledger = ledger();
        let err = ledger.approve(InvoiceId(42)).unwrap_err();
        assert!(matches!(err, LifecycleError::NotFound(InvoiceId(42))));
        assert!(ledger.list(None).unwrap().is_empty());
        assert!(ledger.get(InvoiceId(42)).unwrap().is_none());
    }

    #[test]
    fn test_reject_repeat_is_idempotent() {
        let ledger = ledger();
        let invoice = ledger.ingest(&StructuredInvoice::new("t"), "a.png").unwrap();

        let first = ledger.reject(invoice.id).unwrap();
        let second = ledger.reject(invoice.id).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_approve_rejected_record() {
        let ledger = ledger();
        let invoice = ledger.ingest(&StructuredInvoice::new("t"), "a.png").unwrap();
        let rejected = ledger.reject(invoice.id).unwrap();

        let approved = ledger.approve(invoice.id).unwrap();
        assert_eq!(approved.status, InvoiceStatus::Approved);
        assert!(approved.updated_at >= rejected.updated_at);
        assert_eq!(
            ledger.require(invoice.id).unwrap().status,
            InvoiceStatus::Approved
        );
    }

    #[test]
    fn test_approve_again_refreshes_timestamp() {
        let ledger = ledger();
        let invoice = ledger.ingest(&StructuredInvoice::new("t"), "a.png").unwrap();

        let first = ledger.approve(invoice.id).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = ledger.approve(invoice.id).unwrap();
        assert_eq!(second.status, InvoiceStatus::Approved);
        assert!(second.updated_at > first.updated_at);
    }

    #[test]
    fn test_reject_approved_refused() {
        let ledger = ledger();
        let invoice = ledger.ingest(&StructuredInvoice::new("t"), "a.png").unwrap();
        ledger.approve(invoice.id).unwrap();

        let err = ledger.reject(invoice.id).unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::InvalidTransition {
                from: InvoiceStatus::Approved,
                to: InvoiceStatus::Rejected,
                ..
            }
        ));
        assert_eq!(
            ledger.require(invoice.id).unwrap().status,
            InvoiceStatus::Approved
        );
    }

    #[test]
    fn test_reject_unknown_is_not_found() {
        let ledger = ledger();
        let err = ledger.reject(InvoiceId(7)).unwrap_err();
        assert!(matches!(err, LifecycleError::NotFound(InvoiceId(7))));
    }

    #[test]
    fn test_list_filters_by_status() {
        let ledger = ledger();
        let a = ledger.ingest(&StructuredInvoice::new("a"), "a.png").unwrap();
        let b = ledger.ingest(&StructuredInvoice::new("b"), "b.png").unwrap();
        ledger.approve(b.id).unwrap();

        let pending = ledger.list(Some(InvoiceStatus::Pending)).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, a.id);
        assert_eq!(ledger.list(None).unwrap().len(), 2);
    }
}
