//! SQLite-backed invoice store.

use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use tracing::{debug, info};

use super::InvoiceStore;
use crate::error::StoreError;
use crate::models::invoice::{Invoice, InvoiceId, InvoiceStatus, LineItem, StructuredInvoice};

const SCHEMA: &str = "
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS invoices (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        filename TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending'
            CHECK (status IN ('pending', 'approved', 'rejected')),
        vendor_name TEXT,
        invoice_number TEXT,
        invoice_date TEXT,
        due_date TEXT,
        total_amount TEXT,
        tax_amount TEXT,
        currency TEXT NOT NULL DEFAULT 'USD',
        confidence_score REAL NOT NULL DEFAULT 0,
        validation_notes TEXT NOT NULL DEFAULT '',
        raw_text TEXT NOT NULL DEFAULT '',
        flags TEXT NOT NULL DEFAULT '[]',
        processed_data TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS line_items (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        invoice_id INTEGER NOT NULL REFERENCES invoices(id) ON DELETE CASCADE,
        position INTEGER NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        quantity TEXT,
        unit_price TEXT,
        total_price TEXT,
        tax_rate TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_invoices_status ON invoices(status);
    CREATE INDEX IF NOT EXISTS idx_line_items_invoice ON line_items(invoice_id, position);
";

const HEADER_COLUMNS: &str = "id, filename, status, vendor_name, invoice_number, invoice_date, \
     due_date, total_amount, tax_amount, currency, confidence_score, validation_notes, raw_text, \
     flags, created_at, updated_at";

/// Invoice store over a single SQLite connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file, creating parent directories.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        info!("Opened invoice database {}", path.display());
        Self::init(conn)
    }

    /// Private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl InvoiceStore for SqliteStore {
    fn insert(&self, filename: &str, data: &StructuredInvoice) -> Result<Invoice, StoreError> {
        let now = Utc::now();
        let processed_data = serde_json::to_string(data)?;
        let flags = serde_json::to_string(&data.flags)?;

        let mut conn = self.lock()?;
        // Rolled back on drop unless committed
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO invoices (filename, status, vendor_name, invoice_number, invoice_date, \
             due_date, total_amount, tax_amount, currency, confidence_score, validation_notes, \
             raw_text, flags, processed_data, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?15)",
            params![
                filename,
                InvoiceStatus::Pending.as_str(),
                data.vendor_name,
                data.invoice_number,
                data.invoice_date.map(|d| d.to_string()),
                data.due_date.map(|d| d.to_string()),
                data.total_amount.map(|d| d.to_string()),
                data.tax_amount.map(|d| d.to_string()),
                data.currency,
                f64::from(data.confidence_score),
                data.validation_notes,
                data.raw_text,
                flags,
                processed_data,
                now.to_rfc3339(),
            ],
        )?;
        let id = tx.last_insert_rowid();

        {
            let mut stmt = tx.prepare(
                "INSERT INTO line_items (invoice_id, position, description, quantity, unit_price, \
                 total_price, tax_rate) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for (position, item) in data.line_items.iter().enumerate() {
                stmt.execute(params![
                    id,
                    position as i64,
                    item.description,
                    item.quantity.map(|d| d.to_string()),
                    item.unit_price.map(|d| d.to_string()),
                    item.total_price.map(|d| d.to_string()),
                    item.tax_rate.map(|d| d.to_string()),
                ])?;
            }
        }

        tx.commit()?;
        debug!(
            "Inserted invoice {} with {} line items",
            id,
            data.line_items.len()
        );

        Ok(Invoice {
            id: InvoiceId(id),
            filename: filename.to_string(),
            status: InvoiceStatus::Pending,
            created_at: now,
            updated_at: now,
            data: data.clone(),
        })
    }

    fn get(&self, id: InvoiceId) -> Result<Option<Invoice>, StoreError> {
        let conn = self.lock()?;
        let header = conn
            .query_row(
                &format!("SELECT {} FROM invoices WHERE id = ?1", HEADER_COLUMNS),
                params![id.0],
                HeaderRow::from_row,
            )
            .optional()?;

        match header {
            Some(header) => {
                let items = load_line_items(&conn, header.id)?;
                header.into_invoice(items).map(Some)
            }
            None => Ok(None),
        }
    }

    fn list(&self, status: Option<InvoiceStatus>) -> Result<Vec<Invoice>, StoreError> {
        let conn = self.lock()?;
        let headers = {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM invoices WHERE (?1 IS NULL OR status = ?1) ORDER BY id",
                HEADER_COLUMNS
            ))?;
            stmt.query_map(params![status.map(|s| s.as_str())], HeaderRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?
        };

        headers
            .into_iter()
            .map(|header| {
                let items = load_line_items(&conn, header.id)?;
                header.into_invoice(items)
            })
            .collect()
    }

    fn transition(
        &self,
        id: InvoiceId,
        from: Option<InvoiceStatus>,
        to: InvoiceStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE invoices SET status = ?1, updated_at = ?2 \
             WHERE id = ?3 AND (?4 IS NULL OR status = ?4)",
            params![to.as_str(), at.to_rfc3339(), id.0, from.map(|s| s.as_str())],
        )?;
        Ok(changed == 1)
    }
}

fn load_line_items(conn: &Connection, invoice_id: i64) -> Result<Vec<LineItem>, StoreError> {
    let mut stmt = conn.prepare_cached(
        "SELECT description, quantity, unit_price, total_price, tax_rate \
         FROM line_items WHERE invoice_id = ?1 ORDER BY position",
    )?;

    let rows = stmt
        .query_map(params![invoice_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(description, quantity, unit_price, total_price, tax_rate)| {
            Ok(LineItem {
                description,
                quantity: decimal_column("line_items.quantity", quantity)?,
                unit_price: decimal_column("line_items.unit_price", unit_price)?,
                total_price: decimal_column("line_items.total_price", total_price)?,
                tax_rate: decimal_column("line_items.tax_rate", tax_rate)?,
            })
        })
        .collect()
}

/// Header columns as stored, before decoding.
struct HeaderRow {
    id: i64,
    filename: String,
    status: String,
    vendor_name: Option<String>,
    invoice_number: Option<String>,
    invoice_date: Option<String>,
    due_date: Option<String>,
    total_amount: Option<String>,
    tax_amount: Option<String>,
    currency: String,
    confidence_score: f64,
    validation_notes: String,
    raw_text: String,
    flags: String,
    created_at: String,
    updated_at: String,
}

impl HeaderRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            filename: row.get(1)?,
            status: row.get(2)?,
            vendor_name: row.get(3)?,
            invoice_number: row.get(4)?,
            invoice_date: row.get(5)?,
            due_date: row.get(6)?,
            total_amount: row.get(7)?,
            tax_amount: row.get(8)?,
            currency: row.get(9)?,
            confidence_score: row.get(10)?,
            validation_notes: row.get(11)?,
            raw_text: row.get(12)?,
            flags: row.get(13)?,
            created_at: row.get(14)?,
            updated_at: row.get(15)?,
        })
    }

    fn into_invoice(self, line_items: Vec<LineItem>) -> Result<Invoice, StoreError> {
        let status = InvoiceStatus::from_str(&self.status).ok_or(StoreError::Corrupt {
            column: "status",
            value: self.status.clone(),
        })?;

        Ok(Invoice {
            id: InvoiceId(self.id),
            filename: self.filename,
            status,
            created_at: timestamp_column("created_at", &self.created_at)?,
            updated_at: timestamp_column("updated_at", &self.updated_at)?,
            data: StructuredInvoice {
                vendor_name: self.vendor_name,
                invoice_number: self.invoice_number,
                invoice_date: date_column("invoice_date", self.invoice_date)?,
                due_date: date_column("due_date", self.due_date)?,
                total_amount: decimal_column("total_amount", self.total_amount)?,
                tax_amount: decimal_column("tax_amount", self.tax_amount)?,
                currency: self.currency,
                line_items,
                confidence_score: self.confidence_score as f32,
                validation_notes: self.validation_notes,
                raw_text: self.raw_text,
                flags: serde_json::from_str(&self.flags)?,
            },
        })
    }
}

fn decimal_column(column: &'static str, value: Option<String>) -> Result<Option<Decimal>, StoreError> {
    value
        .map(|v| Decimal::from_str(&v).map_err(|_| StoreError::Corrupt { column, value: v }))
        .transpose()
}

fn date_column(column: &'static str, value: Option<String>) -> Result<Option<NaiveDate>, StoreError> {
    value
        .map(|v| NaiveDate::from_str(&v).map_err(|_| StoreError::Corrupt { column, value: v }))
        .transpose()
}

fn timestamp_column(column: &'static str, value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|_| StoreError::Corrupt {
            column,
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn sample() -> StructuredInvoice {
        StructuredInvoice {
            vendor_name: Some("Acme Corp".to_string()),
            invoice_number: Some("INV-7".to_string()),
            invoice_date: NaiveDate::from_ymd_opt(2024, 5, 1),
            due_date: None,
            total_amount: Some(dec("30.50")),
            tax_amount: None,
            line_items: vec![
                LineItem {
                    description: "First".to_string(),
                    quantity: Some(dec("1")),
                    unit_price: Some(dec("10.50")),
                    total_price: Some(dec("10.50")),
                    tax_rate: None,
                },
                LineItem {
                    description: "Second".to_string(),
                    quantity: None,
                    unit_price: None,
                    total_price: Some(dec("20.00")),
                    tax_rate: Some(dec("8")),
                },
            ],
            confidence_score: 0.87,
            validation_notes: "looks fine".to_string(),
            flags: vec!["due_date: unrecognized date format 'soon'".to_string()],
            ..StructuredInvoice::new("ACME raw text")
        }
    }

    fn count(store: &SqliteStore, table: &str) -> i64 {
        store
            .lock()
            .unwrap()
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn test_insert_and_get_round_trip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let inserted = store.insert("scan.png", &sample()).unwrap();

        assert_eq!(inserted.status, InvoiceStatus::Pending);
        let first = store.get(inserted.id).unwrap().unwrap();
        let second = store.get(inserted.id).unwrap().unwrap();
        assert_eq!(first, inserted);
        assert_eq!(first, second);
        assert_eq!(first.data.line_items[0].description, "First");
        assert_eq!(first.data.line_items[1].description, "Second");
    }

    #[test]
    fn test_get_unknown_is_none() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.get(InvoiceId(404)).unwrap(), None);
    }

    #[test]
    fn test_list_in_insertion_order_with_filter() {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = store.insert("a.png", &sample()).unwrap();
        let b = store.insert("b.pdf", &StructuredInvoice::new("")).unwrap();
        let c = store.insert("c.jpg", &sample()).unwrap();

        let ids: Vec<_> = store.list(None).unwrap().iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![a.id, b.id, c.id]);

        assert!(store
            .transition(b.id, Some(InvoiceStatus::Pending), InvoiceStatus::Approved, Utc::now())
            .unwrap());

        let approved = store.list(Some(InvoiceStatus::Approved)).unwrap();
        assert_eq!(approved.len(), 1);
        assert_eq!(approved[0].filename, "b.pdf");

        let pending: Vec<_> = store
            .list(Some(InvoiceStatus::Pending))
            .unwrap()
            .iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(pending, vec![a.id, c.id]);
    }

    #[test]
    fn test_transition_is_conditional() {
        let store = SqliteStore::open_in_memory().unwrap();
        let invoice = store.insert("a.png", &sample()).unwrap();
        let later = invoice.created_at + chrono::Duration::seconds(5);

        assert!(store
            .transition(invoice.id, Some(InvoiceStatus::Pending), InvoiceStatus::Rejected, later)
            .unwrap());
        assert!(!store
            .transition(invoice.id, Some(InvoiceStatus::Pending), InvoiceStatus::Approved, later)
            .unwrap());
        assert!(!store
            .transition(InvoiceId(99), None, InvoiceStatus::Approved, later)
            .unwrap());

        let stored = store.get(invoice.id).unwrap().unwrap();
        assert_eq!(stored.status, InvoiceStatus::Rejected);
        assert_eq!(stored.updated_at, later);
        assert_eq!(stored.created_at, invoice.created_at);

        // Unconditional
        let again = later + chrono::Duration::seconds(5);
        assert!(store
            .transition(invoice.id, None, InvoiceStatus::Approved, again)
            .unwrap());
        let stored = store.get(invoice.id).unwrap().unwrap();
        assert_eq!(stored.status, InvoiceStatus::Approved);
        assert_eq!(stored.updated_at, again);
    }

    #[test]
    fn test_failed_line_item_rolls_back_header() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .lock()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER fail_second_line BEFORE INSERT ON line_items
                 WHEN NEW.position = 1
                 BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
            )
            .unwrap();

        let err = store.insert("a.png", &sample()).unwrap_err();
        assert!(matches!(err, StoreError::Database(_)));
        assert!(store.list(None).unwrap().is_empty());
        assert_eq!(count(&store, "invoices"), 0);
        assert_eq!(count(&store, "line_items"), 0);
    }

    #[test]
    fn test_line_items_cascade_with_header() {
        let store = SqliteStore::open_in_memory().unwrap();
        let invoice = store.insert("a.png", &sample()).unwrap();
        assert_eq!(count(&store, "line_items"), 2);

        store
            .lock()
            .unwrap()
            .execute("DELETE FROM invoices WHERE id = ?1", params![invoice.id.0])
            .unwrap();
        assert_eq!(count(&store, "line_items"), 0);
    }

    #[test]
    fn test_processed_data_mirrors_payload() {
        let store = SqliteStore::open_in_memory().unwrap();
        let invoice = store.insert("a.png", &sample()).unwrap();

        let payload: String = store
            .lock()
            .unwrap()
            .query_row(
                "SELECT processed_data FROM invoices WHERE id = ?1",
                params![invoice.id.0],
                |r| r.get(0),
            )
            .unwrap();
        let decoded: StructuredInvoice = serde_json::from_str(&payload).unwrap();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn test_corrupt_amount_is_reported() {
        let store = SqliteStore::open_in_memory().unwrap();
        let invoice = store.insert("a.png", &sample()).unwrap();
        store
            .lock()
            .unwrap()
            .execute(
                "UPDATE invoices SET total_amount = 'lots' WHERE id = ?1",
                params![invoice.id.0],
            )
            .unwrap();

        assert!(matches!(
            store.get(invoice.id),
            Err(StoreError::Corrupt { column: "total_amount", .. })
        ));
    }

    #[test]
    fn test_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("invoices.db");

        let id = {
            let store = SqliteStore::open(&path).unwrap();
            store.insert("a.png", &sample()).unwrap().id
        };

        let reopened = SqliteStore::open(&path).unwrap();
        let invoice = reopened.get(id).unwrap().unwrap();
        assert_eq!(invoice.data.vendor_name.as_deref(), Some("Acme Corp"));
    }
}
