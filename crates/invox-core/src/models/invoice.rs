//! Invoice data models: the structured output of the structuring engine and
//! the persisted record built around it.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Tolerance used when cross-checking amounts.
pub const AMOUNT_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// `a` and `b` agree within [`AMOUNT_TOLERANCE`]. A difference that does not
/// fit in a `Decimal` never agrees.
pub fn amounts_match(a: Decimal, b: Decimal) -> bool {
    a.checked_sub(b)
        .is_some_and(|diff| diff.abs() <= AMOUNT_TOLERANCE)
}

/// Structured invoice produced from raw document text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredInvoice {
    /// Issuing vendor.
    pub vendor_name: Option<String>,

    /// Invoice number/identifier.
    pub invoice_number: Option<String>,

    /// Date the invoice was issued.
    pub invoice_date: Option<NaiveDate>,

    /// Payment due date.
    pub due_date: Option<NaiveDate>,

    /// Grand total.
    pub total_amount: Option<Decimal>,

    /// Total tax.
    pub tax_amount: Option<Decimal>,

    /// Currency code (default: USD).
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Line items in document order.
    #[serde(default)]
    pub line_items: Vec<LineItem>,

    /// Self-reported confidence of the structuring capability (0.0 - 1.0).
    #[serde(default)]
    pub confidence_score: f32,

    /// Free-form notes from the structuring capability.
    #[serde(default)]
    pub validation_notes: String,

    /// The text that was structured.
    #[serde(default)]
    pub raw_text: String,

    /// Coercion and consistency warnings raised while reading the reply.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<String>,
}

pub(crate) fn default_currency() -> String {
    "USD".to_string()
}

impl StructuredInvoice {
    /// Create an empty invoice for the given source text.
    pub fn new(raw_text: impl Into<String>) -> Self {
        Self {
            vendor_name: None,
            invoice_number: None,
            invoice_date: None,
            due_date: None,
            total_amount: None,
            tax_amount: None,
            currency: default_currency(),
            line_items: Vec::new(),
            confidence_score: 0.0,
            validation_notes: String::new(),
            raw_text: raw_text.into(),
            flags: Vec::new(),
        }
    }

    /// Sum of line totals, if every line has one and the sum is
    /// representable.
    pub fn line_total(&self) -> Option<Decimal> {
        if self.line_items.is_empty() {
            return None;
        }
        self.line_items
            .iter()
            .try_fold(Decimal::ZERO, |acc, item| acc.checked_add(item.total_price?))
    }

    /// Every line has a total but their sum overflows.
    pub fn line_total_overflows(&self) -> bool {
        !self.line_items.is_empty()
            && self.line_items.iter().all(|i| i.total_price.is_some())
            && self.line_total().is_none()
    }

    /// Whether the line sum equals `total_amount`, either net or gross of
    /// `tax_amount`. `None` when there is nothing to compare.
    pub fn totals_agree(&self) -> Option<bool> {
        let lines = self.line_total()?;
        let total = self.total_amount?;
        let tax = self.tax_amount.unwrap_or(Decimal::ZERO);

        let net_match = amounts_match(lines, total);
        let gross_match = lines
            .checked_add(tax)
            .is_some_and(|gross| amounts_match(gross, total));
        Some(net_match || gross_match)
    }

    /// Review issues an operator should look at before approving.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if self.vendor_name.as_deref().is_none_or(str::is_empty) {
            issues.push("Missing vendor name".to_string());
        }

        if self.invoice_number.as_deref().is_none_or(str::is_empty) {
            issues.push("Missing invoice number".to_string());
        }

        if self.total_amount.is_none() {
            issues.push("Missing total amount".to_string());
        }

        if self.line_items.is_empty() {
            issues.push("No line items".to_string());
        }

        if let (Some(issued), Some(due)) = (self.invoice_date, self.due_date) {
            if due < issued {
                issues.push(format!("Due date {} precedes invoice date {}", due, issued));
            }
        }

        for (idx, item) in self.line_items.iter().enumerate() {
            if !item.is_consistent() {
                issues.push(format!(
                    "Line {} total does not equal quantity x unit price",
                    idx + 1
                ));
            }
        }

        if self.line_total_overflows() {
            issues.push("Line item totals are too large to add up".to_string());
        }

        if let (Some(false), Some(lines), Some(total)) =
            (self.totals_agree(), self.line_total(), self.total_amount)
        {
            issues.push(format!(
                "Line item total ({}) differs from invoice total ({})",
                lines, total
            ));
        }

        issues
    }
}

/// A single line item on the invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    /// Product/service description.
    #[serde(default)]
    pub description: String,

    /// Quantity.
    pub quantity: Option<Decimal>,

    /// Price per unit.
    pub unit_price: Option<Decimal>,

    /// Line total.
    pub total_price: Option<Decimal>,

    /// Tax rate applied to this line, as printed (e.g. 20 for 20%).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_rate: Option<Decimal>,
}

impl LineItem {
    /// `quantity * unit_price`, if both are present and the product fits.
    pub fn extended_price(&self) -> Option<Decimal> {
        self.quantity?.checked_mul(self.unit_price?)
    }

    /// `total_price ~= quantity * unit_price` when all three are present.
    /// Lines missing any of the three are considered consistent; a product
    /// that overflows is not.
    pub fn is_consistent(&self) -> bool {
        match (self.quantity, self.unit_price, self.total_price) {
            (Some(_), Some(_), Some(total)) => self
                .extended_price()
                .is_some_and(|price| amounts_match(price, total)),
            _ => true,
        }
    }
}

/// Identifier assigned by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceId(pub i64);

impl fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for InvoiceId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(InvoiceId)
    }
}

/// Review status of a persisted invoice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    /// Awaiting operator review.
    #[default]
    Pending,
    /// Accepted by an operator.
    Approved,
    /// Refused by an operator.
    Rejected,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::Approved => "approved",
            InvoiceStatus::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Some(InvoiceStatus::Pending),
            "approved" => Some(InvoiceStatus::Approved),
            "rejected" => Some(InvoiceStatus::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted invoice record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    /// Store-assigned identifier.
    pub id: InvoiceId,

    /// Original upload filename.
    pub filename: String,

    /// Review status.
    pub status: InvoiceStatus,

    /// When the record was ingested.
    pub created_at: DateTime<Utc>,

    /// Last status change.
    pub updated_at: DateTime<Utc>,

    /// Structured content, including line items.
    #[serde(flatten)]
    pub data: StructuredInvoice,
}
