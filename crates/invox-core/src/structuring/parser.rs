//! Reply parsing and typed validation.
//!
//! The reply is first read as untyped JSON, then every field is coerced
//! individually. A field that cannot be coerced becomes null and leaves a
//! flag; only a reply that is not a JSON object at all is an error.

use rust_decimal::Decimal;
use serde_json::{Map, Value};

use super::coerce::{decimal_from_number, parse_amount, parse_date};
use crate::error::StructuringError;
use crate::models::invoice::{
    default_currency, LineItem, StructuredInvoice,
};

/// Parse a structuring reply into an invoice for `raw_text`.
pub fn parse_reply(reply: &str, raw_text: &str) -> Result<StructuredInvoice, StructuringError> {
    let body = strip_code_fence(reply);

    let value: Value = serde_json::from_str(body).map_err(|e| StructuringError::MalformedReply {
        error: e.to_string(),
        raw_response: reply.to_string(),
    })?;

    let Value::Object(obj) = value else {
        return Err(StructuringError::MalformedReply {
            error: format!("expected a JSON object, got {}", kind(&value)),
            raw_response: reply.to_string(),
        });
    };

    Ok(FieldReader::default().read(&obj, raw_text))
}

/// Remove a surrounding Markdown code fence (```json ... ```), if any.
fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Optional language tag on the opening line
    let rest = match rest.find('\n') {
        Some(idx) if rest[..idx].trim().chars().all(|c| c.is_ascii_alphanumeric()) => {
            &rest[idx + 1..]
        }
        _ => rest,
    };

    let rest = rest.trim_end();
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Collects flags while coercing fields.
#[derive(Default)]
struct FieldReader {
    flags: Vec<String>,
}

impl FieldReader {
    fn read(mut self, obj: &Map<String, Value>, raw_text: &str) -> StructuredInvoice {
        let mut invoice = StructuredInvoice::new(raw_text);

        invoice.vendor_name = self.text(obj.get("vendor_name"), "vendor_name");
        invoice.invoice_number = self.text(obj.get("invoice_number"), "invoice_number");
        invoice.invoice_date = self.date(obj.get("invoice_date"), "invoice_date");
        invoice.due_date = self.date(obj.get("due_date"), "due_date");
        invoice.total_amount = self.non_negative(obj.get("total_amount"), "total_amount");
        invoice.tax_amount = self.non_negative(obj.get("tax_amount"), "tax_amount");
        invoice.currency = self
            .text(obj.get("currency"), "currency")
            .map(|c| c.to_uppercase())
            .unwrap_or_else(default_currency);
        invoice.line_items = self.line_items(obj.get("line_items"));
        invoice.confidence_score = self.confidence(obj.get("confidence_score"));
        invoice.validation_notes = self.notes(obj.get("validation_notes"));

        self.check_totals(&invoice);
        invoice.flags = self.flags;
        invoice
    }

    fn flag(&mut self, message: String) {
        self.flags.push(message);
    }

    fn text(&mut self, value: Option<&Value>, field: &str) -> Option<String> {
        match value {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => {
                let s = s.trim();
                (!s.is_empty()).then(|| s.to_string())
            }
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(other) => {
                self.flag(format!("{}: expected a string, got {}", field, kind(other)));
                None
            }
        }
    }

    fn date(&mut self, value: Option<&Value>, field: &str) -> Option<chrono::NaiveDate> {
        let text = self.text(value, field)?;
        match parse_date(&text) {
            Ok(date) => Some(date),
            Err(reason) => {
                self.flag(format!("{}: {}", field, reason));
                None
            }
        }
    }

    fn decimal(&mut self, value: Option<&Value>, field: &str) -> Option<Decimal> {
        let parsed = match value {
            None | Some(Value::Null) => return None,
            Some(Value::Number(n)) => decimal_from_number(n),
            Some(Value::String(s)) if s.trim().is_empty() => return None,
            Some(Value::String(s)) => parse_amount(s),
            Some(_) => None,
        };

        if parsed.is_none() {
            self.flag(format!("{}: not a number ({})", field, value.map_or(Value::Null, Value::clone)));
        }
        parsed
    }

    fn non_negative(&mut self, value: Option<&Value>, field: &str) -> Option<Decimal> {
        let amount = self.decimal(value, field)?;
        if amount.is_sign_negative() && !amount.is_zero() {
            self.flag(format!("{}: negative amount {} discarded", field, amount));
            return None;
        }
        Some(amount)
    }

    fn line_items(&mut self, value: Option<&Value>) -> Vec<LineItem> {
        let items = match value {
            None | Some(Value::Null) => return Vec::new(),
            Some(Value::Array(items)) => items,
            Some(other) => {
                self.flag(format!("line_items: expected an array, got {}", kind(other)));
                return Vec::new();
            }
        };

        let mut lines = Vec::with_capacity(items.len());
        for (idx, item) in items.iter().enumerate() {
            let Value::Object(fields) = item else {
                self.flag(format!("line_items[{}]: expected an object, got {}", idx, kind(item)));
                continue;
            };

            let prefix = format!("line_items[{}]", idx);
            let line = LineItem {
                description: self
                    .text(fields.get("description"), &format!("{}.description", prefix))
                    .unwrap_or_default(),
                quantity: self.decimal(fields.get("quantity"), &format!("{}.quantity", prefix)),
                unit_price: self.decimal(fields.get("unit_price"), &format!("{}.unit_price", prefix)),
                total_price: self
                    .decimal(fields.get("total_price"), &format!("{}.total_price", prefix)),
                tax_rate: self.decimal(fields.get("tax_rate"), &format!("{}.tax_rate", prefix)),
            };

            if !line.is_consistent() {
                if let (Some(qty), Some(unit), Some(total)) =
                    (line.quantity, line.unit_price, line.total_price)
                {
                    if line.extended_price().is_none() {
                        self.flag(format!(
                            "{}: quantity {} x unit_price {} overflows",
                            prefix, qty, unit
                        ));
                    } else {
                        self.flag(format!(
                            "{}: total_price {} != quantity {} x unit_price {}",
                            prefix, total, qty, unit
                        ));
                    }
                }
            }

            lines.push(line);
        }
        lines
    }

    fn confidence(&mut self, value: Option<&Value>) -> f32 {
        let Some(score) = self.decimal(value, "confidence_score") else {
            return 0.0;
        };
        let score: f32 = score.to_string().parse().unwrap_or(0.0);

        if !(0.0..=1.0).contains(&score) {
            self.flag(format!("confidence_score: {} clamped to [0, 1]", score));
        }
        score.clamp(0.0, 1.0)
    }

    fn notes(&mut self, value: Option<&Value>) -> String {
        match value {
            Some(Value::Array(notes)) => notes
                .iter()
                .filter_map(|n| n.as_str().map(str::trim))
                .filter(|n| !n.is_empty())
                .collect::<Vec<_>>()
                .join("; "),
            other => self.text(other, "validation_notes").unwrap_or_default(),
        }
    }

    fn check_totals(&mut self, invoice: &StructuredInvoice) {
        if invoice.line_total_overflows() {
            self.flag("line_items: sum of total_price overflows".to_string());
            return;
        }

        if let (Some(false), Some(lines), Some(total)) =
            (invoice.totals_agree(), invoice.line_total(), invoice.total_amount)
        {
            let tax = invoice.tax_amount.unwrap_or(Decimal::ZERO);
            self.flag(format!(
                "total_amount {} does not match line items sum {} (tax {})",
                total, lines, tax
            ));
        }
    }
}
