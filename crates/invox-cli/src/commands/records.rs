//! Review commands over stored invoices: list, show, approve, reject.
//!
//! These only touch the local database and work without an API key.

use std::sync::Arc;

use clap::{Args, ValueEnum};
use console::style;

use invox_core::{Invoice, InvoiceId, InvoiceLedger, InvoiceStatus, InvoxConfig, SqliteStore};

use super::load_config;

#[derive(Args)]
pub struct ListArgs {
    /// Only show invoices with this status
    #[arg(short, long, value_enum)]
    status: Option<StatusFilter>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    format: ListFormat,
}

#[derive(Args)]
pub struct ShowArgs {
    /// Invoice id
    id: i64,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: ShowFormat,
}

#[derive(Args)]
pub struct ReviewArgs {
    /// Invoice id
    id: i64,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StatusFilter {
    Pending,
    Approved,
    Rejected,
}

impl From<StatusFilter> for InvoiceStatus {
    fn from(filter: StatusFilter) -> Self {
        match filter {
            StatusFilter::Pending => InvoiceStatus::Pending,
            StatusFilter::Approved => InvoiceStatus::Approved,
            StatusFilter::Rejected => InvoiceStatus::Rejected,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ListFormat {
    /// Aligned columns
    Table,
    /// JSON array of records
    Json,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ShowFormat {
    /// Human-readable record with review issues
    Text,
    /// JSON record
    Json,
}

fn open_ledger(config: &InvoxConfig) -> anyhow::Result<InvoiceLedger> {
    let store = SqliteStore::open(&config.storage.database_path)?;
    Ok(InvoiceLedger::new(Arc::new(store)))
}

pub fn list(args: ListArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let ledger = open_ledger(&load_config(config_path)?)?;
    let invoices = ledger.list(args.status.map(InvoiceStatus::from))?;

    match args.format {
        ListFormat::Json => println!("{}", serde_json::to_string_pretty(&invoices)?),
        ListFormat::Table => print_table(&invoices),
    }

    Ok(())
}

fn print_table(invoices: &[Invoice]) {
    if invoices.is_empty() {
        println!("{} No invoices found", style("ℹ").blue());
        return;
    }

    println!(
        "{:>5}  {:<9}  {:<24}  {:<16}  {:>14}  {}",
        "ID", "STATUS", "VENDOR", "NUMBER", "TOTAL", "FILE"
    );
    for invoice in invoices {
        let data = &invoice.data;
        let total = data
            .total_amount
            .map(|t| format!("{} {}", t, data.currency))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:>5}  {:<9}  {:<24}  {:<16}  {:>14}  {}",
            invoice.id.0,
            invoice.status.as_str(),
            truncate(data.vendor_name.as_deref().unwrap_or("-"), 24),
            truncate(data.invoice_number.as_deref().unwrap_or("-"), 16),
            total,
            invoice.filename
        );
    }
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        return s.to_string();
    }
    let mut out: String = s.chars().take(width.saturating_sub(1)).collect();
    out.push('…');
    out
}

pub fn show(args: ShowArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let ledger = open_ledger(&load_config(config_path)?)?;
    let invoice = ledger.require(InvoiceId(args.id))?;

    match args.format {
        ShowFormat::Json => println!("{}", serde_json::to_string_pretty(&invoice)?),
        ShowFormat::Text => print_invoice(&invoice),
    }

    Ok(())
}

fn print_invoice(invoice: &Invoice) {
    let data = &invoice.data;

    println!("Invoice #{} [{}]", invoice.id, invoice.status);
    println!("File:     {}", invoice.filename);
    println!("Created:  {}", invoice.created_at.to_rfc3339());
    println!("Updated:  {}", invoice.updated_at.to_rfc3339());
    println!();
    println!("Vendor:   {}", data.vendor_name.as_deref().unwrap_or("-"));
    println!("Number:   {}", data.invoice_number.as_deref().unwrap_or("-"));
    if let Some(date) = data.invoice_date {
        println!("Date:     {}", date);
    }
    if let Some(due) = data.due_date {
        println!("Due:      {}", due);
    }

    if !data.line_items.is_empty() {
        println!();
        println!("Lines:");
        for item in &data.line_items {
            let qty = item.quantity.map(|q| q.to_string()).unwrap_or_default();
            let price = item.unit_price.map(|p| p.to_string()).unwrap_or_default();
            let total = item.total_price.map(|t| t.to_string()).unwrap_or_default();
            println!("  {:<32} {:>6} x {:>10} = {:>10}", item.description, qty, price, total);
        }
    }

    println!();
    if let Some(tax) = data.tax_amount {
        println!("Tax:      {} {}", tax, data.currency);
    }
    match data.total_amount {
        Some(total) => println!("Total:    {} {}", total, data.currency),
        None => println!("Total:    -"),
    }
    println!("Confidence: {:.0}%", data.confidence_score * 100.0);
    if !data.validation_notes.is_empty() {
        println!("Notes:    {}", data.validation_notes);
    }

    let issues = data.validate();
    if !issues.is_empty() || !data.flags.is_empty() {
        println!();
        println!("{}", style("Review issues:").yellow());
        for issue in issues.iter().chain(data.flags.iter()) {
            println!("  - {}", issue);
        }
    }
}

pub fn approve(args: ReviewArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let ledger = open_ledger(&load_config(config_path)?)?;
    let invoice = ledger.approve(InvoiceId(args.id))?;
    println!("{} Invoice {} approved", style("✓").green(), invoice.id);
    Ok(())
}

pub fn reject(args: ReviewArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let ledger = open_ledger(&load_config(config_path)?)?;
    let invoice = ledger.reject(InvoiceId(args.id))?;
    println!("{} Invoice {} rejected", style("✓").green(), invoice.id);
    Ok(())
}
