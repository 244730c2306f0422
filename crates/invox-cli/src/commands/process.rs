//! Process command - ingest a single invoice file.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use invox_core::{IngestOutcome, InvoicePipeline, MediaType, Upload};

use super::{guess_content_type, load_config};

/// Arguments for the process command.
#[derive(Args)]
pub struct ProcessArgs {
    /// Input file (PDF or image)
    #[arg(required = true)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Declared media type (default: guessed from the file extension)
    #[arg(long)]
    media_type: Option<String>,

    /// Print review issues for the extracted record
    #[arg(long)]
    validate: bool,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Plain text summary
    Text,
}

pub async fn run(args: ProcessArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let content_type = args
        .media_type
        .clone()
        .unwrap_or_else(|| guess_content_type(&args.input));
    // Refuse unsupported files before any remote client is built
    MediaType::parse(&content_type)?;

    let config = load_config(config_path)?;
    let pipeline = InvoicePipeline::from_config(&config)?;

    let bytes = fs::read(&args.input)?;
    let filename = args
        .input
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload")
        .to_string();

    info!("Processing file: {}", args.input.display());

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")?,
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message(format!("Extracting {}...", filename));

    let result = pipeline
        .process(Upload::new(filename, content_type, bytes))
        .await;
    pb.finish_and_clear();
    let outcome = result?;

    if args.validate {
        let issues = outcome.invoice.validate();
        if !issues.is_empty() {
            eprintln!("{}", style("Validation issues:").yellow());
            for issue in &issues {
                eprintln!("  - {}", issue);
            }
        }
    }

    let output = format_outcome(&outcome, args.format)?;

    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        println!(
            "{} Invoice {} stored, output written to {}",
            style("✓").green(),
            outcome.invoice_id,
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    debug!("Total processing time: {:?}", start.elapsed());

    Ok(())
}

pub fn format_outcome(outcome: &IngestOutcome, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(outcome)?),
        OutputFormat::Text => Ok(format_text(outcome)),
    }
}

fn format_text(outcome: &IngestOutcome) -> String {
    let invoice = &outcome.invoice;
    let mut output = String::new();

    output.push_str(&format!(
        "Invoice #{} (pending, text from {})\n",
        outcome.invoice_id, outcome.source
    ));
    output.push_str(&format!(
        "Vendor:  {}\n",
        invoice.vendor_name.as_deref().unwrap_or("-")
    ));
    output.push_str(&format!(
        "Number:  {}\n",
        invoice.invoice_number.as_deref().unwrap_or("-")
    ));
    if let Some(date) = invoice.invoice_date {
        output.push_str(&format!("Date:    {}\n", date));
    }
    if let Some(due) = invoice.due_date {
        output.push_str(&format!("Due:     {}\n", due));
    }
    output.push('\n');

    if !invoice.line_items.is_empty() {
        output.push_str("Lines:\n");
        for item in &invoice.line_items {
            let total = item
                .total_price
                .map(|t| t.to_string())
                .unwrap_or_else(|| "-".to_string());
            output.push_str(&format!("  {}  {}\n", item.description, total));
        }
        output.push('\n');
    }

    if let Some(tax) = invoice.tax_amount {
        output.push_str(&format!("Tax:     {} {}\n", tax, invoice.currency));
    }
    match invoice.total_amount {
        Some(total) => output.push_str(&format!("Total:   {} {}\n", total, invoice.currency)),
        None => output.push_str("Total:   -\n"),
    }
    output.push_str(&format!(
        "Confidence: {:.0}%\n",
        invoice.confidence_score * 100.0
    ));

    if !invoice.flags.is_empty() {
        output.push_str("\nFlags:\n");
        for flag in &invoice.flags {
            output.push_str(&format!("  - {}\n", flag));
        }
    }

    output
}
