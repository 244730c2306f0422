//! Batch processing command for multiple invoice files.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use console::style;
use futures_util::stream::{self, StreamExt};
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error, warn};

use invox_core::{IngestOutcome, InvoicePipeline, MediaType, Upload};

use super::process::{format_outcome, OutputFormat};
use super::{guess_content_type, load_config};

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Glob pattern matching the input files
    #[arg(required = true)]
    input: String,

    /// Output directory for per-file results
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Output format for each file
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Also generate a summary CSV
    #[arg(long)]
    summary: bool,

    /// Number of documents processed concurrently
    #[arg(short = 'j', long, default_value = "4")]
    jobs: usize,

    /// Continue on error
    #[arg(long)]
    continue_on_error: bool,
}

/// Result of processing a single file.
struct ProcessResult {
    path: PathBuf,
    outcome: Option<IngestOutcome>,
    error: Option<String>,
    processing_time_ms: u64,
}

pub async fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    // Only files with a supported media type are picked up
    let files: Vec<(PathBuf, String)> = glob(&args.input)?
        .filter_map(|r| r.ok())
        .filter(|p| p.is_file())
        .map(|p| {
            let content_type = guess_content_type(&p);
            (p, content_type)
        })
        .filter(|(_, content_type)| MediaType::parse(content_type).is_ok())
        .collect();

    if files.is_empty() {
        anyhow::bail!("No matching files found for pattern: {}", args.input);
    }

    let config = load_config(config_path)?;
    let pipeline = InvoicePipeline::from_config(&config)?;

    println!(
        "{} Found {} files to process",
        style("ℹ").blue(),
        files.len()
    );

    if let Some(ref output_dir) = args.output_dir {
        fs::create_dir_all(output_dir)?;
    }

    let overall_pb = ProgressBar::new(files.len() as u64);
    overall_pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")?
            .progress_chars("=>-"),
    );

    let mut pending = stream::iter(files)
        .map(|(path, content_type)| {
            let pipeline = pipeline.clone();
            async move { process_single_file(&pipeline, path, content_type).await }
        })
        .buffer_unordered(args.jobs.max(1));

    let mut results = Vec::new();
    while let Some(result) = pending.next().await {
        overall_pb.inc(1);

        if let Some(error_msg) = &result.error {
            if args.continue_on_error {
                warn!("Failed to process {}: {}", result.path.display(), error_msg);
            } else {
                error!("Failed to process {}: {}", result.path.display(), error_msg);
                overall_pb.abandon();
                anyhow::bail!("Processing failed: {}", error_msg);
            }
        }
        results.push(result);
    }

    overall_pb.finish_with_message("Complete");

    // Completion order is arbitrary
    results.sort_by(|a, b| a.path.cmp(&b.path));

    let successful: Vec<_> = results.iter().filter(|r| r.outcome.is_some()).collect();
    let failed: Vec<_> = results.iter().filter(|r| r.error.is_some()).collect();

    if let Some(output_dir) = &args.output_dir {
        for result in &successful {
            if let Some(outcome) = &result.outcome {
                let output_path = output_dir.join(output_file_name(&result.path, args.format));
                fs::write(&output_path, format_outcome(outcome, args.format)?)?;
                debug!("Wrote output to {}", output_path.display());
            }
        }
    }

    if args.summary {
        let summary_path = args
            .output_dir
            .as_ref()
            .map(|d| d.join("summary.csv"))
            .unwrap_or_else(|| PathBuf::from("summary.csv"));

        write_summary(&summary_path, &results)?;
        println!(
            "{} Summary written to {}",
            style("✓").green(),
            summary_path.display()
        );
    }

    println!();
    println!(
        "{} Processed {} files in {:?}",
        style("✓").green(),
        results.len(),
        start.elapsed()
    );
    println!(
        "   {} stored as pending, {} failed",
        style(successful.len()).green(),
        style(failed.len()).red()
    );

    if !failed.is_empty() {
        println!();
        println!("{}", style("Failed files:").red());
        for result in &failed {
            println!(
                "  - {}: {}",
                result.path.display(),
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    Ok(())
}

/// Output name keeping the full input file name, so `a.png` and `a.pdf`
/// land in `a.png.json` and `a.pdf.json`.
fn output_file_name(input: &Path, format: OutputFormat) -> String {
    let name = input
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("invoice");

    let extension = match format {
        OutputFormat::Json => "json",
        OutputFormat::Text => "txt",
    };

    format!("{}.{}", name, extension)
}

async fn process_single_file(
    pipeline: &InvoicePipeline,
    path: PathBuf,
    content_type: String,
) -> ProcessResult {
    let file_start = Instant::now();

    let result = match fs::read(&path) {
        Ok(bytes) => {
            let filename = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("upload")
                .to_string();
            pipeline
                .process(Upload::new(filename, content_type, bytes))
                .await
                .map_err(|e| e.to_string())
        }
        Err(e) => Err(e.to_string()),
    };

    let processing_time_ms = file_start.elapsed().as_millis() as u64;
    match result {
        Ok(outcome) => ProcessResult {
            path,
            outcome: Some(outcome),
            error: None,
            processing_time_ms,
        },
        Err(error) => ProcessResult {
            path,
            outcome: None,
            error: Some(error),
            processing_time_ms,
        },
    }
}

fn write_summary(path: &Path, results: &[ProcessResult]) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record([
        "filename",
        "status",
        "invoice_id",
        "source",
        "vendor_name",
        "invoice_number",
        "invoice_date",
        "total_amount",
        "currency",
        "confidence",
        "processing_time_ms",
        "error",
    ])?;

    for result in results {
        let filename = result
            .path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("");

        if let Some(outcome) = &result.outcome {
            let invoice = &outcome.invoice;
            wtr.write_record([
                filename,
                "success",
                &outcome.invoice_id.to_string(),
                &outcome.source.to_string(),
                invoice.vendor_name.as_deref().unwrap_or(""),
                invoice.invoice_number.as_deref().unwrap_or(""),
                &invoice.invoice_date.map(|d| d.to_string()).unwrap_or_default(),
                &invoice.total_amount.map(|t| t.to_string()).unwrap_or_default(),
                &invoice.currency,
                &format!("{:.2}", invoice.confidence_score),
                &result.processing_time_ms.to_string(),
                "",
            ])?;
        } else {
            wtr.write_record([
                filename,
                "error",
                "",
                "",
                "",
                "",
                "",
                "",
                "",
                "",
                &result.processing_time_ms.to_string(),
                result.error.as_deref().unwrap_or(""),
            ])?;
        }
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_names_keep_input_extension() {
        let png = output_file_name(Path::new("scans/a.png"), OutputFormat::Json);
        let pdf = output_file_name(Path::new("scans/a.pdf"), OutputFormat::Json);
        assert_eq!(png, "a.png.json");
        assert_eq!(pdf, "a.pdf.json");
        assert_ne!(png, pdf);

        assert_eq!(
            output_file_name(Path::new("b.jpeg"), OutputFormat::Text),
            "b.jpeg.txt"
        );
    }
}
