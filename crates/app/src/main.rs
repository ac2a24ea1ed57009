use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tally_eval::{analyze_receipt, BatchSummary};
use tally_ocr::{base_name, output_path_for, PipelineConfig, PipelineError, ReceiptPipeline};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[cfg(feature = "tesseract")]
type Engine = tally_ocr::TesseractRecognizer;
#[cfg(not(feature = "tesseract"))]
type Engine = tally_ocr::UnavailableRecognizer;

#[derive(Parser, Debug)]
#[command(name = "tally", version)]
#[command(about = "Turn receipt photos into structured records and score them against labels")]
struct Cli {
    /// TOML file overriding the tuned pipeline defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse one receipt image into a JSON document
    Parse { image: PathBuf, output: PathBuf },
    /// Parse every image in a directory
    Batch {
        input_dir: PathBuf,
        output_dir: PathBuf,
        /// Receipts processed concurrently (defaults to `[batch] workers`)
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Parse a directory and score the results against ground-truth labels
    Analyze {
        input_dir: PathBuf,
        output_dir: PathBuf,
        label_dir: PathBuf,
        results_dir: PathBuf,
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Parse images as they are dropped into a directory
    Watch { input_dir: PathBuf, output_dir: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    let pipeline = ReceiptPipeline::new(engine(&config), &config).context("Invalid extraction pattern")?;

    match cli.command {
        Command::Parse { image, output } => {
            let result = pipeline
                .process_file(&image, &output)
                .await
                .with_context(|| format!("Failed to parse {}", image.display()))?;
            tracing::info!("Conditioned image saved to {}", result.conditioned_path.display());
        }
        Command::Batch { input_dir, output_dir, workers } => {
            let workers = workers.unwrap_or(config.batch.workers);
            let entries = pipeline.run_batch(&input_dir, &output_dir, workers).await?;
            let parsed = entries.iter().filter(|e| e.succeeded()).count();
            println!("{parsed} of {} receipts parsed", entries.len());
        }
        Command::Analyze { input_dir, output_dir, label_dir, results_dir, workers } => {
            let workers = workers.unwrap_or(config.batch.workers);
            let entries = pipeline.run_batch(&input_dir, &output_dir, workers).await?;

            let mut summary = BatchSummary::new();
            for entry in &entries {
                if matches!(entry.result, Err(PipelineError::DuplicateOutput { .. })) {
                    // The first producer's document is the one scored for this base.
                    continue;
                }
                if !entry.succeeded() {
                    // A document left over from an earlier run must not be scored.
                    remove_stale(&entry.output).await?;
                }
                let base = base_name(&entry.input);
                match analyze_receipt(&base, &output_dir, &label_dir, &results_dir) {
                    Ok(evaluation) => summary.record(&evaluation),
                    Err(e) => tracing::warn!("Skipping {base}: {e}"),
                }
            }

            let report = summary.write_collated(&results_dir)?;
            tracing::info!(evaluated = summary.len(), "Collated report written to {}", report.display());
            match summary.average() {
                Some(average) => println!("the average normalized error is: {average}"),
                None => println!("no receipts could be evaluated"),
            }
        }
        Command::Watch { input_dir, output_dir } => watch(pipeline, &input_dir, &output_dir).await?,
    }

    Ok(())
}

#[cfg(feature = "tesseract")]
fn engine(config: &PipelineConfig) -> Engine {
    tally_ocr::TesseractRecognizer::new(config.ocr.tessdata_path.clone(), &config.ocr.language)
}

#[cfg(not(feature = "tesseract"))]
fn engine(_config: &PipelineConfig) -> Engine {
    tracing::warn!("Built without the `tesseract` feature; recognition will fail");
    tally_ocr::UnavailableRecognizer
}

async fn remove_stale(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove stale {}", path.display())),
    }
}

async fn watch(pipeline: ReceiptPipeline<Engine>, input_dir: &Path, output_dir: &Path) -> Result<()> {
    // The channel bridges the notify watcher thread and the async processor.
    let (tx, mut rx) = mpsc::channel::<PathBuf>(64);
    let _watcher = tally_ocr::spawn_intake_watcher(input_dir, tx)
        .with_context(|| format!("Failed to watch {}", input_dir.display()))?;
    tracing::info!("Watching intake folder: {}", input_dir.display());

    loop {
        tokio::select! {
            received = rx.recv() => {
                let Some(path) = received else { break };
                let output = output_path_for(&path, output_dir);
                if let Err(e) = pipeline.process_file(&path, &output).await {
                    tracing::warn!("Receipt pipeline error for {}: {e}", path.display());
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Stopping watcher");
                break;
            }
        }
    }
    Ok(())
}
