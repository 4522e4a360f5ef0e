//! ocrqueue command-line interface.
//!
//! Runs tesseract over a batch of images through a shared [`OcrRequestQueue`].
//! Identical images are recognised once. Ctrl-C cancels whatever is still
//! pending and prints the results that did finish.
//!
//! ```bash
//! ocrqueue -l eng+deu --mode fast scans/*.png
//! RUST_LOG=ocrqueue=debug ocrqueue --format json page.png
//! ```

mod progress;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use ocrqueue::{
    ImageId, OcrEngine, OcrMode, OcrParams, OcrPriority, OcrRequestQueue, OcrResult, QueueConfig,
    TesseractCommandEngine,
};
use progress::TracingProgress;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Deduplicating OCR over a batch of images
#[derive(Parser, Debug)]
#[command(name = "ocrqueue", version, about)]
struct Cli {
    /// Images to recognise
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Tesseract language code(s), e.g. "eng" or "eng+deu"
    #[arg(short = 'l', long = "lang", default_value = "eng")]
    language: String,

    /// Speed/quality trade-off: fast, best or default
    #[arg(long, default_value = "default")]
    mode: OcrMode,

    /// Per-image engine time limit in seconds
    #[arg(long)]
    timeout: Option<u32>,

    /// Submit at background priority
    #[arg(long)]
    background: bool,

    /// Path to the tesseract binary
    #[arg(long, default_value = "tesseract")]
    tesseract: PathBuf,

    /// Number of worker tasks (default: number of CPUs)
    #[arg(long)]
    workers: Option<usize>,

    /// Config file (default: discover ocrqueue.toml upwards from the current directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,
}

#[derive(Debug, Serialize)]
struct ImageReport {
    path: PathBuf,
    image_id: ImageId,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<OcrResult>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;
    let cli = Cli::parse();

    let config = load_config(&cli)?;
    let engine: Arc<dyn OcrEngine> = Arc::new(
        TesseractCommandEngine::new(&cli.tesseract)
            .with_context(|| format!("Failed to start tesseract at {}", cli.tesseract.display()))?,
    );
    let queue = OcrRequestQueue::with_config(config, Arc::new(TracingProgress))?;
    tracing::debug!(workers = queue.worker_count(), engine = %engine.engine_id(), "Queue ready");

    let params = OcrParams::new(cli.language.clone(), cli.mode, cli.timeout);
    let priority = if cli.background {
        OcrPriority::Background
    } else {
        OcrPriority::Foreground
    };

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, cancelling pending OCR");
                cancel.cancel();
            }
        }
    });

    // Temp copies are handed to the queue, which deletes them.
    let staging = tempfile::tempdir().context("Failed to create staging directory")?;
    let mut pending = Vec::with_capacity(cli.images.len());
    for (index, path) in cli.images.iter().enumerate() {
        let (image_id, temp_image) = stage_image(path, index, staging.path()).await?;

        let queue = queue.clone();
        let engine = Arc::clone(&engine);
        let params = params.clone();
        let cancel = cancel.clone();
        let id = image_id.clone();
        let handle = tokio::spawn(async move {
            queue
                .enqueue(engine, &id, temp_image, &params, priority, &cancel)
                .await
        });
        pending.push((path.clone(), image_id, handle));
    }

    let mut reports = Vec::with_capacity(pending.len());
    for (path, image_id, handle) in pending {
        let result = handle.await.context("OCR task panicked")?;
        reports.push(ImageReport {
            path,
            image_id,
            text: result.as_ref().map(|result| result.text()),
            result: result.as_deref().cloned(),
        });
    }

    print_reports(&reports, cli.format)?;

    let missing = reports.iter().filter(|report| report.result.is_none()).count();
    if missing > 0 {
        anyhow::bail!("{} of {} images produced no OCR result", missing, reports.len());
    }
    Ok(())
}

fn init_tracing() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {e}"))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(env_filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))
}

fn load_config(cli: &Cli) -> Result<QueueConfig> {
    let mut config = match &cli.config {
        Some(path) => QueueConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => QueueConfig::discover()?.unwrap_or_default(),
    };
    if let Some(workers) = cli.workers {
        config.worker_count = Some(workers);
    }
    Ok(config)
}

/// Copy `path` into `staging` and derive its content identity.
async fn stage_image(path: &Path, index: usize, staging: &Path) -> Result<(ImageId, PathBuf)> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let image_id = ImageId::from_content(&bytes);

    let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("img");
    let temp_image = staging.join(format!("{index}-{image_id}.{extension}"));
    tokio::fs::write(&temp_image, &bytes)
        .await
        .with_context(|| format!("Failed to stage {}", path.display()))?;

    Ok((image_id, temp_image))
}

fn print_reports(reports: &[ImageReport], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(reports)?);
        }
        OutputFormat::Text => {
            for report in reports {
                println!("==> {} <==", report.path.display());
                match &report.text {
                    Some(text) => println!("{text}"),
                    None => println!("(no result)"),
                }
                println!();
            }
        }
    }
    Ok(())
}
