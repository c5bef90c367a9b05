use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use docsort::config::{self, ConfigError, FilingMode, PipelineConfig};
use docsort::pipeline::extraction::OcrEngine;
use docsort::pipeline::model::FittedModel;
use docsort::pipeline::organization::SystemClock;
use docsort::pipeline::{CancelFlag, Pipeline};

/// Classify documents and file them by confidence.
#[derive(Parser, Debug)]
#[command(name = "docsort", version, about)]
struct Cli {
    /// TOML configuration file. Missing keys take their defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify files (or every file in the given directories) and print a JSON report.
    Classify {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Fitted model bundle (JSON).
        #[arg(long)]
        model: Option<PathBuf>,
        /// Destination root, overriding the configuration.
        #[arg(long)]
        dest: Option<PathBuf>,
        #[arg(long)]
        workers: Option<usize>,
        /// Remove each source file once its copy is filed.
        #[arg(long = "move")]
        move_files: bool,
    },
    /// Print a summary of a model bundle.
    InspectModel { path: Option<PathBuf> },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    tracing::debug!("{} v{}", config::APP_NAME, config::APP_VERSION);

    match cli.command {
        Commands::Classify {
            paths,
            model,
            dest,
            workers,
            move_files,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(dest) = dest {
                config.destination_root = dest;
            }
            if let Some(workers) = workers {
                config.workers = workers;
            }
            if move_files {
                config.filing_mode = FilingMode::Move;
            }
            classify(config, model, paths).await
        }
        Commands::InspectModel { path } => {
            let path = path.unwrap_or_else(config::default_model_path);
            let model = FittedModel::load(&path).map_err(ConfigError::from)?;
            println!("{}", serde_json::to_string_pretty(&model.summary())?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

async fn classify(
    config: PipelineConfig,
    model_path: Option<PathBuf>,
    paths: Vec<PathBuf>,
) -> anyhow::Result<()> {
    let model_path = model_path.unwrap_or_else(config::default_model_path);
    let model = FittedModel::load(&model_path).map_err(ConfigError::from)?;

    let pipeline = Pipeline::from_config(
        &config,
        ocr_engine(&config)?,
        Arc::new(model),
        Arc::new(SystemClock),
    )?;

    let inputs = collect_inputs(&paths)?;
    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, finishing documents in progress");
                cancel.cancel();
            }
        });
    }

    let report = Arc::new(pipeline).process_paths_parallel(inputs, cancel).await;
    tracing::info!(
        filed = report.filed_count(),
        failed = report.failed_count(),
        skipped = report.skipped.len(),
        "Done"
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[cfg(feature = "ocr")]
fn ocr_engine(config: &PipelineConfig) -> anyhow::Result<Box<dyn OcrEngine>> {
    use docsort::pipeline::extraction::ocr::BundledTesseract;

    let engine = BundledTesseract::new(config.tessdata_dir.as_deref(), &config.ocr_languages)
        .context("initializing Tesseract")?;
    Ok(Box::new(engine))
}

#[cfg(not(feature = "ocr"))]
fn ocr_engine(_config: &PipelineConfig) -> anyhow::Result<Box<dyn OcrEngine>> {
    use docsort::pipeline::extraction::ocr::NoOcrEngine;

    tracing::warn!("Built without the `ocr` feature; images and scanned PDFs will fail");
    Ok(Box::new(NoOcrEngine))
}

/// Files are taken as given; directories contribute their regular files, sorted.
fn collect_inputs(paths: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let mut inputs = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut files: Vec<PathBuf> = std::fs::read_dir(path)
                .with_context(|| format!("reading directory {}", path.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file())
                .collect();
            files.sort();
            inputs.extend(files);
        } else {
            inputs.push(path.clone());
        }
    }
    Ok(inputs)
}
