//! fastlp-ocr CLI
//!
//! Inspect, sanity-check and benchmark the plate OCR architectures.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use burn::tensor::{Distribution, Tensor};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use fastlp_ocr::backend::{backend_name, default_device, DefaultBackend};
use fastlp_ocr::inference::{run_benchmark, BenchmarkConfig, BENCHMARK_ITERATIONS, WARMUP_ITERATIONS};
use fastlp_ocr::model::{Architecture, HeadKind, ModelSummary, OcrModelConfig};
use fastlp_ocr::utils::logging::{init_logging, LogConfig, LogLevel};
use fastlp_ocr::{decode_batch, MAX_PLATE_SLOTS};

/// License plate OCR model toolkit
#[derive(Parser, Debug)]
#[command(name = "fastlp-ocr")]
#[command(version)]
#[command(about = "Compact CNN architectures for license plate OCR with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error); overrides --verbose
    #[arg(long)]
    log_level: Option<LogLevel>,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

/// Model selection shared by every subcommand
#[derive(Args, Debug)]
struct ModelArgs {
    /// JSON model config; other model flags are ignored when given
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Backbone: conv-2m or sep-conv-1m
    #[arg(short, long, default_value = "conv-2m")]
    architecture: Architecture,

    /// Head: dense or conv
    #[arg(long, default_value = "dense")]
    head: HeadKind,

    /// Input height
    #[arg(long, default_value = "70")]
    height: usize,

    /// Input width
    #[arg(long, default_value = "140")]
    width: usize,
}

impl ModelArgs {
    fn resolve(&self) -> Result<OcrModelConfig> {
        let config = match &self.config {
            Some(path) => OcrModelConfig::from_file(path)
                .with_context(|| format!("loading model config {}", path.display()))?,
            None => OcrModelConfig::new()
                .with_architecture(self.architecture)
                .with_head(self.head)
                .with_height(self.height)
                .with_width(self.width),
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the layer table and parameter counts
    Summary {
        #[command(flatten)]
        model: ModelArgs,

        /// Print JSON instead of a table
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Build the model, run a random batch and verify the output
    Check {
        #[command(flatten)]
        model: ModelArgs,

        /// Batch size of the random input
        #[arg(short, long, default_value = "2")]
        batch_size: usize,
    },

    /// Benchmark inference latency
    Benchmark {
        #[command(flatten)]
        model: ModelArgs,

        /// Number of timed iterations
        #[arg(short, long, default_value_t = BENCHMARK_ITERATIONS)]
        iterations: usize,

        /// Number of warmup iterations
        #[arg(long, default_value_t = WARMUP_ITERATIONS)]
        warmup: usize,

        /// Batch size for inference
        #[arg(short, long, default_value = "1")]
        batch_size: usize,

        /// Output JSON file for benchmark results
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write a model config JSON file
    InitConfig {
        #[command(flatten)]
        model: ModelArgs,

        /// Destination file
        #[arg(short, long, default_value = "config/model.json")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };
    let log_config = match cli.log_level {
        Some(level) => log_config.with_level(level),
        None => log_config,
    };

    let _ = init_logging(&log_config);

    match cli.command {
        Commands::Summary { model, json } => cmd_summary(&model.resolve()?, json)?,
        Commands::Check { model, batch_size } => cmd_check(&model.resolve()?, batch_size)?,
        Commands::Benchmark {
            model,
            iterations,
            warmup,
            batch_size,
            output,
        } => {
            let config = BenchmarkConfig {
                warmup_iterations: warmup,
                iterations,
                batch_size,
                verbose: output.is_some(),
            };
            cmd_benchmark(&model.resolve()?, config, output.as_deref())?;
        }
        Commands::InitConfig { model, output } => {
            let config = model.resolve()?;
            config.to_file(&output)?;
            println!("{} {}", "Wrote".green(), output.display());
        }
    }

    Ok(())
}

fn cmd_summary(config: &OcrModelConfig, json: bool) -> Result<()> {
    let summary = ModelSummary::from_config(config)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{}", summary);
    }

    Ok(())
}

fn cmd_check(config: &OcrModelConfig, batch_size: usize) -> Result<()> {
    if batch_size == 0 {
        bail!("batch size must be > 0");
    }

    let device = default_device();
    info!("Building {} / {} head on {}", config.architecture, config.head, backend_name());
    let model = config.init::<DefaultBackend>(&device)?;

    let input = Tensor::<DefaultBackend, 4>::random(
        [batch_size, 1, config.height, config.width],
        Distribution::Uniform(0.0, 1.0),
        &device,
    );

    let output = model.forward(input);
    println!("{} {:?}", "Output shape:".cyan(), output.dims());

    let slots = output.into_slots();
    let sums = slots
        .clone()
        .sum_dim(2)
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("reading slot sums: {:?}", e))?;

    let worst = sums.iter().map(|s| (s - 1.0).abs()).fold(0.0f32, f32::max);
    if worst > 1e-3 {
        bail!("slot probabilities deviate from 1 by {}", worst);
    }
    println!(
        "{} {} slots x {} plates sum to 1 (max deviation {:.2e})",
        "OK".green().bold(),
        MAX_PLATE_SLOTS,
        batch_size,
        worst
    );

    for (index, plate) in decode_batch(slots)?.iter().enumerate() {
        println!(
            "  plate {}: {:<7} (mean confidence {:.3})",
            index,
            plate.raw,
            plate.mean_confidence()
        );
    }

    Ok(())
}

fn cmd_benchmark(config: &OcrModelConfig, bench: BenchmarkConfig, output: Option<&Path>) -> Result<()> {
    let device = default_device();
    let model = config.init::<DefaultBackend>(&device)?;

    let result = run_benchmark(&model, config, bench, backend_name(), &device)?;
    println!("{}", result);

    if let Some(path) = output {
        result.save(path)?;
        println!("{} {}", "Saved results to".green(), path.display());
    }

    Ok(())
}
