//! Benchmark Module for Inference Latency Testing
//!
//! Measures forward-pass latency of a freshly built (untrained) model. Weights
//! do not change the cost of a forward pass, so no checkpoint is needed.

use std::path::Path;
use std::time::{Duration, Instant};

use burn::{
    module::Module,
    tensor::{backend::Backend, Distribution, Tensor},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::model::{ModelSummary, OcrModelConfig, PlateOcrModel};
use crate::utils::error::{PlateOcrError, Result};
use crate::utils::logging::ProgressLogger;

/// Configuration for benchmarking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    /// Number of warmup iterations (excluded from measurements)
    pub warmup_iterations: usize,

    /// Number of benchmark iterations
    pub iterations: usize,

    /// Batch size for inference
    pub batch_size: usize,

    /// Whether to keep individual iteration times
    pub verbose: bool,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            warmup_iterations: 10,
            iterations: 100,
            batch_size: 1,
            verbose: false,
        }
    }
}

impl BenchmarkConfig {
    pub fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(PlateOcrError::Config("iterations must be > 0".to_string()));
        }
        if self.batch_size == 0 {
            return Err(PlateOcrError::Config("batch_size must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Latency statistics from benchmark
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LatencyStats {
    pub mean_ms: f64,
    pub std_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    /// Median
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

impl LatencyStats {
    /// Calculate statistics from a list of durations
    pub fn from_durations(durations: &[Duration]) -> Self {
        if durations.is_empty() {
            return Self::default();
        }

        let mut times_ms: Vec<f64> = durations.iter().map(|d| d.as_secs_f64() * 1000.0).collect();
        times_ms.sort_by(|a, b| a.total_cmp(b));

        let n = times_ms.len();
        let mean = times_ms.iter().sum::<f64>() / n as f64;
        let variance = times_ms.iter().map(|t| (t - mean).powi(2)).sum::<f64>() / n as f64;

        Self {
            mean_ms: mean,
            std_ms: variance.sqrt(),
            min_ms: times_ms[0],
            max_ms: times_ms[n - 1],
            p50_ms: percentile(&times_ms, 50.0),
            p95_ms: percentile(&times_ms, 95.0),
            p99_ms: percentile(&times_ms, 99.0),
        }
    }
}

/// Calculate percentile from sorted data
fn percentile(sorted_data: &[f64], p: f64) -> f64 {
    if sorted_data.is_empty() {
        return 0.0;
    }

    let idx = (p / 100.0 * (sorted_data.len() - 1) as f64).round() as usize;
    sorted_data[idx.min(sorted_data.len() - 1)]
}

/// Results from a benchmark run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub model: OcrModelConfig,
    pub backend: String,
    /// Weights, biases and BatchNorm scale/shift
    pub trainable_params: usize,
    /// Trainable plus BatchNorm running statistics, as Burn counts them
    pub total_params: usize,
    pub latency: LatencyStats,
    /// Plates per second
    pub throughput: f64,
    /// Individual iteration times (if verbose)
    pub iteration_times_ms: Vec<f64>,
    pub config: BenchmarkConfig,
    pub timestamp: String,
}

impl BenchmarkResult {
    /// Save results to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load results from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Get a summary string
    pub fn summary(&self) -> String {
        format!(
            "Latency: {:.2}ms (mean), {:.2}ms (p95), {:.2}ms (p99) | Throughput: {:.1} plates/s",
            self.latency.mean_ms, self.latency.p95_ms, self.latency.p99_ms, self.throughput
        )
    }
}

impl std::fmt::Display for BenchmarkResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Benchmark Results")?;
        writeln!(
            f,
            "  Model:      {} / {} head, {}x{}",
            self.model.architecture, self.model.head, self.model.height, self.model.width
        )?;
        writeln!(f, "  Backend:    {}", self.backend)?;
        writeln!(
            f,
            "  Params:     {} trainable, {} total",
            crate::utils::format_number(self.trainable_params),
            crate::utils::format_number(self.total_params)
        )?;
        writeln!(f, "  Batch size: {}", self.config.batch_size)?;
        writeln!(f, "  Iterations: {} (+{} warmup)", self.config.iterations, self.config.warmup_iterations)?;
        writeln!(f, "  Mean:       {:8.2} ms", self.latency.mean_ms)?;
        writeln!(f, "  Std Dev:    {:8.2} ms", self.latency.std_ms)?;
        writeln!(f, "  Min / Max:  {:8.2} / {:.2} ms", self.latency.min_ms, self.latency.max_ms)?;
        writeln!(f, "  P50:        {:8.2} ms", self.latency.p50_ms)?;
        writeln!(f, "  P95:        {:8.2} ms", self.latency.p95_ms)?;
        writeln!(f, "  P99:        {:8.2} ms", self.latency.p99_ms)?;
        write!(f, "  Throughput: {:8.1} plates/s", self.throughput)
    }
}

/// Time forward passes of `model` on random input
pub fn run_benchmark<B: Backend>(
    model: &PlateOcrModel<B>,
    model_config: &OcrModelConfig,
    config: BenchmarkConfig,
    backend: &str,
    device: &B::Device,
) -> Result<BenchmarkResult> {
    config.validate()?;
    let summary = ModelSummary::from_config(model_config)?;

    let [channels, height, width] = model.input_shape();
    let input = Tensor::<B, 4>::random(
        [config.batch_size, channels, height, width],
        Distribution::Uniform(0.0, 1.0),
        device,
    );

    info!(
        warmup = config.warmup_iterations,
        iterations = config.iterations,
        batch_size = config.batch_size,
        "Running benchmark"
    );

    for _ in 0..config.warmup_iterations {
        // into_data forces the backend to finish the pass
        let _ = model.forward(input.clone()).into_slots().into_data();
    }

    let mut progress = ProgressLogger::new("Benchmark", config.iterations);
    let mut timings = Vec::with_capacity(config.iterations);
    for _ in 0..config.iterations {
        let start = Instant::now();
        let _ = model.forward(input.clone()).into_slots().into_data();
        timings.push(start.elapsed());
        progress.increment();
    }
    progress.finish();

    let latency = LatencyStats::from_durations(&timings);
    let throughput = if latency.mean_ms > 0.0 {
        1000.0 / latency.mean_ms * config.batch_size as f64
    } else {
        0.0
    };

    let iteration_times_ms = if config.verbose {
        timings.iter().map(|d| d.as_secs_f64() * 1000.0).collect()
    } else {
        Vec::new()
    };

    Ok(BenchmarkResult {
        model: model_config.clone(),
        backend: backend.to_string(),
        trainable_params: summary.trainable_params(),
        total_params: model.num_params(),
        latency,
        throughput,
        iteration_times_ms,
        config,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
