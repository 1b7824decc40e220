//! Inference helpers: plate recognition and latency benchmarking
//!
//! The models are meant for low-end devices, so forward-pass latency is
//! measured with the same random-weight models the builders return.

pub mod benchmark;
pub mod recognizer;

// Re-export main types for convenience
pub use benchmark::{run_benchmark, BenchmarkConfig, BenchmarkResult, LatencyStats};
pub use recognizer::PlateRecognizer;

/// Default number of warmup iterations for benchmarking
pub const WARMUP_ITERATIONS: usize = 10;

/// Default number of benchmark iterations
pub const BENCHMARK_ITERATIONS: usize = 100;
