//! # fastlp_ocr
//!
//! Compact convolutional networks for license plate OCR, built with the Burn
//! framework.
//!
//! A grayscale plate crop `[batch, 1, H, W]` goes through one of two
//! backbones and one of two heads; the result is seven independent
//! probability distributions over the 37-symbol plate vocabulary.
//!
//! ## Modules
//!
//! - `model`: backbones, heads, configuration and static layer summary
//! - `charset`: plate vocabulary and decoding of head outputs into text
//! - `inference`: recognizer wrapper and latency benchmark
//! - `backend`: default Burn backend selection
//! - `utils`: logging and error handling
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fastlp_ocr::backend::{default_device, DefaultBackend};
//! use fastlp_ocr::model::model_1m_cpu;
//!
//! let device = default_device();
//! let model = model_1m_cpu::<DefaultBackend>(70, 140, true, &device)?;
//! let slots = model.predict(images)?; // [batch, 7, 37]
//! ```

pub mod backend;
pub mod charset;
pub mod inference;
pub mod model;
pub mod utils;

// Re-export commonly used items for convenience
pub use charset::{decode_batch, PlatePrediction, MAX_PLATE_SLOTS, VOCABULARY, VOCABULARY_SIZE};
pub use inference::PlateRecognizer;
pub use model::{
    model_1m_cpu, model_2m, Architecture, HeadKind, HeadOutput, ModelSummary, OcrModelConfig,
    PlateOcrModel,
};
pub use utils::error::{PlateOcrError, Result};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
