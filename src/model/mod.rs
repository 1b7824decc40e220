//! CNN architectures for license plate OCR, built with Burn
//!
//! Two backbones share the same blocks and heads:
//! - `Conv2M`: ~2M parameters, standard convolutions
//! - `SepConv1M`: ~1.2M parameters, depthwise-separable convolutions for low-end CPUs
//!
//! Either is topped by a fully connected head (`[B, 7 * 37]`) or a 1x1
//! convolution head (`[B, 7, 37, 1]`), both predicting seven independent
//! characters.

pub mod architecture;
pub mod blocks;
pub mod config;
pub mod head;
pub mod ocr;
pub mod summary;

// Re-export main types for convenience
pub use architecture::{Architecture, BlockKind, BlockSpec, HeadKind};
pub use config::OcrModelConfig;
pub use head::{ConvHead, DenseHead, HeadOutput, PlateHead};
pub use ocr::{model_1m_cpu, model_2m, PlateOcrModel};
pub use summary::{LayerRow, ModelSummary};
