//! Plate OCR network and its two builders

use burn::{
    module::Module,
    tensor::{backend::Backend, Tensor},
};
use tracing::{debug, info};

use super::architecture::{Architecture, HeadKind};
use super::blocks::FeatureBlock;
use super::config::OcrModelConfig;
use super::head::{HeadOutput, PlateHead};
use crate::utils::error::{PlateOcrError, Result};

/// Grayscale input
pub const INPUT_CHANNELS: usize = 1;

/// Backbone plus classification head
#[derive(Module, Debug)]
pub struct PlateOcrModel<B: Backend> {
    pub backbone: Vec<FeatureBlock<B>>,
    pub head: PlateHead<B>,
    height: usize,
    width: usize,
}

/// ~2M parameter model built from standard convolutions
///
/// `dense` selects the fully connected head, otherwise the 1x1 conv head.
pub fn model_2m<B: Backend>(
    height: usize,
    width: usize,
    dense: bool,
    device: &B::Device,
) -> Result<PlateOcrModel<B>> {
    OcrModelConfig::for_architecture(Architecture::Conv2M, height, width, dense).init(device)
}

/// ~1.2M parameter model with depthwise-separable convolutions, for low-end devices
pub fn model_1m_cpu<B: Backend>(
    height: usize,
    width: usize,
    dense: bool,
    device: &B::Device,
) -> Result<PlateOcrModel<B>> {
    OcrModelConfig::for_architecture(Architecture::SepConv1M, height, width, dense).init(device)
}

impl<B: Backend> PlateOcrModel<B> {
    /// Build from an already validated config
    pub(crate) fn new(config: &OcrModelConfig, device: &B::Device) -> Self {
        let mut in_channels = INPUT_CHANNELS;
        let mut backbone = Vec::with_capacity(config.architecture.blocks().len());

        for (index, spec) in config.architecture.blocks().iter().enumerate() {
            debug!(
                block = index + 1,
                kind = ?spec.kind,
                kernel = spec.kernel,
                in_channels,
                out_channels = spec.filters,
                pool = ?spec.pool,
                "Adding backbone block"
            );
            backbone.push(FeatureBlock::from_spec(spec, in_channels, device));
            in_channels = spec.out_channels();
        }

        let head = PlateHead::new(config.head, in_channels, config.dropout, device);

        let model = Self {
            backbone,
            head,
            height: config.height,
            width: config.width,
        };

        info!(
            architecture = %config.architecture,
            head = %config.head,
            height = config.height,
            width = config.width,
            total_params = model.num_params(),
            "Built plate OCR model"
        );

        model
    }

    /// Expected input shape without the batch axis: `[1, H, W]`
    pub fn input_shape(&self) -> [usize; 3] {
        [INPUT_CHANNELS, self.height, self.width]
    }

    pub fn head_kind(&self) -> HeadKind {
        self.head.kind()
    }

    /// Run the backbone only: `[B, 1, H, W]` -> `[B, 1024, H', W']`
    pub fn forward_features(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.backbone.iter().fold(x, |x, block| block.forward(x))
    }

    /// Full forward pass, output in the layout of the configured head
    pub fn forward(&self, x: Tensor<B, 4>) -> HeadOutput<B> {
        let features = self.forward_features(x);
        self.head.forward(features)
    }

    /// Checked forward pass returning per-slot probabilities `[B, 7, 37]`
    pub fn predict(&self, x: Tensor<B, 4>) -> Result<Tensor<B, 3>> {
        let [batch, channels, height, width] = x.dims();
        if [channels, height, width] != self.input_shape() {
            let [c, h, w] = self.input_shape();
            return Err(PlateOcrError::ShapeMismatch {
                expected: vec![batch, c, h, w],
                actual: vec![batch, channels, height, width],
            });
        }
        if batch == 0 {
            return Err(PlateOcrError::InvalidInput("empty batch".to_string()));
        }

        Ok(self.forward(x).into_slots())
    }
}
