//! Plate recognizer
//!
//! Thin wrapper tying a model to its device: checked forward pass followed by
//! decoding of the per-slot probabilities into plate text.

use burn::tensor::{backend::Backend, Tensor, TensorData};

use crate::charset::{decode_batch, PlatePrediction};
use crate::model::PlateOcrModel;
use crate::utils::error::{PlateOcrError, Result};

pub struct PlateRecognizer<B: Backend> {
    model: PlateOcrModel<B>,
    device: B::Device,
}

impl<B: Backend> PlateRecognizer<B> {
    pub fn new(model: PlateOcrModel<B>, device: B::Device) -> Self {
        Self { model, device }
    }

    pub fn model(&self) -> &PlateOcrModel<B> {
        &self.model
    }

    /// Recognize a batch `[B, 1, H, W]` of grayscale crops
    pub fn recognize(&self, images: Tensor<B, 4>) -> Result<Vec<PlatePrediction>> {
        let slots = self.model.predict(images)?;
        decode_batch(slots)
    }

    /// Recognize row-major grayscale pixels in `[0, 1]`, `batch * H * W` values
    pub fn recognize_pixels(&self, pixels: &[f32], batch: usize) -> Result<Vec<PlatePrediction>> {
        let [channels, height, width] = self.model.input_shape();
        let expected = batch * channels * height * width;
        if batch == 0 || pixels.len() != expected {
            return Err(PlateOcrError::InvalidInput(format!(
                "expected {} pixels for {} plate(s) of {}x{}, got {}",
                expected,
                batch,
                height,
                width,
                pixels.len()
            )));
        }

        let data = TensorData::new(pixels.to_vec(), [batch, channels, height, width]);
        self.recognize(Tensor::from_data(data, &self.device))
    }
}
