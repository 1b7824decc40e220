//! Classification heads
//!
//! Both heads turn the backbone feature map into seven independent
//! probability distributions over the plate vocabulary. They differ only in
//! how the class scores are produced and in the layout of the result.

use burn::{
    module::{Module, Param},
    nn::{
        conv::Conv2d,
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        BatchNorm, Dropout, DropoutConfig, Initializer, Linear, LinearConfig,
    },
    tensor::{activation::softmax, backend::Backend, Tensor},
};

use super::architecture::HeadKind;
use super::blocks::{batch_norm, conv2d};
use crate::charset::{MAX_PLATE_SLOTS, VOCABULARY_SIZE};

/// Global average pooling: `[B, C, H, W]` -> `[B, C]`
fn global_avg_pool<B: Backend>(pool: &AdaptiveAvgPool2d, x: Tensor<B, 4>) -> Tensor<B, 2> {
    let x = pool.forward(x);
    let [batch_size, channels, _, _] = x.dims();
    x.reshape([batch_size, channels])
}

/// Fully connected head
///
/// GAP -> Dropout -> one `Linear(C, 37)` + softmax per slot -> concat.
#[derive(Module, Debug)]
pub struct DenseHead<B: Backend> {
    pub global_pool: AdaptiveAvgPool2d,
    pub dropout: Dropout,
    pub classifiers: Vec<Linear<B>>,
}

impl<B: Backend> DenseHead<B> {
    pub fn new(in_channels: usize, dropout_rate: f64, device: &B::Device) -> Self {
        let classifiers = (0..MAX_PLATE_SLOTS)
            .map(|_| {
                let mut linear: Linear<B> = LinearConfig::new(in_channels, VOCABULARY_SIZE)
                    .with_initializer(Initializer::XavierUniform { gain: 1.0 })
                    .init(device);
                // Glorot applies to the weights only; biases start at zero
                linear.bias = Some(Param::from_tensor(Tensor::zeros([VOCABULARY_SIZE], device)));
                linear
            })
            .collect();

        Self {
            global_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            dropout: DropoutConfig::new(dropout_rate).init(),
            classifiers,
        }
    }

    /// Returns `[B, 7 * 37]`, slot-major
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = global_avg_pool(&self.global_pool, x);
        let x = self.dropout.forward(x);

        let slots: Vec<Tensor<B, 2>> = self
            .classifiers
            .iter()
            .map(|classifier| softmax(classifier.forward(x.clone()), 1))
            .collect();

        Tensor::cat(slots, 1)
    }
}

/// Head without fully connected layers
///
/// 1x1 conv to `7 * 37` channels with BatchNorm and no activation, GAP,
/// reshape to `[B, 7, 37, 1]` and softmax over the class axis.
#[derive(Module, Debug)]
pub struct ConvHead<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B, 2>,
    pub global_pool: AdaptiveAvgPool2d,
}

impl<B: Backend> ConvHead<B> {
    pub fn new(in_channels: usize, device: &B::Device) -> Self {
        let channels = MAX_PLATE_SLOTS * VOCABULARY_SIZE;
        Self {
            conv: conv2d([in_channels, channels], 1, 1, device),
            bn: batch_norm(channels, device),
            global_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
        }
    }

    /// Returns `[B, 7, 37, 1]`
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        let x = global_avg_pool(&self.global_pool, x);

        let [batch_size, _] = x.dims();
        let x = x.reshape([batch_size, MAX_PLATE_SLOTS, VOCABULARY_SIZE, 1]);
        softmax(x, 2)
    }
}

/// Output of either head, in its native layout
#[derive(Debug, Clone)]
pub enum HeadOutput<B: Backend> {
    /// `[B, 7 * 37]`
    Dense(Tensor<B, 2>),
    /// `[B, 7, 37, 1]`
    Conv(Tensor<B, 4>),
}

impl<B: Backend> HeadOutput<B> {
    pub fn dims(&self) -> Vec<usize> {
        match self {
            HeadOutput::Dense(t) => t.dims().to_vec(),
            HeadOutput::Conv(t) => t.dims().to_vec(),
        }
    }

    /// Common view of both layouts: `[B, 7, 37]`
    pub fn into_slots(self) -> Tensor<B, 3> {
        match self {
            HeadOutput::Dense(t) => {
                let [batch_size, _] = t.dims();
                t.reshape([batch_size, MAX_PLATE_SLOTS, VOCABULARY_SIZE])
            }
            HeadOutput::Conv(t) => {
                let [batch_size, _, _, _] = t.dims();
                t.reshape([batch_size, MAX_PLATE_SLOTS, VOCABULARY_SIZE])
            }
        }
    }
}

/// The head selected at build time
///
/// Exactly one of the two fields is populated; fields stay private so that
/// invariant holds.
#[derive(Module, Debug)]
pub struct PlateHead<B: Backend> {
    dense: Option<DenseHead<B>>,
    conv: Option<ConvHead<B>>,
}

impl<B: Backend> PlateHead<B> {
    pub fn new(kind: HeadKind, in_channels: usize, dropout_rate: f64, device: &B::Device) -> Self {
        match kind {
            HeadKind::Dense => Self {
                dense: Some(DenseHead::new(in_channels, dropout_rate, device)),
                conv: None,
            },
            HeadKind::Conv => Self {
                dense: None,
                conv: Some(ConvHead::new(in_channels, device)),
            },
        }
    }

    pub fn kind(&self) -> HeadKind {
        if self.dense.is_some() {
            HeadKind::Dense
        } else {
            HeadKind::Conv
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> HeadOutput<B> {
        match (&self.dense, &self.conv) {
            (Some(head), _) => HeadOutput::Dense(head.forward(x)),
            (None, Some(head)) => HeadOutput::Conv(head.forward(x)),
            (None, None) => unreachable!("PlateHead is always built with one head"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CpuBackend;
    use burn::tensor::Distribution;

    type TestBackend = CpuBackend;

    fn features(device: &<TestBackend as Backend>::Device) -> Tensor<TestBackend, 4> {
        Tensor::<TestBackend, 4>::random([3, 64, 2, 3], Distribution::Normal(0.0, 1.0), device)
    }

    fn assert_slots_sum_to_one(slots: Tensor<TestBackend, 3>) {
        let sums = slots.sum_dim(2).into_data().to_vec::<f32>().unwrap();
        assert_eq!(sums.len(), 3 * MAX_PLATE_SLOTS);
        for sum in sums {
            assert!((sum - 1.0).abs() < 1e-4, "slot sums to {}", sum);
        }
    }

    #[test]
    fn test_dense_head_layout() {
        let device = Default::default();
        let head = DenseHead::<TestBackend>::new(64, 0.5, &device);
        let out = head.forward(features(&device));
        assert_eq!(out.dims(), [3, MAX_PLATE_SLOTS * VOCABULARY_SIZE]);

        // Whole row holds seven distributions
        let row_sums = out.sum_dim(1).into_data().to_vec::<f32>().unwrap();
        for sum in row_sums {
            assert!((sum - MAX_PLATE_SLOTS as f32).abs() < 1e-3);
        }
    }

    #[test]
    fn test_conv_head_layout() {
        let device = Default::default();
        let head = ConvHead::<TestBackend>::new(64, &device);
        let out = head.forward(features(&device));
        assert_eq!(out.dims(), [3, MAX_PLATE_SLOTS, VOCABULARY_SIZE, 1]);
    }

    #[test]
    fn test_slots_sum_to_one() {
        let device = Default::default();
        for kind in [HeadKind::Dense, HeadKind::Conv] {
            let head = PlateHead::<TestBackend>::new(kind, 64, 0.5, &device);
            assert_eq!(head.kind(), kind);
            assert_slots_sum_to_one(head.forward(features(&device)).into_slots());
        }
    }

    #[test]
    fn test_dense_head_params() {
        let device = Default::default();
        let head = DenseHead::<TestBackend>::new(1024, 0.5, &device);
        assert_eq!(head.num_params(), 7 * (1024 * 37 + 37));
    }

    #[test]
    fn test_dense_biases_start_at_zero() {
        let device = Default::default();
        let head = DenseHead::<TestBackend>::new(64, 0.5, &device);
        for classifier in &head.classifiers {
            let bias = classifier.bias.as_ref().unwrap().val();
            assert_eq!(bias.dims(), [VOCABULARY_SIZE]);
            let values = bias.into_data().to_vec::<f32>().unwrap();
            assert!(values.iter().all(|&b| b == 0.0));
        }
    }
}
