//! Layer blocks shared by both backbones and the convolutional head

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Initializer, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

use super::architecture::{BlockKind, BlockSpec};

/// Batch norm epsilon
pub const BN_EPSILON: f64 = 1e-3;

/// Weight of the current batch in the running statistics
pub const BN_MOMENTUM: f64 = 0.01;

/// Stride-1, same-padded, bias-free convolution with Glorot init
pub(crate) fn conv2d<B: Backend>(
    channels: [usize; 2],
    kernel: usize,
    groups: usize,
    device: &B::Device,
) -> Conv2d<B> {
    Conv2dConfig::new(channels, [kernel, kernel])
        .with_padding(PaddingConfig2d::Same)
        .with_groups(groups)
        .with_bias(false)
        .with_initializer(Initializer::XavierUniform { gain: 1.0 })
        .init(device)
}

pub(crate) fn batch_norm<B: Backend>(channels: usize, device: &B::Device) -> BatchNorm<B, 2> {
    BatchNormConfig::new(channels)
        .with_epsilon(BN_EPSILON)
        .with_momentum(BN_MOMENTUM)
        .init(device)
}

/// Spatial size after a same-padded pool whose stride equals its window
pub fn same_pool_output(size: usize, pool: usize) -> usize {
    size.div_ceil(pool)
}

/// Total padding a same-padded pool adds along one axis
fn same_pool_padding(size: usize, pool: usize) -> usize {
    same_pool_output(size, pool) * pool - size
}

/// Max pooling with window == stride and "same" padding
///
/// Burn's own `Same` padding assumes stride 1, so the input is padded
/// explicitly with -inf, the odd row/column going to the bottom/right.
#[derive(Module, Clone, Debug)]
pub struct SamePadMaxPool {
    pool: MaxPool2d,
    size: usize,
}

impl SamePadMaxPool {
    pub fn new(size: usize) -> Self {
        let pool = MaxPool2dConfig::new([size, size])
            .with_strides([size, size])
            .init();
        Self { pool, size }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn forward<B: Backend>(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [_, _, height, width] = x.dims();
        let pad_h = same_pool_padding(height, self.size);
        let pad_w = same_pool_padding(width, self.size);

        let x = if pad_h + pad_w > 0 {
            let top = pad_h / 2;
            let left = pad_w / 2;
            x.pad((left, pad_w - left, top, pad_h - top), f32::NEG_INFINITY)
        } else {
            x
        };

        self.pool.forward(x)
    }
}

/// A backbone block: (depthwise) conv, BatchNorm, ReLU and optional MaxPool
///
/// For separable blocks `depthwise` holds the per-channel k x k convolution and
/// `conv` the 1x1 pointwise projection; otherwise `conv` is the k x k kernel.
#[derive(Module, Debug)]
pub struct FeatureBlock<B: Backend> {
    pub depthwise: Option<Conv2d<B>>,
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B, 2>,
    pub relu: Relu,
    pub pool: Option<SamePadMaxPool>,
}

impl<B: Backend> FeatureBlock<B> {
    /// Standard convolution block
    pub fn conv(
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        pool: Option<usize>,
        device: &B::Device,
    ) -> Self {
        Self {
            depthwise: None,
            conv: conv2d([in_channels, out_channels], kernel, 1, device),
            bn: batch_norm(out_channels, device),
            relu: Relu::new(),
            pool: pool.map(SamePadMaxPool::new),
        }
    }

    /// Depthwise-separable convolution block
    pub fn separable(
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        depth_multiplier: usize,
        pool: Option<usize>,
        device: &B::Device,
    ) -> Self {
        let mid = in_channels * depth_multiplier;
        Self {
            depthwise: Some(conv2d([in_channels, mid], kernel, in_channels, device)),
            conv: conv2d([mid, out_channels], 1, 1, device),
            bn: batch_norm(out_channels, device),
            relu: Relu::new(),
            pool: pool.map(SamePadMaxPool::new),
        }
    }

    pub fn from_spec(spec: &BlockSpec, in_channels: usize, device: &B::Device) -> Self {
        match spec.kind {
            BlockKind::Conv => {
                Self::conv(in_channels, spec.filters, spec.kernel, spec.pool, device)
            }
            BlockKind::SeparableConv { depth_multiplier } => Self::separable(
                in_channels,
                spec.filters,
                spec.kernel,
                depth_multiplier,
                spec.pool,
                device,
            ),
        }
    }

    /// `[B, C_in, H, W]` -> `[B, C_out, H', W']`
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = match &self.depthwise {
            Some(depthwise) => depthwise.forward(x),
            None => x,
        };
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        let x = self.relu.forward(x);

        match &self.pool {
            Some(pool) => pool.forward(x),
            None => x,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CpuBackend;
    use burn::tensor::TensorData;

    type TestBackend = CpuBackend;

    #[test]
    fn test_same_pool_output() {
        assert_eq!(same_pool_output(70, 3), 24);
        assert_eq!(same_pool_output(140, 3), 47);
        assert_eq!(same_pool_output(12, 2), 6);
        assert_eq!(same_pool_output(3, 2), 2);
        assert_eq!(same_pool_padding(70, 3), 2);
        assert_eq!(same_pool_padding(12, 2), 0);
    }

    #[test]
    fn test_same_pad_max_pool_shape() {
        let device = Default::default();
        let pool = SamePadMaxPool::new(3);
        let x = Tensor::<TestBackend, 4>::ones([2, 4, 70, 140], &device);
        assert_eq!(pool.forward(x).dims(), [2, 4, 24, 47]);
    }

    #[test]
    fn test_same_pad_max_pool_ignores_padding() {
        let device = Default::default();
        // All values negative: a zero pad would win the max, -inf must not
        let data = TensorData::new(vec![-1.0f32, -2.0, -3.0, -4.0, -5.0, -6.0, -7.0, -8.0, -9.0], [1, 1, 3, 3]);
        let x = Tensor::<TestBackend, 4>::from_data(data, &device);

        let out = SamePadMaxPool::new(2).forward(x);
        assert_eq!(out.dims(), [1, 1, 2, 2]);

        let values = out.into_data().to_vec::<f32>().unwrap();
        assert_eq!(values, vec![-1.0, -3.0, -7.0, -9.0]);
    }

    #[test]
    fn test_conv_block_shape() {
        let device = Default::default();
        let block = FeatureBlock::<TestBackend>::conv(1, 16, 3, Some(2), &device);
        let x = Tensor::<TestBackend, 4>::zeros([1, 1, 15, 31], &device);
        assert_eq!(block.forward(x).dims(), [1, 16, 8, 16]);
    }

    #[test]
    fn test_separable_block_shape() {
        let device = Default::default();
        let block = FeatureBlock::<TestBackend>::separable(8, 24, 3, 1, None, &device);
        let x = Tensor::<TestBackend, 4>::zeros([2, 8, 9, 18], &device);
        assert_eq!(block.forward(x).dims(), [2, 24, 9, 18]);
    }

    #[test]
    fn test_separable_block_params() {
        let device = Default::default();
        let block = FeatureBlock::<TestBackend>::separable(256, 256, 3, 1, None, &device);
        let depthwise = block.depthwise.as_ref().map(|c| c.num_params()).unwrap_or(0);
        assert_eq!(depthwise, 3 * 3 * 256);
        assert_eq!(block.conv.num_params(), 256 * 256);
    }

    #[test]
    fn test_block_output_non_negative() {
        let device = Default::default();
        let block = FeatureBlock::<TestBackend>::conv(1, 8, 3, None, &device);
        let x = Tensor::<TestBackend, 4>::random(
            [1, 1, 6, 6],
            burn::tensor::Distribution::Uniform(-1.0, 1.0),
            &device,
        );
        let min = block.forward(x).min().into_scalar();
        assert!(min >= 0.0);
    }
}
