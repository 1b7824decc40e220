//! Backbone topologies
//!
//! Each backbone is a flat list of [`BlockSpec`]s; the Burn modules in
//! [`super::blocks`] and the static table in [`super::summary`] are both
//! derived from these lists, so the two can never drift apart.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::utils::error::PlateOcrError;

/// Which backbone to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Architecture {
    /// ~2M parameters, standard convolutions only
    Conv2M,
    /// ~1.2M parameters, mixes in depthwise-separable convolutions for low-end CPUs
    SepConv1M,
}

/// Which classification head to put on top of the backbone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeadKind {
    /// Global pooling, dropout, one dense classifier per slot
    Dense,
    /// 1x1 convolution to `slots * classes` channels, global pooling, reshape
    Conv,
}

/// Convolution flavour of a backbone block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Conv -> BN -> ReLU
    Conv,
    /// Depthwise conv -> pointwise conv -> BN -> ReLU
    SeparableConv { depth_multiplier: usize },
}

/// One backbone block, optionally followed by max pooling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSpec {
    pub kind: BlockKind,
    pub kernel: usize,
    pub filters: usize,
    /// Pool window (= stride) applied after the block
    pub pool: Option<usize>,
}

const fn conv(kernel: usize, filters: usize) -> BlockSpec {
    BlockSpec {
        kind: BlockKind::Conv,
        kernel,
        filters,
        pool: None,
    }
}

const fn sep_conv(kernel: usize, filters: usize) -> BlockSpec {
    BlockSpec {
        kind: BlockKind::SeparableConv { depth_multiplier: 1 },
        kernel,
        filters,
        pool: None,
    }
}

impl BlockSpec {
    const fn pooled(mut self, size: usize) -> Self {
        self.pool = Some(size);
        self
    }

    /// Output channels of the block
    pub fn out_channels(&self) -> usize {
        self.filters
    }

    /// Convolution weights for the given input channel count (no bias terms)
    pub fn conv_params(&self, in_channels: usize) -> usize {
        let k2 = self.kernel * self.kernel;
        match self.kind {
            BlockKind::Conv => k2 * in_channels * self.filters,
            BlockKind::SeparableConv { depth_multiplier } => {
                let mid = in_channels * depth_multiplier;
                k2 * mid + mid * self.filters
            }
        }
    }
}

const CONV_2M: &[BlockSpec] = &[
    conv(3, 64),
    conv(3, 32),
    conv(3, 32),
    conv(1, 64).pooled(3),
    conv(3, 64),
    conv(3, 128),
    conv(1, 128).pooled(2),
    conv(3, 128),
    conv(3, 128),
    conv(1, 256).pooled(2),
    conv(3, 256).pooled(2),
    conv(1, 512).pooled(2),
    conv(1, 1024),
];

const SEP_CONV_1M: &[BlockSpec] = &[
    conv(3, 32),
    conv(3, 64).pooled(2),
    conv(3, 64),
    conv(3, 128).pooled(2),
    conv(1, 128).pooled(2),
    sep_conv(3, 128),
    conv(1, 256).pooled(2),
    sep_conv(3, 256),
    sep_conv(1, 512).pooled(2),
    conv(1, 1024),
];

impl Architecture {
    /// Block sequence of the backbone
    pub fn blocks(&self) -> &'static [BlockSpec] {
        match self {
            Architecture::Conv2M => CONV_2M,
            Architecture::SepConv1M => SEP_CONV_1M,
        }
    }

    /// Channels of the feature map handed to the head
    pub fn feature_channels(&self) -> usize {
        self.blocks().last().map(BlockSpec::out_channels).unwrap_or(1)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Architecture::Conv2M => "conv-2m",
            Architecture::SepConv1M => "sep-conv-1m",
        }
    }
}

impl std::fmt::Display for Architecture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Architecture {
    type Err = PlateOcrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "conv-2m" | "2m" => Ok(Architecture::Conv2M),
            "sep-conv-1m" | "1m-cpu" | "1m" => Ok(Architecture::SepConv1M),
            other => Err(PlateOcrError::Config(format!(
                "unknown architecture '{}' (expected conv-2m or sep-conv-1m)",
                other
            ))),
        }
    }
}

impl HeadKind {
    /// `true` selects the fully connected head
    pub fn from_dense_flag(dense: bool) -> Self {
        if dense {
            HeadKind::Dense
        } else {
            HeadKind::Conv
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            HeadKind::Dense => "dense",
            HeadKind::Conv => "conv",
        }
    }
}

impl std::fmt::Display for HeadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HeadKind {
    type Err = PlateOcrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dense" | "fc" => Ok(HeadKind::Dense),
            "conv" | "no-fc" => Ok(HeadKind::Conv),
            other => Err(PlateOcrError::Config(format!(
                "unknown head '{}' (expected dense or conv)",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_counts() {
        assert_eq!(Architecture::Conv2M.blocks().len(), 13);
        assert_eq!(Architecture::SepConv1M.blocks().len(), 10);
    }

    #[test]
    fn test_pool_positions() {
        let pools: Vec<usize> = Architecture::Conv2M
            .blocks()
            .iter()
            .filter_map(|b| b.pool)
            .collect();
        assert_eq!(pools, vec![3, 2, 2, 2, 2]);

        let pools: Vec<usize> = Architecture::SepConv1M
            .blocks()
            .iter()
            .filter_map(|b| b.pool)
            .collect();
        assert_eq!(pools, vec![2, 2, 2, 2, 2]);
    }

    #[test]
    fn test_feature_channels() {
        assert_eq!(Architecture::Conv2M.feature_channels(), 1024);
        assert_eq!(Architecture::SepConv1M.feature_channels(), 1024);
    }

    #[test]
    fn test_separable_params() {
        let spec = sep_conv(3, 256);
        // depthwise 3*3*256 + pointwise 256*256
        assert_eq!(spec.conv_params(256), 2304 + 65536);
        assert_eq!(conv(3, 32).conv_params(64), 18432);
    }

    #[test]
    fn test_parse() {
        assert_eq!("2m".parse::<Architecture>().unwrap(), Architecture::Conv2M);
        assert_eq!(
            "SEP-CONV-1M".parse::<Architecture>().unwrap(),
            Architecture::SepConv1M
        );
        assert!("resnet".parse::<Architecture>().is_err());
        assert_eq!("no-fc".parse::<HeadKind>().unwrap(), HeadKind::Conv);
        assert_eq!(HeadKind::from_dense_flag(true), HeadKind::Dense);
    }
}
