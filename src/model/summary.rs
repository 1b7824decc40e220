//! Static layer summary
//!
//! Shape inference and parameter counting straight from the block tables,
//! without instantiating any tensors. Layouts are written `H x W x C` the way
//! plate OCR models are usually documented.

use serde::{Deserialize, Serialize};

use super::architecture::{Architecture, BlockKind, HeadKind};
use super::blocks::same_pool_output;
use super::config::OcrModelConfig;
use super::ocr::INPUT_CHANNELS;
use crate::charset::{MAX_PLATE_SLOTS, VOCABULARY_SIZE};
use crate::utils::error::Result;
use crate::utils::format_number;

/// One row of the summary table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerRow {
    pub name: String,
    pub kind: String,
    /// Output shape without the batch axis
    pub output: Vec<usize>,
    pub trainable: usize,
    /// BatchNorm running mean and variance
    pub non_trainable: usize,
}

impl LayerRow {
    fn new(name: impl Into<String>, kind: impl Into<String>, output: Vec<usize>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            output,
            trainable: 0,
            non_trainable: 0,
        }
    }

    fn with_params(mut self, trainable: usize, non_trainable: usize) -> Self {
        self.trainable = trainable;
        self.non_trainable = non_trainable;
        self
    }
}

/// Layer-by-layer description of a configured network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSummary {
    pub architecture: Architecture,
    pub head: HeadKind,
    /// `[H, W, C]`
    pub input: [usize; 3],
    pub rows: Vec<LayerRow>,
    /// `[H, W, C]` of the feature map entering the head
    feature: [usize; 3],
}

impl ModelSummary {
    pub fn from_config(config: &OcrModelConfig) -> Result<Self> {
        config.validate()?;

        let mut rows = Vec::new();
        let (mut height, mut width, mut channels) = (config.height, config.width, INPUT_CHANNELS);
        let mut pools = 0;

        for (index, spec) in config.architecture.blocks().iter().enumerate() {
            let kind = match spec.kind {
                BlockKind::Conv => format!("conv_bn {k}x{k}", k = spec.kernel),
                BlockKind::SeparableConv { depth_multiplier } => format!(
                    "sep_conv_bn {k}x{k} dm={dm}",
                    k = spec.kernel,
                    dm = depth_multiplier
                ),
            };
            let trainable = spec.conv_params(channels) + 2 * spec.filters;
            channels = spec.out_channels();

            rows.push(
                LayerRow::new(format!("block_{}", index + 1), kind, vec![height, width, channels])
                    .with_params(trainable, 2 * spec.filters),
            );

            if let Some(pool) = spec.pool {
                pools += 1;
                height = same_pool_output(height, pool);
                width = same_pool_output(width, pool);
                rows.push(LayerRow::new(
                    format!("max_pool_{}", pools),
                    format!("max_pool {p}x{p}/{p}", p = pool),
                    vec![height, width, channels],
                ));
            }
        }

        let feature = [height, width, channels];
        let flat = MAX_PLATE_SLOTS * VOCABULARY_SIZE;

        match config.head {
            HeadKind::Dense => {
                rows.push(LayerRow::new("global_avg_pool", "global_avg_pool", vec![channels]));
                rows.push(LayerRow::new(
                    "dropout",
                    format!("dropout p={}", config.dropout),
                    vec![channels],
                ));
                for slot in 1..=MAX_PLATE_SLOTS {
                    rows.push(
                        LayerRow::new(format!("dense_{}", slot), "dense", vec![VOCABULARY_SIZE])
                            .with_params(channels * VOCABULARY_SIZE + VOCABULARY_SIZE, 0),
                    );
                }
                rows.push(LayerRow::new("softmax_concat", "softmax + concat", vec![flat]));
            }
            HeadKind::Conv => {
                rows.push(
                    LayerRow::new("head_conv_bn", "conv_bn 1x1 linear", vec![height, width, flat])
                        .with_params(channels * flat + 2 * flat, 2 * flat),
                );
                rows.push(LayerRow::new("global_avg_pool", "global_avg_pool", vec![flat]));
                rows.push(LayerRow::new(
                    "reshape",
                    "reshape",
                    vec![MAX_PLATE_SLOTS, VOCABULARY_SIZE, 1],
                ));
                rows.push(LayerRow::new(
                    "softmax",
                    "softmax axis=-2",
                    vec![MAX_PLATE_SLOTS, VOCABULARY_SIZE, 1],
                ));
            }
        }

        Ok(Self {
            architecture: config.architecture,
            head: config.head,
            input: [config.height, config.width, INPUT_CHANNELS],
            rows,
            feature,
        })
    }

    /// `[H, W, C]` of the backbone output
    pub fn feature_shape(&self) -> [usize; 3] {
        self.feature
    }

    /// Shape of the model output without the batch axis
    pub fn output_shape(&self) -> Vec<usize> {
        self.rows.last().map(|row| row.output.clone()).unwrap_or_default()
    }

    pub fn trainable_params(&self) -> usize {
        self.rows.iter().map(|row| row.trainable).sum()
    }

    pub fn non_trainable_params(&self) -> usize {
        self.rows.iter().map(|row| row.non_trainable).sum()
    }

    pub fn total_params(&self) -> usize {
        self.trainable_params() + self.non_trainable_params()
    }
}

fn format_shape(shape: &[usize]) -> String {
    shape
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join(" x ")
}

impl std::fmt::Display for ModelSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rule = "─".repeat(78);

        writeln!(
            f,
            "Model: {} / {} head, input {}",
            self.architecture,
            self.head,
            format_shape(&self.input)
        )?;
        writeln!(f, "{}", rule)?;
        writeln!(
            f,
            "{:<18} {:<24} {:<18} {:>14}",
            "Layer", "Type", "Output", "Params"
        )?;
        writeln!(f, "{}", rule)?;

        for row in &self.rows {
            writeln!(
                f,
                "{:<18} {:<24} {:<18} {:>14}",
                row.name,
                row.kind,
                format_shape(&row.output),
                format_number(row.trainable + row.non_trainable)
            )?;
        }

        writeln!(f, "{}", rule)?;
        writeln!(f, "Total params:         {}", format_number(self.total_params()))?;
        writeln!(f, "Trainable params:     {}", format_number(self.trainable_params()))?;
        writeln!(f, "Non-trainable params: {}", format_number(self.non_trainable_params()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(architecture: Architecture, dense: bool) -> ModelSummary {
        let config = OcrModelConfig::for_architecture(architecture, 70, 140, dense);
        ModelSummary::from_config(&config).unwrap()
    }

    #[test]
    fn test_conv_2m_param_count() {
        let s = summary(Architecture::Conv2M, true);
        assert_eq!(s.trainable_params(), 2_001_219);
        assert_eq!(s.non_trainable_params(), 5_632);
    }

    #[test]
    fn test_sep_conv_1m_param_count() {
        let s = summary(Architecture::SepConv1M, true);
        assert_eq!(s.trainable_params(), 1_190_115);
        assert_eq!(s.non_trainable_params(), 5_184);
    }

    #[test]
    fn test_conv_head_param_count() {
        let s = summary(Architecture::Conv2M, false);
        assert_eq!(s.trainable_params(), 2_001_478);
        assert_eq!(s.non_trainable_params(), 6_150);
    }

    #[test]
    fn test_feature_shapes() {
        assert_eq!(summary(Architecture::Conv2M, true).feature_shape(), [2, 3, 1024]);
        assert_eq!(summary(Architecture::SepConv1M, true).feature_shape(), [3, 5, 1024]);
    }

    #[test]
    fn test_output_shapes() {
        assert_eq!(summary(Architecture::Conv2M, true).output_shape(), vec![259]);
        assert_eq!(
            summary(Architecture::SepConv1M, false).output_shape(),
            vec![7, 37, 1]
        );
    }

    #[test]
    fn test_rows() {
        let s = summary(Architecture::Conv2M, true);
        let pools = s.rows.iter().filter(|r| r.name.starts_with("max_pool")).count();
        let dense = s.rows.iter().filter(|r| r.name.starts_with("dense_")).count();
        assert_eq!(pools, 5);
        assert_eq!(dense, MAX_PLATE_SLOTS);
        assert_eq!(s.rows[0].output, vec![70, 140, 64]);
        assert_eq!(s.rows[4].output, vec![24, 47, 64]);
    }

    #[test]
    fn test_display() {
        let text = summary(Architecture::SepConv1M, true).to_string();
        assert!(text.contains("sep-conv-1m"));
        assert!(text.contains("sep_conv_bn 3x3 dm=1"));
        assert!(text.contains("Trainable params:     1,190,115"));
    }

    #[test]
    fn test_invalid_config() {
        let config = OcrModelConfig::new().with_width(0);
        assert!(ModelSummary::from_config(&config).is_err());
    }
}
