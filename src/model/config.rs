//! Model Configuration Module
//!
//! One Burn `Config` record selects the backbone, the head and the input
//! size. It is validated before any layer is created, so bad sizes surface
//! as a typed error rather than a tensor shape panic deep inside Burn.

use std::path::Path;

use burn::{config::Config, tensor::backend::Backend};

use super::architecture::{Architecture, HeadKind};
use super::ocr::PlateOcrModel;
use crate::utils::error::PlateOcrError;

/// Default input height of a plate crop
pub const DEFAULT_HEIGHT: usize = 70;

/// Default input width of a plate crop
pub const DEFAULT_WIDTH: usize = 140;

/// Configuration for a plate OCR network
#[derive(Config, Debug)]
pub struct OcrModelConfig {
    /// Backbone topology
    #[config(default = "Architecture::Conv2M")]
    pub architecture: Architecture,

    /// Classification head
    #[config(default = "HeadKind::Dense")]
    pub head: HeadKind,

    /// Input image height (grayscale)
    #[config(default = "70")]
    pub height: usize,

    /// Input image width (grayscale)
    #[config(default = "140")]
    pub width: usize,

    /// Dropout rate of the dense head
    #[config(default = "0.5")]
    pub dropout: f64,
}

impl OcrModelConfig {
    /// Config for one of the two backbones with the head picked by `dense`
    pub fn for_architecture(
        architecture: Architecture,
        height: usize,
        width: usize,
        dense: bool,
    ) -> Self {
        Self::new()
            .with_architecture(architecture)
            .with_head(HeadKind::from_dense_flag(dense))
            .with_height(height)
            .with_width(width)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.height == 0 || self.width == 0 {
            return Err(PlateOcrError::Config(format!(
                "input size must be positive, got {}x{}",
                self.height, self.width
            )));
        }

        if !(0.0..1.0).contains(&self.dropout) {
            return Err(PlateOcrError::Config(format!(
                "dropout must be in range [0.0, 1.0), got {}",
                self.dropout
            )));
        }

        Ok(())
    }

    /// Build an untrained model on `device`
    pub fn init<B: Backend>(&self, device: &B::Device) -> crate::Result<PlateOcrModel<B>> {
        self.validate()?;
        Ok(PlateOcrModel::new(self, device))
    }

    /// Load and validate a JSON config
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let config = <Self as Config>::load(path).map_err(|e| {
            PlateOcrError::Serialization(format!("{}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the config as JSON
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> crate::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        self.save(path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OcrModelConfig::new();
        assert_eq!(config.architecture, Architecture::Conv2M);
        assert_eq!(config.head, HeadKind::Dense);
        assert_eq!(config.height, DEFAULT_HEIGHT);
        assert_eq!(config.width, DEFAULT_WIDTH);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let config = OcrModelConfig::new().with_height(0);
        assert!(matches!(config.validate(), Err(PlateOcrError::Config(_))));

        let config = OcrModelConfig::new().with_width(0);
        assert!(config.validate().is_err());

        let config = OcrModelConfig::new().with_dropout(1.0);
        assert!(config.validate().is_err());

        let config = OcrModelConfig::new().with_dropout(-0.1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_for_architecture() {
        let config = OcrModelConfig::for_architecture(Architecture::SepConv1M, 64, 128, false);
        assert_eq!(config.architecture, Architecture::SepConv1M);
        assert_eq!(config.head, HeadKind::Conv);
        assert_eq!((config.height, config.width), (64, 128));
    }

    #[test]
    fn test_config_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("configs").join("ocr.json");

        let config = OcrModelConfig::for_architecture(Architecture::SepConv1M, 48, 96, false)
            .with_dropout(0.25);
        config.to_file(&path).unwrap();

        let loaded = OcrModelConfig::from_file(&path).unwrap();
        assert_eq!(loaded.architecture, Architecture::SepConv1M);
        assert_eq!(loaded.head, HeadKind::Conv);
        assert_eq!((loaded.height, loaded.width), (48, 96));
        assert_eq!(loaded.dropout, 0.25);
    }

    #[test]
    fn test_from_file_rejects_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        OcrModelConfig::new().with_height(0).to_file(&path).unwrap();

        assert!(matches!(
            OcrModelConfig::from_file(&path),
            Err(PlateOcrError::Config(_))
        ));
    }

    #[test]
    fn test_from_file_missing() {
        assert!(OcrModelConfig::from_file("/nonexistent/ocr.json").is_err());
    }
}
