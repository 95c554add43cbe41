//! Pipeline configuration.
//!
//! Every recognized option has a default so a partial TOML file (or none
//! at all) yields a runnable pipeline. Validation happens once, up front;
//! the components assume validated values.

use crate::correction::{Remediation, SamplingMode};
use crate::difference::MetricKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Core pipeline tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Grid granularity in raw pixels.
    pub block_size: u32,
    /// Padding pixels added around changed blocks.
    pub bleed: u32,
    /// Upscaler magnification.
    pub scale_factor: u32,
    /// Correction cadence in frames.
    pub correction_block_size: u32,
    /// A block is changed when its dissimilarity exceeds this.
    pub difference_threshold: f64,
    /// Dissimilarity metric used for change detection and correction.
    pub metric: MetricKind,
    /// Changed-block fraction above which a transition may be a fade.
    pub fade_ratio_threshold: f64,
    /// Maximum coefficient of variation of changed-block scores for a fade.
    pub fade_variance_threshold: f64,
    /// Retries per region before the frame fails.
    pub max_dispatch_retries: u32,
    /// Regions upscaled concurrently.
    pub max_concurrent_dispatches: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            block_size: 8,
            bleed: 2,
            scale_factor: 2,
            correction_block_size: 2,
            difference_threshold: 8.0,
            metric: MetricKind::default(),
            fade_ratio_threshold: 0.9,
            fade_variance_threshold: 0.25,
            max_dispatch_retries: 2,
            max_concurrent_dispatches: 4,
        }
    }
}

impl PipelineConfig {
    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.block_size == 0 {
            return Err(ConfigError::InvalidBlockSize);
        }
        if self.scale_factor == 0 {
            return Err(ConfigError::InvalidScaleFactor);
        }
        if self.correction_block_size == 0 {
            return Err(ConfigError::InvalidCorrectionCadence);
        }
        if self.difference_threshold.is_nan() || self.difference_threshold < 0.0 {
            return Err(ConfigError::InvalidThreshold {
                name: "difference_threshold",
                value: self.difference_threshold,
            });
        }
        if !(0.0..=1.0).contains(&self.fade_ratio_threshold) {
            return Err(ConfigError::InvalidThreshold {
                name: "fade_ratio_threshold",
                value: self.fade_ratio_threshold,
            });
        }
        if self.fade_variance_threshold.is_nan() || self.fade_variance_threshold < 0.0 {
            return Err(ConfigError::InvalidThreshold {
                name: "fade_variance_threshold",
                value: self.fade_variance_threshold,
            });
        }
        if self.max_concurrent_dispatches == 0 {
            return Err(ConfigError::InvalidConcurrency);
        }
        Ok(())
    }
}

/// Drift correction tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrectionConfig {
    /// Residual above which a verified block is marked dirty.
    pub tolerance: f64,
    /// Blocks verified per correction frame beyond the seam blocks.
    pub sweep_blocks: usize,
    /// How the extra blocks are picked.
    pub sampling: SamplingMode,
    /// Seed for [`SamplingMode::Random`].
    pub seed: u64,
    /// Frames a correction record is kept for.
    pub retention_frames: u64,
    /// Which blocks a divergence forces into the next frame.
    pub remediation: Remediation,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            tolerance: 4.0,
            sweep_blocks: 4,
            sampling: SamplingMode::default(),
            seed: 0x5eed,
            retention_frames: 4,
            remediation: Remediation::default(),
        }
    }
}

impl CorrectionConfig {
    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tolerance.is_nan() || self.tolerance < 0.0 {
            return Err(ConfigError::InvalidThreshold {
                name: "tolerance",
                value: self.tolerance,
            });
        }
        Ok(())
    }
}

/// Where intermediate artifacts go.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Workspace root.
    pub path: PathBuf,
    /// Place the workspace under the OS temp directory instead of `path`.
    pub use_temp: bool,
    /// Keep every upscaled region as a PNG.
    pub save_regions: bool,
    /// Write reconstructed frames as PNGs.
    pub save_frames: bool,
    /// Write change-mask images.
    pub debug: bool,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("workspace"),
            use_temp: false,
            save_regions: false,
            save_frames: true,
            debug: false,
        }
    }
}

impl WorkspaceConfig {
    /// The directory the workspace actually lives in.
    pub fn resolved_path(&self) -> PathBuf {
        if self.use_temp {
            std::env::temp_dir().join("patchscale")
        } else {
            self.path.clone()
        }
    }
}

/// Metrics exporter configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MetricsConfig {
    /// Metrics server port (0 to disable).
    pub port: u16,
}

/// Configuration validation errors.
#[allow(missing_docs)]
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("block_size must be positive")]
    InvalidBlockSize,
    #[error("scale_factor must be positive")]
    InvalidScaleFactor,
    #[error("correction_block_size must be positive")]
    InvalidCorrectionCadence,
    #[error("invalid {name}: {value}")]
    InvalidThreshold { name: &'static str, value: f64 },
    #[error("max_concurrent_dispatches must be positive")]
    InvalidConcurrency,
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    /// Frame differencing, upscaling and dispatch.
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Correction pass tuning.
    #[serde(default)]
    pub correction: CorrectionConfig,
    /// Workspace location and artifact switches.
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    /// Metrics exporter.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pipeline.validate()?;
        self.correction.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        assert!(FileConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_block_size_invalid() {
        let config = PipelineConfig {
            block_size: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidBlockSize)));
    }

    #[test]
    fn test_nan_threshold_invalid() {
        let config = PipelineConfig {
            difference_threshold: f64::NAN,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidThreshold { name: "difference_threshold", .. })
        ));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = FileConfig::from_toml(
            r#"
            [pipeline]
            block_size = 16
            metric = "mad"

            [correction]
            sampling = "random"
            remediation = "neighbors"
            "#,
        )
        .unwrap();

        assert_eq!(config.pipeline.block_size, 16);
        assert_eq!(config.pipeline.metric, MetricKind::Mad);
        assert_eq!(config.pipeline.bleed, 2);
        assert_eq!(config.correction.sampling, SamplingMode::Random);
        assert_eq!(config.correction.remediation, Remediation::Neighbors);
        assert!(config.workspace.save_frames);
    }

    #[test]
    fn test_invalid_toml_rejected() {
        assert!(matches!(
            FileConfig::from_toml("[pipeline]\nscale_factor = 0\n"),
            Err(ConfigError::InvalidScaleFactor)
        ));
        assert!(matches!(
            FileConfig::from_toml("[pipeline\n"),
            Err(ConfigError::ParseError(_))
        ));
    }
}
