use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::extract::{ItemScanStart, DEFAULT_DATE_PATTERN, DEFAULT_PRICE_PATTERN};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Every tunable of the scanner. All sections are optional in TOML; missing
/// values fall back to the tuned defaults below.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub ocr: OcrConfig,
    pub denoise: DenoiseConfig,
    pub artifacts: ArtifactConfig,
    pub deskew: DeskewConfig,
    pub stroke: StrokeConfig,
    pub patterns: PatternConfig,
    pub items: ItemConfig,
    pub batch: BatchConfig,
}

impl PipelineConfig {
    pub fn from_toml(toml_content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_content)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Tesseract language code.
    pub language: String,
    pub tessdata_path: Option<String>,
    pub timeout_secs: u64,
}

impl OcrConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            tessdata_path: None,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DenoiseConfig {
    /// Pixels above this intensity become white, the rest black.
    pub threshold: u8,
    pub median_radius: u32,
}

impl Default for DenoiseConfig {
    fn default() -> Self {
        Self { threshold: 140, median_radius: 1 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    /// Exclusive bounds on word-box area as a fraction of the image area.
    pub area_frac_lo: f64,
    pub area_frac_hi: f64,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self { area_frac_lo: 0.0001, area_frac_hi: 0.6 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeskewConfig {
    pub blur_sigma: f32,
    /// Dilation kernel as `[width, height]`.
    pub dilate_kernel: [u32; 2],
    pub dilate_iterations: u32,
    /// Rotated rects smaller than this fraction of the image are ignored.
    pub min_area_frac: f64,
}

impl Default for DeskewConfig {
    fn default() -> Self {
        Self {
            blur_sigma: 1.7,
            dilate_kernel: [30, 5],
            dilate_iterations: 5,
            min_area_frac: 0.03,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrokeConfig {
    pub kernel: [u32; 2],
    pub iterations: u32,
}

impl Default for StrokeConfig {
    fn default() -> Self {
        Self { kernel: [2, 2], iterations: 2 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    /// Must define named groups `w` and `f`.
    pub price: String,
    /// Must define named groups `d`, `m` and `y`.
    pub date: String,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            price: DEFAULT_PRICE_PATTERN.to_string(),
            date: DEFAULT_DATE_PATTERN.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemConfig {
    pub scan_start: ItemScanStart,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub workers: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { workers: 4 }
    }
}
