use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_TARGET_LABEL: &str = "STEM Teacher";
const DEFAULT_THRESHOLD: f64 = 0.5;
const DEFAULT_PASS_MESSAGE: &str = "You're a STEM Educator ✅";
const DEFAULT_RASTER_WIDTH: u32 = 224;
const DEFAULT_RASTER_HEIGHT: u32 = 224;
const DEFAULT_TARGET_FPS: u32 = 30;
const DEFAULT_MIRROR: bool = true;

#[derive(Debug, Deserialize, Default)]
struct AppConfigFile {
    target_label: Option<String>,
    threshold: Option<f64>,
    pass_message: Option<String>,
    raster: Option<RasterConfigFile>,
    capture: Option<CaptureConfigFile>,
    model: Option<ModelConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct RasterConfigFile {
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    mirror: Option<bool>,
    target_fps: Option<u32>,
    device: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    model_path: Option<PathBuf>,
    metadata_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub target_label: String,
    pub threshold: f64,
    pub pass_message: String,
    pub raster: RasterSettings,
    pub capture: CaptureSettings,
    pub model: ModelSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterSettings {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct CaptureSettings {
    /// Flip live frames for a selfie view. Fixed for the session.
    pub mirror: bool,
    pub target_fps: u32,
    /// Preferred device id; the front-camera heuristic is used when unset.
    pub device: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ModelSettings {
    pub model_path: Option<PathBuf>,
    pub metadata_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_file(AppConfigFile::default())
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("VERDICT_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AppConfigFile) -> Self {
        let raster = RasterSettings {
            width: file
                .raster
                .as_ref()
                .and_then(|r| r.width)
                .unwrap_or(DEFAULT_RASTER_WIDTH),
            height: file
                .raster
                .as_ref()
                .and_then(|r| r.height)
                .unwrap_or(DEFAULT_RASTER_HEIGHT),
        };
        let capture = CaptureSettings {
            mirror: file
                .capture
                .as_ref()
                .and_then(|c| c.mirror)
                .unwrap_or(DEFAULT_MIRROR),
            target_fps: file
                .capture
                .as_ref()
                .and_then(|c| c.target_fps)
                .unwrap_or(DEFAULT_TARGET_FPS),
            device: file.capture.and_then(|c| c.device),
        };
        let model = file
            .model
            .map(|m| ModelSettings {
                model_path: m.model_path,
                metadata_path: m.metadata_path,
            })
            .unwrap_or_default();
        Self {
            target_label: file
                .target_label
                .unwrap_or_else(|| DEFAULT_TARGET_LABEL.to_string()),
            threshold: file.threshold.unwrap_or(DEFAULT_THRESHOLD),
            pass_message: file
                .pass_message
                .unwrap_or_else(|| DEFAULT_PASS_MESSAGE.to_string()),
            raster,
            capture,
            model,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(label) = std::env::var("VERDICT_TARGET_LABEL") {
            if !label.trim().is_empty() {
                self.target_label = label;
            }
        }
        if let Ok(threshold) = std::env::var("VERDICT_THRESHOLD") {
            self.threshold = threshold
                .trim()
                .parse()
                .map_err(|_| anyhow!("VERDICT_THRESHOLD must be a number between 0 and 1"))?;
        }
        if let Ok(mirror) = std::env::var("VERDICT_MIRROR") {
            self.capture.mirror = parse_bool(&mirror)
                .ok_or_else(|| anyhow!("VERDICT_MIRROR must be true/false/1/0"))?;
        }
        if let Ok(fps) = std::env::var("VERDICT_FPS") {
            self.capture.target_fps = fps
                .trim()
                .parse()
                .map_err(|_| anyhow!("VERDICT_FPS must be a positive integer"))?;
        }
        if let Ok(device) = std::env::var("VERDICT_DEVICE") {
            if !device.trim().is_empty() {
                self.capture.device = Some(device);
            }
        }
        if let Ok(path) = std::env::var("VERDICT_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.model.model_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(path) = std::env::var("VERDICT_METADATA_PATH") {
            if !path.trim().is_empty() {
                self.model.metadata_path = Some(PathBuf::from(path));
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.target_label.trim().is_empty() {
            return Err(anyhow!("target_label must not be empty"));
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(anyhow!(
                "threshold must be within [0, 1] (got {})",
                self.threshold
            ));
        }
        if self.raster.width == 0 || self.raster.height == 0 {
            return Err(anyhow!("raster dimensions must be greater than zero"));
        }
        if self.capture.target_fps == 0 {
            return Err(anyhow!("target_fps must be at least 1"));
        }
        if self.model.model_path.is_some() != self.model.metadata_path.is_some() {
            return Err(anyhow!(
                "model_path and metadata_path must be configured together"
            ));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<AppConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
