use crate::core_modules::overlay::ArrowStyle;
use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, warn};

/// Top-level rendering configuration, loadable from JSON.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub color: ColorConfig,
    pub animation: AnimationConfig,
    pub export: ExportConfig,
}

/// Settings for the motion-to-color encoding.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct ColorConfig {
    /// Fixed normalization radius; `None` uses the largest motion in the batch.
    pub max_motion: Option<f32>,
}

/// Settings for composing animation frames.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    /// Draw an arrow every `vector_step` pixels in each direction.
    pub vector_step: usize,
    /// Output size relative to the input frames.
    pub scale: f64,
    /// Frames per second of exported animations.
    pub fps: u32,
    /// Opacity of the flow-color layer over the source video.
    pub video2_alpha: f32,
    pub arrow_color: [u8; 3],
    pub arrow_head_length: f64,
    pub arrow_head_angle_deg: f64,
}

/// Settings for the frame export worker pool.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Number of export workers; `None` uses one per CPU.
    pub workers: Option<usize>,
    /// File name prefix of exported frames.
    pub frame_prefix: String,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            vector_step: 1,
            scale: 1.0,
            fps: 5,
            video2_alpha: 0.5,
            arrow_color: [0, 0, 0],
            arrow_head_length: 4.0,
            arrow_head_angle_deg: 25.0,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self { workers: None, frame_prefix: String::from("frame") }
    }
}

impl AnimationConfig {
    pub fn arrow_style(&self) -> ArrowStyle {
        ArrowStyle {
            color: self.arrow_color,
            head_length: self.arrow_head_length,
            head_angle_deg: self.arrow_head_angle_deg,
        }
    }
}

impl RenderConfig {
    /// Parses a JSON document; missing fields keep their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text).map_err(|e| Error::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a JSON config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json(&text)?;
        debug!(path = %path.display(), "loaded render config");
        Ok(config)
    }

    /// Applies `FV_*` environment overrides.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F: Fn(&str) -> Option<String>>(&mut self, lookup: F) -> Result<()> {
        if let Some(v) = lookup("FV_MAX_MOTION") {
            self.color.max_motion = Some(parse_var("FV_MAX_MOTION", &v)?);
        }
        if let Some(v) = lookup("FV_VECTOR_STEP") {
            self.animation.vector_step = parse_var("FV_VECTOR_STEP", &v)?;
        }
        if let Some(v) = lookup("FV_SCALE") {
            self.animation.scale = parse_var("FV_SCALE", &v)?;
        }
        if let Some(v) = lookup("FV_FPS") {
            self.animation.fps = parse_var("FV_FPS", &v)?;
        }
        if let Some(v) = lookup("FV_WORKERS") {
            self.export.workers = Some(parse_var("FV_WORKERS", &v)?);
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(m) = self.color.max_motion {
            if !m.is_finite() || m < 0.0 {
                return Err(Error::config(format!("max_motion must be finite and non-negative, got {m}")));
            }
        }
        let a = &self.animation;
        if a.vector_step == 0 {
            return Err(Error::config("vector_step must be at least 1"));
        }
        if !(a.scale.is_finite() && a.scale > 0.0) {
            return Err(Error::config(format!("scale must be positive, got {}", a.scale)));
        }
        if a.fps == 0 {
            return Err(Error::config("fps must be at least 1"));
        }
        if !(0.0..=1.0).contains(&a.video2_alpha) {
            return Err(Error::config(format!("video2_alpha must be in [0, 1], got {}", a.video2_alpha)));
        }
        if self.export.workers == Some(0) {
            warn!("export.workers is 0; one worker will be used");
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::config(format!("{key}: cannot parse {value:?}")))
}
