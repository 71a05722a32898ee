//! Configuration for the touchscreen driver.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Main configuration for the driver daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Character device delivering the sensor byte stream
    pub input_device: PathBuf,

    /// uinput control node used to create the virtual touchscreen
    pub uinput_device: PathBuf,

    /// Name reported by the virtual input device
    pub device_name: String,

    /// Silence on the input after which all touches are lifted
    #[serde(with = "duration_millis")]
    pub liftoff_timeout: Duration,

    /// Request SCHED_FIFO priority at startup
    pub realtime_priority: bool,

    /// Frame pipeline settings
    pub pipeline: PipelineConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_device: PathBuf::from("/dev/ctp_uart"),
            uinput_device: PathBuf::from("/dev/uinput"),
            device_name: "HPTouchpad".to_string(),
            liftoff_timeout: Duration::from_millis(25),
            realtime_priority: true,
            pipeline: PipelineConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from an explicit path, falling back to defaults
    /// when the file does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        let config: Config =
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to an explicit path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ctp-touchd")
            .join("config.json")
    }

    /// Reject threshold combinations the tracker cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.pipeline.tuning;
        if t.delay_threshold >= t.initial_threshold {
            return Err(ConfigError::Invalid(format!(
                "delay_threshold ({}) must be below initial_threshold ({})",
                t.delay_threshold, t.initial_threshold
            )));
        }
        if t.fringe_threshold > t.unpress_threshold {
            return Err(ConfigError::Invalid(format!(
                "fringe_threshold ({}) must not exceed unpress_threshold ({})",
                t.fringe_threshold, t.unpress_threshold
            )));
        }
        if self.liftoff_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "liftoff_timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Settings consumed by the frame pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub orientation: Orientation,
    pub protocol: ProtocolVariant,
    pub filters: FilterConfig,
    pub tuning: Tuning,
}

/// How the sensor grid is laid out relative to the display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    /// 1024x768, both grid axes inverted
    #[default]
    Landscape,
    /// 768x1024, rotated 270 degrees in userspace
    Portrait,
}

impl Orientation {
    /// Screen width and height in pixels.
    pub fn resolution(self) -> (i32, i32) {
        match self {
            Orientation::Landscape => (1024, 768),
            Orientation::Portrait => (768, 1024),
        }
    }
}

/// Multi-touch reporting protocol used towards the input subsystem.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolVariant {
    /// Anonymous contacts separated by SYN_MT_REPORT
    #[default]
    A,
    /// Slotted contacts addressed with ABS_MT_SLOT
    B,
}

impl FromStr for Orientation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "landscape" => Ok(Orientation::Landscape),
            "portrait" => Ok(Orientation::Portrait),
            other => Err(format!("unknown orientation '{other}'")),
        }
    }
}

impl FromStr for ProtocolVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "a" => Ok(ProtocolVariant::A),
            "b" | "slots" => Ok(ProtocolVariant::B),
            other => Err(format!("unknown protocol '{other}', expected a or b")),
        }
    }
}

/// Noise filters that can be switched off individually.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub averaging: bool,
    pub debounce: bool,
    pub jump_rejection: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            averaging: true,
            debounce: true,
            jump_rejection: true,
        }
    }
}

/// Intensity and distance thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    /// New touches at or above this peak are reported immediately
    pub initial_threshold: u8,
    /// Cells above this value seed a region
    pub continue_threshold: u8,
    /// New touches at or below this peak are rejected
    pub delay_threshold: u8,
    /// Frames a weak new touch is held back
    pub delay_frames: u32,
    /// Neighbors at or above this join a region unconditionally
    pub unpress_threshold: u8,
    /// Lower bound for decaying fringe cells
    pub fringe_threshold: u8,
    /// Pixel distance beyond which a match is an impossible jump
    pub max_delta: i32,
    /// Pixel distance the previous point must have moved to allow a swipe
    pub min_prev_delta: i32,
    /// Allowed direction change in radians for a swipe
    pub max_delta_angle: f32,
    /// Half side of the debounce square in pixels
    pub debounce_radius: i32,
    /// Touch major per grid unit of blob extent
    pub pixels_per_point: i32,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            initial_threshold: 32,
            continue_threshold: 20,
            delay_threshold: 24,
            delay_frames: 2,
            unpress_threshold: 32,
            fringe_threshold: 15,
            max_delta: 130,
            min_prev_delta: 40,
            max_delta_angle: 0.25,
            debounce_radius: 10,
            pixels_per_point: 25,
        }
    }
}

impl Tuning {
    pub fn max_delta_sq(&self) -> i32 {
        self.max_delta * self.max_delta
    }

    pub fn min_prev_delta_sq(&self) -> i32 {
        self.min_prev_delta * self.min_prev_delta
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Serialize error: {0}")]
    SerializeError(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Serde support for Duration in milliseconds.
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
