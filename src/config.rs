//! Configuration file handling for civic-reporter.
//!
//! Loads configuration from `~/.config/civic-reporter/config.toml` or a custom path.
//! Secrets never live here; they come from the environment (or a `.env` file).

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::analysis::{DEFAULT_MODEL, GEMINI_API_BASE_URL};
use crate::camera::{default_device, default_input_format, CaptureSettings, FacingMode, Locale, Resolution};
use crate::geo::{DEFAULT_LANGUAGE, DEFAULT_REGION, IP_LOOKUP_BASE_URL, NOMINATIM_BASE_URL};
use crate::report::DEFAULT_SERVER_URL;
use crate::social::X_API_BASE_URL;

/// Configuration file structure for civic-reporter.
/// Loaded from ~/.config/civic-reporter/config.toml (or custom path via --config).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub twitter: TwitterConfig,
    #[serde(default)]
    pub geocoding: GeocodingConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub ui: UiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Largest accepted upload in megabytes
    pub upload_limit_mb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".to_string(),
            upload_limit_mb: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeminiConfig {
    pub model: String,
    pub base_url: String,
    pub max_retries: u32,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            base_url: GEMINI_API_BASE_URL.to_string(),
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TwitterConfig {
    pub base_url: String,
}

impl Default for TwitterConfig {
    fn default() -> Self {
        Self {
            base_url: X_API_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeocodingConfig {
    pub language: String,
    pub region: String,
    pub nominatim_url: String,
    pub ip_lookup_url: String,
    pub timeout_secs: u64,
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE.to_string(),
            region: DEFAULT_REGION.to_string(),
            nominatim_url: NOMINATIM_BASE_URL.to_string(),
            ip_lookup_url: IP_LOOKUP_BASE_URL.to_string(),
            timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CameraConfig {
    pub ffmpeg: String,
    /// ffmpeg input format; platform default when unset
    pub input_format: Option<String>,
    pub front_device: Option<String>,
    pub back_device: Option<String>,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            input_format: None,
            front_device: None,
            back_device: None,
            width: Resolution::HD.width,
            height: Resolution::HD.height,
            fps: 30,
        }
    }
}

impl CameraConfig {
    pub fn input_format(&self) -> &str {
        self.input_format.as_deref().unwrap_or(default_input_format())
    }

    pub fn device(&self, facing: FacingMode) -> &str {
        let configured = match facing {
            FacingMode::Front => self.front_device.as_deref(),
            FacingMode::Back => self.back_device.as_deref(),
        };
        configured.unwrap_or(default_device(facing))
    }

    pub fn resolution(&self) -> Resolution {
        Resolution {
            width: self.width,
            height: self.height,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReportConfig {
    /// Server the `report` command talks to
    pub server_url: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UiConfig {
    /// `en` or `hi`
    pub locale: String,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            locale: "en".to_string(),
        }
    }
}

impl UiConfig {
    /// Configured locale, English when the tag is unknown.
    pub fn locale(&self) -> Locale {
        Locale::from_tag(&self.locale).unwrap_or_else(|| {
            log::warn!("Unknown locale '{}', using English", self.locale);
            Locale::English
        })
    }
}

impl Config {
    /// Load configuration from a file path.
    /// Returns default config if the file doesn't exist.
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(PathBuf::from).unwrap_or_else(default_path);

        if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::IoError {
                path: path.clone(),
                source: e,
            })?;
            let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.clone(),
                source: e,
            })?;
            log::debug!("Loaded config from {}", path.display());
            Ok(config)
        } else {
            log::debug!("No config at {}, using defaults", path.display());
            Ok(Config::default())
        }
    }

    /// The effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::SerializeError)
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server.bind.parse().map_err(|_| ConfigError::InvalidValue {
            key: "server.bind",
            value: self.server.bind.clone(),
        })
    }

    pub fn body_limit(&self) -> usize {
        self.server.upload_limit_mb.saturating_mul(1024 * 1024)
    }

    pub fn locate_timeout(&self) -> Duration {
        Duration::from_secs(self.geocoding.timeout_secs)
    }

    /// Capture settings with the configured resolution, frame rate and locale.
    pub fn capture_settings(&self) -> CaptureSettings {
        CaptureSettings {
            resolution: self.camera.resolution(),
            fps: self.camera.fps,
            locale: self.ui.locale(),
            ..CaptureSettings::default()
        }
    }
}

/// Errors that can occur when loading or writing configuration.
#[derive(Debug)]
pub enum ConfigError {
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
    SerializeError(toml::ser::Error),
    InvalidValue {
        key: &'static str,
        value: String,
    },
    AlreadyExists(PathBuf),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError { path, source } => {
                write!(f, "Failed to access config file '{}': {}", path.display(), source)
            }
            ConfigError::ParseError { path, source } => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), source)
            }
            ConfigError::SerializeError(source) => write!(f, "Failed to serialize config: {}", source),
            ConfigError::InvalidValue { key, value } => write!(f, "Invalid value for {}: '{}'", key, value),
            ConfigError::AlreadyExists(path) => write!(f, "Config file already exists: {}", path.display()),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::IoError { source, .. } => Some(source),
            ConfigError::ParseError { source, .. } => Some(source),
            ConfigError::SerializeError(source) => Some(source),
            _ => None,
        }
    }
}

/// Get the default config file path.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("civic-reporter").join("config.toml"))
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config/civic-reporter/config.toml")
        })
}

/// Commented default configuration written by `config init`.
pub const DEFAULT_CONFIG: &str = r#"# civic-reporter configuration
#
# API keys are read from the environment (or a .env file):
#   GEMINI_API_KEY, X_ACCESS_TOKEN, GOOGLE_MAPS_API_KEY

[server]
# Address the HTTP server listens on
bind = "127.0.0.1:3000"
# Largest accepted upload, in megabytes
upload_limit_mb = 50

[gemini]
model = "gemini-1.5-flash"
base_url = "https://generativelanguage.googleapis.com"
# Retries for rate limits and transient upstream errors
max_retries = 3

[twitter]
base_url = "https://api.x.com"

[geocoding]
language = "en"
region = "in"
nominatim_url = "https://nominatim.openstreetmap.org"
ip_lookup_url = "http://ip-api.com"
# Upper bound on one location lookup
timeout_secs = 15

[camera]
ffmpeg = "ffmpeg"
# Platform default when unset (v4l2 on Linux, avfoundation on macOS)
# input_format = "v4l2"
# front_device = "/dev/video0"
# back_device = "/dev/video2"
width = 1280
height = 720
fps = 30

[report]
# Server used by the `report` command
server_url = "http://127.0.0.1:3000"

[ui]
# Message language: en, hi
locale = "en"
"#;

/// Write [`DEFAULT_CONFIG`] to `path`, refusing to overwrite.
pub fn init_config(path: &Path) -> Result<(), ConfigError> {
    if path.exists() {
        return Err(ConfigError::AlreadyExists(path.to_path_buf()));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    std::fs::write(path, DEFAULT_CONFIG).map_err(|e| ConfigError::IoError {
        path: path.to_path_buf(),
        source: e,
    })
}
