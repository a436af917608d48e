//! Persistent settings shared by the CLI and the library.
//! Stored as JSON in the platform config directory via `directories::ProjectDirs`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::actions::{CoordinateSpace, DEFAULT_WAIT_SECS};
use crate::adb::{AdbDevice, DEFAULT_ACTION_DELAY_MS};
use crate::agent::{AgentConfig, DEFAULT_STEP_INTERVAL_MS};
use crate::model::{
    ModelConfig, DEFAULT_HISTORY_N, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_SECS,
    DEFAULT_TIMEOUT_SECS,
};

/// Settings errors.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Cannot determine config directory")]
    NoConfigDir,
    #[error("Settings I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid settings file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Every option of a run, as saved between sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Model API base URL
    pub base_url: String,
    /// Model API key
    pub api_key: String,
    /// Model name
    pub model_name: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Maximum retries for model requests
    pub max_retries: u32,
    /// Retry delay in seconds
    pub retry_delay: u64,
    /// Path of the adb executable
    pub adb_path: String,
    /// ADB device ID (empty for the only attached device)
    pub device_id: String,
    /// Pause after each device action, in milliseconds
    pub action_delay_ms: u64,
    /// Language code ("cn" or "en")
    pub lang: String,
    /// Coordinate convention of the model
    pub coordinate_space: CoordinateSpace,
    /// Screenshots sent per request
    pub history_n: usize,
    /// Step limit, 0 for none
    pub max_steps: u32,
    pub step_interval_ms: u64,
    pub wait_secs: f64,
    /// Directory for the latest screenshots, empty to disable
    pub screenshot_dir: String,
    /// Write a transcript file per run
    pub session_log: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        let model = ModelConfig::default();
        Self {
            base_url: model.base_url,
            api_key: model.api_key,
            model_name: model.model_name,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY_SECS,
            adb_path: "adb".to_string(),
            device_id: String::new(),
            action_delay_ms: DEFAULT_ACTION_DELAY_MS,
            lang: "cn".to_string(),
            coordinate_space: CoordinateSpace::default(),
            history_n: DEFAULT_HISTORY_N,
            max_steps: 0,
            step_interval_ms: DEFAULT_STEP_INTERVAL_MS,
            wait_secs: DEFAULT_WAIT_SECS,
            screenshot_dir: String::new(),
            session_log: true,
        }
    }
}

impl AppSettings {
    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("com", "vlm-phone-agent", "vlm-phone-agent")
    }

    /// Get the config directory path.
    pub fn config_dir() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the settings file path.
    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("settings.json"))
    }

    /// Get logs directory path.
    pub fn logs_dir() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.data_dir().join("logs"))
    }

    /// Load settings, falling back to defaults when the file is missing or broken.
    pub fn load() -> Self {
        match Self::settings_path() {
            Some(path) => Self::load_from(&path).unwrap_or_else(|e| {
                if path.exists() {
                    tracing::warn!("Ignoring settings file {}: {}", path.display(), e);
                }
                Self::default()
            }),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save settings to the config file.
    pub fn save(&self) -> Result<PathBuf, SettingsError> {
        let path = Self::settings_path().ok_or(SettingsError::NoConfigDir)?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Overlay the process environment.
    pub fn apply_env(&mut self) -> Result<(), SettingsError> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    /// Overlay variables from `lookup`. Empty values are ignored.
    pub fn apply_vars<F>(&mut self, lookup: F) -> Result<(), SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("MODEL_BASE_URL") {
            self.base_url = v;
        }
        if let Some(v) = get("MODEL_API_KEY") {
            self.api_key = v;
        }
        if let Some(v) = get("MODEL_NAME") {
            self.model_name = v;
        }
        if let Some(v) = get("ADB_PATH") {
            self.adb_path = v;
        }
        if let Some(v) = get("ADB_DEVICE_ID") {
            self.device_id = v;
        }
        if let Some(v) = get("AGENT_LANG") {
            self.lang = v;
        }
        if let Some(v) = get("SCREENSHOT_DIR") {
            self.screenshot_dir = v;
        }
        if let Some(v) = get("COORDINATE_SPACE") {
            self.coordinate_space = parse_var("COORDINATE_SPACE", &v)?;
        }
        if let Some(v) = get("HISTORY_N") {
            self.history_n = parse_var("HISTORY_N", &v)?;
        }
        if let Some(v) = get("MAX_STEPS") {
            self.max_steps = parse_var("MAX_STEPS", &v)?;
        }
        if let Some(v) = get("MODEL_MAX_RETRIES") {
            self.max_retries = parse_var("MODEL_MAX_RETRIES", &v)?;
        }
        if let Some(v) = get("MODEL_RETRY_DELAY") {
            self.retry_delay = parse_var("MODEL_RETRY_DELAY", &v)?;
        }
        Ok(())
    }

    pub fn to_model_config(&self) -> ModelConfig {
        ModelConfig::default()
            .with_base_url(&self.base_url)
            .with_api_key(&self.api_key)
            .with_model_name(&self.model_name)
            .with_timeout(self.timeout_secs)
            .with_max_retries(self.max_retries)
            .with_retry_delay(self.retry_delay)
    }

    pub fn to_agent_config(&self) -> AgentConfig {
        AgentConfig {
            history_n: self.history_n.max(1),
            coordinate_space: self.coordinate_space,
            lang: self.lang.clone(),
            max_steps: (self.max_steps > 0).then_some(self.max_steps),
            step_interval_ms: self.step_interval_ms,
            wait_secs: self.wait_secs,
            screenshot_dir: (!self.screenshot_dir.is_empty())
                .then(|| PathBuf::from(&self.screenshot_dir)),
            session_log: self.session_log,
            verbose: false,
        }
    }

    pub fn to_device(&self) -> AdbDevice {
        let device = AdbDevice::new(&self.adb_path).with_action_delay(self.action_delay_ms);
        if self.device_id.is_empty() {
            device
        } else {
            device.with_device_id(&self.device_id)
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, SettingsError> {
    value
        .trim()
        .parse()
        .map_err(|_| SettingsError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        })
}
