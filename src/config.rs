use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";
const DEFAULT_GATEWAY_BASE_URL: &str = "http://localhost:8080/api/v1";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_QUIESCENCE_WINDOW_MS: u64 = 100;
const DEFAULT_MAX_FILE_BYTES: u64 = 5 * 1024 * 1024;
const DEFAULT_MAX_BATCH_BYTES: u64 = 20 * 1024 * 1024;
const DEFAULT_NOTE_MAX_CHARS: usize = 2000;
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Engine configuration with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Base URL of the dispute backend
    #[validate(custom = "validate_base_url")]
    #[serde(default = "default_gateway_base_url")]
    pub gateway_base_url: String,

    /// Transport timeout in seconds (applies to every gateway call)
    #[validate(range(min = 1, max = 600))]
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Debounce window after the last file selection before an upload fires
    #[validate(range(min = 1, max = 5000))]
    #[serde(default = "default_quiescence_window_ms")]
    pub quiescence_window_ms: u64,

    /// Per-file size limit in bytes
    #[validate(range(min = 1))]
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,

    /// Aggregate size limit for multi-file upload batches
    #[validate(range(min = 1))]
    #[serde(default = "default_max_batch_bytes")]
    pub max_batch_bytes: u64,

    /// Accepted MIME types for evidence uploads
    #[validate(length(min = 1))]
    #[serde(default = "default_allowed_content_types")]
    pub allowed_content_types: Vec<String>,

    /// Maximum length of the generic evidence note
    #[validate(range(min = 1))]
    #[serde(default = "default_note_max_chars")]
    pub note_max_chars: usize,

    /// Event channel capacity for notices and refresh signals
    #[validate(range(min = 1))]
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[validate(custom = "validate_log_level")]
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            gateway_base_url: default_gateway_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            quiescence_window_ms: default_quiescence_window_ms(),
            max_file_bytes: default_max_file_bytes(),
            max_batch_bytes: default_max_batch_bytes(),
            allowed_content_types: default_allowed_content_types(),
            note_max_chars: default_note_max_chars(),
            event_channel_capacity: default_event_channel_capacity(),
            environment: default_environment(),
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

impl EngineConfig {
    pub fn quiescence_window(&self) -> Duration {
        Duration::from_millis(self.quiescence_window_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Cross-field constraints the derive cannot express.
    pub fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.max_batch_bytes < self.max_file_bytes {
            let mut err = ValidationError::new("max_batch_bytes");
            err.message = Some("max_batch_bytes must be at least max_file_bytes".into());
            errors.add("max_batch_bytes", err);
        }

        if self
            .allowed_content_types
            .iter()
            .any(|ct| ct.trim().is_empty() || !ct.contains('/'))
        {
            let mut err = ValidationError::new("allowed_content_types");
            err.message = Some("allowed_content_types must contain MIME types".into());
            errors.add("allowed_content_types", err);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Custom error type for configuration errors
#[derive(Error, Debug)]
pub enum EngineConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] ValidationErrors),
}

/// Default value functions
fn default_gateway_base_url() -> String {
    DEFAULT_GATEWAY_BASE_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_quiescence_window_ms() -> u64 {
    DEFAULT_QUIESCENCE_WINDOW_MS
}

fn default_max_file_bytes() -> u64 {
    DEFAULT_MAX_FILE_BYTES
}

fn default_max_batch_bytes() -> u64 {
    DEFAULT_MAX_BATCH_BYTES
}

fn default_allowed_content_types() -> Vec<String> {
    vec![
        "image/png".to_string(),
        "image/jpeg".to_string(),
        "application/pdf".to_string(),
    ]
}

fn default_note_max_chars() -> usize {
    DEFAULT_NOTE_MAX_CHARS
}

fn default_event_channel_capacity() -> usize {
    DEFAULT_EVENT_CHANNEL_CAPACITY
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_base_url(value: &str) -> Result<(), ValidationError> {
    match url::Url::parse(value) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
        _ => {
            let mut err = ValidationError::new("gateway_base_url");
            err.message = Some("gateway_base_url must be an absolute http(s) URL".into());
            Err(err)
        }
    }
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("stateset_disputes={}", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::new(filter_directive);
    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}

/// Loads engine configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<EngineConfig, EngineConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("gateway_base_url", DEFAULT_GATEWAY_BASE_URL)?
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(
            Environment::with_prefix("APP")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("allowed_content_types")
                .try_parsing(true),
        )
        .build()?;

    let engine_config: EngineConfig = config.try_deserialize()?;
    validate_config(&engine_config)?;

    info!("Configuration loaded successfully");
    Ok(engine_config)
}

/// Runs field-level and cross-field validation.
pub fn validate_config(engine_config: &EngineConfig) -> Result<(), EngineConfigError> {
    engine_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        EngineConfigError::Validation(e)
    })?;

    engine_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration constraint validation failed: {:?}", e);
        EngineConfigError::Validation(e)
    })?;

    Ok(())
}
