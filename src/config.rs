use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path, time::Duration};

use crate::{Error, InternalResult};

/// Wire shape the secondary-model endpoint speaks.
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    Default,
    PartialEq,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WireFormat {
    /// Single-shot generation call, API key as query parameter.
    #[default]
    Native,
    /// `chat/completions`-shaped endpoint, API key as bearer credential.
    OpenaiCompatible,
}

/// Settings snapshot for the secondary model.
///
/// Owned by the host's settings subsystem; the pipeline takes a read-only
/// clone once per dispatch. Writes back to the host store are debounced by
/// the host and are outside this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub provider: String,

    #[serde(default)]
    pub wire_format: WireFormat,

    #[serde(default)]
    pub base_url: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default)]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    #[serde(default = "default_timeout", with = "duration_secs")]
    pub timeout: Duration,

    #[serde(default = "default_retry_count")]
    pub retry_count: usize,

    #[serde(default)]
    pub enabled: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider: String::new(),
            wire_format: WireFormat::default(),
            base_url: String::new(),
            api_key: String::new(),
            model: String::new(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout: default_timeout(),
            retry_count: default_retry_count(),
            enabled: false,
        }
    }
}

impl ProviderConfig {
    /// Enforces the enablement invariant: an enabled provider must name a
    /// provider, model, API key and base URL. A disabled config is always
    /// valid since the pipeline installs nothing for it.
    pub fn validate_enabled(&self) -> InternalResult<()> {
        if !self.enabled {
            return Ok(());
        }
        for (field, value) in [
            ("provider", &self.provider),
            ("model", &self.model),
            ("api_key", &self.api_key),
            ("base_url", &self.base_url),
        ] {
            if value.trim().is_empty() {
                return Err(Error::internal(format!(
                    "provider config enabled but {} is empty",
                    field
                )));
            }
        }
        Ok(())
    }
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_event_buffer_size")]
    pub event_buffer_size: usize,

    #[serde(default = "default_retry_delay", with = "duration_ms")]
    pub retry_delay: Duration,

    #[serde(default = "default_status_dismiss", with = "duration_ms")]
    pub status_dismiss: Duration,

    #[serde(default)]
    pub provider: ProviderConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: default_event_buffer_size(),
            retry_delay: default_retry_delay(),
            status_dismiss: default_status_dismiss(),
            provider: ProviderConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_file(path: &str) -> InternalResult<Self> {
        from_file(path)
    }
}

pub fn from_file<T: for<'de> Deserialize<'de>, P: AsRef<Path>>(path: P) -> InternalResult<T> {
    let file = File::open(path)
        .map_err(|e| Error::internal(format!("Failed to open config file: {}", e)))?;
    let reader = BufReader::new(file);
    let config = serde_json::from_reader(reader)
        .map_err(|e| Error::internal(format!("Failed to parse config file: {}", e)))?;
    Ok(config)
}

pub fn from_str<T: for<'de> Deserialize<'de>>(s: &str) -> InternalResult<T> {
    let config = serde_json::from_str(s)
        .map_err(|e| Error::internal(format!("Failed to parse config: {}", e)))?;
    Ok(config)
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> usize {
    1000
}

fn default_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_retry_count() -> usize {
    3
}

fn default_event_buffer_size() -> usize {
    64
}

fn default_retry_delay() -> Duration {
    Duration::from_millis(1500)
}

fn default_status_dismiss() -> Duration {
    Duration::from_millis(4000)
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
