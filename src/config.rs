use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::time::Duration;

use config::{Config, File, FileFormat};
use serde::Deserialize;

use crate::errors::{OllamaError, OllamaResult};

pub const DEFAULT_HOST: &str = "http://localhost:11434";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CONFIG_FILE: &str = "ollama.toml";

pub const HOST_PROPERTY: &str = "ollama.host";
pub const HOST_ENV: &str = "OLLAMA_HOST";
pub const WEATHER_KEY_PROPERTY: &str = "openweathermap.api_key";
pub const WEATHER_KEY_ENV: &str = "OPENWEATHERMAP_API_KEY";

/// Settings read from the configuration file.
///
/// ```toml
/// [ollama]
/// host = "http://gpu-box:11434"
///
/// [openweathermap]
/// api_key = "..."
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileSettings {
    #[serde(default)]
    pub ollama: OllamaSection,
    #[serde(default)]
    pub openweathermap: WeatherSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OllamaSection {
    #[serde(default)]
    pub host: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WeatherSection {
    #[serde(default)]
    pub api_key: Option<String>,
}

impl FileSettings {
    /// Load settings from a TOML file. A missing file yields empty settings.
    pub fn load(path: &Path) -> OllamaResult<Self> {
        let config = Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml).required(false))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    fn get(&self, property: &str) -> Option<&str> {
        match property {
            HOST_PROPERTY => self.ollama.host.as_deref(),
            WEATHER_KEY_PROPERTY => self.openweathermap.api_key.as_deref(),
            _ => None,
        }
    }
}

/// Every configuration source the client consults, captured up front so that
/// resolution is a pure function of this value.
#[derive(Debug, Clone, Default)]
pub struct ConfigSnapshot {
    pub properties: HashMap<String, String>,
    pub env: HashMap<String, String>,
    pub file: FileSettings,
}

impl ConfigSnapshot {
    /// Capture caller supplied properties, the process environment and the
    /// configuration file at `path` (if any).
    pub fn capture(properties: HashMap<String, String>, path: Option<&Path>) -> OllamaResult<Self> {
        let file = match path {
            Some(path) => FileSettings::load(path)?,
            None => FileSettings::load(Path::new(DEFAULT_CONFIG_FILE))?,
        };

        Ok(Self {
            properties,
            env: env::vars().collect(),
            file,
        })
    }

    /// Look a setting up as property, then environment variable, then file entry.
    /// Blank values count as unset.
    pub fn lookup(&self, property: &str, env_var: &str) -> Option<String> {
        self.properties
            .get(property)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
            .or_else(|| {
                self.env
                    .get(env_var)
                    .map(String::as_str)
                    .filter(|v| !v.trim().is_empty())
            })
            .or_else(|| self.file.get(property).filter(|v| !v.trim().is_empty()))
            .map(|v| v.trim().to_string())
    }

    pub fn resolve_host(&self, explicit: Option<&str>) -> String {
        explicit
            .map(str::trim)
            .filter(|host| !host.is_empty())
            .map(str::to_string)
            .or_else(|| self.lookup(HOST_PROPERTY, HOST_ENV))
            .unwrap_or_else(|| DEFAULT_HOST.to_string())
    }

    pub fn weather_api_key(&self) -> OllamaResult<String> {
        self.lookup(WEATHER_KEY_PROPERTY, WEATHER_KEY_ENV)
            .ok_or_else(|| {
                OllamaError::MissingSetting(format!(
                    "OpenWeatherMap API key not found. Set the {} property, the {} environment variable, or [openweathermap] api_key in the config file",
                    WEATHER_KEY_PROPERTY, WEATHER_KEY_ENV
                ))
            })
    }
}

/// Connection settings for `OllamaClient`.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub host: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_HOST)
    }
}

impl ClientConfig {
    pub fn new<S: Into<String>>(host: S) -> Self {
        Self {
            host: host.into(),
            connect_timeout: DEFAULT_TIMEOUT,
            read_timeout: DEFAULT_TIMEOUT,
            write_timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn from_snapshot(explicit: Option<&str>, snapshot: &ConfigSnapshot) -> Self {
        Self::new(snapshot.resolve_host(explicit))
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// The blocking transport has a single deadline covering each send and each
    /// body read; it is the larger of the read and write timeouts.
    pub(crate) fn io_timeout(&self) -> Duration {
        self.read_timeout.max(self.write_timeout)
    }
}
