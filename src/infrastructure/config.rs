use crate::domain::dataset::{DisplayFormat, Language};
use chrono_tz::Tz;
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigurationError {
    #[error("browser mode {mode} not supported at platform {os} / {arch}")]
    UnsupportedPlatform {
        mode: BrowserMode,
        os: &'static str,
        arch: &'static str,
    },
    #[error("browser mode external needs browser.path")]
    MissingBrowserPath,
    #[error("unknown timezone {0:?}")]
    UnknownTimezone(String),
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BrowserMode {
    BuiltIn,
    ChromiumBrowser,
    External,
    #[default]
    Automatic,
}

impl fmt::Display for BrowserMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BrowserMode::BuiltIn => "built-in",
            BrowserMode::ChromiumBrowser => "chromium-browser",
            BrowserMode::External => "external",
            BrowserMode::Automatic => "automatic",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct WeatherConfig {
    pub browser: BrowserSettings,
    pub source: SourceSettings,
    pub display: DisplaySettings,
    pub server: ServerSettings,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct BrowserSettings {
    pub mode: BrowserMode,
    /// Only used by the `external` mode.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SourceSettings {
    pub base_url: String,
    pub locale: String,
    pub routing_key: String,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            base_url: "https://www.meteox.com".to_string(),
            locale: "en-gb".to_string(),
            routing_key: String::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DisplaySettings {
    pub language: Language,
    pub timezone: String,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            language: Language::En,
            timezone: "UTC".to_string(),
        }
    }
}

impl DisplaySettings {
    pub fn display_format(&self) -> Result<DisplayFormat, ConfigurationError> {
        let timezone: Tz = self
            .timezone
            .parse()
            .map_err(|_| ConfigurationError::UnknownTimezone(self.timezone.clone()))?;
        Ok(DisplayFormat::new(self.language, timezone))
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

/// `config/weather.toml` (optional) overlaid with `DROPS__SECTION__KEY` variables.
pub fn load_config() -> anyhow::Result<WeatherConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/weather").required(false))
        .add_source(config::Environment::with_prefix("DROPS").separator("__"))
        .build()?;

    Ok(settings.try_deserialize()?)
}
