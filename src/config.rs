//! Exception-handler configuration.
//!
//! Everything here is read once, at construction. Nothing is reloaded while
//! the middleware is serving.
//!
//! Layering, later wins:
//! 1. built-in defaults
//! 2. a TOML document ([`HandlerConfig::from_toml_str`] / [`HandlerConfig::from_file`])
//! 3. environment variables ([`HandlerConfig::with_env_overrides`])
//!
//! ```toml
//! environment    = "operational"
//! api_prefixes   = ["/API/"]
//! error_page     = "/Home/Error"
//! log_exceptions = true
//! log_file       = "/var/log/app/exceptions.jsonl"
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::Error;

/// Deployment posture.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Environment {
    /// Verbose, unredacted errors. Page faults are passed upstream.
    Diagnostic,
    /// Redacted errors. Page faults redirect to the error page.
    #[default]
    Operational,
}

impl Environment {
    pub fn is_diagnostic(self) -> bool {
        self == Self::Diagnostic
    }
}

/// Case-insensitive. Accepts the usual aliases (`development`, `production`, ...).
impl FromStr for Environment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "diagnostic" | "development" | "dev" | "debug" => Ok(Self::Diagnostic),
            "operational" | "production" | "prod" | "release" => Ok(Self::Operational),
            other => Err(Error::Config(format!("unknown environment `{other}`"))),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Diagnostic  => "diagnostic",
            Self::Operational => "operational",
        })
    }
}

impl<'de> Deserialize<'de> for Environment {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

pub(crate) const DEFAULT_LOG_TIMEOUT: Duration = Duration::from_secs(5);

/// Construction-time settings for
/// [`ExceptionMiddleware`](crate::middleware::ExceptionMiddleware).
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct HandlerConfig {
    pub environment: Environment,
    /// API base paths. Leading/trailing slashes are normalized later.
    pub api_prefixes: Vec<String>,
    /// Redirect target for page faults in the operational posture.
    pub error_page: String,
    pub log_exceptions: bool,
    /// Stripped from fault file paths that have no `src` segment.
    pub host_root: String,
    pub log_timeout_ms: u64,
    /// When set, exception records are appended here as JSON lines.
    pub log_file: Option<PathBuf>,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Operational,
            api_prefixes: Vec::new(),
            error_page: "/error".to_owned(),
            log_exceptions: false,
            host_root: String::new(),
            log_timeout_ms: DEFAULT_LOG_TIMEOUT.as_millis() as u64,
            log_file: None,
        }
    }
}

impl HandlerConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, Error> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Applies `{PREFIX}_*` overrides from the process environment.
    pub fn with_process_env(self, prefix: &str) -> Result<Self, Error> {
        self.with_env_overrides(prefix, |key| std::env::var(key).ok())
    }

    /// Applies `{PREFIX}_*` overrides read through `lookup`.
    ///
    /// Keys: `ENVIRONMENT`, `API_PREFIXES` (comma-separated), `ERROR_PAGE`,
    /// `LOG_EXCEPTIONS`, `HOST_ROOT`, `LOG_TIMEOUT_MS`, `LOG_FILE`.
    pub fn with_env_overrides(
        mut self,
        prefix: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, Error> {
        let var = |name: &str| lookup(&format!("{prefix}_{name}"));

        if let Some(v) = var("ENVIRONMENT") {
            self.environment = v.parse()?;
        }
        if let Some(v) = var("API_PREFIXES") {
            self.api_prefixes = v.split(',').map(str::trim).map(str::to_owned).collect();
        }
        if let Some(v) = var("ERROR_PAGE") {
            self.error_page = v;
        }
        if let Some(v) = var("LOG_EXCEPTIONS") {
            self.log_exceptions = parse_bool(&v)
                .ok_or_else(|| Error::Config(format!("invalid {prefix}_LOG_EXCEPTIONS `{v}`")))?;
        }
        if let Some(v) = var("HOST_ROOT") {
            self.host_root = v;
        }
        if let Some(v) = var("LOG_TIMEOUT_MS") {
            self.log_timeout_ms = v.trim().parse()
                .map_err(|_| Error::Config(format!("invalid {prefix}_LOG_TIMEOUT_MS `{v}`")))?;
        }
        if let Some(v) = var("LOG_FILE") {
            self.log_file = Some(PathBuf::from(v));
        }
        Ok(self)
    }

    pub fn log_timeout(&self) -> Duration {
        Duration::from_millis(self.log_timeout_ms)
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
