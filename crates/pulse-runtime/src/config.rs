#![forbid(unsafe_code)]

//! Runtime configuration.
//!
//! Host capabilities are passed in explicitly rather than probed from ambient
//! globals. [`RuntimeConfig::from_env`] is the one place that reads the
//! process environment:
//!
//! | Variable | Values | Effect |
//! |----------|--------|--------|
//! | `PULSE_EXTERNAL_SCHEDULING` | `1`, `true`, `yes`, `on` | host flushes itself |
//!
//! With the `policy-config` feature, the same settings load from TOML:
//!
//! ```toml
//! [host]
//! external_scheduling = false
//!
//! [coalesce]
//! leading = true
//! trailing = true
//! ```

use std::env;
use std::fmt;
use std::io;

use pulse_core::CoalesceConfig;

/// Environment variable read by [`RuntimeConfig::from_env`].
pub const EXTERNAL_SCHEDULING_ENV: &str = "PULSE_EXTERNAL_SCHEDULING";

/// What the host environment already does for us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "policy-config", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "policy-config", serde(default))]
pub struct HostCapabilities {
    /// The host flushes after every task, so flush requests are redundant.
    pub external_scheduling: bool,
}

/// Settings for a Pulse runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "policy-config", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "policy-config", serde(default))]
pub struct RuntimeConfig {
    pub host: HostCapabilities,
    pub coalesce: CoalesceConfig,
}

impl RuntimeConfig {
    /// Defaults, with host capabilities taken from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        let external = env::var(EXTERNAL_SCHEDULING_ENV).ok();
        Self::from_env_value(external.as_deref())
    }

    fn from_env_value(external_scheduling: Option<&str>) -> Self {
        Self {
            host: HostCapabilities {
                external_scheduling: external_scheduling.is_some_and(parse_flag),
            },
            ..Self::default()
        }
    }

    /// Parse a TOML document.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] if the document is malformed or has fields of
    /// the wrong type.
    #[cfg(feature = "policy-config")]
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        toml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Read and parse a TOML file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`from_toml_str`](Self::from_toml_str).
    #[cfg(feature = "policy-config")]
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&source)?;
        tracing::debug!(
            target: "pulse::config",
            external_scheduling = config.host.external_scheduling,
            leading = config.coalesce.leading,
            trailing = config.coalesce.trailing,
            "runtime config loaded"
        );
        Ok(config)
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure to load a [`RuntimeConfig`].
#[derive(Debug)]
pub enum ConfigError {
    /// The document could not be parsed.
    Parse(String),
    /// The file could not be read.
    Io(io::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(msg) => write!(f, "invalid runtime config: {msg}"),
            Self::Io(e) => write!(f, "cannot read runtime config: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Parse(_) => None,
            Self::Io(e) => Some(e),
        }
    }
}

impl From<io::Error> for ConfigError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
