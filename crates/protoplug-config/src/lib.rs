//! Shared configuration for the protoplug binaries.
//!
//! Values are layered by `ortho_config`: built-in defaults, then a TOML file
//! (`--config-path` or `PROTOPLUG_CONFIG_PATH`), then `PROTOPLUG_*`
//! environment variables, then command-line flags.

mod defaults;

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

pub use self::defaults::{
    DEFAULT_LOG_FILTER, default_log_filter, default_log_filter_string, default_log_format,
};

/// How `protoplug` renders its own tracing events on standard error.
///
/// Plugin stderr is forwarded untouched in either format; only events emitted
/// by the pipeline itself are affected. Accepted spellings are `json` and
/// `compact`, in any letter case.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One flattened JSON object per event, for build systems that collect
    /// generator logs.
    Json,
    /// One terse line per event, meant for a developer's terminal.
    #[default]
    Compact,
}

/// Error returned when `--log-format` or `PROTOPLUG_LOG_FORMAT` names an
/// unknown format.
pub type LogFormatParseError = strum::ParseError;

/// Runtime configuration for a generation run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "PROTOPLUG")]
pub struct Config {
    /// Tracing filter expression, in `tracing_subscriber::EnvFilter` syntax.
    #[ortho_config(default = default_log_filter_string())]
    #[serde(default = "default_log_filter_string")]
    pub log_filter: String,
    /// Output format for diagnostics written to standard error.
    #[ortho_config(default = default_log_format())]
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
    /// Seconds the whole generation phase may run before every plugin still
    /// running is killed. Unset or zero disables the deadline.
    #[serde(default)]
    pub plugin_timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            plugin_timeout_secs: None,
        }
    }
}

impl Config {
    /// Returns the tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Returns the diagnostic output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Returns the generation deadline, if one is configured.
    #[must_use]
    pub fn plugin_timeout(&self) -> Option<Duration> {
        self.plugin_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rstest::rstest;

    use super::*;

    #[test]
    fn defaults_are_quiet_and_compact() {
        let config = Config::default();
        assert_eq!(config.log_filter(), DEFAULT_LOG_FILTER);
        assert_eq!(config.log_format(), LogFormat::Compact);
        assert_eq!(config.plugin_timeout(), None);
    }

    #[rstest]
    #[case(None, None)]
    #[case(Some(0), None)]
    #[case(Some(30), Some(Duration::from_secs(30)))]
    fn plugin_timeout_ignores_zero(#[case] secs: Option<u64>, #[case] expected: Option<Duration>) {
        let config = Config {
            plugin_timeout_secs: secs,
            ..Config::default()
        };
        assert_eq!(config.plugin_timeout(), expected);
    }

    #[rstest]
    #[case("json", LogFormat::Json)]
    #[case("JSON", LogFormat::Json)]
    #[case("compact", LogFormat::Compact)]
    fn log_format_parses_case_insensitively(#[case] text: &str, #[case] expected: LogFormat) {
        assert_eq!(text.parse::<LogFormat>().expect("known format"), expected);
    }

    #[test]
    fn unknown_log_format_is_rejected() {
        assert!("yaml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn log_format_displays_in_snake_case() {
        assert_eq!(LogFormat::Json.to_string(), "json");
    }
}
