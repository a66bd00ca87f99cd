use crate::error::LoggerError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::level_filters::LevelFilter;
use tracing_appender::rolling::Rotation;

/// How often the log file rolls over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Minutely,
    Hourly,
    #[default]
    Daily,
    Never,
}

impl From<LogRotation> for Rotation {
    fn from(rotation: LogRotation) -> Self {
        match rotation {
            LogRotation::Minutely => Self::MINUTELY,
            LogRotation::Hourly => Self::HOURLY,
            LogRotation::Daily => Self::DAILY,
            LogRotation::Never => Self::NEVER,
        }
    }
}

/// Logger configuration as it appears in a settings file.
///
/// ```toml
/// [log]
/// level = "debug"
/// filter = "stow_fileblob=trace,tower_http=info"
/// path = "/var/log/stow"
/// rotation = "hourly"
/// json = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `error`, `warn`, `info`, `debug`, `trace` or `off`.
    pub level: String,
    /// Extra directives in `RUST_LOG` syntax.
    pub filter: Option<String>,
    pub console: bool,
    /// Directory for rolling log files; no file output when unset.
    pub path: Option<PathBuf>,
    pub rotation: LogRotation,
    pub max_files: usize,
    /// Write file output as JSON lines.
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            filter: None,
            console: true,
            path: None,
            rotation: LogRotation::Daily,
            max_files: crate::DEFAULT_MAX_FILES,
            json: false,
        }
    }
}

impl LogSettings {
    /// Parses [`LogSettings::level`].
    ///
    /// # Errors
    /// [`LoggerError::InvalidConfiguration`] for unknown level names.
    pub fn level_filter(&self) -> Result<LevelFilter, LoggerError> {
        LevelFilter::from_str(self.level.trim())
            .map_err(|_| LoggerError::invalid(format!("Unknown log level '{}'", self.level)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let settings: LogSettings = serde_json::from_str(r#"{"level":"debug"}"#).unwrap();
        assert_eq!(settings.level_filter().unwrap(), LevelFilter::DEBUG);
        assert!(settings.console);
        assert_eq!(settings.rotation, LogRotation::Daily);
        assert_eq!(settings.max_files, crate::DEFAULT_MAX_FILES);
    }

    #[test]
    fn rotation_is_lowercase() {
        let settings: LogSettings = serde_json::from_str(r#"{"rotation":"hourly"}"#).unwrap();
        assert_eq!(settings.rotation, LogRotation::Hourly);
        assert_eq!(Rotation::from(settings.rotation), Rotation::HOURLY);
    }

    #[test]
    fn unknown_level_is_rejected() {
        let settings = LogSettings { level: "loud".to_owned(), ..LogSettings::default() };
        assert!(matches!(settings.level_filter(), Err(LoggerError::InvalidConfiguration { .. })));
    }
}
