use config::{Config, Environment, File};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use stow_logger::LogSettings;
use tracing::info;

/// Prefix of environment overrides, e.g. `STOW__STORAGE__ROOT=/srv/blobs`.
pub const ENV_PREFIX: &str = "STOW";

#[stow_derive::stow_error]
pub enum ConfigError {
    #[error("Config error{}: {source}", format_context(.context))]
    Config { source: config::ConfigError, context: Option<Cow<'static, str>> },
}

/// Loads `T` from an optional settings file overlaid with `STOW__` variables.
///
/// Nested fields use a double underscore: `STOW__SIGNING__SECRET` sets
/// `signing.secret`. Without a file every field comes from its default or
/// from the environment.
///
/// # Errors
/// A named file that cannot be read, or values that do not fit `T`.
pub fn load_config<T>(path: Option<impl AsRef<Path>>) -> Result<T, ConfigError>
where
    T: DeserializeOwned,
{
    let mut builder = Config::builder();
    if let Some(path) = path {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading config file");
        builder = builder.add_source(File::from(path).required(true));
    }

    builder
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .convert_case(config::Case::Snake),
        )
        .build()
        .context("Failed to build config")?
        .try_deserialize::<T>()
        .context("Failed to deserialize config")
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub address: IpAddr,
    pub port: u16,
    pub storage: StorageConfig,
    pub signing: SigningConfig,
    pub log: LogSettings,
}

/// The bucket served by the gateway.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub root: PathBuf,
    pub min_part_size: u64,
    pub default_page_size: usize,
}

/// Signed URL issuing and verification.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Public URL of the `/blob` endpoint that signed URLs point at.
    pub base_url: String,
    pub secret: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 4583,
            storage: StorageConfig::default(),
            signing: SigningConfig::default(),
            log: LogSettings::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data"),
            min_part_size: stow_fileblob::DEFAULT_MIN_PART_SIZE,
            default_page_size: stow_fileblob::DEFAULT_PAGE_SIZE,
        }
    }
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self { base_url: "http://127.0.0.1:4583/blob".to_owned(), secret: String::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn file_values_override_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "port = 9000\n[storage]\nroot = \"/srv/blobs\"\n[signing]\nsecret = \"k\"\n[log]\nlevel = \"debug\""
        )
        .unwrap();

        let cfg: ServerConfig = load_config(Some(file.path())).unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.storage.root, PathBuf::from("/srv/blobs"));
        assert_eq!(cfg.storage.min_part_size, stow_fileblob::DEFAULT_MIN_PART_SIZE);
        assert_eq!(cfg.signing.secret, "k");
        assert_eq!(cfg.log.level, "debug");
    }

    #[test]
    fn missing_file_is_an_error() {
        let result = load_config::<ServerConfig>(Some("/definitely/not/here.toml"));
        assert!(matches!(result, Err(ConfigError::Config { .. })));
    }
}
