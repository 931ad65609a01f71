//! Configuration file support.
//!
//! Settings are read from an INI file, by default
//! `<config_dir>/vhdsync/config.ini`:
//!
//! ```ini
//! [download]
//! chunk_size = 10000000
//! timeout_secs = 300
//! cacert = /etc/ssl/certs/ca.pem
//! capath = /etc/ssl/certs
//!
//! [synchash]
//! block_size = 2097152
//! hash = sha1
//! ```
//!
//! Every key is optional. Command-line flags take precedence over the file.

use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::{Ini, Properties};
use thiserror::Error;
use tracing::debug;

use crate::checksum::HashAlgorithm;
use crate::download::{DEFAULT_CHUNK_SIZE, DEFAULT_TIMEOUT_SECS};
use crate::error::ErrorKind;
use crate::synchash::DEFAULT_BLOCK_SIZE;

/// Name of the directory under the platform config dir.
pub const CONFIG_DIR_NAME: &str = "vhdsync";

/// Name of the configuration file.
pub const CONFIG_FILE_NAME: &str = "config.ini";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An explicitly requested file does not exist.
    #[error("config file {} not found", .0.display())]
    NotFound(PathBuf),

    /// The file could not be read.
    #[error("failed to read config file {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },

    /// The file is not valid INI.
    #[error("failed to parse config file {}: {reason}", .path.display())]
    Parse { path: PathBuf, reason: String },

    /// A key has a value of the wrong form.
    #[error("invalid value '{value}' for [{section}] {key}: {reason}")]
    InvalidValue {
        section: &'static str,
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    /// Configuration errors are always [`ErrorKind::Config`].
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Config
    }
}

/// `[download]` settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSettings {
    pub chunk_size: u64,
    pub timeout_secs: u64,
    pub cacert: Option<PathBuf>,
    pub capath: Option<PathBuf>,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            cacert: None,
            capath: None,
        }
    }
}

impl DownloadSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// `[synchash]` settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynchashSettings {
    pub block_size: u32,
    pub hash: HashAlgorithm,
}

impl Default for SynchashSettings {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            hash: HashAlgorithm::default(),
        }
    }
}

/// Parsed configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFile {
    pub download: DownloadSettings,
    pub synchash: SynchashSettings,
}

impl ConfigFile {
    /// Default location of the configuration file, if the platform has a
    /// config directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load configuration.
    ///
    /// With an explicit `path` the file must exist. Without one, the default
    /// location is tried and a missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::load_from(&path),
                _ => {
                    debug!("No config file found, using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    /// Load configuration from `path`, which must exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path).map_err(|e| match e {
            ini::Error::Io(source) if source.kind() == io::ErrorKind::NotFound => {
                ConfigError::NotFound(path.to_path_buf())
            }
            ini::Error::Io(source) => ConfigError::Read {
                path: path.to_path_buf(),
                source,
            },
            ini::Error::Parse(e) => ConfigError::Parse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            },
        })?;

        debug!(path = %path.display(), "Loaded config file");
        Self::from_ini(&ini)
    }

    /// Parse configuration from INI text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Parse {
            path: PathBuf::from("<string>"),
            reason: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(section) = ini.section(Some("download")) {
            let d = &mut config.download;
            if let Some(v) = parse_key(section, "download", "chunk_size")? {
                d.chunk_size = nonzero("download", "chunk_size", v)?;
            }
            if let Some(v) = parse_key(section, "download", "timeout_secs")? {
                d.timeout_secs = nonzero("download", "timeout_secs", v)?;
            }
            if let Some(v) = path_key(section, "cacert") {
                d.cacert = Some(v);
            }
            if let Some(v) = path_key(section, "capath") {
                d.capath = Some(v);
            }
        }

        if let Some(section) = ini.section(Some("synchash")) {
            let s = &mut config.synchash;
            if let Some(v) = parse_key(section, "synchash", "block_size")? {
                s.block_size = nonzero("synchash", "block_size", v)?;
            }
            if let Some(v) = parse_key::<HashAlgorithm>(section, "synchash", "hash")? {
                s.hash = v;
            }
        }

        Ok(config)
    }
}

fn parse_key<T>(
    section: &Properties,
    section_name: &'static str,
    key: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = section.get(key).map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    raw.parse::<T>()
        .map(Some)
        .map_err(|e| ConfigError::InvalidValue {
            section: section_name,
            key,
            value: raw.to_string(),
            reason: e.to_string(),
        })
}

fn nonzero<T: Default + PartialEq + ToString>(
    section: &'static str,
    key: &'static str,
    value: T,
) -> Result<T, ConfigError> {
    if value == T::default() {
        return Err(ConfigError::InvalidValue {
            section,
            key,
            value: value.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}

fn path_key(section: &Properties, key: &str) -> Option<PathBuf> {
    section
        .get(key)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}
