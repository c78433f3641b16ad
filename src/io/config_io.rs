use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::model::ClientConfig;

/// Overrides `[api] base_url` when set and non-empty
pub const API_URL_ENV: &str = "TASKBOARD_API_URL";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("could not parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("could not serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// `$XDG_CONFIG_HOME/taskboard`, falling back to `~/.config/taskboard`.
/// Holds the config file, the session, and the recovery journal.
pub fn config_dir() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .ok()
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| home_dir().join(".config"));
    base.join("taskboard")
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/"))
}

pub fn config_path(dir: &Path) -> PathBuf {
    dir.join("config.toml")
}

/// Read a config file. A missing file yields the defaults; a malformed one
/// is an error rather than a silent reset.
pub fn read_config_from(path: &Path) -> Result<ClientConfig, ConfigError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(ClientConfig::default()),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn write_config_to(path: &Path, config: &ClientConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    super::atomic_write(path, content.as_bytes())?;
    Ok(())
}

/// Apply environment overrides. `api_url` is the value of [`API_URL_ENV`].
pub fn apply_env(config: &mut ClientConfig, api_url: Option<String>) {
    if let Some(url) = api_url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty()) {
        config.api.base_url = url;
    }
}

/// Config from `dir`, with environment overrides applied.
pub fn load_config(dir: &Path) -> Result<ClientConfig, ConfigError> {
    let mut config = read_config_from(&config_path(dir))?;
    apply_env(&mut config, std::env::var(API_URL_ENV).ok());
    Ok(config)
}
