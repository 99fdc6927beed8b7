use crate::error::ConfigError;
use crate::utils;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_ENV: &str = "GATOR_CONFIG";
const CONFIG_FILE: &str = "config.toml";
const DB_FILE: &str = "gator.db";

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_user_name: Option<String>,
}

impl Config {
    /// Config file location, `$GATOR_CONFIG` or `~/.config/gator/config.toml`.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        match env::var_os(CONFIG_ENV) {
            Some(path) => Ok(PathBuf::from(path)),
            None => Ok(utils::get_config_dir()?.join(CONFIG_FILE)),
        }
    }

    /// Reads the config at `path`. A missing file yields the defaults.
    pub fn from(path: &Path) -> Result<Config, ConfigError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Config::default())
            }
            Err(source) => return Err(io_error(path, source)),
        };
        let config: Config = toml::from_str(&contents)?;

        Ok(config)
    }

    pub fn write(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|source| io_error(dir, source))?;
        }
        let contents = toml::to_string(self)?;
        fs::write(path, contents).map_err(|source| io_error(path, source))
    }

    pub fn set_user(&mut self, path: &Path, name: &str) -> Result<(), ConfigError> {
        self.current_user_name = Some(name.to_string());
        self.write(path)
    }

    /// Database file; defaults to `gator.db` next to the config file.
    pub fn db_path(&self, config_path: &Path) -> PathBuf {
        match &self.db_path {
            Some(path) => PathBuf::from(path),
            None => config_path
                .parent()
                .map(|dir| dir.join(DB_FILE))
                .unwrap_or_else(|| PathBuf::from(DB_FILE)),
        }
    }
}

fn io_error(path: &Path, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.display().to_string(),
        source,
    }
}
