use crate::error::ConfigError;
use chrono::{DateTime, Utc};
use directories::UserDirs;
use std::path::PathBuf;

pub fn formatted_pub_date(date: DateTime<Utc>) -> String {
    format!("{}", date.format("%a, %d %b %Y %H:%M:%S UTC"))
}

pub fn get_config_dir() -> Result<PathBuf, ConfigError> {
    let user_dirs = UserDirs::new().ok_or(ConfigError::NoHomeDir)?;

    Ok(user_dirs.home_dir().join(".config").join("gator"))
}
