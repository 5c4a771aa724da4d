//! Configuration file loading and root folder resolution

use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "onair.db";

/// Root folder resolution, highest priority first:
/// 1. Command-line argument
/// 2. Environment variable
/// 3. TOML config file (`root_folder` key)
/// 4. OS-dependent compiled default
pub fn resolve_root_folder(
    cli_arg: Option<&str>,
    env_var_name: &str,
    config_file_key: Option<&str>,
) -> Result<PathBuf> {
    if let Some(path) = cli_arg {
        return Ok(PathBuf::from(path));
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }

    if let Some(key) = config_file_key {
        if let Some(root_folder) = config_file_value(key) {
            return Ok(PathBuf::from(root_folder));
        }
    }

    Ok(get_default_root_folder())
}

/// Look up a string value in the first config file found
///
/// Missing or unparsable files are treated as "no value".
pub fn config_file_value(key: &str) -> Option<String> {
    let path = find_config_file().ok()?;
    let content = std::fs::read_to_string(&path).ok()?;
    value_from_toml(&content, key)
}

/// Extract a top-level string value from TOML content
pub fn value_from_toml(content: &str, key: &str) -> Option<String> {
    let config = toml::from_str::<toml::Value>(content).ok()?;
    config.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

/// Path of the database file for a root folder
pub fn database_path(root_folder: &Path) -> PathBuf {
    root_folder.join(DATABASE_FILE_NAME)
}

/// Create the root folder if it does not exist yet
pub fn ensure_root_folder(root_folder: &Path) -> Result<()> {
    if !root_folder.exists() {
        std::fs::create_dir_all(root_folder)?;
    }
    if !root_folder.is_dir() {
        return Err(Error::Config(format!(
            "Root folder is not a directory: {}",
            root_folder.display()
        )));
    }
    Ok(())
}

/// Get the configuration file path for the platform
fn find_config_file() -> Result<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("onair").join("config.toml"));

    if cfg!(target_os = "linux") {
        // ~/.config/onair/config.toml first, then /etc/onair/config.toml
        if let Some(path) = user_config {
            if path.exists() {
                return Ok(path);
            }
        }
        let system_config = PathBuf::from("/etc/onair/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }
        return Err(Error::Config("No config file found".to_string()));
    }

    let path = user_config
        .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;
    if path.exists() {
        Ok(path)
    } else {
        Err(Error::Config(format!("Config file not found: {:?}", path)))
    }
}

/// Get OS-dependent default root folder path
fn get_default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/onair (or /var/lib/onair for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("onair"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/onair"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("onair"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/onair"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("onair"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\onair"))
    } else {
        PathBuf::from("./onair_data")
    }
}
