//! Configuration loading and data directory resolution

use crate::{Error, Result};
use std::path::PathBuf;

/// Default HTTP port for the supervisor service
pub const DEFAULT_PORT: u16 = 5840;

/// Resolved service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Directory holding the SQLite database
    pub data_dir: PathBuf,
    /// Port the HTTP API binds to
    pub port: u16,
}

impl ServiceConfig {
    /// Path of the supervisor database inside the data directory
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("rdms.db")
    }
}

/// Resolve the data directory, in priority order:
/// 1. Command-line argument
/// 2. `RDMS_DATA_DIR` environment variable
/// 3. `data_dir` key in the TOML config file
/// 4. OS-dependent compiled default
pub fn resolve_data_dir(cli_arg: Option<&str>) -> PathBuf {
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    if let Ok(path) = std::env::var("RDMS_DATA_DIR") {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Ok(config_path) = find_config_file() {
        if let Ok(toml_content) = std::fs::read_to_string(&config_path) {
            if let Ok(config) = toml::from_str::<toml::Value>(&toml_content) {
                if let Some(data_dir) = config.get("data_dir").and_then(|v| v.as_str()) {
                    return PathBuf::from(data_dir);
                }
            }
        }
    }

    default_data_dir()
}

/// Resolve the service port: CLI argument, `RDMS_PORT`, then the default.
pub fn resolve_port(cli_arg: Option<u16>) -> u16 {
    if let Some(port) = cli_arg {
        return port;
    }

    if let Ok(value) = std::env::var("RDMS_PORT") {
        if let Ok(port) = value.parse::<u16>() {
            return port;
        }
    }

    DEFAULT_PORT
}

/// Locate the TOML config file for the platform
fn find_config_file() -> Result<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("rdms").join("config.toml"));

    if let Some(path) = user_config {
        if path.exists() {
            return Ok(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/rdms/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }
    }

    Err(Error::Config("No config file found".to_string()))
}

/// OS-dependent default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("rdms"))
        .unwrap_or_else(|| PathBuf::from("./rdms_data"))
}

/// Ensure the data directory exists before opening the database
pub fn ensure_data_dir(data_dir: &PathBuf) -> Result<()> {
    std::fs::create_dir_all(data_dir)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_argument_wins() {
        let dir = resolve_data_dir(Some("/tmp/rdms-test"));
        assert_eq!(dir, PathBuf::from("/tmp/rdms-test"));
    }

    #[test]
    fn port_default_applies() {
        std::env::remove_var("RDMS_PORT");
        assert_eq!(resolve_port(None), DEFAULT_PORT);
        assert_eq!(resolve_port(Some(9000)), 9000);
    }
}
