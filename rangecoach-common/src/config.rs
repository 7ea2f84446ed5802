//! Configuration loading and data directory resolution

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Database file name inside the resolved data directory
const DATABASE_FILE: &str = "rangecoach.db";

/// Resolve the service data directory.
///
/// Priority order:
/// 1. Environment variable (e.g. `RANGECOACH_DATA_DIR`)
/// 2. `data_dir` from the loaded TOML config
/// 3. OS-dependent default (`<local data dir>/rangecoach/<service>`)
pub fn resolve_data_dir(
    env_var_name: &str,
    config_value: Option<&Path>,
    service_name: &str,
) -> PathBuf {
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = config_value {
        return path.to_path_buf();
    }

    default_data_dir(service_name)
}

/// OS-dependent default data directory
fn default_data_dir(service_name: &str) -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rangecoach")
        .join(service_name)
}

/// Default configuration file path for a service
/// (`<config dir>/rangecoach/<service>.toml`)
pub fn default_config_path(service_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("rangecoach").join(format!("{}.toml", service_name)))
}

/// Load a TOML configuration file, falling back to defaults when the file
/// does not exist. A file that exists but fails to parse is an error, not a
/// silent fallback.
pub fn load_toml_config<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        tracing::debug!(path = %path.display(), "Config file not found, using defaults");
        return Ok(T::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;

    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Ensures the data directory exists before the database and object store
/// are opened inside it.
pub struct DataDirInitializer {
    data_dir: PathBuf,
}

impl DataDirInitializer {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    /// Create the data directory (and parents) if missing
    pub fn ensure_directory_exists(&self) -> Result<&Path> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir).map_err(|e| {
                Error::Config(format!(
                    "Failed to create data directory {}: {}",
                    self.data_dir.display(),
                    e
                ))
            })?;
            tracing::info!(path = %self.data_dir.display(), "Created data directory");
        }
        Ok(&self.data_dir)
    }

    /// Path of the SQLite database inside the data directory
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serial_test::serial;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct TestConfig {
        name: Option<String>,
        count: Option<u32>,
    }

    #[test]
    #[serial]
    fn env_var_takes_priority_over_config_value() {
        std::env::set_var("RANGECOACH_TEST_DATA_DIR", "/tmp/from-env");
        let resolved = resolve_data_dir(
            "RANGECOACH_TEST_DATA_DIR",
            Some(Path::new("/tmp/from-config")),
            "test",
        );
        std::env::remove_var("RANGECOACH_TEST_DATA_DIR");
        assert_eq!(resolved, PathBuf::from("/tmp/from-env"));
    }

    #[test]
    #[serial]
    fn config_value_used_when_env_unset() {
        std::env::remove_var("RANGECOACH_TEST_DATA_DIR");
        let resolved = resolve_data_dir(
            "RANGECOACH_TEST_DATA_DIR",
            Some(Path::new("/tmp/from-config")),
            "test",
        );
        assert_eq!(resolved, PathBuf::from("/tmp/from-config"));
    }

    #[test]
    fn missing_config_file_yields_defaults() {
        let config: TestConfig =
            load_toml_config(Path::new("/nonexistent/rangecoach-test.toml")).unwrap();
        assert_eq!(config, TestConfig::default());
    }

    #[test]
    fn malformed_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "name = [unclosed").unwrap();
        let result: Result<TestConfig> = load_toml_config(&path);
        assert!(result.is_err());
    }

    #[test]
    fn initializer_creates_directory_and_db_path() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("nested").join("data");
        let init = DataDirInitializer::new(data_dir.clone());
        init.ensure_directory_exists().unwrap();
        assert!(data_dir.is_dir());
        assert_eq!(init.database_path(), data_dir.join("rangecoach.db"));
    }
}
