use std::fs;
use std::path::{Path, PathBuf};

use crate::model::config::StoreConfig;

/// Name of the directory that holds a notebox store
pub const DATA_DIR_NAME: &str = ".notebox";

const CONFIG_FILE: &str = "config.toml";

const CONFIG_TEMPLATE: &str = r##"[storage]
# How long (ms) a write waits for another nb process to finish
lock_timeout_ms = {lock_timeout_ms}

[notes]
# Bundled image id attached to notes created without an image
{default_image}
"##;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("not a notebox store: no .notebox/ directory found")]
    NotAStore,
    #[error("{0} already exists (use --force to reinitialize)")]
    AlreadyExists(PathBuf),
    #[error("could not read {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Walk up from `start` looking for a `.notebox/` directory with a config file.
/// Returns the path of the `.notebox/` directory itself.
pub fn discover_data_dir(start: &Path) -> Result<PathBuf, ConfigError> {
    let mut current = start.to_path_buf();
    loop {
        let data_dir = current.join(DATA_DIR_NAME);
        if data_dir.is_dir() && data_dir.join(CONFIG_FILE).exists() {
            return Ok(data_dir);
        }
        if !current.pop() {
            return Err(ConfigError::NotAStore);
        }
    }
}

/// Read `config.toml`. A missing file yields the defaults.
pub fn read_config(data_dir: &Path) -> Result<StoreConfig, ConfigError> {
    let path = data_dir.join(CONFIG_FILE);
    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(StoreConfig::default()),
        Err(e) => return Err(ConfigError::ReadError { path, source: e }),
    };
    toml::from_str(&text).map_err(|e| ConfigError::ParseError { path, source: e })
}

/// Render a commented `config.toml` holding `config`'s values.
pub fn render_config(config: &StoreConfig) -> String {
    let default_image = match config.notes.default_image {
        Some(id) => format!("default_image = {}", id),
        None => "# default_image = 3".to_string(),
    };
    CONFIG_TEMPLATE
        .replace(
            "{lock_timeout_ms}",
            &config.storage.lock_timeout_ms.to_string(),
        )
        .replace("{default_image}", &default_image)
}

/// Create `<root>/.notebox/` with a commented config file.
pub fn init_data_dir(
    root: &Path,
    config: &StoreConfig,
    force: bool,
) -> Result<PathBuf, ConfigError> {
    let data_dir = root.join(DATA_DIR_NAME);
    init_at(&data_dir, config, force)?;
    Ok(data_dir)
}

/// Like `init_data_dir`, but `data_dir` is the store directory itself.
pub fn init_at(data_dir: &Path, config: &StoreConfig, force: bool) -> Result<(), ConfigError> {
    let config_path = data_dir.join(CONFIG_FILE);
    if config_path.exists() && !force {
        return Err(ConfigError::AlreadyExists(data_dir.to_path_buf()));
    }
    fs::create_dir_all(data_dir)?;
    fs::write(&config_path, render_config(config))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_and_discover() {
        let tmp = TempDir::new().unwrap();
        let data_dir = init_data_dir(tmp.path(), &StoreConfig::default(), false).unwrap();
        assert_eq!(data_dir, tmp.path().join(".notebox"));

        let sub = tmp.path().join("a/b");
        fs::create_dir_all(&sub).unwrap();
        assert_eq!(discover_data_dir(&sub).unwrap(), data_dir);
    }

    #[test]
    fn test_discover_not_found() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            discover_data_dir(tmp.path()),
            Err(ConfigError::NotAStore)
        ));
    }

    #[test]
    fn test_init_twice_requires_force() {
        let tmp = TempDir::new().unwrap();
        init_data_dir(tmp.path(), &StoreConfig::default(), false).unwrap();
        assert!(matches!(
            init_data_dir(tmp.path(), &StoreConfig::default(), false),
            Err(ConfigError::AlreadyExists(_))
        ));
        assert!(init_data_dir(tmp.path(), &StoreConfig::default(), true).is_ok());
    }

    #[test]
    fn test_template_parses_to_defaults() {
        let tmp = TempDir::new().unwrap();
        let data_dir = init_data_dir(tmp.path(), &StoreConfig::default(), false).unwrap();
        let config = read_config(&data_dir).unwrap();
        assert_eq!(config.storage.lock_timeout_ms, 5000);
        assert_eq!(config.notes.default_image, None);
    }

    #[test]
    fn test_rendered_values_round_trip() {
        let tmp = TempDir::new().unwrap();
        let mut config = StoreConfig::default();
        config.storage.lock_timeout_ms = 250;
        config.notes.default_image = Some(7);
        init_at(tmp.path(), &config, false).unwrap();

        let read = read_config(tmp.path()).unwrap();
        assert_eq!(read.storage.lock_timeout_ms, 250);
        assert_eq!(read.notes.default_image, Some(7));
    }

    #[test]
    fn test_malformed_config() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("config.toml"), "[storage\nlock_timeout_ms = ").unwrap();
        assert!(matches!(
            read_config(tmp.path()),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn test_missing_config_is_default() {
        let tmp = TempDir::new().unwrap();
        let config = read_config(tmp.path()).unwrap();
        assert_eq!(config.storage.lock_timeout_ms, 5000);
    }
}
