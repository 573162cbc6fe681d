use std::fs;
use std::path::{Path, PathBuf};

use crate::model::config::Config;

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration in {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },
    #[error("could not read {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Path of the config file inside the data directory.
pub fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join("instalog.toml")
}

/// Resolve the data directory: `$INSTALOG_HOME`, then `$XDG_DATA_HOME/instalog`,
/// then `$HOME/.local/share/instalog`.
pub fn default_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("INSTALOG_HOME") {
        return PathBuf::from(dir);
    }
    let data_home = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_home().join(".local").join("share"));
    data_home.join("instalog")
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/"))
}

/// Read instalog.toml from the data directory.
///
/// A missing file yields defaults. A file that does not parse is backed up
/// as `instalog.toml.bak` and defaults are used. A file that parses but
/// holds inconsistent limits is an error.
pub fn read_config(data_dir: &Path) -> Result<Config, ConfigError> {
    let path = config_path(data_dir);
    if !path.exists() {
        return Ok(Config::default());
    }

    let text = fs::read_to_string(&path).map_err(|e| ConfigError::ReadError {
        path: path.clone(),
        source: e,
    })?;

    let config = match toml::from_str::<Config>(&text) {
        Ok(config) => config,
        Err(e) => {
            let bak = path.with_extension("toml.bak");
            let _ = fs::copy(&path, &bak);
            tracing::warn!(
                path = %path.display(),
                backup = %bak.display(),
                error = %e,
                "could not parse config, using defaults"
            );
            return Ok(Config::default());
        }
    };

    validate(&config).map_err(|reason| ConfigError::Invalid { path, reason })?;
    Ok(config)
}

/// Check the limits are coherent: nudges fire strictly before the hard cap.
pub fn validate(config: &Config) -> Result<(), String> {
    let limits = &config.limits;
    if limits.soft_prompt_threshold >= limits.free_log_cap {
        return Err(format!(
            "soft_prompt_threshold ({}) must be below free_log_cap ({})",
            limits.soft_prompt_threshold, limits.free_log_cap
        ));
    }
    if limits.badge_threshold >= limits.free_log_cap {
        return Err(format!(
            "badge_threshold ({}) must be below free_log_cap ({})",
            limits.badge_threshold, limits.free_log_cap
        ));
    }
    if config.storage.retention == 0 {
        return Err("retention must be at least 1".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_is_default() {
        let tmp = TempDir::new().unwrap();
        let config = read_config(tmp.path()).unwrap();
        assert_eq!(config.limits.free_log_cap, 25);
    }

    #[test]
    fn reads_overrides() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            config_path(tmp.path()),
            "[limits]\nfree_log_cap = 5\nsoft_prompt_threshold = 2\nbadge_threshold = 3\n",
        )
        .unwrap();
        let config = read_config(tmp.path()).unwrap();
        assert_eq!(config.limits.free_log_cap, 5);
        assert_eq!(config.limits.badge_threshold, 3);
    }

    #[test]
    fn corrupt_file_backed_up_and_defaulted() {
        let tmp = TempDir::new().unwrap();
        fs::write(config_path(tmp.path()), "[limits\nnope").unwrap();
        let config = read_config(tmp.path()).unwrap();
        assert_eq!(config.limits.free_log_cap, 25);
        assert!(tmp.path().join("instalog.toml.bak").exists());
    }

    #[test]
    fn threshold_at_cap_is_invalid() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            config_path(tmp.path()),
            "[limits]\nfree_log_cap = 10\nsoft_prompt_threshold = 10\nbadge_threshold = 5\n",
        )
        .unwrap();
        assert!(matches!(
            read_config(tmp.path()),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn zero_retention_is_invalid() {
        let mut config = Config::default();
        config.storage.retention = 0;
        assert!(validate(&config).is_err());
    }
}
