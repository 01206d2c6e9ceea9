//! Config file loading
//!
//! Precedence: CLI flags > config file > built-in defaults. The file is
//! optional unless given explicitly with --config.

use crate::error::CliError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Optional settings read from a TOML config file
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub work_dir: Option<PathBuf>,
    pub timeout_seconds: Option<u64>,
    pub jobs: Option<usize>,
    pub keep_build_dir: Option<bool>,

    #[serde(default)]
    pub net: NetSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetSection {
    pub retry_count: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub timeout_seconds: Option<u64>,
}

impl FileConfig {
    /// Load configuration from the given path, or from
    /// `~/.config/kiln/config.toml` when no path is given.
    pub async fn load(explicit: Option<&Path>) -> Result<Self, CliError> {
        let path = match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(CliError::Config(format!(
                        "config file {} does not exist",
                        path.display()
                    )));
                }
                Some(path.to_path_buf())
            }
            None => std::env::var_os("HOME")
                .map(|home| PathBuf::from(home).join(".config/kiln/config.toml"))
                .filter(|p| p.exists()),
        };

        let Some(path) = path else {
            return Ok(Self::default());
        };

        let text = tokio::fs::read_to_string(&path).await?;
        toml::from_str(&text)
            .map_err(|e| CliError::Config(format!("{}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let config: FileConfig = toml::from_str(
            r#"
work_dir = "/var/tmp/kiln"
timeout_seconds = 900
jobs = 4
keep_build_dir = true

[net]
retry_count = 5
retry_delay_ms = 250
timeout_seconds = 120
"#,
        )
        .unwrap();

        assert_eq!(config.work_dir.unwrap(), PathBuf::from("/var/tmp/kiln"));
        assert_eq!(config.timeout_seconds, Some(900));
        assert_eq!(config.net.retry_count, Some(5));
    }

    #[test]
    fn empty_config_is_all_defaults() {
        let config: FileConfig = toml::from_str("").unwrap();
        assert!(config.work_dir.is_none());
        assert!(config.net.retry_count.is_none());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<FileConfig>("frobnicate = 1").is_err());
    }
}
