//! core::config
//!
//! Configuration schema, loading and generation.
//!
//! # Precedence
//!
//! Configuration values are resolved in this order (later overrides earlier):
//! 1. Default values
//! 2. Config file (`--config <path>`, TOML)
//! 3. Environment variables (secrets only)
//! 4. CLI flags (applied by the CLI layer)
//!
//! Secrets are only ever read from the environment or the command line.
//!
//! # Example
//!
//! ```no_run
//! use pull_detached::core::config::Config;
//! use std::path::Path;
//!
//! let mut config = Config::load(Path::new("pull-detached.toml")).unwrap();
//! config.normalize_blanks();
//! config.validate().unwrap();
//! println!("Working repo: {}", config.working_repo_path.display());
//! ```

pub mod schema;

pub use schema::{CloneMode, Config, PrMetaConfig, Secrets, UpstreamCredentialsMode};

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Environment variable holding the personal access token.
pub const ENV_GITHUB_PAT: &str = "GITHUB_PAT";
/// Environment variable holding the fallback forge token.
pub const ENV_GITHUB_TOKEN: &str = "GITHUB_TOKEN";
/// Environment variable holding the custom upstream principal.
pub const ENV_DETACHED_CREDS_PRINCIPAL: &str = "DETACHED_CREDS_PRINCIPAL";
/// Environment variable holding the custom upstream password.
pub const ENV_DETACHED_CREDS_PW: &str = "DETACHED_CREDS_PW";

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("failed to write config file '{path}': {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config value: {0}")]
    InvalidValue(String),

    #[error("missing required setting: {0}")]
    Missing(String),
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed. Unknown keys
    /// are rejected.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::parse(&contents).map_err(|message| ConfigError::ParseError {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Parse configuration from TOML text.
    pub fn parse(contents: &str) -> Result<Config, String> {
        toml::from_str(contents).map_err(|e| e.to_string())
    }

    /// Render the non-secret part of the configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidValue(e.to_string()))
    }

    /// Write the configuration to `path` atomically.
    ///
    /// Creates parent directories if needed. Writes to a temp file in the
    /// same directory, then renames it over the target.
    pub fn write(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
                path: path.to_path_buf(),
                source: e,
            })?;
        }

        let contents = self.to_toml()?;

        let temp_path = path.with_extension("toml.tmp");
        let mut file = fs::File::create(&temp_path).map_err(|e| ConfigError::WriteError {
            path: temp_path.clone(),
            source: e,
        })?;

        file.write_all(contents.as_bytes())
            .map_err(|e| ConfigError::WriteError {
                path: temp_path.clone(),
                source: e,
            })?;

        file.sync_all().map_err(|e| ConfigError::WriteError {
            path: temp_path.clone(),
            source: e,
        })?;

        fs::rename(&temp_path, path).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_applies_defaults_for_missing_keys() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            r#"
identity_email = "bot@example.com"
upstream_repo = "https://example.org/up.git"
clone_mode = "do-nothing"

[pr_meta]
labels = ["upstream"]
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.identity_email.as_deref(), Some("bot@example.com"));
        assert_eq!(config.clone_mode, CloneMode::DoNothing);
        assert_eq!(config.pr_meta.labels, vec!["upstream"]);
        assert_eq!(
            config.working_repo_path,
            PathBuf::from(schema::DEFAULT_WORKING_REPO_PATH)
        );
    }

    #[test]
    fn load_rejects_unknown_keys() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "github_pat = \"ghp_leak\"\n").unwrap();

        assert!(matches!(
            Config::load(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn load_missing_file_is_read_error() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            Config::load(&temp.path().join("nope.toml")),
            Err(ConfigError::ReadError { .. })
        ));
    }

    #[test]
    fn write_then_load_keeps_values_but_not_secrets() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/config.toml");

        let mut config = Config {
            upstream_repo: Some("https://example.org/up.git".into()),
            hide_credits: true,
            ..Default::default()
        };
        config.secrets.github_pat = Some("ghp_secret".into());
        config.pr_meta.reviewers = vec!["octocat".into()];

        config.write(&path).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("ghp_secret"));
        assert!(!path.with_extension("toml.tmp").exists());

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.upstream_repo, config.upstream_repo);
        assert!(loaded.hide_credits);
        assert_eq!(loaded.pr_meta.reviewers, vec!["octocat"]);
        assert!(loaded.secrets.github_pat.is_none());
    }
}
