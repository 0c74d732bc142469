//! core::config::schema
//!
//! Configuration schema types.
//!
//! # Example
//!
//! ```toml
//! identity_email = "bot@example.com"
//! working_repo_path = "workdir/gitrepo"
//! clone_mode = "clone-if-not-found"
//! origin_repo = "https://github.com/me/fork.git"
//! upstream_repo = "https://git.example.org/project.git"
//! upstream_cred_mode = "auto"
//!
//! [pr_meta]
//! labels = ["upstream"]
//! reviewers = ["octocat"]
//! ```
//!
//! # Secrets
//!
//! Tokens and passwords live in [`Secrets`], which is skipped by serde so it
//! never round-trips through a config file or a rendered status report.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::core::types::Identity;

/// Default location of the working repository.
pub const DEFAULT_WORKING_REPO_PATH: &str = "workdir/gitrepo";

/// Default web root of the home forge.
pub const DEFAULT_FORGE_WEB_URL: &str = "https://github.com/";

/// Default REST API root of the home forge.
pub const DEFAULT_FORGE_API_URL: &str = "https://api.github.com";

/// What to do about the working repository before a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CloneMode {
    /// Use the existing repository; fail if there is none.
    DoNothing,
    /// Clone only when no repository is found.
    #[default]
    CloneIfNotFound,
    /// Delete any existing directory and clone fresh.
    CloneAlways,
}

impl CloneMode {
    const VARIANTS: &'static [&'static str] =
        &["do-nothing", "clone-if-not-found", "clone-always"];

    fn as_str(self) -> &'static str {
        match self {
            CloneMode::DoNothing => "do-nothing",
            CloneMode::CloneIfNotFound => "clone-if-not-found",
            CloneMode::CloneAlways => "clone-always",
        }
    }
}

impl fmt::Display for CloneMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CloneMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "do-nothing" | "donothing" => Ok(CloneMode::DoNothing),
            "clone-if-not-found" | "cloneifnotfound" => Ok(CloneMode::CloneIfNotFound),
            "clone-always" | "clonealways" => Ok(CloneMode::CloneAlways),
            other => Err(format!(
                "invalid clone mode '{}', must be one of: {}",
                other,
                Self::VARIANTS.join(", ")
            )),
        }
    }
}

/// How the upstream remote authenticates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpstreamCredentialsMode {
    /// Decide from the upstream URL and the configured principal.
    #[default]
    Auto,
    /// Anonymous.
    None,
    /// Reuse the forge token.
    Github,
    /// Use the detached principal and password.
    Custom,
}

impl UpstreamCredentialsMode {
    const VARIANTS: &'static [&'static str] = &["auto", "none", "github", "custom"];

    fn as_str(self) -> &'static str {
        match self {
            UpstreamCredentialsMode::Auto => "auto",
            UpstreamCredentialsMode::None => "none",
            UpstreamCredentialsMode::Github => "github",
            UpstreamCredentialsMode::Custom => "custom",
        }
    }
}

impl fmt::Display for UpstreamCredentialsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpstreamCredentialsMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(UpstreamCredentialsMode::Auto),
            "none" => Ok(UpstreamCredentialsMode::None),
            "github" => Ok(UpstreamCredentialsMode::Github),
            "custom" => Ok(UpstreamCredentialsMode::Custom),
            other => Err(format!(
                "invalid credential mode '{}', must be one of: {}",
                other,
                Self::VARIANTS.join(", ")
            )),
        }
    }
}

/// Metadata applied to a newly created pull request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PrMetaConfig {
    /// Users to assign
    pub assignees: Vec<String>,
    /// Users to request reviews from
    pub reviewers: Vec<String>,
    /// Labels to add
    pub labels: Vec<String>,
}

impl PrMetaConfig {
    /// Check if there is nothing to apply.
    pub fn is_empty(&self) -> bool {
        self.assignees.is_empty() && self.reviewers.is_empty() && self.labels.is_empty()
    }
}

/// Credentials that never appear in files or reports.
#[derive(Clone, Default, PartialEq)]
pub struct Secrets {
    /// Personal access token for git and the forge API
    pub github_pat: Option<String>,
    /// Fallback token for the forge API
    pub github_token: Option<String>,
    /// Principal for custom upstream credentials
    pub detached_creds_principal: Option<String>,
    /// Password for custom upstream credentials
    pub detached_creds_password: Option<String>,
}

// Custom Debug to avoid exposing tokens
impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets")
            .field("has_github_pat", &self.github_pat.is_some())
            .field("has_github_token", &self.github_token.is_some())
            .field("detached_creds_principal", &self.detached_creds_principal)
            .field(
                "has_detached_creds_password",
                &self.detached_creds_password.is_some(),
            )
            .finish()
    }
}

/// Run configuration.
///
/// Plain values come first and `[pr_meta]` last so the struct serializes
/// to TOML without reordering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Committer email for rebased commits
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_email: Option<String>,

    /// Committer name for rebased commits
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_username: Option<String>,

    /// Working repository location
    pub working_repo_path: PathBuf,

    /// Clone behaviour
    pub clone_mode: CloneMode,

    /// Home repository clone URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_repo: Option<String>,

    /// Branch the PR targets (forge default branch when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_branch: Option<String>,

    /// Detached upstream repository URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_repo: Option<String>,

    /// Upstream branch (auto-detected when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_branch: Option<String>,

    /// Integration branch override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_branch: Option<String>,

    /// Home branch the integration branch is created from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_branch_base: Option<String>,

    /// Upstream credential strategy
    pub upstream_cred_mode: UpstreamCredentialsMode,

    /// Web root of the home forge, used to recognize forge-hosted upstreams
    pub forge_web_url: String,

    /// REST API root of the home forge
    pub forge_api_url: String,

    /// Leave the status block out of the PR body
    pub hide_pr_status: bool,

    /// Leave the credits line out of the PR body
    pub hide_credits: bool,

    /// Tokens and passwords
    #[serde(skip)]
    pub secrets: Secrets,

    /// PR metadata
    pub pr_meta: PrMetaConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            identity_email: None,
            identity_username: None,
            working_repo_path: PathBuf::from(DEFAULT_WORKING_REPO_PATH),
            clone_mode: CloneMode::default(),
            origin_repo: None,
            origin_branch: None,
            upstream_repo: None,
            upstream_branch: None,
            update_branch: None,
            update_branch_base: None,
            upstream_cred_mode: UpstreamCredentialsMode::default(),
            forge_web_url: DEFAULT_FORGE_WEB_URL.to_string(),
            forge_api_url: DEFAULT_FORGE_API_URL.to_string(),
            hide_pr_status: false,
            hide_credits: false,
            secrets: Secrets::default(),
            pr_meta: PrMetaConfig::default(),
        }
    }
}

impl Config {
    /// Turn blank optional strings into `None` and trim list entries.
    ///
    /// Values coming from CI variables are often present but empty.
    pub fn normalize_blanks(&mut self) {
        for value in [
            &mut self.identity_email,
            &mut self.identity_username,
            &mut self.origin_repo,
            &mut self.origin_branch,
            &mut self.upstream_repo,
            &mut self.upstream_branch,
            &mut self.update_branch,
            &mut self.update_branch_base,
            &mut self.secrets.github_pat,
            &mut self.secrets.github_token,
            &mut self.secrets.detached_creds_principal,
        ] {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                *value = None;
            }
        }

        for list in [
            &mut self.pr_meta.assignees,
            &mut self.pr_meta.reviewers,
            &mut self.pr_meta.labels,
        ] {
            *list = list
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
    }

    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// - `ConfigError::Missing` for an absent forge token, identity email or
    ///   upstream URL
    /// - `ConfigError::InvalidValue` for an empty working repository path
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.forge_token().is_none() {
            return Err(ConfigError::Missing(
                "GITHUB_PAT (or GITHUB_TOKEN) is required".into(),
            ));
        }
        if self.identity_email.is_none() {
            return Err(ConfigError::Missing("identity_email is required".into()));
        }
        if self.upstream_repo.is_none() {
            return Err(ConfigError::Missing("upstream_repo is required".into()));
        }
        if self.working_repo_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue(
                "working_repo_path cannot be empty".into(),
            ));
        }
        if self.upstream_cred_mode == UpstreamCredentialsMode::Custom
            && self.secrets.detached_creds_principal.is_none()
        {
            return Err(ConfigError::Missing(
                "DETACHED_CREDS_PRINCIPAL is required for custom upstream credentials".into(),
            ));
        }
        Ok(())
    }

    /// Token used for the home remote and the forge API.
    ///
    /// The personal access token wins over the fallback token.
    pub fn forge_token(&self) -> Option<&str> {
        self.secrets
            .github_pat
            .as_deref()
            .or(self.secrets.github_token.as_deref())
    }

    /// Committer identity, defaulting the name to the tool name and version.
    pub fn identity(&self) -> Result<Identity, ConfigError> {
        let name = self
            .identity_username
            .clone()
            .unwrap_or_else(default_identity_name);
        let email = self.identity_email.clone().unwrap_or_default();
        Identity::new(name, email).map_err(|e| ConfigError::InvalidValue(e.to_string()))
    }

    /// The upstream URL, or an error if it was never configured.
    pub fn upstream_url(&self) -> Result<&str, ConfigError> {
        self.upstream_repo
            .as_deref()
            .ok_or_else(|| ConfigError::Missing("upstream_repo is required".into()))
    }
}

/// Default committer name: `"<tool> <version>"`.
pub fn default_identity_name() -> String {
    format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}
