//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! Every configuration value can be given on the command line; the
//! values override the config file. Secrets additionally fall back to
//! their environment variables.

use clap::Parser;
use std::path::PathBuf;

use crate::core::config::{
    CloneMode, Config, UpstreamCredentialsMode, ENV_DETACHED_CREDS_PRINCIPAL,
    ENV_DETACHED_CREDS_PW, ENV_GITHUB_PAT, ENV_GITHUB_TOKEN,
};

/// Flag that asks for one layer of surrounding quotes to be removed from
/// every argument before parsing.
pub const EXPECT_ESCAPED_INPUT_FLAG: &str = "--expect-escaped-input";

/// Keep a branch in sync with a detached upstream repository and maintain a PR for it
#[derive(Parser, Debug, Default)]
#[command(name = "pull-detached")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Write the effective configuration to PATH and exit
    #[arg(long, value_name = "PATH")]
    pub genconf: Option<PathBuf>,

    /// Write the status report as JSON to PATH
    #[arg(long, value_name = "PATH")]
    pub status_file: Option<PathBuf>,

    /// Personal access token for the home forge (prefer the environment)
    #[arg(long, env = ENV_GITHUB_PAT, hide_env_values = true)]
    pub github_pat: Option<String>,

    /// Fallback forge token, e.g. the CI-provided one (prefer the environment)
    #[arg(long, env = ENV_GITHUB_TOKEN, hide_env_values = true)]
    pub github_token: Option<String>,

    /// Principal for custom upstream credentials (prefer the environment)
    #[arg(long, env = ENV_DETACHED_CREDS_PRINCIPAL, hide_env_values = true)]
    pub detached_creds_principal: Option<String>,

    /// Password for custom upstream credentials (prefer the environment)
    #[arg(long = "detached-creds-pw", env = ENV_DETACHED_CREDS_PW, hide_env_values = true)]
    pub detached_creds_password: Option<String>,

    /// Committer email for rebased commits
    #[arg(long)]
    pub identity_email: Option<String>,

    /// Committer name for rebased commits
    #[arg(long = "identity-user")]
    pub identity_username: Option<String>,

    /// Comma-separated PR assignees
    #[arg(long, value_delimiter = ',')]
    pub pr_assignees: Vec<String>,

    /// Comma-separated PR reviewers
    #[arg(long, value_delimiter = ',')]
    pub pr_reviewers: Vec<String>,

    /// Comma-separated PR labels
    #[arg(long, value_delimiter = ',')]
    pub pr_labels: Vec<String>,

    /// Working repository location
    #[arg(short, long, value_name = "PATH")]
    pub working_repo_path: Option<PathBuf>,

    /// do-nothing, clone-if-not-found or clone-always
    #[arg(long)]
    pub clone_mode: Option<CloneMode>,

    /// Home repository clone URL
    #[arg(long)]
    pub origin_repo: Option<String>,

    /// Branch the PR targets
    #[arg(long)]
    pub origin_branch: Option<String>,

    /// Detached upstream repository URL
    #[arg(long)]
    pub upstream_repo: Option<String>,

    /// Upstream branch (auto-detected when unset)
    #[arg(long)]
    pub upstream_branch: Option<String>,

    /// Integration branch name
    #[arg(long)]
    pub update_branch: Option<String>,

    /// Home branch a new integration branch starts from
    #[arg(long)]
    pub update_branch_base: Option<String>,

    /// auto, none, github or custom
    #[arg(long)]
    pub upstream_cred_mode: Option<UpstreamCredentialsMode>,

    /// Leave the status block out of the PR body
    #[arg(long)]
    pub hide_pr_status: bool,

    /// Leave the credits line out of the PR body
    #[arg(long)]
    pub hide_credits: bool,

    /// Strip one layer of surrounding double quotes from every argument
    #[arg(long)]
    pub expect_escaped_input: bool,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Only log errors
    #[arg(short, long)]
    pub quiet: bool,
}

/// Remove surrounding double quotes from every argument when
/// [`EXPECT_ESCAPED_INPUT_FLAG`] is present.
///
/// CI systems sometimes pass quoted values through verbatim.
pub fn unescape_args(args: Vec<String>) -> Vec<String> {
    if !args.iter().any(|a| a == EXPECT_ESCAPED_INPUT_FLAG) {
        return args;
    }

    args.into_iter()
        .map(|arg| {
            if arg.len() >= 2 && arg.starts_with('"') && arg.ends_with('"') {
                arg[1..arg.len() - 1].to_string()
            } else {
                arg
            }
        })
        .collect()
}

fn overlay<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
    if value.is_some() {
        target.clone_from(value);
    }
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse_from(unescape_args(std::env::args().collect()))
    }

    /// Apply the values given on the command line (or via environment
    /// variables for secrets) on top of `config`.
    pub fn apply_to(&self, config: &mut Config) {
        overlay(&mut config.identity_email, &self.identity_email);
        overlay(&mut config.identity_username, &self.identity_username);
        overlay(&mut config.origin_repo, &self.origin_repo);
        overlay(&mut config.origin_branch, &self.origin_branch);
        overlay(&mut config.upstream_repo, &self.upstream_repo);
        overlay(&mut config.upstream_branch, &self.upstream_branch);
        overlay(&mut config.update_branch, &self.update_branch);
        overlay(&mut config.update_branch_base, &self.update_branch_base);

        let secrets = &mut config.secrets;
        overlay(&mut secrets.github_pat, &self.github_pat);
        overlay(&mut secrets.github_token, &self.github_token);
        overlay(&mut secrets.detached_creds_principal, &self.detached_creds_principal);
        overlay(&mut secrets.detached_creds_password, &self.detached_creds_password);

        if let Some(path) = &self.working_repo_path {
            config.working_repo_path = path.clone();
        }
        if let Some(mode) = self.clone_mode {
            config.clone_mode = mode;
        }
        if let Some(mode) = self.upstream_cred_mode {
            config.upstream_cred_mode = mode;
        }

        config.hide_pr_status |= self.hide_pr_status;
        config.hide_credits |= self.hide_credits;

        for (target, value) in [
            (&mut config.pr_meta.assignees, &self.pr_assignees),
            (&mut config.pr_meta.reviewers, &self.pr_reviewers),
            (&mut config.pr_meta.labels, &self.pr_labels),
        ] {
            if !value.is_empty() {
                target.clone_from(value);
            }
        }
    }
}
