//! engine::driver
//!
//! Top-level control flow of one run.
//!
//! ```text
//! validate config -> pick credentials -> plan working repo -> verify forge
//!   -> init -> init upstream -> derive branch name -> checkout
//!   -> reachability checks -> [rebase] -> detach upstream
//!   -> publication gate -> [push] -> ensure PR -> [PR metadata] -> PR status
//! ```
//!
//! Configuration and forge problems abort before the working repository is
//! touched. A failed rebase is recorded in the report and the run goes on
//! to publish whatever the branch already holds.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{sleep, timeout};
use tracing::{error, info, warn};

use super::error::SyncError;
use super::publish::{apply_pr_meta, ensure_pull_request, update_pr_status, BodyOptions};
use super::reconciler::{ReconcilerSettings, SyncReconciler};
use crate::core::config::{CloneMode, Config, ConfigError};
use crate::core::credentials::{select_upstream_credentials, CredentialInputs, Credentials};
use crate::core::refname::{fix, RefName};
use crate::core::status::StatusReport;
use crate::forge::{create_forge, Forge, ForgeError, RateLimit};
use crate::git::{Git, GitError, VcsBackend, ORIGIN};

/// Bound on a single forge credential probe.
pub const FORGE_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Bound on the whole forge credential check, retries included.
pub const FORGE_VERIFY_TIMEOUT: Duration = Duration::from_secs(25);

const PROBE_RETRY_DELAY: Duration = Duration::from_millis(500);

pub const MSG_FOREIGN_COMMITS: &str =
    "There are commits from outside upstream on the origin-update branch AND new commits coming from upstream";
pub const MSG_UPDATE_FAILED: &str =
    "Unable to update branch from upstream; see logs for more details";
pub const MSG_NO_NEW_COMMITS: &str =
    "Can't create a PR when the pr-base branch has no newer commits than the targeted-branch";

/// How the working repository will be obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoPlan {
    /// Whether the repository is (re)cloned
    pub clone: bool,
    /// Home repository URL, used to locate it on the forge
    pub origin_url: String,
}

/// Decide between opening and cloning the working repository.
///
/// # Errors
///
/// - `SyncError::Configuration` if `do-nothing` finds no repository, a clone
///   is needed without `origin_repo`, or the origin URL is unknown
pub fn plan_working_repo<B: VcsBackend>(config: &Config) -> Result<RepoPlan, SyncError> {
    let existing = match B::open(&config.working_repo_path) {
        Ok(repo) => Some(repo),
        Err(GitError::NotARepo { .. }) => None,
        Err(e) => return Err(e.into()),
    };

    let clone = match (config.clone_mode, &existing) {
        (CloneMode::DoNothing, None) => {
            return Err(SyncError::Configuration(format!(
                "No local repository found at '{}'",
                config.working_repo_path.display()
            )))
        }
        (CloneMode::CloneAlways, _) | (_, None) => true,
        (_, Some(_)) => false,
    };

    let origin_url = if clone {
        config.origin_repo.clone().ok_or_else(|| {
            SyncError::Configuration("origin_repo is required to clone the working repository".into())
        })?
    } else {
        let from_repo = match &existing {
            Some(repo) => repo.remote_url(ORIGIN)?,
            None => None,
        };
        from_repo
            .or_else(|| config.origin_repo.clone())
            .ok_or_else(|| {
                SyncError::Configuration(format!("working repository has no '{}' remote", ORIGIN))
            })?
    };

    info!(clone, origin = %origin_url, "planned working repository");
    Ok(RepoPlan { clone, origin_url })
}

/// Default integration branch name for `upstream_url` / `upstream_branch`.
///
/// Any `<scheme>://` prefix is dropped. Path segments lose their leading
/// dots and a trailing `.lock`, and empty segments are removed, so local
/// paths and `file://` or `ssh://` URLs yield names git accepts. The result
/// still has to go through [`fix`].
pub fn default_update_branch_name(upstream_url: &str, upstream_branch: &str) -> String {
    let candidate = format!("upstreamupdate/{}/{}", strip_scheme(upstream_url), upstream_branch);
    candidate
        .split('/')
        .map(|segment| segment.trim_start_matches('.'))
        .map(|segment| segment.strip_suffix(".lock").unwrap_or(segment))
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

fn strip_scheme(url: &str) -> &str {
    match url.split_once("://") {
        Some((scheme, rest))
            if !scheme.is_empty()
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) =>
        {
            rest
        }
        _ => url,
    }
}

/// Normalize `candidate` and make sure git accepts the result as a branch.
///
/// # Errors
///
/// `SyncError::InvalidInput` if the candidate cannot be repaired or git
/// still refuses the repaired name.
pub fn resolve_update_branch<B: VcsBackend>(candidate: &str) -> Result<RefName, SyncError> {
    let name = fix(candidate)?;
    if !B::is_valid_branch_name(name.as_str()) {
        return Err(SyncError::InvalidInput(format!(
            "'{}' is not a branch name git accepts",
            name
        )));
    }
    Ok(name)
}

async fn probe_rate_limit(forge: &dyn Forge, probe: Duration) -> Result<RateLimit, SyncError> {
    loop {
        match timeout(probe, forge.rate_limit()).await {
            Ok(Ok(limit)) => return Ok(limit),
            Ok(Err(ForgeError::NetworkError(message))) => {
                warn!(error = %message, "forge unreachable, retrying");
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => warn!(?probe, "forge credential probe timed out, retrying"),
        }
        sleep(PROBE_RETRY_DELAY).await;
    }
}

/// Check the forge token and push access; returns the PR target branch.
///
/// # Errors
///
/// - `SyncError::Timeout` if the credential probes exceed `overall`
/// - `SyncError::Configuration` if the token cannot push to the repository
pub async fn verify_forge(
    forge: &dyn Forge,
    origin_branch: Option<&str>,
    probe: Duration,
    overall: Duration,
) -> Result<String, SyncError> {
    info!(forge = forge.name(), "verifying forge credentials");
    let limit = timeout(overall, probe_rate_limit(forge, probe))
        .await
        .map_err(|_| {
            SyncError::Timeout(format!(
                "forge credential check did not finish within {:?}",
                overall
            ))
        })??;
    info!(
        remaining = limit.remaining,
        limit = limit.limit,
        reset = %limit.reset.format("%Y-%m-%d %H:%M:%S"),
        "rate limit"
    );

    let repo = forge.repository().await?;
    if !repo.can_push {
        return Err(SyncError::Configuration(format!(
            "token has no push permission on '{}'",
            repo.full_name
        )));
    }
    info!(repo = %repo.full_name, "using repository");

    let target = origin_branch
        .map(String::from)
        .unwrap_or(repo.default_branch);
    info!(target = %target, "targeting branch for PR");
    Ok(target)
}

/// Runs one reconciliation.
pub struct ReconciliationDriver<B: VcsBackend = Git> {
    config: Config,
    forge: Option<Arc<dyn Forge>>,
    probe_timeout: Duration,
    verify_timeout: Duration,
    backend: PhantomData<fn() -> B>,
}

impl<B: VcsBackend> std::fmt::Debug for ReconciliationDriver<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationDriver")
            .field("config", &self.config)
            .field("forge", &self.forge.as_ref().map(|f| f.name()))
            .finish()
    }
}

impl ReconciliationDriver<Git> {
    /// Driver using libgit2 and a forge derived from the origin URL.
    pub fn new(config: Config) -> Self {
        Self::with_backend(config)
    }
}

impl<B: VcsBackend> ReconciliationDriver<B> {
    /// Driver using backend `B`.
    pub fn with_backend(config: Config) -> Self {
        Self {
            config,
            forge: None,
            probe_timeout: FORGE_PROBE_TIMEOUT,
            verify_timeout: FORGE_VERIFY_TIMEOUT,
            backend: PhantomData,
        }
    }

    /// Use `forge` instead of creating one from the origin URL.
    pub fn with_forge(mut self, forge: Arc<dyn Forge>) -> Self {
        self.forge = Some(forge);
        self
    }

    /// Override the forge verification bounds.
    pub fn with_timeouts(mut self, probe: Duration, overall: Duration) -> Self {
        self.probe_timeout = probe;
        self.verify_timeout = overall;
        self
    }

    fn upstream_credentials(&self, upstream_url: &str) -> Result<Credentials, ConfigError> {
        let secrets = &self.config.secrets;
        let credentials = select_upstream_credentials(
            upstream_url,
            &CredentialInputs {
                mode: self.config.upstream_cred_mode,
                forge_web_url: &self.config.forge_web_url,
                forge_token: self.config.forge_token(),
                principal: secrets.detached_creds_principal.as_deref(),
                secret: secrets.detached_creds_password.as_deref(),
            },
        )?;
        info!(
            mode = %self.config.upstream_cred_mode,
            credentials = credentials.kind(),
            "upstream credentials selected"
        );
        Ok(credentials)
    }

    /// Execute the run and return its report.
    ///
    /// # Errors
    ///
    /// Any [`SyncError`]; recoverable failures are in the report instead.
    pub async fn run(&self) -> Result<StatusReport, SyncError> {
        info!("starting run");
        let config = &self.config;
        config.validate()?;
        info!(config = ?config, "resolved configuration");

        let mut report = StatusReport::new(Utc::now());
        report.resolved_config = Some(config.clone());

        let upstream_url = config.upstream_url()?.to_string();
        let token = config
            .forge_token()
            .ok_or_else(|| SyncError::Configuration("a forge token is required".into()))?;
        let origin_credentials = Credentials::Token(token.to_string());
        let upstream_credentials = self.upstream_credentials(&upstream_url)?;
        let explicit_branch = config
            .update_branch
            .as_deref()
            .map(resolve_update_branch::<B>)
            .transpose()?;

        let plan = plan_working_repo::<B>(config)?;

        let forge = match &self.forge {
            Some(forge) => Arc::clone(forge),
            None => create_forge(
                &plan.origin_url,
                token,
                &config.forge_web_url,
                &config.forge_api_url,
            )?,
        };
        let target = verify_forge(
            forge.as_ref(),
            config.origin_branch.as_deref(),
            self.probe_timeout,
            self.verify_timeout,
        )
        .await?;

        let mut reconciler = SyncReconciler::<B>::new(ReconcilerSettings {
            working_repo_path: config.working_repo_path.clone(),
            origin_url: Some(plan.origin_url.clone()),
            origin_credentials,
            upstream_url: upstream_url.clone(),
            upstream_credentials,
            upstream_branch: config.upstream_branch.clone(),
            update_branch_base: config.update_branch_base.clone(),
            identity: config.identity()?,
        });

        reconciler.init(plan.clone)?;
        let upstream = reconciler.init_upstream_branch()?.clone();

        let update_branch = match explicit_branch {
            Some(name) => name,
            None => resolve_update_branch::<B>(&default_update_branch_name(
                &upstream_url,
                &upstream.name,
            ))?,
        };
        info!(update_branch = %update_branch, "integration branch");

        let created = reconciler.checkout_origin_update_branch(update_branch.clone())?;
        report.created_branch = created;

        let has_updates = reconciler.has_upstream_branch_new_commits_for_update_branch()?;
        report.has_upstream_updates = has_updates;

        let mut rebased = false;
        if has_updates {
            if reconciler.has_update_branch_newer_commits_than_upstream_branch()? {
                info!("{}. This may cause conflicts.", MSG_FOREIGN_COMMITS);
                report.has_foreign_commits = true;
                report.add_message(MSG_FOREIGN_COMMITS);
            }

            rebased = reconciler.update_branch_from_upstream()?;
            if !rebased {
                error!("unable to update branch from upstream");
                report.error = true;
                report.add_message(MSG_UPDATE_FAILED);
            }
        }

        reconciler.detach_upstream_remote()?;

        let unpublished = reconciler.is_update_branch_unpublished()?;
        report.changed = created || rebased || unpublished;

        if !reconciler.has_update_branch_newer_commits_than_pr_targeted_branch(&target)? {
            info!("{}", MSG_NO_NEW_COMMITS);
            report.add_message(MSG_NO_NEW_COMMITS);
            report.no_new_commits_on_base_branch = true;
        } else {
            if report.changed {
                info!("needs to be pushed");
                reconciler.push_origin_update_branch()?;
                report.pushed = true;
            }

            let (pr, created_pr) = ensure_pull_request(
                forge.as_ref(),
                update_branch.as_str(),
                &target,
                &upstream_url,
                &upstream.name,
            )
            .await?;
            report.created_pr = created_pr;

            if created_pr && !config.pr_meta.is_empty() {
                for outcome in apply_pr_meta(Arc::clone(&forge), pr.number, &config.pr_meta).await {
                    report.absorb(outcome);
                }
            }

            update_pr_status(
                forge.as_ref(),
                &pr,
                &report,
                BodyOptions {
                    hide_pr_status: config.hide_pr_status,
                    hide_credits: config.hide_credits,
                },
            )
            .await?;
            report.updated_pr_successfully = true;
        }

        drop(reconciler);
        info!("finished run");
        info!("=== STATUS REPORT ===\n{}", report.render());
        Ok(report)
    }
}
