//! engine::reconciler
//!
//! The synchronization state machine for one run.
//!
//! # Lifecycle
//!
//! ```text
//! init -> init_upstream_branch -> checkout_origin_update_branch
//!      -> reachability checks -> [update_branch_from_upstream]
//!      -> detach_upstream_remote -> [push_origin_update_branch]
//! ```
//!
//! The reconciler owns the repository handle for the whole run. Operations
//! must be called in the order above; calling one before its prerequisite
//! returns `SyncError::InvariantViolation`.
//!
//! # Invariants
//!
//! - The upstream remote is transient: it is removed by
//!   [`SyncReconciler::detach_upstream_remote`] and again on drop, so the
//!   working repository never keeps the upstream URL.
//! - The upstream tip is captured when the remote is fetched; detaching
//!   removes the remote-tracking refs but not the captured commit.
//! - A failed rebase leaves the integration branch exactly where it was.

use std::path::PathBuf;

use tracing::{debug, info, warn};

use super::error::SyncError;
use crate::core::cleanup::remove_dir_forcefully;
use crate::core::credentials::Credentials;
use crate::core::refname::RefName;
use crate::core::types::{CommitInfo, Identity, Oid};
use crate::git::{local_ref, remote_ref, Git, GitError, RebaseOutcome, RemoteInfo, VcsBackend, ORIGIN};

/// Preferred name of the transient upstream remote.
pub const UPSTREAM_REMOTE_BASE: &str = "upstream";

/// Candidate names tried before giving up: `upstream`, `upstream-1` ...
pub const MAX_REMOTE_NAME_ATTEMPTS: usize = 1000;

/// Everything the reconciler needs to know about the run.
#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    /// Working repository location
    pub working_repo_path: PathBuf,
    /// Home clone URL, required when cloning
    pub origin_url: Option<String>,
    /// Credentials for the home remote
    pub origin_credentials: Credentials,
    /// Detached upstream URL
    pub upstream_url: String,
    /// Credentials for the upstream remote
    pub upstream_credentials: Credentials,
    /// Upstream branch, auto-detected when `None`
    pub upstream_branch: Option<String>,
    /// Home branch a new integration branch starts from
    pub update_branch_base: Option<String>,
    /// Committer for rebased commits
    pub identity: Identity,
}

/// The fetched upstream branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamBranch {
    /// Branch name on the upstream repository
    pub name: String,
    /// Tip at fetch time
    pub tip: Oid,
}

/// Pick a remote name not used by any of `existing`.
///
/// # Errors
///
/// `SyncError::InvariantViolation` once [`MAX_REMOTE_NAME_ATTEMPTS`]
/// candidates are all taken.
pub fn generate_remote_name(existing: &[RemoteInfo]) -> Result<String, SyncError> {
    (0..MAX_REMOTE_NAME_ATTEMPTS)
        .map(|i| match i {
            0 => UPSTREAM_REMOTE_BASE.to_string(),
            n => format!("{}-{}", UPSTREAM_REMOTE_BASE, n),
        })
        .find(|candidate| existing.iter().all(|r| &r.name != candidate))
        .ok_or_else(|| {
            SyncError::InvariantViolation(format!(
                "no free remote name after {} attempts",
                MAX_REMOTE_NAME_ATTEMPTS
            ))
        })
}

fn log_commits(label: &str, commits: &[CommitInfo]) {
    info!(count = commits.len(), "{}", label);
    for commit in commits {
        debug!("{}", commit);
    }
}

/// Synchronizes the integration branch with the upstream branch.
pub struct SyncReconciler<B: VcsBackend = Git> {
    settings: ReconcilerSettings,
    repo: Option<B>,
    /// Name of the upstream remote while it is attached
    attached_remote: Option<String>,
    upstream: Option<UpstreamBranch>,
    update_branch: Option<RefName>,
}

impl<B: VcsBackend> std::fmt::Debug for SyncReconciler<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncReconciler")
            .field("working_repo_path", &self.settings.working_repo_path)
            .field("attached_remote", &self.attached_remote)
            .field("upstream", &self.upstream)
            .field("update_branch", &self.update_branch)
            .finish()
    }
}

impl<B: VcsBackend> SyncReconciler<B> {
    pub fn new(settings: ReconcilerSettings) -> Self {
        Self {
            settings,
            repo: None,
            attached_remote: None,
            upstream: None,
            update_branch: None,
        }
    }

    /// The repository, once [`init`](Self::init) has run.
    pub fn backend(&self) -> Option<&B> {
        self.repo.as_ref()
    }

    /// The fetched upstream branch.
    pub fn upstream(&self) -> Option<&UpstreamBranch> {
        self.upstream.as_ref()
    }

    /// The integration branch, once checked out.
    pub fn update_branch(&self) -> Option<&RefName> {
        self.update_branch.as_ref()
    }

    /// Name of the upstream remote while it is attached.
    pub fn attached_remote(&self) -> Option<&str> {
        self.attached_remote.as_deref()
    }

    fn repo(&self) -> Result<&B, SyncError> {
        self.repo
            .as_ref()
            .ok_or_else(|| SyncError::InvariantViolation("repository not initialized".into()))
    }

    fn upstream_state(&self) -> Result<&UpstreamBranch, SyncError> {
        self.upstream
            .as_ref()
            .ok_or_else(|| SyncError::InvariantViolation("upstream branch not initialized".into()))
    }

    fn update_branch_name(&self) -> Result<&str, SyncError> {
        self.update_branch
            .as_ref()
            .map(RefName::as_str)
            .ok_or_else(|| SyncError::InvariantViolation("update branch not checked out".into()))
    }

    fn update_branch_tip(&self) -> Result<Oid, SyncError> {
        let name = self.update_branch_name()?;
        self.repo()?
            .try_resolve_ref(&local_ref(name))?
            .ok_or_else(|| SyncError::NotFound(format!("branch '{}'", name)))
    }

    /// Open (or freshly clone) the working repository and fetch the home remote.
    ///
    /// With `clone`, any existing directory is removed first.
    ///
    /// # Errors
    ///
    /// - `SyncError::Configuration` if no repository exists at the path and
    ///   cloning was not requested, or cloning lacks an origin URL
    /// - `SyncError::Cleanup` if the old directory cannot be removed
    pub fn init(&mut self, clone: bool) -> Result<(), SyncError> {
        let path = self.settings.working_repo_path.clone();

        let repo = if clone {
            let url = self.settings.origin_url.as_deref().ok_or_else(|| {
                SyncError::Configuration("origin_repo is required to clone".into())
            })?;
            if path.exists() {
                info!(path = %path.display(), "removing existing working directory");
                remove_dir_forcefully(&path)?;
            }
            B::clone_repo(url, &path, &self.settings.origin_credentials)?
        } else {
            B::open(&path).map_err(|e| match e {
                GitError::NotARepo { .. } => SyncError::Configuration(format!(
                    "No local repository found at '{}'",
                    path.display()
                )),
                other => other.into(),
            })?
        };

        repo.fetch(ORIGIN, &self.settings.origin_credentials)?;
        self.repo = Some(repo);
        Ok(())
    }

    /// Attach and fetch the upstream remote, then resolve the upstream branch.
    ///
    /// An existing remote with the upstream URL is reused; otherwise a new
    /// one is added under a free name. When no branch is configured the
    /// upstream's default branch is used.
    ///
    /// # Errors
    ///
    /// - `SyncError::NotFound` if the branch does not exist upstream
    /// - `SyncError::InvariantViolation` if no remote name is free
    pub fn init_upstream_branch(&mut self) -> Result<&UpstreamBranch, SyncError> {
        let url = self.settings.upstream_url.clone();
        let remotes = self.repo()?.remotes()?;

        let remote = match remotes.iter().find(|r| r.url.as_deref() == Some(url.as_str())) {
            Some(existing) => {
                info!(remote = %existing.name, "reusing remote with upstream URL");
                existing.name.clone()
            }
            None => {
                let name = generate_remote_name(&remotes)?;
                self.repo()?.add_remote(&name, &url)?;
                name
            }
        };
        // Recorded before fetching so a failed fetch still detaches
        self.attached_remote = Some(remote.clone());

        self.repo()?
            .fetch(&remote, &self.settings.upstream_credentials)?;

        let branch = match &self.settings.upstream_branch {
            Some(branch) => branch.clone(),
            None => B::remote_default_branch(&url, &self.settings.upstream_credentials)?,
        };

        let refname = remote_ref(&remote, &branch);
        let tip = self.repo()?.try_resolve_ref(&refname)?.ok_or_else(|| {
            SyncError::NotFound(format!("upstream branch '{}' at {}", branch, url))
        })?;

        info!(branch = %branch, tip = %tip.short(7), "upstream branch resolved");
        Ok(&*self.upstream.insert(UpstreamBranch { name: branch, tip }))
    }

    /// Check out the integration branch `name`, creating it if needed.
    ///
    /// Returns `true` only when the branch was created from scratch. A
    /// branch published on the home remote but missing locally is recreated
    /// from the remote-tracking branch and does not count as created.
    pub fn checkout_origin_update_branch(&mut self, name: RefName) -> Result<bool, SyncError> {
        let upstream_tip = self.upstream_state()?.tip.clone();
        let repo = self.repo()?;
        let branch = name.as_str();

        let created = if repo.try_resolve_ref(&local_ref(branch))?.is_some() {
            debug!(branch, "integration branch exists");
            false
        } else if let Some(published) = repo.try_resolve_ref(&remote_ref(ORIGIN, branch))? {
            info!(branch, "recreating integration branch from origin");
            repo.create_branch(branch, &published)?;
            repo.set_branch_remote(branch, ORIGIN)?;
            false
        } else {
            let start = match self.base_tip()? {
                Some(base) => base,
                None => upstream_tip,
            };
            repo.create_branch(branch, &start)?;
            true
        };

        repo.checkout_branch(branch)?;
        self.update_branch = Some(name);
        Ok(created)
    }

    /// Tip of the configured base branch, preferring the home remote's copy.
    fn base_tip(&self) -> Result<Option<Oid>, SyncError> {
        let Some(base) = self.settings.update_branch_base.as_deref() else {
            return Ok(None);
        };
        let repo = self.repo()?;
        let tip = match repo.try_resolve_ref(&remote_ref(ORIGIN, base))? {
            Some(tip) => Some(tip),
            None => repo.try_resolve_ref(&local_ref(base))?,
        };
        if tip.is_none() {
            warn!(base, "update branch base not found, starting from upstream");
        }
        Ok(tip)
    }

    /// Whether upstream has commits the integration branch lacks.
    pub fn has_upstream_branch_new_commits_for_update_branch(&self) -> Result<bool, SyncError> {
        let commits = self
            .repo()?
            .commits_between(&self.upstream_state()?.tip, &self.update_branch_tip()?)?;
        log_commits("new upstream commits", &commits);
        Ok(!commits.is_empty())
    }

    /// Whether the integration branch has commits that are not from upstream.
    pub fn has_update_branch_newer_commits_than_upstream_branch(&self) -> Result<bool, SyncError> {
        let commits = self
            .repo()?
            .commits_between(&self.update_branch_tip()?, &self.upstream_state()?.tip)?;
        log_commits("commits on update branch not from upstream", &commits);
        Ok(!commits.is_empty())
    }

    /// Rebase the integration branch onto the upstream tip.
    ///
    /// Returns `false` if the rebase could not complete; the branch is then
    /// left as it was.
    pub fn update_branch_from_upstream(&self) -> Result<bool, SyncError> {
        let branch = self.update_branch_name()?;
        let onto = &self.upstream_state()?.tip;

        match self.repo()?.rebase(branch, onto, &self.settings.identity) {
            Ok(RebaseOutcome::Complete { steps }) => {
                info!(branch, steps, "updated branch from upstream");
                Ok(true)
            }
            Ok(RebaseOutcome::Aborted { steps, reason }) => {
                warn!(branch, steps, reason = %reason, "rebase aborted");
                Ok(false)
            }
            Err(e) => {
                warn!(branch, error = %e, "rebase could not start");
                Ok(false)
            }
        }
    }

    /// Whether the integration branch is ahead of `target` on the home remote.
    ///
    /// Falls back to a local `target` branch when the home remote has none.
    pub fn has_update_branch_newer_commits_than_pr_targeted_branch(
        &self,
        target: &str,
    ) -> Result<bool, SyncError> {
        let repo = self.repo()?;
        let target_tip = match repo.try_resolve_ref(&remote_ref(ORIGIN, target))? {
            Some(tip) => tip,
            None => repo
                .try_resolve_ref(&local_ref(target))?
                .ok_or_else(|| SyncError::NotFound(format!("PR target branch '{}'", target)))?,
        };

        let commits = repo.commits_between(&self.update_branch_tip()?, &target_tip)?;
        log_commits("commits ahead of PR target", &commits);
        Ok(!commits.is_empty())
    }

    /// Whether the local integration branch differs from its published copy.
    pub fn is_update_branch_unpublished(&self) -> Result<bool, SyncError> {
        let name = self.update_branch_name()?;
        let published = self.repo()?.try_resolve_ref(&remote_ref(ORIGIN, name))?;
        Ok(published.as_ref() != Some(&self.update_branch_tip()?))
    }

    /// Remove the upstream remote. Safe to call repeatedly.
    pub fn detach_upstream_remote(&mut self) -> Result<(), SyncError> {
        let Some(name) = self.attached_remote.take() else {
            return Ok(());
        };
        let repo = self.repo()?;
        if repo.remote_url(&name)?.is_some() {
            repo.remove_remote(&name)?;
            info!(remote = %name, "detached upstream remote");
        }
        Ok(())
    }

    /// Push the integration branch to the home remote.
    ///
    /// # Errors
    ///
    /// `SyncError::Configuration` if the branch already tracks another remote.
    pub fn push_origin_update_branch(&self) -> Result<(), SyncError> {
        let repo = self.repo()?;
        let branch = self.update_branch_name()?;

        match repo.branch_remote(branch)? {
            None => repo.set_branch_remote(branch, ORIGIN)?,
            Some(remote) if remote == ORIGIN => {}
            Some(remote) => {
                return Err(SyncError::Configuration(format!(
                    "branch '{}' tracks remote '{}' instead of '{}'",
                    branch, remote, ORIGIN
                )))
            }
        }

        repo.push_branch(ORIGIN, branch, &self.settings.origin_credentials)?;
        Ok(())
    }
}

impl<B: VcsBackend> Drop for SyncReconciler<B> {
    fn drop(&mut self) {
        if let Err(e) = self.detach_upstream_remote() {
            warn!(error = %e, "failed to detach upstream remote");
        }
    }
}
