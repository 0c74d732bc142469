//! git
//!
//! Single interface for all Git operations.
//!
//! # Architecture
//!
//! This module is the **only doorway** to Git. The reconciliation engine
//! talks to a repository exclusively through the [`VcsBackend`] trait, and
//! [`Git`] is its `git2` implementation. No other module imports `git2`.
//!
//! # Responsibilities
//!
//! - Cloning (including throwaway clones for default-branch detection)
//! - Remote management, fetch and push with per-remote credentials
//! - Branch creation, checkout and tracking configuration
//! - Reachability queries ("commits in A but not in B")
//! - Transactional rebase (complete or fully aborted)
//!
//! # Example
//!
//! ```ignore
//! use pull_detached::git::{Git, VcsBackend};
//! use std::path::Path;
//!
//! let git = Git::open(Path::new("workdir/gitrepo"))?;
//! let tip = git.try_resolve_ref("refs/remotes/origin/main")?;
//! ```

mod interface;

pub use interface::{Git, GitError, RebaseOutcome, RemoteInfo};

use std::path::{Path, PathBuf};

use crate::core::credentials::Credentials;
use crate::core::types::{CommitInfo, Identity, Oid};

/// Name of the home remote.
pub const ORIGIN: &str = "origin";

/// Version control operations the reconciliation engine depends on.
///
/// Implementations own one working repository. Operations mutate on-disk
/// state and must not be called concurrently.
pub trait VcsBackend: Sized {
    /// Open the repository rooted exactly at `path`.
    fn open(path: &Path) -> Result<Self, GitError>;

    /// Clone `url` into `path` with a checkout and open the result.
    fn clone_repo(url: &str, path: &Path, credentials: &Credentials) -> Result<Self, GitError>;

    /// Name of the branch `HEAD` points to in the repository at `url`.
    ///
    /// Uses a throwaway bare clone that is removed before returning.
    fn remote_default_branch(url: &str, credentials: &Credentials) -> Result<String, GitError>;

    /// Whether git accepts `name` as a local branch name.
    fn is_valid_branch_name(name: &str) -> bool;

    /// Root of the working tree.
    fn work_dir(&self) -> Result<PathBuf, GitError>;

    /// All configured remotes.
    fn remotes(&self) -> Result<Vec<RemoteInfo>, GitError>;

    /// URL of remote `name`, if it exists.
    fn remote_url(&self, name: &str) -> Result<Option<String>, GitError>;

    /// Add a remote with the default fetch refspec.
    fn add_remote(&self, name: &str, url: &str) -> Result<(), GitError>;

    /// Remove a remote together with its remote-tracking refs.
    fn remove_remote(&self, name: &str) -> Result<(), GitError>;

    /// Fetch remote `name` using its configured refspecs.
    fn fetch(&self, name: &str, credentials: &Credentials) -> Result<(), GitError>;

    /// Resolve a full ref name, returning `None` if it does not exist.
    fn try_resolve_ref(&self, refname: &str) -> Result<Option<Oid>, GitError>;

    /// Create local branch `name` at `target`.
    fn create_branch(&self, name: &str, target: &Oid) -> Result<(), GitError>;

    /// Check out local branch `name`, attaching `HEAD` to it.
    fn checkout_branch(&self, name: &str) -> Result<(), GitError>;

    /// Commits reachable from `include` but not from `exclude`, newest first.
    fn commits_between(&self, include: &Oid, exclude: &Oid) -> Result<Vec<CommitInfo>, GitError>;

    /// Rebase local branch `branch` onto `onto`, committing as `identity`.
    ///
    /// Any outcome other than [`RebaseOutcome::Complete`] leaves the
    /// repository in its pre-rebase state.
    fn rebase(
        &self,
        branch: &str,
        onto: &Oid,
        identity: &Identity,
    ) -> Result<RebaseOutcome, GitError>;

    /// Remote that local branch `branch` tracks, if configured.
    fn branch_remote(&self, branch: &str) -> Result<Option<String>, GitError>;

    /// Make local branch `branch` track the same-named branch on `remote`.
    fn set_branch_remote(&self, branch: &str, remote: &str) -> Result<(), GitError>;

    /// Force-push local branch `branch` to the same name on `remote`.
    fn push_branch(
        &self,
        remote: &str,
        branch: &str,
        credentials: &Credentials,
    ) -> Result<(), GitError>;
}

/// Full ref name of a local branch.
pub fn local_ref(branch: &str) -> String {
    format!("refs/heads/{}", branch)
}

/// Full ref name of a remote-tracking branch.
pub fn remote_ref(remote: &str, branch: &str) -> String {
    format!("refs/remotes/{}/{}", remote, branch)
}
