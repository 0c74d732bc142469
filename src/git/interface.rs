//! git::interface
//!
//! [`VcsBackend`] implementation on top of `git2`.
//!
//! # Error Handling
//!
//! Git errors are categorized into typed variants:
//! - [`GitError::NotARepo`]: No repository at the given path
//! - [`GitError::RefNotFound`]: Requested ref does not exist
//! - [`GitError::RemoteNotFound`]: Requested remote is not configured
//! - [`GitError::AuthFailed`]: Transport rejected the credentials
//! - [`GitError::PushRejected`]: The remote refused a ref update
//! - [`GitError::InvalidRefName`]: Git refuses a reference name
//!
//! # Credentials
//!
//! Network operations take a [`Credentials`] value. The credential callback
//! answers once per operation; libgit2 keeps asking on failure, so a second
//! request is turned into an error instead of an endless loop.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use super::{local_ref, VcsBackend};
use crate::core::credentials::Credentials;
use crate::core::types::{CommitInfo, Identity, Oid, TypeError};

/// Errors from Git operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// No repository at the path.
    #[error("not a git repository: {path}")]
    NotARepo {
        /// The path that was opened
        path: PathBuf,
    },

    /// Repository is bare (no working directory).
    #[error("bare repository not supported")]
    BareRepo,

    /// Requested ref does not exist.
    #[error("ref not found: {refname}")]
    RefNotFound {
        /// The ref that was not found
        refname: String,
    },

    /// Requested remote is not configured.
    #[error("remote not found: {name}")]
    RemoteNotFound {
        /// The remote name
        name: String,
    },

    /// The transport rejected the credentials.
    #[error("authentication failed for {url}: {message}")]
    AuthFailed {
        /// Remote URL
        url: String,
        /// libgit2 message
        message: String,
    },

    /// The remote refused a ref update during push.
    #[error("push of {refname} rejected: {message}")]
    PushRejected {
        /// The ref that was rejected
        refname: String,
        /// Reason reported by the remote
        message: String,
    },

    /// Git refuses the reference name.
    #[error("invalid ref name: {refname}")]
    InvalidRefName {
        /// The rejected ref name
        refname: String,
    },

    /// Invalid object id format.
    #[error("invalid object id: {oid}")]
    InvalidOid {
        /// The invalid OID string
        oid: String,
    },

    /// Internal git2 error.
    #[error("git error: {message}")]
    Internal {
        /// The error message
        message: String,
    },
}

impl GitError {
    /// Create a GitError from a git2::Error with richer context.
    fn from_git2(err: git2::Error, context: &str) -> Self {
        match err.code() {
            git2::ErrorCode::NotFound if context.starts_with("refs/") => GitError::RefNotFound {
                refname: context.to_string(),
            },
            git2::ErrorCode::Auth => GitError::AuthFailed {
                url: context.to_string(),
                message: err.message().to_string(),
            },
            git2::ErrorCode::InvalidSpec if context.starts_with("refs/") => {
                GitError::InvalidRefName {
                    refname: context.to_string(),
                }
            }
            git2::ErrorCode::InvalidSpec => GitError::InvalidOid {
                oid: context.to_string(),
            },
            _ => GitError::Internal {
                message: format!("{}: {}", context, err.message()),
            },
        }
    }
}

impl From<git2::Error> for GitError {
    fn from(err: git2::Error) -> Self {
        GitError::Internal {
            message: err.message().to_string(),
        }
    }
}

impl From<TypeError> for GitError {
    fn from(err: TypeError) -> Self {
        match err {
            TypeError::InvalidOid(msg) => GitError::InvalidOid { oid: msg },
            other => GitError::Internal {
                message: other.to_string(),
            },
        }
    }
}

/// A configured remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteInfo {
    /// Remote name
    pub name: String,
    /// Push URL, falling back to the fetch URL
    pub url: Option<String>,
}

/// Result of a rebase attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebaseOutcome {
    /// Every operation was replayed.
    Complete {
        /// Number of commits written
        steps: usize,
    },
    /// The rebase stopped and was rolled back.
    Aborted {
        /// Commits written before the stop (discarded by the abort)
        steps: usize,
        /// Why the rebase stopped
        reason: String,
    },
}

impl RebaseOutcome {
    /// Whether the rebase completed.
    pub fn is_complete(&self) -> bool {
        matches!(self, RebaseOutcome::Complete { .. })
    }
}

/// The `git2`-backed repository handle.
///
/// This is the **single point of interaction** with libgit2.
pub struct Git {
    /// The underlying git2 repository
    repo: git2::Repository,
}

impl std::fmt::Debug for Git {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Git")
            .field("path", &self.repo.path())
            .finish()
    }
}

/// Callbacks that answer one credential request with `credentials`.
fn remote_callbacks(credentials: &Credentials) -> git2::RemoteCallbacks<'_> {
    let mut callbacks = git2::RemoteCallbacks::new();
    if let Some((user, pass)) = credentials.user_pass() {
        let mut asked = false;
        callbacks.credentials(move |url, _username, _allowed| {
            if asked {
                return Err(git2::Error::new(
                    git2::ErrorCode::Auth,
                    git2::ErrorClass::Net,
                    format!("credentials rejected by {}", url),
                ));
            }
            asked = true;
            git2::Cred::userpass_plaintext(user, pass)
        });
    }
    callbacks
}

fn to_oid(oid: &Oid) -> Result<git2::Oid, GitError> {
    git2::Oid::from_str(oid.as_str()).map_err(|e| GitError::from_git2(e, oid.as_str()))
}

impl Git {
    // =========================================================================
    // Repository Opening
    // =========================================================================

    fn from_repo(repo: git2::Repository, path: &Path) -> Result<Self, GitError> {
        if repo.is_bare() {
            return Err(GitError::BareRepo);
        }
        debug!(path = %path.display(), "opened repository");
        Ok(Self { repo })
    }

    fn find_remote(&self, name: &str) -> Result<git2::Remote<'_>, GitError> {
        self.repo.find_remote(name).map_err(|e| {
            if e.code() == git2::ErrorCode::NotFound {
                GitError::RemoteNotFound {
                    name: name.to_string(),
                }
            } else {
                GitError::from_git2(e, name)
            }
        })
    }

    fn clone_with(
        url: &str,
        path: &Path,
        credentials: &Credentials,
        bare: bool,
    ) -> Result<git2::Repository, GitError> {
        let mut fetch = git2::FetchOptions::new();
        fetch.remote_callbacks(remote_callbacks(credentials));

        git2::build::RepoBuilder::new()
            .bare(bare)
            .fetch_options(fetch)
            .clone(url, path)
            .map_err(|e| GitError::from_git2(e, url))
    }

    // =========================================================================
    // Rebase
    // =========================================================================

    fn run_rebase(
        &self,
        rebase: &mut git2::Rebase<'_>,
        signature: &git2::Signature<'_>,
    ) -> Result<usize, (usize, String)> {
        let mut steps = 0;

        while let Some(operation) = rebase.next() {
            let operation = operation.map_err(|e| (steps, e.message().to_string()))?;

            let conflicted = self
                .repo
                .index()
                .map(|index| index.has_conflicts())
                .unwrap_or(true);
            if conflicted {
                return Err((steps, format!("conflict while applying {}", operation.id())));
            }

            match rebase.commit(None, signature, None) {
                Ok(_) => steps += 1,
                Err(e) if e.code() == git2::ErrorCode::Applied => {
                    debug!(commit = %operation.id(), "patch already applied, skipping");
                }
                Err(e) => return Err((steps, e.message().to_string())),
            }
        }

        rebase
            .finish(Some(signature))
            .map_err(|e| (steps, e.message().to_string()))?;
        Ok(steps)
    }
}

impl VcsBackend for Git {
    /// Open the repository rooted exactly at `path`.
    ///
    /// Unlike discovery this does not walk up into parent directories, so an
    /// empty working directory nested inside another checkout is not
    /// mistaken for that checkout.
    ///
    /// # Errors
    ///
    /// - [`GitError::NotARepo`] if no repository is found
    /// - [`GitError::BareRepo`] if the repository has no working directory
    fn open(path: &Path) -> Result<Self, GitError> {
        let repo = git2::Repository::open(path).map_err(|_| GitError::NotARepo {
            path: path.to_path_buf(),
        })?;
        Self::from_repo(repo, path)
    }

    fn clone_repo(url: &str, path: &Path, credentials: &Credentials) -> Result<Self, GitError> {
        info!(url, path = %path.display(), "cloning repository");
        let repo = Self::clone_with(url, path, credentials, false)?;
        Self::from_repo(repo, path)
    }

    fn remote_default_branch(url: &str, credentials: &Credentials) -> Result<String, GitError> {
        let temp = tempfile::Builder::new()
            .prefix("pull-detached-head-")
            .tempdir()
            .map_err(|e| GitError::Internal {
                message: format!("failed to create temp dir: {}", e),
            })?;

        let branch = {
            let repo = Self::clone_with(url, &temp.path().join("probe"), credentials, true)?;
            let head = repo.head().map_err(|e| GitError::from_git2(e, "HEAD"))?;
            head.shorthand()
                .map(String::from)
                .ok_or_else(|| GitError::Internal {
                    message: format!("HEAD of {} is not a valid UTF-8 branch name", url),
                })?
        };

        if let Err(e) = temp.close() {
            warn!(error = %e, "failed to remove temporary clone");
        }

        info!(url, branch = %branch, "detected default branch");
        Ok(branch)
    }

    fn is_valid_branch_name(name: &str) -> bool {
        git2::Reference::is_valid_name(&local_ref(name))
    }

    fn work_dir(&self) -> Result<PathBuf, GitError> {
        self.repo
            .workdir()
            .map(Path::to_path_buf)
            .ok_or(GitError::BareRepo)
    }

    // =========================================================================
    // Remote Operations
    // =========================================================================

    fn remotes(&self) -> Result<Vec<RemoteInfo>, GitError> {
        let names = self.repo.remotes()?;
        let mut remotes = Vec::new();
        for name in names.iter().flatten() {
            let remote = self.find_remote(name)?;
            remotes.push(RemoteInfo {
                name: name.to_string(),
                url: remote.pushurl().or(remote.url()).map(String::from),
            });
        }
        Ok(remotes)
    }

    fn remote_url(&self, name: &str) -> Result<Option<String>, GitError> {
        match self.repo.find_remote(name) {
            Ok(remote) => Ok(remote.url().map(String::from)),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(GitError::from_git2(e, name)),
        }
    }

    fn add_remote(&self, name: &str, url: &str) -> Result<(), GitError> {
        self.repo
            .remote(name, url)
            .map_err(|e| GitError::from_git2(e, name))?;
        debug!(name, "added remote");
        Ok(())
    }

    fn remove_remote(&self, name: &str) -> Result<(), GitError> {
        self.repo.remote_delete(name).map_err(|e| {
            if e.code() == git2::ErrorCode::NotFound {
                GitError::RemoteNotFound {
                    name: name.to_string(),
                }
            } else {
                GitError::from_git2(e, name)
            }
        })
    }

    fn fetch(&self, name: &str, credentials: &Credentials) -> Result<(), GitError> {
        let mut remote = self.find_remote(name)?;
        let refspecs: Vec<String> = remote
            .fetch_refspecs()?
            .iter()
            .flatten()
            .map(String::from)
            .collect();

        let mut options = git2::FetchOptions::new();
        options.remote_callbacks(remote_callbacks(credentials));

        info!(remote = name, refspecs = ?refspecs, "fetching");
        remote
            .fetch(&refspecs, Some(&mut options), None)
            .map_err(|e| GitError::from_git2(e, name))
    }

    // =========================================================================
    // Refs and Branches
    // =========================================================================

    fn try_resolve_ref(&self, refname: &str) -> Result<Option<Oid>, GitError> {
        match self.repo.refname_to_id(refname) {
            Ok(oid) => Ok(Some(Oid::new(oid.to_string())?)),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(GitError::from_git2(e, refname)),
        }
    }

    fn create_branch(&self, name: &str, target: &Oid) -> Result<(), GitError> {
        let commit = self
            .repo
            .find_commit(to_oid(target)?)
            .map_err(|e| GitError::from_git2(e, target.as_str()))?;
        self.repo
            .branch(name, &commit, false)
            .map_err(|e| GitError::from_git2(e, &local_ref(name)))?;
        info!(branch = name, at = %target.short(7), "created branch");
        Ok(())
    }

    fn checkout_branch(&self, name: &str) -> Result<(), GitError> {
        let refname = local_ref(name);
        let target = self
            .repo
            .revparse_single(&refname)
            .map_err(|e| GitError::from_git2(e, &refname))?;

        let mut checkout = git2::build::CheckoutBuilder::new();
        checkout.safe();
        self.repo
            .checkout_tree(&target, Some(&mut checkout))
            .map_err(|e| GitError::from_git2(e, &refname))?;
        self.repo
            .set_head(&refname)
            .map_err(|e| GitError::from_git2(e, &refname))?;
        debug!(branch = name, "checked out");
        Ok(())
    }

    fn commits_between(&self, include: &Oid, exclude: &Oid) -> Result<Vec<CommitInfo>, GitError> {
        let mut revwalk = self.repo.revwalk()?;
        revwalk.set_sorting(git2::Sort::TOPOLOGICAL)?;
        revwalk.push(to_oid(include)?)?;
        revwalk.hide(to_oid(exclude)?)?;

        let mut commits = Vec::new();
        for oid in revwalk {
            let oid = oid?;
            let commit = self.repo.find_commit(oid)?;
            commits.push(CommitInfo {
                oid: Oid::new(oid.to_string())?,
                summary: commit.summary().unwrap_or("").to_string(),
            });
        }
        Ok(commits)
    }

    fn rebase(
        &self,
        branch: &str,
        onto: &Oid,
        identity: &Identity,
    ) -> Result<RebaseOutcome, GitError> {
        let refname = local_ref(branch);
        let branch_ref = self
            .repo
            .find_reference(&refname)
            .map_err(|e| GitError::from_git2(e, &refname))?;
        let branch_commit = self.repo.reference_to_annotated_commit(&branch_ref)?;
        let upstream_commit = self.repo.find_annotated_commit(to_oid(onto)?)?;
        let signature = git2::Signature::now(identity.name(), identity.email())?;

        let mut options = git2::RebaseOptions::new();
        let mut rebase = self.repo.rebase(
            Some(&branch_commit),
            Some(&upstream_commit),
            None,
            Some(&mut options),
        )?;

        match self.run_rebase(&mut rebase, &signature) {
            Ok(steps) => {
                info!(branch, steps, "rebase complete");
                Ok(RebaseOutcome::Complete { steps })
            }
            Err((steps, reason)) => {
                warn!(branch, steps, reason = %reason, "rebase failed, aborting");
                rebase.abort()?;
                Ok(RebaseOutcome::Aborted { steps, reason })
            }
        }
    }

    // =========================================================================
    // Tracking and Push
    // =========================================================================

    fn branch_remote(&self, branch: &str) -> Result<Option<String>, GitError> {
        let config = self.repo.config()?;
        match config.get_string(&format!("branch.{}.remote", branch)) {
            Ok(remote) => Ok(Some(remote)),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(GitError::from_git2(e, branch)),
        }
    }

    fn set_branch_remote(&self, branch: &str, remote: &str) -> Result<(), GitError> {
        let mut config = self.repo.config()?;
        config.set_str(&format!("branch.{}.remote", branch), remote)?;
        config.set_str(&format!("branch.{}.merge", branch), &local_ref(branch))?;
        debug!(branch, remote, "configured tracking");
        Ok(())
    }

    fn push_branch(
        &self,
        remote: &str,
        branch: &str,
        credentials: &Credentials,
    ) -> Result<(), GitError> {
        let refname = local_ref(branch);
        let refspec = format!("+{}:{}", refname, refname);
        let mut rejection: Option<(String, String)> = None;

        {
            let mut handle = self.find_remote(remote)?;
            let mut callbacks = remote_callbacks(credentials);
            callbacks.push_update_reference(|name, status| {
                if let Some(message) = status {
                    rejection = Some((name.to_string(), message.to_string()));
                }
                Ok(())
            });

            let mut options = git2::PushOptions::new();
            options.remote_callbacks(callbacks);

            info!(remote, branch, "pushing");
            handle
                .push(&[refspec.as_str()], Some(&mut options))
                .map_err(|e| GitError::from_git2(e, remote))?;
        }

        match rejection {
            Some((refname, message)) => Err(GitError::PushRejected { refname, message }),
            None => Ok(()),
        }
    }
}
