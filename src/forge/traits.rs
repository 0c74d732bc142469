//! forge::traits
//!
//! Forge trait definition for interacting with the home repository's host.
//!
//! # Design
//!
//! The `Forge` trait is async because forge operations involve network I/O.
//! A forge instance is bound to one repository (owner/name) at construction.
//!
//! Forge calls happen only after the local branch work is done. Failures in
//! the metadata calls (assignees, labels, reviewers) are reported, never
//! fatal; see `engine::publish`.
//!
//! # Example
//!
//! ```ignore
//! use pull_detached::forge::{Forge, CreatePrRequest};
//!
//! async fn open_pr(forge: &dyn Forge) -> Result<(), ForgeError> {
//!     let pr = forge.create_pr(CreatePrRequest {
//!         head: "upstreamupdate/example.org/project/main".to_string(),
//!         base: "main".to_string(),
//!         title: "UpstreamUpdate from https://example.org/project".to_string(),
//!         body: None,
//!     }).await?;
//!     println!("Created PR #{}: {}", pr.number, pr.url);
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors from forge operations.
#[derive(Debug, Clone, Error)]
pub enum ForgeError {
    /// Authentication is required but not available.
    #[error("authentication required")]
    AuthRequired,

    /// Authentication failed (invalid token, expired, insufficient permissions).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Rate limit exceeded.
    #[error("rate limited")]
    RateLimited,

    /// API returned an error.
    #[error("API error: {status} - {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message from the API
        message: String,
    },

    /// Network or connection error.
    #[error("network error: {0}")]
    NetworkError(String),
}

/// API quota for the authenticated token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimit {
    /// Requests allowed per window
    pub limit: u64,
    /// Requests left in the current window
    pub remaining: u64,
    /// When the window resets
    pub reset: DateTime<Utc>,
}

/// Repository information returned from the forge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryInfo {
    /// `owner/name`
    pub full_name: String,
    /// Default branch name
    pub default_branch: String,
    /// Whether the token may push
    pub can_push: bool,
}

/// Request to create a pull request.
#[derive(Debug, Clone)]
pub struct CreatePrRequest {
    /// Head branch name (the branch with changes)
    pub head: String,
    /// Base branch name (the branch to merge into)
    pub base: String,
    /// PR title
    pub title: String,
    /// PR body/description
    pub body: Option<String>,
}

/// Request to update a pull request.
#[derive(Debug, Clone, Default)]
pub struct UpdatePrRequest {
    /// PR number
    pub number: u64,
    /// New title (if changing)
    pub title: Option<String>,
    /// New body (if changing)
    pub body: Option<String>,
}

/// Pull request information returned from the forge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    /// PR number
    pub number: u64,
    /// PR URL (web URL for viewing)
    pub url: String,
    /// Whether the PR is open
    pub is_open: bool,
    /// Head branch name
    pub head: String,
    /// Base branch name
    pub base: String,
    /// PR title
    pub title: String,
    /// PR body
    pub body: Option<String>,
}

/// Issue-side view of a pull request (assignees and labels).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Issue {
    /// Issue/PR number
    pub number: u64,
    /// Logins of assigned users
    pub assignees: Vec<String>,
    /// Label names
    pub labels: Vec<String>,
}

/// Reviewers requested on a PR.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reviewers {
    /// Individual reviewers (usernames)
    pub users: Vec<String>,
    /// Team reviewers (team slugs)
    pub teams: Vec<String>,
}

impl Reviewers {
    /// Check if there are any reviewers.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.teams.is_empty()
    }
}

/// The Forge trait for interacting with the hosting service.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the PR metadata processors call
/// into one forge from several tasks at once.
///
/// # Error Handling
///
/// All methods return `Result<T, ForgeError>`. Callers should handle:
/// - `AuthRequired` / `AuthFailed`: token missing or insufficient
/// - `NotFound`: resource doesn't exist
/// - `RateLimited`: back off
/// - `ApiError`: surface the message
/// - `NetworkError`: check connectivity
#[async_trait]
pub trait Forge: Send + Sync {
    /// Get the forge name (e.g., "github").
    fn name(&self) -> &'static str;

    /// Fetch the token's rate limit; doubles as a credential check.
    async fn rate_limit(&self) -> Result<RateLimit, ForgeError>;

    /// Fetch the bound repository.
    async fn repository(&self) -> Result<RepositoryInfo, ForgeError>;

    /// Find an open PR from `head` into `base`.
    ///
    /// Returns `Ok(None)` if there is none.
    async fn find_open_pr(&self, head: &str, base: &str)
        -> Result<Option<PullRequest>, ForgeError>;

    /// Create a new pull request.
    async fn create_pr(&self, request: CreatePrRequest) -> Result<PullRequest, ForgeError>;

    /// Update an existing pull request.
    async fn update_pr(&self, request: UpdatePrRequest) -> Result<PullRequest, ForgeError>;

    /// Fetch the issue view (assignees, labels) of PR `number`.
    async fn get_issue(&self, number: u64) -> Result<Issue, ForgeError>;

    /// Whether `login` may be assigned to issues in the repository.
    async fn check_assignee(&self, login: &str) -> Result<bool, ForgeError>;

    /// Add assignees; returns the resulting assignee list.
    async fn add_assignees(&self, number: u64, logins: &[String])
        -> Result<Vec<String>, ForgeError>;

    /// Add labels; returns the resulting label list.
    async fn add_labels(&self, number: u64, labels: &[String]) -> Result<Vec<String>, ForgeError>;

    /// Reviewers currently requested on PR `number`.
    async fn requested_reviewers(&self, number: u64) -> Result<Reviewers, ForgeError>;

    /// Request reviewers; returns the resulting requested reviewers.
    async fn request_reviewers(
        &self,
        number: u64,
        reviewers: Reviewers,
    ) -> Result<Reviewers, ForgeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forge_error_display() {
        let err = ForgeError::ApiError {
            status: 422,
            message: "Validation Failed".into(),
        };
        assert_eq!(err.to_string(), "API error: 422 - Validation Failed");
        assert_eq!(ForgeError::RateLimited.to_string(), "rate limited");
    }

    #[test]
    fn reviewers_is_empty() {
        assert!(Reviewers::default().is_empty());
        assert!(!Reviewers {
            users: vec![],
            teams: vec!["core".into()]
        }
        .is_empty());
    }
}
