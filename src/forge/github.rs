//! forge::github
//!
//! GitHub forge implementation using the REST API.
//!
//! # Authentication
//!
//! A static token (personal access token or Actions token) is sent as a
//! bearer token on every request. [`Forge::rate_limit`] is the cheapest
//! authenticated call and is used to verify the token before any work.
//!
//! # Rate Limiting
//!
//! Returns `ForgeError::RateLimited` when limits are hit. Retrying is the
//! caller's responsibility.
//!
//! # Example
//!
//! ```ignore
//! use pull_detached::forge::github::GitHubForge;
//! use pull_detached::forge::Forge;
//!
//! let forge = GitHubForge::new("ghp_xxx", "octocat", "hello-world");
//! let repo = forge.repository().await?;
//! println!("default branch: {}", repo.default_branch);
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};

use super::traits::{
    CreatePrRequest, Forge, ForgeError, Issue, PullRequest, RateLimit, RepositoryInfo, Reviewers,
    UpdatePrRequest,
};

/// Default GitHub API base URL.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// User-Agent header value for API requests.
const USER_AGENT_VALUE: &str = concat!("pull-detached/", env!("CARGO_PKG_VERSION"));

/// GitHub forge implementation bound to one repository.
pub struct GitHubForge {
    /// HTTP client for making requests
    client: Client,
    /// Bearer token
    token: String,
    /// Repository owner (user or organization)
    owner: String,
    /// Repository name
    repo: String,
    /// API base URL (configurable for GitHub Enterprise)
    api_base: String,
}

// Custom Debug to avoid exposing the token
impl std::fmt::Debug for GitHubForge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubForge")
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl GitHubForge {
    /// Create a GitHub forge against the public API.
    pub fn new(
        token: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
    ) -> Self {
        Self::with_api_base(token, owner, repo, DEFAULT_API_BASE)
    }

    /// Create a GitHub forge with a custom API base URL.
    pub fn with_api_base(
        token: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Self {
        let api_base: String = api_base.into();
        Self {
            client: Client::new(),
            token: token.into(),
            owner: owner.into(),
            repo: repo.into(),
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    /// Create a GitHub forge from a remote URL.
    ///
    /// Returns `None` if the URL has no `owner/repo` path.
    ///
    /// # Example
    ///
    /// ```
    /// use pull_detached::forge::github::GitHubForge;
    ///
    /// let forge = GitHubForge::from_remote_url(
    ///     "git@github.com:owner/repo.git",
    ///     "token",
    ///     "https://api.github.com",
    /// );
    /// assert!(forge.is_some());
    /// ```
    pub fn from_remote_url(url: &str, token: impl Into<String>, api_base: &str) -> Option<Self> {
        let (owner, repo) = parse_remote_url(url)?;
        Some(Self::with_api_base(token, owner, repo, api_base))
    }

    /// Get the repository owner.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Get the repository name.
    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// Build common headers for API requests.
    fn headers(&self) -> Result<HeaderMap, ForgeError> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", self.token))
            .map_err(|_| ForgeError::AuthFailed("token contains invalid characters".into()))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        Ok(headers)
    }

    /// Build URL for a repository endpoint.
    fn repo_url(&self, path: &str) -> String {
        if path.is_empty() {
            format!("{}/repos/{}/{}", self.api_base, self.owner, self.repo)
        } else {
            format!(
                "{}/repos/{}/{}/{}",
                self.api_base, self.owner, self.repo, path
            )
        }
    }

    /// Attach headers, send, and decode a JSON response.
    async fn send<T: for<'de> Deserialize<'de>>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, ForgeError> {
        let response = request
            .headers(self.headers()?)
            .send()
            .await
            .map_err(|e| ForgeError::NetworkError(e.to_string()))?;
        self.handle_response(response).await
    }

    /// Handle API response, mapping errors appropriately.
    async fn handle_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: Response,
    ) -> Result<T, ForgeError> {
        let status = response.status();

        if status.is_success() {
            response.json().await.map_err(|e| ForgeError::ApiError {
                status: status.as_u16(),
                message: format!("Failed to parse response: {}", e),
            })
        } else {
            Err(Self::error_from_response(response, status).await)
        }
    }

    /// Map an error response from the API.
    async fn error_from_response(response: Response, status: StatusCode) -> ForgeError {
        let required_permissions = response
            .headers()
            .get("X-Accepted-GitHub-Permissions")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let message = match response.json::<GitHubErrorResponse>().await {
            Ok(err) => err.message,
            Err(_) => "Unknown error".to_string(),
        };

        match status {
            StatusCode::UNAUTHORIZED => ForgeError::AuthFailed("Invalid or expired token".into()),
            StatusCode::FORBIDDEN if message.to_ascii_lowercase().contains("rate limit") => {
                ForgeError::RateLimited
            }
            StatusCode::FORBIDDEN => {
                let mut err_msg = format!("Permission denied: {}", message);
                if let Some(perms) = required_permissions.filter(|p| !p.is_empty()) {
                    err_msg.push_str(&format!(" [required: {}]", perms));
                }
                ForgeError::AuthFailed(err_msg)
            }
            StatusCode::NOT_FOUND => ForgeError::NotFound(message),
            StatusCode::TOO_MANY_REQUESTS => ForgeError::RateLimited,
            _ if status.is_server_error() => ForgeError::ApiError {
                status: status.as_u16(),
                message: format!("GitHub server error: {}", message),
            },
            _ => ForgeError::ApiError {
                status: status.as_u16(),
                message,
            },
        }
    }
}

#[async_trait]
impl Forge for GitHubForge {
    fn name(&self) -> &'static str {
        "github"
    }

    async fn rate_limit(&self) -> Result<RateLimit, ForgeError> {
        let url = format!("{}/rate_limit", self.api_base);
        let body: GitHubRateLimitResponse = self.send(self.client.get(&url)).await?;
        let core = body.resources.core;
        Ok(RateLimit {
            limit: core.limit,
            remaining: core.remaining,
            reset: DateTime::<Utc>::from_timestamp(core.reset, 0).unwrap_or_default(),
        })
    }

    async fn repository(&self) -> Result<RepositoryInfo, ForgeError> {
        let repo: GitHubRepository = self.send(self.client.get(self.repo_url(""))).await?;
        Ok(repo.into())
    }

    async fn find_open_pr(
        &self,
        head: &str,
        base: &str,
    ) -> Result<Option<PullRequest>, ForgeError> {
        // Same-repo PRs still need the owner:branch form
        let head_param = format!("{}:{}", self.owner, head);
        let request = self.client.get(self.repo_url("pulls")).query(&[
            ("state", "open"),
            ("head", head_param.as_str()),
            ("base", base),
        ]);

        let prs: Vec<GitHubPullRequest> = self.send(request).await?;
        Ok(prs
            .into_iter()
            .map(PullRequest::from)
            .find(|pr| pr.head == head && pr.base == base))
    }

    async fn create_pr(&self, request: CreatePrRequest) -> Result<PullRequest, ForgeError> {
        let body = CreatePrBody {
            head: &request.head,
            base: &request.base,
            title: &request.title,
            body: request.body.as_deref(),
        };
        let pr: GitHubPullRequest = self
            .send(self.client.post(self.repo_url("pulls")).json(&body))
            .await?;
        Ok(pr.into())
    }

    async fn update_pr(&self, request: UpdatePrRequest) -> Result<PullRequest, ForgeError> {
        let url = self.repo_url(&format!("pulls/{}", request.number));
        let body = UpdatePrBody {
            title: request.title.as_deref(),
            body: request.body.as_deref(),
        };
        let pr: GitHubPullRequest = self.send(self.client.patch(&url).json(&body)).await?;
        Ok(pr.into())
    }

    async fn get_issue(&self, number: u64) -> Result<Issue, ForgeError> {
        let url = self.repo_url(&format!("issues/{}", number));
        let issue: GitHubIssue = self.send(self.client.get(&url)).await?;
        Ok(issue.into())
    }

    async fn check_assignee(&self, login: &str) -> Result<bool, ForgeError> {
        let url = self.repo_url(&format!("assignees/{}", login));
        let response = self
            .client
            .get(&url)
            .headers(self.headers()?)
            .send()
            .await
            .map_err(|e| ForgeError::NetworkError(e.to_string()))?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(Self::error_from_response(response, status).await),
        }
    }

    async fn add_assignees(
        &self,
        number: u64,
        logins: &[String],
    ) -> Result<Vec<String>, ForgeError> {
        let url = self.repo_url(&format!("issues/{}/assignees", number));
        let body = AssigneesBody { assignees: logins };
        let issue: GitHubIssue = self.send(self.client.post(&url).json(&body)).await?;
        Ok(Issue::from(issue).assignees)
    }

    async fn add_labels(&self, number: u64, labels: &[String]) -> Result<Vec<String>, ForgeError> {
        let url = self.repo_url(&format!("issues/{}/labels", number));
        let body = LabelsBody { labels };
        let labels: Vec<GitHubLabel> = self.send(self.client.post(&url).json(&body)).await?;
        Ok(labels.into_iter().map(|l| l.name).collect())
    }

    async fn requested_reviewers(&self, number: u64) -> Result<Reviewers, ForgeError> {
        let url = self.repo_url(&format!("pulls/{}/requested_reviewers", number));
        let requested: GitHubRequestedReviewers = self.send(self.client.get(&url)).await?;
        Ok(Reviewers {
            users: requested.users.into_iter().map(|u| u.login).collect(),
            teams: requested.teams.into_iter().map(|t| t.slug).collect(),
        })
    }

    async fn request_reviewers(
        &self,
        number: u64,
        reviewers: Reviewers,
    ) -> Result<Reviewers, ForgeError> {
        if reviewers.is_empty() {
            return self.requested_reviewers(number).await;
        }

        let url = self.repo_url(&format!("pulls/{}/requested_reviewers", number));
        let body = RequestReviewersBody {
            reviewers: &reviewers.users,
            team_reviewers: &reviewers.teams,
        };
        let pr: GitHubPullRequestReviewers = self.send(self.client.post(&url).json(&body)).await?;
        Ok(Reviewers {
            users: pr.requested_reviewers.into_iter().map(|u| u.login).collect(),
            teams: pr.requested_teams.into_iter().map(|t| t.slug).collect(),
        })
    }
}

// --------------------------------------------------------------------------
// API Request/Response Types
// --------------------------------------------------------------------------

/// Request body for creating a PR.
#[derive(Serialize)]
struct CreatePrBody<'a> {
    head: &'a str,
    base: &'a str,
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a str>,
}

/// Request body for updating a PR.
#[derive(Serialize)]
struct UpdatePrBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a str>,
}

#[derive(Serialize)]
struct AssigneesBody<'a> {
    assignees: &'a [String],
}

#[derive(Serialize)]
struct LabelsBody<'a> {
    labels: &'a [String],
}

/// Request body for requesting reviewers.
#[derive(Serialize)]
struct RequestReviewersBody<'a> {
    reviewers: &'a [String],
    team_reviewers: &'a [String],
}

/// GitHub error response format.
#[derive(Deserialize)]
struct GitHubErrorResponse {
    message: String,
}

#[derive(Deserialize)]
struct GitHubRateLimitResponse {
    resources: GitHubRateLimitResources,
}

#[derive(Deserialize)]
struct GitHubRateLimitResources {
    core: GitHubRateLimitWindow,
}

#[derive(Deserialize)]
struct GitHubRateLimitWindow {
    limit: u64,
    remaining: u64,
    reset: i64,
}

#[derive(Deserialize)]
struct GitHubRepository {
    full_name: String,
    default_branch: String,
    #[serde(default)]
    permissions: Option<GitHubPermissions>,
}

#[derive(Deserialize)]
struct GitHubPermissions {
    #[serde(default)]
    push: bool,
}

impl From<GitHubRepository> for RepositoryInfo {
    fn from(repo: GitHubRepository) -> Self {
        RepositoryInfo {
            full_name: repo.full_name,
            default_branch: repo.default_branch,
            can_push: repo.permissions.map(|p| p.push).unwrap_or(false),
        }
    }
}

/// GitHub PR response format.
#[derive(Deserialize)]
struct GitHubPullRequest {
    number: u64,
    html_url: String,
    state: String,
    head: GitHubRef,
    base: GitHubRef,
    title: String,
    body: Option<String>,
}

/// GitHub ref (head/base) format.
#[derive(Deserialize)]
struct GitHubRef {
    #[serde(rename = "ref")]
    ref_name: String,
}

impl From<GitHubPullRequest> for PullRequest {
    fn from(pr: GitHubPullRequest) -> Self {
        PullRequest {
            number: pr.number,
            url: pr.html_url,
            is_open: pr.state == "open",
            head: pr.head.ref_name,
            base: pr.base.ref_name,
            title: pr.title,
            body: pr.body,
        }
    }
}

#[derive(Deserialize)]
struct GitHubUser {
    login: String,
}

#[derive(Deserialize)]
struct GitHubTeam {
    slug: String,
}

#[derive(Deserialize)]
struct GitHubLabel {
    name: String,
}

#[derive(Deserialize)]
struct GitHubIssue {
    number: u64,
    #[serde(default)]
    assignees: Vec<GitHubUser>,
    #[serde(default)]
    labels: Vec<GitHubLabel>,
}

impl From<GitHubIssue> for Issue {
    fn from(issue: GitHubIssue) -> Self {
        Issue {
            number: issue.number,
            assignees: issue.assignees.into_iter().map(|u| u.login).collect(),
            labels: issue.labels.into_iter().map(|l| l.name).collect(),
        }
    }
}

#[derive(Deserialize)]
struct GitHubRequestedReviewers {
    #[serde(default)]
    users: Vec<GitHubUser>,
    #[serde(default)]
    teams: Vec<GitHubTeam>,
}

#[derive(Deserialize)]
struct GitHubPullRequestReviewers {
    #[serde(default)]
    requested_reviewers: Vec<GitHubUser>,
    #[serde(default)]
    requested_teams: Vec<GitHubTeam>,
}

// --------------------------------------------------------------------------
// URL Parsing
// --------------------------------------------------------------------------

/// Parse a remote URL to extract owner and repo.
///
/// Supports both SSH and HTTP(S) formats on any host:
/// - `git@github.com:owner/repo.git`
/// - `https://github.com/owner/repo.git`
/// - `https://ghe.example.com/owner/repo`
///
/// # Returns
///
/// `Some((owner, repo))` if the URL names an `owner/repo` pair, `None` otherwise.
///
/// # Example
///
/// ```
/// use pull_detached::forge::github::parse_remote_url;
///
/// let (owner, repo) = parse_remote_url("git@github.com:octocat/hello-world.git").unwrap();
/// assert_eq!(owner, "octocat");
/// assert_eq!(repo, "hello-world");
/// ```
pub fn parse_remote_url(url: &str) -> Option<(String, String)> {
    let url = url.trim();

    let path = if let Some(rest) = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .or_else(|| url.strip_prefix("ssh://"))
    {
        // Drop host (and any user@ prefix)
        rest.split_once('/')?.1
    } else if let Some((user_host, path)) = url.split_once(':') {
        if !user_host.contains('@') {
            return None;
        }
        path
    } else {
        return None;
    };

    let path = path.trim_end_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path);
    let (owner, repo) = path.split_once('/')?;

    if owner.is_empty() || repo.is_empty() || repo.contains('/') {
        return None;
    }

    Some((owner.to_string(), repo.to_string()))
}
