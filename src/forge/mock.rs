//! forge::mock
//!
//! Mock forge implementation for deterministic testing.
//!
//! # Design
//!
//! The mock forge provides a deterministic implementation of the `Forge` trait
//! for use in tests. It stores PRs, their issue metadata and requested
//! reviewers in memory and allows configuring failure scenarios.
//!
//! # Example
//!
//! ```
//! use pull_detached::forge::mock::MockForge;
//! use pull_detached::forge::{Forge, CreatePrRequest};
//!
//! # tokio_test::block_on(async {
//! let forge = MockForge::new();
//!
//! let pr = forge.create_pr(CreatePrRequest {
//!     head: "upstreamupdate/x".to_string(),
//!     base: "main".to_string(),
//!     title: "Update".to_string(),
//!     body: None,
//! }).await.unwrap();
//!
//! assert_eq!(pr.number, 1);
//! assert!(pr.is_open);
//!
//! let found = forge.find_open_pr("upstreamupdate/x", "main").await.unwrap();
//! assert_eq!(found.unwrap().number, 1);
//! # });
//! ```

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::traits::{
    CreatePrRequest, Forge, ForgeError, Issue, PullRequest, RateLimit, RepositoryInfo, Reviewers,
    UpdatePrRequest,
};

/// Mock forge for testing.
///
/// Thread-safe via internal `Arc<Mutex<...>>` wrapping.
#[derive(Debug, Clone)]
pub struct MockForge {
    /// Internal state shared across clones.
    inner: Arc<Mutex<MockForgeInner>>,
}

/// Internal mutable state.
#[derive(Debug)]
struct MockForgeInner {
    /// Stored PRs by number.
    prs: HashMap<u64, PullRequest>,
    /// Assignees and labels by PR number.
    issues: HashMap<u64, Issue>,
    /// Requested reviewers by PR number.
    reviewers: HashMap<u64, Reviewers>,
    /// Logins that may be assigned; `None` accepts everyone.
    assignable: Option<BTreeSet<String>>,
    /// Repository returned by `repository()`.
    repository: RepositoryInfo,
    /// Artificial latency for `rate_limit()`.
    rate_limit_delay: Option<Duration>,
    /// Next PR number to assign.
    next_pr_number: u64,
    /// Methods to fail on (for testing error paths).
    fail_on: Vec<FailOn>,
    /// Recorded operations for verification.
    operations: Vec<MockOperation>,
}

/// Configuration for which operation should fail.
#[derive(Debug, Clone)]
pub enum FailOn {
    RateLimit(ForgeError),
    Repository(ForgeError),
    FindOpenPr(ForgeError),
    CreatePr(ForgeError),
    UpdatePr(ForgeError),
    GetIssue(ForgeError),
    CheckAssignee(ForgeError),
    AddAssignees(ForgeError),
    AddLabels(ForgeError),
    RequestedReviewers(ForgeError),
    RequestReviewers(ForgeError),
}

impl FailOn {
    fn matches(&self, op: &str) -> Option<ForgeError> {
        let (name, err) = match self {
            FailOn::RateLimit(e) => ("rate_limit", e),
            FailOn::Repository(e) => ("repository", e),
            FailOn::FindOpenPr(e) => ("find_open_pr", e),
            FailOn::CreatePr(e) => ("create_pr", e),
            FailOn::UpdatePr(e) => ("update_pr", e),
            FailOn::GetIssue(e) => ("get_issue", e),
            FailOn::CheckAssignee(e) => ("check_assignee", e),
            FailOn::AddAssignees(e) => ("add_assignees", e),
            FailOn::AddLabels(e) => ("add_labels", e),
            FailOn::RequestedReviewers(e) => ("requested_reviewers", e),
            FailOn::RequestReviewers(e) => ("request_reviewers", e),
        };
        (name == op).then(|| err.clone())
    }
}

/// Recorded operation for test verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOperation {
    RateLimit,
    Repository,
    FindOpenPr { head: String, base: String },
    CreatePr { head: String, base: String, title: String },
    UpdatePr { number: u64, title: Option<String>, body: Option<String> },
    GetIssue { number: u64 },
    CheckAssignee { login: String },
    AddAssignees { number: u64, logins: Vec<String> },
    AddLabels { number: u64, labels: Vec<String> },
    RequestedReviewers { number: u64 },
    RequestReviewers { number: u64, users: Vec<String>, teams: Vec<String> },
}

impl MockForge {
    /// Create a new empty mock forge with push permission on `owner/repo`.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockForgeInner {
                prs: HashMap::new(),
                issues: HashMap::new(),
                reviewers: HashMap::new(),
                assignable: None,
                repository: RepositoryInfo {
                    full_name: "owner/repo".to_string(),
                    default_branch: "main".to_string(),
                    can_push: true,
                },
                rate_limit_delay: None,
                next_pr_number: 1,
                fail_on: Vec::new(),
                operations: Vec::new(),
            })),
        }
    }

    /// Create a mock forge with pre-existing PRs.
    pub fn with_prs(prs: Vec<PullRequest>) -> Self {
        let forge = Self::new();
        {
            let mut inner = forge.inner.lock().unwrap();
            inner.next_pr_number = prs.iter().map(|p| p.number).max().unwrap_or(0) + 1;
            for pr in prs {
                inner.issues.insert(
                    pr.number,
                    Issue {
                        number: pr.number,
                        ..Issue::default()
                    },
                );
                inner.prs.insert(pr.number, pr);
            }
        }
        forge
    }

    /// Configure the mock to fail on a specific operation.
    ///
    /// May be called repeatedly to fail several operations.
    ///
    /// # Example
    ///
    /// ```
    /// use pull_detached::forge::mock::{MockForge, FailOn};
    /// use pull_detached::forge::ForgeError;
    ///
    /// let forge = MockForge::new()
    ///     .fail_on(FailOn::CreatePr(ForgeError::RateLimited));
    /// ```
    pub fn fail_on(self, fail_on: FailOn) -> Self {
        self.inner.lock().unwrap().fail_on.push(fail_on);
        self
    }

    /// Replace the repository returned by `repository()`.
    pub fn with_repository(self, repository: RepositoryInfo) -> Self {
        self.inner.lock().unwrap().repository = repository;
        self
    }

    /// Restrict which logins count as valid assignees.
    pub fn with_assignable<I, S>(self, logins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.lock().unwrap().assignable = Some(logins.into_iter().map(Into::into).collect());
        self
    }

    /// Make `rate_limit()` sleep before answering.
    pub fn with_rate_limit_delay(self, delay: Duration) -> Self {
        self.inner.lock().unwrap().rate_limit_delay = Some(delay);
        self
    }

    /// Clear the failure configuration.
    pub fn clear_fail_on(&self) {
        self.inner.lock().unwrap().fail_on.clear();
    }

    /// Get all recorded operations.
    pub fn operations(&self) -> Vec<MockOperation> {
        self.inner.lock().unwrap().operations.clone()
    }

    /// Clear recorded operations.
    pub fn clear_operations(&self) {
        self.inner.lock().unwrap().operations.clear();
    }

    /// All stored PRs, ordered by number.
    pub fn all_prs(&self) -> Vec<PullRequest> {
        let inner = self.inner.lock().unwrap();
        let mut prs: Vec<_> = inner.prs.values().cloned().collect();
        prs.sort_by_key(|p| p.number);
        prs
    }

    /// Issue metadata of PR `number`.
    pub fn issue_sync(&self, number: u64) -> Option<Issue> {
        self.inner.lock().unwrap().issues.get(&number).cloned()
    }

    /// Reviewers requested on PR `number`.
    pub fn reviewers_sync(&self, number: u64) -> Reviewers {
        self.inner
            .lock()
            .unwrap()
            .reviewers
            .get(&number)
            .cloned()
            .unwrap_or_default()
    }

    fn record(&self, op: MockOperation) {
        self.inner.lock().unwrap().operations.push(op);
    }

    fn check_fail(&self, op: &str) -> Result<(), ForgeError> {
        let inner = self.inner.lock().unwrap();
        match inner.fail_on.iter().find_map(|f| f.matches(op)) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn require_pr(inner: &MockForgeInner, number: u64) -> Result<(), ForgeError> {
        if inner.prs.contains_key(&number) {
            Ok(())
        } else {
            Err(ForgeError::NotFound(format!("PR #{} not found", number)))
        }
    }
}

impl Default for MockForge {
    fn default() -> Self {
        Self::new()
    }
}

/// Append `new` to `existing`, skipping entries already present.
fn merge_unique(existing: &mut Vec<String>, new: &[String]) {
    for item in new {
        if !existing.contains(item) {
            existing.push(item.clone());
        }
    }
}

#[async_trait]
impl Forge for MockForge {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn rate_limit(&self) -> Result<RateLimit, ForgeError> {
        self.record(MockOperation::RateLimit);
        let delay = self.inner.lock().unwrap().rate_limit_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_fail("rate_limit")?;

        Ok(RateLimit {
            limit: 5000,
            remaining: 4999,
            reset: Utc
                .timestamp_opt(1_700_000_000, 0)
                .single()
                .unwrap_or_default(),
        })
    }

    async fn repository(&self) -> Result<RepositoryInfo, ForgeError> {
        self.record(MockOperation::Repository);
        self.check_fail("repository")?;
        Ok(self.inner.lock().unwrap().repository.clone())
    }

    async fn find_open_pr(
        &self,
        head: &str,
        base: &str,
    ) -> Result<Option<PullRequest>, ForgeError> {
        self.record(MockOperation::FindOpenPr {
            head: head.to_string(),
            base: base.to_string(),
        });
        self.check_fail("find_open_pr")?;

        let inner = self.inner.lock().unwrap();
        let mut open: Vec<_> = inner
            .prs
            .values()
            .filter(|pr| pr.is_open && pr.head == head && pr.base == base)
            .cloned()
            .collect();
        open.sort_by_key(|pr| pr.number);
        Ok(open.into_iter().next())
    }

    async fn create_pr(&self, request: CreatePrRequest) -> Result<PullRequest, ForgeError> {
        self.record(MockOperation::CreatePr {
            head: request.head.clone(),
            base: request.base.clone(),
            title: request.title.clone(),
        });
        self.check_fail("create_pr")?;

        let mut inner = self.inner.lock().unwrap();
        if inner
            .prs
            .values()
            .any(|pr| pr.is_open && pr.head == request.head && pr.base == request.base)
        {
            return Err(ForgeError::ApiError {
                status: 422,
                message: format!("A pull request already exists for {}", request.head),
            });
        }

        let number = inner.next_pr_number;
        inner.next_pr_number += 1;

        let pr = PullRequest {
            number,
            url: format!("https://github.com/owner/repo/pull/{}", number),
            is_open: true,
            head: request.head,
            base: request.base,
            title: request.title,
            body: request.body,
        };
        inner.prs.insert(number, pr.clone());
        inner.issues.insert(
            number,
            Issue {
                number,
                ..Issue::default()
            },
        );
        Ok(pr)
    }

    async fn update_pr(&self, request: UpdatePrRequest) -> Result<PullRequest, ForgeError> {
        self.record(MockOperation::UpdatePr {
            number: request.number,
            title: request.title.clone(),
            body: request.body.clone(),
        });
        self.check_fail("update_pr")?;

        let mut inner = self.inner.lock().unwrap();
        let pr = inner
            .prs
            .get_mut(&request.number)
            .ok_or_else(|| ForgeError::NotFound(format!("PR #{} not found", request.number)))?;

        if let Some(title) = request.title {
            pr.title = title;
        }
        if let Some(body) = request.body {
            pr.body = Some(body);
        }
        Ok(pr.clone())
    }

    async fn get_issue(&self, number: u64) -> Result<Issue, ForgeError> {
        self.record(MockOperation::GetIssue { number });
        self.check_fail("get_issue")?;

        let inner = self.inner.lock().unwrap();
        Self::require_pr(&inner, number)?;
        Ok(inner.issues.get(&number).cloned().unwrap_or(Issue {
            number,
            ..Issue::default()
        }))
    }

    async fn check_assignee(&self, login: &str) -> Result<bool, ForgeError> {
        self.record(MockOperation::CheckAssignee {
            login: login.to_string(),
        });
        self.check_fail("check_assignee")?;

        let inner = self.inner.lock().unwrap();
        Ok(inner
            .assignable
            .as_ref()
            .map_or(true, |set| set.contains(login)))
    }

    async fn add_assignees(
        &self,
        number: u64,
        logins: &[String],
    ) -> Result<Vec<String>, ForgeError> {
        self.record(MockOperation::AddAssignees {
            number,
            logins: logins.to_vec(),
        });
        self.check_fail("add_assignees")?;

        let mut inner = self.inner.lock().unwrap();
        Self::require_pr(&inner, number)?;
        let issue = inner.issues.entry(number).or_insert_with(|| Issue {
            number,
            ..Issue::default()
        });
        merge_unique(&mut issue.assignees, logins);
        Ok(issue.assignees.clone())
    }

    async fn add_labels(&self, number: u64, labels: &[String]) -> Result<Vec<String>, ForgeError> {
        self.record(MockOperation::AddLabels {
            number,
            labels: labels.to_vec(),
        });
        self.check_fail("add_labels")?;

        let mut inner = self.inner.lock().unwrap();
        Self::require_pr(&inner, number)?;
        let issue = inner.issues.entry(number).or_insert_with(|| Issue {
            number,
            ..Issue::default()
        });
        merge_unique(&mut issue.labels, labels);
        Ok(issue.labels.clone())
    }

    async fn requested_reviewers(&self, number: u64) -> Result<Reviewers, ForgeError> {
        self.record(MockOperation::RequestedReviewers { number });
        self.check_fail("requested_reviewers")?;

        let inner = self.inner.lock().unwrap();
        Self::require_pr(&inner, number)?;
        Ok(inner.reviewers.get(&number).cloned().unwrap_or_default())
    }

    async fn request_reviewers(
        &self,
        number: u64,
        reviewers: Reviewers,
    ) -> Result<Reviewers, ForgeError> {
        self.record(MockOperation::RequestReviewers {
            number,
            users: reviewers.users.clone(),
            teams: reviewers.teams.clone(),
        });
        self.check_fail("request_reviewers")?;

        let mut inner = self.inner.lock().unwrap();
        Self::require_pr(&inner, number)?;
        let current = inner.reviewers.entry(number).or_default();
        merge_unique(&mut current.users, &reviewers.users);
        merge_unique(&mut current.teams, &reviewers.teams);
        Ok(current.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_request(head: &str) -> CreatePrRequest {
        CreatePrRequest {
            head: head.to_string(),
            base: "main".to_string(),
            title: format!("Update {}", head),
            body: Some("body".to_string()),
        }
    }

    #[tokio::test]
    async fn create_pr_assigns_sequential_numbers() {
        let forge = MockForge::new();
        let first = forge.create_pr(create_request("a")).await.unwrap();
        let second = forge.create_pr(create_request("b")).await.unwrap();
        assert_eq!(first.number, 1);
        assert_eq!(second.number, 2);
    }

    #[tokio::test]
    async fn duplicate_open_pr_is_rejected() {
        let forge = MockForge::new();
        forge.create_pr(create_request("a")).await.unwrap();
        let err = forge.create_pr(create_request("a")).await.unwrap_err();
        assert!(matches!(err, ForgeError::ApiError { status: 422, .. }));
    }

    #[tokio::test]
    async fn find_open_pr_matches_head_and_base() {
        let forge = MockForge::new();
        forge.create_pr(create_request("a")).await.unwrap();

        assert!(forge.find_open_pr("a", "main").await.unwrap().is_some());
        assert!(forge.find_open_pr("a", "dev").await.unwrap().is_none());
        assert!(forge.find_open_pr("b", "main").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn find_open_pr_skips_closed() {
        let forge = MockForge::with_prs(vec![PullRequest {
            number: 9,
            url: "u".into(),
            is_open: false,
            head: "a".into(),
            base: "main".into(),
            title: "t".into(),
            body: None,
        }]);
        assert!(forge.find_open_pr("a", "main").await.unwrap().is_none());

        let pr = forge.create_pr(create_request("a")).await.unwrap();
        assert_eq!(pr.number, 10);
    }

    #[tokio::test]
    async fn update_pr_changes_body_only() {
        let forge = MockForge::new();
        let pr = forge.create_pr(create_request("a")).await.unwrap();

        let updated = forge
            .update_pr(UpdatePrRequest {
                number: pr.number,
                body: Some("new".into()),
                ..UpdatePrRequest::default()
            })
            .await
            .unwrap();
        assert_eq!(updated.title, "Update a");
        assert_eq!(updated.body.as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn update_missing_pr_is_not_found() {
        let forge = MockForge::new();
        let err = forge
            .update_pr(UpdatePrRequest {
                number: 3,
                ..UpdatePrRequest::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::NotFound(_)));
    }

    #[tokio::test]
    async fn assignees_and_labels_accumulate() {
        let forge = MockForge::new();
        let pr = forge.create_pr(create_request("a")).await.unwrap();

        forge.add_assignees(pr.number, &["x".into()]).await.unwrap();
        let assignees = forge
            .add_assignees(pr.number, &["x".into(), "y".into()])
            .await
            .unwrap();
        assert_eq!(assignees, vec!["x", "y"]);

        let labels = forge.add_labels(pr.number, &["deps".into()]).await.unwrap();
        assert_eq!(labels, vec!["deps"]);
        assert_eq!(forge.get_issue(pr.number).await.unwrap().labels, vec!["deps"]);
    }

    #[tokio::test]
    async fn check_assignee_honours_restriction() {
        let forge = MockForge::new().with_assignable(["alice"]);
        assert!(forge.check_assignee("alice").await.unwrap());
        assert!(!forge.check_assignee("mallory").await.unwrap());
    }

    #[tokio::test]
    async fn reviewers_accumulate() {
        let forge = MockForge::new();
        let pr = forge.create_pr(create_request("a")).await.unwrap();

        let result = forge
            .request_reviewers(
                pr.number,
                Reviewers {
                    users: vec!["bob".into()],
                    teams: vec!["core".into()],
                },
            )
            .await
            .unwrap();
        assert_eq!(result.users, vec!["bob"]);
        assert_eq!(forge.requested_reviewers(pr.number).await.unwrap(), result);
    }

    #[tokio::test]
    async fn fail_on_targets_one_operation() {
        let forge = MockForge::new().fail_on(FailOn::AddLabels(ForgeError::RateLimited));
        let pr = forge.create_pr(create_request("a")).await.unwrap();

        assert!(forge.add_assignees(pr.number, &["x".into()]).await.is_ok());
        assert!(matches!(
            forge.add_labels(pr.number, &["l".into()]).await,
            Err(ForgeError::RateLimited)
        ));

        forge.clear_fail_on();
        assert!(forge.add_labels(pr.number, &["l".into()]).await.is_ok());
    }

    #[tokio::test]
    async fn operations_recorded() {
        let forge = MockForge::new();
        forge.rate_limit().await.unwrap();
        forge.repository().await.unwrap();

        assert_eq!(
            forge.operations(),
            vec![MockOperation::RateLimit, MockOperation::Repository]
        );
        forge.clear_operations();
        assert!(forge.operations().is_empty());
    }

    #[test]
    fn forge_name() {
        assert_eq!(MockForge::new().name(), "mock");
    }
}
