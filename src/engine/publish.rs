//! engine::publish
//!
//! Pull request publication: finding or opening the PR, keeping its status
//! block current, and applying assignees, labels and reviewers.
//!
//! # Status block
//!
//! The PR body owns one region delimited by [`STATUS_START_MARKER`] and
//! [`STATUS_END_MARKER`]. Each run replaces that region and leaves every
//! byte outside it alone, so people can edit the rest of the description.
//!
//! # Metadata processors
//!
//! Assignees, labels and reviewers are independent sub-resources of the PR
//! and are processed concurrently. A failure in one is reported in its
//! [`StepOutcome`] and never stops the others.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::core::config::PrMetaConfig;
use crate::core::status::{StatusReport, StepOutcome};
use crate::forge::{CreatePrRequest, Forge, ForgeError, Issue, PullRequest, Reviewers, UpdatePrRequest};

pub const STATUS_START_MARKER: &str = "<span class='DON-NOT-MOFIY-automated-pr-status-start'/>";
pub const STATUS_END_MARKER: &str = "<span class='DON-NOT-MOFIY-automated-pr-status-end'/>";
pub const LEGACY_STATUS_START_MARKER: &str =
    "<span class='DON-NOT-MOFIY-automated-pullrequest-status-start'/>";
pub const LEGACY_STATUS_END_MARKER: &str =
    "<span class='DON-NOT-MOFIY-automated-pullrequest-status-end'/>";

/// Project page linked from the credits line.
pub const CREDITS_URL: &str = "https://github.com/litetex/pull-detached-remote";

/// How the status block is rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BodyOptions {
    pub hide_pr_status: bool,
    pub hide_credits: bool,
}

/// PR title for updates coming from `upstream_url`.
pub fn pr_title(upstream_url: &str) -> String {
    format!("UpstreamUpdate from {}", upstream_url)
}

/// Opening line of a newly created PR.
pub fn pr_intro(upstream_url: &str, upstream_branch: &str) -> String {
    format!(
        "Incoming upstream update from [{url}]({url})  *branch=``{branch}``*\n",
        url = upstream_url,
        branch = upstream_branch
    )
}

/// Content placed between the status markers.
pub fn status_block(report: &StatusReport, now: DateTime<Utc>, options: BodyOptions) -> String {
    let mut block = String::new();

    if !options.hide_pr_status {
        block.push_str(&format!(
            "<details><summary class='automated-pr-status'><b>Status [updated at {} UTC]</b></summary><p>\n\n```\n{}```\n</p></details>\n",
            now.format("%Y-%m-%d %H:%M:%S"),
            report.render()
        ));
    }

    if !options.hide_credits {
        block.push_str(&format!(
            "<sub>Automatically created by <a href=\"{}\">{}</a></sub>",
            CREDITS_URL,
            env!("CARGO_PKG_NAME")
        ));
    }

    block
}

/// Replace the status region of `body` with `block`.
///
/// Legacy markers are upgraded. Without a start marker the region is
/// appended; a start marker without an end marker claims the rest of the body.
pub fn splice_status_block(body: &str, block: &str) -> String {
    let body = body
        .replace(LEGACY_STATUS_START_MARKER, STATUS_START_MARKER)
        .replace(LEGACY_STATUS_END_MARKER, STATUS_END_MARKER);

    let (before, after) = match body.find(STATUS_START_MARKER) {
        Some(start) => {
            let rest = &body[start + STATUS_START_MARKER.len()..];
            let after = rest
                .find(STATUS_END_MARKER)
                .map_or("", |end| &rest[end + STATUS_END_MARKER.len()..]);
            (&body[..start], after)
        }
        None => (body.as_str(), ""),
    };

    format!(
        "{}{}\n{}\n{}{}",
        before, STATUS_START_MARKER, block, STATUS_END_MARKER, after
    )
}

/// Find the open PR from `head` into `base`, or open one.
///
/// Returns the PR and whether it was created by this call.
pub async fn ensure_pull_request(
    forge: &dyn Forge,
    head: &str,
    base: &str,
    upstream_url: &str,
    upstream_branch: &str,
) -> Result<(PullRequest, bool), ForgeError> {
    if let Some(pr) = forge.find_open_pr(head, base).await? {
        info!(number = pr.number, head, base, "pull request already exists");
        return Ok((pr, false));
    }

    info!(head, base, "creating pull request");
    let pr = forge
        .create_pr(CreatePrRequest {
            head: head.to_string(),
            base: base.to_string(),
            title: pr_title(upstream_url),
            body: Some(pr_intro(upstream_url, upstream_branch)),
        })
        .await?;
    info!(number = pr.number, url = %pr.url, "created pull request");
    Ok((pr, true))
}

/// Write the current status into the body of `pr`.
pub async fn update_pr_status(
    forge: &dyn Forge,
    pr: &PullRequest,
    report: &StatusReport,
    options: BodyOptions,
) -> Result<PullRequest, ForgeError> {
    let block = status_block(report, Utc::now(), options);
    let body = splice_status_block(pr.body.as_deref().unwrap_or(""), &block);

    info!(number = pr.number, "updating pull request status");
    forge
        .update_pr(UpdatePrRequest {
            number: pr.number,
            body: Some(body),
            ..UpdatePrRequest::default()
        })
        .await
}

/// Apply configured assignees, labels and reviewers to PR `number`.
///
/// Returns one outcome per processor, in that order.
pub async fn apply_pr_meta(
    forge: Arc<dyn Forge>,
    number: u64,
    meta: &PrMetaConfig,
) -> Vec<StepOutcome> {
    let mut issue_outcome = StepOutcome::default();
    let issue = if meta.assignees.is_empty() && meta.labels.is_empty() {
        None
    } else {
        match forge.get_issue(number).await {
            Ok(issue) => Some(issue),
            Err(e) => {
                error!(number, error = %e, "unable to load issue for pull request");
                issue_outcome.fail(format!("Unable to load PR #{}: {}", number, e));
                None
            }
        }
    };

    info!("waiting for post processing tasks of PR to end");
    let (assignees, labels, reviewers) = tokio::join!(
        process_assignees(Arc::clone(&forge), number, &meta.assignees, issue.as_ref()),
        process_labels(forge.as_ref(), number, &meta.labels, issue.as_ref()),
        process_reviewers(forge.as_ref(), number, &meta.reviewers),
    );
    info!("all PR post processing tasks are done");

    let mut outcomes = vec![assignees, labels, reviewers];
    if issue_outcome != StepOutcome::default() {
        outcomes.insert(0, issue_outcome);
    }
    outcomes
}

fn quoted(items: &[String]) -> String {
    items
        .iter()
        .map(|s| format!("'{}'", s))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Add assignees that are not yet assigned and are assignable.
pub async fn process_assignees(
    forge: Arc<dyn Forge>,
    number: u64,
    wanted: &[String],
    issue: Option<&Issue>,
) -> StepOutcome {
    let mut outcome = StepOutcome::default();
    let Some(issue) = issue.filter(|_| !wanted.is_empty()) else {
        info!("no assignees to add");
        return outcome;
    };

    let candidates: Vec<String> = wanted
        .iter()
        .filter(|login| {
            let assigned = issue.assignees.contains(login);
            if assigned {
                info!(assignee = %login, "already assigned");
            }
            !assigned
        })
        .cloned()
        .collect();
    if candidates.is_empty() {
        return outcome;
    }

    let mut checks = JoinSet::new();
    for login in candidates.iter().cloned() {
        let forge = Arc::clone(&forge);
        checks.spawn(async move {
            let result = forge.check_assignee(&login).await;
            (login, result)
        });
    }

    let mut valid = HashSet::new();
    while let Some(joined) = checks.join_next().await {
        match joined {
            Ok((login, Ok(true))) => {
                info!(assignee = %login, "valid assignee");
                valid.insert(login);
            }
            Ok((login, Ok(false))) => {
                let message = format!(
                    "Can not assign assignee '{}': does not belong to the repository",
                    login
                );
                warn!("{}", message);
                outcome.warn(message);
            }
            Ok((login, Err(e))) => {
                error!(assignee = %login, error = %e, "assignee check failed");
                outcome.fail(format!("Unable to check assignee '{}': {}", login, e));
            }
            Err(e) => {
                error!(error = %e, "assignee check task failed");
                outcome.fail(format!("Assignee check task failed: {}", e));
            }
        }
    }

    // Keep configured order
    let to_add: Vec<String> = candidates
        .into_iter()
        .filter(|login| valid.contains(login))
        .collect();
    if to_add.is_empty() {
        return outcome;
    }

    match forge.add_assignees(number, &to_add).await {
        Ok(assigned) => {
            for login in to_add.iter().filter(|l| !assigned.contains(l)) {
                let message = format!("Assignee '{}' was not added to PR", login);
                warn!("{}", message);
                outcome.warn(message);
            }
            info!("assignees of PR: [{}]", quoted(&assigned));
        }
        Err(e) => {
            error!(error = %e, "unable to add assignees");
            outcome.fail(format!("Unable to add assignees: {}", e));
        }
    }
    outcome
}

/// Add labels the PR does not carry yet.
pub async fn process_labels(
    forge: &dyn Forge,
    number: u64,
    wanted: &[String],
    issue: Option<&Issue>,
) -> StepOutcome {
    let mut outcome = StepOutcome::default();
    let Some(issue) = issue.filter(|_| !wanted.is_empty()) else {
        info!("no labels to add");
        return outcome;
    };

    let to_add: Vec<String> = wanted
        .iter()
        .filter(|label| !issue.labels.contains(label))
        .cloned()
        .collect();
    if to_add.is_empty() {
        info!("all labels already present");
        return outcome;
    }

    match forge.add_labels(number, &to_add).await {
        Ok(labels) => {
            for label in to_add.iter().filter(|l| !labels.contains(l)) {
                let message = format!("Label '{}' was not added to PR", label);
                warn!("{}", message);
                outcome.warn(message);
            }
            info!("labels of PR: [{}]", quoted(&labels));
        }
        Err(e) => {
            error!(error = %e, "unable to add labels");
            outcome.fail(format!("Unable to add labels: {}", e));
        }
    }
    outcome
}

/// Request reviews from users not already requested.
pub async fn process_reviewers(forge: &dyn Forge, number: u64, wanted: &[String]) -> StepOutcome {
    let mut outcome = StepOutcome::default();
    if wanted.is_empty() {
        info!("no reviewers to add");
        return outcome;
    }

    let existing = match forge.requested_reviewers(number).await {
        Ok(existing) => existing,
        Err(e) => {
            error!(error = %e, "unable to load requested reviewers");
            outcome.fail(format!("Unable to process reviewers: {}", e));
            return outcome;
        }
    };

    let to_add: Vec<String> = wanted
        .iter()
        .filter(|user| !existing.users.contains(user))
        .cloned()
        .collect();
    if to_add.is_empty() {
        info!("all reviewers already requested");
        return outcome;
    }

    let request = Reviewers {
        users: to_add.clone(),
        teams: Vec::new(),
    };
    match forge.request_reviewers(number, request).await {
        Ok(requested) => {
            for user in to_add.iter().filter(|u| !requested.users.contains(u)) {
                let message = format!("Reviewer '{}' was not added to PR", user);
                warn!("{}", message);
                outcome.warn(message);
            }
            info!("reviewers of PR: [{}]", quoted(&requested.users));
        }
        Err(e) => {
            error!(error = %e, "unable to request reviewers");
            outcome.fail(format!("Unable to process reviewers: {}", e));
        }
    }
    outcome
}
