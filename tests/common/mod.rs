//! Shared fixtures for the integration tests.
//!
//! A [`Sandbox`] holds three locations inside one temp directory:
//! - `upstream/`: a non-bare repository standing in for the detached upstream
//! - `home.git`: a bare repository standing in for the home repository
//! - `work/`: where the working repository gets cloned

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

pub const TEST_NAME: &str = "Test User";
pub const TEST_EMAIL: &str = "test@example.com";

/// Run git in `dir`, returning trimmed stdout. Panics on failure.
pub fn run_git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("failed to run git");

    if !output.status.success() {
        panic!(
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Run git in `dir`, returning `None` instead of panicking on failure.
pub fn try_git(dir: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("failed to run git");
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Initialize a non-bare repository at `path` whose first branch is `main`.
pub fn init_repo(path: &Path) {
    std::fs::create_dir_all(path).expect("failed to create repo dir");
    run_git(path, &["init"]);
    run_git(path, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    run_git(path, &["config", "user.email", TEST_EMAIL]);
    run_git(path, &["config", "user.name", TEST_NAME]);
}

/// Write `name` with `content` in `dir` and commit it. Returns the new HEAD.
pub fn commit_file(dir: &Path, name: &str, content: &str, message: &str) -> String {
    std::fs::write(dir.join(name), content).expect("failed to write file");
    run_git(dir, &["add", name]);
    run_git(
        dir,
        &[
            "-c",
            &format!("user.name={}", TEST_NAME),
            "-c",
            &format!("user.email={}", TEST_EMAIL),
            "commit",
            "-m",
            message,
        ],
    );
    run_git(dir, &["rev-parse", "HEAD"])
}

fn path_str(path: &Path) -> String {
    path.to_str().expect("temp path is not UTF-8").to_string()
}

/// Upstream, home and working locations for one test.
pub struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    /// Upstream and home repositories with unrelated histories.
    pub fn new() -> Self {
        let sandbox = Self::empty();
        sandbox.seed_upstream();

        let seed = sandbox.root().join("home-seed");
        init_repo(&seed);
        commit_file(&seed, "home.txt", "home\n", "Home initial commit");
        sandbox.bare_clone(&seed);
        sandbox
    }

    /// Home repository forked from upstream, so home `main` already holds
    /// every upstream commit.
    pub fn with_shared_history() -> Self {
        let sandbox = Self::empty();
        sandbox.seed_upstream();
        sandbox.bare_clone(&sandbox.upstream());
        sandbox
    }

    fn empty() -> Self {
        Self {
            dir: TempDir::new().expect("failed to create temp dir"),
        }
    }

    fn seed_upstream(&self) {
        init_repo(&self.upstream());
        commit_file(&self.upstream(), "upstream.txt", "one\n", "Upstream initial commit");
    }

    fn bare_clone(&self, source: &Path) {
        run_git(
            self.root(),
            &["clone", "--bare", &path_str(source), &path_str(&self.home())],
        );
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn upstream(&self) -> PathBuf {
        self.root().join("upstream")
    }

    pub fn home(&self) -> PathBuf {
        self.root().join("home.git")
    }

    pub fn work(&self) -> PathBuf {
        self.root().join("work")
    }

    pub fn upstream_url(&self) -> String {
        path_str(&self.upstream())
    }

    pub fn home_url(&self) -> String {
        path_str(&self.home())
    }

    /// Commit on the upstream's checked out branch. Returns the new tip.
    pub fn commit_upstream(&self, name: &str, content: &str, message: &str) -> String {
        commit_file(&self.upstream(), name, content, message)
    }

    /// Current tip of upstream `main`.
    pub fn upstream_tip(&self) -> String {
        run_git(&self.upstream(), &["rev-parse", "refs/heads/main"])
    }

    /// Tip of `branch` in the home repository, if it exists.
    pub fn home_tip(&self, branch: &str) -> Option<String> {
        try_git(
            &self.home(),
            &["rev-parse", "--verify", "--quiet", &format!("refs/heads/{}", branch)],
        )
    }

    /// Clone the home repository into the working location with git itself.
    pub fn clone_work(&self) {
        run_git(
            self.root(),
            &["clone", &self.home_url(), &path_str(&self.work())],
        );
    }

    /// Names of the remotes configured in the working repository.
    pub fn work_remotes(&self) -> Vec<String> {
        run_git(&self.work(), &["remote"])
            .lines()
            .map(String::from)
            .collect()
    }

    /// Tip of local `branch` in the working repository.
    pub fn work_tip(&self, branch: &str) -> String {
        run_git(&self.work(), &["rev-parse", &format!("refs/heads/{}", branch)])
    }
}
