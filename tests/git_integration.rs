//! Integration tests for the git2 backend.
//!
//! These run against real repositories created with the git CLI in a temp
//! directory; upstream and home are plain local paths.

mod common;

use common::{commit_file, run_git, Sandbox, TEST_EMAIL};
use pull_detached::core::credentials::Credentials;
use pull_detached::core::types::{Identity, Oid};
use pull_detached::git::{Git, GitError, RebaseOutcome, RemoteInfo, VcsBackend};

fn identity() -> Identity {
    Identity::new("sync-bot", "sync-bot@example.com").unwrap()
}

fn clone_work(sandbox: &Sandbox) -> Git {
    Git::clone_repo(&sandbox.home_url(), &sandbox.work(), &Credentials::None).unwrap()
}

fn oid(hex: &str) -> Oid {
    Oid::new(hex).unwrap()
}

// =============================================================================
// Opening and Cloning
// =============================================================================

mod opening {
    use super::*;

    #[test]
    fn clone_checks_out_default_branch() {
        let sandbox = Sandbox::new();
        let git = clone_work(&sandbox);

        assert_eq!(git.work_dir().unwrap(), sandbox.work());
        assert!(sandbox.work().join("home.txt").exists());
        assert_eq!(
            run_git(&sandbox.work(), &["symbolic-ref", "HEAD"]),
            "refs/heads/main"
        );
    }

    #[test]
    fn open_missing_directory_is_not_a_repo() {
        let sandbox = Sandbox::new();
        let err = Git::open(&sandbox.work()).unwrap_err();
        assert!(matches!(err, GitError::NotARepo { .. }));
    }

    #[test]
    fn open_existing_clone() {
        let sandbox = Sandbox::new();
        sandbox.clone_work();

        let git = Git::open(&sandbox.work()).unwrap();
        let head = git.try_resolve_ref("refs/heads/main").unwrap();
        assert_eq!(head.unwrap().as_str(), sandbox.home_tip("main").unwrap());
    }

    #[test]
    fn default_branch_follows_remote_head() {
        let sandbox = Sandbox::new();
        assert_eq!(
            Git::remote_default_branch(&sandbox.upstream_url(), &Credentials::None).unwrap(),
            "main"
        );

        run_git(&sandbox.upstream(), &["checkout", "-b", "develop"]);
        sandbox.commit_upstream("dev.txt", "dev\n", "Develop commit");
        assert_eq!(
            Git::remote_default_branch(&sandbox.upstream_url(), &Credentials::None).unwrap(),
            "develop"
        );
    }
}

// =============================================================================
// Remotes
// =============================================================================

mod remotes {
    use super::*;

    #[test]
    fn clone_has_origin() {
        let sandbox = Sandbox::new();
        let git = clone_work(&sandbox);

        assert_eq!(
            git.remotes().unwrap(),
            vec![RemoteInfo {
                name: "origin".into(),
                url: Some(sandbox.home_url()),
            }]
        );
    }

    #[test]
    fn add_then_remove() {
        let sandbox = Sandbox::new();
        let git = clone_work(&sandbox);

        git.add_remote("up", &sandbox.upstream_url()).unwrap();
        assert_eq!(git.remote_url("up").unwrap(), Some(sandbox.upstream_url()));
        assert_eq!(sandbox.work_remotes(), vec!["origin", "up"]);

        git.remove_remote("up").unwrap();
        assert_eq!(git.remote_url("up").unwrap(), None);
        assert_eq!(sandbox.work_remotes(), vec!["origin"]);
    }

    #[test]
    fn removing_unknown_remote_fails() {
        let sandbox = Sandbox::new();
        let git = clone_work(&sandbox);

        let err = git.remove_remote("nope").unwrap_err();
        assert!(matches!(err, GitError::RemoteNotFound { name } if name == "nope"));
    }

    #[test]
    fn fetch_creates_remote_tracking_refs() {
        let sandbox = Sandbox::new();
        let git = clone_work(&sandbox);
        git.add_remote("up", &sandbox.upstream_url()).unwrap();

        assert_eq!(git.try_resolve_ref("refs/remotes/up/main").unwrap(), None);
        git.fetch("up", &Credentials::None).unwrap();
        assert_eq!(
            git.try_resolve_ref("refs/remotes/up/main").unwrap(),
            Some(oid(&sandbox.upstream_tip()))
        );
    }

    #[test]
    fn removing_remote_drops_its_refs() {
        let sandbox = Sandbox::new();
        let git = clone_work(&sandbox);
        git.add_remote("up", &sandbox.upstream_url()).unwrap();
        git.fetch("up", &Credentials::None).unwrap();

        git.remove_remote("up").unwrap();
        assert_eq!(git.try_resolve_ref("refs/remotes/up/main").unwrap(), None);
    }

    #[test]
    fn fetch_unknown_remote_fails() {
        let sandbox = Sandbox::new();
        let git = clone_work(&sandbox);

        let err = git.fetch("nope", &Credentials::None).unwrap_err();
        assert!(matches!(err, GitError::RemoteNotFound { .. }));
    }
}

// =============================================================================
// Branches and Reachability
// =============================================================================

mod branches {
    use super::*;

    #[test]
    fn create_and_checkout() {
        let sandbox = Sandbox::new();
        let git = clone_work(&sandbox);
        let main = sandbox.home_tip("main").unwrap();

        git.create_branch("feature/x", &oid(&main)).unwrap();
        git.checkout_branch("feature/x").unwrap();

        assert_eq!(
            run_git(&sandbox.work(), &["symbolic-ref", "HEAD"]),
            "refs/heads/feature/x"
        );
        assert_eq!(sandbox.work_tip("feature/x"), main);
    }

    #[test]
    fn checkout_switches_working_tree() {
        let sandbox = Sandbox::new();
        let git = clone_work(&sandbox);
        git.add_remote("up", &sandbox.upstream_url()).unwrap();
        git.fetch("up", &Credentials::None).unwrap();

        git.create_branch("sync", &oid(&sandbox.upstream_tip())).unwrap();
        git.checkout_branch("sync").unwrap();

        assert!(sandbox.work().join("upstream.txt").exists());
        assert!(!sandbox.work().join("home.txt").exists());
    }

    #[test]
    fn commits_between_unrelated_histories() {
        let sandbox = Sandbox::new();
        sandbox.commit_upstream("upstream.txt", "two\n", "Second upstream commit");
        let git = clone_work(&sandbox);
        git.add_remote("up", &sandbox.upstream_url()).unwrap();
        git.fetch("up", &Credentials::None).unwrap();

        let upstream = oid(&sandbox.upstream_tip());
        let main = oid(&sandbox.home_tip("main").unwrap());

        let commits = git.commits_between(&upstream, &main).unwrap();
        let summaries: Vec<_> = commits.iter().map(|c| c.summary.as_str()).collect();
        assert_eq!(summaries, vec!["Second upstream commit", "Upstream initial commit"]);

        assert!(git.commits_between(&upstream, &upstream).unwrap().is_empty());
    }

    #[test]
    fn tracking_configuration() {
        let sandbox = Sandbox::new();
        let git = clone_work(&sandbox);
        git.create_branch("sync", &oid(&sandbox.home_tip("main").unwrap()))
            .unwrap();

        assert_eq!(git.branch_remote("sync").unwrap(), None);
        git.set_branch_remote("sync", "origin").unwrap();
        assert_eq!(git.branch_remote("sync").unwrap(), Some("origin".into()));
        assert_eq!(
            run_git(&sandbox.work(), &["config", "branch.sync.merge"]),
            "refs/heads/sync"
        );
    }

    #[test]
    fn push_publishes_branch() {
        let sandbox = Sandbox::new();
        let git = clone_work(&sandbox);
        git.add_remote("up", &sandbox.upstream_url()).unwrap();
        git.fetch("up", &Credentials::None).unwrap();
        git.create_branch("sync", &oid(&sandbox.upstream_tip())).unwrap();

        git.push_branch("origin", "sync", &Credentials::None).unwrap();
        assert_eq!(sandbox.home_tip("sync"), Some(sandbox.upstream_tip()));
    }
}

// =============================================================================
// Rebase
// =============================================================================

mod rebase {
    use super::*;

    /// Work repo with branch `sync` at the first upstream commit plus one
    /// local commit writing `file`. Returns the backend and the local tip.
    fn diverged(sandbox: &Sandbox, file: &str) -> (Git, String) {
        let git = clone_work(sandbox);
        git.add_remote("up", &sandbox.upstream_url()).unwrap();
        git.fetch("up", &Credentials::None).unwrap();
        git.create_branch("sync", &oid(&sandbox.upstream_tip())).unwrap();
        git.checkout_branch("sync").unwrap();
        let local = commit_file(&sandbox.work(), file, "local\n", "Local change");
        (git, local)
    }

    #[test]
    fn replays_local_commits_onto_new_tip() {
        let sandbox = Sandbox::new();
        let (git, local) = diverged(&sandbox, "local.txt");
        let tip = sandbox.commit_upstream("upstream.txt", "two\n", "Upstream change");
        git.fetch("up", &Credentials::None).unwrap();

        let outcome = git.rebase("sync", &oid(&tip), &identity()).unwrap();
        assert_eq!(outcome, RebaseOutcome::Complete { steps: 1 });

        let work = sandbox.work();
        assert_ne!(sandbox.work_tip("sync"), local);
        assert_eq!(run_git(&work, &["rev-parse", "sync^"]), tip);
        assert_eq!(run_git(&work, &["log", "-1", "--format=%ce", "sync"]), "sync-bot@example.com");
        assert_eq!(run_git(&work, &["log", "-1", "--format=%ae", "sync"]), TEST_EMAIL);
        assert_eq!(run_git(&work, &["symbolic-ref", "HEAD"]), "refs/heads/sync");
    }

    #[test]
    fn branch_behind_upstream_moves_to_tip() {
        let sandbox = Sandbox::new();
        let git = clone_work(&sandbox);
        git.add_remote("up", &sandbox.upstream_url()).unwrap();
        git.fetch("up", &Credentials::None).unwrap();
        git.create_branch("sync", &oid(&sandbox.upstream_tip())).unwrap();
        git.checkout_branch("sync").unwrap();

        let tip = sandbox.commit_upstream("upstream.txt", "two\n", "Upstream change");
        git.fetch("up", &Credentials::None).unwrap();

        let outcome = git.rebase("sync", &oid(&tip), &identity()).unwrap();
        assert_eq!(outcome, RebaseOutcome::Complete { steps: 0 });
        assert_eq!(sandbox.work_tip("sync"), tip);
    }

    #[test]
    fn conflict_aborts_and_restores_branch() {
        let sandbox = Sandbox::new();
        let (git, local) = diverged(&sandbox, "upstream.txt");
        let tip = sandbox.commit_upstream("upstream.txt", "two\n", "Conflicting upstream change");
        git.fetch("up", &Credentials::None).unwrap();

        let outcome = git.rebase("sync", &oid(&tip), &identity()).unwrap();
        assert!(!outcome.is_complete());
        assert!(matches!(outcome, RebaseOutcome::Aborted { steps: 0, .. }));

        let work = sandbox.work();
        assert_eq!(sandbox.work_tip("sync"), local);
        assert_eq!(run_git(&work, &["symbolic-ref", "HEAD"]), "refs/heads/sync");
        assert_eq!(run_git(&work, &["status", "--porcelain"]), "");
        assert_eq!(
            std::fs::read_to_string(work.join("upstream.txt")).unwrap(),
            "local\n"
        );
    }

    #[test]
    fn unknown_branch_is_an_error() {
        let sandbox = Sandbox::new();
        let git = clone_work(&sandbox);
        let main = oid(&sandbox.home_tip("main").unwrap());

        assert!(git.rebase("missing", &main, &identity()).is_err());
    }
}
