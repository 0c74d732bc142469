//! engine
//!
//! Reconciliation of the integration branch and publication of its PR.
//!
//! # Architecture
//!
//! - [`reconciler`]: the synchronous state machine that owns the working
//!   repository for one run
//! - [`driver`]: sequences the reconciler, the publication gate and the forge
//! - [`publish`]: PR body status block and PR metadata processors
//! - [`error`]: fatal error taxonomy
//!
//! # Invariants
//!
//! - Forge calls that mutate happen only after the local branch work is done
//! - The upstream remote never outlives a run
//! - Recoverable failures end up in the status report, not in an `Err`
//!
//! # Example
//!
//! ```ignore
//! use pull_detached::engine::ReconciliationDriver;
//!
//! let report = ReconciliationDriver::new(config).run().await?;
//! println!("{}", report.render());
//! ```

pub mod driver;
pub mod error;
pub mod publish;
pub mod reconciler;

pub use driver::{
    default_update_branch_name, plan_working_repo, resolve_update_branch, verify_forge,
    ReconciliationDriver, RepoPlan,
};
pub use error::SyncError;
pub use reconciler::{generate_remote_name, ReconcilerSettings, SyncReconciler, UpstreamBranch};
