//! core
//!
//! Core domain types, schemas, and pure decision logic.
//!
//! # Modules
//!
//! - [`types`] - Strong types: Oid, CommitInfo, Identity
//! - [`refname`] - Branch name normalization
//! - [`config`] - Configuration schema and loading
//! - [`credentials`] - Credential values and the upstream decision table
//! - [`status`] - Per-run status report
//! - [`cleanup`] - Forced directory removal with bounded retries
//!
//! Nothing in here touches a repository or the network.

pub mod cleanup;
pub mod config;
pub mod credentials;
pub mod refname;
pub mod status;
pub mod types;
