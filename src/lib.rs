//! pull-detached - keep a branch in sync with a detached upstream repository
//!
//! Each run brings an integration branch in the home repository up to date
//! with a branch of an unrelated upstream repository and opens or refreshes
//! a pull request for it. It is meant to run repeatedly from CI.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface layer (parses args, runs the driver)
//! - [`engine`] - Reconciliation state machine, driver and PR publication
//! - [`core`] - Domain types, ref name normalization, configuration, status
//! - [`git`] - Single interface for all Git operations
//! - [`forge`] - Abstraction for the home forge (GitHub)
//! - [`telemetry`] - Logging setup
//!
//! # Correctness Invariants
//!
//! 1. Configuration and credential problems abort before any mutation
//! 2. The upstream remote is removed again on every exit path
//! 3. A failed rebase leaves the integration branch untouched
//! 4. Only the marked status region of a PR body is rewritten

pub mod cli;
pub mod core;
pub mod engine;
pub mod forge;
pub mod git;
pub mod telemetry;
