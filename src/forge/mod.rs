//! forge
//!
//! Abstraction for the forge hosting the home repository.
//!
//! # Architecture
//!
//! The `Forge` trait defines the interface for interacting with the hosting
//! service. The engine uses the [`create_forge`] factory function rather
//! than importing the GitHub implementation directly.
//!
//! - Forge calls happen only after the local branch work is done
//! - Forge failures never leave the working repository inconsistent
//!
//! # Modules
//!
//! - `traits`: Core `Forge` trait and request/response types
//! - [`github`]: GitHub REST implementation
//! - [`mock`]: Mock implementation for deterministic testing
//! - `factory`: Forge creation from the origin URL

mod factory;
pub mod github;
pub mod mock;
mod traits;

pub use factory::{create_forge, url_host};
pub use traits::*;
