//! forge::factory
//!
//! Forge selection and creation.
//!
//! The engine asks [`create_forge`] for a forge bound to the home
//! repository instead of constructing a `GitHubForge` itself. The home
//! repository must live on the configured forge host; an origin elsewhere is
//! rejected up front, before any repository work happens.
//!
//! # Example
//!
//! ```ignore
//! use pull_detached::forge::create_forge;
//!
//! let forge = create_forge(
//!     "https://github.com/owner/repo.git",
//!     "ghp_token",
//!     "https://github.com",
//!     "https://api.github.com",
//! )?;
//! ```

use std::sync::Arc;

use super::github::{parse_remote_url, GitHubForge};
use super::traits::{Forge, ForgeError};

/// Host part of an HTTP(S), `ssh://` or scp-style URL, lowercased.
pub fn url_host(url: &str) -> Option<String> {
    let url = url.trim();
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .or_else(|| url.strip_prefix("ssh://"));

    let host = match rest {
        Some(rest) => {
            let authority = rest.split('/').next()?;
            let authority = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
            authority.split(':').next()?
        }
        None => {
            let (user_host, _) = url.split_once(':')?;
            user_host.split_once('@')?.1
        }
    };

    (!host.is_empty()).then(|| host.to_ascii_lowercase())
}

/// Create a forge for the home repository at `origin_url`.
///
/// # Errors
///
/// - `ForgeError::NotFound` if `origin_url` is not on the host of `web_url`
///   or does not name an `owner/repo` pair
/// - `ForgeError::AuthRequired` if `token` is empty
pub fn create_forge(
    origin_url: &str,
    token: &str,
    web_url: &str,
    api_url: &str,
) -> Result<Arc<dyn Forge>, ForgeError> {
    if token.trim().is_empty() {
        return Err(ForgeError::AuthRequired);
    }

    let expected = url_host(web_url)
        .ok_or_else(|| ForgeError::NotFound(format!("invalid forge URL '{}'", web_url)))?;
    match url_host(origin_url) {
        Some(host) if host == expected => {}
        _ => {
            return Err(ForgeError::NotFound(format!(
                "origin '{}' is not hosted on {}",
                origin_url, expected
            )))
        }
    }

    let forge = GitHubForge::from_remote_url(origin_url, token, api_url).ok_or_else(|| {
        ForgeError::NotFound(format!(
            "cannot determine owner/repo from origin '{}'",
            origin_url
        ))
    })?;
    Ok(Arc::new(forge))
}
