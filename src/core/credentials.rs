//! core::credentials
//!
//! Credential values handed to the git layer, and the decision table that
//! picks credentials for the upstream remote.
//!
//! | Mode | Upstream credentials |
//! |---|---|
//! | `auto` | forge token if the URL is on the home forge, else custom if a principal is set, else none |
//! | `none` | none |
//! | `github` | forge token |
//! | `custom` | principal + secret (secret defaults to empty) |

use super::config::{ConfigError, UpstreamCredentialsMode};

/// Username presented alongside a forge token over HTTPS.
pub const TOKEN_USERNAME: &str = "x-access-token";

/// Credentials for a single remote.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Anonymous access.
    None,
    /// Forge access token.
    Token(String),
    /// Explicit principal and secret.
    UserPass {
        /// Username or other principal
        principal: String,
        /// Password or access key
        secret: String,
    },
}

impl Credentials {
    /// The (username, password) pair for HTTP basic authentication.
    pub fn user_pass(&self) -> Option<(&str, &str)> {
        match self {
            Credentials::None => None,
            Credentials::Token(token) => Some((TOKEN_USERNAME, token.as_str())),
            Credentials::UserPass { principal, secret } => {
                Some((principal.as_str(), secret.as_str()))
            }
        }
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Credentials::None => "none",
            Credentials::Token(_) => "forge-token",
            Credentials::UserPass { .. } => "custom",
        }
    }
}

// Custom Debug to avoid exposing secrets
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::None => write!(f, "Credentials::None"),
            Credentials::Token(_) => write!(f, "Credentials::Token([REDACTED])"),
            Credentials::UserPass { principal, .. } => f
                .debug_struct("Credentials::UserPass")
                .field("principal", principal)
                .field("secret", &"[REDACTED]")
                .finish(),
        }
    }
}

/// Inputs to [`select_upstream_credentials`].
#[derive(Debug, Clone, Copy)]
pub struct CredentialInputs<'a> {
    /// Configured strategy
    pub mode: UpstreamCredentialsMode,
    /// Web URL of the home forge, e.g. `https://github.com/`
    pub forge_web_url: &'a str,
    /// Forge token used for the home remote
    pub forge_token: Option<&'a str>,
    /// Custom principal for the upstream remote
    pub principal: Option<&'a str>,
    /// Custom secret for the upstream remote
    pub secret: Option<&'a str>,
}

/// Pick credentials for the upstream remote at `upstream_url`.
///
/// # Errors
///
/// - `ConfigError::Missing` if the chosen strategy needs a token or
///   principal that is not configured
pub fn select_upstream_credentials(
    upstream_url: &str,
    inputs: &CredentialInputs<'_>,
) -> Result<Credentials, ConfigError> {
    match inputs.mode {
        UpstreamCredentialsMode::None => Ok(Credentials::None),
        UpstreamCredentialsMode::Github => forge_token(inputs),
        UpstreamCredentialsMode::Custom => custom(inputs),
        UpstreamCredentialsMode::Auto => {
            if is_on_forge(upstream_url, inputs.forge_web_url) {
                forge_token(inputs)
            } else if non_blank(inputs.principal).is_some() {
                custom(inputs)
            } else {
                Ok(Credentials::None)
            }
        }
    }
}

/// Whether `url` lives on the forge whose web root is `forge_web_url`.
pub fn is_on_forge(url: &str, forge_web_url: &str) -> bool {
    let root = forge_web_url.trim().to_ascii_lowercase();
    if root.is_empty() {
        return false;
    }
    let root = if root.ends_with('/') {
        root
    } else {
        format!("{}/", root)
    };
    url.trim().to_ascii_lowercase().starts_with(&root)
}

fn forge_token(inputs: &CredentialInputs<'_>) -> Result<Credentials, ConfigError> {
    non_blank(inputs.forge_token)
        .map(|t| Credentials::Token(t.to_string()))
        .ok_or_else(|| ConfigError::Missing("forge token for upstream credentials".into()))
}

fn custom(inputs: &CredentialInputs<'_>) -> Result<Credentials, ConfigError> {
    let principal = non_blank(inputs.principal).ok_or_else(|| {
        ConfigError::Missing("detached_creds_principal for custom upstream credentials".into())
    })?;
    Ok(Credentials::UserPass {
        principal: principal.to_string(),
        secret: inputs.secret.unwrap_or_default().to_string(),
    })
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
