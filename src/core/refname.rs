//! core::refname
//!
//! Branch name normalization.
//!
//! # Overview
//!
//! Branch names come from user input or from the default
//! `upstreamupdate/<repo>/<branch>` derivation, and either may contain
//! characters or shapes that git refuses as a reference name. This module
//! repairs such candidates instead of rejecting them.
//!
//! # Rules
//!
//! Validity is a fixed, ordered table of [`Rule`]s. Each rule is a
//! predicate (the candidate violates it) plus a repair. The order matters:
//! rules run top to bottom within a pass, each one seeing the output of the
//! previous repair.
//!
//! | Rule | Violation | Repair |
//! |---|---|---|
//! | [`Rule::DotAtStart`] | contains `/` and starts with `.` | drop leading char |
//! | [`Rule::LockAtEnd`] | contains `/` and ends with `.lock` | drop trailing `.lock` |
//! | [`Rule::DoubleDot`] | contains `..` | delete first `..` |
//! | [`Rule::InvalidChar`] | control bytes, DEL, ` ~^:?*[\` | strip them all |
//! | [`Rule::LeadingSlash`] | starts with `/` | drop leading char |
//! | [`Rule::TrailingSlash`] | ends with `/` | drop trailing char |
//! | [`Rule::TrailingDot`] | ends with `.` | drop trailing char |
//! | [`Rule::AtBrace`] | contains `@{` | delete first `@{` |
//! | [`Rule::LoneAt`] | equals `@` | replace with empty |
//!
//! # Fixpoint
//!
//! [`fix`] repeats full passes until one makes no change. Every repair
//! strictly shortens the candidate, so the loop terminates; a repair that
//! leaves its input unchanged is reported as [`RefNameError::Unrepairable`]
//! rather than retried.
//!
//! # Example
//!
//! ```
//! use pull_detached::core::refname::{fix, is_valid};
//!
//! assert_eq!(fix("/b/").unwrap().as_str(), "b");
//! assert_eq!(fix("bad/.lock").unwrap().as_str(), "bad");
//! assert!(is_valid("feature/abc"));
//! assert!(fix("@").is_err());
//! ```

use std::fmt;

use thiserror::Error;

/// Errors from ref name normalization.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefNameError {
    /// The candidate is empty, whitespace-only, or repaired down to nothing.
    #[error("invalid ref name input: {0}")]
    InvalidInput(String),

    /// A repair did not change the candidate, so the rule can never be satisfied.
    #[error("ref name '{candidate}' cannot be repaired ({rule:?} made no progress)")]
    Unrepairable {
        /// The candidate at the point the repair stalled
        candidate: String,
        /// The rule whose repair stalled
        rule: Rule,
    },
}

/// A single reference naming rule.
///
/// The declaration order of the variants is the order in which they are
/// evaluated; see [`Rule::ALL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// A slash-separated name must not start with `.`.
    DotAtStart,
    /// A slash-separated name must not end with `.lock`.
    LockAtEnd,
    /// No `..` anywhere.
    DoubleDot,
    /// No control bytes, DEL, space, `~`, `^`, `:`, `?`, `*`, `[` or `\`.
    InvalidChar,
    /// Must not start with `/`.
    LeadingSlash,
    /// Must not end with `/`.
    TrailingSlash,
    /// Must not end with `.`.
    TrailingDot,
    /// No `@{` sequence.
    AtBrace,
    /// Must not be exactly `@`.
    LoneAt,
}

const LOCK_SUFFIX: &str = ".lock";

impl Rule {
    /// All rules in evaluation order.
    pub const ALL: [Rule; 9] = [
        Rule::DotAtStart,
        Rule::LockAtEnd,
        Rule::DoubleDot,
        Rule::InvalidChar,
        Rule::LeadingSlash,
        Rule::TrailingSlash,
        Rule::TrailingDot,
        Rule::AtBrace,
        Rule::LoneAt,
    ];

    /// Whether `name` violates this rule.
    pub fn is_violated_by(self, name: &str) -> bool {
        match self {
            Rule::DotAtStart => name.contains('/') && name.starts_with('.'),
            Rule::LockAtEnd => name.contains('/') && name.ends_with(LOCK_SUFFIX),
            Rule::DoubleDot => name.contains(".."),
            Rule::InvalidChar => name.chars().any(is_forbidden_char),
            Rule::LeadingSlash => name.starts_with('/'),
            Rule::TrailingSlash => name.ends_with('/'),
            Rule::TrailingDot => name.ends_with('.'),
            Rule::AtBrace => name.contains("@{"),
            Rule::LoneAt => name == "@",
        }
    }

    /// Apply this rule's repair to `name`.
    ///
    /// The repair is applied unconditionally; callers check
    /// [`is_violated_by`](Self::is_violated_by) first.
    pub fn repair(self, name: &str) -> String {
        match self {
            Rule::DotAtStart | Rule::LeadingSlash => drop_first_char(name),
            Rule::LockAtEnd => name
                .strip_suffix(LOCK_SUFFIX)
                .unwrap_or(name)
                .to_string(),
            Rule::DoubleDot => name.replacen("..", "", 1),
            Rule::InvalidChar => name.chars().filter(|c| !is_forbidden_char(*c)).collect(),
            Rule::TrailingSlash | Rule::TrailingDot => drop_last_char(name),
            Rule::AtBrace => name.replacen("@{", "", 1),
            Rule::LoneAt => String::new(),
        }
    }
}

fn is_forbidden_char(c: char) -> bool {
    c < '\u{20}' || matches!(c, '\u{7f}' | ' ' | '~' | '^' | ':' | '?' | '*' | '[' | '\\')
}

fn drop_first_char(s: &str) -> String {
    let mut chars = s.chars();
    chars.next();
    chars.as_str().to_string()
}

fn drop_last_char(s: &str) -> String {
    let mut chars = s.chars();
    chars.next_back();
    chars.as_str().to_string()
}

/// A branch name that satisfies every [`Rule`].
///
/// Only produced by [`fix`] (or [`RefName::parse`] for already-valid input),
/// so holding one is proof of validity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RefName(String);

impl RefName {
    /// Accept `name` only if it is already valid, without repairing it.
    pub fn parse(name: &str) -> Result<Self, RefNameError> {
        if is_valid(name) {
            Ok(Self(name.to_string()))
        } else {
            Err(RefNameError::InvalidInput(format!(
                "'{}' is not a valid ref name",
                name
            )))
        }
    }

    /// Get the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume and return the inner string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for RefName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for RefName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Check whether `candidate` already satisfies every rule.
///
/// Empty and whitespace-only strings are never valid.
pub fn is_valid(candidate: &str) -> bool {
    !candidate.trim().is_empty() && Rule::ALL.iter().all(|r| !r.is_violated_by(candidate))
}

/// Repair `candidate` into a valid [`RefName`].
///
/// # Errors
///
/// - [`RefNameError::InvalidInput`] if the candidate is empty or
///   whitespace-only, or if a repair reduces it to the empty string
/// - [`RefNameError::Unrepairable`] if a repair makes no progress
pub fn fix(candidate: &str) -> Result<RefName, RefNameError> {
    if candidate.trim().is_empty() {
        return Err(RefNameError::InvalidInput(
            "ref name must not be empty or whitespace".to_string(),
        ));
    }

    let mut current = candidate.to_string();
    loop {
        let mut changed = false;
        for rule in Rule::ALL {
            if !rule.is_violated_by(&current) {
                continue;
            }

            let repaired = rule.repair(&current);
            if repaired == current {
                return Err(RefNameError::Unrepairable {
                    candidate: current,
                    rule,
                });
            }
            if repaired.is_empty() {
                return Err(RefNameError::InvalidInput(format!(
                    "'{}' reduces to an empty ref name",
                    candidate
                )));
            }

            current = repaired;
            changed = true;
        }

        if !changed {
            return Ok(RefName(current));
        }
    }
}
