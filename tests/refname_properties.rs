//! Property-based tests for branch name normalization.
//!
//! These tests use proptest to check that repairing a candidate always
//! converges on a valid name and never touches names that are already valid.

use proptest::prelude::*;

use pull_detached::core::refname::{fix, is_valid, RefName, RefNameError, Rule};

/// Characters that stress the rules: separators, dots, the `@{` pair and
/// every forbidden character, mixed with plain alphanumerics.
fn candidate_char() -> impl Strategy<Value = char> {
    prop_oneof![
        4 => prop::char::range('a', 'z'),
        1 => prop::char::range('0', '9'),
        2 => Just('/'),
        2 => Just('.'),
        1 => Just('@'),
        1 => Just('{'),
        1 => Just('-'),
        1 => prop::sample::select(vec![' ', '~', '^', ':', '?', '*', '[', '\\', '\t', '\u{7f}']),
    ]
}

fn candidate() -> impl Strategy<Value = String> {
    prop::collection::vec(candidate_char(), 0..40).prop_map(|chars| chars.into_iter().collect())
}

/// Names built only from characters no rule objects to on their own.
fn plain_name() -> impl Strategy<Value = String> {
    "[a-z0-9][a-z0-9_-]{0,10}(/[a-z0-9][a-z0-9_-]{0,10}){0,3}"
}

proptest! {
    #[test]
    fn repaired_names_are_valid(input in candidate()) {
        if let Ok(name) = fix(&input) {
            prop_assert!(is_valid(name.as_str()), "fix({:?}) = {:?}", input, name);
            for rule in Rule::ALL {
                prop_assert!(!rule.is_violated_by(name.as_str()));
            }
        }
    }

    #[test]
    fn repair_is_idempotent(input in candidate()) {
        if let Ok(name) = fix(&input) {
            prop_assert_eq!(fix(name.as_str()).unwrap(), name);
        }
    }

    #[test]
    fn repair_never_grows(input in candidate()) {
        if let Ok(name) = fix(&input) {
            prop_assert!(name.as_str().chars().count() <= input.chars().count());
        }
    }

    #[test]
    fn repair_fails_only_with_invalid_input(input in candidate()) {
        match fix(&input) {
            Ok(_) => {}
            Err(RefNameError::InvalidInput(_)) => {}
            Err(other) => prop_assert!(false, "unexpected error for {:?}: {:?}", input, other),
        }
    }

    #[test]
    fn valid_names_are_untouched(input in plain_name()) {
        prop_assert!(is_valid(&input));
        let fixed = fix(&input).unwrap();
        prop_assert_eq!(fixed.as_str(), input.as_str());
        let parsed = RefName::parse(&input).unwrap();
        prop_assert_eq!(parsed.as_str(), input.as_str());
    }

    #[test]
    fn parse_agrees_with_is_valid(input in candidate()) {
        prop_assert_eq!(RefName::parse(&input).is_ok(), is_valid(&input));
    }
}

// =============================================================================
// Known Vectors
// =============================================================================

#[test]
fn known_repairs() {
    let cases = [
        ("/b/", "b"),
        ("bad/.lock", "bad"),
        ("a/b.lock", "a/b"),
        (".hidden/x", "hidden/x"),
        ("a..b", "ab"),
        ("a....b", "ab"),
        ("we ird~na^me:?*[\\", "weirdname"),
        ("x@{y", "xy"),
        ("trailing.", "trailing"),
        ("//a//", "a"),
        ("upstreamupdate/git@example.org:o/r.git/main", "upstreamupdate/git@example.orgo/r.git/main"),
        ("feature/abc", "feature/abc"),
    ];

    for (input, expected) in cases {
        assert_eq!(fix(input).unwrap().as_str(), expected, "fix({:?})", input);
    }
}

#[test]
fn known_failures() {
    for input in ["", "   ", "@", "/", "..", "~^:"] {
        assert!(
            matches!(fix(input), Err(RefNameError::InvalidInput(_))),
            "fix({:?}) should fail",
            input
        );
    }
}
