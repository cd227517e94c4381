//! Dotted-string scopes with trailing-`*` wildcard matching.

use rustc_hash::FxHashSet;

/// True if `user_scope` grants `required`.
///
/// `*` grants anything. A trailing `*` segment wildcards every remaining
/// segment of `required` (so `a.b.*` grants `a.b.c`, `a.b.c.d`, ...).
/// Otherwise the scopes must match segment-for-segment.
#[must_use]
pub fn scope_matches(user_scope: &str, required: &str) -> bool {
    if user_scope == "*" {
        return true;
    }
    let user_segments: Vec<&str> = user_scope.split('.').collect();
    let required_segments: Vec<&str> = required.split('.').collect();

    if let Some((&last, prefix)) = user_segments.split_last() {
        if last == "*" {
            return prefix.len() <= required_segments.len()
                && prefix.iter().zip(required_segments.iter()).all(|(a, b)| a == b);
        }
    }
    user_segments == required_segments
}

/// True if any scope in `user_scopes` grants `required`.
#[must_use]
pub fn matches(user_scopes: &FxHashSet<String>, required: &str) -> bool {
    user_scopes.iter().any(|scope| scope_matches(scope, required))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(scopes: &[&str]) -> FxHashSet<String> {
        scopes.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn star_matches_any_scope() {
        assert!(matches(&set(&["*"]), "control-plane.node.manage"));
    }

    #[test]
    fn prefix_wildcard_matches_multi_segment_suffix() {
        assert!(matches(&set(&["a.*"]), "a.b.c"));
    }

    #[test]
    fn non_wildcard_requires_exact_match() {
        assert!(!matches(&set(&["a.b"]), "a.c"));
    }

    #[test]
    fn wildcard_prefix_must_still_match() {
        assert!(!matches(&set(&["auth.*"]), "control-plane.cluster.read"));
    }

    #[test]
    fn exact_scope_matches_itself() {
        assert!(matches(&set(&["control-plane.cluster.read"]), "control-plane.cluster.read"));
    }
}
