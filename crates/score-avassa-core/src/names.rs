use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Application name used when nothing usable survives sanitization.
pub const FALLBACK_NAME: &str = "app";

static INVALID_RE: OnceLock<Regex> = OnceLock::new();
static DASHES_RE: OnceLock<Regex> = OnceLock::new();
static NAME_RE: OnceLock<Regex> = OnceLock::new();

fn invalid_re() -> &'static Regex {
    INVALID_RE.get_or_init(|| Regex::new(r"[^a-z0-9-]").unwrap())
}

fn dashes_re() -> &'static Regex {
    DASHES_RE.get_or_init(|| Regex::new(r"-{2,}").unwrap())
}

fn name_re() -> &'static Regex {
    NAME_RE.get_or_init(|| Regex::new(r"^[a-z0-9]([a-z0-9\-]*[a-z0-9])?$").unwrap())
}

/// Whether `name` is already a valid Avassa application name.
pub fn is_valid_name(name: &str) -> bool {
    name_re().is_match(name)
}

/// Turn an arbitrary workload name into a valid application name.
///
/// Lowercases, replaces anything outside `[a-z0-9-]` with `-`, collapses runs
/// of `-`, and trims leading and trailing `-`.
pub fn sanitize_name(input: &str) -> String {
    let lowered = input.trim().to_lowercase();
    let replaced = invalid_re().replace_all(&lowered, "-");
    let collapsed = dashes_re().replace_all(&replaced, "-");
    let trimmed = collapsed.trim_matches('-');
    if trimmed.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Reserve `base` in `taken`, or the first of `base-2`, `base-3`, ... that is
/// still free.
pub fn claim_unique(base: String, taken: &mut BTreeSet<String>) -> String {
    let mut name = base.clone();
    let mut n = 2;
    while taken.contains(&name) {
        name = format!("{base}-{n}");
        n += 1;
    }
    taken.insert(name.clone());
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_common_inputs() {
        for (input, expected) in [
            ("example", "example"),
            ("My App!!", "my-app"),
            ("  Hello__World  ", "hello-world"),
            ("--edge--", "edge"),
            ("a.b.c", "a-b-c"),
            ("ünïcode", "n-code"),
        ] {
            assert_eq!(sanitize_name(input), expected, "input: {input:?}");
        }
    }

    #[test]
    fn all_invalid_falls_back() {
        assert_eq!(sanitize_name("!!!"), FALLBACK_NAME);
        assert_eq!(sanitize_name(""), FALLBACK_NAME);
        assert_eq!(sanitize_name("---"), FALLBACK_NAME);
    }

    #[test]
    fn sanitized_names_are_valid() {
        for input in ["My App!!", "x", "9lives", "A--B"] {
            assert!(is_valid_name(&sanitize_name(input)), "input: {input:?}");
        }
        assert!(!is_valid_name("-bad"));
        assert!(!is_valid_name("Bad"));
    }

    #[test]
    fn claim_unique_skips_taken_suffixes() {
        let mut taken = BTreeSet::new();
        let names: Vec<String> = ["a", "a-2", "a"]
            .into_iter()
            .map(|n| claim_unique(n.to_string(), &mut taken))
            .collect();
        assert_eq!(names, vec!["a", "a-2", "a-3"]);
        assert_eq!(taken.len(), 3);
    }
}
