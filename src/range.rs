//! npm range syntax on top of `semver`.
//!
//! npm separates comparators with whitespace and alternatives with `||`, and
//! supports inclusive hyphen ranges (`1.2.3 - 2.0`). A bare version is an exact
//! match or, when partial, an X-range. Each alternative is rewritten into a
//! Cargo-style [`VersionReq`] with the same meaning.

use semver::{Version, VersionReq};

const OPERATOR_CHARS: [char; 5] = ['<', '>', '=', '~', '^'];

#[derive(Debug, Clone)]
pub struct NpmRange {
    alternatives: Vec<VersionReq>,
}

impl NpmRange {
    /// Parse an npm range. `None` when any alternative is not a valid range.
    pub fn parse(range: &str) -> Option<Self> {
        let alternatives = range
            .split("||")
            .map(parse_comparator_set)
            .collect::<Option<Vec<_>>>()?;
        Some(Self { alternatives })
    }

    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| req.matches(version))
    }
}

fn parse_comparator_set(set: &str) -> Option<VersionReq> {
    let set = set.trim();

    let comparators = match set.split_once(" - ") {
        Some((low, high)) => {
            let (low, high) = (partial(low.trim()), partial(high.trim()));
            let mut bounds = Vec::new();
            if !low.is_empty() {
                bounds.push(format!(">={}", low));
            }
            // `<=1.2` already means `<1.3.0`, which is npm's partial upper bound.
            if !high.is_empty() {
                bounds.push(format!("<={}", high));
            }
            bounds
        }
        None => {
            let mut comparators = Vec::new();
            let mut pending_op = String::new();
            for token in set.split_whitespace() {
                // `>= 1.2.0` is written with a space in the wild
                if token.chars().all(|c| OPERATOR_CHARS.contains(&c)) {
                    pending_op.push_str(token);
                    continue;
                }
                let token = format!("{}{}", std::mem::take(&mut pending_op), token);
                comparators.extend(comparator(&token));
            }
            if !pending_op.is_empty() {
                return None;
            }
            comparators
        }
    };

    if comparators.is_empty() {
        return Some(VersionReq::STAR);
    }
    VersionReq::parse(&comparators.join(", ")).ok()
}

/// Rewrite one npm comparator; `None` when it places no constraint (`*`, `x`).
fn comparator(token: &str) -> Option<String> {
    let split = token
        .find(|c: char| !OPERATOR_CHARS.contains(&c))
        .unwrap_or(token.len());
    let (op, version) = token.split_at(split);
    let version = partial(version.trim_start_matches('v'));
    if version.is_empty() {
        return None;
    }

    let op = match op {
        "" => "=",
        "~>" => "~",
        other => other,
    };
    Some(format!("{}{}", op, version))
}

/// Drop wildcard components: `1.2.x` becomes `1.2`, `*` becomes empty.
fn partial(version: &str) -> String {
    version
        .split('.')
        .take_while(|part| !matches!(*part, "x" | "X" | "*" | ""))
        .collect::<Vec<_>>()
        .join(".")
}
