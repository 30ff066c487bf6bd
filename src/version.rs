// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Version parsing and ordering (spec §4.1).
//!
//! Never fails: degrades through a tokenized comparison down to a
//! plain string comparison rather than returning an error.

use std::cmp::Ordering;

const PRERELEASE_MARKERS: &[&str] = &[
    "alpha", "beta", "rc", "pre", "dev", "snapshot", "nightly",
];

/// A best-effort SemVer parse: optional `v`/`V` prefix, 1-4 dotted
/// numeric components (missing ones are zero), an optional
/// dash-prefixed pre-release, an optional `+` build-metadata suffix
/// (ignored for ordering).
#[derive(Debug, Clone, PartialEq, Eq)]
struct SemverLike {
    core: [u64; 4],
    prerelease: Vec<PrereleaseId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PrereleaseId {
    Numeric(u64),
    Alphanumeric(String),
}

impl PrereleaseId {
    fn cmp_id(&self, other: &Self) -> Ordering {
        match (self, other) {
            (PrereleaseId::Numeric(a), PrereleaseId::Numeric(b)) => a.cmp(b),
            (PrereleaseId::Alphanumeric(a), PrereleaseId::Alphanumeric(b)) => a.cmp(b),
            // numeric identifiers always have lower precedence than
            // alphanumeric ones (SemVer spec item 11).
            (PrereleaseId::Numeric(_), PrereleaseId::Alphanumeric(_)) => Ordering::Less,
            (PrereleaseId::Alphanumeric(_), PrereleaseId::Numeric(_)) => Ordering::Greater,
        }
    }
}

fn parse_semver(raw: &str) -> Option<SemverLike> {
    let s = raw.strip_prefix(['v', 'V']).unwrap_or(raw);

    // Split off build metadata first; it plays no role in ordering.
    let s = s.split('+').next().unwrap_or(s);

    let (core_part, prerelease_part) = match s.split_once('-') {
        Some((core, pre)) => (core, Some(pre)),
        None => (s, None),
    };

    let core_tokens: Vec<&str> = core_part.split('.').collect();
    if core_tokens.is_empty() || core_tokens.len() > 4 || core_part.is_empty() {
        return None;
    }

    let mut core = [0u64; 4];
    for (i, tok) in core_tokens.iter().enumerate() {
        core[i] = tok.parse().ok()?;
    }

    let prerelease = match prerelease_part {
        None => vec![],
        Some(pre) => {
            if pre.is_empty() {
                return None;
            }
            pre.split('.')
                .map(|ident| {
                    if ident.is_empty() {
                        return None;
                    }
                    if ident.chars().all(|c| c.is_ascii_digit()) {
                        Some(PrereleaseId::Numeric(ident.parse().ok()?))
                    } else {
                        Some(PrereleaseId::Alphanumeric(ident.to_string()))
                    }
                })
                .collect::<Option<Vec<_>>>()?
        }
    };

    Some(SemverLike { core, prerelease })
}

fn compare_semver(a: &SemverLike, b: &SemverLike) -> Ordering {
    match a.core.cmp(&b.core) {
        Ordering::Equal => {}
        ord => return ord,
    }

    match (a.prerelease.is_empty(), b.prerelease.is_empty()) {
        (true, true) => Ordering::Equal,
        // no pre-release is greater than an otherwise-equal version with one.
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => {
            for (x, y) in a.prerelease.iter().zip(b.prerelease.iter()) {
                match x.cmp_id(y) {
                    Ordering::Equal => continue,
                    ord => return ord,
                }
            }
            a.prerelease.len().cmp(&b.prerelease.len())
        }
    }
}

fn tokenize(s: &str) -> Vec<&str> {
    s.split(['.', '-', '_']).filter(|t| !t.is_empty()).collect()
}

fn compare_tokenized(a: &str, b: &str) -> Ordering {
    let a_tokens = tokenize(a);
    let b_tokens = tokenize(b);
    let len = a_tokens.len().max(b_tokens.len());

    for i in 0..len {
        let at = a_tokens.get(i).copied().unwrap_or("0");
        let bt = b_tokens.get(i).copied().unwrap_or("0");

        let cmp = match (at.parse::<u64>(), bt.parse::<u64>()) {
            (Ok(an), Ok(bn)) => an.cmp(&bn),
            _ => at.cmp(bt),
        };

        if cmp != Ordering::Equal {
            return cmp;
        }
    }

    Ordering::Equal
}

/// Total ordering over version strings; never fails.
pub fn compare(a: &str, b: &str) -> Ordering {
    match (parse_semver(a), parse_semver(b)) {
        (Some(pa), Some(pb)) => compare_semver(&pa, &pb),
        _ => {
            let ord = compare_tokenized(a, b);
            if ord == Ordering::Equal && a != b {
                a.cmp(b)
            } else {
                ord
            }
        }
    }
}

/// `true` iff `candidate` is strictly newer than `baseline`.
pub fn is_newer(candidate: &str, baseline: &str) -> bool {
    compare(candidate, baseline) == Ordering::Greater
}

/// Whether `bounded by non-alphanumeric characters` token boundaries
/// contain one of the known prerelease markers, case-insensitively.
fn has_prerelease_marker(raw: &str) -> bool {
    let lower = raw.to_lowercase();
    let tokens = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty());

    for token in tokens {
        if PRERELEASE_MARKERS.contains(&token) {
            return true;
        }
    }
    false
}

/// A version is a prerelease if its parsed form carries a non-empty
/// pre-release part, or if its raw string contains one of the known
/// markers as a standalone token (spec §4.1, "Prerelease detection").
pub fn is_prerelease(raw: &str) -> bool {
    if let Some(parsed) = parse_semver(raw) {
        if !parsed.prerelease.is_empty() {
            return true;
        }
    }
    has_prerelease_marker(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v1_equals_v1_0_0() {
        assert_eq!(compare("v1", "v1.0.0"), Ordering::Equal);
    }

    #[test]
    fn prerelease_numeric_identifiers_order_numerically() {
        assert!(is_newer("v1.0.0-rc.10", "v1.0.0-rc.2"));
    }

    #[test]
    fn release_without_prerelease_beats_one_with() {
        assert!(is_newer("1.0.0", "1.0.0-rc.1"));
    }

    #[test]
    fn build_metadata_is_ignored_for_ordering() {
        assert_eq!(compare("1.2.3+build.5", "1.2.3+build.9"), Ordering::Equal);
    }

    #[test]
    fn missing_components_default_to_zero() {
        assert_eq!(compare("2.1", "2.1.0.0"), Ordering::Equal);
    }

    #[test]
    fn falls_back_to_tokenized_comparison() {
        assert!(is_newer("release-12", "release-3"));
    }

    #[test]
    fn falls_back_to_string_comparison_when_all_parsing_fails() {
        // Neither side parses as SemVer or has any numeric token, so
        // the tokenizer degrades straight to lexical string compare.
        assert_eq!(compare("abc", "abd"), Ordering::Less);
    }

    #[test]
    fn is_newer_and_is_equal_are_mutually_exclusive() {
        let pairs = [("1.0.0", "2.0.0"), ("2.0.0", "1.0.0"), ("1.0.0", "1.0.0")];
        for (a, b) in pairs {
            let newer = is_newer(a, b);
            let older = is_newer(b, a);
            let equal = compare(a, b) == Ordering::Equal;
            assert_eq!(
                [newer, older, equal].iter().filter(|x| **x).count(),
                1,
                "exactly one predicate should hold for ({a}, {b})"
            );
        }
    }

    #[test]
    fn is_newer_is_transitive() {
        assert!(is_newer("3.0.0", "2.0.0"));
        assert!(is_newer("2.0.0", "1.0.0"));
        assert!(is_newer("3.0.0", "1.0.0"));
    }

    #[test]
    fn detects_prerelease_by_semver_shape() {
        assert!(is_prerelease("1.0.0-alpha.1"));
    }

    #[test]
    fn detects_prerelease_by_marker_on_mislabeled_tag() {
        assert!(is_prerelease("v3.21.0-beta.0"));
    }

    #[test]
    fn does_not_match_marker_inside_a_larger_token() {
        // "prebuild" is not a standalone "pre" token.
        assert!(!is_prerelease("1.2.3-prebuild"));
    }

    #[test]
    fn stable_release_is_not_a_prerelease() {
        assert!(!is_prerelease("v1.2.3"));
    }
}
