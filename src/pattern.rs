// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Glob-style include/exclude matching over asset file names (spec §4.2).

use std::path::Path;

use glob::Pattern;

/// `true` iff `filename`'s basename matches at least one include
/// pattern and no exclude pattern. A leading `!` on a pattern marks it
/// as an exclusion. An empty pattern list matches every name.
pub fn matches(filename: &str, patterns: &[String]) -> bool {
    let basename = Path::new(filename)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(filename);

    if patterns.is_empty() {
        return true;
    }

    let (excludes, includes): (Vec<&String>, Vec<&String>) =
        patterns.iter().partition(|p| p.starts_with('!'));

    let matches_pattern = |raw: &str| -> bool {
        Pattern::new(raw)
            .map(|p| p.matches(basename))
            .unwrap_or(false)
    };

    let any_include = includes.iter().any(|p| matches_pattern(p));
    let any_exclude = excludes.iter().any(|p| matches_pattern(&p[1..]));

    any_include && !any_exclude
}

/// Filter `filenames` down to those selected by `matches`.
pub fn filter<'a>(filenames: &'a [String], patterns: &[String]) -> Vec<&'a String> {
    filenames.iter().filter(|f| matches(f, patterns)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(strs: &[&str]) -> Vec<String> {
        strs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_pattern_list_matches_everything() {
        assert!(matches("anything.tar.gz", &[]));
    }

    #[test]
    fn star_matches_extension() {
        assert!(matches("app-linux-amd64.tar.gz", &p(&["*.tar.gz"])));
        assert!(!matches("app-linux-amd64.zip", &p(&["*.tar.gz"])));
    }

    #[test]
    fn exclude_overrides_include() {
        let patterns = p(&["*.tar.gz", "!*-debug.tar.gz"]);
        assert!(matches("app.tar.gz", &patterns));
        assert!(!matches("app-debug.tar.gz", &patterns));
    }

    #[test]
    fn exclude_always_wins_regardless_of_rest_of_list() {
        // Spec §8 property 5: matches(f, patterns ++ ["!"+p]) is false
        // whenever plain pattern p matches f, regardless of the rest.
        let base = p(&["*.tar.gz", "*.zip", "app*"]);
        let name = "app-linux.tar.gz";
        assert!(matches(name, &base));

        let mut excluded = base.clone();
        excluded.push("!app-linux.tar.gz".to_string());
        assert!(!matches(name, &excluded));
    }

    #[test]
    fn matches_basename_only_not_full_path() {
        let patterns = p(&["*.tar.gz"]);
        assert!(matches("some/dir/app.tar.gz", &patterns));
    }

    #[test]
    fn character_class_supported() {
        assert!(matches("app-v1.tar.gz", &p(&["app-v[0-9].tar.gz"])));
        assert!(!matches("app-vX.tar.gz", &p(&["app-v[0-9].tar.gz"])));
    }

    #[test]
    fn matching_is_case_sensitive() {
        assert!(!matches("App.TAR.GZ", &p(&["*.tar.gz"])));
    }
}
