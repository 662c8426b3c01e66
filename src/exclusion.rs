//! Path exclusion rules.
//!
//! [`ExclusionRules`] is the plain, serializable description found in
//! configuration files. [`ExclusionRuleSet`] is the compiled predicate used
//! by the file collector and the result aggregator.
//!
//! A path is excluded when it starts with any ignore path, matches any glob,
//! or matches any glob registered for its extension. The rules form a union:
//! there is no ordering and no rule can re-include a path.

use crate::error::ExclusionError;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};

/// Serializable exclusion rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionRules {
    /// Path prefixes, compared as raw strings after normalization.
    #[serde(default)]
    pub ignore_paths: BTreeSet<String>,

    /// Glob patterns applied to every file.
    #[serde(default)]
    pub excludes: BTreeSet<String>,

    /// Glob patterns applied only to files with the given extension.
    #[serde(default)]
    pub extension_excludes: BTreeMap<String, BTreeSet<String>>,
}

impl ExclusionRules {
    /// Returns true when no rule is configured.
    pub fn is_empty(&self) -> bool {
        self.ignore_paths.is_empty()
            && self.excludes.is_empty()
            && self.extension_excludes.values().all(BTreeSet::is_empty)
    }

    /// Combine two rule sets. The result excludes everything either one excludes.
    pub fn union(&self, other: &ExclusionRules) -> ExclusionRules {
        let mut merged = self.clone();
        merged.ignore_paths.extend(other.ignore_paths.iter().cloned());
        merged.excludes.extend(other.excludes.iter().cloned());
        for (ext, globs) in &other.extension_excludes {
            merged
                .extension_excludes
                .entry(ext.clone())
                .or_default()
                .extend(globs.iter().cloned());
        }
        merged
    }

    /// Compile the rules into a matcher.
    pub fn compile(&self) -> Result<ExclusionRuleSet, ExclusionError> {
        let ignore_paths = self
            .ignore_paths
            .iter()
            .map(|p| normalize_path(p).to_string())
            .filter(|p| !p.is_empty())
            .collect();

        let globs = build_glob_set(&self.excludes)?;

        let mut by_extension = BTreeMap::new();
        for (ext, patterns) in &self.extension_excludes {
            if patterns.is_empty() {
                continue;
            }
            let key = ext.trim_start_matches('.').to_string();
            by_extension.insert(key, build_glob_set(patterns)?);
        }

        Ok(ExclusionRuleSet {
            ignore_paths,
            globs,
            by_extension,
        })
    }
}

/// Compiled exclusion predicate.
#[derive(Debug, Clone)]
pub struct ExclusionRuleSet {
    ignore_paths: Vec<String>,
    globs: GlobSet,
    by_extension: BTreeMap<String, GlobSet>,
}

impl Default for ExclusionRuleSet {
    fn default() -> Self {
        Self {
            ignore_paths: Vec::new(),
            globs: GlobSet::empty(),
            by_extension: BTreeMap::new(),
        }
    }
}

impl ExclusionRuleSet {
    /// Decide whether a path relative to the analysis root is excluded.
    ///
    /// The prefix test on ignore paths is a plain string prefix: `lib/impro`
    /// also excludes `lib/improver/x.py`.
    pub fn is_excluded(&self, relative_path: &str) -> bool {
        let normalized = normalize_path(relative_path);
        let path: &str = &normalized;

        if self.ignore_paths.iter().any(|prefix| path.starts_with(prefix.as_str())) {
            return true;
        }

        if self.globs.is_match(path) {
            return true;
        }

        match extension_of(path) {
            Some(ext) => self
                .by_extension
                .get(ext)
                .map(|set| set.is_match(path))
                .unwrap_or(false),
            None => false,
        }
    }
}

/// Normalize separators to `/` and strip leading `./` segments.
pub fn normalize_path(path: &str) -> Cow<'_, str> {
    if path.contains('\\') {
        let replaced = path.replace('\\', "/");
        Cow::Owned(strip_dot_prefix(&replaced).to_string())
    } else {
        Cow::Borrowed(strip_dot_prefix(path))
    }
}

fn strip_dot_prefix(mut path: &str) -> &str {
    while let Some(rest) = path.strip_prefix("./") {
        path = rest.trim_start_matches('/');
    }
    path
}

fn extension_of(path: &str) -> Option<&str> {
    let name = path.rsplit('/').next()?;
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        None
    } else {
        Some(ext)
    }
}

fn build_glob_set(patterns: &BTreeSet<String>) -> Result<GlobSet, ExclusionError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let normalized = normalize_path(pattern);
        // `*` stays inside a segment; `**` crosses segments
        let glob = GlobBuilder::new(&normalized)
            .literal_separator(true)
            .build()
            .map_err(|source| ExclusionError {
                pattern: pattern.clone(),
                source,
            })?;
        builder.add(glob);
    }
    builder.build().map_err(|source| ExclusionError {
        pattern: patterns.iter().cloned().collect::<Vec<_>>().join(", "),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(ignore: &[&str], globs: &[&str]) -> ExclusionRules {
        ExclusionRules {
            ignore_paths: ignore.iter().map(|s| s.to_string()).collect(),
            excludes: globs.iter().map(|s| s.to_string()).collect(),
            extension_excludes: BTreeMap::new(),
        }
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("./lib/a.py"), "lib/a.py");
        assert_eq!(normalize_path("././lib/a.py"), "lib/a.py");
        assert_eq!(normalize_path("lib\\tests\\a.py"), "lib/tests/a.py");
        assert_eq!(normalize_path(".\\lib\\a.py"), "lib/a.py");
        assert_eq!(normalize_path(".hidden/a.py"), ".hidden/a.py");
    }

    #[test]
    fn test_ignore_path_prefix() {
        let set = rules(&["lib/tests/"], &[]).compile().unwrap();
        assert!(set.is_excluded("lib/tests/a.py"));
        assert!(set.is_excluded("./lib/tests/a.py"));
        assert!(set.is_excluded("lib\\tests\\a.py"));
        assert!(!set.is_excluded("lib/main.py"));
    }

    #[test]
    fn test_ignore_path_is_raw_string_prefix() {
        let set = rules(&["lib/impro"], &[]).compile().unwrap();
        assert!(set.is_excluded("lib/improver/x.py"));
        assert!(set.is_excluded("lib/impro/x.py"));
        assert!(!set.is_excluded("lib/imp.py"));
    }

    #[test]
    fn test_single_star_stays_in_segment() {
        let set = rules(&[], &["src/*.js"]).compile().unwrap();
        assert!(set.is_excluded("src/app.js"));
        assert!(!set.is_excluded("src/nested/app.js"));
    }

    #[test]
    fn test_double_star_crosses_segments() {
        let set = rules(&[], &["**/*.min.js"]).compile().unwrap();
        assert!(set.is_excluded("a.min.js"));
        assert!(set.is_excluded("web/static/vendor/jquery.min.js"));
        assert!(!set.is_excluded("web/static/app.js"));
    }

    #[test]
    fn test_extension_excludes_only_apply_to_extension() {
        let mut r = rules(&[], &[]);
        r.extension_excludes.insert(
            ".py".to_string(),
            ["**/migrations/**".to_string()].into_iter().collect(),
        );
        let set = r.compile().unwrap();
        assert!(set.is_excluded("app/migrations/0001_initial.py"));
        assert!(!set.is_excluded("app/migrations/README.md"));
        assert!(!set.is_excluded("app/models.py"));
    }

    #[test]
    fn test_union_is_order_independent() {
        let a = rules(&["vendor/"], &[]);
        let b = rules(&[], &["**/*.gen.go"]);
        let ab = a.union(&b).compile().unwrap();
        let ba = b.union(&a).compile().unwrap();
        for path in ["vendor/x.go", "pkg/api.gen.go", "pkg/api.go"] {
            assert_eq!(ab.is_excluded(path), ba.is_excluded(path), "{path}");
        }
        assert!(ab.is_excluded("vendor/x.go"));
        assert!(ab.is_excluded("pkg/api.gen.go"));
        assert!(!ab.is_excluded("pkg/api.go"));
    }

    #[test]
    fn test_is_excluded_is_deterministic() {
        let set = rules(&["build/"], &["**/*.snap"]).compile().unwrap();
        for path in ["build/out.js", "tests/a.snap", "src/lib.rs"] {
            assert_eq!(set.is_excluded(path), set.is_excluded(path));
        }
    }

    #[test]
    fn test_invalid_glob_is_reported() {
        let err = rules(&[], &["src/[.py"]).compile().unwrap_err();
        assert_eq!(err.pattern, "src/[.py");
    }

    #[test]
    fn test_empty_rules_exclude_nothing() {
        let set = ExclusionRuleSet::default();
        assert!(!set.is_excluded("anything/at/all.rs"));
        assert!(ExclusionRules::default().is_empty());
    }
}
