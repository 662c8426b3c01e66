//! File collector for discovering analyzable source files.
//!
//! The collector walks the analysis root once and produces the immutable file
//! snapshot shared by every tool invocation of a run.

use crate::error::CollectError;
use crate::exclusion::{normalize_path, ExclusionRuleSet};
use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// Options controlling a directory walk.
#[derive(Debug, Clone, Default)]
pub struct CollectOptions {
    /// Skip unreadable subtrees with a warning instead of failing.
    pub force_file_permissions: bool,
    /// Only keep files contained in this set (e.g. files touched by a diff).
    pub restrict_to: Option<BTreeSet<String>>,
}

/// Walks a directory and yields the files eligible for analysis.
pub struct FileCollector<'a> {
    root: PathBuf,
    rules: &'a ExclusionRuleSet,
    options: CollectOptions,
}

impl<'a> FileCollector<'a> {
    /// Create a new collector rooted at `root`.
    pub fn new(root: impl Into<PathBuf>, rules: &'a ExclusionRuleSet, options: CollectOptions) -> Self {
        Self {
            root: root.into(),
            rules,
            options,
        }
    }

    /// Collect every regular file that is not excluded.
    ///
    /// Paths are relative to the root and use `/` separators. Symlinks are
    /// never followed and hidden directories (`.git`, `.hg`, ...) are skipped.
    pub fn collect(&self) -> Result<BTreeSet<String>, CollectError> {
        match fs::metadata(&self.root) {
            Ok(meta) if meta.is_dir() => {}
            _ => return Err(CollectError::DirectoryNotFound(self.root.clone())),
        }

        let restrict: Option<BTreeSet<String>> = self.options.restrict_to.as_ref().map(|subset| {
            subset
                .iter()
                .map(|p| normalize_path(p).into_owned())
                .collect()
        });

        let mut files = BTreeSet::new();
        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden_dir(entry));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    self.handle_walk_error(err)?;
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let Some(relative) = self.relative_path(entry.path()) else {
                continue;
            };

            if self.rules.is_excluded(&relative) {
                debug!("Excluded: {}", relative);
                continue;
            }

            if let Some(ref subset) = restrict {
                if !subset.contains(&relative) {
                    continue;
                }
            }

            files.insert(relative);
        }

        debug!("Collected {} files under {}", files.len(), self.root.display());
        Ok(files)
    }

    fn handle_walk_error(&self, err: walkdir::Error) -> Result<(), CollectError> {
        let path = err
            .path()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());

        let denied = err
            .io_error()
            .map(|io| io.kind() == ErrorKind::PermissionDenied)
            .unwrap_or(false);

        if denied {
            return self.permission_denied(path);
        }

        Err(CollectError::Walk { path, source: err })
    }

    /// Unreadable paths abort the walk unless permissions are forced.
    fn permission_denied(&self, path: PathBuf) -> Result<(), CollectError> {
        if self.options.force_file_permissions {
            warn!("Skipping unreadable path {}", path.display());
            return Ok(());
        }
        Err(CollectError::PermissionDenied(path))
    }

    fn relative_path(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<_> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("/"))
        }
    }
}

fn is_hidden_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with('.'))
            .unwrap_or(false)
}
