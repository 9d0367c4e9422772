//! Include file location.
//!
//! An include path is searched for in an ordered list of base directories.
//! The first existing regular file wins; the order never depends on directory
//! listing, so the same tree always resolves to the same files.

use super::loader::ResolveError;
use super::node::{Document, IncludeDirective};
use super::parser::parse_document;
use crate::schema::{SchemaRegistry, split_path};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Default extension appended to include paths.
pub const DEFAULT_EXTENSION: &str = "prototxt";

/// Errors raised while locating an include.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LocateError {
    #[error(
        "include '{path}' (mount '{mount}') from {} not found; tried:{}",
        .included_from.display(),
        format_candidates(.candidates)
    )]
    NotFound {
        path: String,
        mount: String,
        included_from: PathBuf,
        candidates: Vec<PathBuf>,
    },
}

fn format_candidates(candidates: &[PathBuf]) -> String {
    let mut out = String::new();
    for candidate in candidates {
        let _ = write!(out, "\n  {}", candidate.display());
    }
    out
}

/// Ordered, de-duplicated list of base directories to search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchContext {
    dirs: Vec<PathBuf>,
}

impl SearchContext {
    pub fn new(dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut context = Self::default();
        for dir in dirs {
            context.push(dir);
        }
        context
    }

    /// Context for includes declared in `file`: its own directory first,
    /// then the shared common directories.
    pub fn for_file(file: &Path, common_dirs: &[PathBuf]) -> Self {
        Self::new(std::iter::once(parent_dir(file)).chain(common_dirs.iter().cloned()))
    }

    fn push(&mut self, dir: PathBuf) {
        if !self.dirs.contains(&dir) {
            self.dirs.push(dir);
        }
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }
}

/// Directory holding `path`; `.` for a bare file name.
pub(crate) fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// A located and parsed include.
#[derive(Debug, Clone, PartialEq)]
pub struct LocatedDocument {
    pub path: PathBuf,
    pub document: Document,
}

/// Turns include directives into files on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeLocator {
    extension: String,
}

impl Default for IncludeLocator {
    fn default() -> Self {
        Self::new(DEFAULT_EXTENSION)
    }
}

impl IncludeLocator {
    pub fn new(extension: impl Into<String>) -> Self {
        let extension = extension.into();
        Self {
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    fn file_name(&self, path: &str) -> String {
        if self.extension.is_empty() || path.ends_with(&format!(".{}", self.extension)) {
            path.to_string()
        } else {
            format!("{}.{}", path, self.extension)
        }
    }

    /// Candidate files for `directive`, in search order.
    ///
    /// Every context directory is tried with the path as given; then, for a
    /// non-root mount, every directory again under a subdirectory named after
    /// the last mount segment.
    pub fn candidates(&self, directive: &IncludeDirective, context: &SearchContext) -> Vec<PathBuf> {
        let file_name = self.file_name(&directive.path);
        if Path::new(&file_name).is_absolute() {
            return vec![PathBuf::from(file_name)];
        }

        let mut candidates: Vec<PathBuf> = context.dirs().iter().map(|d| d.join(&file_name)).collect();
        if let Some(last) = split_path(&directive.mount).last() {
            candidates.extend(context.dirs().iter().map(|d| d.join(last).join(&file_name)));
        }

        let mut unique = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if !unique.contains(&candidate) {
                unique.push(candidate);
            }
        }
        unique
    }

    /// First existing candidate for `directive`.
    pub fn find(
        &self,
        directive: &IncludeDirective,
        context: &SearchContext,
        included_from: &Path,
    ) -> Result<PathBuf, LocateError> {
        let candidates = self.candidates(directive, context);
        for candidate in &candidates {
            if candidate.is_file() {
                debug!(include = %directive.path, path = %candidate.display(), "Include located");
                return Ok(candidate.clone());
            }
        }
        Err(LocateError::NotFound {
            path: directive.path.clone(),
            mount: directive.mount.clone(),
            included_from: included_from.to_path_buf(),
            candidates,
        })
    }

    /// Locate `directive`, read it and parse it as `type_name`.
    pub fn load(
        &self,
        directive: &IncludeDirective,
        context: &SearchContext,
        included_from: &Path,
        type_name: &str,
        schema: &SchemaRegistry,
    ) -> Result<LocatedDocument, ResolveError> {
        let path = self.find(directive, context, included_from)?;
        let text = std::fs::read_to_string(&path).map_err(|source| ResolveError::Io {
            file: path.clone(),
            source,
        })?;
        let document =
            parse_document(&text, type_name, schema).map_err(|source| ResolveError::Parse {
                file: path.clone(),
                mount: directive.mount.clone(),
                source,
            })?;
        Ok(LocatedDocument { path, document })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn context(dirs: &[&Path]) -> SearchContext {
        SearchContext::new(dirs.iter().map(|d| d.to_path_buf()))
    }

    #[test]
    fn test_candidate_order() {
        let locator = IncludeLocator::default();
        let ctx = context(&[Path::new("conf/train"), Path::new("conf/common")]);
        let directive = IncludeDirective::new("slurm", "train.launcher");
        assert_eq!(
            locator.candidates(&directive, &ctx),
            vec![
                PathBuf::from("conf/train/slurm.prototxt"),
                PathBuf::from("conf/common/slurm.prototxt"),
                PathBuf::from("conf/train/launcher/slurm.prototxt"),
                PathBuf::from("conf/common/launcher/slurm.prototxt"),
            ]
        );
    }

    #[test]
    fn test_root_mount_has_no_subdirectory_candidates() {
        let locator = IncludeLocator::default();
        let ctx = context(&[Path::new("a")]);
        let directive = IncludeDirective::new("base.prototxt", "");
        assert_eq!(
            locator.candidates(&directive, &ctx),
            vec![PathBuf::from("a/base.prototxt")]
        );
    }

    #[test]
    fn test_absolute_path_single_candidate() {
        let locator = IncludeLocator::default();
        let ctx = context(&[Path::new("a"), Path::new("b")]);
        let directive = IncludeDirective::new("/etc/conf/slurm", "train.launcher");
        assert_eq!(
            locator.candidates(&directive, &ctx),
            vec![PathBuf::from("/etc/conf/slurm.prototxt")]
        );
    }

    #[test]
    fn test_context_deduplicates() {
        let ctx = SearchContext::for_file(Path::new("conf/root.prototxt"), &[PathBuf::from("conf")]);
        assert_eq!(ctx.dirs(), &[PathBuf::from("conf")]);

        let ctx = SearchContext::for_file(Path::new("root.prototxt"), &[]);
        assert_eq!(ctx.dirs(), &[PathBuf::from(".")]);
    }

    #[test]
    fn test_find_first_existing() {
        let temp = TempDir::new().unwrap();
        let local = temp.path().join("local");
        let common = temp.path().join("common");
        std::fs::create_dir_all(local.join("launcher")).unwrap();
        std::fs::create_dir_all(&common).unwrap();
        std::fs::write(local.join("launcher/slurm.prototxt"), "").unwrap();
        std::fs::write(common.join("slurm.prototxt"), "").unwrap();

        let locator = IncludeLocator::default();
        let ctx = context(&[local.as_path(), common.as_path()]);
        let directive = IncludeDirective::new("slurm", "train.launcher");
        // Plain candidates in every directory come before mount subdirectories.
        assert_eq!(
            locator.find(&directive, &ctx, Path::new("root.prototxt")).unwrap(),
            common.join("slurm.prototxt")
        );
    }

    #[test]
    fn test_directory_is_not_a_hit() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("slurm.prototxt")).unwrap();
        let locator = IncludeLocator::default();
        let ctx = context(&[temp.path()]);
        let err = locator
            .find(&IncludeDirective::new("slurm", ""), &ctx, Path::new("x"))
            .unwrap_err();
        assert!(matches!(err, LocateError::NotFound { ref candidates, .. } if candidates.len() == 1));
    }

    #[test]
    fn test_not_found_lists_candidates() {
        let temp = TempDir::new().unwrap();
        let locator = IncludeLocator::new(".cfg");
        let ctx = context(&[temp.path()]);
        let err = locator
            .find(&IncludeDirective::new("missing", "train"), &ctx, Path::new("root.cfg"))
            .unwrap_err();
        let LocateError::NotFound { candidates, included_from, .. } = &err;
        assert_eq!(
            candidates,
            &vec![temp.path().join("missing.cfg"), temp.path().join("train/missing.cfg")]
        );
        assert_eq!(included_from, Path::new("root.cfg"));
        assert!(err.to_string().contains("missing.cfg"));
    }
}
