//! Configuration resolver.
//!
//! Turns a root document and its includes into one validated tree:
//! 1. Includes are expanded depth-first in declaration order, each document's
//!    own fields merged after its includes so inline fields win
//! 2. The task selector is collapsed to exactly one task
//! 3. Include overrides, then field overrides, are applied to the task
//! 4. Defaults are filled and the tree is validated

use super::files::{IncludeLocator, LocateError, SearchContext, parent_dir};
use super::merge::{MergeError, merge};
use super::node::{ConfigNode, Document, IncludeDirective, MessageNode, Value};
use super::overrides::{Override, apply_field};
use super::parser::{ParseError, fill_defaults, parse_document};
use super::printer;
use super::validator::{Violation, validate};
use crate::schema::{SchemaRegistry, join_path, split_path};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Default limit on nested include depth.
pub const DEFAULT_MAX_INCLUDE_DEPTH: usize = 32;

/// Errors raised while resolving a configuration.
///
/// Every variant that concerns a document names its file, and the mount
/// path where applicable.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("{} (mount '{mount}'): {source}", .file.display())]
    Parse {
        file: PathBuf,
        mount: String,
        source: ParseError,
    },

    #[error(transparent)]
    Locate(#[from] LocateError),

    #[error("{} (mount '{mount}'): {source}", .file.display())]
    Merge {
        file: PathBuf,
        mount: String,
        source: MergeError,
    },

    #[error("{}: {source}", .file.display())]
    Io {
        file: PathBuf,
        source: std::io::Error,
    },

    #[error("include cycle: {}", format_chain(.chain))]
    IncludeCycle { chain: Vec<PathBuf> },

    #[error("{}: includes nested deeper than {limit} levels", .file.display())]
    IncludeDepthExceeded { file: PathBuf, limit: usize },

    #[error("{}: more than one task selected: {}", .file.display(), .tasks.join(", "))]
    AmbiguousTask { file: PathBuf, tasks: Vec<String> },

    #[error("{}: no task selected, expected one of: {}", .file.display(), .expected.join(", "))]
    NoTaskSelected { file: PathBuf, expected: Vec<String> },

    #[error("invalid override '{text}': {reason}")]
    InvalidOverride { text: String, reason: String },

    #[error("{}: {} validation error(s){}", .file.display(), .violations.len(), format_violations(.violations))]
    Validation {
        file: PathBuf,
        violations: Vec<Violation>,
    },
}

fn format_chain(chain: &[PathBuf]) -> String {
    chain
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

fn format_violations(violations: &[Violation]) -> String {
    violations.iter().map(|v| format!("\n  {}", v)).collect()
}

impl ResolveError {
    /// File the error was raised for, if any.
    pub fn file(&self) -> Option<&Path> {
        match self {
            ResolveError::Parse { file, .. }
            | ResolveError::Merge { file, .. }
            | ResolveError::Io { file, .. }
            | ResolveError::IncludeDepthExceeded { file, .. }
            | ResolveError::AmbiguousTask { file, .. }
            | ResolveError::NoTaskSelected { file, .. }
            | ResolveError::Validation { file, .. } => Some(file.as_path()),
            ResolveError::Locate(LocateError::NotFound { included_from, .. }) => {
                Some(included_from.as_path())
            }
            ResolveError::IncludeCycle { chain } => chain.last().map(PathBuf::as_path),
            ResolveError::InvalidOverride { .. } => None,
        }
    }

    /// Mount path the error was raised at, if any.
    pub fn mount(&self) -> Option<&str> {
        match self {
            ResolveError::Parse { mount, .. } | ResolveError::Merge { mount, .. } => {
                Some(mount.as_str())
            }
            ResolveError::Locate(LocateError::NotFound { mount, .. }) => Some(mount.as_str()),
            _ => None,
        }
    }

    /// Directories where a file fixing this error could appear: every
    /// directory a missing include was looked up in, and the directory of
    /// the offending file.
    pub fn search_dirs(&self) -> Vec<PathBuf> {
        let candidates = match self {
            ResolveError::Locate(LocateError::NotFound { candidates, .. }) => candidates.as_slice(),
            _ => &[],
        };
        let mut dirs: Vec<PathBuf> = Vec::new();
        let parents = candidates.iter().map(|c| parent_dir(c));
        for dir in parents.chain(self.file().map(parent_dir)) {
            if !dirs.contains(&dir) {
                dirs.push(dir);
            }
        }
        dirs
    }
}

/// A fully resolved, validated configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    task: String,
    root: MessageNode,
    sources: Vec<PathBuf>,
    search_dirs: Vec<PathBuf>,
}

impl ResolvedConfig {
    /// Name of the selected task field, e.g. `train`.
    pub fn task_name(&self) -> &str {
        &self.task
    }

    /// The selected task message.
    pub fn task(&self) -> Option<&MessageNode> {
        self.root.get(&self.task).and_then(ConfigNode::as_message)
    }

    pub fn root(&self) -> &MessageNode {
        &self.root
    }

    /// Node at a dotted path from the root, e.g. `train.launcher.slurm`.
    pub fn get(&self, path: &str) -> Option<&ConfigNode> {
        self.root.lookup(path)
    }

    fn value(&self, path: &str) -> Option<&Value> {
        self.get(path).and_then(ConfigNode::as_value)
    }

    pub fn get_bool(&self, path: &str) -> Option<bool> {
        match self.value(path)? {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn get_i64(&self, path: &str) -> Option<i64> {
        match self.value(path)? {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn get_f64(&self, path: &str) -> Option<f64> {
        match self.value(path)? {
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        match self.value(path)? {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Enum symbol at `path`.
    pub fn get_enum(&self, path: &str) -> Option<&str> {
        match self.value(path)? {
            Value::Enum(s) => Some(s),
            _ => None,
        }
    }

    /// Whether `path` was written by some document or override, as opposed
    /// to filled from a schema default.
    pub fn is_set(&self, path: &str) -> bool {
        self.get(path).is_some_and(ConfigNode::is_explicit)
    }

    /// Every file that contributed, root first, in load order.
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    /// Every directory an include was looked up in, whether or not a file
    /// was found there.
    pub fn search_dirs(&self) -> &[PathBuf] {
        &self.search_dirs
    }

    /// Render as text format; the output parses back to the same tree.
    pub fn to_text(&self, schema: &SchemaRegistry, include_defaults: bool) -> String {
        printer::to_text(&self.root, schema, include_defaults)
    }

    pub fn to_json(&self) -> serde_json::Value {
        self.root.to_json()
    }
}

/// Resolves root documents against a schema.
///
/// Holds no per-resolution state, so one resolver can serve many calls.
#[derive(Debug, Clone)]
pub struct ConfigResolver<'s> {
    schema: &'s SchemaRegistry,
    locator: IncludeLocator,
    common_dirs: Vec<PathBuf>,
    max_include_depth: usize,
}

/// Mutable state of a single resolution.
struct Expansion {
    /// Files currently being expanded, outermost first.
    stack: Vec<PathBuf>,
    sources: Vec<PathBuf>,
    search_dirs: Vec<PathBuf>,
}

impl<'s> ConfigResolver<'s> {
    pub fn new(schema: &'s SchemaRegistry) -> Self {
        Self {
            schema,
            locator: IncludeLocator::default(),
            common_dirs: Vec::new(),
            max_include_depth: DEFAULT_MAX_INCLUDE_DEPTH,
        }
    }

    /// Shared directories searched after the including file's own directory.
    pub fn with_common_dirs<P: Into<PathBuf>>(mut self, dirs: impl IntoIterator<Item = P>) -> Self {
        self.common_dirs = dirs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_extension(mut self, extension: &str) -> Self {
        self.locator = IncludeLocator::new(extension);
        self
    }

    pub fn with_max_include_depth(mut self, depth: usize) -> Self {
        self.max_include_depth = depth;
        self
    }

    pub fn schema(&self) -> &'s SchemaRegistry {
        self.schema
    }

    pub fn common_dirs(&self) -> &[PathBuf] {
        &self.common_dirs
    }

    /// Extension appended to include paths.
    pub fn extension(&self) -> &str {
        self.locator.extension()
    }

    /// Read and resolve the root document at `path`.
    pub fn resolve_file(
        &self,
        path: &Path,
        overrides: &[Override],
    ) -> Result<ResolvedConfig, ResolveError> {
        let text = std::fs::read_to_string(path).map_err(|source| ResolveError::Io {
            file: path.to_path_buf(),
            source,
        })?;
        self.resolve_str(&text, path, overrides)
    }

    /// Resolve root document `text`; `origin` is where it came from and
    /// anchors its relative includes.
    pub fn resolve_str(
        &self,
        text: &str,
        origin: &Path,
        overrides: &[Override],
    ) -> Result<ResolvedConfig, ResolveError> {
        let schema = self.schema;
        let root_type = schema.root();
        let document =
            parse_document(text, root_type, schema).map_err(|source| ResolveError::Parse {
                file: origin.to_path_buf(),
                mount: String::new(),
                source,
            })?;

        let mut state = Expansion {
            stack: vec![canonical(origin)],
            sources: vec![origin.to_path_buf()],
            search_dirs: vec![parent_dir(origin)],
        };
        let mut root = MessageNode::new(root_type);
        self.expand(&mut root, "", document, origin, &mut state)?;

        let task = self.select_task(&mut root, origin)?;
        info!(task = %task, file = %origin.display(), "Task selected");

        for ov in overrides {
            if let Override::Include { mount, path } = ov {
                let mount = join_path(&task, &normalize(mount));
                self.include_override(&mut root, &mount, path, origin, &mut state)
                    .map_err(|e| match e {
                        ResolveError::Merge { source, .. } => ResolveError::InvalidOverride {
                            text: ov.to_string(),
                            reason: source.to_string(),
                        },
                        other => other,
                    })?;
            }
        }
        for ov in overrides {
            if let Override::Field { path, value } = ov {
                let path = join_path(&task, &normalize(path));
                apply_field(&mut root, &path, value, schema).map_err(|reason| {
                    ResolveError::InvalidOverride {
                        text: ov.to_string(),
                        reason,
                    }
                })?;
                debug!(path = %path, value = %value, "Override applied");
            }
        }

        fill_defaults(&mut root, schema);

        let violations = validate(&root, schema);
        if !violations.is_empty() {
            return Err(ResolveError::Validation {
                file: origin.to_path_buf(),
                violations,
            });
        }

        Ok(ResolvedConfig {
            task,
            root,
            sources: state.sources,
            search_dirs: state.search_dirs,
        })
    }

    /// Expand `document` (read from `file`) into `root` at `mount`.
    fn expand(
        &self,
        root: &mut MessageNode,
        mount: &str,
        document: Document,
        file: &Path,
        state: &mut Expansion,
    ) -> Result<(), ResolveError> {
        let Document { includes, body } = document;
        let context = SearchContext::for_file(file, &self.common_dirs);

        for directive in includes {
            let full_mount = join_path(mount, &normalize(&directive.mount));
            self.include(root, &full_mount, &directive, &context, file, body.type_name(), state)?;
        }

        merge(root, mount, ConfigNode::Message(body), self.schema).map_err(|source| {
            ResolveError::Merge {
                file: file.to_path_buf(),
                mount: mount.to_string(),
                source,
            }
        })
    }

    /// Load one include and expand it at `full_mount`.
    ///
    /// `directive.mount` is relative to a document of type `parent_type`.
    #[allow(clippy::too_many_arguments)]
    fn include(
        &self,
        root: &mut MessageNode,
        full_mount: &str,
        directive: &IncludeDirective,
        context: &SearchContext,
        included_from: &Path,
        parent_type: &str,
        state: &mut Expansion,
    ) -> Result<(), ResolveError> {
        if state.stack.len() > self.max_include_depth {
            return Err(ResolveError::IncludeDepthExceeded {
                file: included_from.to_path_buf(),
                limit: self.max_include_depth,
            });
        }

        let target_type = self
            .schema
            .mount_type(parent_type, &directive.mount)
            .map_err(|(segment, reason)| ResolveError::Merge {
                file: included_from.to_path_buf(),
                mount: full_mount.to_string(),
                source: MergeError::InvalidMount {
                    mount: full_mount.to_string(),
                    segment,
                    reason,
                },
            })?;

        for candidate in self.locator.candidates(directive, context) {
            let dir = parent_dir(&candidate);
            if !state.search_dirs.contains(&dir) {
                state.search_dirs.push(dir);
            }
        }
        let located = self
            .locator
            .load(directive, context, included_from, target_type, self.schema)
            .map_err(|e| match e {
                ResolveError::Parse { file, source, .. } => ResolveError::Parse {
                    file,
                    mount: full_mount.to_string(),
                    source,
                },
                other => other,
            })?;

        let key = canonical(&located.path);
        if state.stack.contains(&key) {
            let mut chain = state.stack.clone();
            chain.push(key);
            return Err(ResolveError::IncludeCycle { chain });
        }
        debug!(
            include = %directive.path,
            path = %located.path.display(),
            mount = %full_mount,
            "Expanding include"
        );

        if !state.sources.contains(&located.path) {
            state.sources.push(located.path.clone());
        }
        state.stack.push(key);
        self.expand(root, full_mount, located.document, &located.path, state)?;
        state.stack.pop();
        Ok(())
    }

    fn include_override(
        &self,
        root: &mut MessageNode,
        mount: &str,
        path: &str,
        origin: &Path,
        state: &mut Expansion,
    ) -> Result<(), ResolveError> {
        let directive = IncludeDirective::new(path, mount);
        let context = SearchContext::for_file(origin, &self.common_dirs);
        self.include(root, mount, &directive, &context, origin, self.schema.root(), state)
    }

    /// Collapse the root selector group to its single member.
    fn select_task(&self, root: &mut MessageNode, origin: &Path) -> Result<String, ResolveError> {
        let descriptor = self.schema.root_descriptor();
        let group = descriptor.selector.clone().unwrap_or_default();
        let members: Vec<String> = descriptor
            .oneof_members(&group)
            .map(|f| f.name.clone())
            .collect();
        let present: Vec<String> = members
            .iter()
            .filter(|name| root.fields.contains_key(name.as_str()))
            .cloned()
            .collect();

        match present.len() {
            0 => Err(ResolveError::NoTaskSelected {
                file: origin.to_path_buf(),
                expected: members,
            }),
            1 => {
                let task = present[0].clone();
                if let Some(node) = root.fields.remove(&task) {
                    root.fields.insert(group, ConfigNode::oneof(&task, node));
                }
                Ok(task)
            }
            _ => Err(ResolveError::AmbiguousTask {
                file: origin.to_path_buf(),
                tasks: present,
            }),
        }
    }
}

fn normalize(path: &str) -> String {
    split_path(path).collect::<Vec<_>>().join(".")
}

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
