//! Hierarchical configuration resolution.
//!
//! A root document in protobuf text format pulls reusable fragments in with
//! `includes` directives. Resolution splices every fragment into one tree,
//! selects a single task, applies command-line overrides and validates the
//! result against the schema.
//!
//! ## Merge Strategy
//! - Includes are expanded depth-first in declaration order
//! - A document's own fields are merged after its includes, so they win
//! - Messages merge field by field; scalars and oneof members replace
//! - Repeated fields replace wholesale unless declared append-on-merge
//!
//! ## Include Search
//! Each include is looked up in the including file's directory, then in the
//! common directories; then the same directories again under a subdirectory
//! named after the last segment of the mount path.

mod files;
mod lexer;
mod loader;
mod merge;
mod node;
mod overrides;
mod parser;
mod printer;
mod validator;
mod watcher;

pub use files::{DEFAULT_EXTENSION, IncludeLocator, LocateError, LocatedDocument, SearchContext};
pub use loader::{ConfigResolver, DEFAULT_MAX_INCLUDE_DEPTH, ResolveError, ResolvedConfig};
pub use merge::{MergeError, merge, merge_message, navigate};
pub use node::{
    ConfigNode, Document, IncludeDirective, MessageNode, OneofNode, Presence, ScalarNode, Value,
};
pub use overrides::{Override, parse_overrides};
pub use parser::{ParseError, parse_document, parse_value};
pub use printer::{format_value, to_text};
pub use validator::{Violation, ViolationKind, validate};
pub use watcher::{Snapshot, WatchSet, WatcherConfig, watch};
