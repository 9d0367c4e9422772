//! Schema-typed hierarchical configuration resolver.
//!
//! Root documents in protobuf text format compose reusable fragments through
//! `includes` directives mounted at field paths. The resolver splices them
//! into one tree, selects a single task, applies command-line overrides and
//! validates the result against a [`schema::SchemaRegistry`].

pub mod cli;
pub mod config;
pub mod error;
pub mod format;
pub mod logging;
pub mod schema;
pub mod settings;
