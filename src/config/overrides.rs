//! Command-line overrides.
//!
//! Two forms are accepted, both relative to the selected task message:
//! - `a.b.c=value` sets a single field
//! - `I.mount=path` (or `I=path` for the task itself) includes a document

use super::loader::ResolveError;
use super::merge::{navigate, put_field};
use super::node::MessageNode;
use super::parser::parse_value;
use crate::schema::SchemaRegistry;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

const OVERRIDE_PATTERN: &str =
    r"^(?:I(?:\.([A-Za-z_][A-Za-z0-9_.]*))?|([A-Za-z_][A-Za-z0-9_.]*))=(.*)$";

/// A single override given on the command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Override {
    /// Set the field at `path` to `value` (text-format literal).
    Field { path: String, value: String },
    /// Include the document at `path`, mounted at `mount`.
    Include { mount: String, path: String },
}

impl FromStr for Override {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ResolveError::InvalidOverride {
            text: s.to_string(),
            reason: reason.to_string(),
        };
        let re = regex_lite::Regex::new(OVERRIDE_PATTERN).map_err(|e| invalid(&e.to_string()))?;
        let caps = re
            .captures(s.trim())
            .ok_or_else(|| invalid("expected 'field.path=value' or 'I.mount=path'"))?;
        let value = caps.get(3).map_or("", |m| m.as_str()).to_string();

        if let Some(path) = caps.get(2) {
            return Ok(Override::Field {
                path: path.as_str().to_string(),
                value,
            });
        }
        if value.trim().is_empty() {
            return Err(invalid("include override needs a path"));
        }
        Ok(Override::Include {
            mount: caps.get(1).map_or("", |m| m.as_str()).to_string(),
            path: value.trim().to_string(),
        })
    }
}

impl fmt::Display for Override {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Override::Field { path, value } => write!(f, "{}={}", path, value),
            Override::Include { mount, path } if mount.is_empty() => write!(f, "I={}", path),
            Override::Include { mount, path } => write!(f, "I.{}={}", mount, path),
        }
    }
}

/// Parse every argument as an override.
pub fn parse_overrides<S: AsRef<str>>(args: &[S]) -> Result<Vec<Override>, ResolveError> {
    args.iter().map(|a| a.as_ref().parse()).collect()
}

/// Set the field at dotted `path` below `node` from its text form.
///
/// Returns a human-readable reason on failure.
pub(crate) fn apply_field(
    node: &mut MessageNode,
    path: &str,
    value: &str,
    schema: &SchemaRegistry,
) -> Result<(), String> {
    let (parent_path, leaf) = match path.rsplit_once('.') {
        Some((parent, leaf)) => (parent, leaf),
        None => ("", path),
    };
    let parent = navigate(node, parent_path, schema).map_err(|e| e.to_string())?;
    let descriptor = schema
        .message(parent.type_name())
        .ok_or_else(|| format!("unknown message {}", parent.type_name()))?;
    let field = descriptor
        .field(leaf)
        .ok_or_else(|| format!("message {} has no field '{}'", descriptor.name, leaf))?;
    let parsed = parse_value(value, field, schema).map_err(|e| e.to_string())?;
    put_field(parent, descriptor, field, parsed);
    Ok(())
}
