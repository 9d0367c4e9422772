//! Text-format rendering of configuration trees.
//!
//! Fields are written in declaration order. The output parses back into the
//! same tree.

use super::node::{ConfigNode, MessageNode, Value};
use crate::schema::{FieldDescriptor, SchemaRegistry};
use std::fmt::Write as _;

const INDENT: &str = "  ";

/// Render `node` as text format.
///
/// With `include_defaults` unset, scalars filled from schema defaults are
/// omitted.
pub fn to_text(node: &MessageNode, schema: &SchemaRegistry, include_defaults: bool) -> String {
    let mut out = String::new();
    Printer {
        schema,
        include_defaults,
        out: &mut out,
    }
    .message(node, 0);
    out
}

/// Render a primitive value as a text-format literal.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Str(s) => quote(s),
        Value::Float(x) if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e15 => {
            format!("{:.1}", x)
        }
        other => other.to_string(),
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

struct Printer<'a> {
    schema: &'a SchemaRegistry,
    include_defaults: bool,
    out: &'a mut String,
}

impl Printer<'_> {
    fn message(&mut self, node: &MessageNode, depth: usize) {
        let schema = self.schema;
        let Some(descriptor) = schema.message(node.type_name()) else {
            return;
        };
        for field in &descriptor.fields {
            if let Some(child) = node.get(&field.name) {
                self.field(field, child, depth);
            }
        }
    }

    fn field(&mut self, field: &FieldDescriptor, node: &ConfigNode, depth: usize) {
        match node {
            ConfigNode::Repeated(items) => {
                for item in items {
                    self.single(&field.name, item, depth);
                }
            }
            other => self.single(&field.name, other, depth),
        }
    }

    fn single(&mut self, name: &str, node: &ConfigNode, depth: usize) {
        let indent = INDENT.repeat(depth);
        match node {
            ConfigNode::Scalar(scalar) => {
                if self.include_defaults || node.is_explicit() {
                    let _ = writeln!(self.out, "{}{}: {}", indent, name, format_value(&scalar.value));
                }
            }
            ConfigNode::Message(message) => {
                let mut body = String::new();
                Printer {
                    schema: self.schema,
                    include_defaults: self.include_defaults,
                    out: &mut body,
                }
                .message(message, depth + 1);
                if body.is_empty() {
                    let _ = writeln!(self.out, "{}{} {{}}", indent, name);
                } else {
                    let _ = write!(self.out, "{}{} {{\n{}{}}}\n", indent, name, body, indent);
                }
            }
            // Lookups by field name never yield group or list nodes.
            ConfigNode::Oneof(_) | ConfigNode::Repeated(_) => {}
        }
    }
}
