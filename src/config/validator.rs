//! Schema validation of a merged configuration tree.

use super::node::{ConfigNode, MessageNode};
use crate::schema::{FieldDescriptor, FieldType, Label, SchemaRegistry, join_path};
use serde::Serialize;
use std::fmt;

/// Category of a validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationKind {
    MissingRequiredField,
    OneofViolation,
    TypeViolation,
    BoundsViolation,
    UnknownField,
}

/// A single validation failure at a dotted path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub path: String,
    pub kind: ViolationKind,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// Validate `root` and everything below it.
///
/// Returns every violation found; an empty list means the tree is valid.
pub fn validate(root: &MessageNode, schema: &SchemaRegistry) -> Vec<Violation> {
    let mut validator = Validator {
        schema,
        violations: Vec::new(),
    };
    validator.message(root, "");
    validator.violations
}

struct Validator<'s> {
    schema: &'s SchemaRegistry,
    violations: Vec<Violation>,
}

impl Validator<'_> {
    fn report(&mut self, path: &str, kind: ViolationKind, message: impl Into<String>) {
        self.violations.push(Violation {
            path: path.to_string(),
            kind,
            message: message.into(),
        });
    }

    fn message(&mut self, node: &MessageNode, path: &str) {
        let schema = self.schema;
        let Some(descriptor) = schema.message(node.type_name()) else {
            self.report(
                path,
                ViolationKind::TypeViolation,
                format!("unknown message type {}", node.type_name()),
            );
            return;
        };

        for (key, child) in node.entries() {
            match child {
                ConfigNode::Oneof(oneof) => {
                    let field_path = join_path(path, &oneof.field);
                    match descriptor.field(&oneof.field) {
                        Some(field) if field.oneof.as_deref() == Some(key) => {
                            self.field(field, &oneof.value, &field_path);
                        }
                        _ => self.report(
                            &field_path,
                            ViolationKind::UnknownField,
                            format!(
                                "'{}' is not a member of oneof '{}' in {}",
                                oneof.field, key, descriptor.name
                            ),
                        ),
                    }
                }
                child => {
                    let field_path = join_path(path, key);
                    match descriptor.field(key) {
                        Some(field) => self.field(field, child, &field_path),
                        None => self.report(
                            &field_path,
                            ViolationKind::UnknownField,
                            format!("message {} has no field '{}'", descriptor.name, key),
                        ),
                    }
                }
            }
        }

        // Every oneof group of a present message needs exactly one member.
        for group in descriptor.oneof_groups() {
            let mut set: Vec<&str> = descriptor
                .oneof_members(group)
                .filter(|f| node.entries().any(|(k, _)| k == f.name))
                .map(|f| f.name.as_str())
                .collect();
            if let Some(selected) = node.which_oneof(group) {
                set.push(selected);
            }
            if set.len() > 1 {
                self.report(
                    path,
                    ViolationKind::OneofViolation,
                    format!("oneof '{}' has several members set: {}", group, set.join(", ")),
                );
            } else if set.is_empty() {
                self.report(
                    path,
                    ViolationKind::OneofViolation,
                    format!(
                        "oneof '{}' of {} requires exactly one member",
                        group, descriptor.name
                    ),
                );
            }
        }

        for field in descriptor.fields.iter().filter(|f| f.required) {
            if node.get(&field.name).is_none() {
                self.report(
                    &join_path(path, &field.name),
                    ViolationKind::MissingRequiredField,
                    format!("required field '{}' of {} is not set", field.name, descriptor.name),
                );
            }
        }
    }

    fn field(&mut self, field: &FieldDescriptor, node: &ConfigNode, path: &str) {
        match (field.label, node) {
            (Label::Repeated, ConfigNode::Repeated(items)) => {
                for (i, item) in items.iter().enumerate() {
                    self.element(field, item, &format!("{}[{}]", path, i));
                }
            }
            (Label::Repeated, other) => self.report(
                path,
                ViolationKind::TypeViolation,
                format!("expected a list, found {}", other.shape_name()),
            ),
            (Label::Singular, ConfigNode::Repeated(_)) => self.report(
                path,
                ViolationKind::TypeViolation,
                "expected a single value, found a list",
            ),
            (Label::Singular, node) => self.element(field, node, path),
        }
    }

    fn element(&mut self, field: &FieldDescriptor, node: &ConfigNode, path: &str) {
        match (&field.field_type, node) {
            (FieldType::Message(expected), ConfigNode::Message(message)) => {
                if message.type_name() == expected {
                    self.message(message, path);
                } else {
                    self.report(
                        path,
                        ViolationKind::TypeViolation,
                        format!("expected {}, found {}", expected, message.type_name()),
                    );
                }
            }
            (FieldType::Message(expected), other) => self.report(
                path,
                ViolationKind::TypeViolation,
                format!("expected {}, found {}", expected, other.shape_name()),
            ),
            (field_type, ConfigNode::Scalar(scalar)) => {
                if let Err(reason) = self.schema.check_value(field_type, &scalar.value) {
                    self.report(path, ViolationKind::TypeViolation, reason);
                    return;
                }
                if let (Some(bounds), Some(x)) = (field.bounds, scalar.value.as_f64())
                    && !bounds.contains(x)
                {
                    self.report(
                        path,
                        ViolationKind::BoundsViolation,
                        format!("{} is outside [{}, {}]", x, bounds.min, bounds.max),
                    );
                }
            }
            (field_type, other) => self.report(
                path,
                ViolationKind::TypeViolation,
                format!("expected {}, found {}", field_type.display_name(), other.shape_name()),
            ),
        }
    }
}
