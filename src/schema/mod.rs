//! Schema registry: the closed set of message, enum and field declarations.
//!
//! Descriptors are plain data. A [`SchemaRegistry`] is validated once at
//! construction and never mutated afterwards, so a single instance can be
//! shared by any number of concurrent resolutions.

mod builtin;
mod descriptor;

pub use builtin::builtin;
pub use descriptor::{
    Bounds, EnumDescriptor, FieldDescriptor, FieldKind, FieldType, Label, MessageDescriptor,
    PrimitiveType, RepeatedMerge,
};

use crate::config::Value;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Field name reserved for include directives at the top of every document.
pub const INCLUDES_FIELD: &str = "includes";

/// Errors detected while assembling a registry.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("duplicate message or enum name '{0}'")]
    DuplicateType(String),

    #[error("message {message}: duplicate field name '{field}'")]
    DuplicateField { message: String, field: String },

    #[error("message {message}: fields '{first}' and '{second}' share tag {tag}")]
    DuplicateTag {
        message: String,
        first: String,
        second: String,
        tag: u32,
    },

    #[error("message {message}: field '{field}' uses the reserved name 'includes'")]
    ReservedField { message: String, field: String },

    #[error("message {message}: field '{field}' refers to unknown type '{type_name}'")]
    UnknownType {
        message: String,
        field: String,
        type_name: String,
    },

    #[error("message {message}: field '{field}' is invalid: {reason}")]
    InvalidField {
        message: String,
        field: String,
        reason: String,
    },

    #[error("message {message}: selector group '{group}' has no member fields")]
    EmptySelector { message: String, group: String },

    #[error("message {message}: oneof group '{group}' has the same name as a field")]
    GroupShadowsField { message: String, group: String },

    #[error("root message '{0}' is not declared")]
    UnknownRoot(String),

    #[error("root message '{0}' does not declare a task selector group")]
    RootWithoutSelector(String),
}

/// Immutable lookup table of every message and enum type.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    messages: HashMap<String, MessageDescriptor>,
    enums: HashMap<String, EnumDescriptor>,
    /// Declaration order, used for stable listings.
    order: Vec<String>,
    root: String,
}

impl SchemaRegistry {
    /// Build and validate a registry.
    ///
    /// `root` names the message that root documents are parsed as; it must
    /// declare a task selector group.
    pub fn new(
        root: impl Into<String>,
        messages: Vec<MessageDescriptor>,
        enums: Vec<EnumDescriptor>,
    ) -> Result<Self, SchemaError> {
        let root = root.into();
        let mut names = HashSet::new();
        let mut order = Vec::with_capacity(messages.len());

        let mut enum_map = HashMap::new();
        for e in enums {
            if !names.insert(e.name.clone()) {
                return Err(SchemaError::DuplicateType(e.name));
            }
            enum_map.insert(e.name.clone(), e);
        }

        let mut message_map = HashMap::new();
        for m in messages {
            if !names.insert(m.name.clone()) {
                return Err(SchemaError::DuplicateType(m.name));
            }
            order.push(m.name.clone());
            message_map.insert(m.name.clone(), m);
        }

        let registry = Self {
            messages: message_map,
            enums: enum_map,
            order,
            root,
        };
        registry.check()?;
        Ok(registry)
    }

    fn check(&self) -> Result<(), SchemaError> {
        for name in &self.order {
            let message = &self.messages[name];
            let mut field_names = HashSet::new();
            let mut tags: HashMap<u32, &str> = HashMap::new();

            for field in &message.fields {
                if field.name == INCLUDES_FIELD {
                    return Err(SchemaError::ReservedField {
                        message: message.name.clone(),
                        field: field.name.clone(),
                    });
                }
                if !field_names.insert(field.name.as_str()) {
                    return Err(SchemaError::DuplicateField {
                        message: message.name.clone(),
                        field: field.name.clone(),
                    });
                }
                if let Some(first) = tags.insert(field.tag, &field.name) {
                    return Err(SchemaError::DuplicateTag {
                        message: message.name.clone(),
                        first: first.to_string(),
                        second: field.name.clone(),
                        tag: field.tag,
                    });
                }
                self.check_field(message, field)?;
            }

            for group in message.oneof_groups() {
                if field_names.contains(group) {
                    return Err(SchemaError::GroupShadowsField {
                        message: message.name.clone(),
                        group: group.to_string(),
                    });
                }
            }

            if let Some(group) = &message.selector
                && message.oneof_members(group).next().is_none()
            {
                return Err(SchemaError::EmptySelector {
                    message: message.name.clone(),
                    group: group.clone(),
                });
            }
        }

        let root = self
            .messages
            .get(&self.root)
            .ok_or_else(|| SchemaError::UnknownRoot(self.root.clone()))?;
        if root.selector.is_none() {
            return Err(SchemaError::RootWithoutSelector(self.root.clone()));
        }
        Ok(())
    }

    fn check_field(
        &self,
        message: &MessageDescriptor,
        field: &FieldDescriptor,
    ) -> Result<(), SchemaError> {
        let invalid = |reason: &str| SchemaError::InvalidField {
            message: message.name.clone(),
            field: field.name.clone(),
            reason: reason.to_string(),
        };

        match &field.field_type {
            FieldType::Message(name) if !self.messages.contains_key(name) => {
                return Err(SchemaError::UnknownType {
                    message: message.name.clone(),
                    field: field.name.clone(),
                    type_name: name.clone(),
                });
            }
            FieldType::Enum(name) if !self.enums.contains_key(name) => {
                return Err(SchemaError::UnknownType {
                    message: message.name.clone(),
                    field: field.name.clone(),
                    type_name: name.clone(),
                });
            }
            _ => {}
        }

        if field.oneof.is_some() && field.label == Label::Repeated {
            return Err(invalid("oneof members cannot be repeated"));
        }
        if field.repeated_merge == RepeatedMerge::Append && field.label != Label::Repeated {
            return Err(invalid("append merge applies to repeated fields only"));
        }
        if field.bounds.is_some() && !field.field_type.is_numeric() {
            return Err(invalid("bounds apply to numeric fields only"));
        }
        if let Some(default) = &field.default {
            if field.label == Label::Repeated || field.oneof.is_some() {
                return Err(invalid("repeated and oneof fields cannot declare defaults"));
            }
            if let Err(reason) = self.check_value(&field.field_type, default) {
                return Err(invalid(&format!("default: {}", reason)));
            }
        }
        Ok(())
    }

    /// Check that a primitive value fits a declared field type.
    ///
    /// Returns a human-readable reason on mismatch.
    pub fn check_value(&self, field_type: &FieldType, value: &Value) -> Result<(), String> {
        match (field_type, value) {
            (FieldType::Primitive(p), v) => p.check(v),
            (FieldType::Enum(name), Value::Enum(symbol)) => match self.enums.get(name) {
                Some(e) if e.number(symbol).is_some() => Ok(()),
                Some(_) => Err(format!("'{}' is not a value of enum {}", symbol, name)),
                None => Err(format!("unknown enum {}", name)),
            },
            (FieldType::Enum(name), other) => {
                Err(format!("expected enum {}, found {}", name, other.kind_name()))
            }
            (FieldType::Message(name), other) => {
                Err(format!("expected message {}, found {}", name, other.kind_name()))
            }
        }
    }

    /// Name of the message root documents are parsed as.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Descriptor of the root message.
    pub fn root_descriptor(&self) -> &MessageDescriptor {
        // Presence is checked in `new`.
        &self.messages[&self.root]
    }

    pub fn message(&self, name: &str) -> Option<&MessageDescriptor> {
        self.messages.get(name)
    }

    pub fn enum_type(&self, name: &str) -> Option<&EnumDescriptor> {
        self.enums.get(name)
    }

    /// Messages in declaration order.
    pub fn messages(&self) -> impl Iterator<Item = &MessageDescriptor> {
        self.order.iter().map(|name| &self.messages[name])
    }

    /// Follow a dotted field path from `type_name` and return the message
    /// type at its end.
    ///
    /// Every segment must be a singular, message-typed field. An empty path
    /// names `type_name` itself. On failure returns the offending segment and
    /// a reason.
    pub fn mount_type<'a>(
        &'a self,
        type_name: &'a str,
        path: &str,
    ) -> Result<&'a str, (String, String)> {
        let mut current = type_name;
        for segment in split_path(path) {
            let message = self
                .message(current)
                .ok_or_else(|| (segment.to_string(), format!("unknown message {}", current)))?;
            let field = message.field(segment).ok_or_else(|| {
                (
                    segment.to_string(),
                    format!("message {} has no field '{}'", current, segment),
                )
            })?;
            match (&field.field_type, field.label) {
                (FieldType::Message(next), Label::Singular) => current = next,
                (FieldType::Message(_), Label::Repeated) => {
                    return Err((
                        segment.to_string(),
                        format!("field '{}' is repeated", segment),
                    ));
                }
                _ => {
                    return Err((
                        segment.to_string(),
                        format!("field '{}' is not a message", segment),
                    ));
                }
            }
        }
        Ok(current)
    }
}

/// Split a dotted path, treating the empty string and "." as the root.
pub fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('.').filter(|s| !s.is_empty())
}

/// Join a base path and a relative path with a dot.
pub fn join_path(base: &str, rest: &str) -> String {
    match (base.is_empty(), rest.is_empty()) {
        (true, _) => rest.to_string(),
        (_, true) => base.to_string(),
        _ => format!("{}.{}", base, rest),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf() -> MessageDescriptor {
        MessageDescriptor::new("Leaf")
            .with_field(FieldDescriptor::primitive("n", 1, PrimitiveType::Int32))
    }

    fn root() -> MessageDescriptor {
        MessageDescriptor::new("Root")
            .with_selector("task")
            .with_field(FieldDescriptor::message("a", 1, "Leaf").in_oneof("task"))
    }

    #[test]
    fn test_builtin_schema_is_valid() {
        let schema = builtin();
        assert_eq!(schema.root(), "MetaCfg");
        assert!(schema.message("TrainTask").is_some());
    }

    #[test]
    fn test_duplicate_tag_rejected() {
        let bad = MessageDescriptor::new("Leaf")
            .with_field(FieldDescriptor::primitive("a", 1, PrimitiveType::Int32))
            .with_field(FieldDescriptor::primitive("b", 1, PrimitiveType::Int32));
        let err = SchemaRegistry::new("Root", vec![root(), bad], vec![]).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateTag { tag: 1, .. }));
    }

    #[test]
    fn test_reserved_includes_rejected() {
        let bad = MessageDescriptor::new("Leaf")
            .with_field(FieldDescriptor::primitive("includes", 1, PrimitiveType::String));
        let err = SchemaRegistry::new("Root", vec![root(), bad], vec![]).unwrap_err();
        assert!(matches!(err, SchemaError::ReservedField { .. }));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let bad = MessageDescriptor::new("Leaf")
            .with_field(FieldDescriptor::message("child", 1, "Missing"));
        let err = SchemaRegistry::new("Root", vec![root(), bad], vec![]).unwrap_err();
        assert!(matches!(err, SchemaError::UnknownType { .. }));
    }

    #[test]
    fn test_default_must_match_type() {
        let bad = MessageDescriptor::new("Leaf").with_field(
            FieldDescriptor::primitive("n", 1, PrimitiveType::Int32)
                .with_default(Value::Str("x".into())),
        );
        let err = SchemaRegistry::new("Root", vec![root(), bad], vec![]).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidField { .. }));
    }

    #[test]
    fn test_root_needs_selector() {
        let err = SchemaRegistry::new("Leaf", vec![root(), leaf()], vec![]).unwrap_err();
        assert_eq!(err, SchemaError::RootWithoutSelector("Leaf".into()));
    }

    #[test]
    fn test_mount_type_walks_message_chain() {
        let schema = builtin();
        assert_eq!(
            schema.mount_type("MetaCfg", "train.launcher"),
            Ok("Launcher")
        );
        assert_eq!(schema.mount_type("MetaCfg", ""), Ok("MetaCfg"));
        let (segment, _) = schema
            .mount_type("MetaCfg", "train.batch_size")
            .unwrap_err();
        assert_eq!(segment, "batch_size");
        assert!(schema.mount_type("MetaCfg", "train.nope").is_err());
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("", "a.b"), "a.b");
        assert_eq!(join_path("train", ""), "train");
        assert_eq!(join_path("train", "launcher"), "train.launcher");
    }
}
