//! Tree merging for configuration documents.
//!
//! Splices a subtree into a message tree at a dotted field path. Later
//! declarations override earlier ones field by field:
//! - Messages are merged recursively
//! - Scalars are replaced, except that a schema default never replaces a value
//! - Repeated fields are replaced entirely unless the field opts into append
//! - A oneof member replaces a different member of the same group

use super::node::{ConfigNode, MessageNode, Presence, ScalarNode};
use crate::schema::{
    FieldDescriptor, FieldType, MessageDescriptor, RepeatedMerge, SchemaRegistry, split_path,
};
use thiserror::Error;

/// Errors raised while splicing a subtree.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MergeError {
    #[error("invalid mount '{mount}' at '{segment}': {reason}")]
    InvalidMount {
        mount: String,
        segment: String,
        reason: String,
    },

    #[error("type mismatch at '{mount}': expected {expected}, found {found}")]
    TypeMismatch {
        mount: String,
        expected: String,
        found: String,
    },
}

/// Merge `incoming` into `base` at the dotted `path`.
///
/// Intermediate messages along the path are created when absent. `incoming`
/// must be a message of the type declared at the end of the path.
pub fn merge(
    base: &mut MessageNode,
    path: &str,
    incoming: ConfigNode,
    schema: &SchemaRegistry,
) -> Result<(), MergeError> {
    let target = navigate(base, path, schema)?;
    match incoming {
        ConfigNode::Message(message) => {
            if message.type_name() != target.type_name() {
                return Err(MergeError::TypeMismatch {
                    mount: path.to_string(),
                    expected: target.type_name().to_string(),
                    found: message.type_name().to_string(),
                });
            }
            merge_message(target, message, schema)
        }
        other => Err(MergeError::TypeMismatch {
            mount: path.to_string(),
            expected: target.type_name().to_string(),
            found: other.shape_name().to_string(),
        }),
    }
}

/// Walk `path` from `base`, creating absent messages, and return the message
/// at its end.
pub fn navigate<'a>(
    base: &'a mut MessageNode,
    path: &str,
    schema: &SchemaRegistry,
) -> Result<&'a mut MessageNode, MergeError> {
    let invalid = |segment: &str, reason: String| MergeError::InvalidMount {
        mount: path.to_string(),
        segment: segment.to_string(),
        reason,
    };

    let mut current = base;
    for segment in split_path(path) {
        let descriptor = schema
            .message(current.type_name())
            .ok_or_else(|| invalid(segment, format!("unknown message {}", current.type_name())))?;
        let field = descriptor.field(segment).ok_or_else(|| {
            invalid(
                segment,
                format!("message {} has no field '{}'", descriptor.name, segment),
            )
        })?;
        let FieldType::Message(child_type) = &field.field_type else {
            return Err(invalid(segment, format!("field '{}' is not a message", segment)));
        };
        if field.is_repeated() {
            return Err(invalid(segment, format!("field '{}' is repeated", segment)));
        }
        current = child_message(current, descriptor, field, child_type, path)?;
    }
    Ok(current)
}

/// Key under which `field` is stored in `node`.
///
/// Oneof members live under their group name. Members of the task selector
/// are keyed by field name until the selector has been collapsed.
pub(crate) fn storage_key(
    node: &MessageNode,
    descriptor: &MessageDescriptor,
    field: &FieldDescriptor,
) -> String {
    match &field.oneof {
        Some(group)
            if !descriptor.is_selector(group)
                || matches!(node.fields.get(group), Some(ConfigNode::Oneof(_))) =>
        {
            group.clone()
        }
        _ => field.name.clone(),
    }
}

/// Store `value` for `field` in `node`, replacing whatever was there.
pub(crate) fn put_field(
    node: &mut MessageNode,
    descriptor: &MessageDescriptor,
    field: &FieldDescriptor,
    value: ConfigNode,
) {
    let key = storage_key(node, descriptor, field);
    let value = if key == field.name {
        value
    } else {
        ConfigNode::oneof(&field.name, value)
    };
    node.fields.insert(key, value);
}

fn child_message<'a>(
    node: &'a mut MessageNode,
    descriptor: &MessageDescriptor,
    field: &FieldDescriptor,
    child_type: &str,
    path: &str,
) -> Result<&'a mut MessageNode, MergeError> {
    let key = storage_key(node, descriptor, field);
    let in_group = key != field.name;
    let fresh = || ConfigNode::Message(MessageNode::new(child_type));

    let slot = node.fields.entry(key).or_insert_with(|| {
        if in_group {
            ConfigNode::oneof(&field.name, fresh())
        } else {
            fresh()
        }
    });

    // A different oneof member (or a stray value) is replaced by a fresh message.
    let reusable = match slot {
        ConfigNode::Oneof(o) => {
            in_group && o.field == field.name && matches!(*o.value, ConfigNode::Message(_))
        }
        ConfigNode::Message(_) => !in_group,
        _ => false,
    };
    if !reusable {
        *slot = if in_group {
            ConfigNode::oneof(&field.name, fresh())
        } else {
            fresh()
        };
    }

    match slot {
        ConfigNode::Message(m) => Ok(m),
        ConfigNode::Oneof(o) => match o.value.as_mut() {
            ConfigNode::Message(m) => Ok(m),
            other => Err(MergeError::TypeMismatch {
                mount: path.to_string(),
                expected: child_type.to_string(),
                found: other.shape_name().to_string(),
            }),
        },
        other => Err(MergeError::TypeMismatch {
            mount: path.to_string(),
            expected: child_type.to_string(),
            found: other.shape_name().to_string(),
        }),
    }
}

/// Merge two messages of the same type, `incoming` taking precedence.
pub fn merge_message(
    base: &mut MessageNode,
    incoming: MessageNode,
    schema: &SchemaRegistry,
) -> Result<(), MergeError> {
    if base.type_name() != incoming.type_name() {
        return Err(MergeError::TypeMismatch {
            mount: String::new(),
            expected: base.type_name().to_string(),
            found: incoming.type_name().to_string(),
        });
    }
    let descriptor = schema.message(base.type_name());

    for (key, node) in incoming.fields {
        let merged = match base.fields.remove(&key) {
            Some(existing) => {
                let append = descriptor
                    .and_then(|d| d.field(&key))
                    .is_some_and(|f| f.repeated_merge == RepeatedMerge::Append);
                merge_node(existing, node, append, schema)?
            }
            None => node,
        };
        base.fields.insert(key, merged);
    }
    Ok(())
}

fn merge_node(
    existing: ConfigNode,
    incoming: ConfigNode,
    append: bool,
    schema: &SchemaRegistry,
) -> Result<ConfigNode, MergeError> {
    Ok(match (existing, incoming) {
        // Defaults fill gaps only.
        (
            existing,
            ConfigNode::Scalar(ScalarNode {
                presence: Presence::Default,
                ..
            }),
        ) => existing,
        (ConfigNode::Message(mut base), ConfigNode::Message(incoming)) => {
            merge_message(&mut base, incoming, schema)?;
            ConfigNode::Message(base)
        }
        (ConfigNode::Oneof(mut base), ConfigNode::Oneof(incoming))
            if base.field == incoming.field =>
        {
            let merged = merge_node(*base.value, *incoming.value, false, schema)?;
            base.value = Box::new(merged);
            ConfigNode::Oneof(base)
        }
        (ConfigNode::Repeated(mut base), ConfigNode::Repeated(incoming)) if append => {
            base.extend(incoming);
            ConfigNode::Repeated(base)
        }
        (_, incoming) => incoming,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Value;
    use crate::config::parser::parse_document;
    use crate::schema::builtin;

    fn message(type_name: &str, text: &str) -> MessageNode {
        parse_document(text, type_name, builtin()).unwrap().body
    }

    fn value<'a>(node: &'a MessageNode, path: &str) -> Option<&'a Value> {
        node.lookup(path).and_then(|n| n.as_value())
    }

    #[test]
    fn test_merge_at_mount_creates_intermediates() {
        let schema = builtin();
        let mut root = MessageNode::new("MetaCfg");
        let launcher = message("Launcher", "slurm { num_gpus: 4 }");
        merge(&mut root, "train.launcher", ConfigNode::Message(launcher), schema).unwrap();
        assert_eq!(
            value(&root, "train.launcher.slurm.num_gpus"),
            Some(&Value::Int(4))
        );
    }

    #[test]
    fn test_later_scalar_wins() {
        let schema = builtin();
        let mut root = MessageNode::new("MetaCfg");
        for alpha in ["1.0", "0.5"] {
            let params = message("DatasetParams", &format!("value_decay_alpha: {}", alpha));
            merge(&mut root, "train.dataset_params", ConfigNode::Message(params), schema).unwrap();
        }
        assert_eq!(
            value(&root, "train.dataset_params.value_decay_alpha"),
            Some(&Value::Float(0.5))
        );
    }

    #[test]
    fn test_default_does_not_replace_explicit() {
        let schema = builtin();
        let mut base = message("TrainTask", "lr: 0.1 batch_size: 3");
        // `lr` is only a default in the incoming message.
        let incoming = message("TrainTask", "batch_size: 4");
        merge_message(&mut base, incoming, schema).unwrap();
        assert_eq!(value(&base, "lr"), Some(&Value::Float(0.1)));
        assert_eq!(value(&base, "batch_size"), Some(&Value::Int(4)));
        assert!(base.get("lr").unwrap().is_explicit());
    }

    #[test]
    fn test_repeated_replaced_wholesale() {
        use crate::schema::{FieldDescriptor, PrimitiveType};

        let schema = SchemaRegistry::new(
            "Root",
            vec![
                MessageDescriptor::new("Root")
                    .with_selector("task")
                    .with_field(FieldDescriptor::message("job", 1, "Job").in_oneof("task")),
                MessageDescriptor::new("Job").with_field(
                    FieldDescriptor::primitive("tags", 1, PrimitiveType::String).repeated(),
                ),
            ],
            vec![],
        )
        .unwrap();
        let job = |text: &str| parse_document(text, "Job", &schema).unwrap().body;

        let mut base = job("tags: [\"a\", \"b\"]");
        merge_message(&mut base, job("tags: \"c\""), &schema).unwrap();
        assert_eq!(
            base.get("tags").and_then(|n| n.as_repeated()).map(|items| items.len()),
            Some(1)
        );
        assert_eq!(
            base.get("tags").and_then(|n| n.as_repeated()).unwrap()[0].as_value(),
            Some(&Value::Str("c".into()))
        );
    }

    #[test]
    fn test_append_policy_concatenates() {
        let schema = builtin();
        let mut base = message("DatasetParams", "data_cache: [\"a\", \"b\"]");
        let incoming = message("DatasetParams", "data_cache: \"c\"");
        merge_message(&mut base, incoming, schema).unwrap();
        let items: Vec<_> = base
            .get("data_cache")
            .and_then(|n| n.as_repeated())
            .unwrap()
            .iter()
            .filter_map(|n| n.as_value().cloned())
            .collect();
        assert_eq!(
            items,
            vec![
                Value::Str("a".into()),
                Value::Str("b".into()),
                Value::Str("c".into())
            ]
        );
    }

    #[test]
    fn test_oneof_member_replaced_by_other_member() {
        let schema = builtin();
        let mut base = message("Launcher", "local { use_local: false }");
        let incoming = message("Launcher", "slurm { num_gpus: 2 }");
        merge_message(&mut base, incoming, schema).unwrap();
        assert_eq!(base.which_oneof("launcher"), Some("slurm"));
        assert!(base.get("local").is_none());
    }

    #[test]
    fn test_oneof_same_member_merges() {
        let schema = builtin();
        let mut base = message("Launcher", "slurm { num_gpus: 2 partition: \"dev\" }");
        let incoming = message("Launcher", "slurm { num_gpus: 8 }");
        merge_message(&mut base, incoming, schema).unwrap();
        assert_eq!(value(&base, "slurm.num_gpus"), Some(&Value::Int(8)));
        assert_eq!(value(&base, "slurm.partition"), Some(&Value::Str("dev".into())));
    }

    #[test]
    fn test_navigate_selects_oneof_member() {
        let schema = builtin();
        let mut launcher = message("Launcher", "local {}");
        let slurm = navigate(&mut launcher, "slurm", schema).unwrap();
        assert_eq!(slurm.type_name(), "SlurmLauncher");
        assert_eq!(launcher.which_oneof("launcher"), Some("slurm"));
    }

    #[test]
    fn test_invalid_mounts() {
        let schema = builtin();
        let mut root = MessageNode::new("MetaCfg");
        let empty = || ConfigNode::Message(MessageNode::new("Launcher"));

        let err = merge(&mut root, "train.nope", empty(), schema).unwrap_err();
        assert!(matches!(err, MergeError::InvalidMount { ref segment, .. } if segment == "nope"));

        let err = merge(&mut root, "train.batch_size", empty(), schema).unwrap_err();
        assert!(matches!(err, MergeError::InvalidMount { .. }));

        let err = merge(&mut root, "train.dataset_params", empty(), schema).unwrap_err();
        assert!(matches!(err, MergeError::TypeMismatch { .. }));
    }
}
