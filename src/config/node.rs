//! In-memory configuration tree.
//!
//! A tree is owned by exactly one resolution. Regular fields are keyed by
//! field name. Members of a oneof group are stored under the group name as a
//! [`ConfigNode::Oneof`], which makes "at most one member" structural. The
//! root task selector is the exception: its members stay keyed by field name
//! until the resolver picks the task.

use serde::Serialize;
use serde_json::{Map, Value as Json};
use std::collections::BTreeMap;
use std::fmt;

/// A primitive value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Enum symbol.
    Enum(String),
}

impl Value {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Enum(_) => "enum symbol",
        }
    }

    /// Numeric view used for bounds checks.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    fn to_json(&self) -> Json {
        match self {
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(n) => Json::from(*n),
            Value::Float(x) => serde_json::Number::from_f64(*x)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::Str(s) | Value::Enum(s) => Json::String(s.clone()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Enum(s) => write!(f, "{}", s),
        }
    }
}

/// Whether a scalar was written by a document or filled from the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Explicit,
    Default,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScalarNode {
    pub value: Value,
    pub presence: Presence,
}

/// The selected member of a oneof group.
#[derive(Debug, Clone, PartialEq)]
pub struct OneofNode {
    pub field: String,
    pub value: Box<ConfigNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigNode {
    Scalar(ScalarNode),
    Message(MessageNode),
    Repeated(Vec<ConfigNode>),
    Oneof(OneofNode),
}

impl ConfigNode {
    pub fn explicit(value: Value) -> Self {
        ConfigNode::Scalar(ScalarNode {
            value,
            presence: Presence::Explicit,
        })
    }

    pub fn default_value(value: Value) -> Self {
        ConfigNode::Scalar(ScalarNode {
            value,
            presence: Presence::Default,
        })
    }

    pub fn oneof(field: impl Into<String>, value: ConfigNode) -> Self {
        ConfigNode::Oneof(OneofNode {
            field: field.into(),
            value: Box::new(value),
        })
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            ConfigNode::Scalar(s) => Some(&s.value),
            _ => None,
        }
    }

    pub fn as_message(&self) -> Option<&MessageNode> {
        match self {
            ConfigNode::Message(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_repeated(&self) -> Option<&[ConfigNode]> {
        match self {
            ConfigNode::Repeated(items) => Some(items),
            _ => None,
        }
    }

    /// False only for scalars filled in from a schema default.
    pub fn is_explicit(&self) -> bool {
        !matches!(
            self,
            ConfigNode::Scalar(ScalarNode {
                presence: Presence::Default,
                ..
            })
        )
    }

    pub fn shape_name(&self) -> &'static str {
        match self {
            ConfigNode::Scalar(s) => s.value.kind_name(),
            ConfigNode::Message(_) => "message",
            ConfigNode::Repeated(_) => "list",
            ConfigNode::Oneof(_) => "oneof",
        }
    }

    pub fn to_json(&self) -> Json {
        match self {
            ConfigNode::Scalar(s) => s.value.to_json(),
            ConfigNode::Message(m) => m.to_json(),
            ConfigNode::Repeated(items) => Json::Array(items.iter().map(|n| n.to_json()).collect()),
            ConfigNode::Oneof(o) => {
                let mut map = Map::new();
                map.insert(o.field.clone(), o.value.to_json());
                Json::Object(map)
            }
        }
    }
}

/// A message value: the fields present, keyed as described at module level.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageNode {
    type_name: String,
    pub(crate) fields: BTreeMap<String, ConfigNode>,
}

impl MessageNode {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Raw entries: field names, oneof group names, or selector members.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &ConfigNode)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Look up a field by name, looking inside oneof groups.
    pub fn get(&self, name: &str) -> Option<&ConfigNode> {
        self.fields.get(name).and_then(|node| match node {
            // A group key, not a field.
            ConfigNode::Oneof(_) => None,
            other => Some(other),
        })
        .or_else(|| {
            self.fields.values().find_map(|node| match node {
                ConfigNode::Oneof(o) if o.field == name => Some(o.value.as_ref()),
                _ => None,
            })
        })
    }

    /// Selected member of a oneof group stored in this message.
    pub fn which_oneof(&self, group: &str) -> Option<&str> {
        match self.fields.get(group) {
            Some(ConfigNode::Oneof(o)) => Some(&o.field),
            _ => None,
        }
    }

    /// Walk a dotted path of message fields.
    pub fn lookup(&self, path: &str) -> Option<&ConfigNode> {
        let mut segments = crate::schema::split_path(path).peekable();
        let mut current = self;
        while let Some(segment) = segments.next() {
            let node = current.get(segment)?;
            if segments.peek().is_none() {
                return Some(node);
            }
            current = node.as_message()?;
        }
        None
    }

    pub fn to_json(&self) -> Json {
        let mut map = Map::new();
        for (key, node) in &self.fields {
            match node {
                ConfigNode::Oneof(o) => {
                    map.insert(o.field.clone(), o.value.to_json());
                }
                other => {
                    map.insert(key.clone(), other.to_json());
                }
            }
        }
        Json::Object(map)
    }
}

/// `includes { path: ... mount: ... }` entry of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncludeDirective {
    pub path: String,
    /// Dotted field path the included document is spliced at; empty for the
    /// document root.
    pub mount: String,
}

impl IncludeDirective {
    pub fn new(path: impl Into<String>, mount: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mount: mount.into(),
        }
    }

    pub fn is_root_mount(&self) -> bool {
        crate::schema::split_path(&self.mount).next().is_none()
    }
}

/// A parsed document: its include directives and its own inline fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub includes: Vec<IncludeDirective>,
    pub body: MessageNode,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> MessageNode {
        let mut slurm = MessageNode::new("SlurmLauncher");
        slurm
            .fields
            .insert("num_gpus".into(), ConfigNode::explicit(Value::Int(4)));
        let mut launcher = MessageNode::new("Launcher");
        launcher.fields.insert(
            "launcher".into(),
            ConfigNode::oneof("slurm", ConfigNode::Message(slurm)),
        );
        let mut train = MessageNode::new("TrainTask");
        train
            .fields
            .insert("launcher".into(), ConfigNode::Message(launcher));
        train
            .fields
            .insert("lr".into(), ConfigNode::default_value(Value::Float(0.001)));
        train
    }

    #[test]
    fn test_lookup_through_oneof() {
        let train = sample();
        assert_eq!(
            train.lookup("launcher.slurm.num_gpus").and_then(|n| n.as_value()),
            Some(&Value::Int(4))
        );
        assert!(train.lookup("launcher.local").is_none());
        assert!(train.lookup("").is_none());
    }

    #[test]
    fn test_which_oneof() {
        let train = sample();
        let launcher = train.get("launcher").and_then(|n| n.as_message()).unwrap();
        assert_eq!(launcher.which_oneof("launcher"), Some("slurm"));
        // The group key itself is not a field.
        assert!(launcher.get("launcher").is_none());
    }

    #[test]
    fn test_presence() {
        let train = sample();
        assert!(!train.get("lr").unwrap().is_explicit());
        assert!(train.get("launcher").unwrap().is_explicit());
    }

    #[test]
    fn test_to_json_flattens_oneof() {
        let train = sample();
        assert_eq!(
            train.to_json(),
            json!({
                "launcher": {"slurm": {"num_gpus": 4}},
                "lr": 0.001
            })
        );
    }

    #[test]
    fn test_root_mount() {
        assert!(IncludeDirective::new("a", "").is_root_mount());
        assert!(IncludeDirective::new("a", ".").is_root_mount());
        assert!(!IncludeDirective::new("a", "train").is_root_mount());
    }
}
