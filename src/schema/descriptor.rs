//! Message, enum and field descriptors.

use crate::config::Value;
use serde::Serialize;

/// Primitive scalar types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveType {
    Bool,
    Int32,
    Int64,
    UInt32,
    Float,
    Double,
    String,
}

impl PrimitiveType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrimitiveType::Bool => "bool",
            PrimitiveType::Int32 => "int32",
            PrimitiveType::Int64 => "int64",
            PrimitiveType::UInt32 => "uint32",
            PrimitiveType::Float => "float",
            PrimitiveType::Double => "double",
            PrimitiveType::String => "string",
        }
    }

    /// Check that `value` is representable as this type.
    pub fn check(&self, value: &Value) -> Result<(), String> {
        match (self, value) {
            (PrimitiveType::Bool, Value::Bool(_)) => Ok(()),
            (PrimitiveType::Int32, Value::Int(n)) => check_range(*n, i32::MIN as i64, i32::MAX as i64),
            (PrimitiveType::UInt32, Value::Int(n)) => check_range(*n, 0, u32::MAX as i64),
            (PrimitiveType::Int64, Value::Int(_)) => Ok(()),
            (PrimitiveType::Float, Value::Float(x)) => check_float_range(*x),
            (PrimitiveType::Double, Value::Float(_)) => Ok(()),
            (PrimitiveType::String, Value::Str(_)) => Ok(()),
            (expected, found) => Err(format!(
                "expected {}, found {}",
                expected.as_str(),
                found.kind_name()
            )),
        }
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self, PrimitiveType::Bool | PrimitiveType::String)
    }
}

// inf and nan are representable; only finite values past f32::MAX overflow.
fn check_float_range(x: f64) -> Result<(), String> {
    if x.is_finite() && x.abs() > f32::MAX as f64 {
        Err(format!("{} is out of range for float", x))
    } else {
        Ok(())
    }
}

fn check_range(n: i64, min: i64, max: i64) -> Result<(), String> {
    if n < min || n > max {
        Err(format!("{} is out of range [{}, {}]", n, min, max))
    } else {
        Ok(())
    }
}

/// Declared type of a field's values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Primitive(PrimitiveType),
    Enum(String),
    Message(String),
}

impl FieldType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldType::Primitive(p) if p.is_numeric())
    }

    pub fn message_name(&self) -> Option<&str> {
        match self {
            FieldType::Message(name) => Some(name),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            FieldType::Primitive(p) => p.as_str(),
            FieldType::Enum(name) | FieldType::Message(name) => name,
        }
    }
}

/// Field cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    Singular,
    Repeated,
}

/// How a repeated field combines with an earlier declaration when merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatedMerge {
    /// Later declaration discards the earlier list (default).
    #[default]
    Replace,
    /// Later declaration is concatenated after the earlier list.
    Append,
}

/// Coarse field classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Scalar,
    Message,
    Repeated,
    OneofMember,
}

/// Inclusive numeric bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub fn contains(&self, x: f64) -> bool {
        x >= self.min && x <= self.max
    }
}

/// A single field declaration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDescriptor {
    pub name: String,
    /// Durable identity of the field; unique within its message.
    pub tag: u32,
    pub label: Label,
    pub field_type: FieldType,
    /// Oneof group this field belongs to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oneof: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Bounds>,
    pub repeated_merge: RepeatedMerge,
}

impl FieldDescriptor {
    fn new(name: impl Into<String>, tag: u32, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            tag,
            label: Label::Singular,
            field_type,
            oneof: None,
            default: None,
            required: false,
            bounds: None,
            repeated_merge: RepeatedMerge::Replace,
        }
    }

    pub fn primitive(name: impl Into<String>, tag: u32, ty: PrimitiveType) -> Self {
        Self::new(name, tag, FieldType::Primitive(ty))
    }

    pub fn enumeration(name: impl Into<String>, tag: u32, enum_name: impl Into<String>) -> Self {
        Self::new(name, tag, FieldType::Enum(enum_name.into()))
    }

    pub fn message(name: impl Into<String>, tag: u32, type_name: impl Into<String>) -> Self {
        Self::new(name, tag, FieldType::Message(type_name.into()))
    }

    pub fn repeated(mut self) -> Self {
        self.label = Label::Repeated;
        self
    }

    pub fn in_oneof(mut self, group: impl Into<String>) -> Self {
        self.oneof = Some(group.into());
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn bounded(mut self, min: f64, max: f64) -> Self {
        self.bounds = Some(Bounds { min, max });
        self
    }

    /// Opt this repeated field into append-on-merge.
    pub fn append_on_merge(mut self) -> Self {
        self.repeated_merge = RepeatedMerge::Append;
        self
    }

    pub fn is_repeated(&self) -> bool {
        self.label == Label::Repeated
    }

    pub fn is_message(&self) -> bool {
        matches!(self.field_type, FieldType::Message(_))
    }

    pub fn kind(&self) -> FieldKind {
        if self.oneof.is_some() {
            FieldKind::OneofMember
        } else if self.is_repeated() {
            FieldKind::Repeated
        } else if self.is_message() {
            FieldKind::Message
        } else {
            FieldKind::Scalar
        }
    }
}

/// A message type: an ordered list of uniquely named fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageDescriptor {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
    /// Oneof group whose selection is deferred to the resolver.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
}

impl MessageDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            selector: None,
        }
    }

    pub fn with_field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    /// Mark `group` as the task selector of this message.
    pub fn with_selector(mut self, group: impl Into<String>) -> Self {
        self.selector = Some(group.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Fields belonging to oneof `group`, in declaration order.
    pub fn oneof_members<'a>(
        &'a self,
        group: &'a str,
    ) -> impl Iterator<Item = &'a FieldDescriptor> + 'a {
        self.fields
            .iter()
            .filter(move |f| f.oneof.as_deref() == Some(group))
    }

    /// Distinct oneof group names, in first-declaration order.
    pub fn oneof_groups(&self) -> Vec<&str> {
        let mut groups: Vec<&str> = Vec::new();
        for group in self.fields.iter().filter_map(|f| f.oneof.as_deref()) {
            if !groups.contains(&group) {
                groups.push(group);
            }
        }
        groups
    }

    pub fn is_selector(&self, group: &str) -> bool {
        self.selector.as_deref() == Some(group)
    }
}

/// An enum type: symbols with their numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnumDescriptor {
    pub name: String,
    pub values: Vec<(String, i32)>,
}

impl EnumDescriptor {
    pub fn new(name: impl Into<String>, values: &[(&str, i32)]) -> Self {
        Self {
            name: name.into(),
            values: values.iter().map(|(s, n)| (s.to_string(), *n)).collect(),
        }
    }

    pub fn number(&self, symbol: &str) -> Option<i32> {
        self.values.iter().find(|(s, _)| s == symbol).map(|(_, n)| *n)
    }

    pub fn symbol(&self, number: i32) -> Option<&str> {
        self.values
            .iter()
            .find(|(_, n)| *n == number)
            .map(|(s, _)| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int32_range_checked() {
        assert!(PrimitiveType::Int32.check(&Value::Int(7)).is_ok());
        assert!(PrimitiveType::Int32.check(&Value::Int(1 << 40)).is_err());
        assert!(PrimitiveType::UInt32.check(&Value::Int(-1)).is_err());
        assert!(PrimitiveType::Int64.check(&Value::Int(1 << 40)).is_ok());
    }

    #[test]
    fn test_float_range_checked() {
        assert!(PrimitiveType::Float.check(&Value::Float(0.001)).is_ok());
        assert!(PrimitiveType::Float.check(&Value::Float(-3.0e38)).is_ok());
        assert!(PrimitiveType::Float.check(&Value::Float(f64::INFINITY)).is_ok());
        assert!(PrimitiveType::Float.check(&Value::Float(1e300)).is_err());
        assert!(PrimitiveType::Float.check(&Value::Float(-1e39)).is_err());
        assert!(PrimitiveType::Double.check(&Value::Float(1e300)).is_ok());
    }

    #[test]
    fn test_kind_classification() {
        let scalar = FieldDescriptor::primitive("a", 1, PrimitiveType::Int32);
        let message = FieldDescriptor::message("b", 2, "M");
        let repeated = FieldDescriptor::primitive("c", 3, PrimitiveType::String).repeated();
        let member = FieldDescriptor::message("d", 4, "M").in_oneof("g");
        assert_eq!(scalar.kind(), FieldKind::Scalar);
        assert_eq!(message.kind(), FieldKind::Message);
        assert_eq!(repeated.kind(), FieldKind::Repeated);
        assert_eq!(member.kind(), FieldKind::OneofMember);
    }

    #[test]
    fn test_oneof_groups_in_order() {
        let m = MessageDescriptor::new("M")
            .with_field(FieldDescriptor::message("x", 1, "A").in_oneof("second"))
            .with_field(FieldDescriptor::message("y", 2, "A").in_oneof("first"))
            .with_field(FieldDescriptor::message("z", 3, "A").in_oneof("second"));
        assert_eq!(m.oneof_groups(), vec!["second", "first"]);
        let members: Vec<_> = m.oneof_members("second").map(|f| f.name.as_str()).collect();
        assert_eq!(members, vec!["x", "z"]);
    }

    #[test]
    fn test_enum_lookup() {
        let e = EnumDescriptor::new("Power", &[("AUSTRIA", 0), ("ENGLAND", 1)]);
        assert_eq!(e.number("ENGLAND"), Some(1));
        assert_eq!(e.symbol(0), Some("AUSTRIA"));
        assert_eq!(e.number("FRANCE"), None);
    }
}
