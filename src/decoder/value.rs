//! Decoded values and the bridge to caller types.

use super::descriptor::{EnumDescriptor, TypeDescriptor};
use crate::node::{ConfigNode, NodeRef};
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use regex_lite::Regex;
use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value, json};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::hash::Hash;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// Dynamic result of a decode, converted to caller types via [`ConfigType`].
#[derive(Debug, Clone)]
pub enum DecodedValue {
    /// Absent value, e.g. a missing array slot or an empty optional.
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Char(char),
    String(String),
    Duration(Duration),
    Date(NaiveDate),
    DateTime(DateTime<FixedOffset>),
    Uuid(Uuid),
    Pattern(Regex),
    Path(PathBuf),
    Enum(String),
    List(Vec<DecodedValue>),
    Map(Vec<(DecodedValue, DecodedValue)>),
    Object(BTreeMap<String, DecodedValue>),
    Node(NodeRef),
}

impl PartialEq for DecodedValue {
    fn eq(&self, other: &Self) -> bool {
        use DecodedValue::*;
        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (UInt(a), UInt(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (Char(a), Char(b)) => a == b,
            (String(a), String(b)) => a == b,
            (Duration(a), Duration(b)) => a == b,
            (Date(a), Date(b)) => a == b,
            (DateTime(a), DateTime(b)) => a == b,
            (Uuid(a), Uuid(b)) => a == b,
            (Pattern(a), Pattern(b)) => a.as_str() == b.as_str(),
            (Path(a), Path(b)) => a == b,
            (Enum(a), Enum(b)) => a == b,
            (List(a), List(b)) => a == b,
            (Map(a), Map(b)) => a == b,
            (Object(a), Object(b)) => a == b,
            (Node(a), Node(b)) => a == b,
            _ => false,
        }
    }
}

impl DecodedValue {
    pub fn is_null(&self) -> bool {
        matches!(self, DecodedValue::Null)
    }

    /// Short name of the variant, used in conversion errors.
    pub fn kind_name(&self) -> &'static str {
        match self {
            DecodedValue::Null => "null",
            DecodedValue::Bool(_) => "bool",
            DecodedValue::Int(_) => "int",
            DecodedValue::UInt(_) => "uint",
            DecodedValue::Float(_) => "float",
            DecodedValue::Char(_) => "char",
            DecodedValue::String(_) => "string",
            DecodedValue::Duration(_) => "duration",
            DecodedValue::Date(_) => "date",
            DecodedValue::DateTime(_) => "date-time",
            DecodedValue::Uuid(_) => "uuid",
            DecodedValue::Pattern(_) => "pattern",
            DecodedValue::Path(_) => "path",
            DecodedValue::Enum(_) => "enum",
            DecodedValue::List(_) => "list",
            DecodedValue::Map(_) => "map",
            DecodedValue::Object(_) => "object",
            DecodedValue::Node(_) => "node",
        }
    }

    /// Text form of scalar values, used for map keys and display.
    pub fn to_key_string(&self) -> String {
        match self {
            DecodedValue::Null => String::new(),
            DecodedValue::Bool(b) => b.to_string(),
            DecodedValue::Int(i) => i.to_string(),
            DecodedValue::UInt(u) => u.to_string(),
            DecodedValue::Float(f) => f.to_string(),
            DecodedValue::Char(c) => c.to_string(),
            DecodedValue::String(s) | DecodedValue::Enum(s) => s.clone(),
            DecodedValue::Uuid(u) => u.to_string(),
            DecodedValue::Pattern(p) => p.as_str().to_string(),
            DecodedValue::Path(p) => p.to_string_lossy().into_owned(),
            DecodedValue::Date(d) => d.to_string(),
            DecodedValue::DateTime(d) => d.to_rfc3339(),
            other => other.to_json().to_string(),
        }
    }

    /// JSON form, shaped so serde can deserialize caller structs from it.
    pub fn to_json(&self) -> Value {
        match self {
            DecodedValue::Null => Value::Null,
            DecodedValue::Bool(b) => Value::Bool(*b),
            DecodedValue::Int(i) => json!(i),
            DecodedValue::UInt(u) => json!(u),
            DecodedValue::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
            DecodedValue::Duration(d) => json!({ "secs": d.as_secs(), "nanos": d.subsec_nanos() }),
            DecodedValue::List(items) => Value::Array(items.iter().map(DecodedValue::to_json).collect()),
            DecodedValue::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.to_key_string(), v.to_json()))
                    .collect::<Map<_, _>>(),
            ),
            DecodedValue::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect::<Map<_, _>>(),
            ),
            DecodedValue::Node(node) => node_to_json(node),
            scalar => Value::String(scalar.to_key_string()),
        }
    }

    /// Deserialize into a serde type through the JSON form.
    pub fn deserialize<T: DeserializeOwned>(self) -> Result<T, String> {
        serde_json::from_value(self.to_json()).map_err(|e| e.to_string())
    }
}

fn node_to_json(node: &ConfigNode) -> Value {
    match node {
        ConfigNode::Leaf { value, .. } => value.clone().map(Value::String).unwrap_or(Value::Null),
        ConfigNode::Map { entries, .. } => Value::Object(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), node_to_json(v)))
                .collect::<Map<_, _>>(),
        ),
        ConfigNode::Array { elements, .. } => Value::Array(
            elements
                .iter()
                .map(|e| e.as_deref().map(node_to_json).unwrap_or(Value::Null))
                .collect(),
        ),
    }
}

fn mismatch<T>(expected: &str, found: &DecodedValue) -> Result<T, String> {
    Err(format!("expected {}, found {}", expected, found.kind_name()))
}

/// A Rust type that can be requested from the engine.
///
/// Structs usually describe their fields with
/// [`ObjectDescriptor`](super::ObjectDescriptor) and delegate conversion to
/// [`DecodedValue::deserialize`].
pub trait ConfigType: Sized {
    fn descriptor() -> TypeDescriptor;
    fn from_decoded(value: DecodedValue) -> Result<Self, String>;
}

impl ConfigType for bool {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Bool
    }

    fn from_decoded(value: DecodedValue) -> Result<Self, String> {
        match value {
            DecodedValue::Bool(b) => Ok(b),
            other => mismatch("bool", &other),
        }
    }
}

macro_rules! impl_integer {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl ConfigType for $ty {
                fn descriptor() -> TypeDescriptor {
                    TypeDescriptor::$kind
                }

                fn from_decoded(value: DecodedValue) -> Result<Self, String> {
                    match value {
                        DecodedValue::Int(i) => <$ty>::try_from(i).map_err(|e| e.to_string()),
                        DecodedValue::UInt(u) => <$ty>::try_from(u).map_err(|e| e.to_string()),
                        other => mismatch(stringify!($ty), &other),
                    }
                }
            }
        )*
    };
}

impl_integer!(
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    isize => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    usize => U64,
);

impl ConfigType for f64 {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::F64
    }

    fn from_decoded(value: DecodedValue) -> Result<Self, String> {
        match value {
            DecodedValue::Float(f) => Ok(f),
            DecodedValue::Int(i) => Ok(i as f64),
            DecodedValue::UInt(u) => Ok(u as f64),
            other => mismatch("f64", &other),
        }
    }
}

impl ConfigType for f32 {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::F32
    }

    fn from_decoded(value: DecodedValue) -> Result<Self, String> {
        f64::from_decoded(value).map(|f| f as f32)
    }
}

impl ConfigType for char {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Char
    }

    fn from_decoded(value: DecodedValue) -> Result<Self, String> {
        match value {
            DecodedValue::Char(c) => Ok(c),
            other => mismatch("char", &other),
        }
    }
}

impl ConfigType for String {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::String
    }

    fn from_decoded(value: DecodedValue) -> Result<Self, String> {
        match value {
            DecodedValue::String(s) => Ok(s),
            other => mismatch("string", &other),
        }
    }
}

impl ConfigType for Duration {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Duration
    }

    fn from_decoded(value: DecodedValue) -> Result<Self, String> {
        match value {
            DecodedValue::Duration(d) => Ok(d),
            other => mismatch("duration", &other),
        }
    }
}

impl ConfigType for NaiveDate {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Date
    }

    fn from_decoded(value: DecodedValue) -> Result<Self, String> {
        match value {
            DecodedValue::Date(d) => Ok(d),
            other => mismatch("date", &other),
        }
    }
}

impl ConfigType for DateTime<FixedOffset> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::DateTime
    }

    fn from_decoded(value: DecodedValue) -> Result<Self, String> {
        match value {
            DecodedValue::DateTime(d) => Ok(d),
            other => mismatch("date-time", &other),
        }
    }
}

impl ConfigType for DateTime<Utc> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::DateTime
    }

    fn from_decoded(value: DecodedValue) -> Result<Self, String> {
        DateTime::<FixedOffset>::from_decoded(value).map(|d| d.with_timezone(&Utc))
    }
}

impl ConfigType for Uuid {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Uuid
    }

    fn from_decoded(value: DecodedValue) -> Result<Self, String> {
        match value {
            DecodedValue::Uuid(u) => Ok(u),
            other => mismatch("uuid", &other),
        }
    }
}

impl ConfigType for Regex {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Pattern
    }

    fn from_decoded(value: DecodedValue) -> Result<Self, String> {
        match value {
            DecodedValue::Pattern(p) => Ok(p),
            other => mismatch("pattern", &other),
        }
    }
}

impl ConfigType for PathBuf {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Path
    }

    fn from_decoded(value: DecodedValue) -> Result<Self, String> {
        match value {
            DecodedValue::Path(p) => Ok(p),
            other => mismatch("path", &other),
        }
    }
}

impl ConfigType for NodeRef {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Node
    }

    fn from_decoded(value: DecodedValue) -> Result<Self, String> {
        match value {
            DecodedValue::Node(n) => Ok(n),
            other => mismatch("node", &other),
        }
    }
}

impl<T: ConfigType> ConfigType for Option<T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::optional(T::descriptor())
    }

    fn from_decoded(value: DecodedValue) -> Result<Self, String> {
        match value {
            DecodedValue::Null => Ok(None),
            other => T::from_decoded(other).map(Some),
        }
    }
}

fn list_items(value: DecodedValue) -> Result<Vec<DecodedValue>, String> {
    match value {
        DecodedValue::List(items) => Ok(items),
        other => mismatch("list", &other),
    }
}

impl<T: ConfigType> ConfigType for Vec<T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::list(T::descriptor())
    }

    fn from_decoded(value: DecodedValue) -> Result<Self, String> {
        list_items(value)?.into_iter().map(T::from_decoded).collect()
    }
}

impl<T: ConfigType, const N: usize> ConfigType for [T; N] {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Array(Box::new(T::descriptor()))
    }

    fn from_decoded(value: DecodedValue) -> Result<Self, String> {
        let items: Vec<T> = list_items(value)?
            .into_iter()
            .map(T::from_decoded)
            .collect::<Result<_, _>>()?;
        let length = items.len();
        items
            .try_into()
            .map_err(|_| format!("expected {} elements, found {}", N, length))
    }
}

impl<T: ConfigType + Eq + Hash> ConfigType for HashSet<T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::set(T::descriptor())
    }

    fn from_decoded(value: DecodedValue) -> Result<Self, String> {
        list_items(value)?.into_iter().map(T::from_decoded).collect()
    }
}

impl<T: ConfigType + Ord> ConfigType for BTreeSet<T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::set(T::descriptor())
    }

    fn from_decoded(value: DecodedValue) -> Result<Self, String> {
        list_items(value)?.into_iter().map(T::from_decoded).collect()
    }
}

fn map_entries(value: DecodedValue) -> Result<Vec<(DecodedValue, DecodedValue)>, String> {
    match value {
        DecodedValue::Map(entries) => Ok(entries),
        other => mismatch("map", &other),
    }
}

impl<K: ConfigType + Eq + Hash, V: ConfigType> ConfigType for HashMap<K, V> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::map(K::descriptor(), V::descriptor())
    }

    fn from_decoded(value: DecodedValue) -> Result<Self, String> {
        map_entries(value)?
            .into_iter()
            .map(|(k, v)| Ok((K::from_decoded(k)?, V::from_decoded(v)?)))
            .collect()
    }
}

impl<K: ConfigType + Ord, V: ConfigType> ConfigType for BTreeMap<K, V> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::map(K::descriptor(), V::descriptor())
    }

    fn from_decoded(value: DecodedValue) -> Result<Self, String> {
        map_entries(value)?
            .into_iter()
            .map(|(k, v)| Ok((K::from_decoded(k)?, V::from_decoded(v)?)))
            .collect()
    }
}

/// Describe a string-backed enum for use in [`ConfigType::descriptor`].
pub fn enum_descriptor<S: Into<String>>(
    name: &str,
    variants: impl IntoIterator<Item = S>,
) -> TypeDescriptor {
    TypeDescriptor::Enum(EnumDescriptor::new(name, variants))
}
