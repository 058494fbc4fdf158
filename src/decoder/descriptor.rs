//! Explicit type descriptors used to select decoders.

use super::value::ConfigType;
use std::fmt;

/// Describes the target type of a decode.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDescriptor {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Char,
    String,
    Duration,
    Date,
    DateTime,
    Uuid,
    Pattern,
    Path,
    Enum(EnumDescriptor),
    Optional(Box<TypeDescriptor>),
    /// Fixed-size array.
    Array(Box<TypeDescriptor>),
    List(Box<TypeDescriptor>),
    Set(Box<TypeDescriptor>),
    Map(Box<TypeDescriptor>, Box<TypeDescriptor>),
    Object(ObjectDescriptor),
    /// The raw config node.
    Node,
    /// A caller-defined type handled by a caller-registered decoder.
    Custom(String),
}

impl TypeDescriptor {
    pub fn optional(inner: TypeDescriptor) -> Self {
        TypeDescriptor::Optional(Box::new(inner))
    }

    pub fn list(element: TypeDescriptor) -> Self {
        TypeDescriptor::List(Box::new(element))
    }

    pub fn set(element: TypeDescriptor) -> Self {
        TypeDescriptor::Set(Box::new(element))
    }

    pub fn map(key: TypeDescriptor, value: TypeDescriptor) -> Self {
        TypeDescriptor::Map(Box::new(key), Box::new(value))
    }

    pub fn is_optional(&self) -> bool {
        matches!(self, TypeDescriptor::Optional(_))
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            TypeDescriptor::I8
                | TypeDescriptor::I16
                | TypeDescriptor::I32
                | TypeDescriptor::I64
                | TypeDescriptor::U8
                | TypeDescriptor::U16
                | TypeDescriptor::U32
                | TypeDescriptor::U64
        )
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::Bool => write!(f, "bool"),
            TypeDescriptor::I8 => write!(f, "i8"),
            TypeDescriptor::I16 => write!(f, "i16"),
            TypeDescriptor::I32 => write!(f, "i32"),
            TypeDescriptor::I64 => write!(f, "i64"),
            TypeDescriptor::U8 => write!(f, "u8"),
            TypeDescriptor::U16 => write!(f, "u16"),
            TypeDescriptor::U32 => write!(f, "u32"),
            TypeDescriptor::U64 => write!(f, "u64"),
            TypeDescriptor::F32 => write!(f, "f32"),
            TypeDescriptor::F64 => write!(f, "f64"),
            TypeDescriptor::Char => write!(f, "char"),
            TypeDescriptor::String => write!(f, "String"),
            TypeDescriptor::Duration => write!(f, "Duration"),
            TypeDescriptor::Date => write!(f, "Date"),
            TypeDescriptor::DateTime => write!(f, "DateTime"),
            TypeDescriptor::Uuid => write!(f, "Uuid"),
            TypeDescriptor::Pattern => write!(f, "Pattern"),
            TypeDescriptor::Path => write!(f, "Path"),
            TypeDescriptor::Enum(e) => write!(f, "{}", e.name),
            TypeDescriptor::Optional(inner) => write!(f, "Option<{}>", inner),
            TypeDescriptor::Array(inner) => write!(f, "[{}]", inner),
            TypeDescriptor::List(inner) => write!(f, "List<{}>", inner),
            TypeDescriptor::Set(inner) => write!(f, "Set<{}>", inner),
            TypeDescriptor::Map(k, v) => write!(f, "Map<{}, {}>", k, v),
            TypeDescriptor::Object(o) => write!(f, "{}", o.name),
            TypeDescriptor::Node => write!(f, "ConfigNode"),
            TypeDescriptor::Custom(name) => write!(f, "{}", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumDescriptor {
    pub name: String,
    pub variants: Vec<String>,
}

impl EnumDescriptor {
    pub fn new<S: Into<String>>(name: impl Into<String>, variants: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: name.into(),
            variants: variants.into_iter().map(Into::into).collect(),
        }
    }
}

/// A field of an object target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldDescriptor {
    pub name: String,
    pub descriptor: TypeDescriptor,
    /// The field may be absent: it has a default or is optional.
    pub discretionary: bool,
}

/// Describes a struct-like target resolved field by field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectDescriptor {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
}

impl ObjectDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Add a field. `Option<T>` fields are discretionary automatically.
    pub fn field<T: ConfigType>(self, name: impl Into<String>) -> Self {
        let descriptor = T::descriptor();
        let discretionary = descriptor.is_optional();
        self.push(name.into(), descriptor, discretionary)
    }

    /// Add a field that falls back to a default when absent.
    pub fn defaulted_field<T: ConfigType>(self, name: impl Into<String>) -> Self {
        self.push(name.into(), T::descriptor(), true)
    }

    pub fn raw_field(self, name: impl Into<String>, descriptor: TypeDescriptor, discretionary: bool) -> Self {
        self.push(name.into(), descriptor, discretionary)
    }

    fn push(mut self, name: String, descriptor: TypeDescriptor, discretionary: bool) -> Self {
        self.fields.push(FieldDescriptor {
            name,
            descriptor,
            discretionary,
        });
        self
    }

    pub fn build(self) -> TypeDescriptor {
        TypeDescriptor::Object(self)
    }
}
