//! Type-directed decoding.
//!
//! A [`DecoderRegistry`] holds decoders in registration order. For each
//! decode it collects every decoder whose [`Decoder::matches`] accepts the
//! target [`TypeDescriptor`] and runs the first-registered one. Composite
//! decoders recurse back into the registry through [`DecoderContext`].

mod collection;
mod descriptor;
mod leaf;
mod object;
mod value;

pub use collection::{
    ArrayDecoder, ListDecoder, MapDecoder, NodeDecoder, OptionalDecoder, SetDecoder,
};
pub use descriptor::{EnumDescriptor, FieldDescriptor, ObjectDescriptor, TypeDescriptor};
pub use leaf::{
    BooleanDecoder, CharDecoder, DateDecoder, DateTimeDecoder, DurationDecoder, EnumDecoder,
    FloatDecoder, IntegerDecoder, PathDecoder, PatternDecoder, StringDecoder, UuidDecoder,
};
pub use object::ObjectDecoder;
pub use value::{ConfigType, DecodedValue, enum_descriptor};

use crate::lexer::PathLexer;
use crate::node::NodeRef;
use crate::settings::ConfigSettings;
use crate::tags::Tags;
use crate::validation::{Validated, ValidationError};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Documented precedence of a decoder. Selection uses registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Highest,
    VeryHigh,
    High,
    MediumHigh,
    Medium,
    MediumLow,
    Low,
    VeryLow,
    Lowest,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Priority::Highest => "HIGHEST",
            Priority::VeryHigh => "VERY_HIGH",
            Priority::High => "HIGH",
            Priority::MediumHigh => "MEDIUM_HIGH",
            Priority::Medium => "MEDIUM",
            Priority::MediumLow => "MEDIUM_LOW",
            Priority::Low => "LOW",
            Priority::VeryLow => "VERY_LOW",
            Priority::Lowest => "LOWEST",
        };
        f.write_str(name)
    }
}

/// Converts a config node into a [`DecodedValue`] for matching target types.
pub trait Decoder: Send + Sync {
    fn name(&self) -> &str;

    fn priority(&self) -> Priority;

    fn matches(&self, ty: &TypeDescriptor) -> bool;

    fn decode(
        &self,
        path: &str,
        node: &NodeRef,
        ty: &TypeDescriptor,
        ctx: &DecoderContext<'_>,
    ) -> Validated<DecodedValue>;
}

/// Everything a decoder needs to recurse.
#[derive(Clone, Copy)]
pub struct DecoderContext<'a> {
    pub registry: &'a DecoderRegistry,
    pub settings: &'a ConfigSettings,
    pub lexer: &'a PathLexer,
    pub tags: &'a Tags,
}

impl DecoderContext<'_> {
    /// Decode a child node through the registry.
    pub fn decode(&self, path: &str, node: &NodeRef, ty: &TypeDescriptor) -> Validated<DecodedValue> {
        self.registry.decode_node(path, node, ty, self)
    }
}

/// Registration-ordered decoder set.
pub struct DecoderRegistry {
    decoders: RwLock<Vec<Arc<dyn Decoder>>>,
}

impl DecoderRegistry {
    pub fn new(decoders: Vec<Arc<dyn Decoder>>) -> Self {
        Self {
            decoders: RwLock::new(decoders),
        }
    }

    /// Registry with every built-in decoder.
    pub fn with_defaults() -> Self {
        Self::new(default_decoders())
    }

    pub fn add_decoders(&self, decoders: Vec<Arc<dyn Decoder>>) {
        self.decoders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(decoders);
    }

    pub fn get_decoders(&self) -> Vec<Arc<dyn Decoder>> {
        self.decoders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_decoders(&self, decoders: Vec<Arc<dyn Decoder>>) {
        *self.decoders.write().unwrap_or_else(PoisonError::into_inner) = decoders;
    }

    /// Decoders whose predicate accepts `ty`, in registration order.
    pub fn matching(&self, ty: &TypeDescriptor) -> Vec<Arc<dyn Decoder>> {
        self.decoders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|d| d.matches(ty))
            .cloned()
            .collect()
    }

    /// Pick the first-registered matching decoder and run it.
    pub fn decode_node(
        &self,
        path: &str,
        node: &NodeRef,
        ty: &TypeDescriptor,
        ctx: &DecoderContext<'_>,
    ) -> Validated<DecodedValue> {
        let candidates = self.matching(ty);
        let Some((decoder, rest)) = candidates.split_first() else {
            return Validated::invalid(ValidationError::NoDecodersFound {
                path: path.to_string(),
                type_name: ty.to_string(),
            });
        };
        if !rest.is_empty() {
            let rejected: Vec<String> = rest.iter().map(|d| describe_decoder(d.as_ref())).collect();
            debug!(
                path = %path,
                target = %ty,
                chosen = %describe_decoder(decoder.as_ref()),
                rejected = ?rejected,
                "Multiple decoders match, using first registered"
            );
        }
        decoder.decode(path, node, ty, ctx)
    }
}

/// `name (PRIORITY)`, as shown in diagnostics.
pub fn describe_decoder(decoder: &dyn Decoder) -> String {
    format!("{} ({})", decoder.name(), decoder.priority())
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self
            .get_decoders()
            .iter()
            .map(|d| describe_decoder(d.as_ref()))
            .collect();
        f.debug_struct("DecoderRegistry").field("decoders", &names).finish()
    }
}

/// Built-in decoders. Their match predicates are disjoint.
pub fn default_decoders() -> Vec<Arc<dyn Decoder>> {
    vec![
        Arc::new(BooleanDecoder),
        Arc::new(IntegerDecoder),
        Arc::new(FloatDecoder),
        Arc::new(CharDecoder),
        Arc::new(StringDecoder),
        Arc::new(DurationDecoder),
        Arc::new(DateDecoder),
        Arc::new(DateTimeDecoder),
        Arc::new(UuidDecoder),
        Arc::new(PatternDecoder),
        Arc::new(PathDecoder),
        Arc::new(EnumDecoder),
        Arc::new(OptionalDecoder),
        Arc::new(ArrayDecoder),
        Arc::new(ListDecoder),
        Arc::new(SetDecoder),
        Arc::new(MapDecoder),
        Arc::new(ObjectDecoder),
        Arc::new(NodeDecoder),
    ]
}


#[cfg(test)]
mod tests {
    use super::test_support::Harness;
    use super::*;
    use crate::node::ConfigNode;

    struct ShoutingStringDecoder;

    impl Decoder for ShoutingStringDecoder {
        fn name(&self) -> &str {
            "ShoutingString"
        }

        fn priority(&self) -> Priority {
            Priority::High
        }

        fn matches(&self, ty: &TypeDescriptor) -> bool {
            *ty == TypeDescriptor::String
        }

        fn decode(
            &self,
            _path: &str,
            node: &NodeRef,
            _ty: &TypeDescriptor,
            _ctx: &DecoderContext<'_>,
        ) -> Validated<DecodedValue> {
            Validated::valid(DecodedValue::String(
                node.value().unwrap_or_default().to_uppercase(),
            ))
        }
    }

    #[test]
    fn test_no_decoders_found() {
        let harness = Harness::new();
        let result = harness.decode(
            ConfigNode::leaf("x"),
            &TypeDescriptor::Custom("Widget".to_string()),
        );
        assert!(!result.has_results());
        assert_eq!(
            result.errors(),
            &[ValidationError::NoDecodersFound {
                path: "test".to_string(),
                type_name: "Widget".to_string(),
            }]
        );
    }

    #[test]
    fn test_first_registered_wins() {
        let harness = Harness::new();
        harness
            .registry
            .add_decoders(vec![Arc::new(ShoutingStringDecoder)]);
        let result = harness.decode(ConfigNode::leaf("quiet"), &TypeDescriptor::String);
        assert_eq!(
            result.into_results(),
            Some(DecodedValue::String("quiet".into()))
        );

        let mut decoders: Vec<Arc<dyn Decoder>> = vec![Arc::new(ShoutingStringDecoder)];
        decoders.extend(default_decoders());
        harness.registry.set_decoders(decoders);
        let result = harness.decode(ConfigNode::leaf("quiet"), &TypeDescriptor::String);
        assert_eq!(
            result.into_results(),
            Some(DecodedValue::String("QUIET".into()))
        );
    }

    #[test]
    fn test_matching_reports_priorities() {
        let mut decoders: Vec<Arc<dyn Decoder>> = vec![Arc::new(ShoutingStringDecoder)];
        decoders.extend(default_decoders());
        let registry = DecoderRegistry::new(decoders);

        let described: Vec<String> = registry
            .matching(&TypeDescriptor::String)
            .iter()
            .map(|d| describe_decoder(d.as_ref()))
            .collect();
        assert_eq!(described, vec!["ShoutingString (HIGH)", "String (MEDIUM)"]);
        assert!(format!("{:?}", registry).contains("ShoutingString (HIGH)"));
    }

    #[test]
    fn test_default_decoders_are_disjoint() {
        let registry = DecoderRegistry::with_defaults();
        let samples = [
            TypeDescriptor::Bool,
            TypeDescriptor::I32,
            TypeDescriptor::U64,
            TypeDescriptor::F64,
            TypeDescriptor::Char,
            TypeDescriptor::String,
            TypeDescriptor::Duration,
            TypeDescriptor::Date,
            TypeDescriptor::DateTime,
            TypeDescriptor::Uuid,
            TypeDescriptor::Pattern,
            TypeDescriptor::Path,
            enum_descriptor("Mode", ["a"]),
            TypeDescriptor::optional(TypeDescriptor::I32),
            TypeDescriptor::Array(Box::new(TypeDescriptor::I32)),
            TypeDescriptor::list(TypeDescriptor::I32),
            TypeDescriptor::set(TypeDescriptor::I32),
            TypeDescriptor::map(TypeDescriptor::String, TypeDescriptor::I32),
            ObjectDescriptor::new("Db").build(),
            TypeDescriptor::Node,
        ];
        for ty in samples {
            let count = registry
                .get_decoders()
                .iter()
                .filter(|d| d.matches(&ty))
                .count();
            assert_eq!(count, 1, "{}", ty);
        }
    }

    #[test]
    fn test_priorities_are_ordered() {
        assert!(Priority::Highest < Priority::Lowest);
        assert_eq!(Priority::MediumLow.to_string(), "MEDIUM_LOW");
    }
}
