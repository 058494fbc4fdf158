//! Decoders for arrays, lists, sets, maps, optionals and raw nodes.
//!
//! Sequence decoders accept an array node, or a leaf holding a
//! comma-separated value (`\,` escapes a literal comma).

use super::leaf::leaf_value;
use super::{DecodedValue, Decoder, DecoderContext, Priority, TypeDescriptor};
use crate::lexer::{join_array, join_object};
use crate::node::{ConfigNode, NodeRef};
use crate::validation::{Validated, ValidationError};
use std::sync::Arc;

/// Split on unescaped commas, trimming each part.
pub(super) fn split_list(value: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&',') => {
                current.push(',');
                chars.next();
            }
            ',' => parts.push(std::mem::take(&mut current).trim().to_string()),
            _ => current.push(c),
        }
    }
    parts.push(current.trim().to_string());
    parts
}

/// Decode every slot of a sequence node; missing slots become `Null`.
fn decode_sequence(
    path: &str,
    node: &NodeRef,
    element: &TypeDescriptor,
    ctx: &DecoderContext<'_>,
    decoder: &str,
) -> Validated<DecodedValue> {
    let slots: Vec<Option<NodeRef>> = match node.as_ref() {
        ConfigNode::Array { elements, .. } => elements.clone(),
        ConfigNode::Leaf { .. } => match leaf_value(path, node, decoder) {
            Ok(value) => split_list(value)
                .into_iter()
                .map(|part| Some(Arc::new(ConfigNode::leaf(part))))
                .collect(),
            Err(error) => return Validated::invalid(error),
        },
        other => {
            return Validated::invalid(ValidationError::DecodingExpectedArrayNodeType {
                path: path.to_string(),
                found: other.kind(),
                decoder: decoder.to_string(),
            });
        }
    };

    let mut errors = Vec::new();
    let mut values = Vec::with_capacity(slots.len());
    for (index, slot) in slots.iter().enumerate() {
        let value = match slot {
            Some(child) => ctx
                .decode(&join_array(path, index), child, element)
                .drain_into(&mut errors),
            None => {
                errors.push(ValidationError::ArrayMissingIndex {
                    path: path.to_string(),
                    index,
                    level: ctx.settings.missing_array_index_level(),
                });
                None
            }
        };
        values.push(value.unwrap_or(DecodedValue::Null));
    }

    Validated::of(Some(DecodedValue::List(values)), errors)
}

/// Fixed-size arrays.
pub struct ArrayDecoder;

impl Decoder for ArrayDecoder {
    fn name(&self) -> &str {
        "Array"
    }

    fn priority(&self) -> Priority {
        Priority::Medium
    }

    fn matches(&self, ty: &TypeDescriptor) -> bool {
        matches!(ty, TypeDescriptor::Array(_))
    }

    fn decode(&self, path: &str, node: &NodeRef, ty: &TypeDescriptor, ctx: &DecoderContext<'_>) -> Validated<DecodedValue> {
        match ty {
            TypeDescriptor::Array(element) => decode_sequence(path, node, element, ctx, self.name()),
            _ => no_decoder(path, ty),
        }
    }
}

pub struct ListDecoder;

impl Decoder for ListDecoder {
    fn name(&self) -> &str {
        "List"
    }

    fn priority(&self) -> Priority {
        Priority::Medium
    }

    fn matches(&self, ty: &TypeDescriptor) -> bool {
        matches!(ty, TypeDescriptor::List(_))
    }

    fn decode(&self, path: &str, node: &NodeRef, ty: &TypeDescriptor, ctx: &DecoderContext<'_>) -> Validated<DecodedValue> {
        match ty {
            TypeDescriptor::List(element) => decode_sequence(path, node, element, ctx, self.name()),
            _ => no_decoder(path, ty),
        }
    }
}

/// Sets decode like lists; duplicates collapse when converted to the set type.
pub struct SetDecoder;

impl Decoder for SetDecoder {
    fn name(&self) -> &str {
        "Set"
    }

    fn priority(&self) -> Priority {
        Priority::Medium
    }

    fn matches(&self, ty: &TypeDescriptor) -> bool {
        matches!(ty, TypeDescriptor::Set(_))
    }

    fn decode(&self, path: &str, node: &NodeRef, ty: &TypeDescriptor, ctx: &DecoderContext<'_>) -> Validated<DecodedValue> {
        match ty {
            TypeDescriptor::Set(element) => decode_sequence(path, node, element, ctx, self.name()),
            _ => no_decoder(path, ty),
        }
    }
}

/// Maps from a map node, or from a `key=value,key=value` leaf.
pub struct MapDecoder;

impl MapDecoder {
    fn entries(&self, path: &str, node: &NodeRef) -> Result<Vec<(String, NodeRef)>, ValidationError> {
        match node.as_ref() {
            ConfigNode::Map { entries, .. } => Ok(entries
                .iter()
                .map(|(k, v)| (k.clone(), Arc::clone(v)))
                .collect()),
            ConfigNode::Leaf { .. } => {
                let value = leaf_value(path, node, self.name())?;
                split_list(value)
                    .into_iter()
                    .map(|part| {
                        let (key, value) = part.split_once('=').ok_or_else(|| {
                            ValidationError::DecodingValueParsing {
                                path: path.to_string(),
                                value: part.clone(),
                                target: "map entry".to_string(),
                                reason: "expected key=value".to_string(),
                            }
                        })?;
                        Ok((
                            key.trim().to_string(),
                            Arc::new(ConfigNode::leaf(value.trim())),
                        ))
                    })
                    .collect()
            }
            other => Err(ValidationError::DecodingExpectedMapNodeType {
                path: path.to_string(),
                found: other.kind(),
                decoder: self.name().to_string(),
            }),
        }
    }
}

impl Decoder for MapDecoder {
    fn name(&self) -> &str {
        "Map"
    }

    fn priority(&self) -> Priority {
        Priority::Medium
    }

    fn matches(&self, ty: &TypeDescriptor) -> bool {
        matches!(ty, TypeDescriptor::Map(_, _))
    }

    fn decode(&self, path: &str, node: &NodeRef, ty: &TypeDescriptor, ctx: &DecoderContext<'_>) -> Validated<DecodedValue> {
        let TypeDescriptor::Map(key_type, value_type) = ty else {
            return no_decoder(path, ty);
        };
        let entries = match self.entries(path, node) {
            Ok(entries) => entries,
            Err(error) => return Validated::invalid(error),
        };

        let mut errors = Vec::new();
        let mut decoded = Vec::with_capacity(entries.len());
        for (key, value_node) in entries {
            if key.is_empty() {
                errors.push(ValidationError::DecodingMapKeyMissing {
                    path: path.to_string(),
                });
                continue;
            }
            let entry_path = join_object(path, &key);
            if matches!(value_node.as_ref(), ConfigNode::Leaf { value: None, .. }) {
                errors.push(ValidationError::DecodingMapValueMissing {
                    path: path.to_string(),
                    key,
                });
                continue;
            }

            let key_node = Arc::new(ConfigNode::leaf(key.as_str()));
            let decoded_key = ctx.decode(&entry_path, &key_node, key_type).drain_into(&mut errors);
            let decoded_value = ctx
                .decode(&entry_path, &value_node, value_type)
                .drain_into(&mut errors);
            if let (Some(k), Some(v)) = (decoded_key, decoded_value) {
                decoded.push((k, v));
            }
        }

        Validated::of(Some(DecodedValue::Map(decoded)), errors)
    }
}

/// `Option<T>`: an empty leaf is `Null`; a failed inner decode keeps its errors.
pub struct OptionalDecoder;

impl Decoder for OptionalDecoder {
    fn name(&self) -> &str {
        "Optional"
    }

    fn priority(&self) -> Priority {
        Priority::Medium
    }

    fn matches(&self, ty: &TypeDescriptor) -> bool {
        ty.is_optional()
    }

    fn decode(&self, path: &str, node: &NodeRef, ty: &TypeDescriptor, ctx: &DecoderContext<'_>) -> Validated<DecodedValue> {
        let TypeDescriptor::Optional(inner) = ty else {
            return no_decoder(path, ty);
        };
        if matches!(node.as_ref(), ConfigNode::Leaf { value: None, .. }) {
            return Validated::valid(DecodedValue::Null);
        }
        let (value, errors) = ctx.decode(path, node, inner).into_parts();
        Validated::of(Some(value.unwrap_or(DecodedValue::Null)), errors)
    }
}

/// Returns the node itself.
pub struct NodeDecoder;

impl Decoder for NodeDecoder {
    fn name(&self) -> &str {
        "ConfigNode"
    }

    fn priority(&self) -> Priority {
        Priority::Lowest
    }

    fn matches(&self, ty: &TypeDescriptor) -> bool {
        *ty == TypeDescriptor::Node
    }

    fn decode(&self, _path: &str, node: &NodeRef, _ty: &TypeDescriptor, _ctx: &DecoderContext<'_>) -> Validated<DecodedValue> {
        Validated::valid(DecodedValue::Node(Arc::clone(node)))
    }
}

fn no_decoder(path: &str, ty: &TypeDescriptor) -> Validated<DecodedValue> {
    Validated::invalid(ValidationError::NoDecodersFound {
        path: path.to_string(),
        type_name: ty.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::test_support::Harness;
    use crate::settings::ConfigSettings;
    use crate::validation::ValidationLevel;

    fn strings(values: &[&str]) -> DecodedValue {
        DecodedValue::List(
            values
                .iter()
                .map(|v| DecodedValue::String(v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_split_list_escapes() {
        assert_eq!(split_list("a, b,c"), vec!["a", "b", "c"]);
        assert_eq!(split_list(r"a\,b,c"), vec!["a,b", "c"]);
        assert_eq!(split_list("single"), vec!["single"]);
    }

    #[test]
    fn test_list_from_array() {
        let node = ConfigNode::array([ConfigNode::leaf("1"), ConfigNode::leaf("2")]);
        let result = Harness::new().decode(node, &TypeDescriptor::list(TypeDescriptor::I32));
        assert_eq!(
            result.into_results(),
            Some(DecodedValue::List(vec![DecodedValue::Int(1), DecodedValue::Int(2)]))
        );
    }

    #[test]
    fn test_list_from_comma_leaf() {
        let result = Harness::new().decode(
            ConfigNode::leaf("John, Matt,Paul"),
            &TypeDescriptor::list(TypeDescriptor::String),
        );
        assert_eq!(result.into_results(), Some(strings(&["John", "Matt", "Paul"])));
    }

    #[test]
    fn test_list_missing_index_is_partial() {
        let node = ConfigNode::sparse_array(vec![
            Some(Arc::new(ConfigNode::leaf("a"))),
            None,
            Some(Arc::new(ConfigNode::leaf("c"))),
        ]);
        let ty = TypeDescriptor::list(TypeDescriptor::optional(TypeDescriptor::String));
        let result = Harness::new().decode(node, &ty);
        assert_eq!(result.errors().len(), 1);
        assert_eq!(result.errors()[0].level(), ValidationLevel::Warn);
        assert_eq!(
            result.into_results(),
            Some(DecodedValue::List(vec![
                DecodedValue::String("a".into()),
                DecodedValue::Null,
                DecodedValue::String("c".into()),
            ]))
        );
    }

    #[test]
    fn test_list_missing_index_error_policy() {
        let harness = Harness::with_settings(ConfigSettings {
            treat_missing_array_index_as_error: true,
            ..Default::default()
        });
        let node = ConfigNode::sparse_array(vec![None]);
        let result = harness.decode(node, &TypeDescriptor::list(TypeDescriptor::String));
        assert_eq!(result.errors()[0].level(), ValidationLevel::Error);
    }

    #[test]
    fn test_list_element_error_reported_with_index() {
        let node = ConfigNode::array([ConfigNode::leaf("1"), ConfigNode::leaf("x")]);
        let result = Harness::new().decode(node, &TypeDescriptor::list(TypeDescriptor::I32));
        match &result.errors()[0] {
            ValidationError::DecodingNumberParsing { path, .. } => assert_eq!(path, "test[1]"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_list_rejects_map() {
        let result = Harness::new().decode(
            ConfigNode::map([("a", ConfigNode::leaf("1"))]),
            &TypeDescriptor::list(TypeDescriptor::String),
        );
        assert!(matches!(
            result.errors()[0],
            ValidationError::DecodingExpectedArrayNodeType { .. }
        ));
    }

    #[test]
    fn test_map_from_map_node() {
        let node = ConfigNode::map([("a", ConfigNode::leaf("1")), ("b", ConfigNode::leaf("2"))]);
        let ty = TypeDescriptor::map(TypeDescriptor::String, TypeDescriptor::I32);
        let result = Harness::new().decode(node, &ty);
        assert!(!result.has_errors());
        assert_eq!(
            result.into_results(),
            Some(DecodedValue::Map(vec![
                (DecodedValue::String("a".into()), DecodedValue::Int(1)),
                (DecodedValue::String("b".into()), DecodedValue::Int(2)),
            ]))
        );
    }

    #[test]
    fn test_map_from_leaf() {
        let ty = TypeDescriptor::map(TypeDescriptor::I32, TypeDescriptor::String);
        let result = Harness::new().decode(ConfigNode::leaf("1=a, 2=b"), &ty);
        assert_eq!(
            result.into_results(),
            Some(DecodedValue::Map(vec![
                (DecodedValue::Int(1), DecodedValue::String("a".into())),
                (DecodedValue::Int(2), DecodedValue::String("b".into())),
            ]))
        );
    }

    #[test]
    fn test_map_missing_value_warns() {
        let node = ConfigNode::map([("a", ConfigNode::empty_leaf()), ("b", ConfigNode::leaf("x"))]);
        let ty = TypeDescriptor::map(TypeDescriptor::String, TypeDescriptor::String);
        let result = Harness::new().decode(node, &ty);
        assert_eq!(result.errors().len(), 1);
        assert_eq!(result.errors()[0].level(), ValidationLevel::Warn);
        let DecodedValue::Map(entries) = result.into_results().unwrap() else {
            panic!("expected map");
        };
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_map_empty_key_errors() {
        let node = ConfigNode::map([("", ConfigNode::leaf("x"))]);
        let ty = TypeDescriptor::map(TypeDescriptor::String, TypeDescriptor::String);
        let result = Harness::new().decode(node, &ty);
        assert!(matches!(
            result.errors()[0],
            ValidationError::DecodingMapKeyMissing { .. }
        ));
        assert_eq!(result.errors()[0].level(), ValidationLevel::Error);
    }

    #[test]
    fn test_optional_empty_leaf() {
        let ty = TypeDescriptor::optional(TypeDescriptor::I32);
        let result = Harness::new().decode(ConfigNode::empty_leaf(), &ty);
        assert_eq!(result.into_results(), Some(DecodedValue::Null));

        let result = Harness::new().decode(ConfigNode::leaf("7"), &ty);
        assert_eq!(result.into_results(), Some(DecodedValue::Int(7)));
    }

    #[test]
    fn test_node_passthrough() {
        let node = ConfigNode::map([("a", ConfigNode::leaf("1"))]);
        let result = Harness::new().decode(node.clone(), &TypeDescriptor::Node);
        assert_eq!(
            result.into_results(),
            Some(DecodedValue::Node(Arc::new(node)))
        );
    }
}
