//! Struct-like targets decoded field by field from a map node.

use super::{DecodedValue, Decoder, DecoderContext, FieldDescriptor, Priority, TypeDescriptor};
use crate::lexer::{PathLexer, join_object};
use crate::node::{ConfigNode, NodeRef};
use crate::validation::{Validated, ValidationError};
use heck::{ToKebabCase, ToLowerCamelCase, ToSnakeCase};
use std::collections::BTreeMap;

/// Decodes [`TypeDescriptor::Object`] targets.
///
/// A field is looked up under its declared name and its kebab, snake and
/// lowerCamel spellings. Missing fields are reported and skipped, so the
/// result always carries whatever fields did decode.
pub struct ObjectDecoder;

/// Spellings a field may appear under in a config source.
fn field_candidates(field: &str, lexer: &PathLexer) -> Vec<String> {
    let mut candidates = Vec::with_capacity(4);
    for spelling in [
        field.to_string(),
        field.to_kebab_case(),
        field.to_snake_case(),
        field.to_lower_camel_case(),
    ] {
        let normalized = lexer.normalize(&spelling);
        if !candidates.contains(&normalized) {
            candidates.push(normalized);
        }
    }
    candidates
}

fn find_field<'n>(
    entries: &'n BTreeMap<String, NodeRef>,
    field: &FieldDescriptor,
    lexer: &PathLexer,
) -> Option<(&'n str, &'n NodeRef)> {
    let candidates = field_candidates(&field.name, lexer);
    candidates.iter().find_map(|candidate| {
        entries
            .iter()
            .find(|(key, _)| lexer.normalize(key) == *candidate)
            .map(|(key, node)| (key.as_str(), node))
    })
}

impl Decoder for ObjectDecoder {
    fn name(&self) -> &str {
        "Object"
    }

    fn priority(&self) -> Priority {
        Priority::VeryLow
    }

    fn matches(&self, ty: &TypeDescriptor) -> bool {
        matches!(ty, TypeDescriptor::Object(_))
    }

    fn decode(&self, path: &str, node: &NodeRef, ty: &TypeDescriptor, ctx: &DecoderContext<'_>) -> Validated<DecodedValue> {
        let TypeDescriptor::Object(object) = ty else {
            return Validated::invalid(ValidationError::NoDecodersFound {
                path: path.to_string(),
                type_name: ty.to_string(),
            });
        };
        let ConfigNode::Map { entries, .. } = node.as_ref() else {
            return Validated::invalid(ValidationError::DecodingExpectedMapNodeType {
                path: path.to_string(),
                found: node.kind(),
                decoder: self.name().to_string(),
            });
        };

        let mut errors = Vec::new();
        let mut fields = BTreeMap::new();
        for field in &object.fields {
            let Some((key, child)) = find_field(entries, field, ctx.lexer) else {
                let level = if field.discretionary {
                    ctx.settings.missing_discretionary_value_level()
                } else {
                    ctx.settings.missing_value_level()
                };
                errors.push(ValidationError::MissingObjectField {
                    path: path.to_string(),
                    field: field.name.clone(),
                    object: object.name.clone(),
                    level,
                });
                continue;
            };

            let field_path = join_object(path, key);
            if let Some(value) = ctx
                .decode(&field_path, child, &field.descriptor)
                .drain_into(&mut errors)
            {
                fields.insert(field.name.clone(), value);
            }
        }

        Validated::of(Some(DecodedValue::Object(fields)), errors)
    }
}
