//! Decoders for scalar leaves.

use super::{DecodedValue, Decoder, DecoderContext, Priority, TypeDescriptor};
use crate::node::{ConfigNode, NodeRef};
use crate::validation::{Validated, ValidationError};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex_lite::Regex;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// Value of a leaf, or the diagnostic explaining why there is none.
pub(super) fn leaf_value<'n>(
    path: &str,
    node: &'n ConfigNode,
    decoder: &str,
) -> Result<&'n str, ValidationError> {
    match node {
        ConfigNode::Leaf { value: Some(v), .. } => Ok(v),
        ConfigNode::Leaf { value: None, .. } => Err(ValidationError::DecodingLeafMissingValue {
            path: path.to_string(),
            decoder: decoder.to_string(),
        }),
        other => Err(ValidationError::DecodingExpectedLeafNodeType {
            path: path.to_string(),
            found: other.kind(),
            decoder: decoder.to_string(),
        }),
    }
}

fn decode_leaf(
    path: &str,
    node: &ConfigNode,
    decoder: &str,
    parse: impl FnOnce(&str) -> Result<DecodedValue, ValidationError>,
) -> Validated<DecodedValue> {
    match leaf_value(path, node, decoder).and_then(parse) {
        Ok(value) => Validated::valid(value),
        Err(error) => Validated::invalid(error),
    }
}

fn value_error(path: &str, value: &str, target: &TypeDescriptor, reason: impl ToString) -> ValidationError {
    ValidationError::DecodingValueParsing {
        path: path.to_string(),
        value: value.to_string(),
        target: target.to_string(),
        reason: reason.to_string(),
    }
}

pub struct BooleanDecoder;

impl Decoder for BooleanDecoder {
    fn name(&self) -> &str {
        "Boolean"
    }

    fn priority(&self) -> Priority {
        Priority::Medium
    }

    fn matches(&self, ty: &TypeDescriptor) -> bool {
        *ty == TypeDescriptor::Bool
    }

    fn decode(&self, path: &str, node: &NodeRef, ty: &TypeDescriptor, _ctx: &DecoderContext<'_>) -> Validated<DecodedValue> {
        decode_leaf(path, node, self.name(), |value| {
            match value.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(DecodedValue::Bool(true)),
                "false" | "no" | "off" | "0" => Ok(DecodedValue::Bool(false)),
                _ => Err(value_error(path, value, ty, "not a boolean")),
            }
        })
    }
}

/// Signed and unsigned integers of every width, range checked.
pub struct IntegerDecoder;

impl IntegerDecoder {
    fn bounds(ty: &TypeDescriptor) -> (i128, i128) {
        match ty {
            TypeDescriptor::I8 => (i8::MIN.into(), i8::MAX.into()),
            TypeDescriptor::I16 => (i16::MIN.into(), i16::MAX.into()),
            TypeDescriptor::I32 => (i32::MIN.into(), i32::MAX.into()),
            TypeDescriptor::U8 => (0, u8::MAX.into()),
            TypeDescriptor::U16 => (0, u16::MAX.into()),
            TypeDescriptor::U32 => (0, u32::MAX.into()),
            TypeDescriptor::U64 => (0, u64::MAX.into()),
            _ => (i64::MIN.into(), i64::MAX.into()),
        }
    }
}

impl Decoder for IntegerDecoder {
    fn name(&self) -> &str {
        "Integer"
    }

    fn priority(&self) -> Priority {
        Priority::Medium
    }

    fn matches(&self, ty: &TypeDescriptor) -> bool {
        ty.is_integer()
    }

    fn decode(&self, path: &str, node: &NodeRef, ty: &TypeDescriptor, _ctx: &DecoderContext<'_>) -> Validated<DecodedValue> {
        decode_leaf(path, node, self.name(), |value| {
            let number_error = |reason: String| ValidationError::DecodingNumberParsing {
                path: path.to_string(),
                value: value.to_string(),
                target: ty.to_string(),
                reason,
            };
            let parsed = value
                .trim()
                .parse::<i128>()
                .map_err(|e| number_error(e.to_string()))?;
            let (min, max) = Self::bounds(ty);
            if parsed < min || parsed > max {
                return Err(number_error(format!("value out of range for {}", ty)));
            }
            let decoded = match ty {
                TypeDescriptor::U8 | TypeDescriptor::U16 | TypeDescriptor::U32 | TypeDescriptor::U64 => {
                    u64::try_from(parsed).map(DecodedValue::UInt)
                }
                _ => i64::try_from(parsed).map(DecodedValue::Int),
            };
            decoded.map_err(|e| number_error(e.to_string()))
        })
    }
}

pub struct FloatDecoder;

impl Decoder for FloatDecoder {
    fn name(&self) -> &str {
        "Float"
    }

    fn priority(&self) -> Priority {
        Priority::Medium
    }

    fn matches(&self, ty: &TypeDescriptor) -> bool {
        matches!(ty, TypeDescriptor::F32 | TypeDescriptor::F64)
    }

    fn decode(&self, path: &str, node: &NodeRef, ty: &TypeDescriptor, _ctx: &DecoderContext<'_>) -> Validated<DecodedValue> {
        decode_leaf(path, node, self.name(), |value| {
            let parsed = if *ty == TypeDescriptor::F32 {
                value.trim().parse::<f32>().map(f64::from)
            } else {
                value.trim().parse::<f64>()
            };
            parsed
                .map(DecodedValue::Float)
                .map_err(|e| ValidationError::DecodingNumberParsing {
                    path: path.to_string(),
                    value: value.to_string(),
                    target: ty.to_string(),
                    reason: e.to_string(),
                })
        })
    }
}

pub struct CharDecoder;

impl Decoder for CharDecoder {
    fn name(&self) -> &str {
        "Char"
    }

    fn priority(&self) -> Priority {
        Priority::Medium
    }

    fn matches(&self, ty: &TypeDescriptor) -> bool {
        *ty == TypeDescriptor::Char
    }

    fn decode(&self, path: &str, node: &NodeRef, _ty: &TypeDescriptor, _ctx: &DecoderContext<'_>) -> Validated<DecodedValue> {
        decode_leaf(path, node, self.name(), |value| {
            let mut chars = value.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(DecodedValue::Char(c)),
                _ => Err(ValidationError::DecodingCharWrongSize {
                    path: path.to_string(),
                    value: value.to_string(),
                    length: value.chars().count(),
                }),
            }
        })
    }
}

pub struct StringDecoder;

impl Decoder for StringDecoder {
    fn name(&self) -> &str {
        "String"
    }

    fn priority(&self) -> Priority {
        Priority::Medium
    }

    fn matches(&self, ty: &TypeDescriptor) -> bool {
        *ty == TypeDescriptor::String
    }

    fn decode(&self, path: &str, node: &NodeRef, _ty: &TypeDescriptor, _ctx: &DecoderContext<'_>) -> Validated<DecodedValue> {
        decode_leaf(path, node, self.name(), |value| {
            Ok(DecodedValue::String(value.to_string()))
        })
    }
}

/// Milliseconds, or a number with an `ms`, `s`, `m`, `h` or `d` suffix.
pub struct DurationDecoder;

impl DurationDecoder {
    fn parse(value: &str) -> Result<Duration, String> {
        let value = value.trim();
        let split = value
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(value.len());
        let (digits, unit) = value.split_at(split);
        let amount: u64 = digits
            .parse()
            .map_err(|_| "expected a whole number with optional unit".to_string())?;
        let seconds_per_unit = match unit.trim() {
            "" | "ms" => return Ok(Duration::from_millis(amount)),
            "s" => 1,
            "m" => 60,
            "h" => 3_600,
            "d" => 86_400,
            other => return Err(format!("unknown duration unit '{}'", other)),
        };
        amount
            .checked_mul(seconds_per_unit)
            .map(Duration::from_secs)
            .ok_or_else(|| "duration overflow".to_string())
    }
}

impl Decoder for DurationDecoder {
    fn name(&self) -> &str {
        "Duration"
    }

    fn priority(&self) -> Priority {
        Priority::Medium
    }

    fn matches(&self, ty: &TypeDescriptor) -> bool {
        *ty == TypeDescriptor::Duration
    }

    fn decode(&self, path: &str, node: &NodeRef, ty: &TypeDescriptor, _ctx: &DecoderContext<'_>) -> Validated<DecodedValue> {
        decode_leaf(path, node, self.name(), |value| {
            Self::parse(value)
                .map(DecodedValue::Duration)
                .map_err(|reason| value_error(path, value, ty, reason))
        })
    }
}

pub struct DateDecoder;

impl Decoder for DateDecoder {
    fn name(&self) -> &str {
        "Date"
    }

    fn priority(&self) -> Priority {
        Priority::Medium
    }

    fn matches(&self, ty: &TypeDescriptor) -> bool {
        *ty == TypeDescriptor::Date
    }

    fn decode(&self, path: &str, node: &NodeRef, ty: &TypeDescriptor, ctx: &DecoderContext<'_>) -> Validated<DecodedValue> {
        decode_leaf(path, node, self.name(), |value| {
            NaiveDate::parse_from_str(value.trim(), &ctx.settings.date_format)
                .map(DecodedValue::Date)
                .map_err(|e| value_error(path, value, ty, e))
        })
    }
}

/// RFC 3339, or the configured naive format interpreted as UTC.
pub struct DateTimeDecoder;

impl Decoder for DateTimeDecoder {
    fn name(&self) -> &str {
        "DateTime"
    }

    fn priority(&self) -> Priority {
        Priority::Medium
    }

    fn matches(&self, ty: &TypeDescriptor) -> bool {
        *ty == TypeDescriptor::DateTime
    }

    fn decode(&self, path: &str, node: &NodeRef, ty: &TypeDescriptor, ctx: &DecoderContext<'_>) -> Validated<DecodedValue> {
        decode_leaf(path, node, self.name(), |value| {
            let trimmed = value.trim();
            DateTime::parse_from_rfc3339(trimmed)
                .or_else(|_| {
                    NaiveDateTime::parse_from_str(trimmed, &ctx.settings.date_time_format)
                        .map(|naive| naive.and_utc().fixed_offset())
                })
                .map(DecodedValue::DateTime)
                .map_err(|e| value_error(path, value, ty, e))
        })
    }
}

pub struct UuidDecoder;

impl Decoder for UuidDecoder {
    fn name(&self) -> &str {
        "UUID"
    }

    fn priority(&self) -> Priority {
        Priority::Medium
    }

    fn matches(&self, ty: &TypeDescriptor) -> bool {
        *ty == TypeDescriptor::Uuid
    }

    fn decode(&self, path: &str, node: &NodeRef, ty: &TypeDescriptor, _ctx: &DecoderContext<'_>) -> Validated<DecodedValue> {
        decode_leaf(path, node, self.name(), |value| {
            Uuid::parse_str(value.trim())
                .map(DecodedValue::Uuid)
                .map_err(|e| value_error(path, value, ty, e))
        })
    }
}

pub struct PatternDecoder;

impl Decoder for PatternDecoder {
    fn name(&self) -> &str {
        "Pattern"
    }

    fn priority(&self) -> Priority {
        Priority::Medium
    }

    fn matches(&self, ty: &TypeDescriptor) -> bool {
        *ty == TypeDescriptor::Pattern
    }

    fn decode(&self, path: &str, node: &NodeRef, ty: &TypeDescriptor, _ctx: &DecoderContext<'_>) -> Validated<DecodedValue> {
        decode_leaf(path, node, self.name(), |value| {
            Regex::new(value)
                .map(DecodedValue::Pattern)
                .map_err(|e| value_error(path, value, ty, e))
        })
    }
}

pub struct PathDecoder;

impl Decoder for PathDecoder {
    fn name(&self) -> &str {
        "Path"
    }

    fn priority(&self) -> Priority {
        Priority::Medium
    }

    fn matches(&self, ty: &TypeDescriptor) -> bool {
        *ty == TypeDescriptor::Path
    }

    fn decode(&self, path: &str, node: &NodeRef, _ty: &TypeDescriptor, _ctx: &DecoderContext<'_>) -> Validated<DecodedValue> {
        decode_leaf(path, node, self.name(), |value| {
            Ok(DecodedValue::Path(PathBuf::from(value.trim())))
        })
    }
}

/// Matches variant names case-insensitively; yields the declared spelling.
pub struct EnumDecoder;

impl Decoder for EnumDecoder {
    fn name(&self) -> &str {
        "Enum"
    }

    fn priority(&self) -> Priority {
        Priority::Medium
    }

    fn matches(&self, ty: &TypeDescriptor) -> bool {
        matches!(ty, TypeDescriptor::Enum(_))
    }

    fn decode(&self, path: &str, node: &NodeRef, ty: &TypeDescriptor, _ctx: &DecoderContext<'_>) -> Validated<DecodedValue> {
        let TypeDescriptor::Enum(descriptor) = ty else {
            return Validated::invalid(ValidationError::NoDecodersFound {
                path: path.to_string(),
                type_name: ty.to_string(),
            });
        };
        decode_leaf(path, node, self.name(), |value| {
            descriptor
                .variants
                .iter()
                .find(|variant| variant.eq_ignore_ascii_case(value.trim()))
                .map(|variant| DecodedValue::Enum(variant.clone()))
                .ok_or_else(|| ValidationError::EnumValueNotFound {
                    path: path.to_string(),
                    value: value.to_string(),
                    enum_name: descriptor.name.clone(),
                })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::enum_descriptor;
    use crate::decoder::test_support::Harness;
    use crate::node::NodeKind;

    fn decode(value: &str, ty: TypeDescriptor) -> Validated<DecodedValue> {
        Harness::new().decode(ConfigNode::leaf(value), &ty)
    }

    #[test]
    fn test_integer_round_trip() {
        let result = decode("3306", TypeDescriptor::I32);
        let value = result.into_results().unwrap();
        assert_eq!(value, DecodedValue::Int(3306));
        assert_eq!(value.to_key_string(), "3306");
    }

    #[test]
    fn test_unsigned_integer() {
        assert_eq!(
            decode("65535", TypeDescriptor::U16).into_results(),
            Some(DecodedValue::UInt(65535))
        );
    }

    #[test]
    fn test_integer_errors() {
        for (value, ty) in [
            ("abc", TypeDescriptor::I32),
            ("300", TypeDescriptor::U8),
            ("-1", TypeDescriptor::U32),
            ("1.5", TypeDescriptor::I64),
        ] {
            let result = decode(value, ty);
            assert!(!result.has_results(), "{}", value);
            assert!(matches!(
                result.errors()[0],
                ValidationError::DecodingNumberParsing { .. }
            ));
        }
    }

    #[test]
    fn test_float() {
        assert_eq!(
            decode("2.5", TypeDescriptor::F64).into_results(),
            Some(DecodedValue::Float(2.5))
        );
        assert!(!decode("two", TypeDescriptor::F32).has_results());
    }

    #[test]
    fn test_boolean_spellings() {
        for (value, expected) in [("true", true), ("YES", true), ("on", true), ("0", false), ("Off", false)] {
            assert_eq!(
                decode(value, TypeDescriptor::Bool).into_results(),
                Some(DecodedValue::Bool(expected)),
                "{}",
                value
            );
        }
        assert!(!decode("maybe", TypeDescriptor::Bool).has_results());
    }

    #[test]
    fn test_char() {
        assert_eq!(
            decode("x", TypeDescriptor::Char).into_results(),
            Some(DecodedValue::Char('x'))
        );
        let result = decode("xy", TypeDescriptor::Char);
        assert!(matches!(
            result.errors()[0],
            ValidationError::DecodingCharWrongSize { length: 2, .. }
        ));
    }

    #[test]
    fn test_missing_value() {
        let result = Harness::new().decode(ConfigNode::empty_leaf(), &TypeDescriptor::String);
        assert!(matches!(
            result.errors()[0],
            ValidationError::DecodingLeafMissingValue { .. }
        ));
    }

    #[test]
    fn test_expected_leaf() {
        let result = Harness::new().decode(
            ConfigNode::map([("a", ConfigNode::leaf("b"))]),
            &TypeDescriptor::String,
        );
        assert!(matches!(
            result.errors()[0],
            ValidationError::DecodingExpectedLeafNodeType {
                found: NodeKind::Map,
                ..
            }
        ));
    }

    #[test]
    fn test_duration_units() {
        assert_eq!(DurationDecoder::parse("1500").unwrap(), Duration::from_millis(1500));
        assert_eq!(DurationDecoder::parse("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(DurationDecoder::parse("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(DurationDecoder::parse("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(DurationDecoder::parse("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(DurationDecoder::parse("1d").unwrap(), Duration::from_secs(86_400));
        assert!(DurationDecoder::parse("5y").is_err());
        assert!(DurationDecoder::parse("s").is_err());
    }

    #[test]
    fn test_date_and_date_time() {
        let date = decode("2024-02-29", TypeDescriptor::Date).into_results().unwrap();
        assert_eq!(date, DecodedValue::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()));

        let rfc = decode("2024-01-01T10:00:00+02:00", TypeDescriptor::DateTime);
        assert!(rfc.has_results());
        let naive = decode("2024-01-01T10:00:00", TypeDescriptor::DateTime)
            .into_results()
            .unwrap();
        assert_eq!(naive.to_key_string(), "2024-01-01T10:00:00+00:00");
        assert!(!decode("yesterday", TypeDescriptor::DateTime).has_results());
    }

    #[test]
    fn test_uuid_and_pattern() {
        assert!(decode("67e55044-10b1-426f-9247-bb680e5fe0c8", TypeDescriptor::Uuid).has_results());
        assert!(!decode("not-a-uuid", TypeDescriptor::Uuid).has_results());
        assert!(decode("^a+$", TypeDescriptor::Pattern).has_results());
        assert!(!decode("(", TypeDescriptor::Pattern).has_results());
    }

    #[test]
    fn test_enum_case_insensitive() {
        let ty = enum_descriptor("Mode", ["Relative", "Absolute"]);
        assert_eq!(
            decode("relative", ty.clone()).into_results(),
            Some(DecodedValue::Enum("Relative".into()))
        );
        let result = decode("sideways", ty);
        assert!(matches!(
            result.errors()[0],
            ValidationError::EnumValueNotFound { .. }
        ));
    }
}
