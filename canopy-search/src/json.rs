//! Shallow projection of JSON property values
//!
//! Only top-level attributes of a JSON object are indexed. A scalar, or an
//! array of scalars, yields one token per value under `field@attr`; objects
//! and arrays holding objects or arrays yield nothing.

use crate::codec::{encode_date, encode_int, encode_long, ValueError};
use crate::fields::{json_attribute_field_name, lowercase_field_name};
use canopy_core::{PropertyTypeDefinition, Value, ValueType};
use chrono::{DateTime, Utc};
use serde_json::Value as Json;

/// Indexed (field, token) pairs for all values of a JSON property
///
/// Fails as a whole if any value cannot be parsed or coerced to its hint.
pub fn project(def: &PropertyTypeDefinition, field: &str, values: &[Value]) -> Result<Vec<(String, String)>, ValueError> {
    let mut tokens = Vec::new();
    for value in values {
        let Some(text) = value.as_str() else {
            return Err(ValueError::Unsupported(value.value_type()));
        };
        let parsed: Json = serde_json::from_str(text).map_err(|e| ValueError::Json(e.to_string()))?;
        let Json::Object(attributes) = parsed else {
            continue;
        };
        for (attribute, attr_value) in &attributes {
            let Some(scalars) = scalars(attr_value) else {
                continue;
            };
            let hint = def.json_hint(attribute);
            let attr_field = json_attribute_field_name(field, attribute);
            for scalar in scalars {
                let token = coerce(hint, scalar)?;
                if hint == ValueType::String && scalar.is_string() {
                    tokens.push((lowercase_field_name(&attr_field), token.to_lowercase()));
                }
                tokens.push((attr_field.clone(), token));
            }
        }
    }
    Ok(tokens)
}

/// Non-null scalars of an attribute, `None` when it is not projectable
fn scalars(value: &Json) -> Option<Vec<&Json>> {
    match value {
        Json::Null => Some(Vec::new()),
        Json::Object(_) => None,
        Json::Array(items) => {
            if items.iter().any(|i| i.is_object() || i.is_array()) {
                None
            } else {
                Some(items.iter().filter(|i| !i.is_null()).collect())
            }
        }
        scalar => Some(vec![scalar]),
    }
}

fn coerce(hint: ValueType, value: &Json) -> Result<String, ValueError> {
    let fail = || ValueError::Coerce { value_type: hint, input: value.to_string() };
    match hint {
        ValueType::String | ValueType::Html | ValueType::Json | ValueType::ImageRef | ValueType::Principal => {
            Ok(match value {
                Json::String(s) => s.clone(),
                other => other.to_string(),
            })
        }
        ValueType::Boolean => match value {
            Json::Bool(b) => Ok(b.to_string()),
            Json::String(s) if s == "true" || s == "false" => Ok(s.clone()),
            _ => Err(fail()),
        },
        ValueType::Int => {
            let n = match value {
                Json::Number(n) => n.as_i64().and_then(|n| i32::try_from(n).ok()),
                Json::String(s) => s.trim().parse::<i32>().ok(),
                _ => None,
            };
            n.map(encode_int).ok_or_else(fail)
        }
        ValueType::Long => {
            let n = match value {
                Json::Number(n) => n.as_i64(),
                Json::String(s) => s.trim().parse::<i64>().ok(),
                _ => None,
            };
            n.map(encode_long).ok_or_else(fail)
        }
        ValueType::Date | ValueType::Timestamp => {
            let date: Option<DateTime<Utc>> = match value {
                Json::Number(n) => n.as_i64().and_then(DateTime::<Utc>::from_timestamp_millis),
                Json::String(s) => DateTime::parse_from_rfc3339(s).ok().map(|d| d.with_timezone(&Utc)),
                _ => None,
            };
            date.map(|d| encode_date(&d)).ok_or_else(fail)
        }
        ValueType::Binary | ValueType::JsonBinary => Err(ValueError::Unsupported(hint)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_core::Namespace;

    fn meta() -> PropertyTypeDefinition {
        PropertyTypeDefinition::new(Namespace::default_namespace(), "meta", ValueType::Json)
    }

    fn count(tokens: &[(String, String)], field: &str) -> usize {
        tokens.iter().filter(|(f, _)| f == field).count()
    }

    #[test]
    fn test_shallow_projection() {
        let value = Value::Json(r#"{"tags":["news","sports"],"priority":5,"inner":{"x":1}}"#.into());
        let tokens = project(&meta(), "meta", &[value]).unwrap();
        assert_eq!(count(&tokens, "meta@tags"), 2);
        assert_eq!(count(&tokens, "meta@tags^lc"), 2);
        assert_eq!(count(&tokens, "meta@priority"), 1);
        assert_eq!(count(&tokens, "meta@priority^lc"), 0);
        assert!(tokens.iter().all(|(f, _)| !f.contains("inner")));
    }

    #[test]
    fn test_lowercase_tokens() {
        let value = Value::Json(r#"{"title":"Hello World"}"#.into());
        let tokens = project(&meta(), "meta", &[value]).unwrap();
        assert!(tokens.contains(&("meta@title".into(), "Hello World".into())));
        assert!(tokens.contains(&("meta@title^lc".into(), "hello world".into())));
    }

    #[test]
    fn test_hints_pick_the_encoding() {
        let def = meta()
            .with_json_hint("count", ValueType::Int)
            .with_json_hint("flag", ValueType::Boolean)
            .with_json_hint("when", ValueType::Date);
        let value = Value::Json(r#"{"count":"7","flag":true,"when":"1970-01-01T00:00:01Z"}"#.into());
        let tokens = project(&def, "meta", &[value]).unwrap();
        assert!(tokens.contains(&("meta@count".into(), encode_int(7))));
        assert!(tokens.contains(&("meta@flag".into(), "true".into())));
        assert!(tokens.contains(&("meta@when".into(), format!("{}00000", encode_long(1000)))));
        assert_eq!(count(&tokens, "meta@count^lc"), 0);
    }

    #[test]
    fn test_mixed_arrays_and_nulls_yield_nothing() {
        let value = Value::Json(r#"{"a":[1,[2]],"b":null,"c":[null,"x"]}"#.into());
        let tokens = project(&meta(), "meta", &[value]).unwrap();
        assert_eq!(count(&tokens, "meta@a"), 0);
        assert_eq!(count(&tokens, "meta@b"), 0);
        assert_eq!(count(&tokens, "meta@c"), 1);
    }

    #[test]
    fn test_any_bad_value_fails_the_property() {
        let def = meta().with_json_hint("count", ValueType::Int);
        let good = Value::Json(r#"{"count":1}"#.into());
        let bad = Value::Json(r#"{"count":"many"}"#.into());
        assert!(matches!(project(&def, "meta", &[good.clone(), bad]), Err(ValueError::Coerce { .. })));
        assert!(matches!(project(&def, "meta", &[good, Value::Json("{".into())]), Err(ValueError::Json(_))));
    }
}
