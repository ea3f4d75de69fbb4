//! JSON Schema → Cloud Code schema dialect.
//!
//! Cloud Code accepts an OpenAPI-flavoured subset: upper-case enumerated `type`
//! values, `nullable` instead of `"null"` members, and no `additionalProperties`.

use serde_json::{Map, Value};

use crate::error::TranscodeError;

/// Enumerated `type` values accepted by the Cloud Code dialect.
pub const SCHEMA_TYPES: [&str; 8] = [
    "TYPE_UNSPECIFIED",
    "STRING",
    "NUMBER",
    "INTEGER",
    "BOOLEAN",
    "ARRAY",
    "OBJECT",
    "NULL",
];

/// Result of adapting one tool schema.
#[derive(Debug, Clone, PartialEq)]
pub enum AdaptedSchema {
    /// Converted into the constrained dialect.
    Converted(Value),
    /// Carried a `$schema` marker; forwarded verbatim as a raw JSON schema.
    Raw(Value),
}

/// Adapt a tool parameter (or response) schema.
///
/// # Errors
///
/// Returns [`TranscodeError::SchemaConflict`] when a fragment declares both `type`
/// and `anyOf`, or when a field is typed only as `"null"`.
pub fn adapt_tool_schema(schema: &Value) -> Result<AdaptedSchema, TranscodeError> {
    if schema.get("$schema").is_some() {
        return Ok(AdaptedSchema::Raw(schema.clone()));
    }
    to_cloudcode_schema(schema).map(AdaptedSchema::Converted)
}

/// Convert a JSON Schema fragment into the Cloud Code dialect.
///
/// # Errors
///
/// See [`adapt_tool_schema`].
pub fn to_cloudcode_schema(schema: &Value) -> Result<Value, TranscodeError> {
    convert_value(schema, "$")
}

fn convert_value(value: &Value, path: &str) -> Result<Value, TranscodeError> {
    match value {
        Value::Object(obj) => convert_fragment(obj, path).map(Value::Object),
        other => Ok(other.clone()),
    }
}

fn convert_fragment(obj: &Map<String, Value>, path: &str) -> Result<Map<String, Value>, TranscodeError> {
    if obj.contains_key("type") && obj.contains_key("anyOf") {
        return Err(TranscodeError::SchemaConflict(format!(
            "{path}: 'type' and 'anyOf' cannot both be set"
        )));
    }

    if let Some(other) = nullable_pair_other(obj) {
        // {anyOf: [X, {type: null}]} is X with nullable set
        let mut merged = match other {
            Value::Object(inner) => inner.clone(),
            _ => Map::new(),
        };
        for (key, value) in obj {
            if key != "anyOf" && !merged.contains_key(key) {
                merged.insert(key.clone(), value.clone());
            }
        }
        let mut out = convert_fragment(&merged, path)?;
        out.insert("nullable".to_string(), Value::Bool(true));
        return Ok(out);
    }

    let mut out = Map::with_capacity(obj.len());
    let mut nullable = false;

    for (key, value) in obj {
        match key.as_str() {
            "additionalProperties" => {}
            "type" => match value {
                Value::Array(types) => {
                    let mut remaining = Vec::with_capacity(types.len());
                    for ty in types {
                        match ty.as_str() {
                            Some(name) if name.eq_ignore_ascii_case("null") => nullable = true,
                            Some(name) => remaining.push(normalize_type(name)),
                            None => remaining.push("TYPE_UNSPECIFIED"),
                        }
                    }
                    match remaining.len() {
                        0 => {
                            return Err(TranscodeError::SchemaConflict(format!(
                                "{path}: field cannot be only null"
                            )))
                        }
                        1 => {
                            out.insert("type".to_string(), Value::String(remaining[0].to_string()));
                        }
                        _ => {
                            let variants = remaining
                                .into_iter()
                                .map(|ty| {
                                    let mut m = Map::new();
                                    m.insert("type".to_string(), Value::String(ty.to_string()));
                                    Value::Object(m)
                                })
                                .collect();
                            out.insert("anyOf".to_string(), Value::Array(variants));
                        }
                    }
                }
                Value::String(name) if name.eq_ignore_ascii_case("null") => {
                    return Err(TranscodeError::SchemaConflict(format!(
                        "{path}: field cannot be only null"
                    )));
                }
                Value::String(name) => {
                    out.insert("type".to_string(), Value::String(normalize_type(name).to_string()));
                }
                _ => {
                    out.insert(
                        "type".to_string(),
                        Value::String("TYPE_UNSPECIFIED".to_string()),
                    );
                }
            },
            "anyOf" => match value {
                Value::Array(variants) => {
                    let mut converted = Vec::with_capacity(variants.len());
                    for (i, variant) in variants.iter().enumerate() {
                        if is_null_schema(variant) {
                            nullable = true;
                            continue;
                        }
                        converted.push(convert_value(variant, &format!("{path}.anyOf[{i}]"))?);
                    }
                    out.insert("anyOf".to_string(), Value::Array(converted));
                }
                other => {
                    out.insert(key.clone(), other.clone());
                }
            },
            "items" => {
                let converted = match value {
                    Value::Array(items) => {
                        let mut list = Vec::with_capacity(items.len());
                        for (i, item) in items.iter().enumerate() {
                            list.push(convert_value(item, &format!("{path}.items[{i}]"))?);
                        }
                        Value::Array(list)
                    }
                    other => convert_value(other, &format!("{path}.items"))?,
                };
                out.insert("items".to_string(), converted);
            }
            "properties" => match value {
                Value::Object(props) => {
                    let mut mapped = Map::with_capacity(props.len());
                    for (name, prop) in props {
                        mapped.insert(
                            name.clone(),
                            convert_value(prop, &format!("{path}.properties.{name}"))?,
                        );
                    }
                    out.insert("properties".to_string(), Value::Object(mapped));
                }
                other => {
                    out.insert(key.clone(), other.clone());
                }
            },
            _ => {
                out.insert(key.clone(), value.clone());
            }
        }
    }

    if nullable {
        out.insert("nullable".to_string(), Value::Bool(true));
    }
    Ok(out)
}

/// For a two-element `anyOf` with exactly one `{type: "null"}` member, return the other.
fn nullable_pair_other(obj: &Map<String, Value>) -> Option<&Value> {
    let variants = obj.get("anyOf")?.as_array()?;
    if variants.len() != 2 {
        return None;
    }
    match (is_null_schema(&variants[0]), is_null_schema(&variants[1])) {
        (true, false) => Some(&variants[1]),
        (false, true) => Some(&variants[0]),
        _ => None,
    }
}

fn is_null_schema(value: &Value) -> bool {
    value
        .get("type")
        .and_then(Value::as_str)
        .is_some_and(|ty| ty.eq_ignore_ascii_case("null"))
}

fn normalize_type(name: &str) -> &'static str {
    let upper = name.to_ascii_uppercase();
    SCHEMA_TYPES
        .iter()
        .find(|ty| **ty == upper)
        .copied()
        .unwrap_or("TYPE_UNSPECIFIED")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nullable_type_array() {
        let out = to_cloudcode_schema(&json!({"type": ["string", "null"]})).unwrap();
        assert_eq!(out, json!({"type": "STRING", "nullable": true}));
    }

    #[test]
    fn test_multi_type_becomes_any_of() {
        let out = to_cloudcode_schema(&json!({"type": ["string", "integer", "null"]})).unwrap();
        assert_eq!(
            out,
            json!({"anyOf": [{"type": "STRING"}, {"type": "INTEGER"}], "nullable": true})
        );
    }

    #[test]
    fn test_type_and_any_of_conflict() {
        let err = to_cloudcode_schema(&json!({
            "type": "object",
            "properties": {"a": {"type": "string", "anyOf": [{"type": "string"}]}}
        }))
        .unwrap_err();
        assert!(matches!(err, TranscodeError::SchemaConflict(msg) if msg.contains("properties.a")));
    }

    #[test]
    fn test_lone_null_is_error() {
        assert!(to_cloudcode_schema(&json!({"type": "null"})).is_err());
        assert!(to_cloudcode_schema(&json!({"type": ["null"]})).is_err());
    }

    #[test]
    fn test_any_of_null_pair_collapses() {
        let out = to_cloudcode_schema(&json!({
            "description": "maybe a count",
            "anyOf": [{"type": "integer"}, {"type": "null"}]
        }))
        .unwrap();
        assert_eq!(
            out,
            json!({"type": "INTEGER", "description": "maybe a count", "nullable": true})
        );
    }

    #[test]
    fn test_any_of_drops_null_members() {
        let out = to_cloudcode_schema(&json!({
            "anyOf": [{"type": "string"}, {"type": "number"}, {"type": "null"}]
        }))
        .unwrap();
        assert_eq!(
            out,
            json!({"anyOf": [{"type": "STRING"}, {"type": "NUMBER"}], "nullable": true})
        );
    }

    #[test]
    fn test_nested_properties_and_items() {
        let out = to_cloudcode_schema(&json!({
            "type": "object",
            "additionalProperties": false,
            "required": ["tags"],
            "properties": {
                "tags": {"type": "array", "items": {"type": "string", "enum": ["a", "b"]}},
                "when": {"type": "datetime"}
            }
        }))
        .unwrap();
        assert_eq!(
            out,
            json!({
                "type": "OBJECT",
                "required": ["tags"],
                "properties": {
                    "tags": {"type": "ARRAY", "items": {"type": "STRING", "enum": ["a", "b"]}},
                    "when": {"type": "TYPE_UNSPECIFIED"}
                }
            })
        );
    }

    #[test]
    fn test_schema_marker_is_raw() {
        let schema = json!({"$schema": "http://json-schema.org/draft-07/schema#", "type": "object"});
        assert_eq!(
            adapt_tool_schema(&schema).unwrap(),
            AdaptedSchema::Raw(schema.clone())
        );
    }

    #[test]
    fn test_second_pass_is_fixed_point() {
        let schema = json!({
            "type": "object",
            "properties": {
                "a": {"type": ["string", "null"]},
                "b": {"anyOf": [{"type": "integer"}, {"type": "boolean"}]},
                "c": {"anyOf": [{"type": "object", "properties": {"x": {"type": "number"}}}, {"type": "null"}]}
            }
        });
        let once = to_cloudcode_schema(&schema).unwrap();
        let twice = to_cloudcode_schema(&once).unwrap();
        assert_eq!(once, twice);
    }
}
