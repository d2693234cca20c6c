// src/services/schema_faker.rs
//! Example data generation for credential binding.
//!
//! `bind_credential` fills a credential with sample subject data that
//! conforms to the bound JSON Schema. The generator is a trait so callers
//! can plug in their own data source; [`SchemaFaker`] is the built-in one.
//!
//! Supported keywords: `const`, `enum`, `default`, `examples`, `type`
//! (single or list), `properties`, `items`, `minimum`/`maximum`,
//! `exclusiveMinimum`/`exclusiveMaximum`, `minLength`/`maxLength`,
//! `minItems`/`maxItems` and the string formats `email`, `date`,
//! `date-time`, `uri` and `uuid`. Anything else is ignored.

use crate::error::{Error, Result};
use chrono::{Duration, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::{json, Map, Value};
use std::sync::{Mutex, PoisonError};

/// Nesting beyond this depth yields `null`.
const MAX_DEPTH: usize = 8;

const DEFAULT_MIN_LENGTH: u64 = 5;
const DEFAULT_MAX_LENGTH: u64 = 12;
const DEFAULT_MAX_ITEMS: u64 = 3;
const DEFAULT_MINIMUM: i64 = 0;
const DEFAULT_MAXIMUM: i64 = 1000;

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Produces an example instance of a JSON Schema.
pub trait ExampleGenerator: Send + Sync {
    fn generate(&self, schema: &Value) -> Result<Value>;
}

/// Random instance generator for JSON Schemas.
///
/// Numbers are whole-valued so generated credentials hash identically
/// after a JSON round trip.
pub struct SchemaFaker {
    rng: Mutex<StdRng>,
}

impl SchemaFaker {
    pub fn new() -> Self {
        SchemaFaker {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic generator, for tests.
    pub fn seeded(seed: u64) -> Self {
        SchemaFaker {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for SchemaFaker {
    fn default() -> Self {
        SchemaFaker::new()
    }
}

impl ExampleGenerator for SchemaFaker {
    fn generate(&self, schema: &Value) -> Result<Value> {
        if !schema.is_object() {
            return Err(Error::InvalidInput("schema must be a JSON object".into()));
        }

        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        instance(&mut rng, schema, 0)
    }
}

fn instance(rng: &mut StdRng, schema: &Value, depth: usize) -> Result<Value> {
    let schema = match schema {
        Value::Object(map) => map,
        // `true` accepts anything
        Value::Bool(true) => return Ok(Value::Null),
        _ => return Err(Error::InvalidInput(format!("unsupported schema: {}", schema))),
    };

    if depth > MAX_DEPTH {
        return Ok(Value::Null);
    }

    if let Some(value) = schema.get("const") {
        return Ok(value.clone());
    }
    if let Some(choice) = pick(rng, schema.get("enum")) {
        return Ok(choice);
    }
    if let Some(value) = schema.get("default") {
        return Ok(value.clone());
    }
    if let Some(choice) = pick(rng, schema.get("examples")) {
        return Ok(choice);
    }

    match schema_type(rng, schema) {
        "object" => object(rng, schema, depth),
        "array" => array(rng, schema, depth),
        "integer" => Ok(json!(integer(rng, schema)?)),
        "number" => Ok(json!(integer(rng, schema)? as f64)),
        "boolean" => Ok(Value::Bool(rng.gen_bool(0.5))),
        "null" => Ok(Value::Null),
        _ => Ok(Value::String(string(rng, schema)?)),
    }
}

/// Random element of a non-empty array keyword.
fn pick(rng: &mut StdRng, values: Option<&Value>) -> Option<Value> {
    values?.as_array()?.choose(rng).cloned()
}

fn schema_type<'a>(rng: &mut StdRng, schema: &'a Map<String, Value>) -> &'a str {
    match schema.get("type") {
        Some(Value::String(t)) => t.as_str(),
        Some(Value::Array(types)) => {
            let concrete: Vec<&str> = types
                .iter()
                .filter_map(Value::as_str)
                .filter(|t| *t != "null")
                .collect();
            concrete.choose(rng).copied().unwrap_or("null")
        }
        _ if schema.contains_key("properties") => "object",
        _ if schema.contains_key("items") => "array",
        _ => "string",
    }
}

fn object(rng: &mut StdRng, schema: &Map<String, Value>, depth: usize) -> Result<Value> {
    let mut out = Map::new();
    if let Some(Value::Object(properties)) = schema.get("properties") {
        for (name, property) in properties {
            out.insert(name.clone(), instance(rng, property, depth + 1)?);
        }
    }
    Ok(Value::Object(out))
}

fn array(rng: &mut StdRng, schema: &Map<String, Value>, depth: usize) -> Result<Value> {
    let min = bound(schema, "minItems").unwrap_or(1);
    let max = bound(schema, "maxItems").unwrap_or_else(|| min.max(DEFAULT_MAX_ITEMS));
    if min > max {
        return Err(Error::InvalidInput("minItems exceeds maxItems".into()));
    }

    let items = schema.get("items").cloned().unwrap_or_else(|| json!({}));
    let count = rng.gen_range(min..=max);
    (0..count)
        .map(|_| instance(rng, &items, depth + 1))
        .collect::<Result<Vec<_>>>()
        .map(Value::Array)
}

fn integer(rng: &mut StdRng, schema: &Map<String, Value>) -> Result<i64> {
    let number = |key: &str| schema.get(key).and_then(Value::as_f64);

    let low = match (number("minimum"), number("exclusiveMinimum")) {
        (_, Some(x)) => Some(whole(x.floor())?.checked_add(1).ok_or_else(out_of_range)?),
        (m, None) => m.map(|m| whole(m.ceil())).transpose()?,
    };
    let high = match (number("maximum"), number("exclusiveMaximum")) {
        (_, Some(x)) => Some(whole(x.ceil())?.checked_sub(1).ok_or_else(out_of_range)?),
        (m, None) => m.map(|m| whole(m.floor())).transpose()?,
    };

    let (min, max) = match (low, high) {
        (Some(min), Some(max)) => (min, max),
        (Some(min), None) => (min, min.max(DEFAULT_MAXIMUM)),
        (None, Some(max)) => (max.min(DEFAULT_MINIMUM), max),
        (None, None) => (DEFAULT_MINIMUM, DEFAULT_MAXIMUM),
    };

    if min > max {
        return Err(Error::InvalidInput("numeric range is empty".into()));
    }
    Ok(rng.gen_range(min..=max))
}

/// Integral `x` as an i64, if it lies strictly inside the i64 range.
fn whole(x: f64) -> Result<i64> {
    // i64::MAX as f64 rounds up to 2^63, so the upper check is exclusive
    if x >= i64::MIN as f64 && x < i64::MAX as f64 {
        Ok(x as i64)
    } else {
        Err(out_of_range())
    }
}

fn out_of_range() -> Error {
    Error::InvalidInput("numeric bound is outside the integer range".into())
}

fn string(rng: &mut StdRng, schema: &Map<String, Value>) -> Result<String> {
    match schema.get("format").and_then(Value::as_str) {
        Some("email") => return Ok(format!("{}@example.com", word(rng, 8))),
        Some("uri") => return Ok(format!("https://example.com/{}", word(rng, 8))),
        Some("date") => return Ok(past_instant(rng).format("%Y-%m-%d").to_string()),
        Some("date-time") => return Ok(past_instant(rng).to_rfc3339()),
        Some("uuid") => return Ok(uuid(rng)),
        _ => {}
    }

    let min = bound(schema, "minLength").unwrap_or(DEFAULT_MIN_LENGTH);
    let max = bound(schema, "maxLength").unwrap_or_else(|| min.max(DEFAULT_MAX_LENGTH));
    if min > max {
        return Err(Error::InvalidInput("minLength exceeds maxLength".into()));
    }

    let len = rng.gen_range(min..=max) as usize;
    Ok(word(rng, len))
}

fn bound(schema: &Map<String, Value>, key: &str) -> Option<u64> {
    schema.get(key).and_then(Value::as_u64)
}

fn word(rng: &mut StdRng, len: usize) -> String {
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

fn past_instant(rng: &mut StdRng) -> chrono::DateTime<Utc> {
    Utc::now() - Duration::seconds(rng.gen_range(0..10 * 365 * 24 * 3600))
}

fn uuid(rng: &mut StdRng) -> String {
    let bytes: [u8; 16] = rng.gen();
    let hex = hex::encode(bytes);
    format!(
        "{}-{}-4{}-a{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[13..16],
        &hex[17..20],
        &hex[20..32]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn faker() -> SchemaFaker {
        SchemaFaker::seeded(7)
    }

    #[test]
    fn test_object_schema_fills_every_property() {
        let schema = json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "type": "object",
            "properties": {
                "email": { "type": "string", "format": "email" },
                "age": { "type": "integer", "minimum": 18, "maximum": 99 },
                "member": { "type": "boolean" }
            },
            "required": ["email"]
        });

        let value = faker().generate(&schema).unwrap();
        assert!(value["email"].as_str().unwrap().ends_with("@example.com"));
        let age = value["age"].as_i64().unwrap();
        assert!((18..=99).contains(&age));
        assert!(value["member"].is_boolean());
    }

    #[test]
    fn test_keywords_take_precedence_over_type() {
        let faker = faker();
        assert_eq!(
            faker.generate(&json!({"type": "string", "const": "fixed"})).unwrap(),
            json!("fixed")
        );

        let picked = faker.generate(&json!({"enum": ["a", "b"]})).unwrap();
        assert!(picked == json!("a") || picked == json!("b"));
    }

    #[test]
    fn test_string_length_bounds() {
        let schema = json!({"type": "string", "minLength": 3, "maxLength": 4});
        let value = faker().generate(&schema).unwrap();
        let len = value.as_str().unwrap().len();
        assert!(len == 3 || len == 4);
    }

    #[test]
    fn test_array_items() {
        let schema = json!({"type": "array", "items": {"type": "integer"}, "minItems": 2, "maxItems": 2});
        let value = faker().generate(&schema).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 2);
        assert!(value[0].is_i64());
    }

    #[test]
    fn test_numbers_are_whole() {
        let value = faker()
            .generate(&json!({"type": "number", "minimum": 1.5, "maximum": 3.5}))
            .unwrap();
        let n = value.as_f64().unwrap();
        assert_eq!(n.fract(), 0.0);
        assert!((2.0..=3.0).contains(&n));
    }

    #[test]
    fn test_seeded_generators_agree() {
        let schema = json!({"properties": {"name": {"type": "string"}}});
        assert_eq!(
            SchemaFaker::seeded(1).generate(&schema).unwrap(),
            SchemaFaker::seeded(1).generate(&schema).unwrap()
        );
    }

    #[test]
    fn test_rejects_invalid_schemas() {
        assert!(matches!(faker().generate(&json!("nope")), Err(Error::InvalidInput(_))));
        assert!(matches!(
            faker().generate(&json!({"type": "integer", "minimum": 5, "maximum": 1})),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_bounds_beyond_integer_range_are_rejected() {
        for schema in [
            json!({"type": "integer", "exclusiveMinimum": 1e300}),
            json!({"type": "integer", "exclusiveMaximum": -1e300}),
            json!({"type": "integer", "minimum": -1e300, "maximum": 1e19}),
        ] {
            assert!(matches!(faker().generate(&schema), Err(Error::InvalidInput(_))));
        }

        let value = faker()
            .generate(&json!({"type": "integer", "exclusiveMinimum": 1e15}))
            .unwrap();
        assert!(value.as_i64().unwrap() > 1_000_000_000_000_000);
    }
}
