//! Tool input extraction
//!
//! LLMs are loose with types: numbers arrive as strings and optional fields
//! arrive as empty strings. These helpers accept both.

use anyhow::{Result, anyhow};
use serde_json::{Map, Value};

fn field<'a>(input: &'a Value, key: &str) -> Option<&'a Value> {
    match input.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(v) => Some(v),
    }
}

fn missing(key: &str) -> anyhow::Error {
    anyhow!("Missing '{}' parameter", key)
}

fn invalid(key: &str, expected: &str) -> anyhow::Error {
    anyhow!("Invalid '{}' parameter: expected {}", key, expected)
}

pub fn req_str<'a>(input: &'a Value, key: &str) -> Result<&'a str> {
    opt_str(input, key).ok_or_else(|| missing(key))
}

pub fn opt_str<'a>(input: &'a Value, key: &str) -> Option<&'a str> {
    field(input, key).and_then(Value::as_str).map(str::trim)
}

pub fn str_or<'a>(input: &'a Value, key: &str, default: &'a str) -> &'a str {
    opt_str(input, key).unwrap_or(default)
}

pub fn opt_i64(input: &Value, key: &str) -> Result<Option<i64>> {
    let Some(v) = field(input, key) else {
        return Ok(None);
    };
    let parsed = match v {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed.map(Some).ok_or_else(|| invalid(key, "integer"))
}

pub fn req_i64(input: &Value, key: &str) -> Result<i64> {
    opt_i64(input, key)?.ok_or_else(|| missing(key))
}

pub fn i64_or(input: &Value, key: &str, default: i64) -> Result<i64> {
    Ok(opt_i64(input, key)?.unwrap_or(default))
}

pub fn opt_f64(input: &Value, key: &str) -> Result<Option<f64>> {
    let Some(v) = field(input, key) else {
        return Ok(None);
    };
    let parsed = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', "").parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|f| f.is_finite())
        .map(Some)
        .ok_or_else(|| invalid(key, "number"))
}

pub fn req_f64(input: &Value, key: &str) -> Result<f64> {
    opt_f64(input, key)?.ok_or_else(|| missing(key))
}

pub fn f64_or(input: &Value, key: &str, default: f64) -> Result<f64> {
    Ok(opt_f64(input, key)?.unwrap_or(default))
}

pub fn opt_bool(input: &Value, key: &str) -> Option<bool> {
    match field(input, key)? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|i| i != 0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// List of strings, also accepting a comma-separated string
pub fn str_list(input: &Value, key: &str) -> Vec<String> {
    match field(input, key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

/// Object parameter, also accepting a JSON-encoded string
pub fn opt_object(input: &Value, key: &str) -> Result<Option<Map<String, Value>>> {
    match field(input, key) {
        None => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map.clone())),
        Some(Value::String(s)) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(map)) => Ok(Some(map)),
            _ => Err(invalid(key, "object")),
        },
        Some(_) => Err(invalid(key, "object")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strings() {
        let input = json!({"a": " hi ", "b": "", "c": 5});
        assert_eq!(req_str(&input, "a").unwrap(), "hi");
        assert_eq!(
            req_str(&input, "b").unwrap_err().to_string(),
            "Missing 'b' parameter"
        );
        assert_eq!(str_or(&input, "zz", "all"), "all");
        assert!(opt_str(&input, "c").is_none());
    }

    #[test]
    fn test_numbers_accept_strings() {
        let input = json!({"n": "7", "f": "1,250.5", "x": 3.0, "bad": "seven"});
        assert_eq!(req_i64(&input, "n").unwrap(), 7);
        assert_eq!(req_i64(&input, "x").unwrap(), 3);
        assert_eq!(req_f64(&input, "f").unwrap(), 1250.5);
        assert_eq!(i64_or(&input, "none", 5).unwrap(), 5);
        assert_eq!(
            req_i64(&input, "bad").unwrap_err().to_string(),
            "Invalid 'bad' parameter: expected integer"
        );
    }

    #[test]
    fn test_lists_and_objects() {
        let input = json!({"l": ["a", " b ", ""], "s": "x, y", "o": "{\"k\": 1}"});
        assert_eq!(str_list(&input, "l"), vec!["a", "b"]);
        assert_eq!(str_list(&input, "s"), vec!["x", "y"]);
        assert_eq!(opt_object(&input, "o").unwrap().unwrap()["k"], 1);
        assert!(opt_object(&input, "s").is_err());
        assert_eq!(opt_bool(&json!({"b": "yes"}), "b"), Some(true));
    }
}
