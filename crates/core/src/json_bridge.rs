//! Conversion between `serde_json::Value` (the wire format for artifact
//! arguments, context, and return values) and `rhai::Dynamic` (what the
//! sandboxed engine actually operates on).

use std::collections::HashMap;

use rhai::{Dynamic, Map};
use serde_json::Value;

pub fn value_to_dynamic(value: &Value) -> Dynamic {
    match value {
        Value::Null => Dynamic::UNIT,
        Value::Bool(b) => Dynamic::from(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Dynamic::from(i)
            } else {
                Dynamic::from(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => Dynamic::from(s.clone()),
        Value::Array(arr) => {
            let items: rhai::Array = arr.iter().map(value_to_dynamic).collect();
            Dynamic::from(items)
        }
        Value::Object(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                out.insert(k.as_str().into(), value_to_dynamic(v));
            }
            Dynamic::from(out)
        }
    }
}

pub fn dynamic_to_json(value: &Dynamic) -> Value {
    if value.is_unit() {
        return Value::Null;
    }
    if let Some(b) = value.clone().try_cast::<bool>() {
        return Value::Bool(b);
    }
    if let Some(i) = value.clone().try_cast::<i64>() {
        return Value::from(i);
    }
    if let Some(f) = value.clone().try_cast::<f64>() {
        return serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null);
    }
    if let Ok(s) = value.clone().into_string() {
        return Value::String(s);
    }
    if let Some(arr) = value.clone().try_cast::<rhai::Array>() {
        return Value::Array(arr.iter().map(dynamic_to_json).collect());
    }
    if let Some(map) = value.clone().try_cast::<Map>() {
        return Value::Object(map_to_json(&map).into_iter().collect());
    }
    Value::Null
}

pub fn map_to_json(map: &Map) -> HashMap<String, Value> {
    map.iter()
        .map(|(k, v)| (k.to_string(), dynamic_to_json(v)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_nested_structures() {
        let value = json!({"a": 1, "b": [true, null, "s"], "c": {"d": 2.5}});
        let dynamic = value_to_dynamic(&value);
        let back = dynamic_to_json(&dynamic);
        assert_eq!(back["a"], json!(1));
        assert_eq!(back["b"], json!([true, null, "s"]));
        assert_eq!(back["c"]["d"], json!(2.5));
    }
}
