//! Typed access over the merged settings map (server descriptor
//! settings overlaid with `data-pwx-*` container attributes).

use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct Settings(BTreeMap<String, Value>);

impl Settings {
    pub fn new(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }

    /// Server settings first, then overrides on top (DOM wins).
    pub fn merged(base: &BTreeMap<String, Value>, overrides: &BTreeMap<String, Value>) -> Self {
        let mut map = base.clone();
        for (key, value) in overrides {
            map.insert(key.clone(), value.clone());
        }
        Self(map)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn bool(&self, key: &str, default: bool) -> bool {
        match self.0.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s == "true",
            _ => default,
        }
    }

    pub fn u64(&self, key: &str, default: u64) -> u64 {
        match self.0.get(key) {
            Some(Value::Number(n)) => n.as_u64().unwrap_or(default),
            Some(Value::String(s)) => s.parse().unwrap_or(default),
            _ => default,
        }
    }

    pub fn usize(&self, key: &str, default: usize) -> usize {
        self.u64(key, default as u64) as usize
    }

    pub fn f64(&self, key: &str, default: f64) -> f64 {
        match self.0.get(key) {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(default),
            Some(Value::String(s)) => s.parse().unwrap_or(default),
            _ => default,
        }
    }

    pub fn str(&self, key: &str, default: &str) -> String {
        match self.0.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(other) if !other.is_null() => other.to_string(),
            _ => default.to_string(),
        }
    }

    /// The raw map, for template data contexts.
    pub fn as_value(&self) -> Value {
        Value::Object(self.0.clone().into_iter().collect())
    }
}
