//! `data-pwx-*` attribute coercion.
//!
//! The DOM container contract declares widget settings as kebab-case data
//! attributes (`data-pwx-slides-to-show="4"`). Settings keys are camelCased
//! and values coerced to JSON scalars so DOM-declared and server-declared
//! settings share one shape.

use serde_json::Value;
use std::collections::BTreeMap;

/// Attribute prefix of the whole DOM contract.
pub const ATTR_PREFIX: &str = "data-pwx-";

/// Attributes with reserved meaning, never treated as widget settings.
pub const RESERVED: &[&str] = &[
    "data-pwx-widget",
    "data-pwx-id",
    "data-pwx-immediate",
    "data-pwx-initialized",
    "data-pwx-state",
];

/// `slides-to-show` -> `slidesToShow`.
pub fn kebab_to_camel(kebab: &str) -> String {
    let mut out = String::with_capacity(kebab.len());
    let mut upper_next = false;
    for ch in kebab.chars() {
        if ch == '-' {
            upper_next = true;
        } else if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}

/// Coerce a raw attribute string into the closest JSON scalar.
///
/// Booleans, null, numbers and bracketed JSON parse through; everything
/// else stays a string. An empty attribute (`data-pwx-autoplay`) means
/// `true`, matching the HTML boolean-attribute convention.
pub fn coerce_value(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Bool(true);
    }
    match trimmed {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "null" => return Value::Null,
        _ => {}
    }
    if let Ok(n) = trimmed.parse::<i64>() {
        return Value::from(n);
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        if f.is_finite() {
            return Value::from(f);
        }
    }
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Ok(v) = serde_json::from_str(trimmed) {
            return v;
        }
    }
    Value::String(trimmed.to_string())
}

/// Extract widget settings from a container's attribute list.
pub fn settings_from_attrs<'a>(
    attrs: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> BTreeMap<String, Value> {
    let mut settings = BTreeMap::new();
    for (name, value) in attrs {
        if !name.starts_with(ATTR_PREFIX) || RESERVED.contains(&name) {
            continue;
        }
        let key = kebab_to_camel(&name[ATTR_PREFIX.len()..]);
        settings.insert(key, coerce_value(value));
    }
    settings
}
