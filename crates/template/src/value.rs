//! Context value plumbing: path resolution, truthiness, output
//! stringification and HTML escaping.

use serde_json::Value;

/// Resolve a dotted path against the active context. Each segment may
/// carry a single bracketed index (`items[0]`); `this` and `@`-names
/// resolve directly; any missing intermediate yields `None`.
pub fn resolve_path(ctx: &Value, path: &str) -> Option<Value> {
    if path.starts_with('@') {
        return ctx.get(path).cloned();
    }
    let mut current = ctx;
    for (i, segment) in path.split('.').enumerate() {
        if segment == "this" {
            if i == 0 {
                if let Some(inner) = current.get("this") {
                    current = inner;
                }
                continue;
            }
            return None;
        }
        let (name, index) = split_index(segment)?;
        if !name.is_empty() {
            current = current.get(name)?;
        }
        if let Some(index) = index {
            current = current.get(index)?;
        }
    }
    Some(current.clone())
}

/// `"items[2]"` → `("items", Some(2))`; `"items"` → `("items", None)`.
/// Malformed brackets resolve the whole path to nothing.
fn split_index(segment: &str) -> Option<(&str, Option<usize>)> {
    match segment.find('[') {
        None => Some((segment, None)),
        Some(open) => {
            let rest = &segment[open + 1..];
            let close = rest.find(']')?;
            if close + 1 != rest.len() {
                return None;
            }
            let index = rest[..close].parse::<usize>().ok()?;
            Some((&segment[..open], Some(index)))
        }
    }
}

/// Empty string, empty array, `null` and `false` are falsy. `0` is
/// truthy so zero-priced and zero-count values still render.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(_) => true,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(_) => true,
    }
}

/// Render a value for output. Whole-number floats print without the
/// trailing `.0`; arrays and objects print as compact JSON.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => format_number(n),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn format_number(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
        Some(f) => f.to_string(),
        None => n.to_string(),
    }
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_dotted_paths_and_indices() {
        let ctx = json!({"a": {"b": [{"c": 7}]}});
        assert_eq!(resolve_path(&ctx, "a.b[0].c"), Some(json!(7)));
        assert_eq!(resolve_path(&ctx, "a.missing.c"), None);
        assert_eq!(resolve_path(&ctx, "a.b[9]"), None);
    }

    #[test]
    fn this_resolves_to_the_bound_item() {
        let ctx = json!({"this": "item", "name": "n"});
        assert_eq!(resolve_path(&ctx, "this"), Some(json!("item")));
        let plain = json!({"name": "n"});
        assert_eq!(resolve_path(&plain, "this"), Some(plain.clone()));
    }

    #[test]
    fn at_names_resolve_directly() {
        let ctx = json!({"@index": 3});
        assert_eq!(resolve_path(&ctx, "@index"), Some(json!(3)));
    }

    #[test]
    fn zero_is_truthy_but_empty_collections_are_not() {
        assert!(is_truthy(&json!(0)));
        assert!(is_truthy(&json!(0.0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!([])));
        assert!(!is_truthy(&Value::Null));
        assert!(!is_truthy(&json!(false)));
        assert!(is_truthy(&json!({})));
    }

    #[test]
    fn whole_floats_print_without_decimal() {
        assert_eq!(stringify(&json!(10.0)), "10");
        assert_eq!(stringify(&json!(10.5)), "10.5");
        assert_eq!(stringify(&json!(3)), "3");
        assert_eq!(stringify(&Value::Null), "");
    }

    #[test]
    fn escapes_markup_characters() {
        assert_eq!(escape_html(r#"<a href="x">&'"#), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
    }
}
