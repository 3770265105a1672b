//! Built-in helpers: formatting, arithmetic and the comparison/boolean
//! family used inside `#if` conditions.

use crate::value::{is_truthy, stringify};
use crate::HelperFn;
use serde_json::Value;
use std::collections::HashMap;
use std::rc::Rc;

pub(crate) fn builtins() -> HashMap<String, HelperFn> {
    let mut helpers: HashMap<String, HelperFn> = HashMap::new();
    let mut add = |name: &str, f: HelperFn| {
        helpers.insert(name.to_string(), f);
    };

    add("formatPrice", Rc::new(format_price));
    add("formatDate", Rc::new(format_date));
    add("truncate", Rc::new(truncate));
    add("uppercase", Rc::new(|args| text(args, str::to_uppercase)));
    add("lowercase", Rc::new(|args| text(args, str::to_lowercase)));
    add("capitalize", Rc::new(|args| text(args, capitalize)));
    add("countdown", Rc::new(countdown));

    add("add", Rc::new(|args| arith(args, |a, b| Some(a + b))));
    add("subtract", Rc::new(|args| arith(args, |a, b| Some(a - b))));
    add("multiply", Rc::new(|args| arith(args, |a, b| Some(a * b))));
    add(
        "divide",
        Rc::new(|args| arith(args, |a, b| if b == 0.0 { None } else { Some(a / b) })),
    );

    add("eq", Rc::new(|args| Value::Bool(loose_eq(args))));
    add("neq", Rc::new(|args| Value::Bool(!loose_eq(args))));
    add("lt", Rc::new(|args| compare(args, |a, b| a < b)));
    add("lte", Rc::new(|args| compare(args, |a, b| a <= b)));
    add("gt", Rc::new(|args| compare(args, |a, b| a > b)));
    add("gte", Rc::new(|args| compare(args, |a, b| a >= b)));
    add("and", Rc::new(|args| Value::Bool(args.iter().all(is_truthy))));
    add(
        "or",
        Rc::new(|args| Value::Bool(args.iter().any(is_truthy))),
    );
    add(
        "not",
        Rc::new(|args| Value::Bool(!args.first().is_some_and(is_truthy))),
    );

    add(
        "default",
        Rc::new(|args| {
            let value = args.first().cloned().unwrap_or(Value::Null);
            if is_truthy(&value) {
                value
            } else {
                args.get(1).cloned().unwrap_or(Value::Null)
            }
        }),
    );
    add(
        "json",
        Rc::new(|args| {
            let value = args.first().cloned().unwrap_or(Value::Null);
            Value::String(serde_json::to_string(&value).unwrap_or_default())
        }),
    );

    helpers
}

fn as_f64(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn text(args: &[Value], f: impl Fn(&str) -> String) -> Value {
    match args.first() {
        Some(value) => Value::String(f(&stringify(value))),
        None => Value::Null,
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// `formatPrice price` / `formatPrice price "€"`, always two decimals.
fn format_price(args: &[Value]) -> Value {
    let Some(amount) = as_f64(args.first()) else {
        return Value::Null;
    };
    let symbol = match args.get(1) {
        Some(Value::String(s)) => s.clone(),
        _ => "$".to_string(),
    };
    Value::String(format!("{symbol}{amount:.2}"))
}

/// `formatDate ts` / `formatDate ts "DD/MM/YYYY"` where `ts` is a Unix
/// millisecond timestamp; non-numeric input passes through unchanged.
fn format_date(args: &[Value]) -> Value {
    let Some(first) = args.first() else {
        return Value::Null;
    };
    let Some(ms) = as_f64(Some(first)) else {
        return first.clone();
    };
    let format = match args.get(1) {
        Some(Value::String(s)) => s.as_str(),
        _ => "YYYY-MM-DD",
    };
    let (year, month, day) = civil_from_days((ms / 86_400_000.0).floor() as i64);
    let out = format
        .replace("YYYY", &format!("{year:04}"))
        .replace("MM", &format!("{month:02}"))
        .replace("DD", &format!("{day:02}"));
    Value::String(out)
}

/// Days since the Unix epoch to a proleptic Gregorian civil date.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let days = days + 719_468;
    let era = if days >= 0 { days } else { days - 146_096 } / 146_097;
    let doe = days - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let year = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    (year + i64::from(month <= 2), month, day)
}

/// `truncate text 20` / `truncate text 20 "…"`, counted in chars.
fn truncate(args: &[Value]) -> Value {
    let Some(value) = args.first() else {
        return Value::Null;
    };
    let input = stringify(value);
    let limit = as_f64(args.get(1)).map(|f| f as usize).unwrap_or(50);
    if input.chars().count() <= limit {
        return Value::String(input);
    }
    let suffix = match args.get(2) {
        Some(Value::String(s)) => s.clone(),
        _ => "...".to_string(),
    };
    let cut: String = input.chars().take(limit).collect();
    Value::String(cut + &suffix)
}

/// Emits a placeholder span the widget runtime hydrates with a live
/// ticker after render.
fn countdown(args: &[Value]) -> Value {
    let Some(target) = as_f64(args.first()) else {
        return Value::Null;
    };
    Value::String(format!(
        "<span class=\"pwx-countdown\" data-pwx-countdown=\"{}\"></span>",
        target as i64
    ))
}

fn arith(args: &[Value], op: impl Fn(f64, f64) -> Option<f64>) -> Value {
    match (as_f64(args.first()), as_f64(args.get(1))) {
        (Some(a), Some(b)) => op(a, b).map(Value::from).unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn compare(args: &[Value], op: impl Fn(f64, f64) -> bool) -> Value {
    match (as_f64(args.first()), as_f64(args.get(1))) {
        (Some(a), Some(b)) => Value::Bool(op(a, b)),
        _ => Value::Bool(false),
    }
}

/// Numbers compare numerically even across int/float; everything else
/// compares structurally.
fn loose_eq(args: &[Value]) -> bool {
    match (args.first(), args.get(1)) {
        (Some(a), Some(b)) => match (as_f64(Some(a)), as_f64(Some(b))) {
            (Some(x), Some(y)) if a.is_number() && b.is_number() => x == y,
            _ => a == b,
        },
        _ => false,
    }
}
