//! Block expansion: `#each`, `#if`/`{{else}}`, `#unless`, `#with`.
//!
//! Blocks are expanded outermost-first. The body of a matched block is
//! rendered recursively against the branch or iteration context, so
//! variables inside a block see that context; everything left after
//! expansion is interpolated once against the root data.

use crate::value::{is_truthy, resolve_path};
use crate::{TemplateEngine, TemplateError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

static OPEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{#(each|if|unless|with)\s+([^{}]+?)\s*\}\}").expect("static pattern")
});

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Quoted(String),
    Bare(String),
}

impl TemplateEngine {
    pub(crate) fn expand_blocks(
        &self,
        input: &str,
        ctx: &Value,
    ) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;
        while let Some(caps) = OPEN_RE.captures(rest) {
            let Some(open) = caps.get(0) else { break };
            let name = &caps[1];
            let expr = caps[2].trim().to_string();
            out.push_str(&rest[..open.start()]);

            let after_open = &rest[open.end()..];
            let Some((body_end, resume)) = matching_close(name, after_open) else {
                return Err(TemplateError::UnclosedBlock(name.to_string()));
            };
            let body = &after_open[..body_end];
            out.push_str(&self.expand_one(name, &expr, body, ctx)?);
            rest = &after_open[resume..];
        }
        out.push_str(rest);
        Ok(out)
    }

    fn expand_one(
        &self,
        name: &str,
        expr: &str,
        body: &str,
        ctx: &Value,
    ) -> Result<String, TemplateError> {
        match name {
            "each" => {
                let Some(Value::Array(items)) = resolve_path(ctx, expr) else {
                    return Ok(String::new());
                };
                let len = items.len();
                let mut out = String::new();
                for (index, item) in items.iter().enumerate() {
                    let child = each_context(ctx, item, index, len);
                    out.push_str(&self.render_fragment(body, &child)?);
                }
                Ok(out)
            }
            "if" | "unless" => {
                let (then_branch, else_branch) = split_else(body);
                let mut hit = is_truthy(&self.eval_expr(expr, ctx)?);
                if name == "unless" {
                    hit = !hit;
                }
                let chosen = if hit {
                    then_branch
                } else {
                    else_branch.unwrap_or("")
                };
                self.render_fragment(chosen, ctx)
            }
            "with" => match resolve_path(ctx, expr) {
                Some(Value::Object(fields)) => {
                    let child = with_context(ctx, &fields);
                    self.render_fragment(body, &child)
                }
                _ => Ok(String::new()),
            },
            _ => Ok(String::new()),
        }
    }

    /// Evaluate an expression: a literal, a context path, or a helper
    /// call with space-separated arguments.
    pub(crate) fn eval_expr(&self, expr: &str, ctx: &Value) -> Result<Value, TemplateError> {
        let tokens = tokenize(expr);
        match tokens.split_first() {
            None => Ok(Value::Null),
            Some((first, rest)) if !rest.is_empty() => {
                let Token::Bare(name) = first else {
                    return Ok(token_value(first, ctx));
                };
                let helper = self
                    .helpers
                    .get(name)
                    .ok_or_else(|| TemplateError::UnknownHelper(name.clone()))?;
                let args: Vec<Value> = rest.iter().map(|t| token_value(t, ctx)).collect();
                Ok(helper(&args))
            }
            Some((single, _)) => Ok(token_value(single, ctx)),
        }
    }
}

/// Find the close tag matching an already-consumed open tag, skipping
/// nested blocks of the same name. Returns (body end, offset past the
/// close tag), both relative to `text`.
fn matching_close(name: &str, text: &str) -> Option<(usize, usize)> {
    let open_marker = format!("{{{{#{name}");
    let close_marker = format!("{{{{/{name}}}}}");
    let mut depth = 1usize;
    let mut pos = 0usize;
    loop {
        let close = pos + text[pos..].find(&close_marker)?;
        match find_open(text, pos, &open_marker) {
            Some(open) if open < close => {
                depth += 1;
                pos = open + open_marker.len();
            }
            _ => {
                depth -= 1;
                if depth == 0 {
                    return Some((close, close + close_marker.len()));
                }
                pos = close + close_marker.len();
            }
        }
    }
}

/// Open markers must be followed by whitespace so `#if` never matches a
/// hypothetical `#iffy`.
fn find_open(text: &str, mut from: usize, marker: &str) -> Option<usize> {
    while let Some(rel) = text[from..].find(marker) {
        let at = from + rel;
        let next = text[at + marker.len()..].chars().next();
        if next.is_some_and(char::is_whitespace) {
            return Some(at);
        }
        from = at + marker.len();
    }
    None
}

/// Split a block body at its top-level `{{else}}`, ignoring any inside
/// nested blocks.
fn split_else(body: &str) -> (&str, Option<&str>) {
    let mut depth = 0usize;
    let mut i = 0usize;
    while let Some(rel) = body[i..].find("{{") {
        let at = i + rel;
        let rest = &body[at..];
        if rest.starts_with("{{#") {
            depth += 1;
            i = at + 3;
        } else if rest.starts_with("{{/") {
            depth = depth.saturating_sub(1);
            i = at + 3;
        } else if depth == 0 && rest.starts_with("{{else}}") {
            return (&body[..at], Some(&body[at + "{{else}}".len()..]));
        } else {
            i = at + 2;
        }
    }
    (body, None)
}

/// Per-iteration context: outer fields, shadowed by the item's own
/// fields when it is an object, plus `this` and the `@` metadata.
fn each_context(outer: &Value, item: &Value, index: usize, len: usize) -> Value {
    let mut fields = match outer {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    if let Value::Object(own) = item {
        for (key, value) in own {
            fields.insert(key.clone(), value.clone());
        }
    }
    fields.insert("this".into(), item.clone());
    fields.insert("@index".into(), Value::from(index));
    fields.insert("@first".into(), Value::Bool(index == 0));
    fields.insert("@last".into(), Value::Bool(index + 1 == len));
    fields.insert("@length".into(), Value::from(len));
    Value::Object(fields)
}

fn with_context(outer: &Value, object: &Map<String, Value>) -> Value {
    let mut fields = match outer {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    for (key, value) in object {
        fields.insert(key.clone(), value.clone());
    }
    fields.insert("this".into(), Value::Object(object.clone()));
    Value::Object(fields)
}

/// Space-separated argument list honoring single/double-quoted string
/// literals.
fn tokenize(expr: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = expr.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '"' || c == '\'' {
            chars.next();
            let mut s = String::new();
            for ch in chars.by_ref() {
                if ch == c {
                    break;
                }
                s.push(ch);
            }
            tokens.push(Token::Quoted(s));
        } else {
            let mut s = String::new();
            while let Some(&ch) = chars.peek() {
                if ch.is_whitespace() {
                    break;
                }
                s.push(ch);
                chars.next();
            }
            tokens.push(Token::Bare(s));
        }
    }
    tokens
}

fn token_value(token: &Token, ctx: &Value) -> Value {
    match token {
        Token::Quoted(s) => Value::String(s.clone()),
        Token::Bare(s) => match s.as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            "null" => Value::Null,
            _ => {
                if let Ok(i) = s.parse::<i64>() {
                    return Value::from(i);
                }
                if let Ok(f) = s.parse::<f64>() {
                    return Value::from(f);
                }
                resolve_path(ctx, s).unwrap_or(Value::Null)
            }
        },
    }
}
