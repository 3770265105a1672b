//! # pwx-template — Handlebars-like micro template language
//!
//! Interpreter for the template dialect admin-authored widget templates
//! are written in: `{{escaped}}` / `{{{raw}}}` interpolation, block
//! helpers (`#each`, `#if`/`{{else}}`, `#unless`, `#with`) and named
//! helpers with a small argument grammar. Blocks are always expanded
//! before interpolation, and `0` is truthy in conditions so zero-priced
//! values render. No AST is built; blocks are matched by scanning and
//! recursively re-rendered against branch contexts.

#![forbid(unsafe_code)]

mod blocks;
mod helpers;
mod value;

pub use value::{escape_html, is_truthy, resolve_path, stringify};

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::rc::Rc;
use thiserror::Error;

pub type HelperFn = Rc<dyn Fn(&[Value]) -> Value>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unknown helper `{0}`")]
    UnknownHelper(String),
    #[error("unclosed block `#{0}`")]
    UnclosedBlock(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemplateOptions {
    /// Escape `{{var}}` output. `{{{var}}}` is never escaped.
    pub escape_html: bool,
    /// Propagate render errors instead of emitting an inert comment.
    pub strict: bool,
}

impl Default for TemplateOptions {
    fn default() -> Self {
        Self {
            escape_html: true,
            strict: false,
        }
    }
}

static RAW_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\{\s*([^{}]+?)\s*\}\}\}").expect("static pattern"));
static VAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([^#/{}!][^{}]*?)\s*\}\}").expect("static pattern"));

pub struct TemplateEngine {
    template: String,
    options: TemplateOptions,
    pub(crate) helpers: HashMap<String, HelperFn>,
}

impl TemplateEngine {
    pub fn new(template: impl Into<String>) -> Self {
        Self::with_options(template, TemplateOptions::default())
    }

    pub fn with_options(template: impl Into<String>, options: TemplateOptions) -> Self {
        Self {
            template: template.into(),
            options,
            helpers: helpers::builtins(),
        }
    }

    /// Register (or override) a named helper.
    pub fn register_helper(
        &mut self,
        name: &str,
        helper: impl Fn(&[Value]) -> Value + 'static,
    ) {
        self.helpers.insert(name.to_string(), Rc::new(helper));
    }

    /// Render against a data context. In non-strict mode any render
    /// error becomes an inert HTML comment so a broken template never
    /// takes the host page down with it.
    pub fn render(&self, data: &Value) -> Result<String, TemplateError> {
        match self.render_fragment(&self.template, data) {
            Ok(out) => Ok(out),
            Err(err) if !self.options.strict => Ok(format!(
                "<!-- template error: {} -->",
                escape_html(&err.to_string())
            )),
            Err(err) => Err(err),
        }
    }

    /// Expand blocks, then interpolate what remains. Block bodies are
    /// rendered through this same path with their branch context.
    pub(crate) fn render_fragment(
        &self,
        input: &str,
        ctx: &Value,
    ) -> Result<String, TemplateError> {
        let expanded = self.expand_blocks(input, ctx)?;
        self.interpolate(&expanded, ctx)
    }

    fn interpolate(&self, input: &str, ctx: &Value) -> Result<String, TemplateError> {
        let raw = self.replace_all(&RAW_RE, input, ctx, false)?;
        self.replace_all(&VAR_RE, &raw, ctx, self.options.escape_html)
    }

    fn replace_all(
        &self,
        re: &Regex,
        input: &str,
        ctx: &Value,
        escape: bool,
    ) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(input.len());
        let mut last = 0;
        for caps in re.captures_iter(input) {
            let Some(whole) = caps.get(0) else { continue };
            out.push_str(&input[last..whole.start()]);
            let rendered = stringify(&self.eval_expr(caps[1].trim(), ctx)?);
            if escape {
                out.push_str(&escape_html(&rendered));
            } else {
                out.push_str(&rendered);
            }
            last = whole.end();
        }
        out.push_str(&input[last..]);
        Ok(out)
    }

    /// Cheap structural checks without a full parse: per-type block
    /// balance and overall brace balance.
    pub fn validate(&self) -> Vec<String> {
        static BLOCK_OPEN_RE: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"\{\{#(each|if|unless|with)\b").expect("static pattern")
        });

        let mut errors = Vec::new();
        let mut opens: HashMap<&str, usize> = HashMap::new();
        for caps in BLOCK_OPEN_RE.captures_iter(&self.template) {
            if let Some(name) = caps.get(1) {
                *opens.entry(name.as_str()).or_default() += 1;
            }
        }
        for name in ["each", "if", "unless", "with"] {
            let opened = opens.get(name).copied().unwrap_or(0);
            let closed = self
                .template
                .matches(&format!("{{{{/{name}}}}}"))
                .count();
            if opened != closed {
                errors.push(format!(
                    "unbalanced #{name} blocks: {opened} opened, {closed} closed"
                ));
            }
        }

        let open_braces = self.template.matches("{{").count();
        let close_braces = self.template.matches("}}").count();
        if open_braces != close_braces {
            errors.push(format!(
                "unbalanced braces: {open_braces} opening vs {close_braces} closing"
            ));
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render(template: &str, data: Value) -> String {
        TemplateEngine::new(template).render(&data).unwrap()
    }

    #[test]
    fn interpolates_escaped_and_raw() {
        assert_eq!(render("{{x}}", json!({"x": "v"})), "v");
        assert_eq!(render("{{x}}", json!({"x": "<b>"})), "&lt;b&gt;");
        assert_eq!(render("{{{x}}}", json!({"x": "<b>"})), "<b>");
        assert_eq!(render("{{missing}}", json!({})), "");
    }

    #[test]
    fn escaping_can_be_disabled() {
        let engine = TemplateEngine::with_options(
            "{{x}}",
            TemplateOptions {
                escape_html: false,
                strict: false,
            },
        );
        assert_eq!(engine.render(&json!({"x": "<b>"})).unwrap(), "<b>");
    }

    #[test]
    fn each_injects_iteration_metadata() {
        let out = render(
            "{{#each items}}{{@index}}:{{this}}{{#unless @last}},{{/unless}}{{/each}}",
            json!({"items": ["a", "b", "c"]}),
        );
        assert_eq!(out, "0:a,1:b,2:c");
    }

    #[test]
    fn each_spreads_object_items_and_reaches_outer_context() {
        let out = render(
            "{{#each items}}{{name}}-{{shop}};{{/each}}",
            json!({"shop": "acme", "items": [{"name": "A"}, {"name": "B"}]}),
        );
        assert_eq!(out, "A-acme;B-acme;");
    }

    #[test]
    fn each_of_non_array_or_empty_is_empty() {
        assert_eq!(render("{{#each x}}y{{/each}}", json!({"x": 5})), "");
        assert_eq!(render("{{#each x}}y{{/each}}", json!({"x": []})), "");
        assert_eq!(render("{{#each x}}y{{/each}}", json!({})), "");
    }

    #[test]
    fn if_inside_each_uses_the_item_context() {
        let out = render(
            "{{#each items}}{{#if active}}{{name}}{{/if}}{{/each}}",
            json!({"items": [{"name": "A", "active": true}, {"name": "B", "active": false}]}),
        );
        assert_eq!(out, "A");
    }

    #[test]
    fn else_branches_split_at_the_top_level() {
        let tpl = "{{#if sale}}SALE{{else}}full price{{/if}}";
        assert_eq!(render(tpl, json!({"sale": true})), "SALE");
        assert_eq!(render(tpl, json!({"sale": false})), "full price");
    }

    #[test]
    fn zero_is_truthy_in_conditions() {
        assert_eq!(
            render("{{#if count}}have {{count}}{{/if}}", json!({"count": 0})),
            "have 0"
        );
        assert_eq!(render("{{#if q}}x{{/if}}", json!({"q": ""})), "");
    }

    #[test]
    fn unless_inverts() {
        assert_eq!(render("{{#unless x}}no x{{/unless}}", json!({})), "no x");
        assert_eq!(render("{{#unless x}}no x{{/unless}}", json!({"x": 1})), "");
    }

    #[test]
    fn with_rebinds_and_merges() {
        let out = render(
            "{{#with product}}{{title}} at {{shop}}{{/with}}",
            json!({"shop": "acme", "product": {"title": "Shoe"}}),
        );
        assert_eq!(out, "Shoe at acme");
        assert_eq!(
            render("{{#with product}}x{{/with}}", json!({"product": "scalar"})),
            ""
        );
    }

    #[test]
    fn nested_same_type_blocks_match_their_own_close() {
        let out = render(
            "{{#each groups}}[{{#each items}}{{this}}{{/each}}]{{/each}}",
            json!({"groups": [{"items": [1, 2]}, {"items": [3]}]}),
        );
        assert_eq!(out, "[12][3]");
    }

    #[test]
    fn helper_calls_in_conditions_and_interpolation() {
        let data = json!({"price": 30, "limit": 20});
        assert_eq!(
            render("{{#if gt price limit}}expensive{{/if}}", data.clone()),
            "expensive"
        );
        assert_eq!(render("{{formatPrice price}}", data), "$30.00");
    }

    #[test]
    fn helper_args_parse_quotes_and_literals() {
        let out = render(
            r#"{{#if eq status "in stock"}}buy{{else}}wait{{/if}}"#,
            json!({"status": "in stock"}),
        );
        assert_eq!(out, "buy");
    }

    #[test]
    fn custom_helpers_override_builtins() {
        let mut engine = TemplateEngine::new("{{shout name}}");
        engine.register_helper("shout", |args| {
            Value::String(format!("{}!", stringify(args.first().unwrap_or(&Value::Null))))
        });
        assert_eq!(engine.render(&json!({"name": "hi"})).unwrap(), "hi!");
    }

    #[test]
    fn unknown_helper_renders_inert_comment_in_non_strict_mode() {
        let out = render("{{bogus a b}}", json!({}));
        assert_eq!(out, "<!-- template error: unknown helper `bogus` -->");
    }

    #[test]
    fn strict_mode_propagates_errors() {
        let engine = TemplateEngine::with_options(
            "{{bogus a b}}",
            TemplateOptions {
                escape_html: true,
                strict: true,
            },
        );
        assert_eq!(
            engine.render(&json!({})).unwrap_err(),
            TemplateError::UnknownHelper("bogus".into())
        );
    }

    #[test]
    fn unclosed_block_is_an_error() {
        let engine = TemplateEngine::with_options(
            "{{#each items}}x",
            TemplateOptions {
                escape_html: true,
                strict: true,
            },
        );
        assert_eq!(
            engine.render(&json!({"items": [1]})).unwrap_err(),
            TemplateError::UnclosedBlock("each".into())
        );
    }

    #[test]
    fn validate_reports_block_and_brace_imbalance() {
        let errors = TemplateEngine::new("{{#if a}}x {{b}").validate();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("#if"));
        assert!(errors[1].contains("braces"));
        assert!(TemplateEngine::new("{{#if a}}x{{/if}}").validate().is_empty());
    }

    #[test]
    fn bracket_paths_resolve_in_templates() {
        assert_eq!(
            render("{{items[1].name}}", json!({"items": [{"name": "a"}, {"name": "b"}]})),
            "b"
        );
    }
}
