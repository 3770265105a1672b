//! Property tests for the template interpreter.

use proptest::prelude::*;
use pwx_template::{TemplateEngine, TemplateOptions};
use serde_json::{json, Value};

fn plain_text() -> impl Strategy<Value = String> {
    // Text with no template syntax in it.
    "[a-zA-Z0-9 .,;:!?<>&'\"-]{0,64}"
}

proptest! {
    #[test]
    fn text_without_tags_renders_unchanged(text in plain_text()) {
        let engine = TemplateEngine::new(text.clone());
        prop_assert_eq!(engine.render(&json!({})).unwrap(), text);
    }

    #[test]
    fn escaped_interpolation_never_emits_markup(value in ".{0,64}") {
        let engine = TemplateEngine::new("{{x}}");
        let out = engine.render(&json!({"x": value})).unwrap();
        prop_assert!(!out.contains('<'));
        prop_assert!(!out.contains('>'));
    }

    #[test]
    fn raw_interpolation_round_trips(value in "[^{}]{0,64}") {
        let engine = TemplateEngine::new("{{{x}}}");
        let out = engine.render(&json!({"x": value.clone()})).unwrap();
        prop_assert_eq!(out, value);
    }

    #[test]
    fn each_concatenates_in_order(items in proptest::collection::vec("[a-z]{1,8}", 0..12)) {
        let engine = TemplateEngine::new("{{#each items}}{{this}};{{/each}}");
        let data = json!({"items": items.clone()});
        let expected: String = items.iter().map(|s| format!("{s};")).collect();
        prop_assert_eq!(engine.render(&data).unwrap(), expected);
    }

    #[test]
    fn each_length_metadata_matches(len in 0usize..10) {
        let items: Vec<Value> = (0..len).map(|i| json!(i)).collect();
        let engine = TemplateEngine::new("{{#each items}}{{@length}},{{/each}}");
        let out = engine.render(&json!({"items": items})).unwrap();
        let expected: String = (0..len).map(|_| format!("{len},")).collect();
        prop_assert_eq!(out, expected);
    }

    #[test]
    fn balanced_nested_blocks_validate_clean(depth in 1usize..6) {
        let mut template = String::from("{{x}}");
        for _ in 0..depth {
            template = format!("{{{{#if a}}}}{template}{{{{/if}}}}");
        }
        let engine = TemplateEngine::new(template);
        prop_assert!(engine.validate().is_empty());
    }

    #[test]
    fn numbers_are_truthy_in_conditions(n in any::<i32>()) {
        let engine = TemplateEngine::new("{{#if n}}yes{{/if}}");
        prop_assert_eq!(engine.render(&json!({"n": n})).unwrap(), "yes");
    }

    #[test]
    fn strict_and_lenient_agree_on_well_formed_templates(
        items in proptest::collection::vec("[a-z]{1,6}", 0..6),
    ) {
        let template = "{{#each items}}{{#if this}}{{this}}{{/if}}{{/each}}";
        let data = json!({"items": items});
        let lenient = TemplateEngine::new(template).render(&data).unwrap();
        let strict = TemplateEngine::with_options(
            template,
            TemplateOptions { escape_html: true, strict: true },
        )
        .render(&data)
        .unwrap();
        prop_assert_eq!(lenient, strict);
    }
}
