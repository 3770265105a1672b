//! Custom widget: renders an admin-authored template through the
//! template engine, sanitizes the output, and exposes a fixed action
//! vocabulary to the markup.

use crate::core::{RenderedView, WidgetBehavior, WidgetContext};
use crate::sanitize::{sanitize_html, url_allowed};
use crate::WidgetError;
use pwx_core::types::WidgetTemplate;
use pwx_template::TemplateEngine;
use serde_json::{json, Value};
use std::collections::HashSet;

pub struct CustomBehavior {
    toggled: HashSet<String>,
}

impl CustomBehavior {
    pub fn new() -> Self {
        Self {
            toggled: HashSet::new(),
        }
    }

    /// Server template from the descriptor, else an inline `template`
    /// setting for DOM-declared widgets.
    fn template_for(ctx: &WidgetContext) -> Option<WidgetTemplate> {
        if let Some(template) = ctx.descriptor().and_then(|d| d.template) {
            return Some(template);
        }
        let inline = ctx.settings.str("template", "");
        if inline.is_empty() {
            return None;
        }
        Some(WidgetTemplate {
            html_template: inline,
            ..Default::default()
        })
    }

    /// Template default data with descriptor overrides on top.
    fn custom_data(ctx: &WidgetContext, template: &WidgetTemplate) -> Value {
        let mut custom = template.default_data.clone().unwrap_or(Value::Null);
        let overrides = ctx.descriptor().and_then(|d| d.custom_data);
        match (custom.as_object_mut(), overrides) {
            (Some(base), Some(Value::Object(over))) => {
                for (key, value) in over {
                    base.insert(key, value);
                }
            }
            (_, Some(other)) => custom = other,
            _ => {}
        }
        custom
    }

    fn toggle(&mut self, ctx: &WidgetContext, selector: &str) {
        let hidden = !self.toggled.insert(selector.to_string());
        if hidden {
            self.toggled.remove(selector);
        }
        for node in ctx.host.query(Some(ctx.container), selector) {
            if hidden {
                ctx.host.remove_class(node, "pwx-hidden");
            } else {
                ctx.host.add_class(node, "pwx-hidden");
            }
        }
    }
}

impl Default for CustomBehavior {
    fn default() -> Self {
        Self::new()
    }
}

impl WidgetBehavior for CustomBehavior {
    fn type_name(&self) -> &'static str {
        "custom"
    }

    fn render(&mut self, ctx: &WidgetContext) -> Result<RenderedView, WidgetError> {
        let Some(template) = Self::template_for(ctx) else {
            log::warn!("custom {}: no template configured", ctx.id);
            return Ok(RenderedView::light(""));
        };

        let theme = serde_json::to_value(ctx.theme()).unwrap_or(Value::Null);
        let data = json!({
            "products": ctx.products(),
            "theme": theme,
            "settings": ctx.settings.as_value(),
            "custom": Self::custom_data(ctx, &template),
        });

        let engine = TemplateEngine::new(&template.html_template);
        let rendered = engine.render(&data)?;
        // Sanitize the rendered output, then attach the template's own
        // stylesheet; the sanitizer strips any style element the markup
        // itself smuggled in.
        let body = sanitize_html(&rendered);
        let html = if template.css_styles.is_empty() {
            body
        } else {
            format!("<style>{}</style>{body}", template.css_styles)
        };
        Ok(RenderedView::shadow(html))
    }

    fn on_action(&mut self, ctx: &WidgetContext, action: &str, payload: Option<&str>) {
        let payload = payload.unwrap_or("");
        match action {
            "navigate" => {
                if payload.is_empty() || !url_allowed(payload) {
                    log::warn!("custom {}: blocked navigation to {payload:?}", ctx.id);
                    return;
                }
                ctx.host.navigate(payload);
            }
            "addToCart" => ctx.emit(
                "cart:add",
                json!({"widgetId": ctx.id, "productId": payload}),
            ),
            "trackClick" => ctx.emit(
                "analytics:click",
                json!({"widgetId": ctx.id, "label": payload}),
            ),
            "toggle" => {
                if !payload.is_empty() {
                    self.toggle(ctx, payload);
                }
            }
            "copyText" => ctx.host.copy_text(payload),
            "scrollTo" => {
                if !payload.is_empty() {
                    ctx.host.scroll_into_view(payload);
                }
            }
            "emit" => {
                if !payload.is_empty() {
                    ctx.emit(&format!("custom:{payload}"), json!({"widgetId": ctx.id}));
                }
            }
            // Anything outside the vocabulary is ignored, not executed.
            other => log::debug!("custom {}: ignoring action {other:?}", ctx.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::WidgetCore;
    use crate::settings::Settings;
    use pwx_core::events::EventEmitter;
    use pwx_core::types::{Product, WidgetData, WidgetDescriptor};
    use pwx_host::mock::{DomOp, MockHost};
    use pwx_host::{HostEvent, HostPage, NodeId};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn descriptor(html: &str, css: &str, default_data: Option<Value>) -> WidgetDescriptor {
        WidgetDescriptor {
            id: "w1".into(),
            widget_type: "custom".into(),
            name: String::new(),
            settings: Default::default(),
            placement: None,
            template_id: None,
            template: Some(WidgetTemplate {
                html_template: html.into(),
                css_styles: css.into(),
                data_schema: None,
                default_data,
            }),
            custom_data: None,
        }
    }

    fn custom(
        host: &Rc<MockHost>,
        descriptor: Option<WidgetDescriptor>,
        settings: serde_json::Value,
    ) -> (Rc<RefCell<WidgetCore>>, NodeId) {
        let container = host.add_widget_container("custom", &[]);
        let serde_json::Value::Object(map) = settings else {
            panic!("settings must be an object")
        };
        let products = vec![Product {
            id: "p1".into(),
            title: "Shoe".into(),
            price: 30.0,
            sale_price: None,
            image: "img".into(),
            url: "https://shop/p1".into(),
            brand: None,
            category: None,
            stock_status: Default::default(),
        }];
        let core = WidgetCore::build(
            "cu1",
            container,
            Rc::clone(host) as Rc<dyn HostPage>,
            EventEmitter::new(),
            Settings::new(map.into_iter().collect()),
            WidgetData {
                products,
                descriptor,
                ..Default::default()
            },
            Box::new(CustomBehavior::new()),
        );
        core.borrow_mut().init().unwrap();
        (core, container)
    }

    fn action(core: &Rc<RefCell<WidgetCore>>, container: NodeId, name: &str, payload: &str) {
        core.borrow_mut().handle_host_event(&HostEvent::Action {
            container,
            action: name.into(),
            payload: Some(payload.into()),
        });
    }

    #[test]
    fn renders_the_template_into_a_shadow_root() {
        let host = Rc::new(MockHost::new());
        let (_core, container) = custom(
            &host,
            Some(descriptor(
                "{{#each products}}<b>{{title}}: {{formatPrice price}}</b>{{/each}}",
                ".pwx-x{color:red}",
                None,
            )),
            serde_json::json!({}),
        );
        let html = host.shadow_html_of(container).unwrap();
        assert!(html.starts_with("<style>.pwx-x{color:red}</style>"));
        assert!(html.contains("<b>Shoe: $30.00</b>"));
    }

    #[test]
    fn script_and_handlers_never_reach_the_page() {
        let host = Rc::new(MockHost::new());
        let (_core, container) = custom(
            &host,
            Some(descriptor(
                "<div onclick=\"steal()\">{{{custom.payload}}}</div>",
                "",
                Some(serde_json::json!({"payload": "<script>alert(1)</script>ok"})),
            )),
            serde_json::json!({}),
        );
        // The raw triple-stache bypasses escaping; sanitization still wins.
        let html = host.shadow_html_of(container).unwrap();
        assert!(!html.contains("<script"));
        assert!(!html.contains("onclick"));
        assert!(html.contains("ok"));
    }

    #[test]
    fn custom_data_defaults_resolve_with_descriptor_overrides() {
        let mut d = descriptor(
            "{{custom.headline}} / {{custom.cta}}",
            "",
            Some(serde_json::json!({"headline": "Hi", "cta": "Buy"})),
        );
        d.custom_data = Some(serde_json::json!({"headline": "Sale"}));

        let host = Rc::new(MockHost::new());
        let (_core, container) = custom(&host, Some(d), serde_json::json!({}));
        assert_eq!(host.shadow_html_of(container).unwrap(), "Sale / Buy");
    }

    #[test]
    fn inline_setting_template_works_without_a_descriptor() {
        let host = Rc::new(MockHost::new());
        let (_core, container) = custom(
            &host,
            None,
            serde_json::json!({"template": "<i>{{settings.label}}</i>", "label": "hi"}),
        );
        assert_eq!(host.shadow_html_of(container).unwrap(), "<i>hi</i>");
    }

    #[test]
    fn navigate_blocks_script_urls() {
        let host = Rc::new(MockHost::new());
        let (core, container) = custom(
            &host,
            Some(descriptor("x", "", None)),
            serde_json::json!({}),
        );

        action(&core, container, "navigate", "javascript:alert(1)");
        assert!(host.ops_where(|op| matches!(op, DomOp::Navigate { .. })).is_empty());

        action(&core, container, "navigate", "https://shop.example/sale");
        assert!(host.has_op(&DomOp::Navigate {
            url: "https://shop.example/sale".into()
        }));
    }

    #[test]
    fn cart_and_analytics_actions_emit_on_the_bus() {
        let host = Rc::new(MockHost::new());
        let (core, container) = custom(
            &host,
            Some(descriptor("x", "", None)),
            serde_json::json!({}),
        );

        let events = Rc::new(RefCell::new(Vec::new()));
        let emitter = core.borrow().emitter();
        for name in ["cart:add", "analytics:click", "custom:newsletter"] {
            let log = Rc::clone(&events);
            emitter.on(name, move |payload| {
                log.borrow_mut().push(payload.clone());
            });
        }

        action(&core, container, "addToCart", "p1");
        action(&core, container, "trackClick", "hero-cta");
        action(&core, container, "emit", "newsletter");

        let events = events.borrow();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0]["productId"], "p1");
        assert_eq!(events[1]["label"], "hero-cta");
        assert_eq!(events[2]["widgetId"], "cu1");
    }

    #[test]
    fn toggle_flips_the_hidden_class_per_selector() {
        let host = Rc::new(MockHost::new());
        let (core, container) = custom(
            &host,
            Some(descriptor("x", "", None)),
            serde_json::json!({}),
        );
        let inner = host
            .create_container("[data-pwx-widget=\"custom\"]", Default::default())
            .unwrap();
        host.set_attr(inner, "id", "panel");

        action(&core, container, "toggle", "#panel");
        assert!(host.has_class(inner, "pwx-hidden"));
        action(&core, container, "toggle", "#panel");
        assert!(!host.has_class(inner, "pwx-hidden"));
    }

    #[test]
    fn copy_and_scroll_delegate_to_the_host() {
        let host = Rc::new(MockHost::new());
        let (core, container) = custom(
            &host,
            Some(descriptor("x", "", None)),
            serde_json::json!({}),
        );

        action(&core, container, "copyText", "SAVE20");
        action(&core, container, "scrollTo", "#reviews");
        assert!(host.has_op(&DomOp::CopyText {
            text: "SAVE20".into()
        }));
        assert!(host.has_op(&DomOp::ScrollIntoView {
            selector: "#reviews".into()
        }));
    }

    #[test]
    fn unknown_actions_are_ignored() {
        let host = Rc::new(MockHost::new());
        let (core, container) = custom(
            &host,
            Some(descriptor("x", "", None)),
            serde_json::json!({}),
        );
        let ops_before = host.ops().len();
        action(&core, container, "eval", "anything");
        assert_eq!(host.ops().len(), ops_before);
    }
}
