//! Promotional banner: horizontal, vertical, or hero layout around a
//! small set of featured products.

use crate::core::{RenderedView, WidgetBehavior, WidgetContext};
use crate::markup::product_card;
use crate::WidgetError;
use pwx_template::escape_html;

const BASE_CSS: &str = concat!(
    ".pwx-widget-banner .pwx-banner{display:flex;gap:16px;align-items:center;",
    "border-radius:var(--pwx-radius);font-family:var(--pwx-font)}",
    ".pwx-widget-banner .pwx-banner-vertical{flex-direction:column}",
    ".pwx-widget-banner .pwx-banner-hero{min-height:320px;background:var(--pwx-primary);color:#fff}",
    ".pwx-widget-banner .pwx-banner-title{font-size:1.4em;font-weight:600}",
    ".pwx-widget-banner .pwx-banner-cta{display:inline-block;padding:8px 20px;",
    "background:var(--pwx-secondary);color:#fff;border-radius:var(--pwx-radius)}",
);

#[derive(Default)]
pub struct BannerBehavior;

impl BannerBehavior {
    pub fn new() -> Self {
        Self
    }

    fn layout(ctx: &WidgetContext) -> String {
        match ctx.settings.str("layout", "horizontal").as_str() {
            l @ ("vertical" | "hero") => l.to_string(),
            _ => "horizontal".to_string(),
        }
    }
}

impl WidgetBehavior for BannerBehavior {
    fn type_name(&self) -> &'static str {
        "banner"
    }

    fn base_css(&self) -> &'static str {
        BASE_CSS
    }

    fn render(&mut self, ctx: &WidgetContext) -> Result<RenderedView, WidgetError> {
        let layout = Self::layout(ctx);
        // Hero spotlights a single product.
        let cap = if layout == "hero" {
            1
        } else {
            ctx.settings.usize("maxProducts", 3).max(1)
        };
        let products = ctx.products();
        let cards: String = products.iter().take(cap).map(product_card).collect();

        let title = ctx.settings.str("title", "");
        let heading = if title.is_empty() {
            String::new()
        } else {
            format!(
                "<div class=\"pwx-banner-title\">{}</div>",
                escape_html(&title)
            )
        };
        let cta_text = ctx.settings.str("ctaText", "");
        let cta_url = ctx.settings.str("ctaUrl", "");
        let cta = if cta_text.is_empty() || cta_url.is_empty() {
            String::new()
        } else {
            format!(
                "<a class=\"pwx-banner-cta\" href=\"{}\">{}</a>",
                escape_html(&cta_url),
                escape_html(&cta_text),
            )
        };

        let html = format!(
            "<div class=\"pwx-banner pwx-banner-{layout}\">{heading}{cards}{cta}</div>"
        );
        Ok(RenderedView::light(html))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::WidgetCore;
    use crate::settings::Settings;
    use pwx_core::events::EventEmitter;
    use pwx_core::types::{Product, WidgetData};
    use pwx_host::mock::MockHost;
    use pwx_host::{HostPage, NodeId};
    use std::rc::Rc;

    fn products(n: usize) -> Vec<Product> {
        (0..n)
            .map(|i| Product {
                id: format!("p{i}"),
                title: format!("Product {i}"),
                price: 12.0,
                sale_price: None,
                image: "img".into(),
                url: "url".into(),
                brand: None,
                category: None,
                stock_status: Default::default(),
            })
            .collect()
    }

    fn banner(host: &Rc<MockHost>, n: usize, settings: serde_json::Value) -> NodeId {
        let container = host.add_widget_container("banner", &[]);
        let serde_json::Value::Object(map) = settings else {
            panic!("settings must be an object")
        };
        let core = WidgetCore::build(
            "b1",
            container,
            Rc::clone(host) as Rc<dyn HostPage>,
            EventEmitter::new(),
            Settings::new(map.into_iter().collect()),
            WidgetData {
                products: products(n),
                ..Default::default()
            },
            Box::new(BannerBehavior::new()),
        );
        core.borrow_mut().init().unwrap();
        container
    }

    #[test]
    fn hero_layout_shows_a_single_product() {
        let host = Rc::new(MockHost::new());
        let container = banner(&host, 5, serde_json::json!({"layout": "hero"}));
        let html = host.html_of(container);
        assert!(html.contains("pwx-banner-hero"));
        assert_eq!(html.matches("pwx-product-card").count(), 1);
    }

    #[test]
    fn horizontal_layout_caps_at_max_products() {
        let host = Rc::new(MockHost::new());
        let container = banner(&host, 5, serde_json::json!({"maxProducts": 2}));
        let html = host.html_of(container);
        assert!(html.contains("pwx-banner-horizontal"));
        assert_eq!(html.matches("pwx-product-card").count(), 2);
    }

    #[test]
    fn unknown_layout_falls_back_to_horizontal() {
        let host = Rc::new(MockHost::new());
        let container = banner(&host, 1, serde_json::json!({"layout": "diagonal"}));
        assert!(host.html_of(container).contains("pwx-banner-horizontal"));
    }

    #[test]
    fn title_and_cta_are_escaped() {
        let host = Rc::new(MockHost::new());
        let container = banner(
            &host,
            1,
            serde_json::json!({
                "title": "Sale <now>",
                "ctaText": "Shop",
                "ctaUrl": "https://shop.example/sale",
            }),
        );
        let html = host.html_of(container);
        assert!(html.contains("Sale &lt;now&gt;"));
        assert!(html.contains("href=\"https://shop.example/sale\""));
        assert!(!html.contains("<now>"));
    }
}
