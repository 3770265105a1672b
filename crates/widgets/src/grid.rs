//! Product grid: responsive columns with pagination or load-more.

use crate::core::{RenderedView, WidgetBehavior, WidgetContext};
use crate::markup::product_card;
use crate::WidgetError;

const BASE_CSS: &str = concat!(
    ".pwx-widget-grid .pwx-grid{display:grid;gap:16px}",
    ".pwx-widget-grid .pwx-grid-pager{display:flex;gap:8px;justify-content:center}",
    ".pwx-widget-grid .pwx-grid-page.pwx-active{background:var(--pwx-primary);color:#fff}",
    ".pwx-widget-grid .pwx-grid-more{cursor:pointer;border-radius:var(--pwx-radius)}",
);

pub struct GridBehavior {
    page: usize,
    shown: usize,
}

impl GridBehavior {
    pub fn new() -> Self {
        Self { page: 0, shown: 0 }
    }

    fn page_size(ctx: &WidgetContext) -> usize {
        ctx.settings.usize("pageSize", 8).max(1)
    }

    fn load_more(ctx: &WidgetContext) -> bool {
        ctx.settings.bool("loadMore", false)
    }

    fn columns_for(ctx: &WidgetContext) -> usize {
        let configured = ctx.settings.usize("columns", 3).max(1);
        let width = ctx.host.viewport_width();
        if width < 640 {
            1
        } else if width < 1024 {
            configured.min(2)
        } else {
            configured
        }
    }

    fn rerender(&mut self, ctx: &WidgetContext) {
        match self.render(ctx) {
            Ok(view) => ctx.apply(&view),
            Err(err) => log::warn!("grid {}: re-render failed: {err}", ctx.id),
        }
    }
}

impl Default for GridBehavior {
    fn default() -> Self {
        Self::new()
    }
}

impl WidgetBehavior for GridBehavior {
    fn type_name(&self) -> &'static str {
        "grid"
    }

    fn base_css(&self) -> &'static str {
        BASE_CSS
    }

    fn before_init(&mut self, ctx: &WidgetContext) -> Result<(), WidgetError> {
        self.shown = Self::page_size(ctx);
        Ok(())
    }

    fn render(&mut self, ctx: &WidgetContext) -> Result<RenderedView, WidgetError> {
        let products = ctx.products();
        if products.is_empty() {
            return Ok(RenderedView::light(""));
        }
        let page_size = Self::page_size(ctx);
        let columns = Self::columns_for(ctx);

        let (slice, footer) = if Self::load_more(ctx) {
            let shown = self.shown.min(products.len());
            let footer = if shown < products.len() {
                "<button class=\"pwx-grid-more\" data-pwx-action=\"load-more\">Show more</button>"
                    .to_string()
            } else {
                String::new()
            };
            (&products[..shown], footer)
        } else {
            let pages = products.len().div_ceil(page_size);
            self.page = self.page.min(pages - 1);
            let start = self.page * page_size;
            let end = (start + page_size).min(products.len());
            let pager: String = (0..pages)
                .map(|p| {
                    let active = if p == self.page { " pwx-active" } else { "" };
                    format!(
                        "<button class=\"pwx-grid-page{active}\" data-pwx-action=\"page\" \
                         data-pwx-payload=\"{p}\">{}</button>",
                        p + 1
                    )
                })
                .collect();
            let footer = if pages > 1 {
                format!("<div class=\"pwx-grid-pager\">{pager}</div>")
            } else {
                String::new()
            };
            (&products[start..end], footer)
        };

        let cards: String = slice.iter().map(product_card).collect();
        let html = format!(
            concat!(
                "<div class=\"pwx-grid\" style=\"grid-template-columns:repeat({columns},1fr)\" ",
                "data-pwx-page=\"{page}\">{cards}</div>{footer}",
            ),
            columns = columns,
            page = self.page,
            cards = cards,
            footer = footer,
        );
        Ok(RenderedView::light(html))
    }

    fn on_action(&mut self, ctx: &WidgetContext, action: &str, payload: Option<&str>) {
        match action {
            "page" => {
                let Some(page) = payload.and_then(|p| p.parse::<usize>().ok()) else {
                    return;
                };
                self.page = page;
            }
            "load-more" => {
                self.shown += Self::page_size(ctx);
            }
            _ => return,
        }
        self.rerender(ctx);
    }

    fn on_resize(&mut self, ctx: &WidgetContext, _width: u32) {
        self.rerender(ctx);
    }
}
