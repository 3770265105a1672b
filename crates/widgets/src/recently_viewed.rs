//! Recently-viewed widget: renders from the local journey tracker, not
//! from the product API.

use crate::core::{RenderedView, WidgetBehavior, WidgetContext};
use crate::markup::journey_card;
use crate::WidgetError;
use pwx_personalization::ProductTracker;
use pwx_template::escape_html;
use std::rc::Rc;

const BASE_CSS: &str = concat!(
    ".pwx-widget-recently-viewed .pwx-recent-track{display:flex;gap:12px;overflow-x:auto}",
    ".pwx-widget-recently-viewed .pwx-recent-title{font-weight:600;",
    "font-family:var(--pwx-font);margin-bottom:8px}",
);

pub struct RecentlyViewedBehavior {
    tracker: Rc<ProductTracker>,
}

impl RecentlyViewedBehavior {
    pub fn new(tracker: Rc<ProductTracker>) -> Self {
        Self { tracker }
    }
}

impl WidgetBehavior for RecentlyViewedBehavior {
    fn type_name(&self) -> &'static str {
        "recently-viewed"
    }

    fn base_css(&self) -> &'static str {
        BASE_CSS
    }

    fn render(&mut self, ctx: &WidgetContext) -> Result<RenderedView, WidgetError> {
        let min = ctx.settings.usize("minProducts", 2).max(1);
        let max = ctx.settings.usize("maxProducts", 8).max(min);

        // The product being looked at right now is not "recently viewed".
        let entries = match ctx.host.page_product_id() {
            Some(current) => self.tracker.recently_viewed_except(&current, max),
            None => self.tracker.recently_viewed(max),
        };

        // Below the floor the widget stays invisible rather than showing
        // a one-card shelf.
        if entries.len() < min {
            return Ok(RenderedView::light(""));
        }

        let title = ctx.settings.str("title", "Recently viewed");
        let cards: String = entries.iter().map(journey_card).collect();
        let html = format!(
            concat!(
                "<div class=\"pwx-recent\">",
                "<div class=\"pwx-recent-title\">{title}</div>",
                "<div class=\"pwx-recent-track\">{cards}</div>",
                "</div>",
            ),
            title = escape_html(&title),
            cards = cards,
        );
        Ok(RenderedView::light(html))
    }
}
