//! Slide-in side panel: same trigger machinery as Popup, anchored to a
//! screen edge instead of overlaying the page.

use crate::core::{RenderedView, WidgetBehavior, WidgetContext};
use crate::markup::product_card;
use crate::triggers::{Trigger, TriggerController};
use crate::WidgetError;
use pwx_storage::LocalStore;
use pwx_template::escape_html;
use std::rc::Rc;

const BASE_CSS: &str = concat!(
    ".pwx-widget-slider .pwx-slider-panel{position:fixed;top:0;bottom:0;width:320px;",
    "z-index:99997;background:#fff;box-shadow:0 0 24px rgba(0,0,0,.2);",
    "padding:20px;overflow-y:auto;font-family:var(--pwx-font)}",
    ".pwx-widget-slider .pwx-slider-right{right:0}",
    ".pwx-widget-slider .pwx-slider-left{left:0}",
    ".pwx-widget-slider .pwx-slider-close{float:right;cursor:pointer;border:0;background:none}",
    ".pwx-widget-slider .pwx-hidden{display:none}",
);

pub struct SliderBehavior {
    session: Rc<LocalStore>,
    controller: Option<TriggerController>,
}

impl SliderBehavior {
    pub fn new(session: Rc<LocalStore>) -> Self {
        Self {
            session,
            controller: None,
        }
    }

    fn position(ctx: &WidgetContext) -> &'static str {
        if ctx.settings.str("position", "right") == "left" {
            "left"
        } else {
            "right"
        }
    }

    fn is_open(&self) -> bool {
        self.controller.as_ref().is_some_and(TriggerController::is_open)
    }

    fn open(&mut self, ctx: &WidgetContext) {
        let Some(ctl) = self.controller.as_mut() else {
            return;
        };
        if !ctl.open() {
            return;
        }
        self.rerender(ctx);
        ctx.emit("slider:open", serde_json::json!({"widgetId": ctx.id}));
    }

    fn close(&mut self, ctx: &WidgetContext) {
        let Some(ctl) = self.controller.as_mut() else {
            return;
        };
        if !ctl.close() {
            return;
        }
        self.rerender(ctx);
        ctx.emit("slider:close", serde_json::json!({"widgetId": ctx.id}));
    }

    fn rerender(&mut self, ctx: &WidgetContext) {
        match self.render(ctx) {
            Ok(view) => ctx.apply(&view),
            Err(err) => log::warn!("slider {}: re-render failed: {err}", ctx.id),
        }
    }
}

impl WidgetBehavior for SliderBehavior {
    fn type_name(&self) -> &'static str {
        "slider"
    }

    fn base_css(&self) -> &'static str {
        BASE_CSS
    }

    fn before_init(&mut self, ctx: &WidgetContext) -> Result<(), WidgetError> {
        // Sliders reopen by default; only showOnce widgets persist a mark.
        self.controller = Some(TriggerController::new(
            &ctx.settings,
            Rc::clone(&self.session),
            format!("slider-shown-{}", ctx.id),
            false,
        ));
        Ok(())
    }

    fn render(&mut self, ctx: &WidgetContext) -> Result<RenderedView, WidgetError> {
        let hidden = if self.is_open() { "" } else { " pwx-hidden" };
        let position = Self::position(ctx);
        let title = ctx.settings.str("title", "");
        let heading = if title.is_empty() {
            String::new()
        } else {
            format!("<div class=\"pwx-slider-title\">{}</div>", escape_html(&title))
        };
        let cap = ctx.settings.usize("maxProducts", 4).max(1);
        let cards: String = ctx.products().iter().take(cap).map(product_card).collect();
        let html = format!(
            concat!(
                "<div class=\"pwx-slider-panel pwx-slider-{position}{hidden}\">",
                "<button class=\"pwx-slider-close\" data-pwx-action=\"close\">&times;</button>",
                "{heading}{cards}",
                "</div>",
            ),
            position = position,
            hidden = hidden,
            heading = heading,
            cards = cards,
        );
        Ok(RenderedView::light(html))
    }

    fn after_init(&mut self, ctx: &WidgetContext) -> Result<(), WidgetError> {
        let Some(ctl) = self.controller.as_ref() else {
            return Ok(());
        };
        if ctl.suppressed() {
            return Ok(());
        }
        match ctl.trigger() {
            Trigger::Immediate => self.open(ctx),
            Trigger::Delay(ms) => {
                ctx.schedule_timeout(ms, "open");
            }
            Trigger::ExitIntent | Trigger::ScrollPercent(_) | Trigger::Click => {}
        }
        Ok(())
    }

    fn on_action(&mut self, ctx: &WidgetContext, action: &str, _payload: Option<&str>) {
        match action {
            "open" => self.open(ctx),
            "close" => self.close(ctx),
            _ => {}
        }
    }

    fn on_click(&mut self, ctx: &WidgetContext) {
        if self
            .controller
            .as_ref()
            .is_some_and(TriggerController::wants_click_open)
        {
            self.open(ctx);
        }
    }

    fn on_scroll(&mut self, ctx: &WidgetContext, percent: f32) {
        if self
            .controller
            .as_ref()
            .is_some_and(|ctl| ctl.wants_scroll_open(percent))
        {
            self.open(ctx);
        }
    }

    fn on_exit_intent(&mut self, ctx: &WidgetContext) {
        if self
            .controller
            .as_ref()
            .is_some_and(TriggerController::wants_exit_open)
        {
            self.open(ctx);
        }
    }
}
