//! Modal popup: trigger-driven overlay with show-once suppression.

use crate::core::{RenderedView, WidgetBehavior, WidgetContext};
use crate::markup::product_card;
use crate::triggers::{Trigger, TriggerController};
use crate::WidgetError;
use pwx_storage::LocalStore;
use pwx_template::escape_html;
use std::rc::Rc;

const BASE_CSS: &str = concat!(
    ".pwx-widget-popup .pwx-popup-overlay{position:fixed;inset:0;z-index:99998;",
    "background:rgba(0,0,0,.5);display:flex;align-items:center;justify-content:center}",
    ".pwx-widget-popup .pwx-popup{background:#fff;border-radius:var(--pwx-radius);",
    "max-width:560px;width:90%;padding:24px;font-family:var(--pwx-font)}",
    ".pwx-widget-popup .pwx-popup-close{float:right;cursor:pointer;border:0;background:none}",
    ".pwx-widget-popup .pwx-hidden{display:none}",
);

pub struct PopupBehavior {
    session: Rc<LocalStore>,
    controller: Option<TriggerController>,
}

impl PopupBehavior {
    pub fn new(session: Rc<LocalStore>) -> Self {
        Self {
            session,
            controller: None,
        }
    }

    pub fn is_open(&self) -> bool {
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
        ctx.emit("popup:open", serde_json::json!({"widgetId": ctx.id}));
    }

    fn close(&mut self, ctx: &WidgetContext) {
        let Some(ctl) = self.controller.as_mut() else {
            return;
        };
        if !ctl.close() {
            return;
        }
        self.rerender(ctx);
        ctx.emit("popup:close", serde_json::json!({"widgetId": ctx.id}));
    }

    fn rerender(&mut self, ctx: &WidgetContext) {
        match self.render(ctx) {
            Ok(view) => ctx.apply(&view),
            Err(err) => log::warn!("popup {}: re-render failed: {err}", ctx.id),
        }
    }
}

impl WidgetBehavior for PopupBehavior {
    fn type_name(&self) -> &'static str {
        "popup"
    }

    fn base_css(&self) -> &'static str {
        BASE_CSS
    }

    fn before_init(&mut self, ctx: &WidgetContext) -> Result<(), WidgetError> {
        self.controller = Some(TriggerController::new(
            &ctx.settings,
            Rc::clone(&self.session),
            format!("popup-shown-{}", ctx.id),
            true,
        ));
        Ok(())
    }

    fn render(&mut self, ctx: &WidgetContext) -> Result<RenderedView, WidgetError> {
        let hidden = if self.is_open() { "" } else { " pwx-hidden" };
        let title = ctx.settings.str("title", "");
        let heading = if title.is_empty() {
            String::new()
        } else {
            format!("<div class=\"pwx-popup-title\">{}</div>", escape_html(&title))
        };
        let cap = ctx.settings.usize("maxProducts", 3).max(1);
        let cards: String = ctx.products().iter().take(cap).map(product_card).collect();
        let html = format!(
            concat!(
                "<div class=\"pwx-popup-overlay{hidden}\">",
                "<div class=\"pwx-popup\">",
                "<button class=\"pwx-popup-close\" data-pwx-action=\"close\">&times;</button>",
                "{heading}{cards}",
                "</div></div>",
            ),
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
