//! Product carousel: responsive slide window, infinite wrap or clamped
//! bounds, touch-swipe navigation, optional autoplay paused on hover
//! or during a touch.

use crate::core::{RenderedView, WidgetBehavior, WidgetContext};
use crate::markup::product_card;
use crate::WidgetError;
use pwx_host::TimerId;

const BASE_CSS: &str = concat!(
    ".pwx-widget-carousel .pwx-carousel-track{display:flex;gap:12px;overflow:hidden}",
    ".pwx-widget-carousel .pwx-product-card{flex:1 0 0;min-width:0}",
    ".pwx-widget-carousel .pwx-carousel-nav{cursor:pointer;border:0;",
    "background:var(--pwx-primary);color:#fff;border-radius:var(--pwx-radius)}",
    ".pwx-widget-carousel .pwx-carousel-nav.pwx-disabled{opacity:.4;pointer-events:none}",
    ".pwx-widget-carousel .pwx-carousel-dot.pwx-active{background:var(--pwx-primary)}",
);

/// Horizontal finger travel below this is a tap, not a swipe.
const SWIPE_THRESHOLD_PX: f32 = 50.0;

#[derive(Default)]
pub struct CarouselBehavior {
    current: usize,
    visible: usize,
    autoplay_timer: Option<TimerId>,
    hovered: bool,
    touch_origin: Option<f32>,
}

impl CarouselBehavior {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_slide(&self) -> usize {
        self.current
    }

    fn slides_to_show(ctx: &WidgetContext) -> usize {
        ctx.settings.usize("slidesToShow", 4).max(1)
    }

    /// 1 column on phones, 2 on tablets, the configured count above.
    fn visible_for(width: u32, slides_to_show: usize) -> usize {
        if width < 640 {
            1
        } else if width < 1024 {
            slides_to_show.min(2)
        } else {
            slides_to_show
        }
    }

    fn infinite(ctx: &WidgetContext) -> bool {
        ctx.settings.bool("infinite", false)
    }

    fn max_start(&self, count: usize) -> usize {
        count.saturating_sub(self.visible)
    }

    fn next(&mut self, ctx: &WidgetContext) {
        let count = ctx.products().len();
        if count == 0 {
            return;
        }
        if Self::infinite(ctx) {
            self.current = (self.current + 1) % count;
        } else {
            self.current = (self.current + 1).min(self.max_start(count));
        }
    }

    fn prev(&mut self, ctx: &WidgetContext) {
        let count = ctx.products().len();
        if count == 0 {
            return;
        }
        if Self::infinite(ctx) {
            self.current = (self.current + count - 1) % count;
        } else {
            self.current = self.current.saturating_sub(1);
        }
    }

    fn go_to(&mut self, ctx: &WidgetContext, slide: usize) {
        let count = ctx.products().len();
        if count == 0 {
            return;
        }
        self.current = if Self::infinite(ctx) {
            slide % count
        } else {
            slide.min(self.max_start(count))
        };
    }

    fn rerender(&mut self, ctx: &WidgetContext) {
        match self.render(ctx) {
            Ok(view) => ctx.apply(&view),
            Err(err) => log::warn!("carousel {}: re-render failed: {err}", ctx.id),
        }
    }
}

impl WidgetBehavior for CarouselBehavior {
    fn type_name(&self) -> &'static str {
        "carousel"
    }

    fn base_css(&self) -> &'static str {
        BASE_CSS
    }

    fn before_init(&mut self, ctx: &WidgetContext) -> Result<(), WidgetError> {
        self.visible = Self::visible_for(ctx.host.viewport_width(), Self::slides_to_show(ctx));
        Ok(())
    }

    fn render(&mut self, ctx: &WidgetContext) -> Result<RenderedView, WidgetError> {
        let products = ctx.products();
        if products.is_empty() {
            return Ok(RenderedView::light(""));
        }
        let count = products.len();
        let infinite = Self::infinite(ctx);
        let visible = self.visible.max(1).min(count);

        let mut cards = String::new();
        for offset in 0..visible {
            let index = if infinite {
                (self.current + offset) % count
            } else {
                self.current + offset
            };
            if let Some(product) = products.get(index) {
                cards.push_str(&product_card(product));
            }
        }

        let at_start = !infinite && self.current == 0;
        let at_end = !infinite && self.current >= self.max_start(count);
        let dots: String = (0..count)
            .map(|i| {
                let active = if i == self.current { " pwx-active" } else { "" };
                format!(
                    "<button class=\"pwx-carousel-dot{active}\" data-pwx-action=\"goto\" \
                     data-pwx-payload=\"{i}\"></button>"
                )
            })
            .collect();

        let html = format!(
            concat!(
                "<div class=\"pwx-carousel\" data-pwx-current=\"{current}\">",
                "<button class=\"pwx-carousel-nav pwx-carousel-prev{prev_disabled}\" ",
                "data-pwx-action=\"prev\">&#8249;</button>",
                "<div class=\"pwx-carousel-track\">{cards}</div>",
                "<button class=\"pwx-carousel-nav pwx-carousel-next{next_disabled}\" ",
                "data-pwx-action=\"next\">&#8250;</button>",
                "<div class=\"pwx-carousel-dots\">{dots}</div>",
                "</div>",
            ),
            current = self.current,
            prev_disabled = if at_start { " pwx-disabled" } else { "" },
            next_disabled = if at_end { " pwx-disabled" } else { "" },
            cards = cards,
            dots = dots,
        );
        Ok(RenderedView::light(html))
    }

    fn after_init(&mut self, ctx: &WidgetContext) -> Result<(), WidgetError> {
        let count = ctx.products().len();
        if ctx.settings.bool("autoplay", false) && count > self.visible {
            let interval = ctx.settings.u64("autoplayInterval", 5000).max(500);
            self.autoplay_timer = Some(ctx.schedule_interval(interval, "autoplay"));
        }
        Ok(())
    }

    fn on_action(&mut self, ctx: &WidgetContext, action: &str, payload: Option<&str>) {
        match action {
            "next" => self.next(ctx),
            "prev" => self.prev(ctx),
            "goto" => {
                let Some(slide) = payload.and_then(|p| p.parse::<usize>().ok()) else {
                    return;
                };
                self.go_to(ctx, slide);
            }
            "autoplay" => {
                if self.hovered || self.touch_origin.is_some() {
                    return;
                }
                self.next(ctx);
            }
            _ => return,
        }
        self.rerender(ctx);
        ctx.emit(
            "carousel:slide",
            serde_json::json!({"widgetId": ctx.id, "slide": self.current}),
        );
    }

    fn on_hover(&mut self, _ctx: &WidgetContext, entered: bool) {
        // Autoplay keeps ticking; ticks are ignored while hovered.
        self.hovered = entered;
    }

    fn on_touch_start(&mut self, _ctx: &WidgetContext, x: f32) {
        // An active touch also pauses autoplay ticks.
        self.touch_origin = Some(x);
    }

    fn on_touch_end(&mut self, ctx: &WidgetContext, x: f32) {
        let Some(origin) = self.touch_origin.take() else {
            return;
        };
        let delta = x - origin;
        if delta.abs() < SWIPE_THRESHOLD_PX {
            return;
        }
        if delta < 0.0 {
            self.next(ctx);
        } else {
            self.prev(ctx);
        }
        self.rerender(ctx);
        ctx.emit(
            "carousel:slide",
            serde_json::json!({"widgetId": ctx.id, "slide": self.current}),
        );
    }

    fn on_resize(&mut self, ctx: &WidgetContext, width: u32) {
        let visible = Self::visible_for(width, Self::slides_to_show(ctx));
        if visible == self.visible {
            return;
        }
        self.visible = visible;
        let count = ctx.products().len();
        if !Self::infinite(ctx) {
            self.current = self.current.min(self.max_start(count));
        }
        self.rerender(ctx);
    }

    fn on_destroy(&mut self, ctx: &WidgetContext) {
        if let Some(timer) = self.autoplay_timer.take() {
            ctx.clear_timer(timer);
        }
    }
}
