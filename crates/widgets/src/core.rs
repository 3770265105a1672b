//! The fixed widget lifecycle: init sequence, shared event wiring,
//! update and idempotent destroy.

use crate::settings::Settings;
use crate::WidgetError;
use pwx_core::events::EventEmitter;
use pwx_core::types::{Product, Theme, WidgetData, WidgetDescriptor};
use pwx_host::{Debounced, HostEvent, HostPage, NodeId, TimerId};
use serde_json::{json, Value};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

const RESIZE_QUIET_MS: u64 = 150;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Straight into the container.
    Light,
    /// Into an open shadow root when the host supports one.
    Shadow,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedView {
    pub html: String,
    pub mode: RenderMode,
}

impl RenderedView {
    pub fn light(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            mode: RenderMode::Light,
        }
    }

    pub fn shadow(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            mode: RenderMode::Shadow,
        }
    }
}

/// Everything a behavior sees: its container, the host page, the shared
/// event bus, merged settings and the current widget data.
pub struct WidgetContext {
    pub id: String,
    pub container: NodeId,
    pub host: Rc<dyn HostPage>,
    pub emitter: EventEmitter,
    pub settings: Settings,
    data: RefCell<WidgetData>,
    core: RefCell<Weak<RefCell<WidgetCore>>>,
    timers: RefCell<Vec<TimerId>>,
}

impl WidgetContext {
    pub fn products(&self) -> Vec<Product> {
        self.data.borrow().products.clone()
    }

    pub fn theme(&self) -> Theme {
        self.data.borrow().theme.clone()
    }

    pub fn descriptor(&self) -> Option<WidgetDescriptor> {
        self.data.borrow().descriptor.clone()
    }

    pub(crate) fn set_data(&self, data: WidgetData) {
        *self.data.borrow_mut() = data;
    }

    /// Write a rendered view into the container, honoring the shadow
    /// request only when the host can isolate.
    pub fn apply(&self, view: &RenderedView) {
        match view.mode {
            RenderMode::Shadow if self.host.supports_shadow_dom() => {
                self.host.set_shadow_html(self.container, &view.html);
            }
            _ => self.host.set_html(self.container, &view.html),
        }
    }

    pub fn emit(&self, event: &str, payload: Value) {
        self.emitter.emit(event, &payload);
    }

    /// Schedule a one-shot host timer that re-enters this widget as a
    /// synthetic `Action` event. Cleared automatically on destroy.
    pub fn schedule_timeout(&self, ms: u64, action: &str) -> TimerId {
        let dispatch = self.action_dispatcher(action);
        let timer = self.host.set_timeout(ms, Box::new(dispatch));
        self.timers.borrow_mut().push(timer);
        timer
    }

    /// Repeating variant of [`Self::schedule_timeout`].
    pub fn schedule_interval(&self, ms: u64, action: &str) -> TimerId {
        let dispatch = self.action_dispatcher(action);
        let timer = self.host.set_interval(ms, Rc::new(dispatch));
        self.timers.borrow_mut().push(timer);
        timer
    }

    pub fn clear_timer(&self, timer: TimerId) {
        self.host.clear_timer(timer);
        self.timers.borrow_mut().retain(|t| *t != timer);
    }

    fn clear_all_timers(&self) {
        for timer in self.timers.borrow_mut().drain(..) {
            self.host.clear_timer(timer);
        }
    }

    fn action_dispatcher(&self, action: &str) -> impl Fn() + 'static {
        let weak = self.core.borrow().clone();
        let container = self.container;
        let action = action.to_string();
        move || {
            if let Some(core) = weak.upgrade() {
                core.borrow_mut().handle_host_event(&HostEvent::Action {
                    container,
                    action: action.clone(),
                    payload: None,
                });
            }
        }
    }
}

/// Per-type widget behavior, driven by [`WidgetCore`].
pub trait WidgetBehavior {
    fn type_name(&self) -> &'static str;

    /// Type-scoped CSS, injected once per page per type.
    fn base_css(&self) -> &'static str {
        ""
    }

    fn before_init(&mut self, _ctx: &WidgetContext) -> Result<(), WidgetError> {
        Ok(())
    }

    fn render(&mut self, ctx: &WidgetContext) -> Result<RenderedView, WidgetError>;

    fn after_init(&mut self, _ctx: &WidgetContext) -> Result<(), WidgetError> {
        Ok(())
    }

    fn on_resize(&mut self, _ctx: &WidgetContext, _width: u32) {}
    fn on_update(&mut self, _ctx: &WidgetContext) {}
    fn on_action(&mut self, _ctx: &WidgetContext, _action: &str, _payload: Option<&str>) {}
    fn on_click(&mut self, _ctx: &WidgetContext) {}
    fn on_hover(&mut self, _ctx: &WidgetContext, _entered: bool) {}
    fn on_touch_start(&mut self, _ctx: &WidgetContext, _x: f32) {}
    fn on_touch_end(&mut self, _ctx: &WidgetContext, _x: f32) {}
    fn on_scroll(&mut self, _ctx: &WidgetContext, _percent: f32) {}
    fn on_exit_intent(&mut self, _ctx: &WidgetContext) {}
    fn on_destroy(&mut self, _ctx: &WidgetContext) {}
}

pub struct WidgetCore {
    ctx: Rc<WidgetContext>,
    behavior: Box<dyn WidgetBehavior>,
    resize: Option<Debounced>,
    initialized: bool,
    destroyed: bool,
}

impl WidgetCore {
    pub fn build(
        id: impl Into<String>,
        container: NodeId,
        host: Rc<dyn HostPage>,
        emitter: EventEmitter,
        settings: Settings,
        data: WidgetData,
        behavior: Box<dyn WidgetBehavior>,
    ) -> Rc<RefCell<WidgetCore>> {
        let ctx = Rc::new(WidgetContext {
            id: id.into(),
            container,
            host: Rc::clone(&host),
            emitter,
            settings,
            data: RefCell::new(data),
            core: RefCell::new(Weak::new()),
            timers: RefCell::new(Vec::new()),
        });
        let core = Rc::new(RefCell::new(WidgetCore {
            ctx: Rc::clone(&ctx),
            behavior,
            resize: None,
            initialized: false,
            destroyed: false,
        }));
        *ctx.core.borrow_mut() = Rc::downgrade(&core);

        let weak = Rc::downgrade(&core);
        let debounced = Debounced::new(
            host,
            RESIZE_QUIET_MS,
            Rc::new(move || {
                if let Some(core) = weak.upgrade() {
                    core.borrow_mut().dispatch_resize();
                }
            }),
        );
        core.borrow_mut().resize = Some(debounced);
        core
    }

    pub fn id(&self) -> &str {
        &self.ctx.id
    }

    pub fn type_name(&self) -> &'static str {
        self.behavior.type_name()
    }

    pub fn container(&self) -> NodeId {
        self.ctx.container
    }

    pub fn emitter(&self) -> EventEmitter {
        self.ctx.emitter.clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized && !self.destroyed
    }

    /// Fixed init sequence: before_init, CSS injection, container
    /// markup + theme vars, render, event binding, after_init.
    pub fn init(&mut self) -> Result<(), WidgetError> {
        if self.initialized || self.destroyed {
            return Ok(());
        }
        let ctx = Rc::clone(&self.ctx);
        self.behavior.before_init(&ctx)?;

        let type_name = self.behavior.type_name();
        let css = self.behavior.base_css();
        if !css.is_empty() {
            ctx.host.inject_style_once(&format!("pwx-style-{type_name}"), css);
        }

        ctx.host.set_attr(ctx.container, "data-pwx-type", type_name);
        ctx.host.set_attr(ctx.container, "data-pwx-id", &ctx.id);
        ctx.host.add_class(ctx.container, "pwx-widget");
        ctx.host
            .add_class(ctx.container, &format!("pwx-widget-{type_name}"));
        for (name, value) in ctx.theme().css_vars() {
            ctx.host.set_css_var(ctx.container, &name, &value);
        }

        let view = self.behavior.render(&ctx)?;
        ctx.apply(&view);
        ctx.host.bind_container_events(ctx.container);
        self.behavior.after_init(&ctx)?;
        self.initialized = true;
        Ok(())
    }

    /// Replace the widget data and re-render.
    pub fn update(&mut self, data: WidgetData) -> Result<(), WidgetError> {
        if self.destroyed {
            return Ok(());
        }
        self.ctx.set_data(data);
        let ctx = Rc::clone(&self.ctx);
        self.behavior.on_update(&ctx);
        let view = self.behavior.render(&ctx)?;
        ctx.apply(&view);
        Ok(())
    }

    /// Route a host event into the behavior. Page-level events reach
    /// every widget; container events only their own.
    pub fn handle_host_event(&mut self, event: &HostEvent) {
        if self.destroyed || !self.initialized {
            return;
        }
        let ctx = Rc::clone(&self.ctx);
        match event {
            HostEvent::Resize { .. } => {
                if let Some(resize) = &self.resize {
                    resize.call();
                }
            }
            HostEvent::Scroll { percent } => self.behavior.on_scroll(&ctx, *percent),
            HostEvent::ExitIntent => self.behavior.on_exit_intent(&ctx),
            HostEvent::ContainerClick { container } if *container == ctx.container => {
                self.behavior.on_click(&ctx);
            }
            HostEvent::ContainerHover { container, entered } if *container == ctx.container => {
                self.behavior.on_hover(&ctx, *entered);
            }
            HostEvent::TouchStart { container, x } if *container == ctx.container => {
                self.behavior.on_touch_start(&ctx, *x);
            }
            HostEvent::TouchEnd { container, x } if *container == ctx.container => {
                self.behavior.on_touch_end(&ctx, *x);
            }
            HostEvent::ProductClick {
                container,
                product_id,
            } if *container == ctx.container => {
                ctx.emit(
                    "product:click",
                    json!({"widgetId": ctx.id, "productId": product_id}),
                );
            }
            HostEvent::Action {
                container,
                action,
                payload,
            } if *container == ctx.container => {
                self.behavior.on_action(&ctx, action, payload.as_deref());
            }
            _ => {}
        }
    }

    /// Safe to call any number of times.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        let ctx = Rc::clone(&self.ctx);
        self.behavior.on_destroy(&ctx);
        if let Some(resize) = self.resize.take() {
            resize.cancel();
        }
        ctx.clear_all_timers();
        ctx.host.unbind_container_events(ctx.container);
        ctx.host.clear_children(ctx.container);
        ctx.host.remove_class(ctx.container, "pwx-widget");
        ctx.host.remove_class(
            ctx.container,
            &format!("pwx-widget-{}", self.behavior.type_name()),
        );
    }

    fn dispatch_resize(&mut self) {
        if self.destroyed || !self.initialized {
            return;
        }
        let ctx = Rc::clone(&self.ctx);
        let width = ctx.host.viewport_width();
        self.behavior.on_resize(&ctx, width);
    }
}
