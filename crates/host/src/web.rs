//! `web-sys` implementation of [`HostPage`] and [`VisibilitySource`].
//!
//! Node handles index a registry of `web_sys::Element`s; every listener
//! and timer closure is retained here and released on unbind/clear, so the
//! runtime's destroy path is what keeps the host page leak-free.

use crate::visibility::{VisibilityHandler, VisibilitySource};
use crate::{EventSink, HostEvent, HostPage, NodeId, TimerId};
use pwx_core::types::InsertPosition;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Document, Element, Event, HtmlElement, Window};

const NODE_ID_ATTR: &str = "data-pwx-nid";

enum WebTimer {
    Timeout(i32, Closure<dyn FnMut()>),
    Interval(i32, Closure<dyn FnMut()>),
}

struct ContainerListeners {
    click: Closure<dyn FnMut(Event)>,
    enter: Closure<dyn FnMut(Event)>,
    leave: Closure<dyn FnMut(Event)>,
    touch_start: Closure<dyn FnMut(Event)>,
    touch_end: Closure<dyn FnMut(Event)>,
}

/// Horizontal position of the relevant finger. `touchend` carries it in
/// `changedTouches`; the live list is empty by then.
fn touch_x(event: &Event, ended: bool) -> Option<f32> {
    let touch_event = event.dyn_ref::<web_sys::TouchEvent>()?;
    let list = if ended {
        touch_event.changed_touches()
    } else {
        touch_event.touches()
    };
    list.item(0).map(|touch| touch.client_x() as f32)
}

#[derive(Default)]
struct Registry {
    nodes: HashMap<NodeId, Element>,
    next_node: u32,
    next_timer: u32,
    timers: HashMap<TimerId, WebTimer>,
    container_listeners: HashMap<NodeId, ContainerListeners>,
    page_listeners: Vec<Closure<dyn FnMut(Event)>>,
}

pub struct WebHost {
    window: Window,
    document: Document,
    registry: RefCell<Registry>,
    sink: RefCell<Option<EventSink>>,
    // Self-handle so listener closures can call back into the host.
    me: RefCell<std::rc::Weak<WebHost>>,
}

impl WebHost {
    /// Fails only when run outside a browsing context.
    pub fn new() -> Option<Rc<Self>> {
        let window = web_sys::window()?;
        let document = window.document()?;
        let host = Rc::new(Self {
            window,
            document,
            registry: RefCell::new(Registry::default()),
            sink: RefCell::new(None),
            me: RefCell::new(std::rc::Weak::new()),
        });
        *host.me.borrow_mut() = Rc::downgrade(&host);
        Some(host)
    }

    fn me(&self) -> Option<Rc<WebHost>> {
        self.me.borrow().upgrade()
    }

    fn register(&self, element: Element) -> NodeId {
        let mut registry = self.registry.borrow_mut();
        // Reuse the id of an element we have seen before.
        if let Some(existing) = element
            .get_attribute(NODE_ID_ATTR)
            .and_then(|v| v.parse::<u32>().ok())
        {
            let id = NodeId(existing);
            registry.nodes.entry(id).or_insert_with(|| element.clone());
            return id;
        }
        registry.next_node += 1;
        let id = NodeId(registry.next_node);
        let _ = element.set_attribute(NODE_ID_ATTR, &id.0.to_string());
        registry.nodes.insert(id, element);
        id
    }

    fn element(&self, node: NodeId) -> Option<Element> {
        self.registry.borrow().nodes.get(&node).cloned()
    }

    fn emit(&self, event: HostEvent) {
        let sink = self.sink.borrow().clone();
        if let Some(sink) = sink {
            sink(&event);
        }
    }

    fn install_page_listeners(&self) {
        let Some(me) = self.me() else { return };
        let mut registry = self.registry.borrow_mut();
        if !registry.page_listeners.is_empty() {
            return;
        }

        let host = Rc::clone(&me);
        let resize = Closure::<dyn FnMut(Event)>::new(move |_| {
            let width = host
                .window
                .inner_width()
                .ok()
                .and_then(|w| w.as_f64())
                .unwrap_or(0.0) as u32;
            host.emit(HostEvent::Resize { width });
        });
        let _ = self
            .window
            .add_event_listener_with_callback("resize", resize.as_ref().unchecked_ref());
        registry.page_listeners.push(resize);

        let host = Rc::clone(&me);
        let throttled = crate::Throttled::new(
            100,
            Rc::new(move || {
                host.emit(HostEvent::Scroll {
                    percent: host.scroll_percent(),
                });
            }),
        );
        let scroll = Closure::<dyn FnMut(Event)>::new(move |_| throttled.call());
        let _ = self
            .window
            .add_event_listener_with_callback("scroll", scroll.as_ref().unchecked_ref());
        registry.page_listeners.push(scroll);

        let host = Rc::clone(&me);
        let leave = Closure::<dyn FnMut(Event)>::new(move |event: Event| {
            let through_top = event
                .dyn_ref::<web_sys::MouseEvent>()
                .is_some_and(|m| m.client_y() <= 0);
            if through_top {
                host.emit(HostEvent::ExitIntent);
            }
        });
        let _ = self
            .document
            .add_event_listener_with_callback("mouseleave", leave.as_ref().unchecked_ref());
        registry.page_listeners.push(leave);
    }

    fn scroll_percent(&self) -> f32 {
        let scrolled = self.window.scroll_y().unwrap_or(0.0);
        let inner = self
            .window
            .inner_height()
            .ok()
            .and_then(|h| h.as_f64())
            .unwrap_or(0.0);
        let total = self
            .document
            .document_element()
            .map(|el| el.scroll_height() as f64)
            .unwrap_or(0.0);
        let scrollable = (total - inner).max(1.0);
        ((scrolled / scrollable) * 100.0).clamp(0.0, 100.0) as f32
    }

    fn page_product_from_json_ld(&self) -> Option<String> {
        let scripts = self
            .document
            .query_selector_all(r#"script[type="application/ld+json"]"#)
            .ok()?;
        for i in 0..scripts.length() {
            let Some(node) = scripts.item(i) else { continue };
            let Some(text) = node.text_content() else { continue };
            let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) else {
                continue;
            };
            if value.get("@type").and_then(|t| t.as_str()) == Some("Product") {
                for key in ["productID", "sku"] {
                    if let Some(id) = value.get(key).and_then(|v| v.as_str()) {
                        return Some(id.to_string());
                    }
                }
            }
        }
        None
    }
}

impl HostPage for WebHost {
    fn query(&self, root: Option<NodeId>, selector: &str) -> Vec<NodeId> {
        let list = match root.and_then(|r| self.element(r)) {
            Some(el) => el.query_selector_all(selector),
            None => self.document.query_selector_all(selector),
        };
        let Ok(list) = list else { return Vec::new() };
        (0..list.length())
            .filter_map(|i| list.item(i))
            .filter_map(|node| node.dyn_into::<Element>().ok())
            .map(|el| self.register(el))
            .collect()
    }

    fn create_container(&self, selector: &str, position: InsertPosition) -> Option<NodeId> {
        let parent = self.document.query_selector(selector).ok()??;
        let div = self.document.create_element("div").ok()?;
        let ok = match position {
            InsertPosition::Append => parent.append_child(&div).is_ok(),
            InsertPosition::Prepend => parent.prepend_with_node_1(&div).is_ok(),
        };
        ok.then(|| self.register(div))
    }

    fn attr(&self, node: NodeId, name: &str) -> Option<String> {
        self.element(node)?.get_attribute(name)
    }

    fn attrs(&self, node: NodeId) -> Vec<(String, String)> {
        let Some(el) = self.element(node) else {
            return Vec::new();
        };
        let names = el.get_attribute_names();
        (0..names.length())
            .filter_map(|i| names.get(i).as_string())
            .filter_map(|name| el.get_attribute(&name).map(|value| (name, value)))
            .collect()
    }

    fn set_attr(&self, node: NodeId, name: &str, value: &str) {
        if let Some(el) = self.element(node) {
            let _ = el.set_attribute(name, value);
        }
    }

    fn remove_attr(&self, node: NodeId, name: &str) {
        if let Some(el) = self.element(node) {
            let _ = el.remove_attribute(name);
        }
    }

    fn add_class(&self, node: NodeId, class: &str) {
        if let Some(el) = self.element(node) {
            let _ = el.class_list().add_1(class);
        }
    }

    fn remove_class(&self, node: NodeId, class: &str) {
        if let Some(el) = self.element(node) {
            let _ = el.class_list().remove_1(class);
        }
    }

    fn set_html(&self, node: NodeId, html: &str) {
        if let Some(el) = self.element(node) {
            el.set_inner_html(html);
        }
    }

    fn clear_children(&self, node: NodeId) {
        if let Some(el) = self.element(node) {
            el.set_inner_html("");
        }
    }

    fn set_css_var(&self, node: NodeId, name: &str, value: &str) {
        if let Some(el) = self.element(node).and_then(|el| el.dyn_into::<HtmlElement>().ok()) {
            let _ = el.style().set_property(name, value);
        }
    }

    fn inject_style_once(&self, style_id: &str, css: &str) -> bool {
        if self.document.get_element_by_id(style_id).is_some() {
            return false;
        }
        let Ok(style) = self.document.create_element("style") else {
            return false;
        };
        style.set_id(style_id);
        style.set_text_content(Some(css));
        match self.document.head() {
            Some(head) => head.append_child(&style).is_ok(),
            None => false,
        }
    }

    fn supports_shadow_dom(&self) -> bool {
        true
    }

    fn set_shadow_html(&self, node: NodeId, html: &str) {
        let Some(el) = self.element(node) else { return };
        let root = match el.shadow_root() {
            Some(root) => root,
            None => {
                let init = web_sys::ShadowRootInit::new(web_sys::ShadowRootMode::Open);
                match el.attach_shadow(&init) {
                    Ok(root) => root,
                    Err(_) => {
                        // Closed or unsupported element; fall back to light DOM.
                        el.set_inner_html(html);
                        return;
                    }
                }
            }
        };
        root.set_inner_html(html);
    }

    fn viewport_width(&self) -> u32 {
        self.window
            .inner_width()
            .ok()
            .and_then(|w| w.as_f64())
            .unwrap_or(0.0) as u32
    }

    fn is_in_viewport(&self, node: NodeId) -> bool {
        let Some(el) = self.element(node) else {
            return false;
        };
        let rect = el.get_bounding_client_rect();
        let height = self
            .window
            .inner_height()
            .ok()
            .and_then(|h| h.as_f64())
            .unwrap_or(0.0);
        let width = self
            .window
            .inner_width()
            .ok()
            .and_then(|w| w.as_f64())
            .unwrap_or(0.0);
        rect.bottom() > 0.0 && rect.top() < height && rect.right() > 0.0 && rect.left() < width
    }

    fn set_event_sink(&self, sink: EventSink) {
        *self.sink.borrow_mut() = Some(sink);
        self.install_page_listeners();
    }

    fn bind_container_events(&self, node: NodeId) {
        let Some(container) = self.element(node) else {
            return;
        };
        if self.registry.borrow().container_listeners.contains_key(&node) {
            return;
        }
        let Some(host) = self.me() else { return };
        let scope = container.clone();
        let click_host = host.clone();
        let click = Closure::<dyn FnMut(Event)>::new(move |event: Event| {
            let Some(target) = event
                .target()
                .and_then(|t| t.dyn_into::<Element>().ok())
            else {
                return;
            };

            if let Ok(Some(el)) = target.closest("[data-pwx-action]") {
                if scope.contains(Some(&el)) {
                    if let Some(action) = el.get_attribute("data-pwx-action") {
                        click_host.emit(HostEvent::Action {
                            container: node,
                            action,
                            payload: el.get_attribute("data-pwx-payload"),
                        });
                        return;
                    }
                }
            }
            if let Ok(Some(el)) = target.closest("[data-pwx-product-id]") {
                if scope.contains(Some(&el)) {
                    if let Some(product_id) = el.get_attribute("data-pwx-product-id") {
                        click_host.emit(HostEvent::ProductClick {
                            container: node,
                            product_id,
                        });
                        return;
                    }
                }
            }
            click_host.emit(HostEvent::ContainerClick { container: node });
        });
        let _ = container.add_event_listener_with_callback("click", click.as_ref().unchecked_ref());

        let enter_host = host.clone();
        let enter = Closure::<dyn FnMut(Event)>::new(move |_: Event| {
            enter_host.emit(HostEvent::ContainerHover {
                container: node,
                entered: true,
            });
        });
        let leave_host = host.clone();
        let leave = Closure::<dyn FnMut(Event)>::new(move |_: Event| {
            leave_host.emit(HostEvent::ContainerHover {
                container: node,
                entered: false,
            });
        });
        let _ = container
            .add_event_listener_with_callback("mouseenter", enter.as_ref().unchecked_ref());
        let _ = container
            .add_event_listener_with_callback("mouseleave", leave.as_ref().unchecked_ref());

        let start_host = host.clone();
        let touch_start = Closure::<dyn FnMut(Event)>::new(move |event: Event| {
            if let Some(x) = touch_x(&event, false) {
                start_host.emit(HostEvent::TouchStart { container: node, x });
            }
        });
        let end_host = host.clone();
        let touch_end = Closure::<dyn FnMut(Event)>::new(move |event: Event| {
            if let Some(x) = touch_x(&event, true) {
                end_host.emit(HostEvent::TouchEnd { container: node, x });
            }
        });
        let _ = container
            .add_event_listener_with_callback("touchstart", touch_start.as_ref().unchecked_ref());
        let _ = container
            .add_event_listener_with_callback("touchend", touch_end.as_ref().unchecked_ref());

        self.registry.borrow_mut().container_listeners.insert(
            node,
            ContainerListeners {
                click,
                enter,
                leave,
                touch_start,
                touch_end,
            },
        );
    }

    fn unbind_container_events(&self, node: NodeId) {
        let listeners = self.registry.borrow_mut().container_listeners.remove(&node);
        if let (Some(el), Some(listeners)) = (self.element(node), listeners) {
            let _ = el.remove_event_listener_with_callback(
                "click",
                listeners.click.as_ref().unchecked_ref(),
            );
            let _ = el.remove_event_listener_with_callback(
                "mouseenter",
                listeners.enter.as_ref().unchecked_ref(),
            );
            let _ = el.remove_event_listener_with_callback(
                "mouseleave",
                listeners.leave.as_ref().unchecked_ref(),
            );
            let _ = el.remove_event_listener_with_callback(
                "touchstart",
                listeners.touch_start.as_ref().unchecked_ref(),
            );
            let _ = el.remove_event_listener_with_callback(
                "touchend",
                listeners.touch_end.as_ref().unchecked_ref(),
            );
        }
    }

    fn set_timeout(&self, ms: u64, callback: Box<dyn FnOnce()>) -> TimerId {
        let slot = RefCell::new(Some(callback));
        let closure = Closure::<dyn FnMut()>::new(move || {
            if let Some(cb) = slot.borrow_mut().take() {
                cb();
            }
        });
        let handle = self
            .window
            .set_timeout_with_callback_and_timeout_and_arguments_0(
                closure.as_ref().unchecked_ref(),
                ms as i32,
            )
            .unwrap_or(-1);
        let mut registry = self.registry.borrow_mut();
        registry.next_timer += 1;
        let id = TimerId(registry.next_timer);
        registry.timers.insert(id, WebTimer::Timeout(handle, closure));
        id
    }

    fn set_interval(&self, ms: u64, callback: Rc<dyn Fn()>) -> TimerId {
        let closure = Closure::<dyn FnMut()>::new(move || callback());
        let handle = self
            .window
            .set_interval_with_callback_and_timeout_and_arguments_0(
                closure.as_ref().unchecked_ref(),
                ms as i32,
            )
            .unwrap_or(-1);
        let mut registry = self.registry.borrow_mut();
        registry.next_timer += 1;
        let id = TimerId(registry.next_timer);
        registry.timers.insert(id, WebTimer::Interval(handle, closure));
        id
    }

    fn clear_timer(&self, timer: TimerId) {
        if let Some(entry) = self.registry.borrow_mut().timers.remove(&timer) {
            match entry {
                WebTimer::Timeout(handle, _) => self.window.clear_timeout_with_handle(handle),
                WebTimer::Interval(handle, _) => self.window.clear_interval_with_handle(handle),
            }
        }
    }

    fn navigate(&self, url: &str) {
        let _ = self.window.location().set_href(url);
    }

    fn copy_text(&self, text: &str) {
        // Fire-and-forget; clipboard denial is not an error we surface.
        let _ = self.window.navigator().clipboard().write_text(text);
    }

    fn scroll_into_view(&self, selector: &str) {
        if let Ok(Some(el)) = self.document.query_selector(selector) {
            el.scroll_into_view();
        }
    }

    fn page_product_id(&self) -> Option<String> {
        // 1. Explicit global set by the shop's own integration.
        if let Ok(value) =
            js_sys::Reflect::get(self.window.as_ref(), &JsValue::from_str("__PWX_PRODUCT_ID__"))
        {
            if let Some(id) = value.as_string() {
                if !id.is_empty() {
                    return Some(id);
                }
            }
        }
        // 2. JSON-LD product metadata.
        if let Some(id) = self.page_product_from_json_ld() {
            return Some(id);
        }
        // 3. Data attribute on any element.
        if let Ok(Some(el)) = self.document.query_selector("[data-product-id]") {
            if let Some(id) = el.get_attribute("data-product-id") {
                return Some(id);
            }
        }
        // 4. Meta tag.
        if let Ok(Some(el)) = self
            .document
            .query_selector(r#"meta[property="product:id"], meta[name="product-id"]"#)
        {
            return el.get_attribute("content");
        }
        None
    }
}

/// `IntersectionObserver`-backed visibility source.
pub struct WebVisibility {
    host: Rc<WebHost>,
    observer: web_sys::IntersectionObserver,
    // Keeps the callback closure alive for the observer's lifetime.
    _callback: Closure<dyn FnMut(js_sys::Array)>,
    handler: Rc<RefCell<Option<VisibilityHandler>>>,
}

impl WebVisibility {
    pub fn new(host: Rc<WebHost>) -> Option<Self> {
        let handler: Rc<RefCell<Option<VisibilityHandler>>> = Rc::default();

        let handler_cell = Rc::clone(&handler);
        let callback = Closure::<dyn FnMut(js_sys::Array)>::new(move |entries: js_sys::Array| {
            for entry in entries.iter() {
                let Ok(entry) = entry.dyn_into::<web_sys::IntersectionObserverEntry>() else {
                    continue;
                };
                if !entry.is_intersecting() {
                    continue;
                }
                let node = entry
                    .target()
                    .get_attribute(NODE_ID_ATTR)
                    .and_then(|v| v.parse::<u32>().ok())
                    .map(NodeId);
                if let (Some(node), Some(handler)) = (node, handler_cell.borrow().clone()) {
                    handler(node);
                }
            }
        });

        let options = web_sys::IntersectionObserverInit::new();
        options.set_root_margin("50px");
        options.set_threshold(&JsValue::from_f64(0.01));
        let observer = web_sys::IntersectionObserver::new_with_options(
            callback.as_ref().unchecked_ref(),
            &options,
        )
        .ok()?;

        Some(Self {
            host,
            observer,
            _callback: callback,
            handler,
        })
    }
}

impl VisibilitySource for WebVisibility {
    fn observe(&self, node: NodeId) {
        if let Some(el) = self.host.element(node) {
            self.observer.observe(&el);
        }
    }

    fn unobserve(&self, node: NodeId) {
        if let Some(el) = self.host.element(node) {
            self.observer.unobserve(&el);
        }
    }

    fn set_handler(&self, handler: VisibilityHandler) {
        *self.handler.borrow_mut() = Some(handler);
    }
}
