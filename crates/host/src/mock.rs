//! In-memory host page for native tests.
//!
//! Holds a small element tree plus an operation log, so tests can both
//! build a fake page (`add_element`, `set_in_viewport`) and verify what
//! the runtime did to it (`has_op`, `ops_where`). Timers are collected and
//! fired by hand; host events are dispatched by hand through the installed
//! sink.

use crate::{EventSink, HostEvent, HostPage, NodeId, TimerId};
use parking_lot::Mutex;
use pwx_core::types::InsertPosition;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::Rc;

/// Logged DOM/host operations, for verification.
#[derive(Debug, Clone, PartialEq)]
pub enum DomOp {
    CreateContainer { selector: String, node: NodeId },
    SetAttr { node: NodeId, name: String, value: String },
    RemoveAttr { node: NodeId, name: String },
    AddClass { node: NodeId, class: String },
    RemoveClass { node: NodeId, class: String },
    SetHtml { node: NodeId, html: String },
    SetShadowHtml { node: NodeId, html: String },
    ClearChildren { node: NodeId },
    SetCssVar { node: NodeId, name: String, value: String },
    InjectStyle { style_id: String },
    BindContainer { node: NodeId },
    UnbindContainer { node: NodeId },
    SetTimeout { timer: TimerId, ms: u64 },
    SetInterval { timer: TimerId, ms: u64 },
    ClearTimer { timer: TimerId },
    Navigate { url: String },
    CopyText { text: String },
    ScrollIntoView { selector: String },
}

#[derive(Debug, Clone, Default)]
struct MockNode {
    tag: String,
    attrs: BTreeMap<String, String>,
    classes: BTreeSet<String>,
    html: String,
    shadow_html: Option<String>,
    css_vars: BTreeMap<String, String>,
    children: Vec<NodeId>,
    in_viewport: bool,
}

enum TimerKind {
    Once(Option<Box<dyn FnOnce()>>),
    Repeat(Rc<dyn Fn()>),
}

struct State {
    nodes: HashMap<NodeId, MockNode>,
    root_children: Vec<NodeId>,
    next_node: u32,
    next_timer: u32,
    timers: HashMap<TimerId, TimerKind>,
    injected_styles: BTreeSet<String>,
    ops: Vec<DomOp>,
    viewport_width: u32,
    shadow_dom: bool,
    page_product: Option<String>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            nodes: HashMap::new(),
            root_children: Vec::new(),
            next_node: 1,
            next_timer: 1,
            timers: HashMap::new(),
            injected_styles: BTreeSet::new(),
            ops: Vec::new(),
            viewport_width: 1280,
            shadow_dom: true,
            page_product: None,
        }
    }
}

#[derive(Default)]
pub struct MockHost {
    state: Mutex<State>,
    // Sink lives outside the state mutex so dispatch never holds the lock
    // while running runtime code that may call back into the host.
    sink: Mutex<Option<EventSink>>,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- page building ------------------------------------------------

    /// Append a top-level element; returns its handle.
    pub fn add_element(&self, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
        let mut state = self.state.lock();
        let id = NodeId(state.next_node);
        state.next_node += 1;
        state.nodes.insert(
            id,
            MockNode {
                tag: tag.to_string(),
                attrs: attrs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                ..Default::default()
            },
        );
        state.root_children.push(id);
        id
    }

    /// A widget container with the standard attribute contract.
    pub fn add_widget_container(&self, widget_type: &str, attrs: &[(&str, &str)]) -> NodeId {
        let mut all = vec![("data-pwx-widget", widget_type)];
        all.extend_from_slice(attrs);
        self.add_element("div", &all)
    }

    pub fn set_in_viewport(&self, node: NodeId, in_viewport: bool) {
        if let Some(n) = self.state.lock().nodes.get_mut(&node) {
            n.in_viewport = in_viewport;
        }
    }

    pub fn set_viewport_width(&self, width: u32) {
        self.state.lock().viewport_width = width;
    }

    pub fn set_shadow_dom_supported(&self, supported: bool) {
        self.state.lock().shadow_dom = supported;
    }

    pub fn set_page_product(&self, product_id: Option<&str>) {
        self.state.lock().page_product = product_id.map(str::to_string);
    }

    // ---- verification -------------------------------------------------

    pub fn ops(&self) -> Vec<DomOp> {
        self.state.lock().ops.clone()
    }

    pub fn has_op(&self, op: &DomOp) -> bool {
        self.state.lock().ops.contains(op)
    }

    pub fn ops_where<F: Fn(&DomOp) -> bool>(&self, predicate: F) -> Vec<DomOp> {
        self.state
            .lock()
            .ops
            .iter()
            .filter(|op| predicate(op))
            .cloned()
            .collect()
    }

    pub fn clear_ops(&self) {
        self.state.lock().ops.clear();
    }

    pub fn html_of(&self, node: NodeId) -> String {
        self.state
            .lock()
            .nodes
            .get(&node)
            .map(|n| n.html.clone())
            .unwrap_or_default()
    }

    pub fn shadow_html_of(&self, node: NodeId) -> Option<String> {
        self.state
            .lock()
            .nodes
            .get(&node)
            .and_then(|n| n.shadow_html.clone())
    }

    pub fn classes_of(&self, node: NodeId) -> Vec<String> {
        self.state
            .lock()
            .nodes
            .get(&node)
            .map(|n| n.classes.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.state
            .lock()
            .nodes
            .get(&node)
            .is_some_and(|n| n.classes.contains(class))
    }

    pub fn css_var_of(&self, node: NodeId, name: &str) -> Option<String> {
        self.state
            .lock()
            .nodes
            .get(&node)
            .and_then(|n| n.css_vars.get(name).cloned())
    }

    pub fn style_injected(&self, style_id: &str) -> bool {
        self.state.lock().injected_styles.contains(style_id)
    }

    // ---- drivers ------------------------------------------------------

    /// Dispatch a host event through the installed sink.
    pub fn dispatch(&self, event: HostEvent) {
        let sink = self.sink.lock().clone();
        if let Some(sink) = sink {
            sink(&event);
        }
    }

    pub fn live_timer_count(&self) -> usize {
        self.state.lock().timers.len()
    }

    /// Fire one timer. One-shot timers are consumed; intervals stay live.
    /// Returns false for unknown/cleared timers.
    pub fn fire_timer(&self, timer: TimerId) -> bool {
        enum Fire {
            Once(Box<dyn FnOnce()>),
            Repeat(Rc<dyn Fn()>),
        }
        let fire = {
            let mut state = self.state.lock();
            match state.timers.get_mut(&timer) {
                Some(TimerKind::Once(slot)) => {
                    let cb = slot.take();
                    state.timers.remove(&timer);
                    cb.map(Fire::Once)
                }
                Some(TimerKind::Repeat(cb)) => Some(Fire::Repeat(Rc::clone(cb))),
                None => None,
            }
        };
        match fire {
            Some(Fire::Once(cb)) => {
                cb();
                true
            }
            Some(Fire::Repeat(cb)) => {
                cb();
                true
            }
            None => false,
        }
    }

    /// Fire every live timer once, in creation order.
    pub fn fire_all_timers(&self) {
        let mut ids: Vec<TimerId> = self.state.lock().timers.keys().copied().collect();
        ids.sort_by_key(|t| t.0);
        for id in ids {
            self.fire_timer(id);
        }
    }

    // ---- selector matching -------------------------------------------

    fn matches(node: &MockNode, selector: &str) -> bool {
        let selector = selector.trim();
        if let Some(rest) = selector.strip_prefix('#') {
            return node.attrs.get("id").is_some_and(|id| id == rest);
        }
        if let Some(rest) = selector.strip_prefix('.') {
            return node.classes.contains(rest);
        }
        if let Some(inner) = selector.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            return match inner.split_once('=') {
                Some((name, value)) => {
                    let value = value.trim_matches('"').trim_matches('\'');
                    node.attrs.get(name.trim()).is_some_and(|v| v == value)
                }
                None => node.attrs.contains_key(inner.trim()),
            };
        }
        node.tag == selector
    }

    fn descendants(state: &State, root: Option<NodeId>) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = match root {
            Some(root) => state
                .nodes
                .get(&root)
                .map(|n| n.children.iter().rev().copied().collect())
                .unwrap_or_default(),
            None => state.root_children.iter().rev().copied().collect(),
        };
        while let Some(id) = stack.pop() {
            out.push(id);
            if let Some(node) = state.nodes.get(&id) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    fn log(&self, op: DomOp) {
        self.state.lock().ops.push(op);
    }
}

impl HostPage for MockHost {
    fn query(&self, root: Option<NodeId>, selector: &str) -> Vec<NodeId> {
        let state = self.state.lock();
        Self::descendants(&state, root)
            .into_iter()
            .filter(|id| state.nodes.get(id).is_some_and(|n| Self::matches(n, selector)))
            .collect()
    }

    fn create_container(&self, selector: &str, position: InsertPosition) -> Option<NodeId> {
        let node = {
            let mut state = self.state.lock();
            let parent = Self::descendants(&state, None)
                .into_iter()
                .find(|id| state.nodes.get(id).is_some_and(|n| Self::matches(n, selector)))?;
            let id = NodeId(state.next_node);
            state.next_node += 1;
            state.nodes.insert(
                id,
                MockNode {
                    tag: "div".to_string(),
                    ..Default::default()
                },
            );
            match state.nodes.get_mut(&parent) {
                Some(p) => match position {
                    InsertPosition::Append => p.children.push(id),
                    InsertPosition::Prepend => p.children.insert(0, id),
                },
                None => return None,
            }
            id
        };
        self.log(DomOp::CreateContainer {
            selector: selector.to_string(),
            node,
        });
        Some(node)
    }

    fn attr(&self, node: NodeId, name: &str) -> Option<String> {
        self.state
            .lock()
            .nodes
            .get(&node)
            .and_then(|n| n.attrs.get(name).cloned())
    }

    fn attrs(&self, node: NodeId) -> Vec<(String, String)> {
        self.state
            .lock()
            .nodes
            .get(&node)
            .map(|n| n.attrs.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }

    fn set_attr(&self, node: NodeId, name: &str, value: &str) {
        {
            let mut state = self.state.lock();
            let Some(n) = state.nodes.get_mut(&node) else {
                return;
            };
            n.attrs.insert(name.to_string(), value.to_string());
        }
        self.log(DomOp::SetAttr {
            node,
            name: name.to_string(),
            value: value.to_string(),
        });
    }

    fn remove_attr(&self, node: NodeId, name: &str) {
        {
            let mut state = self.state.lock();
            let Some(n) = state.nodes.get_mut(&node) else {
                return;
            };
            n.attrs.remove(name);
        }
        self.log(DomOp::RemoveAttr {
            node,
            name: name.to_string(),
        });
    }

    fn add_class(&self, node: NodeId, class: &str) {
        {
            let mut state = self.state.lock();
            let Some(n) = state.nodes.get_mut(&node) else {
                return;
            };
            n.classes.insert(class.to_string());
        }
        self.log(DomOp::AddClass {
            node,
            class: class.to_string(),
        });
    }

    fn remove_class(&self, node: NodeId, class: &str) {
        {
            let mut state = self.state.lock();
            let Some(n) = state.nodes.get_mut(&node) else {
                return;
            };
            n.classes.remove(class);
        }
        self.log(DomOp::RemoveClass {
            node,
            class: class.to_string(),
        });
    }

    fn set_html(&self, node: NodeId, html: &str) {
        {
            let mut state = self.state.lock();
            let Some(n) = state.nodes.get_mut(&node) else {
                return;
            };
            n.html = html.to_string();
        }
        self.log(DomOp::SetHtml {
            node,
            html: html.to_string(),
        });
    }

    fn clear_children(&self, node: NodeId) {
        {
            let mut state = self.state.lock();
            let children = match state.nodes.get_mut(&node) {
                Some(n) => {
                    n.html.clear();
                    std::mem::take(&mut n.children)
                }
                None => return,
            };
            for child in children {
                state.nodes.remove(&child);
            }
        }
        self.log(DomOp::ClearChildren { node });
    }

    fn set_css_var(&self, node: NodeId, name: &str, value: &str) {
        {
            let mut state = self.state.lock();
            let Some(n) = state.nodes.get_mut(&node) else {
                return;
            };
            n.css_vars.insert(name.to_string(), value.to_string());
        }
        self.log(DomOp::SetCssVar {
            node,
            name: name.to_string(),
            value: value.to_string(),
        });
    }

    fn inject_style_once(&self, style_id: &str, _css: &str) -> bool {
        let inserted = self.state.lock().injected_styles.insert(style_id.to_string());
        if inserted {
            self.log(DomOp::InjectStyle {
                style_id: style_id.to_string(),
            });
        }
        inserted
    }

    fn supports_shadow_dom(&self) -> bool {
        self.state.lock().shadow_dom
    }

    fn set_shadow_html(&self, node: NodeId, html: &str) {
        {
            let mut state = self.state.lock();
            let Some(n) = state.nodes.get_mut(&node) else {
                return;
            };
            n.shadow_html = Some(html.to_string());
        }
        self.log(DomOp::SetShadowHtml {
            node,
            html: html.to_string(),
        });
    }

    fn viewport_width(&self) -> u32 {
        self.state.lock().viewport_width
    }

    fn is_in_viewport(&self, node: NodeId) -> bool {
        self.state
            .lock()
            .nodes
            .get(&node)
            .is_some_and(|n| n.in_viewport)
    }

    fn set_event_sink(&self, sink: EventSink) {
        *self.sink.lock() = Some(sink);
    }

    fn bind_container_events(&self, node: NodeId) {
        self.log(DomOp::BindContainer { node });
    }

    fn unbind_container_events(&self, node: NodeId) {
        self.log(DomOp::UnbindContainer { node });
    }

    fn set_timeout(&self, ms: u64, callback: Box<dyn FnOnce()>) -> TimerId {
        let timer = {
            let mut state = self.state.lock();
            let timer = TimerId(state.next_timer);
            state.next_timer += 1;
            state.timers.insert(timer, TimerKind::Once(Some(callback)));
            timer
        };
        self.log(DomOp::SetTimeout { timer, ms });
        timer
    }

    fn set_interval(&self, ms: u64, callback: Rc<dyn Fn()>) -> TimerId {
        let timer = {
            let mut state = self.state.lock();
            let timer = TimerId(state.next_timer);
            state.next_timer += 1;
            state.timers.insert(timer, TimerKind::Repeat(callback));
            timer
        };
        self.log(DomOp::SetInterval { timer, ms });
        timer
    }

    fn clear_timer(&self, timer: TimerId) {
        let removed = self.state.lock().timers.remove(&timer).is_some();
        if removed {
            self.log(DomOp::ClearTimer { timer });
        }
    }

    fn navigate(&self, url: &str) {
        self.log(DomOp::Navigate {
            url: url.to_string(),
        });
    }

    fn copy_text(&self, text: &str) {
        self.log(DomOp::CopyText {
            text: text.to_string(),
        });
    }

    fn scroll_into_view(&self, selector: &str) {
        self.log(DomOp::ScrollIntoView {
            selector: selector.to_string(),
        });
    }

    fn page_product_id(&self) -> Option<String> {
        self.state.lock().page_product.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_matches_attribute_selectors_in_dom_order() {
        let host = MockHost::new();
        let a = host.add_widget_container("carousel", &[]);
        host.add_element("div", &[("class", "other")]);
        let b = host.add_widget_container("grid", &[]);

        assert_eq!(host.query(None, "[data-pwx-widget]"), vec![a, b]);
        assert_eq!(
            host.query(None, r#"[data-pwx-widget="grid"]"#),
            vec![b]
        );
    }

    #[test]
    fn query_scoped_to_root_excludes_siblings() {
        let host = MockHost::new();
        let _outside = host.add_widget_container("banner", &[]);
        let slot = host.add_element("section", &[("id", "slot")]);
        let inner = host
            .create_container("#slot", InsertPosition::Append)
            .unwrap();
        host.set_attr(inner, "data-pwx-widget", "banner");

        assert_eq!(host.query(Some(slot), "[data-pwx-widget]"), vec![inner]);
    }

    #[test]
    fn create_container_prepend_goes_first() {
        let host = MockHost::new();
        let slot = host.add_element("main", &[("id", "m")]);
        let a = host.create_container("#m", InsertPosition::Append).unwrap();
        let b = host.create_container("#m", InsertPosition::Prepend).unwrap();
        assert_eq!(host.query(Some(slot), "div"), vec![b, a]);
    }

    #[test]
    fn style_injection_is_keyed_once() {
        let host = MockHost::new();
        assert!(host.inject_style_once("pwx-carousel", ".x{}"));
        assert!(!host.inject_style_once("pwx-carousel", ".x{}"));
        assert_eq!(
            host.ops_where(|op| matches!(op, DomOp::InjectStyle { .. }))
                .len(),
            1
        );
    }

    #[test]
    fn interval_survives_fire_timeout_does_not() {
        let host = MockHost::new();
        let once = host.set_timeout(10, Box::new(|| {}));
        let repeat = host.set_interval(10, Rc::new(|| {}));

        assert!(host.fire_timer(once));
        assert!(!host.fire_timer(once));
        assert!(host.fire_timer(repeat));
        assert!(host.fire_timer(repeat));
        assert_eq!(host.live_timer_count(), 1);
    }
}
