//! Container discovery and the mount state machine.
//!
//! `scan` claims placeholder containers, queues below-the-fold ones on
//! the visibility source and mounts the rest eagerly. Each mount walks
//! `loading -> mounted` (or `error`), with the container's state
//! mirrored as a class and a `data-pwx-state` attribute so host-page CSS
//! can react.

use crate::registry::WidgetRegistry;
use crate::RuntimeError;
use futures::future::LocalBoxFuture;
use pwx_api::{ApiClient, ProductQuery};
use pwx_config::RuntimeConfig;
use pwx_core::attrs::settings_from_attrs;
use pwx_core::events::EventEmitter;
use pwx_core::types::{Theme, WidgetState};
use pwx_host::{HostEvent, HostPage, NodeId, VisibilitySource};
use pwx_widgets::{Settings, WidgetCore};
use serde_json::{json, Value};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

/// Spawns a mount future when visibility fires outside an async context.
pub type Spawner = Rc<dyn Fn(LocalBoxFuture<'static, ()>)>;

const ALL_STATES: [WidgetState; 5] = [
    WidgetState::Pending,
    WidgetState::Loading,
    WidgetState::Mounted,
    WidgetState::Error,
    WidgetState::Destroyed,
];

fn state_name(state: WidgetState) -> &'static str {
    match state {
        WidgetState::Pending => "pending",
        WidgetState::Loading => "loading",
        WidgetState::Mounted => "mounted",
        WidgetState::Error => "error",
        WidgetState::Destroyed => "destroyed",
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderStats {
    pub mounted: usize,
    pub pending: usize,
    pub registered_types: Vec<String>,
}

pub struct WidgetLoader {
    host: Rc<dyn HostPage>,
    visibility: Rc<dyn VisibilitySource>,
    api: Rc<ApiClient>,
    registry: WidgetRegistry,
    emitter: EventEmitter,
    config: RefCell<RuntimeConfig>,
    instances: RefCell<BTreeMap<String, Rc<RefCell<WidgetCore>>>>,
    containers: RefCell<HashMap<NodeId, String>>,
    pending: RefCell<HashMap<NodeId, String>>,
    next_id: Cell<u64>,
    spawner: Spawner,
}

impl WidgetLoader {
    pub fn new(
        host: Rc<dyn HostPage>,
        visibility: Rc<dyn VisibilitySource>,
        api: Rc<ApiClient>,
        registry: WidgetRegistry,
        emitter: EventEmitter,
        config: RuntimeConfig,
        spawner: Spawner,
    ) -> Rc<Self> {
        let loader = Rc::new(Self {
            host,
            visibility,
            api,
            registry,
            emitter,
            config: RefCell::new(config),
            instances: RefCell::new(BTreeMap::new()),
            containers: RefCell::new(HashMap::new()),
            pending: RefCell::new(HashMap::new()),
            next_id: Cell::new(0),
            spawner,
        });

        // The handler holds a weak reference; the loader owns the
        // visibility source, not the other way around.
        let weak = Rc::downgrade(&loader);
        loader.visibility.set_handler(Rc::new(move |node| {
            let Some(loader) = weak.upgrade() else { return };
            // Unobserve and dequeue before mounting: a second fire for
            // the same node finds nothing and cannot double-mount.
            let Some(widget_type) = loader.take_pending(node) else {
                return;
            };
            let mounter = Rc::clone(&loader);
            (loader.spawner)(Box::pin(async move {
                if let Err(err) = mounter.mount(node, widget_type).await {
                    log::warn!("pwx-runtime: lazy mount failed: {err}");
                }
            }));
        }));
        loader
    }

    pub fn set_config(&self, config: RuntimeConfig) {
        *self.config.borrow_mut() = config;
    }

    pub fn registry(&self) -> &WidgetRegistry {
        &self.registry
    }

    /// Discover and claim unclaimed containers under `root`. Lazy
    /// containers are queued; eager ones mount now. The scan always runs
    /// to completion; eager failures are reported afterwards.
    pub async fn scan(&self, root: Option<NodeId>) -> Result<usize, RuntimeError> {
        let (selector, lazy) = {
            let config = self.config.borrow();
            (config.container_selector.clone(), config.lazy_load)
        };

        let mut handled = 0usize;
        let mut failures = Vec::new();
        for node in self.host.query(root, &selector) {
            if self.host.attr(node, "data-pwx-initialized").is_some() {
                continue;
            }
            let Some(raw_type) = self.host.attr(node, "data-pwx-widget") else {
                continue;
            };
            let widget_type = raw_type.trim().to_ascii_lowercase();
            // Claim first; a re-entrant or repeated scan skips this node.
            self.host.set_attr(node, "data-pwx-initialized", "true");

            if !self.registry.contains(&widget_type) {
                self.mark(node, WidgetState::Error);
                failures.push(format!("unknown widget type {widget_type:?}"));
                continue;
            }

            let immediate = self.host.attr(node, "data-pwx-immediate").is_some();
            if lazy && !immediate && !self.host.is_in_viewport(node) {
                self.pending.borrow_mut().insert(node, widget_type);
                self.visibility.observe(node);
                self.mark(node, WidgetState::Pending);
                handled += 1;
                continue;
            }

            match self.mount(node, widget_type).await {
                Ok(()) => handled += 1,
                Err(err) => failures.push(err.to_string()),
            }
        }

        if failures.is_empty() {
            Ok(handled)
        } else {
            Err(RuntimeError::Scan { failures })
        }
    }

    /// Fetch data and bring one claimed container up.
    pub(crate) async fn mount(&self, node: NodeId, widget_type: String) -> Result<(), RuntimeError> {
        self.mark(node, WidgetState::Loading);

        let attrs = self.host.attrs(node);
        let attr_settings = settings_from_attrs(attrs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        let widget_id = match self.host.attr(node, "data-pwx-id") {
            Some(id) if !id.trim().is_empty() => id,
            _ => {
                let id = format!("pwx-{widget_type}-{}", self.next_id.get() + 1);
                self.next_id.set(self.next_id.get() + 1);
                self.host.set_attr(node, "data-pwx-id", &id);
                id
            }
        };
        if self.instances.borrow().contains_key(&widget_id) {
            self.mark(node, WidgetState::Error);
            return Err(RuntimeError::Mount {
                widget_id,
                reason: "a widget with this id is already mounted".into(),
            });
        }

        let slug = self.config.borrow().customer_slug.clone();
        let query = Self::query_from(&attr_settings);
        let data = match self.api.get_widget_data(&slug, &widget_type, &query).await {
            Ok(data) => data,
            Err(err) => {
                self.mark(node, WidgetState::Error);
                return Err(RuntimeError::Mount {
                    widget_id,
                    reason: err.to_string(),
                });
            }
        };

        let base_settings = data
            .descriptor
            .as_ref()
            .map(|d| d.settings.clone())
            .unwrap_or_default();
        let settings = Settings::merged(&base_settings, &attr_settings);

        let Some(behavior) = self.registry.create(&widget_type) else {
            self.mark(node, WidgetState::Error);
            return Err(RuntimeError::UnknownType(widget_type));
        };
        let core = WidgetCore::build(
            widget_id.clone(),
            node,
            Rc::clone(&self.host),
            self.emitter.clone(),
            settings,
            data,
            behavior,
        );
        if let Err(err) = core.borrow_mut().init() {
            self.mark(node, WidgetState::Error);
            return Err(RuntimeError::Mount {
                widget_id,
                reason: err.to_string(),
            });
        }

        self.instances.borrow_mut().insert(widget_id.clone(), core);
        self.containers.borrow_mut().insert(node, widget_id.clone());
        self.mark(node, WidgetState::Mounted);
        self.emitter.emit(
            "widget:mounted",
            &json!({"widgetId": widget_id, "widgetType": widget_type}),
        );
        Ok(())
    }

    /// Re-fetch one widget's data and re-render it in place.
    pub async fn refresh(&self, widget_id: &str) -> Result<(), RuntimeError> {
        let (core, node, widget_type) = {
            let instances = self.instances.borrow();
            let core = instances
                .get(widget_id)
                .ok_or_else(|| RuntimeError::UnknownWidget(widget_id.to_string()))?;
            let borrowed = core.borrow();
            (Rc::clone(core), borrowed.container(), borrowed.type_name())
        };

        let attrs = self.host.attrs(node);
        let attr_settings = settings_from_attrs(attrs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        let slug = self.config.borrow().customer_slug.clone();
        let query = Self::query_from(&attr_settings);
        // A refresh must reach the server even inside the cache TTL.
        self.api.invalidate_widget_data(&slug, widget_type, &query);
        let data = self
            .api
            .get_widget_data(&slug, widget_type, &query)
            .await
            .map_err(|err| RuntimeError::Mount {
                widget_id: widget_id.to_string(),
                reason: err.to_string(),
            })?;
        core.borrow_mut()
            .update(data)
            .map_err(|err| RuntimeError::Mount {
                widget_id: widget_id.to_string(),
                reason: err.to_string(),
            })
    }

    /// Refresh every mounted widget with fresh server data. One widget's
    /// failure never stops the others.
    pub async fn refresh_all(&self) {
        self.api.clear_cache();
        let ids: Vec<String> = self.instances.borrow().keys().cloned().collect();
        for id in ids {
            if let Err(err) = self.refresh(&id).await {
                log::warn!("pwx-runtime: refresh of {id:?} failed: {err}");
            }
        }
    }

    /// Tear one widget down. Returns false for unknown ids; a second
    /// destroy of the same id is therefore a no-op.
    pub fn destroy(&self, widget_id: &str) -> bool {
        let Some(core) = self.instances.borrow_mut().remove(widget_id) else {
            return false;
        };
        let node = core.borrow().container();
        core.borrow_mut().destroy();
        self.containers.borrow_mut().remove(&node);
        // Unclaim so a later scan can repopulate the slot.
        self.host.remove_attr(node, "data-pwx-initialized");
        self.host.remove_attr(node, "data-pwx-id");
        self.mark(node, WidgetState::Destroyed);
        true
    }

    pub fn destroy_all(&self) {
        let ids: Vec<String> = self.instances.borrow().keys().cloned().collect();
        for id in ids {
            self.destroy(&id);
        }
        for (node, _) in self.pending.borrow_mut().drain() {
            self.visibility.unobserve(node);
            self.host.remove_attr(node, "data-pwx-initialized");
            self.mark(node, WidgetState::Destroyed);
        }
    }

    pub fn get(&self, widget_id: &str) -> Option<Rc<RefCell<WidgetCore>>> {
        self.instances.borrow().get(widget_id).cloned()
    }

    pub fn widget_ids(&self) -> Vec<String> {
        self.instances.borrow().keys().cloned().collect()
    }

    pub fn get_all(&self) -> Vec<(String, Rc<RefCell<WidgetCore>>)> {
        self.instances
            .borrow()
            .iter()
            .map(|(id, core)| (id.clone(), Rc::clone(core)))
            .collect()
    }

    pub fn stats(&self) -> LoaderStats {
        LoaderStats {
            mounted: self.instances.borrow().len(),
            pending: self.pending.borrow().len(),
            registered_types: self.registry.types(),
        }
    }

    /// Route a host event to every live widget (each core filters
    /// container-scoped events itself).
    pub fn dispatch_host_event(&self, event: &HostEvent) {
        let cores: Vec<Rc<RefCell<WidgetCore>>> =
            self.instances.borrow().values().cloned().collect();
        for core in cores {
            core.borrow_mut().handle_host_event(event);
        }
    }

    /// Re-apply theme variables to every mounted container.
    pub fn apply_theme(&self, theme: &Theme) {
        let nodes: Vec<NodeId> = self.containers.borrow().keys().copied().collect();
        for node in nodes {
            for (name, value) in theme.css_vars() {
                self.host.set_css_var(node, &name, &value);
            }
        }
    }

    fn take_pending(&self, node: NodeId) -> Option<String> {
        self.visibility.unobserve(node);
        self.pending.borrow_mut().remove(&node)
    }

    fn query_from(settings: &BTreeMap<String, Value>) -> ProductQuery {
        ProductQuery {
            campaign: settings
                .get("campaign")
                .and_then(Value::as_str)
                .map(str::to_string),
            category: settings
                .get("category")
                .and_then(Value::as_str)
                .map(str::to_string),
            limit: settings
                .get("limit")
                .and_then(Value::as_u64)
                .map(|v| v as u32),
            offset: None,
        }
    }

    fn mark(&self, node: NodeId, state: WidgetState) {
        for other in ALL_STATES {
            if other != state {
                self.host.remove_class(node, other.css_class());
            }
        }
        self.host.add_class(node, state.css_class());
        self.host.set_attr(node, "data-pwx-state", state_name(state));
    }
}
