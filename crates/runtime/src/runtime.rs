//! The global runtime: configuration resolution, service wiring, the
//! host-page facade and the pre-init command queue.

use crate::loader::{LoaderStats, Spawner, WidgetLoader};
use crate::registry::{WidgetFactory, WidgetRegistry};
use crate::RuntimeError;
use pwx_api::{ApiClient, ApiClientConfig, HttpFetch, TrackEvent};
use pwx_config::RuntimeConfig;
use pwx_core::events::EventEmitter;
use pwx_core::types::{Product, Theme};
use pwx_host::{HostPage, VisibilitySource};
use pwx_personalization::{ABTestManager, EntropyRng, ProductTracker, SearchTracker};
use pwx_storage::{LocalStore, StorageBackend};
use pwx_widgets::{
    BannerBehavior, CarouselBehavior, CustomBehavior, GridBehavior, PopupBehavior,
    RecentlyViewedBehavior, SliderBehavior, WidgetCore,
};
use serde_json::{json, Value};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Everything environment-specific the runtime is built over. On wasm32
/// these are the web adapters; in tests the mocks.
pub struct RuntimeDeps {
    pub host: Rc<dyn HostPage>,
    pub visibility: Rc<dyn VisibilitySource>,
    pub fetch: Rc<dyn HttpFetch>,
    pub storage: Rc<dyn StorageBackend>,
    pub spawner: Spawner,
}

pub struct Runtime {
    config: RefCell<RuntimeConfig>,
    host: Rc<dyn HostPage>,
    api: Rc<ApiClient>,
    emitter: EventEmitter,
    loader: Rc<WidgetLoader>,
    products: Rc<ProductTracker>,
    search: Rc<SearchTracker>,
    ab_tests: Rc<ABTestManager>,
    spawner: Spawner,
    ready: Cell<bool>,
}

impl Runtime {
    /// Resolve configuration, build every service, auto-render server
    /// placements and run the initial scan. Configuration errors
    /// propagate; per-container scan failures are logged so one broken
    /// placeholder never takes the whole embed down.
    pub async fn init(
        deps: RuntimeDeps,
        global_override: Option<&Value>,
        options: Option<&Value>,
    ) -> Result<Rc<Self>, RuntimeError> {
        let script_attrs = Self::script_attrs(&deps.host);
        let config = RuntimeConfig::resolve(
            script_attrs.iter().map(|(k, v)| (k.as_str(), v.as_str())),
            global_override,
            options,
        );
        config.validate()?;

        let emitter = EventEmitter::new();
        let api = Rc::new(ApiClient::new(
            Rc::clone(&deps.fetch),
            Self::api_config(&config),
        ));

        let persist = Rc::new(LocalStore::auto(Rc::clone(&deps.storage), "pwx"));
        let session = Rc::new(LocalStore::auto(Rc::clone(&deps.storage), "pwx-session"));
        let products = Rc::new(ProductTracker::new(Rc::clone(&persist), config.journey_limit));
        let search = Rc::new(SearchTracker::new(
            Rc::clone(&persist),
            config.min_search_length,
            config.search_history_limit,
        ));
        let ab_tests = Rc::new(ABTestManager::new(
            persist,
            emitter.clone(),
            Rc::new(EntropyRng::new()),
        ));

        let registry = WidgetRegistry::new();
        Self::register_builtins(&registry, &session, &products);

        let loader = WidgetLoader::new(
            Rc::clone(&deps.host),
            Rc::clone(&deps.visibility),
            Rc::clone(&api),
            registry,
            emitter.clone(),
            config.clone(),
            Rc::clone(&deps.spawner),
        );

        let runtime = Rc::new(Self {
            config: RefCell::new(config),
            host: Rc::clone(&deps.host),
            api,
            emitter,
            loader: Rc::clone(&loader),
            products,
            search,
            ab_tests,
            spawner: deps.spawner,
            ready: Cell::new(false),
        });

        // Host events flow through the loader to every live widget.
        let sink_loader = Rc::downgrade(&loader);
        runtime.host.set_event_sink(Rc::new(move |event| {
            if let Some(loader) = sink_loader.upgrade() {
                loader.dispatch_host_event(event);
            }
        }));

        Self::wire_analytics(&runtime);
        runtime.auto_render().await;
        if let Err(err) = runtime.scan().await {
            log::warn!("pwx-runtime: initial scan: {err}");
        }

        runtime.ready.set(true);
        runtime.emitter.emit("pwx:ready", &Value::Null);
        Ok(runtime)
    }

    fn script_attrs(host: &Rc<dyn HostPage>) -> Vec<(String, String)> {
        // Only the loader script tag carries this attribute.
        host.query(None, "[data-pwx-customer]")
            .first()
            .map(|node| host.attrs(*node))
            .unwrap_or_default()
    }

    fn api_config(config: &RuntimeConfig) -> ApiClientConfig {
        ApiClientConfig {
            base_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            timeout_ms: config.request_timeout_ms,
            retry_attempts: config.retry_attempts,
            cache_enabled: config.cache_enabled,
            cache_ttl_ms: config.cache_ttl_ms,
        }
    }

    fn register_builtins(
        registry: &WidgetRegistry,
        session: &Rc<LocalStore>,
        products: &Rc<ProductTracker>,
    ) {
        registry.register("carousel", Rc::new(|| Box::new(CarouselBehavior::new())));
        registry.register("grid", Rc::new(|| Box::new(GridBehavior::new())));
        registry.register("banner", Rc::new(|| Box::new(BannerBehavior::new())));
        registry.register("custom", Rc::new(|| Box::new(CustomBehavior::new())));

        let store = Rc::clone(session);
        registry.register(
            "popup",
            Rc::new(move || Box::new(PopupBehavior::new(Rc::clone(&store)))),
        );
        let store = Rc::clone(session);
        registry.register(
            "slider",
            Rc::new(move || Box::new(SliderBehavior::new(Rc::clone(&store)))),
        );
        let tracker = Rc::clone(products);
        registry.register(
            "recently-viewed",
            Rc::new(move || Box::new(RecentlyViewedBehavior::new(Rc::clone(&tracker)))),
        );
    }

    /// Forward the bus's analytics-relevant events to the track endpoint.
    fn wire_analytics(runtime: &Rc<Self>) {
        let emitter = runtime.emitter.clone();

        let weak = Rc::downgrade(runtime);
        emitter.on("widget:mounted", move |payload| {
            if let Some(rt) = weak.upgrade() {
                rt.track(TrackEvent::new("impression", payload["widgetId"].as_str()));
            }
        });

        let weak = Rc::downgrade(runtime);
        emitter.on("product:click", move |payload| {
            if let Some(rt) = weak.upgrade() {
                let mut event = TrackEvent::new("click", payload["widgetId"].as_str());
                event.product_id = payload["productId"].as_str().map(str::to_string);
                rt.track(event);
            }
        });

        let weak = Rc::downgrade(runtime);
        emitter.on("cart:add", move |payload| {
            if let Some(rt) = weak.upgrade() {
                let mut event = TrackEvent::new("cart_add", payload["widgetId"].as_str());
                event.product_id = payload["productId"].as_str().map(str::to_string);
                rt.track(event);
            }
        });

        for ab_event in ["abtest:assigned", "abtest:conversion", "abtest:click"] {
            let weak = Rc::downgrade(runtime);
            emitter.on(ab_event, move |payload| {
                if let Some(rt) = weak.upgrade() {
                    let mut event = TrackEvent::new("ab_test", None);
                    event.metadata = Some(payload.clone());
                    rt.track(event);
                }
            });
        }
    }

    /// Create containers for server-placed widgets that are not already
    /// in the page. Best-effort: a failed config fetch only disables
    /// auto-render, DOM-declared containers still mount.
    async fn auto_render(&self) {
        let slug = self.config.borrow().customer_slug.clone();
        let payload = match self.api.get_widget_config(&slug, None).await {
            Ok(payload) => payload,
            Err(err) => {
                log::warn!("pwx-runtime: auto-render skipped: {err}");
                return;
            }
        };
        for descriptor in &payload.widgets {
            let Some(placement) = &descriptor.placement else {
                continue;
            };
            let claimed = format!("[data-pwx-id=\"{}\"]", descriptor.id);
            if !self.host.query(None, &claimed).is_empty() {
                continue;
            }
            let Some(node) = self
                .host
                .create_container(placement.selector(), placement.position())
            else {
                log::warn!(
                    "pwx-runtime: placement selector {:?} matched nothing",
                    placement.selector()
                );
                continue;
            };
            self.host.set_attr(
                node,
                "data-pwx-widget",
                &descriptor.widget_type.to_ascii_lowercase(),
            );
            self.host.set_attr(node, "data-pwx-id", &descriptor.id);
        }
    }

    // ---- facade surface -----------------------------------------------

    pub fn emitter(&self) -> EventEmitter {
        self.emitter.clone()
    }

    pub fn products(&self) -> Rc<ProductTracker> {
        Rc::clone(&self.products)
    }

    pub fn search(&self) -> Rc<SearchTracker> {
        Rc::clone(&self.search)
    }

    pub fn ab_tests(&self) -> Rc<ABTestManager> {
        Rc::clone(&self.ab_tests)
    }

    pub fn config(&self) -> RuntimeConfig {
        self.config.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.ready.get()
    }

    /// Run `callback` once the runtime is initialized (immediately if it
    /// already is).
    pub fn on_ready(&self, callback: impl Fn() + 'static) {
        if self.ready.get() {
            callback();
        } else {
            self.emitter.once("pwx:ready", move |_| callback());
        }
    }

    pub async fn scan(&self) -> Result<usize, RuntimeError> {
        self.loader.scan(None).await
    }

    pub async fn refresh(&self, widget_id: &str) -> Result<(), RuntimeError> {
        self.loader.refresh(widget_id).await
    }

    pub async fn refresh_all(&self) {
        self.loader.refresh_all().await;
    }

    pub fn destroy(&self, widget_id: &str) -> bool {
        self.loader.destroy(widget_id)
    }

    pub fn destroy_all(&self) {
        self.loader.destroy_all();
    }

    pub fn get(&self, widget_id: &str) -> Option<Rc<RefCell<WidgetCore>>> {
        self.loader.get(widget_id)
    }

    pub fn widget_ids(&self) -> Vec<String> {
        self.loader.widget_ids()
    }

    pub fn get_all(&self) -> Vec<(String, Rc<RefCell<WidgetCore>>)> {
        self.loader.get_all()
    }

    pub fn stats(&self) -> LoaderStats {
        self.loader.stats()
    }

    pub fn register_widget(&self, widget_type: &str, factory: WidgetFactory) {
        self.loader.registry().register(widget_type, factory);
    }

    /// Apply a partial config override at runtime. Returns the changed
    /// keys. Transport-level settings propagate to the API client.
    pub fn configure(&self, patch: &Value) -> Vec<String> {
        let changed = self.config.borrow_mut().apply_patch(patch);
        if !changed.is_empty() {
            let config = self.config.borrow().clone();
            self.api.set_config(Self::api_config(&config));
            self.loader.set_config(config);
            self.emitter
                .emit("config:changed", &json!({"changed": changed}));
        }
        changed
    }

    /// Re-theme every mounted widget. Accepts a partial theme object;
    /// missing fields fall back to defaults.
    pub fn set_theme(&self, theme: &Value) {
        match serde_json::from_value::<Theme>(theme.clone()) {
            Ok(theme) => self.loader.apply_theme(&theme),
            Err(err) => log::warn!("pwx-runtime: ignoring invalid theme: {err}"),
        }
    }

    pub fn clear_cache(&self) {
        self.api.clear_cache();
    }

    pub fn track_product_view(&self, product: &Product) {
        self.products.track_view(product);
        let mut event = TrackEvent::new("product_view", None);
        event.product_id = Some(product.id.clone());
        self.track(event);
    }

    pub fn track_search(&self, query: &str) -> bool {
        self.search.track_search(query)
    }

    /// Fire-and-forget analytics dispatch, gated on the analytics flag.
    fn track(&self, event: TrackEvent) {
        if !self.config.borrow().analytics {
            return;
        }
        let api = Rc::clone(&self.api);
        let slug = self.config.borrow().customer_slug.clone();
        (self.spawner)(Box::pin(async move {
            api.track_event(&slug, &event).await;
        }));
    }

    // ---- command queue ------------------------------------------------

    /// Drain `PWX_QUEUE`-style entries (`{"method": ..., "args": [...]}`)
    /// recorded by the loader snippet before the runtime came up. Bad
    /// entries are logged and skipped.
    pub fn drain_queue(self: &Rc<Self>, entries: Vec<Value>) {
        for entry in entries {
            let Some(method) = entry["method"].as_str().map(str::to_string) else {
                log::warn!("pwx-runtime: queue entry without method: {entry}");
                continue;
            };
            let args = match entry["args"].clone() {
                Value::Array(args) => args,
                Value::Null => Vec::new(),
                other => vec![other],
            };
            let runtime = Rc::clone(self);
            (self.spawner)(Box::pin(async move {
                if let Err(err) = runtime.run_command(&method, &args).await {
                    log::warn!("pwx-runtime: queued {method:?} failed: {err}");
                }
            }));
        }
    }

    /// Execute one facade command by name.
    pub async fn run_command(&self, method: &str, args: &[Value]) -> Result<(), RuntimeError> {
        let str_arg = |at: usize| {
            args.get(at)
                .and_then(Value::as_str)
                .ok_or_else(|| RuntimeError::Command(format!("{method} needs a string argument")))
        };
        match method {
            "scan" => self.scan().await.map(|_| ()),
            "refresh" => self.refresh(str_arg(0)?).await,
            "refreshAll" => {
                self.refresh_all().await;
                Ok(())
            }
            "destroy" => {
                self.destroy(str_arg(0)?);
                Ok(())
            }
            "destroyAll" => {
                self.destroy_all();
                Ok(())
            }
            "configure" => {
                let patch = args
                    .first()
                    .ok_or_else(|| RuntimeError::Command("configure needs an object".into()))?;
                self.configure(patch);
                Ok(())
            }
            "setTheme" => {
                let theme = args
                    .first()
                    .ok_or_else(|| RuntimeError::Command("setTheme needs an object".into()))?;
                self.set_theme(theme);
                Ok(())
            }
            "clearCache" => {
                self.clear_cache();
                Ok(())
            }
            "trackProductView" => {
                let product: Product = serde_json::from_value(
                    args.first().cloned().unwrap_or(Value::Null),
                )
                .map_err(|err| RuntimeError::Command(format!("trackProductView: {err}")))?;
                self.track_product_view(&product);
                Ok(())
            }
            "trackSearch" => {
                self.track_search(str_arg(0)?);
                Ok(())
            }
            "trackConversion" => {
                self.ab_tests
                    .track_conversion(str_arg(0)?, args.get(1).cloned());
                Ok(())
            }
            other => Err(RuntimeError::Command(format!("unknown method {other:?}"))),
        }
    }

    /// Snapshot for debugging surfaces (`getStats`).
    pub fn stats_value(&self) -> Value {
        let stats = self.stats();
        json!({
            "mounted": stats.mounted,
            "pending": stats.pending,
            "registeredTypes": stats.registered_types,
            "cacheEntries": self.api.cache_len(),
            "ready": self.ready.get(),
        })
    }
}
