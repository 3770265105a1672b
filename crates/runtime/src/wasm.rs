//! Browser entry points: the `PWX` global surface exported through
//! `wasm-bindgen`, over a thread-local runtime cell.

use crate::loader::Spawner;
use crate::{Runtime, RuntimeDeps, RuntimeError};
use pwx_api::web::GlooFetch;
use pwx_host::web::{WebHost, WebVisibility};
use pwx_host::{NodeId, VisibilitySource};
use pwx_storage::{MemoryBackend, StorageBackend, WebStorageBackend};
use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;

thread_local! {
    static RUNTIME: RefCell<Option<Rc<Runtime>>> = const { RefCell::new(None) };
}

struct ConsoleLogger;

impl log::Log for ConsoleLogger {
    fn enabled(&self, _: &log::Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &log::Record<'_>) {
        let line = format!("[{}] {}", record.target(), record.args());
        match record.level() {
            log::Level::Error => web_sys::console::error_1(&line.into()),
            log::Level::Warn => web_sys::console::warn_1(&line.into()),
            log::Level::Info => web_sys::console::info_1(&line.into()),
            _ => web_sys::console::debug_1(&line.into()),
        }
    }

    fn flush(&self) {}
}

static LOGGER: ConsoleLogger = ConsoleLogger;

fn js_to_value(value: &JsValue) -> Option<Value> {
    if value.is_undefined() || value.is_null() {
        return None;
    }
    let raw = js_sys::JSON::stringify(value).ok()?;
    let raw: String = raw.into();
    serde_json::from_str(&raw).ok()
}

fn global_value(name: &str) -> Option<Value> {
    let window = web_sys::window()?;
    let value = js_sys::Reflect::get(&window, &JsValue::from_str(name)).ok()?;
    js_to_value(&value)
}

/// Visibility fallback for hosts without `IntersectionObserver`: fires
/// the handler as soon as a node is observed, so every queued widget
/// mounts eagerly.
#[derive(Default)]
struct EagerVisibility {
    handler: RefCell<Option<pwx_host::visibility::VisibilityHandler>>,
}

impl VisibilitySource for EagerVisibility {
    fn observe(&self, node: NodeId) {
        let handler = self.handler.borrow().clone();
        if let Some(handler) = handler {
            handler(node);
        }
    }

    fn unobserve(&self, _node: NodeId) {}

    fn set_handler(&self, handler: pwx_host::visibility::VisibilityHandler) {
        *self.handler.borrow_mut() = Some(handler);
    }
}

async fn build_runtime(options: Option<Value>) -> Result<Rc<Runtime>, RuntimeError> {
    let host = WebHost::new().ok_or(RuntimeError::HostUnavailable)?;
    let visibility: Rc<dyn VisibilitySource> = match WebVisibility::new(Rc::clone(&host)) {
        Some(observer) => Rc::new(observer),
        None => Rc::new(EagerVisibility::default()),
    };
    let storage: Rc<dyn StorageBackend> = match WebStorageBackend::new() {
        Some(backend) => Rc::new(backend),
        None => Rc::new(MemoryBackend::new()),
    };
    let spawner: Spawner = Rc::new(|future| spawn_local(future));

    let deps = RuntimeDeps {
        host,
        visibility,
        fetch: Rc::new(GlooFetch::new()),
        storage,
        spawner,
    };
    let global_override = global_value("PWX_CONFIG");
    Runtime::init(deps, global_override.as_ref(), options.as_ref()).await
}

fn with_runtime(f: impl FnOnce(&Rc<Runtime>)) {
    RUNTIME.with(|cell| match cell.borrow().as_ref() {
        Some(runtime) => f(runtime),
        None => log::warn!("pwx: runtime not initialized yet"),
    });
}

/// Initialize the runtime. Safe to call before DOM ready; safe to call
/// once only (repeat calls are ignored).
#[wasm_bindgen(js_name = init)]
pub fn init(options: JsValue) {
    console_error_panic_hook::set_once();
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(log::LevelFilter::Info);
    }
    let already = RUNTIME.with(|cell| cell.borrow().is_some());
    if already {
        log::warn!("pwx: init called twice, ignoring");
        return;
    }

    let options = js_to_value(&options);
    spawn_local(async move {
        match build_runtime(options).await {
            Ok(runtime) => {
                if runtime.config().debug {
                    log::set_max_level(log::LevelFilter::Debug);
                }
                if let Some(Value::Array(queue)) = global_value("PWX_QUEUE") {
                    runtime.drain_queue(queue);
                }
                RUNTIME.with(|cell| *cell.borrow_mut() = Some(runtime));
            }
            Err(err) => log::error!("pwx: init failed: {err}"),
        }
    });
}

#[wasm_bindgen(js_name = scan)]
pub fn scan() {
    with_runtime(|runtime| {
        let runtime = Rc::clone(runtime);
        spawn_local(async move {
            if let Err(err) = runtime.scan().await {
                log::warn!("pwx: scan failed: {err}");
            }
        });
    });
}

#[wasm_bindgen(js_name = refresh)]
pub fn refresh(widget_id: String) {
    with_runtime(|runtime| {
        let runtime = Rc::clone(runtime);
        spawn_local(async move {
            if let Err(err) = runtime.refresh(&widget_id).await {
                log::warn!("pwx: refresh failed: {err}");
            }
        });
    });
}

#[wasm_bindgen(js_name = refreshAll)]
pub fn refresh_all() {
    with_runtime(|runtime| {
        let runtime = Rc::clone(runtime);
        spawn_local(async move { runtime.refresh_all().await });
    });
}

#[wasm_bindgen(js_name = destroy)]
pub fn destroy(widget_id: String) -> bool {
    let mut destroyed = false;
    with_runtime(|runtime| destroyed = runtime.destroy(&widget_id));
    destroyed
}

#[wasm_bindgen(js_name = destroyAll)]
pub fn destroy_all() {
    with_runtime(|runtime| runtime.destroy_all());
}

#[wasm_bindgen(js_name = configure)]
pub fn configure(patch: JsValue) {
    if let Some(patch) = js_to_value(&patch) {
        with_runtime(|runtime| {
            runtime.configure(&patch);
        });
    }
}

#[wasm_bindgen(js_name = setTheme)]
pub fn set_theme(theme: JsValue) {
    if let Some(theme) = js_to_value(&theme) {
        with_runtime(|runtime| runtime.set_theme(&theme));
    }
}

#[wasm_bindgen(js_name = clearCache)]
pub fn clear_cache() {
    with_runtime(|runtime| runtime.clear_cache());
}

#[wasm_bindgen(js_name = getStats)]
pub fn get_stats() -> JsValue {
    let mut stats = Value::Null;
    with_runtime(|runtime| stats = runtime.stats_value());
    match stats {
        Value::Null => JsValue::NULL,
        other => js_sys::JSON::parse(&other.to_string()).unwrap_or(JsValue::NULL),
    }
}

#[wasm_bindgen(js_name = trackProductView)]
pub fn track_product_view(product: JsValue) {
    let Some(product) = js_to_value(&product) else {
        return;
    };
    match serde_json::from_value(product) {
        Ok(product) => with_runtime(|runtime| runtime.track_product_view(&product)),
        Err(err) => log::warn!("pwx: trackProductView got an invalid product: {err}"),
    }
}

#[wasm_bindgen(js_name = trackSearch)]
pub fn track_search(query: String) -> bool {
    let mut recorded = false;
    with_runtime(|runtime| recorded = runtime.track_search(&query));
    recorded
}

/// Invoke `callback` once the runtime finishes initializing.
#[wasm_bindgen(js_name = ready)]
pub fn ready(callback: js_sys::Function) {
    with_runtime(|runtime| {
        runtime.on_ready(move || {
            if let Err(err) = callback.call0(&JsValue::NULL) {
                log::warn!("pwx: ready callback threw: {err:?}");
            }
        });
    });
}
