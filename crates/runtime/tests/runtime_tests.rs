//! End-to-end runtime tests over the in-memory host and scripted
//! transport: discovery, lazy mounting, failure isolation, the facade
//! surface and the pre-init command queue.

use futures::executor::LocalPool;
use futures::task::LocalSpawnExt;
use pwx_api::{FakeFetch, HttpFetch};
use pwx_host::mock::{DomOp, MockHost};
use pwx_host::visibility::FakeVisibility;
use pwx_host::{HostEvent, HostPage, NodeId, VisibilitySource};
use pwx_runtime::{Runtime, RuntimeDeps};
use pwx_storage::{MemoryBackend, StorageBackend};
use serde_json::{json, Value};
use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;

struct Harness {
    host: Rc<MockHost>,
    visibility: Rc<FakeVisibility>,
    fetch: Rc<FakeFetch>,
    runtime: Rc<Runtime>,
    pool: RefCell<LocalPool>,
}

impl Harness {
    /// Drive a facade future on the harness pool, then let whatever it
    /// spawned settle.
    fn run<F: Future>(&self, future: F) -> F::Output {
        let mut pool = self.pool.borrow_mut();
        let out = pool.run_until(future);
        pool.run_until_stalled();
        out
    }

    /// Settle the mounts and analytics spawned by the last host event,
    /// visibility fire or queued command.
    fn drain(&self) {
        self.pool.borrow_mut().run_until_stalled();
    }
}

fn sample_products() -> Value {
    json!({
        "products": [
            {"id": "p1", "title": "Trail Shoe", "price": 99.0, "image": "i1", "url": "u1"},
            {"id": "p2", "title": "Road Shoe", "price": 79.0, "image": "i2", "url": "u2"}
        ],
        "total": 2
    })
}

/// Routes every endpoint except products, so tests can script product
/// failures themselves.
fn install_routes(fetch: &FakeFetch, widgets: Value) {
    fetch.on_success(
        "/api/public/widget/acme",
        json!({"customerId": "c1", "customerSlug": "acme", "widgets": widgets, "theme": {}}),
    );
    fetch.on_success("/api/public/theme/acme", json!({}));
    fetch.on_success("/api/public/track/acme", json!({}));
}

fn init_runtime(
    pool: &mut LocalPool,
    host: &Rc<MockHost>,
    fetch: &Rc<FakeFetch>,
    visibility: &Rc<FakeVisibility>,
    options: Option<&Value>,
) -> Rc<Runtime> {
    host.add_element("script", &[("data-pwx-customer", "acme")]);
    let spawner = pool.spawner();
    let runtime = pool
        .run_until(Runtime::init(
            RuntimeDeps {
                host: Rc::clone(host) as Rc<dyn HostPage>,
                visibility: Rc::clone(visibility) as Rc<dyn VisibilitySource>,
                fetch: Rc::clone(fetch) as Rc<dyn HttpFetch>,
                storage: Rc::new(MemoryBackend::new()) as Rc<dyn StorageBackend>,
                spawner: Rc::new(move |future| {
                    spawner.spawn_local(future).expect("spawn on the test pool");
                }),
            },
            None,
            options,
        ))
        .unwrap();
    pool.run_until_stalled();
    runtime
}

/// Full harness with every endpoint succeeding.
fn boot(host: Rc<MockHost>, widgets: Value) -> Harness {
    let fetch = Rc::new(FakeFetch::new());
    install_routes(&fetch, widgets);
    fetch.on_success("/api/public/products/acme", sample_products());
    let visibility = Rc::new(FakeVisibility::new());
    let mut pool = LocalPool::new();
    let runtime = init_runtime(&mut pool, &host, &fetch, &visibility, None);
    Harness {
        host,
        visibility,
        fetch,
        runtime,
        pool: RefCell::new(pool),
    }
}

fn eager_container(host: &MockHost, widget_type: &str, attrs: &[(&str, &str)]) -> NodeId {
    let node = host.add_widget_container(widget_type, attrs);
    host.set_in_viewport(node, true);
    node
}

#[test]
fn scan_mounts_eager_containers_and_is_idempotent() {
    let host = Rc::new(MockHost::new());
    let a = eager_container(&host, "carousel", &[]);
    let b = eager_container(&host, "grid", &[]);

    let h = boot(Rc::clone(&host), json!([]));
    assert_eq!(h.runtime.stats().mounted, 2);
    assert!(h.host.has_class(a, "pwx-mounted"));
    assert!(h.host.has_class(b, "pwx-mounted"));
    assert!(!h.host.html_of(a).is_empty());

    h.host.clear_ops();
    let handled = h.run(h.runtime.scan()).unwrap();
    assert_eq!(handled, 0);
    assert!(h
        .host
        .ops_where(|op| matches!(op, DomOp::SetHtml { .. }))
        .is_empty());
}

#[test]
fn below_the_fold_containers_wait_for_visibility() {
    let host = Rc::new(MockHost::new());
    let node = host.add_widget_container("carousel", &[]);

    let h = boot(Rc::clone(&host), json!([]));
    assert_eq!(h.runtime.stats().mounted, 0);
    assert_eq!(h.runtime.stats().pending, 1);
    assert!(h.host.has_class(node, "pwx-pending"));
    assert!(h.visibility.is_observed(node));

    h.visibility.fire(node);
    h.drain();
    assert_eq!(h.runtime.stats().mounted, 1);
    assert_eq!(h.runtime.stats().pending, 0);
    assert!(!h.visibility.is_observed(node));
    assert!(h.host.has_class(node, "pwx-mounted"));
    assert_eq!(h.host.attr(node, "data-pwx-state").as_deref(), Some("mounted"));
}

#[test]
fn visibility_double_fire_mounts_once() {
    let host = Rc::new(MockHost::new());
    let node = host.add_widget_container("carousel", &[]);

    let h = boot(Rc::clone(&host), json!([]));
    h.visibility.fire(node);
    h.visibility.fire(node);
    h.drain();

    assert_eq!(h.runtime.widget_ids().len(), 1);
    assert_eq!(h.fetch.requests_to("/api/public/products/acme"), 1);
}

#[test]
fn immediate_attribute_overrides_lazy_loading() {
    let host = Rc::new(MockHost::new());
    let node = host.add_widget_container("carousel", &[("data-pwx-immediate", "")]);

    let h = boot(Rc::clone(&host), json!([]));
    assert!(h.host.has_class(node, "pwx-mounted"));
    assert_eq!(h.runtime.stats().pending, 0);
}

#[test]
fn lazy_loading_can_be_disabled_via_options() {
    let host = Rc::new(MockHost::new());
    let node = host.add_widget_container("carousel", &[]);

    let fetch = Rc::new(FakeFetch::new());
    install_routes(&fetch, json!([]));
    fetch.on_success("/api/public/products/acme", sample_products());
    let visibility = Rc::new(FakeVisibility::new());
    let mut pool = LocalPool::new();
    let runtime = init_runtime(
        &mut pool,
        &host,
        &fetch,
        &visibility,
        Some(&json!({"lazyLoad": false})),
    );

    assert!(host.has_class(node, "pwx-mounted"));
    assert_eq!(runtime.stats().pending, 0);
}

#[test]
fn unknown_widget_type_errors_without_stopping_the_scan() {
    let host = Rc::new(MockHost::new());
    let bad = eager_container(&host, "sparkle", &[]);
    let good = eager_container(&host, "carousel", &[]);

    let h = boot(Rc::clone(&host), json!([]));
    assert!(h.host.has_class(bad, "pwx-error"));
    assert!(h.host.has_class(good, "pwx-mounted"));
    assert_eq!(h.runtime.stats().mounted, 1);
}

#[test]
fn fetch_failure_marks_error_and_isolates_other_mounts() {
    let host = Rc::new(MockHost::new());
    let first = eager_container(&host, "carousel", &[]);
    let second = eager_container(&host, "carousel", &[]);

    let fetch = Rc::new(FakeFetch::new());
    install_routes(&fetch, json!([]));
    // Status errors do not retry: the first mount fails, the second
    // gets the sticky success.
    fetch.on_status("/api/public/products/acme", 500, json!({"success": false}));
    fetch.on_success("/api/public/products/acme", sample_products());
    let visibility = Rc::new(FakeVisibility::new());
    let mut pool = LocalPool::new();
    let runtime = init_runtime(&mut pool, &host, &fetch, &visibility, None);

    assert!(host.has_class(first, "pwx-error"));
    assert!(host.has_class(second, "pwx-mounted"));
    assert_eq!(runtime.stats().mounted, 1);
}

#[test]
fn mounting_emits_an_impression_event() {
    let host = Rc::new(MockHost::new());
    eager_container(&host, "carousel", &[("data-pwx-id", "hero")]);

    let h = boot(Rc::clone(&host), json!([]));
    let tracked: Vec<String> = h
        .fetch
        .requests()
        .into_iter()
        .filter(|r| r.url.contains("/api/public/track/acme"))
        .filter_map(|r| r.body)
        .collect();
    assert!(tracked
        .iter()
        .any(|body| body.contains("\"impression\"") && body.contains("\"hero\"")));
}

#[test]
fn product_clicks_are_tracked_with_the_product_id() {
    let host = Rc::new(MockHost::new());
    let node = eager_container(&host, "carousel", &[("data-pwx-id", "hero")]);

    let h = boot(Rc::clone(&host), json!([]));
    h.host.dispatch(HostEvent::ProductClick {
        container: node,
        product_id: "p1".into(),
    });
    h.drain();

    let tracked: Vec<String> = h
        .fetch
        .requests()
        .into_iter()
        .filter(|r| r.url.contains("/api/public/track/acme"))
        .filter_map(|r| r.body)
        .collect();
    assert!(tracked
        .iter()
        .any(|body| body.contains("\"click\"") && body.contains("\"p1\"")));
}

#[test]
fn server_placements_get_containers_created() {
    let host = Rc::new(MockHost::new());
    host.add_element("section", &[("id", "slot")]);

    let h = boot(
        Rc::clone(&host),
        json!([{"id": "w9", "type": "grid", "placement": "#slot", "settings": {}}]),
    );
    assert!(h
        .host
        .ops_where(|op| matches!(op, DomOp::CreateContainer { selector, .. } if selector == "#slot"))
        .len()
        == 1);
    // Created below the fold, so it queues rather than mounts.
    assert_eq!(h.runtime.stats().pending, 1);
    assert_eq!(h.host.query(None, "[data-pwx-id=\"w9\"]").len(), 1);
}

#[test]
fn destroy_unclaims_the_container_for_remounting() {
    let host = Rc::new(MockHost::new());
    let node = eager_container(&host, "carousel", &[("data-pwx-id", "hero")]);

    let h = boot(Rc::clone(&host), json!([]));
    assert!(h.runtime.destroy("hero"));
    assert!(!h.runtime.destroy("hero"));
    assert!(h.host.has_class(node, "pwx-destroyed"));
    assert!(h.runtime.widget_ids().is_empty());

    let handled = h.run(h.runtime.scan()).unwrap();
    assert_eq!(handled, 1);
    assert!(h.host.has_class(node, "pwx-mounted"));
    assert_eq!(h.runtime.widget_ids().len(), 1);
}

#[test]
fn refresh_refetches_inside_the_cache_ttl() {
    let host = Rc::new(MockHost::new());
    let node = eager_container(&host, "grid", &[("data-pwx-id", "g1")]);

    let h = boot(Rc::clone(&host), json!([]));
    assert!(h.host.html_of(node).contains("Trail Shoe"));
    assert_eq!(h.fetch.requests_to("/api/public/products/acme"), 1);

    // The catalogue changes server-side while the entry is still fresh.
    h.fetch.on_success(
        "/api/public/products/acme",
        json!({
            "products": [
                {"id": "p9", "title": "New Boot", "price": 120.0, "image": "i9", "url": "u9"}
            ],
            "total": 1
        }),
    );
    h.run(h.runtime.refresh("g1")).unwrap();

    assert_eq!(h.fetch.requests_to("/api/public/products/acme"), 2);
    assert!(h.host.html_of(node).contains("New Boot"));
    assert!(!h.host.html_of(node).contains("Trail Shoe"));
}

#[test]
fn refresh_all_survives_an_individual_failure() {
    let host = Rc::new(MockHost::new());
    eager_container(&host, "carousel", &[("data-pwx-id", "a")]);
    eager_container(&host, "carousel", &[("data-pwx-id", "b")]);

    let h = boot(Rc::clone(&host), json!([]));
    assert_eq!(h.runtime.widget_ids(), vec!["a".to_string(), "b".to_string()]);
    // Both mounts share one products URL, so the second was a cache hit.
    assert_eq!(h.fetch.requests_to("/api/public/products/acme"), 1);

    h.fetch
        .on_status("/api/public/products/acme", 500, json!({"success": false}));
    h.fetch
        .on_success("/api/public/products/acme", sample_products());
    h.run(h.runtime.refresh_all());

    // "a" failed, "b" refreshed; both stay mounted.
    assert_eq!(h.runtime.widget_ids(), vec!["a".to_string(), "b".to_string()]);
    assert_eq!(h.fetch.requests_to("/api/public/products/acme"), 3);
}

#[test]
fn configure_patches_and_reports_changed_keys() {
    let host = Rc::new(MockHost::new());
    let h = boot(Rc::clone(&host), json!([]));

    let changed = h
        .runtime
        .configure(&json!({"retryAttempts": 5, "cacheEnabled": false, "nonsense": 1}));
    assert_eq!(
        changed,
        vec!["cacheEnabled".to_string(), "retryAttempts".to_string()]
    );
    assert_eq!(h.runtime.config().retry_attempts, 5);
    assert!(!h.runtime.config().cache_enabled);
}

#[test]
fn set_theme_reapplies_css_vars_to_mounted_containers() {
    let host = Rc::new(MockHost::new());
    let node = eager_container(&host, "carousel", &[]);

    let h = boot(Rc::clone(&host), json!([]));
    h.runtime.set_theme(&json!({"primaryColor": "#ff0000"}));
    assert_eq!(
        h.host.css_var_of(node, "--pwx-primary").as_deref(),
        Some("#ff0000")
    );
    // Partial patch falls back to defaults elsewhere.
    assert_eq!(
        h.host.css_var_of(node, "--pwx-radius").as_deref(),
        Some("8px")
    );
}

#[test]
fn popup_opens_on_exit_intent_through_the_host_sink() {
    let host = Rc::new(MockHost::new());
    let node = eager_container(&host, "popup", &[("data-pwx-trigger", "exit-intent")]);

    let h = boot(Rc::clone(&host), json!([]));
    assert!(h.host.html_of(node).contains("pwx-hidden"));

    h.host.dispatch(HostEvent::ExitIntent);
    assert!(!h.host.html_of(node).contains("pwx-hidden"));
}

#[test]
fn queued_commands_drain_in_order() {
    let host = Rc::new(MockHost::new());
    eager_container(&host, "carousel", &[]);

    let h = boot(Rc::clone(&host), json!([]));
    h.runtime.drain_queue(vec![
        json!({"method": "trackSearch", "args": ["sneakers"]}),
        json!({"method": "configure", "args": [{"debug": true}]}),
        json!({"method": "unheard-of", "args": []}),
        json!({"method": "destroyAll"}),
    ]);
    h.drain();

    let recent = h.runtime.search().recent(10);
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].query, "sneakers");
    assert!(h.runtime.config().debug);
    assert!(h.runtime.widget_ids().is_empty());
}

#[test]
fn stats_snapshot_reflects_the_page() {
    let host = Rc::new(MockHost::new());
    eager_container(&host, "carousel", &[]);
    host.add_widget_container("grid", &[]);

    let h = boot(Rc::clone(&host), json!([]));
    let stats = h.runtime.stats_value();
    assert_eq!(stats["mounted"], json!(1));
    assert_eq!(stats["pending"], json!(1));
    assert_eq!(stats["ready"], json!(true));
    assert!(stats["registeredTypes"]
        .as_array()
        .unwrap()
        .contains(&json!("recently-viewed")));
}

#[test]
fn api_url_override_redirects_every_request() {
    let host = Rc::new(MockHost::new());
    eager_container(&host, "carousel", &[]);

    let fetch = Rc::new(FakeFetch::new());
    install_routes(&fetch, json!([]));
    fetch.on_success("/api/public/products/acme", sample_products());
    let visibility = Rc::new(FakeVisibility::new());
    let mut pool = LocalPool::new();
    let runtime = init_runtime(
        &mut pool,
        &host,
        &fetch,
        &visibility,
        Some(&json!({"apiUrl": "https://api.example"})),
    );

    assert_eq!(runtime.config().api_url, "https://api.example");
    assert!(!fetch.requests().is_empty());
    assert!(fetch
        .requests()
        .iter()
        .all(|r| r.url.starts_with("https://api.example/")));
}

#[test]
fn track_product_view_feeds_the_journey_and_analytics() {
    let host = Rc::new(MockHost::new());
    let h = boot(Rc::clone(&host), json!([]));

    let product: pwx_core::types::Product = serde_json::from_value(json!({
        "id": "p7", "title": "Hat", "price": 25.0, "image": "i", "url": "u"
    }))
    .unwrap();
    h.runtime.track_product_view(&product);
    h.drain();

    let viewed = h.runtime.products().recently_viewed(10);
    assert_eq!(viewed.len(), 1);
    let tracked: Vec<String> = h
        .fetch
        .requests()
        .into_iter()
        .filter(|r| r.url.contains("/api/public/track/acme"))
        .filter_map(|r| r.body)
        .collect();
    assert!(tracked.iter().any(|body| body.contains("\"product_view\"")));
}
