//! The typed client and its request pipeline.

use crate::error::{ApiError, FetchError};
use crate::http::{HttpFetch, HttpRequest};
use futures::future::try_join3;
use pwx_core::time::now_ms;
use pwx_core::types::{Product, Theme, WidgetData, WidgetDescriptor};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Entry count above which a cache insert sweeps expired entries.
const CACHE_SWEEP_THRESHOLD: usize = 100;
/// Linear backoff unit: attempt N waits N × this.
const BACKOFF_UNIT_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq)]
pub struct ApiClientConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_ms: u64,
    pub retry_attempts: u32,
    pub cache_enabled: bool,
    pub cache_ttl_ms: u64,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.pwx.dev".to_string(),
            api_key: None,
            timeout_ms: 10_000,
            retry_attempts: 2,
            cache_enabled: true,
            cache_ttl_ms: 300_000,
        }
    }
}

/// Filters for the products endpoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductQuery {
    pub campaign: Option<String>,
    pub category: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl ProductQuery {
    fn query_string(&self) -> String {
        let mut pairs: Vec<(&str, String)> = Vec::new();
        if let Some(campaign) = &self.campaign {
            pairs.push(("campaign", campaign.clone()));
        }
        if let Some(category) = &self.category {
            pairs.push(("category", category.clone()));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit", limit.to_string()));
        }
        if let Some(offset) = self.offset {
            pairs.push(("offset", offset.to_string()));
        }
        if pairs.is_empty() {
            return String::new();
        }
        let encoded: Vec<String> = pairs
            .iter()
            .map(|(k, v)| format!("{k}={}", encode_query_value(v)))
            .collect();
        format!("?{}", encoded.join("&"))
    }
}

/// Minimal percent-encoding for query values (slugs and numbers in
/// practice, but host pages do pass free text as campaign names).
fn encode_query_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// `GET /api/public/widget/{slug}` payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WidgetConfigPayload {
    pub customer_id: String,
    pub customer_slug: String,
    pub widgets: Vec<WidgetDescriptor>,
    pub theme: Theme,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProductsPayload {
    pub products: Vec<Product>,
    pub total: u64,
}

/// Analytics event for `POST /api/public/track/{slug}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub widget_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl TrackEvent {
    pub fn new(event_type: &str, widget_id: Option<&str>) -> Self {
        Self {
            event_type: event_type.to_string(),
            widget_id: widget_id.map(str::to_string),
            product_id: None,
            metadata: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    error: Option<String>,
}

struct CacheEntry {
    value: Value,
    expiry: u64,
}

pub struct ApiClient {
    fetch: Rc<dyn HttpFetch>,
    config: RefCell<ApiClientConfig>,
    cache: RefCell<HashMap<String, CacheEntry>>,
}

impl ApiClient {
    pub fn new(fetch: Rc<dyn HttpFetch>, config: ApiClientConfig) -> Self {
        Self {
            fetch,
            config: RefCell::new(config),
            cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn set_config(&self, config: ApiClientConfig) {
        *self.config.borrow_mut() = config;
    }

    pub fn clear_cache(&self) {
        self.cache.borrow_mut().clear();
    }

    pub fn cache_len(&self) -> usize {
        self.cache.borrow().len()
    }

    // ---- public endpoints ---------------------------------------------

    pub async fn get_widget_config(
        &self,
        slug: &str,
        widget_type: Option<&str>,
    ) -> Result<WidgetConfigPayload, ApiError> {
        let url = self.widget_config_url(slug, widget_type);
        let data = self.get_json(&url).await?;
        serde_json::from_value(data).map_err(|e| ApiError::Decode(e.to_string()))
    }

    pub async fn get_products(
        &self,
        slug: &str,
        query: &ProductQuery,
    ) -> Result<ProductsPayload, ApiError> {
        let url = self.products_url(slug, query);
        let data = self.get_json(&url).await?;
        serde_json::from_value(data).map_err(|e| ApiError::Decode(e.to_string()))
    }

    pub async fn get_theme(&self, slug: &str) -> Result<Theme, ApiError> {
        let url = self.theme_url(slug);
        let data = self.get_json(&url).await?;
        serde_json::from_value(data).map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Full widget payload: widget config, products and theme fetched in
    /// parallel; any failure fails the aggregate (the caller shows the
    /// container's error state).
    pub async fn get_widget_data(
        &self,
        slug: &str,
        widget_type: &str,
        query: &ProductQuery,
    ) -> Result<WidgetData, ApiError> {
        let (config, products, theme) = try_join3(
            self.get_widget_config(slug, Some(widget_type)),
            self.get_products(slug, query),
            self.get_theme(slug),
        )
        .await?;

        let descriptor = config
            .widgets
            .iter()
            .find(|w| w.widget_type.eq_ignore_ascii_case(widget_type))
            .cloned();

        Ok(WidgetData {
            products: products.products,
            theme,
            descriptor,
        })
    }

    /// Drop the cached responses behind one widget's data so the next
    /// [`Self::get_widget_data`] for it goes back to the server.
    pub fn invalidate_widget_data(&self, slug: &str, widget_type: &str, query: &ProductQuery) {
        let mut cache = self.cache.borrow_mut();
        cache.remove(&self.widget_config_url(slug, Some(widget_type)));
        cache.remove(&self.products_url(slug, query));
        cache.remove(&self.theme_url(slug));
    }

    /// Fire-and-forget analytics. Never returns an error and never
    /// retries; a lost event is cheaper than a blocked caller.
    pub async fn track_event(&self, slug: &str, event: &TrackEvent) {
        let base = self.config.borrow().base_url.clone();
        let url = format!("{}/api/public/track/{slug}", base.trim_end_matches('/'));
        let Ok(body) = serde_json::to_string(event) else {
            return;
        };
        let request = self.prepare(HttpRequest::post(url, body));
        if let Err(err) = self.fetch.send(request).await {
            log::debug!("pwx-api: track event dropped: {err}");
        }
    }

    /// `GET /api/health`; returns the reported status string.
    pub async fn health_check(&self) -> Result<String, ApiError> {
        let base = self.config.borrow().base_url.clone();
        let url = format!("{}/api/health", base.trim_end_matches('/'));
        let request = self.prepare(HttpRequest::get(&url));
        let response = self
            .send_with_retry(request)
            .await?;
        if !response.ok() {
            return Err(ApiError::Status {
                status: response.status,
                body: parse_lenient(&response.body),
            });
        }
        let body: Value = parse_lenient(&response.body);
        Ok(body
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string())
    }

    // ---- endpoint urls (doubling as cache keys) -----------------------

    fn widget_config_url(&self, slug: &str, widget_type: Option<&str>) -> String {
        let base = self.config.borrow().base_url.clone();
        let query = match widget_type {
            Some(t) => format!("?type={}", encode_query_value(t)),
            None => String::new(),
        };
        format!("{}/api/public/widget/{slug}{query}", base.trim_end_matches('/'))
    }

    fn products_url(&self, slug: &str, query: &ProductQuery) -> String {
        let base = self.config.borrow().base_url.clone();
        format!(
            "{}/api/public/products/{slug}{}",
            base.trim_end_matches('/'),
            query.query_string()
        )
    }

    fn theme_url(&self, slug: &str) -> String {
        let base = self.config.borrow().base_url.clone();
        format!("{}/api/public/theme/{slug}", base.trim_end_matches('/'))
    }

    // ---- pipeline -----------------------------------------------------

    fn prepare(&self, mut request: HttpRequest) -> HttpRequest {
        let config = self.config.borrow();
        request = request.timeout(config.timeout_ms);
        if let Some(key) = &config.api_key {
            request = request.header("X-API-Key", key);
        }
        request
    }

    async fn get_json(&self, url: &str) -> Result<Value, ApiError> {
        let cache_enabled = self.config.borrow().cache_enabled;
        if cache_enabled {
            if let Some(hit) = self.cache_get(url) {
                return Ok(hit);
            }
        }

        let request = self.prepare(HttpRequest::get(url));
        let response = self.send_with_retry(request).await?;

        if !response.ok() {
            return Err(ApiError::Status {
                status: response.status,
                body: parse_lenient(&response.body),
            });
        }

        let envelope: Envelope = serde_json::from_str(&response.body)
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        if !envelope.success {
            return Err(ApiError::Rejected {
                message: envelope.error.unwrap_or_else(|| "unspecified error".into()),
            });
        }

        if cache_enabled {
            self.cache_put(url, envelope.data.clone());
        }
        Ok(envelope.data)
    }

    /// Transport errors (timeout, network) retry with linear backoff;
    /// anything that produced a response does not.
    async fn send_with_retry(
        &self,
        request: HttpRequest,
    ) -> Result<crate::http::HttpResponse, ApiError> {
        let retries = self.config.borrow().retry_attempts;
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.fetch.send(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(err @ (FetchError::Timeout | FetchError::Network(_))) => {
                    if attempt > retries {
                        return Err(ApiError::Transport {
                            attempts: attempt,
                            source: err,
                        });
                    }
                    log::debug!(
                        "pwx-api: attempt {attempt} for {} failed ({err}), retrying",
                        request.url
                    );
                    self.fetch.sleep(BACKOFF_UNIT_MS * u64::from(attempt)).await;
                }
            }
        }
    }

    // ---- response cache -----------------------------------------------

    fn cache_get(&self, url: &str) -> Option<Value> {
        let mut cache = self.cache.borrow_mut();
        match cache.get(url) {
            Some(entry) if now_ms() <= entry.expiry => Some(entry.value.clone()),
            Some(_) => {
                cache.remove(url);
                None
            }
            None => None,
        }
    }

    fn cache_put(&self, url: &str, value: Value) {
        let ttl = self.config.borrow().cache_ttl_ms;
        let mut cache = self.cache.borrow_mut();
        cache.insert(
            url.to_string(),
            CacheEntry {
                value,
                expiry: now_ms() + ttl,
            },
        );
        if cache.len() > CACHE_SWEEP_THRESHOLD {
            let now = now_ms();
            cache.retain(|_, entry| entry.expiry >= now);
        }
    }
}

fn parse_lenient(body: &str) -> Value {
    serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeFetch;
    use futures::executor::block_on;
    use serde_json::json;

    fn client(fetch: Rc<FakeFetch>) -> ApiClient {
        ApiClient::new(fetch, ApiClientConfig {
            base_url: "https://api.test".into(),
            api_key: Some("secret".into()),
            timeout_ms: 5_000,
            retry_attempts: 2,
            cache_enabled: true,
            cache_ttl_ms: 60_000,
        })
    }

    fn sample_products() -> Value {
        json!({
            "products": [
                {"id": "p1", "title": "A", "price": 10.0, "image": "i", "url": "u"},
                {"id": "p2", "title": "B", "price": 20.0, "image": "i", "url": "u"}
            ],
            "total": 2
        })
    }

    #[test]
    fn transient_failures_retry_with_linear_backoff() {
        let fetch = Rc::new(FakeFetch::new());
        fetch.on("/products/", Err(FetchError::Timeout));
        fetch.on("/products/", Err(FetchError::Network("reset".into())));
        fetch.on_success("/products/", sample_products());

        let api = client(Rc::clone(&fetch));
        let payload = block_on(api.get_products("acme", &ProductQuery::default())).unwrap();
        assert_eq!(payload.products.len(), 2);
        assert_eq!(fetch.request_count(), 3);
        assert_eq!(fetch.sleeps(), vec![1000, 2000]);
    }

    #[test]
    fn retries_exhaust_into_transport_error() {
        let fetch = Rc::new(FakeFetch::new());
        fetch.on("/products/", Err(FetchError::Timeout));

        let api = client(Rc::clone(&fetch));
        let err = block_on(api.get_products("acme", &ProductQuery::default())).unwrap_err();
        match err {
            ApiError::Transport { attempts, source } => {
                assert_eq!(attempts, 3);
                assert_eq!(source, FetchError::Timeout);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(fetch.request_count(), 3);
    }

    #[test]
    fn status_errors_are_never_retried() {
        let fetch = Rc::new(FakeFetch::new());
        fetch.on_status("/theme/", 404, json!({"success": false, "error": "no such customer"}));

        let api = client(Rc::clone(&fetch));
        let err = block_on(api.get_theme("ghost")).unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert_eq!(fetch.request_count(), 1);
    }

    #[test]
    fn rejected_envelope_is_a_typed_error() {
        let fetch = Rc::new(FakeFetch::new());
        fetch.on_status("/widget/", 200, json!({"success": false, "error": "suspended"}));

        let api = client(Rc::clone(&fetch));
        match block_on(api.get_widget_config("acme", None)).unwrap_err() {
            ApiError::Rejected { message } => assert_eq!(message, "suspended"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn get_responses_are_cached_by_url() {
        let fetch = Rc::new(FakeFetch::new());
        fetch.on_success("/products/", sample_products());

        let api = client(Rc::clone(&fetch));
        block_on(api.get_products("acme", &ProductQuery::default())).unwrap();
        block_on(api.get_products("acme", &ProductQuery::default())).unwrap();
        assert_eq!(fetch.request_count(), 1);

        // Different query string, different cache key.
        let query = ProductQuery {
            campaign: Some("summer".into()),
            ..Default::default()
        };
        block_on(api.get_products("acme", &query)).unwrap();
        assert_eq!(fetch.request_count(), 2);
    }

    #[test]
    fn invalidation_refetches_one_widget_and_spares_the_rest() {
        let fetch = Rc::new(FakeFetch::new());
        fetch.on_success("/widget/acme", json!({"widgets": [], "theme": {}}));
        fetch.on_success("/products/acme", sample_products());
        fetch.on_success("/theme/acme", json!({}));

        let api = client(Rc::clone(&fetch));
        let query = ProductQuery::default();
        block_on(api.get_widget_data("acme", "grid", &query)).unwrap();
        assert_eq!(fetch.request_count(), 3);

        // Still within the TTL: the aggregate is served from cache.
        block_on(api.get_widget_data("acme", "grid", &query)).unwrap();
        assert_eq!(fetch.request_count(), 3);

        api.invalidate_widget_data("acme", "grid", &query);
        block_on(api.get_widget_data("acme", "grid", &query)).unwrap();
        assert_eq!(fetch.request_count(), 6);

        // A widget with a different query keeps its own entries.
        let campaign = ProductQuery {
            campaign: Some("summer".into()),
            ..Default::default()
        };
        block_on(api.get_widget_data("acme", "grid", &campaign)).unwrap();
        let before = fetch.request_count();
        api.invalidate_widget_data("acme", "grid", &query);
        block_on(api.get_products("acme", &campaign)).unwrap();
        assert_eq!(fetch.request_count(), before);
    }

    #[test]
    fn cache_can_be_disabled() {
        let fetch = Rc::new(FakeFetch::new());
        fetch.on_success("/products/", sample_products());

        let api = client(Rc::clone(&fetch));
        let mut config = api.config.borrow().clone();
        config.cache_enabled = false;
        api.set_config(config);

        block_on(api.get_products("acme", &ProductQuery::default())).unwrap();
        block_on(api.get_products("acme", &ProductQuery::default())).unwrap();
        assert_eq!(fetch.request_count(), 2);
    }

    #[test]
    fn expired_cache_entries_are_refetched() {
        let fetch = Rc::new(FakeFetch::new());
        fetch.on_success("/products/", sample_products());

        let api = client(Rc::clone(&fetch));
        let mut config = api.config.borrow().clone();
        config.cache_ttl_ms = 1;
        api.set_config(config);

        block_on(api.get_products("acme", &ProductQuery::default())).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));
        block_on(api.get_products("acme", &ProductQuery::default())).unwrap();
        assert_eq!(fetch.request_count(), 2);
    }

    #[test]
    fn oversized_cache_sweeps_expired_entries() {
        let fetch = Rc::new(FakeFetch::new());
        let api = client(Rc::clone(&fetch));
        let mut config = api.config.borrow().clone();
        config.cache_ttl_ms = 1;
        api.set_config(config);

        for i in 0..=CACHE_SWEEP_THRESHOLD {
            let path = format!("/theme/t{i}");
            fetch.on_success(&path, json!({}));
            block_on(api.get_theme(&format!("t{i}"))).unwrap();
        }
        std::thread::sleep(std::time::Duration::from_millis(10));
        fetch.on_success("/theme/last", json!({}));
        block_on(api.get_theme("last")).unwrap();
        // Everything expired got swept on the insert that crossed the
        // threshold; only the fresh entry remains.
        assert_eq!(api.cache_len(), 1);
    }

    #[test]
    fn widget_data_aggregates_three_endpoints() {
        let fetch = Rc::new(FakeFetch::new());
        fetch.on_success(
            "/widget/acme",
            json!({
                "customerId": "c1",
                "customerSlug": "acme",
                "widgets": [
                    {"id": "w1", "type": "carousel", "settings": {"slidesToShow": 2}}
                ],
                "theme": {}
            }),
        );
        fetch.on_success("/products/acme", sample_products());
        fetch.on_success("/theme/acme", json!({"primaryColor": "#123456"}));

        let api = client(Rc::clone(&fetch));
        let data =
            block_on(api.get_widget_data("acme", "carousel", &ProductQuery::default())).unwrap();
        assert_eq!(data.products.len(), 2);
        assert_eq!(data.theme.primary_color, "#123456");
        assert_eq!(data.descriptor.unwrap().id, "w1");
    }

    #[test]
    fn widget_data_fails_when_any_leg_fails() {
        let fetch = Rc::new(FakeFetch::new());
        fetch.on_success("/widget/acme", json!({"widgets": [], "theme": {}}));
        fetch.on_success("/products/acme", sample_products());
        fetch.on_status("/theme/acme", 500, json!({"success": false}));

        let api = client(Rc::clone(&fetch));
        // Status errors do not retry, so the aggregate fails fast.
        let err =
            block_on(api.get_widget_data("acme", "grid", &ProductQuery::default())).unwrap_err();
        assert_eq!(err.status(), Some(500));
    }

    #[test]
    fn track_event_swallows_failures() {
        let fetch = Rc::new(FakeFetch::new());
        // No route configured: transport error inside, none surfaced.
        let api = client(Rc::clone(&fetch));
        block_on(api.track_event("acme", &TrackEvent::new("impression", Some("w1"))));
        assert_eq!(fetch.request_count(), 1);
    }

    #[test]
    fn api_key_header_is_attached() {
        let fetch = Rc::new(FakeFetch::new());
        fetch.on_success("/products/", sample_products());

        let api = client(Rc::clone(&fetch));
        block_on(api.get_products("acme", &ProductQuery::default())).unwrap();
        let request = &fetch.requests()[0];
        assert!(request
            .headers
            .iter()
            .any(|(k, v)| k == "X-API-Key" && v == "secret"));
        assert_eq!(request.timeout_ms, 5_000);
    }

    #[test]
    fn query_string_is_encoded_and_ordered() {
        let query = ProductQuery {
            campaign: Some("summer sale".into()),
            category: Some("shoes".into()),
            limit: Some(12),
            offset: None,
        };
        assert_eq!(
            query.query_string(),
            "?campaign=summer%20sale&category=shoes&limit=12"
        );
    }
}
