//! Browser transport over `gloo-net`, with `AbortController`-backed
//! timeouts.

use crate::error::FetchError;
use crate::http::{HttpFetch, HttpMethod, HttpRequest, HttpResponse};
use futures::future::{select, Either, LocalBoxFuture};
use wasm_bindgen::JsValue;

pub struct GlooFetch;

impl GlooFetch {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GlooFetch {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpFetch for GlooFetch {
    fn send(&self, request: HttpRequest) -> LocalBoxFuture<'_, Result<HttpResponse, FetchError>> {
        Box::pin(async move {
            let controller = web_sys::AbortController::new()
                .map_err(|e| FetchError::Network(describe_js(&e)))?;
            let signal = controller.signal();

            let fetch = Box::pin(perform(&request, &signal));
            let deadline = Box::pin(sleep_ms(request.timeout_ms));
            match select(fetch, deadline).await {
                Either::Left((result, _)) => result,
                Either::Right(((), _)) => {
                    controller.abort();
                    Err(FetchError::Timeout)
                }
            }
        })
    }

    fn sleep(&self, ms: u64) -> LocalBoxFuture<'_, ()> {
        Box::pin(sleep_ms(ms))
    }
}

async fn perform(
    request: &HttpRequest,
    signal: &web_sys::AbortSignal,
) -> Result<HttpResponse, FetchError> {
    let mut builder = match request.method {
        HttpMethod::Get => gloo_net::http::Request::get(&request.url),
        HttpMethod::Post => gloo_net::http::Request::post(&request.url),
    };
    for (name, value) in &request.headers {
        builder = builder.header(name, value);
    }
    builder = builder.abort_signal(Some(signal));

    let built = match &request.body {
        Some(body) => builder.body(body.clone()),
        None => builder.build(),
    }
    .map_err(|e| FetchError::Network(e.to_string()))?;

    let response = built
        .send()
        .await
        .map_err(|e| FetchError::Network(e.to_string()))?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| FetchError::Network(e.to_string()))?;
    Ok(HttpResponse { status, body })
}

/// Resolve after `ms` via `setTimeout`. Resolves immediately outside a
/// window context (workers are out of scope).
async fn sleep_ms(ms: u64) {
    let promise = js_sys::Promise::new(&mut |resolve, _reject| {
        let scheduled = web_sys::window().and_then(|window| {
            window
                .set_timeout_with_callback_and_timeout_and_arguments_0(&resolve, ms as i32)
                .ok()
        });
        if scheduled.is_none() {
            let _ = resolve.call0(&JsValue::NULL);
        }
    });
    let _ = wasm_bindgen_futures::JsFuture::from(promise).await;
}

fn describe_js(value: &JsValue) -> String {
    value
        .as_string()
        .unwrap_or_else(|| format!("{value:?}"))
}
