//! Scripted transport for tests: canned responses matched by URL
//! substring, with a request and sleep log for retry accounting.

use crate::error::FetchError;
use crate::http::{HttpFetch, HttpRequest, HttpResponse};
use futures::future::LocalBoxFuture;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::VecDeque;

struct Route {
    url_substring: String,
    responses: VecDeque<Result<HttpResponse, FetchError>>,
    sticky: Option<Result<HttpResponse, FetchError>>,
}

#[derive(Default)]
pub struct FakeFetch {
    routes: RefCell<Vec<Route>>,
    requests: RefCell<Vec<HttpRequest>>,
    sleeps: RefCell<Vec<u64>>,
}

impl FakeFetch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one response for requests whose URL contains `url_substring`.
    /// The last queued response for a route becomes sticky once the queue
    /// drains.
    pub fn on(&self, url_substring: &str, response: Result<HttpResponse, FetchError>) {
        let mut routes = self.routes.borrow_mut();
        if let Some(route) = routes
            .iter_mut()
            .find(|r| r.url_substring == url_substring)
        {
            route.responses.push_back(response);
        } else {
            routes.push(Route {
                url_substring: url_substring.to_string(),
                responses: VecDeque::from([response]),
                sticky: None,
            });
        }
    }

    /// Shorthand for a 200 envelope `{"success": true, "data": ...}`.
    pub fn on_success(&self, url_substring: &str, data: Value) {
        let body = serde_json::json!({"success": true, "data": data}).to_string();
        self.on(url_substring, Ok(HttpResponse { status: 200, body }));
    }

    pub fn on_status(&self, url_substring: &str, status: u16, body: Value) {
        self.on(
            url_substring,
            Ok(HttpResponse {
                status,
                body: body.to_string(),
            }),
        );
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.borrow().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.borrow().len()
    }

    pub fn requests_to(&self, url_substring: &str) -> usize {
        self.requests
            .borrow()
            .iter()
            .filter(|r| r.url.contains(url_substring))
            .count()
    }

    /// Backoff sleeps observed, in ms.
    pub fn sleeps(&self) -> Vec<u64> {
        self.sleeps.borrow().clone()
    }

    fn respond(&self, request: &HttpRequest) -> Result<HttpResponse, FetchError> {
        let mut routes = self.routes.borrow_mut();
        let Some(route) = routes
            .iter_mut()
            .find(|r| request.url.contains(&r.url_substring))
        else {
            return Err(FetchError::Network(format!(
                "no fake route for {}",
                request.url
            )));
        };
        match route.responses.pop_front() {
            Some(response) => {
                if route.responses.is_empty() {
                    route.sticky = Some(response.clone());
                }
                response
            }
            None => route
                .sticky
                .clone()
                .unwrap_or_else(|| Err(FetchError::Network("route exhausted".into()))),
        }
    }
}

impl HttpFetch for FakeFetch {
    fn send(&self, request: HttpRequest) -> LocalBoxFuture<'_, Result<HttpResponse, FetchError>> {
        self.requests.borrow_mut().push(request.clone());
        let response = self.respond(&request);
        Box::pin(async move { response })
    }

    fn sleep(&self, ms: u64) -> LocalBoxFuture<'_, ()> {
        self.sleeps.borrow_mut().push(ms);
        Box::pin(async {})
    }
}
