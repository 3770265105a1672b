//! # pwx-api — Public Widget API Client
//!
//! Thin typed client over the backend's public endpoints, with a
//! timeout/retry pipeline, URL-keyed response caching and parallel
//! aggregation of full widget payloads. Transport is abstracted behind
//! [`HttpFetch`] so the client is testable natively and runs over
//! `gloo-net` on wasm32.

#![forbid(unsafe_code)]

mod client;
mod error;
mod http;
#[cfg(any(test, feature = "test-support"))]
pub mod fake;
#[cfg(target_arch = "wasm32")]
pub mod web;

pub use client::{
    ApiClient, ApiClientConfig, ProductQuery, ProductsPayload, TrackEvent, WidgetConfigPayload,
};
pub use error::{ApiError, FetchError};
pub use http::{HttpFetch, HttpMethod, HttpRequest, HttpResponse};
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeFetch;
