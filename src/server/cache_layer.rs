//! Read-through caching of GET responses, applied per handler with [`axum::handler::Handler::layer`].

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{header, HeaderName, HeaderValue, Method, StatusCode, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};

use crate::cache::{CacheKeys, ResponseCache};

/// Header marking whether a response came from the cache.
pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

type KeyFn = Arc<dyn Fn(&Uri) -> String + Send + Sync>;

/// What to cache and for how long.
#[derive(Clone)]
pub struct CachePolicy {
    cache: Option<Arc<dyn ResponseCache>>,
    ttl: Duration,
    key_fn: KeyFn,
}

impl CachePolicy {
    /// Caches under `keys.for_path(path?query)` for `ttl`. A `None` cache passes every
    /// request through.
    pub fn new(cache: Option<Arc<dyn ResponseCache>>, ttl: Duration, keys: CacheKeys) -> Self {
        Self {
            cache,
            ttl,
            key_fn: Arc::new(move |uri: &Uri| {
                let path = uri
                    .path_and_query()
                    .map_or_else(|| uri.path(), |pq| pq.as_str());
                keys.for_path(path)
            }),
        }
    }

    /// Replaces the key derivation.
    pub fn with_key_fn(mut self, key_fn: impl Fn(&Uri) -> String + Send + Sync + 'static) -> Self {
        self.key_fn = Arc::new(key_fn);
        self
    }
}

impl std::fmt::Debug for CachePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachePolicy")
            .field("cache", &self.cache)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

/// Serves a GET from the cache when possible, otherwise runs the handler and caches its body
/// if the status is `200 OK`.
pub async fn cache_responses(
    State(policy): State<CachePolicy>,
    request: Request,
    next: Next,
) -> Response {
    let Some(cache) = policy.cache.as_ref() else {
        return next.run(request).await;
    };
    if request.method() != Method::GET {
        return next.run(request).await;
    }

    let key = (policy.key_fn)(request.uri());
    if let Some(body) = cache.get(&key) {
        debug!(%key, "Cache hit");
        return (
            [
                (header::CONTENT_TYPE, HeaderValue::from_static("application/json")),
                (X_CACHE, HeaderValue::from_static("hit")),
            ],
            body,
        )
            .into_response();
    }

    let response = next.run(request).await;
    if response.status() != StatusCode::OK {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(%key, "Failed to buffer response for caching: {e}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    match std::str::from_utf8(&bytes) {
        Ok(text) => cache.set_with_ttl(&key, text.to_owned(), policy.ttl),
        Err(_) => warn!(%key, "Response body is not UTF-8, not caching"),
    }
    parts.headers.insert(X_CACHE, HeaderValue::from_static("miss"));
    Response::from_parts(parts, Body::from(bytes))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::{middleware::from_fn_with_state, routing::get, Router};
    use tower::ServiceExt;

    use super::*;
    use crate::cache::MemoryResponseCache;

    fn counting_app(policy: CachePolicy, calls: Arc<AtomicUsize>) -> Router {
        let handler = move || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                "[]"
            }
        };
        Router::new().route(
            "/api/products",
            get(handler).layer(from_fn_with_state(policy, cache_responses)),
        )
    }

    async fn cache_header(app: &Router, uri: &str) -> Option<String> {
        let request = axum::http::Request::builder()
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(StatusCode::OK, response.status());
        response
            .headers()
            .get(X_CACHE)
            .map(|value| value.to_str().unwrap().to_string())
    }

    #[tokio::test]
    async fn custom_key_fn_decides_which_requests_share_an_entry() {
        let cache = Arc::new(MemoryResponseCache::new(1 << 20));
        let policy = CachePolicy::new(
            Some(cache.clone() as Arc<dyn ResponseCache>),
            Duration::from_secs(60),
            CacheKeys::new("test:"),
        )
        .with_key_fn(|uri: &Uri| format!("test:{}", uri.path()));
        let calls = Arc::new(AtomicUsize::new(0));
        let app = counting_app(policy, calls.clone());

        assert_eq!(Some("miss".to_string()), cache_header(&app, "/api/products?page=1").await);
        assert_eq!(Some("hit".to_string()), cache_header(&app, "/api/products?page=2").await);
        assert_eq!(1, calls.load(Ordering::SeqCst));
        assert_eq!(Some("[]".to_string()), cache.get("test:/api/products"));
    }

    #[tokio::test]
    async fn default_key_includes_the_query() {
        let cache = Arc::new(MemoryResponseCache::new(1 << 20));
        let policy = CachePolicy::new(
            Some(cache.clone() as Arc<dyn ResponseCache>),
            Duration::from_secs(60),
            CacheKeys::new("test:"),
        );
        let calls = Arc::new(AtomicUsize::new(0));
        let app = counting_app(policy, calls.clone());

        cache_header(&app, "/api/products?page=1").await;
        assert_eq!(Some("miss".to_string()), cache_header(&app, "/api/products?page=2").await);
        assert_eq!(2, calls.load(Ordering::SeqCst));
        assert!(cache.get("test:/api/products?page=1").is_some());
    }

    #[tokio::test]
    async fn without_a_cache_requests_pass_through() {
        let policy = CachePolicy::new(None, Duration::from_secs(60), CacheKeys::new("test:"));
        let calls = Arc::new(AtomicUsize::new(0));
        let app = counting_app(policy, calls.clone());

        assert_eq!(None, cache_header(&app, "/api/products").await);
        assert_eq!(None, cache_header(&app, "/api/products").await);
        assert_eq!(2, calls.load(Ordering::SeqCst));
    }
}
