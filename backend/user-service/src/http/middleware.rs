/// Gateway middleware: trace id propagation and request metrics
use axum::{
    extract::{MatchedPath, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use grpc_interceptors::{TraceId, TRACE_ID_HEADER};
use prometheus::{IntCounterVec, Opts, Registry};

/// Adopt the caller's `x-trace-id` or mint one, expose it to handlers as an
/// extension and echo it on the response.
pub async fn propagate_trace_id(mut request: Request, next: Next) -> Response {
    let trace_id = request
        .headers()
        .get(TRACE_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(TraceId::parse)
        .unwrap_or_else(TraceId::generate);

    request.extensions_mut().insert(trace_id.clone());

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(trace_id.as_str()) {
        response.headers_mut().insert(TRACE_ID_HEADER, value);
    }
    response
}

/// HTTP request counter behind the `/metrics` endpoint.
#[derive(Clone)]
pub struct HttpMetrics {
    requests_total: IntCounterVec,
}

impl HttpMetrics {
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests"),
            &["method", "path", "code"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;
        Ok(Self { requests_total })
    }

    pub fn requests_total(&self, method: &str, path: &str, code: u16) -> u64 {
        self.requests_total
            .with_label_values(&[method, path, &code.to_string()])
            .get()
    }
}

/// Count each request by method, route template and response status.
pub async fn track_metrics(
    State(metrics): State<HttpMetrics>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    // Route templates keep label cardinality bounded.
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;

    metrics
        .requests_total
        .with_label_values(&[&method, &path, response.status().as_str()])
        .inc();
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::Request as HttpRequest,
        middleware::{from_fn, from_fn_with_state},
        routing::get,
        Extension, Router,
    };
    use tower::ServiceExt;

    async fn echo_trace(Extension(trace_id): Extension<TraceId>) -> String {
        trace_id.to_string()
    }

    fn router(metrics: HttpMetrics) -> Router {
        Router::new()
            .route("/items/:id", get(echo_trace))
            .layer(from_fn_with_state(metrics, track_metrics))
            .layer(from_fn(propagate_trace_id))
    }

    #[tokio::test]
    async fn test_trace_id_reaches_handler_and_response() {
        let metrics = HttpMetrics::new(&Registry::new()).unwrap();
        let request = HttpRequest::get("/items/7")
            .header(TRACE_ID_HEADER, "abc-123")
            .body(Body::empty())
            .unwrap();

        let response = router(metrics).oneshot(request).await.unwrap();

        assert_eq!(response.headers()[TRACE_ID_HEADER], "abc-123");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"abc-123");
    }

    #[tokio::test]
    async fn test_invalid_trace_id_is_replaced() {
        let metrics = HttpMetrics::new(&Registry::new()).unwrap();
        let request = HttpRequest::get("/items/7")
            .header(TRACE_ID_HEADER, "")
            .body(Body::empty())
            .unwrap();

        let response = router(metrics).oneshot(request).await.unwrap();

        assert!(!response.headers()[TRACE_ID_HEADER].is_empty());
    }

    #[tokio::test]
    async fn test_requests_counted_by_route_template() {
        let metrics = HttpMetrics::new(&Registry::new()).unwrap();
        let app = router(metrics.clone());

        for id in ["1", "2"] {
            let request = HttpRequest::get(format!("/items/{}", id))
                .body(Body::empty())
                .unwrap();
            app.clone().oneshot(request).await.unwrap();
        }

        assert_eq!(metrics.requests_total("GET", "/items/:id", 200), 2);
    }
}
