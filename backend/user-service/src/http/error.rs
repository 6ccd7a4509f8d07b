//! Error rendering for the HTTP gateway
//!
//! A gRPC status becomes an HTTP status plus a `{code, message}` JSON body.
//! When the status carries the structured detail attached by the interceptor
//! chain, its code and message are used verbatim; otherwise the canonical
//! status name and the HTTP reason phrase stand in.

use axum::http::{header::CONTENT_TYPE, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use error_types::{canonical_name, http_status_from_code, ErrorBody, ErrorDetail};
use std::any::Any;
use tonic::Status;
use tracing::error;

/// Served when the error body itself cannot be encoded.
pub const FALLBACK_BODY: &str =
    r#"{"code":"INTERNAL","message":"An internal error occurred while processing the error response"}"#;

const JSON_CONTENT_TYPE: &str = "application/json";

/// Serializes error bodies.
pub trait BodyEncoder: Send + Sync {
    fn encode(&self, body: &ErrorBody) -> anyhow::Result<Bytes>;

    fn content_type(&self) -> &'static str {
        JSON_CONTENT_TYPE
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEncoder;

impl BodyEncoder for JsonEncoder {
    fn encode(&self, body: &ErrorBody) -> anyhow::Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(body)?))
    }
}

/// Render a gRPC status for an HTTP caller.
pub fn render_status(status: &Status, encoder: &dyn BodyEncoder) -> Response {
    let http_status = http_status_from_code(status.code());

    let body = match ErrorDetail::from_status(status) {
        Some(detail) => ErrorBody::new(detail.code, detail.message),
        None => ErrorBody::new(
            canonical_name(status.code()),
            http_status.canonical_reason().unwrap_or("Unknown Error"),
        ),
    };

    render_body(http_status, &body, encoder)
}

/// Encode `body` with `encoder`, or serve [`FALLBACK_BODY`] if that fails.
pub fn render_body(http_status: StatusCode, body: &ErrorBody, encoder: &dyn BodyEncoder) -> Response {
    match encoder.encode(body) {
        Ok(bytes) => (http_status, [(CONTENT_TYPE, encoder.content_type())], bytes).into_response(),
        Err(e) => {
            error!(error = %e, code = %body.code, "Failed to encode error response body");
            fallback_response()
        }
    }
}

pub fn fallback_response() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [(CONTENT_TYPE, JSON_CONTENT_TYPE)],
        FALLBACK_BODY,
    )
        .into_response()
}

/// Response for a panic caught by the gateway's panic layer.
pub fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());

    error!(event = "panic_recovered", panic = %message, "Recovered from panic in HTTP handler");
    fallback_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use error_types::{ErrorRegistry, ERROR_CODE_HEADER};
    use tonic::Code;

    struct FailingEncoder;

    impl BodyEncoder for FailingEncoder {
        fn encode(&self, _body: &ErrorBody) -> anyhow::Result<Bytes> {
            anyhow::bail!("encoder unavailable")
        }
    }

    async fn body_of(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_detail_is_used_verbatim() {
        let mut registry = ErrorRegistry::new();
        let not_found = registry.register("USER_NOT_FOUND", "user not found", Code::NotFound);

        let response = render_status(&not_found.to_status(), &JsonEncoder);

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(
            body_of(response).await,
            r#"{"code":"USER_NOT_FOUND","message":"user not found"}"#
        );
    }

    #[tokio::test]
    async fn test_status_without_detail_gets_generic_body() {
        let status = Status::unavailable("tcp connect error: 10.0.0.7:9000");

        let response = render_status(&status, &JsonEncoder);

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_of(response).await;
        assert_eq!(body, r#"{"code":"UNAVAILABLE","message":"Service Unavailable"}"#);
    }

    #[tokio::test]
    async fn test_metadata_code_alone_is_not_trusted() {
        let mut status = Status::internal("boom");
        status
            .metadata_mut()
            .insert(ERROR_CODE_HEADER, "USER_NOT_FOUND".parse().unwrap());

        let body = body_of(render_status(&status, &JsonEncoder)).await;

        assert_eq!(body, r#"{"code":"INTERNAL","message":"Internal Server Error"}"#);
    }

    #[tokio::test]
    async fn test_encoder_failure_serves_fallback() {
        let status = Status::not_found("missing");

        let response = render_status(&status, &FailingEncoder);

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_of(response).await, FALLBACK_BODY);
    }

    #[tokio::test]
    async fn test_panic_response_is_fallback() {
        let response = panic_response(Box::new("handler exploded"));

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_of(response).await, FALLBACK_BODY);
    }
}
