//! Client-side interceptor
//!
//! Carries the trace id, and optionally a caller's credential, onto outgoing
//! gRPC requests. The HTTP gateway uses it to forward each HTTP request to the
//! RPC server under the same trace id.

use crate::context::{TraceId, AUTHORIZATION_HEADER, TRACE_ID_HEADER};
use tonic::metadata::AsciiMetadataValue;
use tonic::service::Interceptor;
use tonic::{Request, Status};

/// Interceptor that injects `x-trace-id` and `authorization` metadata.
///
/// ```rust,no_run
/// use grpc_interceptors::{OutboundInterceptor, TraceId};
///
/// let interceptor = OutboundInterceptor::new()
///     .with_trace_id(&TraceId::generate())
///     .with_bearer_token("eyJhbGc...");
/// // let client = UserServiceClient::with_interceptor(channel, interceptor);
/// ```
#[derive(Debug, Clone, Default)]
pub struct OutboundInterceptor {
    trace_id: Option<AsciiMetadataValue>,
    authorization: Option<AsciiMetadataValue>,
}

impl OutboundInterceptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trace_id(mut self, trace_id: &TraceId) -> Self {
        self.trace_id = trace_id.to_metadata_value();
        self
    }

    /// Send `Bearer <token>`. A token that is not valid metadata is dropped.
    pub fn with_bearer_token(mut self, token: &str) -> Self {
        self.authorization = format!("Bearer {}", token).parse().ok();
        self
    }

    /// Forward an `authorization` value exactly as received.
    pub fn with_authorization(mut self, value: AsciiMetadataValue) -> Self {
        self.authorization = Some(value);
        self
    }
}

impl Interceptor for OutboundInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        if let Some(trace_id) = &self.trace_id {
            request
                .metadata_mut()
                .insert(TRACE_ID_HEADER, trace_id.clone());
        }
        if let Some(authorization) = &self.authorization {
            request
                .metadata_mut()
                .insert(AUTHORIZATION_HEADER, authorization.clone());
        }
        Ok(request)
    }
}
