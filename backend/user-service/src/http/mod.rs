/// HTTP/JSON gateway in front of the gRPC server
///
/// Each route becomes one `user.v1.UserService` call through a tonic client
/// carrying the request's trace id. gRPC failures are rendered by
/// [`error::render_status`].
pub mod admin;
pub mod error;
pub mod middleware;
pub mod users;

use crate::grpc::UserServiceClient;
use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use error::{panic_response, BodyEncoder, JsonEncoder};
use grpc_interceptors::OutboundInterceptor;
use middleware::{propagate_trace_id, track_metrics, HttpMetrics};
use std::sync::Arc;
use tonic::service::interceptor::InterceptedService;
use tonic::transport::Channel;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

type GatewayClient = UserServiceClient<InterceptedService<Channel, OutboundInterceptor>>;

/// Shared gateway state
#[derive(Clone)]
pub struct GatewayState {
    channel: Channel,
    encoder: Arc<dyn BodyEncoder>,
}

impl GatewayState {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            encoder: Arc::new(JsonEncoder),
        }
    }

    pub fn with_encoder(mut self, encoder: Arc<dyn BodyEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    fn client(&self, interceptor: OutboundInterceptor) -> GatewayClient {
        UserServiceClient::with_interceptor(self.channel.clone(), interceptor)
    }

    fn encoder(&self) -> &dyn BodyEncoder {
        self.encoder.as_ref()
    }
}

/// Build the gateway router.
///
/// Middleware, outermost first: trace id, request tracing, panic catching,
/// request metrics.
pub fn build_router(state: GatewayState, metrics: HttpMetrics) -> Router {
    Router::new()
        .route("/v1/users/register", post(users::register))
        .route("/v1/users/login", post(users::login))
        .route("/v1/users/me", get(users::me))
        .with_state(state)
        .layer(from_fn_with_state(metrics, track_metrics))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(propagate_trace_id))
}
