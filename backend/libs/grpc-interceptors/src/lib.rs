//! Server-side interceptor chain for gRPC services
//!
//! Every RPC handled by the user service runs through the same ordered chain:
//!
//! 1. **trace**: adopt or mint the `x-trace-id` and echo it back
//! 2. **logging**: one span per call plus an outcome line with latency
//! 3. **recovery**: a panicking handler becomes an `INTERNAL` error
//! 4. **metrics**: request counts by method and code, latency histogram
//! 5. **auth**: bearer token verification unless the route is whitelisted
//! 6. **errors**: handler errors classified through the registry and rendered
//!
//! ## Usage
//!
//! ```rust,no_run
//! use grpc_interceptors::{endpoint_fn, AuthCodes, ChainBuilder, GrpcMetrics};
//! use crypto_core::{TokenConfig, TokenService};
//! use error_types::ErrorRegistry;
//! use std::sync::Arc;
//!
//! # fn example(config: TokenConfig) -> Result<(), Box<dyn std::error::Error>> {
//! let mut registry = ErrorRegistry::new();
//! let auth_codes = AuthCodes::register(&mut registry);
//! let metrics = GrpcMetrics::new(prometheus::default_registry())?;
//!
//! let builder = ChainBuilder::new(
//!     Arc::new(registry),
//!     Arc::new(TokenService::new(config)?),
//!     Arc::new(metrics),
//!     auth_codes,
//! );
//! let chain = builder.build::<String, String>();
//! let echo = endpoint_fn(|_ctx, req: String| async move { Ok(req) });
//! // chain.serve("/echo.v1.Echo/Say", request, &echo).await
//! # Ok(())
//! # }
//! ```

mod auth;
mod chain;
mod client;
mod context;
mod errors;
mod logging;
mod metrics;
mod recovery;
mod trace;

pub use auth::{AuthCodes, AuthStage};
pub use chain::{endpoint_fn, BoxFuture, Chain, ChainBuilder, Endpoint, FnEndpoint, Next, Stage};
pub use client::OutboundInterceptor;
pub use context::{
    RequestContext, ResponseMetadata, TraceId, AUTHORIZATION_HEADER, TRACE_ID_HEADER,
};
pub use errors::ErrorStage;
pub use logging::LoggingStage;
pub use metrics::{GrpcMetrics, MetricsStage};
pub use recovery::{install_panic_hook, RecoveryStage};
pub use trace::TraceStage;
