//! gRPC request metrics
//!
//! Counts every call by method and outcome and records its latency. A call
//! that panics is recorded as `INTERNAL` before the panic continues outward to
//! the recovery stage; a call dropped before completion is recorded as
//! `CANCELLED`. Each call is counted exactly once.

use crate::chain::{BoxFuture, Next, Stage};
use crate::context::RequestContext;
use error_types::{canonical_name, ErrorRegistry};
use futures::FutureExt;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tonic::Code;

/// Collectors behind the `/metrics` endpoint for gRPC traffic.
#[derive(Clone)]
pub struct GrpcMetrics {
    requests_total: IntCounterVec,
    request_duration: HistogramVec,
}

impl GrpcMetrics {
    /// Create the collectors and register them on `registry`.
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let requests_total = IntCounterVec::new(
            Opts::new("grpc_requests_total", "Total number of gRPC requests"),
            &["method", "code"],
        )?;
        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "grpc_request_duration_seconds",
                "gRPC request latency in seconds",
            ),
            &["method"],
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;

        Ok(Self {
            requests_total,
            request_duration,
        })
    }

    fn record(&self, method: &str, code: Code, elapsed: Duration) {
        self.requests_total
            .with_label_values(&[method, canonical_name(code)])
            .inc();
        self.request_duration
            .with_label_values(&[method])
            .observe(elapsed.as_secs_f64());
    }

    /// Calls to `method` that finished with `code`.
    pub fn requests_total(&self, method: &str, code: Code) -> u64 {
        self.requests_total
            .with_label_values(&[method, canonical_name(code)])
            .get()
    }

    /// Latency samples observed for `method`.
    pub fn observed_calls(&self, method: &str) -> u64 {
        self.request_duration
            .with_label_values(&[method])
            .get_sample_count()
    }
}

/// Records `CANCELLED` unless finished first.
struct InFlight<'a> {
    metrics: &'a GrpcMetrics,
    method: String,
    start: Instant,
    finished: bool,
}

impl InFlight<'_> {
    fn finish(mut self, code: Code) {
        self.finished = true;
        self.metrics.record(&self.method, code, self.start.elapsed());
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.metrics
                .record(&self.method, Code::Cancelled, self.start.elapsed());
        }
    }
}

pub struct MetricsStage {
    metrics: Arc<GrpcMetrics>,
    registry: Arc<ErrorRegistry>,
}

impl MetricsStage {
    pub fn new(metrics: Arc<GrpcMetrics>, registry: Arc<ErrorRegistry>) -> Self {
        Self { metrics, registry }
    }
}

impl<Req, Resp> Stage<Req, Resp> for MetricsStage
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    fn name(&self) -> &'static str {
        "metrics"
    }

    fn call<'a>(
        &'a self,
        ctx: RequestContext,
        req: Req,
        next: Next<'a, Req, Resp>,
    ) -> BoxFuture<'a, anyhow::Result<Resp>> {
        let in_flight = InFlight {
            metrics: &self.metrics,
            method: ctx.method().to_string(),
            start: Instant::now(),
            finished: false,
        };

        Box::pin(async move {
            let outcome = AssertUnwindSafe(next.run(ctx, req)).catch_unwind().await;

            let code = match &outcome {
                Ok(Ok(_)) => Code::Ok,
                Ok(Err(err)) => self.registry.status_code_of(err),
                Err(_) => Code::Internal,
            };
            in_flight.finish(code);

            match outcome {
                Ok(result) => result,
                Err(payload) => std::panic::resume_unwind(payload),
            }
        })
    }
}
