//! Request logging stage
//!
//! Opens a `grpc_request` span carrying method and trace id, so every log line
//! emitted further down the chain is correlated, and logs one line per call
//! with its outcome and latency.

use crate::chain::{BoxFuture, Next, Stage};
use crate::context::RequestContext;
use error_types::{canonical_name, ErrorKind, ErrorRegistry};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, info_span, warn, Instrument};

pub struct LoggingStage {
    registry: Arc<ErrorRegistry>,
}

impl LoggingStage {
    pub fn new(registry: Arc<ErrorRegistry>) -> Self {
        Self { registry }
    }
}

impl<Req, Resp> Stage<Req, Resp> for LoggingStage
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    fn name(&self) -> &'static str {
        "logging"
    }

    fn call<'a>(
        &'a self,
        ctx: RequestContext,
        req: Req,
        next: Next<'a, Req, Resp>,
    ) -> BoxFuture<'a, anyhow::Result<Resp>> {
        let method = ctx.method().to_string();
        let trace_id = ctx
            .trace_id()
            .map(|trace_id| trace_id.to_string())
            .unwrap_or_default();
        let span = info_span!("grpc_request", method = %method, trace_id = %trace_id);

        Box::pin(
            async move {
                let start = Instant::now();
                let result = next.run(ctx, req).await;
                let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

                match &result {
                    Ok(_) => {
                        info!(method = %method, code = "OK", elapsed_ms, "request completed");
                    }
                    Err(err) => {
                        let code = self.registry.status_code_of(err);
                        match ErrorKind::from_code(code) {
                            ErrorKind::Client => info!(
                                method = %method,
                                code = canonical_name(code),
                                elapsed_ms,
                                "request rejected"
                            ),
                            ErrorKind::Internal | ErrorKind::ThirdParty => warn!(
                                method = %method,
                                code = canonical_name(code),
                                elapsed_ms,
                                "request failed"
                            ),
                        }
                    }
                }

                result
            }
            .instrument(span),
        )
    }
}
