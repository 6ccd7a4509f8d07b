//! Trace id stage
//!
//! Adopts the caller's `x-trace-id` when it is usable, otherwise mints one.
//! The id is attached to the context and echoed back in response metadata.

use crate::chain::{BoxFuture, Next, Stage};
use crate::context::{RequestContext, TraceId, TRACE_ID_HEADER};

#[derive(Debug, Clone, Copy, Default)]
pub struct TraceStage;

impl TraceStage {
    fn resolve(ctx: &RequestContext) -> TraceId {
        ctx.metadata()
            .get(TRACE_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(TraceId::parse)
            .unwrap_or_else(TraceId::generate)
    }
}

impl<Req, Resp> Stage<Req, Resp> for TraceStage
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    fn name(&self) -> &'static str {
        "trace"
    }

    fn call<'a>(
        &'a self,
        mut ctx: RequestContext,
        req: Req,
        next: Next<'a, Req, Resp>,
    ) -> BoxFuture<'a, anyhow::Result<Resp>> {
        let trace_id = Self::resolve(&ctx);
        if let Some(value) = trace_id.to_metadata_value() {
            ctx.response_metadata().insert(TRACE_ID_HEADER, value);
        }
        ctx.attach_trace_id(trace_id);
        next.run(ctx, req)
    }
}
