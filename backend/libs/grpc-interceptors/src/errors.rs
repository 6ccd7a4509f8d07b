//! Error normalization stage
//!
//! Innermost stage. Whatever the handler returns as an error is classified
//! through the registry, logged according to its kind and rendered as a
//! [`tonic::Status`] carrying the code detail. Outer stages only ever see
//! rendered statuses from handlers.

use crate::chain::{BoxFuture, Next, Stage};
use crate::context::RequestContext;
use error_types::ErrorRegistry;
use std::sync::Arc;

pub struct ErrorStage {
    registry: Arc<ErrorRegistry>,
}

impl ErrorStage {
    pub fn new(registry: Arc<ErrorRegistry>) -> Self {
        Self { registry }
    }
}

impl<Req, Resp> Stage<Req, Resp> for ErrorStage
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    fn name(&self) -> &'static str {
        "errors"
    }

    fn call<'a>(
        &'a self,
        ctx: RequestContext,
        req: Req,
        next: Next<'a, Req, Resp>,
    ) -> BoxFuture<'a, anyhow::Result<Resp>> {
        Box::pin(async move {
            next.run(ctx, req).await.map_err(|err| {
                let code = self.registry.from_error(err);
                code.log();
                anyhow::Error::new(code.to_status())
            })
        })
    }
}
