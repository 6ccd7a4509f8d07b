//! Stage chain
//!
//! Every RPC passes through an ordered list of [`Stage`]s before reaching its
//! [`Endpoint`]. A stage receives the context, the request and a [`Next`]
//! handle; calling [`Next::run`] hands control to the remaining stages. `run`
//! consumes the handle, so downstream work happens at most once per stage.
//!
//! Errors travel as `anyhow::Error` until the chain boundary, where anything
//! still unrendered is turned into a [`Status`] through the registry.

use crate::auth::{AuthCodes, AuthStage};
use crate::context::RequestContext;
use crate::errors::ErrorStage;
use crate::logging::LoggingStage;
use crate::metrics::{GrpcMetrics, MetricsStage};
use crate::recovery::RecoveryStage;
use crate::trace::TraceStage;
use crypto_core::TokenService;
use error_types::ErrorRegistry;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tonic::{Response, Status};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One link of the chain.
pub trait Stage<Req, Resp>: Send + Sync {
    /// Short name used in diagnostics.
    fn name(&self) -> &'static str;

    fn call<'a>(
        &'a self,
        ctx: RequestContext,
        req: Req,
        next: Next<'a, Req, Resp>,
    ) -> BoxFuture<'a, anyhow::Result<Resp>>;
}

/// Terminal handler of a chain.
pub trait Endpoint<Req, Resp>: Send + Sync {
    fn call<'a>(&'a self, ctx: RequestContext, req: Req) -> BoxFuture<'a, anyhow::Result<Resp>>;
}

/// Adapts an async closure into an [`Endpoint`].
pub fn endpoint_fn<Req, Resp, F, Fut>(f: F) -> FnEndpoint<F>
where
    F: Fn(RequestContext, Req) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Resp>> + Send + 'static,
{
    FnEndpoint { f }
}

#[derive(Clone)]
pub struct FnEndpoint<F> {
    f: F,
}

impl<Req, Resp, F, Fut> Endpoint<Req, Resp> for FnEndpoint<F>
where
    F: Fn(RequestContext, Req) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Resp>> + Send + 'static,
{
    fn call<'a>(&'a self, ctx: RequestContext, req: Req) -> BoxFuture<'a, anyhow::Result<Resp>> {
        Box::pin((self.f)(ctx, req))
    }
}

/// The rest of the chain, from the point of view of the current stage.
pub struct Next<'a, Req, Resp> {
    stages: &'a [Arc<dyn Stage<Req, Resp>>],
    endpoint: &'a dyn Endpoint<Req, Resp>,
}

impl<'a, Req, Resp> Next<'a, Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    pub fn run(self, ctx: RequestContext, req: Req) -> BoxFuture<'a, anyhow::Result<Resp>> {
        match self.stages.split_first() {
            Some((stage, rest)) => stage.call(
                ctx,
                req,
                Next {
                    stages: rest,
                    endpoint: self.endpoint,
                },
            ),
            None => self.endpoint.call(ctx, req),
        }
    }
}

/// An ordered list of stages in front of endpoints of one request type.
pub struct Chain<Req, Resp> {
    stages: Vec<Arc<dyn Stage<Req, Resp>>>,
    registry: Arc<ErrorRegistry>,
}

impl<Req, Resp> Chain<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    /// An empty chain. Errors escaping it are rendered through `registry`.
    pub fn new(registry: Arc<ErrorRegistry>) -> Self {
        Self {
            stages: Vec::new(),
            registry,
        }
    }

    /// Append a stage; the first appended runs outermost.
    pub fn with_stage<S>(mut self, stage: S) -> Self
    where
        S: Stage<Req, Resp> + 'static,
    {
        self.stages.push(Arc::new(stage));
        self
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Run `req` through every stage and then `endpoint`.
    pub async fn call<E>(&self, ctx: RequestContext, req: Req, endpoint: &E) -> Result<Resp, Status>
    where
        E: Endpoint<Req, Resp>,
    {
        let next = Next {
            stages: &self.stages,
            endpoint,
        };
        next.run(ctx, req)
            .await
            .map_err(|err| self.registry.into_status(err))
    }

    /// Serve a tonic request for the fully qualified `method`.
    ///
    /// Headers published by stages land on the response on success and on the
    /// status metadata on failure.
    pub async fn serve<E>(
        &self,
        method: &str,
        request: tonic::Request<Req>,
        endpoint: &E,
    ) -> Result<Response<Resp>, Status>
    where
        E: Endpoint<Req, Resp>,
    {
        let (metadata, _extensions, message) = request.into_parts();
        let ctx = RequestContext::new(method, metadata);
        let published = ctx.response_metadata().clone();

        match self.call(ctx, message, endpoint).await {
            Ok(reply) => {
                let mut response = Response::new(reply);
                published.apply_to(response.metadata_mut());
                Ok(response)
            }
            Err(mut status) => {
                published.apply_to(status.metadata_mut());
                Err(status)
            }
        }
    }
}

/// Builds chains with the standard stage order:
/// trace, logging, recovery, metrics, auth, error normalization.
#[derive(Clone)]
pub struct ChainBuilder {
    registry: Arc<ErrorRegistry>,
    tokens: Arc<TokenService>,
    metrics: Arc<GrpcMetrics>,
    auth_codes: AuthCodes,
}

impl ChainBuilder {
    pub fn new(
        registry: Arc<ErrorRegistry>,
        tokens: Arc<TokenService>,
        metrics: Arc<GrpcMetrics>,
        auth_codes: AuthCodes,
    ) -> Self {
        Self {
            registry,
            tokens,
            metrics,
            auth_codes,
        }
    }

    pub fn registry(&self) -> &Arc<ErrorRegistry> {
        &self.registry
    }

    pub fn build<Req, Resp>(&self) -> Chain<Req, Resp>
    where
        Req: Send + 'static,
        Resp: Send + 'static,
    {
        Chain::new(Arc::clone(&self.registry))
            .with_stage(TraceStage)
            .with_stage(LoggingStage::new(Arc::clone(&self.registry)))
            .with_stage(RecoveryStage::new(Arc::clone(&self.registry)))
            .with_stage(MetricsStage::new(
                Arc::clone(&self.metrics),
                Arc::clone(&self.registry),
            ))
            .with_stage(AuthStage::new(
                Arc::clone(&self.tokens),
                self.auth_codes.clone(),
            ))
            .with_stage(ErrorStage::new(Arc::clone(&self.registry)))
    }
}
