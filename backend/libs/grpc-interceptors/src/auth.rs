//! Authentication stage
//!
//! Extracts the bearer token from the `authorization` metadata, verifies it
//! and attaches the claims to the request context. Whitelisted routes skip
//! verification entirely.
//!
//! Failures are classified with three registered codes, all rendered as
//! `UNAUTHENTICATED`. Verification failures share one code and one message
//! whatever the reason; the reason itself is only logged.

use crate::chain::{BoxFuture, Next, Stage};
use crate::context::{RequestContext, AUTHORIZATION_HEADER};
use crypto_core::{Claims, TokenService};
use error_types::{ErrorCode, ErrorRegistry};
use std::sync::Arc;
use tonic::metadata::MetadataMap;
use tonic::Code;
use tracing::{debug, warn};

const BEARER: &str = "Bearer";

/// Codes raised by [`AuthStage`].
#[derive(Debug, Clone)]
pub struct AuthCodes {
    pub auth_required: ErrorCode,
    pub token_invalid_format: ErrorCode,
    pub token_invalid: ErrorCode,
}

impl AuthCodes {
    /// Register the authentication codes. Call once while building the registry.
    pub fn register(registry: &mut ErrorRegistry) -> Self {
        Self {
            auth_required: registry.register(
                "AUTH_REQUIRED",
                "authentication required",
                Code::Unauthenticated,
            ),
            token_invalid_format: registry.register(
                "TOKEN_INVALID_FORMAT",
                "invalid token format",
                Code::Unauthenticated,
            ),
            token_invalid: registry.register(
                "TOKEN_INVALID",
                "invalid or expired token",
                Code::Unauthenticated,
            ),
        }
    }
}

pub struct AuthStage {
    tokens: Arc<TokenService>,
    codes: AuthCodes,
}

impl AuthStage {
    pub fn new(tokens: Arc<TokenService>, codes: AuthCodes) -> Self {
        Self { tokens, codes }
    }

    /// Validate the credential carried in `metadata`.
    ///
    /// The header must be exactly `Bearer <token>` with a single space.
    pub fn authenticate(&self, metadata: &MetadataMap) -> Result<Claims, ErrorCode> {
        let header = metadata
            .get(AUTHORIZATION_HEADER)
            .ok_or_else(|| self.codes.auth_required.clone())?;

        let value = header
            .to_str()
            .map_err(|_| self.codes.token_invalid_format.clone())?;

        let token = match value.split(' ').collect::<Vec<_>>().as_slice() {
            [scheme, token] if *scheme == BEARER && !token.is_empty() => *token,
            _ => return Err(self.codes.token_invalid_format.clone()),
        };

        self.tokens.verify(token).map_err(|err| {
            let reason = err
                .invalid_reason()
                .map(|reason| reason.as_str())
                .unwrap_or("unknown");
            warn!(reason, "Token verification failed");
            self.codes.token_invalid.clone()
        })
    }
}

impl<Req, Resp> Stage<Req, Resp> for AuthStage
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    fn name(&self) -> &'static str {
        "auth"
    }

    fn call<'a>(
        &'a self,
        mut ctx: RequestContext,
        req: Req,
        next: Next<'a, Req, Resp>,
    ) -> BoxFuture<'a, anyhow::Result<Resp>> {
        if self.tokens.is_whitelisted(ctx.method()) {
            debug!(method = %ctx.method(), "Whitelisted route, skipping authentication");
            return next.run(ctx, req);
        }

        match self.authenticate(ctx.metadata()) {
            Ok(claims) => {
                debug!(subject_id = claims.subject_id, "Token verified");
                ctx.attach_claims(claims);
                next.run(ctx, req)
            }
            Err(code) => Box::pin(async move { Err(code.into()) }),
        }
    }
}
