//! Service assembly
//!
//! Builds the error registry, the interceptor chains and the use cases in the
//! order their dependencies require. Shared by `main` and the tests.

use crate::db::UserRepository;
use crate::error::UserCodes;
use crate::grpc::{UserGrpcService, UserHandlers};
use crate::security::Argon2Hasher;
use crate::services::UserUsecase;
use crate::validators::RuleValidator;
use anyhow::{Context, Result};
use crypto_core::TokenService;
use error_types::ErrorRegistry;
use grpc_interceptors::{AuthCodes, ChainBuilder, GrpcMetrics};
use std::sync::Arc;

pub struct ServiceParts {
    pub service: UserGrpcService,
    pub registry: Arc<ErrorRegistry>,
    pub codes: UserCodes,
}

/// Wire the gRPC service. `repository` receives the registered domain codes.
pub fn assemble<F>(
    tokens: Arc<TokenService>,
    metrics: &prometheus::Registry,
    repository: F,
) -> Result<ServiceParts>
where
    F: FnOnce(UserCodes) -> Arc<dyn UserRepository>,
{
    let mut registry = ErrorRegistry::new();
    let auth_codes = AuthCodes::register(&mut registry);
    let codes = UserCodes::register(&mut registry);
    let registry = Arc::new(registry);

    let grpc_metrics =
        Arc::new(GrpcMetrics::new(metrics).context("Failed to register gRPC metrics")?);

    let usecase = Arc::new(UserUsecase::new(
        repository(codes.clone()),
        Arc::new(Argon2Hasher),
        Arc::new(RuleValidator::new(codes.clone())),
        codes.clone(),
    ));

    let handlers = UserHandlers::new(
        usecase,
        Arc::clone(&tokens),
        auth_codes.token_invalid.clone(),
    );
    let chains = ChainBuilder::new(Arc::clone(&registry), tokens, grpc_metrics, auth_codes);

    Ok(ServiceParts {
        service: UserGrpcService::new(&chains, handlers),
        registry,
        codes,
    })
}
