use super::proto::{
    user_service_server::UserService, GetMyProfileReply, GetMyProfileRequest, LoginReply,
    LoginRequest, RegisterReply, RegisterRequest,
};
use super::{GET_MY_PROFILE_METHOD, LOGIN_METHOD, REGISTER_METHOD};
use crate::services::UserUsecase;
use anyhow::Context;
use crypto_core::TokenService;
use error_types::ErrorCode;
use grpc_interceptors::{BoxFuture, Chain, ChainBuilder, Endpoint, RequestContext};
use std::sync::Arc;
use tonic::{Request, Response, Status};

/// Terminal handlers behind the interceptor chains.
///
/// They return plain `anyhow` errors; the chain renders them.
#[derive(Clone)]
pub struct UserHandlers {
    usecase: Arc<UserUsecase>,
    tokens: Arc<TokenService>,
    token_invalid: ErrorCode,
}

impl UserHandlers {
    /// `token_invalid` is raised when a protected handler runs without claims.
    pub fn new(usecase: Arc<UserUsecase>, tokens: Arc<TokenService>, token_invalid: ErrorCode) -> Self {
        Self {
            usecase,
            tokens,
            token_invalid,
        }
    }
}

impl Endpoint<RegisterRequest, RegisterReply> for UserHandlers {
    fn call<'a>(
        &'a self,
        _ctx: RequestContext,
        req: RegisterRequest,
    ) -> BoxFuture<'a, anyhow::Result<RegisterReply>> {
        Box::pin(async move {
            let user = self.usecase.register(req.into()).await?;
            Ok(RegisterReply {
                user: Some(user.into()),
            })
        })
    }
}

impl Endpoint<LoginRequest, LoginReply> for UserHandlers {
    fn call<'a>(
        &'a self,
        _ctx: RequestContext,
        req: LoginRequest,
    ) -> BoxFuture<'a, anyhow::Result<LoginReply>> {
        Box::pin(async move {
            let user = self.usecase.login(&req.username, &req.password).await?;
            let token = self
                .tokens
                .issue(user.id, &user.username)
                .context("issue access token")?;

            Ok(LoginReply {
                token,
                user: Some(user.into()),
            })
        })
    }
}

impl Endpoint<GetMyProfileRequest, GetMyProfileReply> for UserHandlers {
    fn call<'a>(
        &'a self,
        ctx: RequestContext,
        _req: GetMyProfileRequest,
    ) -> BoxFuture<'a, anyhow::Result<GetMyProfileReply>> {
        Box::pin(async move {
            let subject_id = ctx
                .claims()
                .map(|claims| claims.subject_id)
                .ok_or_else(|| self.token_invalid.clone())?;

            let user = self.usecase.get_profile(subject_id).await?;
            Ok(GetMyProfileReply {
                user: Some(user.into()),
            })
        })
    }
}

/// `user.v1.UserService` with one interceptor chain per method.
pub struct UserGrpcService {
    handlers: UserHandlers,
    register: Chain<RegisterRequest, RegisterReply>,
    login: Chain<LoginRequest, LoginReply>,
    get_my_profile: Chain<GetMyProfileRequest, GetMyProfileReply>,
}

impl UserGrpcService {
    pub fn new(chains: &ChainBuilder, handlers: UserHandlers) -> Self {
        Self {
            handlers,
            register: chains.build(),
            login: chains.build(),
            get_my_profile: chains.build(),
        }
    }
}

#[tonic::async_trait]
impl UserService for UserGrpcService {
    async fn register(
        &self,
        request: Request<RegisterRequest>,
    ) -> Result<Response<RegisterReply>, Status> {
        self.register
            .serve(REGISTER_METHOD, request, &self.handlers)
            .await
    }

    async fn login(&self, request: Request<LoginRequest>) -> Result<Response<LoginReply>, Status> {
        self.login.serve(LOGIN_METHOD, request, &self.handlers).await
    }

    async fn get_my_profile(
        &self,
        request: Request<GetMyProfileRequest>,
    ) -> Result<Response<GetMyProfileReply>, Status> {
        self.get_my_profile
            .serve(GET_MY_PROFILE_METHOD, request, &self.handlers)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::startup::{assemble, ServiceParts};
    use crate::db::InMemoryUserRepository;
    use chrono::Duration;
    use crypto_core::TokenConfig;
    use error_types::StatusExt;
    use jsonwebtoken::Algorithm;
    use tonic::Code;

    fn service() -> UserGrpcService {
        let tokens = TokenService::new(TokenConfig {
            secret: "grpc-server-test-secret-0123456789abcdef".to_string(),
            algorithm: Algorithm::HS256,
            ttl: Duration::hours(1),
            whitelist: vec![REGISTER_METHOD.to_string(), LOGIN_METHOD.to_string()],
        })
        .unwrap();
        let ServiceParts { service, .. } = assemble(
            Arc::new(tokens),
            &prometheus::Registry::new(),
            |codes| Arc::new(InMemoryUserRepository::new(codes)),
        )
        .unwrap();
        service
    }

    fn alice() -> RegisterRequest {
        RegisterRequest {
            username: "alice".to_string(),
            password: "Secret123".to_string(),
            phone: "13800138000".to_string(),
            email: "alice@example.com".to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_login_profile() {
        let service = service();

        let registered = service.register(Request::new(alice())).await.unwrap();
        let user = registered.into_inner().user.unwrap();
        assert_eq!(user.username, "alice");

        let login = service
            .login(Request::new(LoginRequest {
                username: "alice".to_string(),
                password: "Secret123".to_string(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(!login.token.is_empty());

        let mut request = Request::new(GetMyProfileRequest {});
        request.metadata_mut().insert(
            "authorization",
            format!("Bearer {}", login.token).parse().unwrap(),
        );
        let profile = service.get_my_profile(request).await.unwrap().into_inner();
        assert_eq!(profile.user.unwrap().id, user.id);
    }

    #[tokio::test]
    async fn test_profile_requires_token() {
        let service = service();

        let status = service
            .get_my_profile(Request::new(GetMyProfileRequest {}))
            .await
            .unwrap_err();

        assert_eq!(status.code(), Code::Unauthenticated);
        assert_eq!(status.error_code(), Some("AUTH_REQUIRED"));
    }

    #[tokio::test]
    async fn test_wrong_password() {
        let service = service();
        service.register(Request::new(alice())).await.unwrap();

        let status = service
            .login(Request::new(LoginRequest {
                username: "alice".to_string(),
                password: "Wrong1234".to_string(),
            }))
            .await
            .unwrap_err();

        assert_eq!(status.code(), Code::Unauthenticated);
        assert_eq!(status.error_code(), Some("PASSWORD_INCORRECT"));
        assert_eq!(status.message(), "incorrect password");
    }

    #[tokio::test]
    async fn test_duplicate_registration() {
        let service = service();
        service.register(Request::new(alice())).await.unwrap();

        let status = service.register(Request::new(alice())).await.unwrap_err();

        assert_eq!(status.code(), Code::AlreadyExists);
        assert_eq!(status.error_code(), Some("USER_ALREADY_EXISTS"));
    }

    #[tokio::test]
    async fn test_invalid_registration_field() {
        let service = service();

        let status = service
            .register(Request::new(RegisterRequest {
                email: "nope".to_string(),
                ..alice()
            }))
            .await
            .unwrap_err();

        assert_eq!(status.code(), Code::InvalidArgument);
        assert_eq!(status.error_code(), Some("EMAIL_INVALID"));
    }
}
