/// JSON routes translated to `user.v1.UserService` calls
use super::error::{render_body, render_status};
use super::GatewayState;
use crate::grpc::proto;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use error_types::{canonical_name, ErrorBody};
use grpc_interceptors::{OutboundInterceptor, TraceId};
use serde::{Deserialize, Serialize};
use tonic::metadata::AsciiMetadataValue;
use tonic::Code;
use tracing::debug;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterBody {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoginBody {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserView {
    pub id: i64,
    pub username: String,
    pub phone: String,
    pub email: String,
}

impl From<proto::User> for UserView {
    fn from(user: proto::User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            phone: user.phone,
            email: user.email,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserEnvelope {
    pub user: Option<UserView>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: Option<UserView>,
}

fn malformed_body(state: &GatewayState, rejection: JsonRejection) -> Response {
    debug!(error = %rejection.body_text(), "Rejected malformed JSON body");
    let body = ErrorBody::new(canonical_name(Code::InvalidArgument), rejection.body_text());
    render_body(StatusCode::BAD_REQUEST, &body, state.encoder())
}

/// `POST /v1/users/register`
pub async fn register(
    State(state): State<GatewayState>,
    Extension(trace_id): Extension<TraceId>,
    payload: Result<Json<RegisterBody>, JsonRejection>,
) -> Response {
    let Json(body) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return malformed_body(&state, rejection),
    };

    let mut client = state.client(OutboundInterceptor::new().with_trace_id(&trace_id));
    let request = proto::RegisterRequest {
        username: body.username,
        password: body.password,
        phone: body.phone,
        email: body.email,
    };

    match client.register(request).await {
        Ok(reply) => Json(UserEnvelope {
            user: reply.into_inner().user.map(UserView::from),
        })
        .into_response(),
        Err(status) => render_status(&status, state.encoder()),
    }
}

/// `POST /v1/users/login`
pub async fn login(
    State(state): State<GatewayState>,
    Extension(trace_id): Extension<TraceId>,
    payload: Result<Json<LoginBody>, JsonRejection>,
) -> Response {
    let Json(body) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return malformed_body(&state, rejection),
    };

    let mut client = state.client(OutboundInterceptor::new().with_trace_id(&trace_id));
    let request = proto::LoginRequest {
        username: body.username,
        password: body.password,
    };

    match client.login(request).await {
        Ok(reply) => {
            let reply = reply.into_inner();
            Json(LoginResponse {
                token: reply.token,
                user: reply.user.map(UserView::from),
            })
            .into_response()
        }
        Err(status) => render_status(&status, state.encoder()),
    }
}

/// `GET /v1/users/me`; the caller's `Authorization` header is forwarded as is.
pub async fn me(
    State(state): State<GatewayState>,
    Extension(trace_id): Extension<TraceId>,
    headers: HeaderMap,
) -> Response {
    let mut interceptor = OutboundInterceptor::new().with_trace_id(&trace_id);
    if let Some(value) = headers
        .get(AUTHORIZATION)
        .and_then(|value| AsciiMetadataValue::try_from(value.as_bytes()).ok())
    {
        interceptor = interceptor.with_authorization(value);
    }

    let mut client = state.client(interceptor);
    match client.get_my_profile(proto::GetMyProfileRequest {}).await {
        Ok(reply) => Json(UserEnvelope {
            user: reply.into_inner().user.map(UserView::from),
        })
        .into_response(),
        Err(status) => render_status(&status, state.encoder()),
    }
}
