//! Wire messages for `user.v1.UserService`
//!
//! The service and client stubs are generated by build.rs over these types.

/// Public view of an account; never carries the password hash.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct User {
    #[prost(int64, tag = "1")]
    pub id: i64,
    #[prost(string, tag = "2")]
    pub username: String,
    #[prost(string, tag = "3")]
    pub phone: String,
    #[prost(string, tag = "4")]
    pub email: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RegisterRequest {
    #[prost(string, tag = "1")]
    pub username: String,
    #[prost(string, tag = "2")]
    pub password: String,
    #[prost(string, tag = "3")]
    pub phone: String,
    #[prost(string, tag = "4")]
    pub email: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RegisterReply {
    #[prost(message, optional, tag = "1")]
    pub user: Option<User>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LoginRequest {
    #[prost(string, tag = "1")]
    pub username: String,
    #[prost(string, tag = "2")]
    pub password: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LoginReply {
    #[prost(string, tag = "1")]
    pub token: String,
    #[prost(message, optional, tag = "2")]
    pub user: Option<User>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetMyProfileRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetMyProfileReply {
    #[prost(message, optional, tag = "1")]
    pub user: Option<User>,
}

include!(concat!(env!("OUT_DIR"), "/user.v1.UserService.rs"));
