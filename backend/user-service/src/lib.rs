/// User Service Library
///
/// Account registration, login and profile lookup served over gRPC, with an
/// HTTP/JSON gateway translating the same operations.
pub mod config;
pub mod db;
pub mod error;
pub mod grpc;
pub mod http;
pub mod models;
pub mod security;
pub mod services;
pub mod startup;
pub mod validators;
