/// gRPC server implementation for user-service
pub mod proto;
mod server;

pub use proto::user_service_client::UserServiceClient;
pub use proto::user_service_server::{UserService, UserServiceServer};
pub use server::{UserGrpcService, UserHandlers};

pub const REGISTER_METHOD: &str = "/user.v1.UserService/Register";
pub const LOGIN_METHOD: &str = "/user.v1.UserService/Login";
pub const GET_MY_PROFILE_METHOD: &str = "/user.v1.UserService/GetMyProfile";
