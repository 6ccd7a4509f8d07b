// Build script for user-service
// Generates the user.v1.UserService server and client over the hand-written
// prost messages in src/grpc/proto.rs, so no protoc is needed.
use tonic_build::manual::{Builder, Method, Service};

fn method(name: &str, route: &str, input: &str, output: &str) -> Method {
    Method::builder()
        .name(name)
        .route_name(route)
        .input_type(format!("crate::grpc::proto::{}", input))
        .output_type(format!("crate::grpc::proto::{}", output))
        .codec_path("tonic::codec::ProstCodec")
        .build()
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let user_service = Service::builder()
        .name("UserService")
        .package("user.v1")
        .method(method("register", "Register", "RegisterRequest", "RegisterReply"))
        .method(method("login", "Login", "LoginRequest", "LoginReply"))
        .method(method(
            "get_my_profile",
            "GetMyProfile",
            "GetMyProfileRequest",
            "GetMyProfileReply",
        ))
        .build();

    Builder::new().compile(&[user_service]);
}
