/// Business logic for user-service
pub mod user;

pub use user::UserUsecase;
