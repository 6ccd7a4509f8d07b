/// Security utilities for user-service
pub mod password;

pub use password::{Argon2Hasher, PasswordHasher};
