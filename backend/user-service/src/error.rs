//! Domain error codes
//!
//! Registered once at startup next to the authentication codes, then cloned
//! into the components that raise them.

use error_types::{ErrorCode, ErrorRegistry};
use tonic::Code;

/// Codes raised by the account use cases, repositories and validators.
#[derive(Debug, Clone)]
pub struct UserCodes {
    pub already_exists: ErrorCode,
    pub not_found: ErrorCode,
    pub password_incorrect: ErrorCode,
    pub username_invalid: ErrorCode,
    pub password_invalid: ErrorCode,
    pub email_invalid: ErrorCode,
    pub phone_invalid: ErrorCode,
}

impl UserCodes {
    pub fn register(registry: &mut ErrorRegistry) -> Self {
        Self {
            already_exists: registry.register(
                "USER_ALREADY_EXISTS",
                "user already exists",
                Code::AlreadyExists,
            ),
            not_found: registry.register("USER_NOT_FOUND", "user not found", Code::NotFound),
            password_incorrect: registry.register(
                "PASSWORD_INCORRECT",
                "incorrect password",
                Code::Unauthenticated,
            ),
            username_invalid: registry.register(
                "USERNAME_INVALID",
                "username must be 3-20 letters, digits or underscores",
                Code::InvalidArgument,
            ),
            password_invalid: registry.register(
                "PASSWORD_INVALID",
                "password must be 8-64 characters with upper and lower case letters and a digit",
                Code::InvalidArgument,
            ),
            email_invalid: registry.register(
                "EMAIL_INVALID",
                "email address is invalid",
                Code::InvalidArgument,
            ),
            phone_invalid: registry.register(
                "PHONE_INVALID",
                "phone number is invalid",
                Code::InvalidArgument,
            ),
        }
    }
}

/// Whether `err` carries `code`.
pub fn is_code(err: &anyhow::Error, code: &ErrorCode) -> bool {
    err.chain()
        .filter_map(|e| e.downcast_ref::<ErrorCode>())
        .any(|found| found.is(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_registered_with_statuses() {
        let mut registry = ErrorRegistry::new();
        let codes = UserCodes::register(&mut registry);

        assert_eq!(codes.not_found.status(), Code::NotFound);
        assert_eq!(codes.already_exists.status(), Code::AlreadyExists);
        assert_eq!(codes.password_incorrect.status(), Code::Unauthenticated);
        assert!(registry.get("PHONE_INVALID").is_some());
    }

    #[test]
    fn test_is_code_looks_through_context() {
        let codes = UserCodes::register(&mut ErrorRegistry::new());
        let err = anyhow::Error::new(codes.not_found.clone()).context("loading profile");

        assert!(is_code(&err, &codes.not_found));
        assert!(!is_code(&err, &codes.already_exists));
        assert!(!is_code(&anyhow::anyhow!("boom"), &codes.not_found));
    }
}
