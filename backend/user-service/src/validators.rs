use crate::error::UserCodes;
use crate::models::NewUser;
use error_types::ErrorCode;
use once_cell::sync::Lazy;
use regex::Regex;
use validator::ValidateEmail;

/// Input validation for account registration

// Compile regex patterns once at startup
// These patterns are hardcoded and always valid, so we use expect() with explicit reasoning
static USERNAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_]{3,20}$")
        .expect("hardcoded username regex is invalid - fix source code")
});

static PHONE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^1[3-9]\d{9}$").expect("hardcoded phone regex is invalid - fix source code")
});

/// Field-level validation boundary.
#[cfg_attr(test, mockall::automock)]
pub trait Validator: Send + Sync {
    /// The first failing field's code, or `Ok`.
    fn validate(&self, user: &NewUser) -> Result<(), ErrorCode>;
}

/// Username, password, phone and email rules, checked in that order.
#[derive(Debug, Clone)]
pub struct RuleValidator {
    codes: UserCodes,
}

impl RuleValidator {
    pub fn new(codes: UserCodes) -> Self {
        Self { codes }
    }

    fn username(&self, username: &str) -> Result<(), ErrorCode> {
        if username.is_empty() {
            return Err(self.codes.username_invalid.with_message("username is required"));
        }
        if !USERNAME_REGEX.is_match(username) {
            return Err(self.codes.username_invalid.clone());
        }
        Ok(())
    }

    fn password(&self, password: &str) -> Result<(), ErrorCode> {
        if password.is_empty() {
            return Err(self.codes.password_invalid.with_message("password is required"));
        }
        if !is_strong_password(password) {
            return Err(self.codes.password_invalid.clone());
        }
        Ok(())
    }

    fn phone(&self, phone: &str) -> Result<(), ErrorCode> {
        if phone.is_empty() {
            return Err(self.codes.phone_invalid.with_message("phone is required"));
        }
        if !PHONE_REGEX.is_match(phone) {
            return Err(self.codes.phone_invalid.clone());
        }
        Ok(())
    }

    fn email(&self, email: &str) -> Result<(), ErrorCode> {
        if email.is_empty() {
            return Err(self.codes.email_invalid.with_message("email is required"));
        }
        if !email.validate_email() {
            return Err(self.codes.email_invalid.clone());
        }
        Ok(())
    }
}

impl Validator for RuleValidator {
    fn validate(&self, user: &NewUser) -> Result<(), ErrorCode> {
        self.username(&user.username)?;
        self.password(&user.password)?;
        self.phone(&user.phone)?;
        self.email(&user.email)
    }
}

/// 8-64 characters, at least one lowercase, one uppercase and one digit, no whitespace.
fn is_strong_password(password: &str) -> bool {
    let length = password.chars().count();
    if !(8..=64).contains(&length) {
        return false;
    }

    let has_lowercase = password.chars().any(|c| c.is_ascii_lowercase());
    let has_uppercase = password.chars().any(|c| c.is_ascii_uppercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_whitespace = password.chars().any(char::is_whitespace);

    has_lowercase && has_uppercase && has_digit && !has_whitespace
}

#[cfg(test)]
mod tests {
    use super::*;
    use error_types::ErrorRegistry;

    fn validator() -> RuleValidator {
        RuleValidator::new(UserCodes::register(&mut ErrorRegistry::new()))
    }

    fn valid_user() -> NewUser {
        NewUser {
            username: "alice_01".to_string(),
            password: "Secret123".to_string(),
            phone: "13800138000".to_string(),
            email: "alice@example.com".to_string(),
        }
    }

    fn code_of(user: NewUser) -> Option<String> {
        validator()
            .validate(&user)
            .err()
            .map(|code| code.code().to_string())
    }

    #[test]
    fn test_valid_user_passes() {
        assert!(validator().validate(&valid_user()).is_ok());
    }

    #[test]
    fn test_invalid_username() {
        for username in ["ab", "user name", "user-name", &"a".repeat(21)] {
            let user = NewUser {
                username: username.to_string(),
                ..valid_user()
            };
            assert_eq!(code_of(user).as_deref(), Some("USERNAME_INVALID"), "{}", username);
        }
    }

    #[test]
    fn test_missing_fields_have_specific_messages() {
        let err = validator()
            .validate(&NewUser {
                username: String::new(),
                ..valid_user()
            })
            .unwrap_err();
        assert_eq!(err.code(), "USERNAME_INVALID");
        assert_eq!(err.message(), "username is required");

        let err = validator()
            .validate(&NewUser {
                email: String::new(),
                ..valid_user()
            })
            .unwrap_err();
        assert_eq!(err.code(), "EMAIL_INVALID");
        assert_eq!(err.message(), "email is required");
    }

    #[test]
    fn test_password_rules() {
        assert!(is_strong_password("Secret123"));
        assert!(!is_strong_password("Sec123")); // Too short
        assert!(!is_strong_password("secret123")); // No uppercase
        assert!(!is_strong_password("SECRET123")); // No lowercase
        assert!(!is_strong_password("SecretPass")); // No digit
        assert!(!is_strong_password("Secret 123")); // Whitespace
        assert!(!is_strong_password(&format!("Aa1{}", "x".repeat(62)))); // Too long
    }

    #[test]
    fn test_phone_and_email() {
        let user = NewUser {
            phone: "12800138000".to_string(),
            ..valid_user()
        };
        assert_eq!(code_of(user).as_deref(), Some("PHONE_INVALID"));

        let user = NewUser {
            email: "not-an-email".to_string(),
            ..valid_user()
        };
        assert_eq!(code_of(user).as_deref(), Some("EMAIL_INVALID"));
    }
}
