//! Issuing and verifying identity tokens
//!
//! Tokens are HMAC-signed JWTs carrying the subject id and name. A
//! [`TokenService`] is built once from a [`TokenConfig`]; all configuration
//! checks happen there so `issue` and `verify` never re-validate settings.
//!
//! ## Security Design
//!
//! - **HMAC only**: the service is configured with a shared secret, so only
//!   `HS256`, `HS384` and `HS512` are accepted
//! - **Pinned algorithm**: tokens signed with any other algorithm are rejected
//! - **Uniform failures**: every verification failure is reported as
//!   [`TokenError::Invalid`] with the same message; the specific
//!   [`InvalidReason`] is for server-side logs only
//! - **Zero leeway**: a token is valid only while `now < exp`
//! - **Whole seconds**: `iat` is issuance time rounded down and `exp` is
//!   issuance time plus `ttl` rounded up, so a token never expires before
//!   its full `ttl` has elapsed and outlives it by less than one second
//!
//! ## Usage
//!
//! ```rust
//! use chrono::Duration;
//! use crypto_core::{TokenConfig, TokenService};
//! use jsonwebtoken::Algorithm;
//!
//! let tokens = TokenService::new(TokenConfig {
//!     secret: "0123456789abcdef0123456789abcdef".to_string(),
//!     algorithm: Algorithm::HS256,
//!     ttl: Duration::hours(1),
//!     whitelist: vec!["/user.v1.UserService/Login".to_string()],
//! })
//! .expect("valid configuration");
//!
//! let token = tokens.issue(42, "alice").expect("token issued");
//! let claims = tokens.verify(&token).expect("token verifies");
//! assert_eq!(claims.subject_id, 42);
//! ```
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::time::{SystemTimeSource, TimeSource};

/// Shortest accepted signing secret, in bytes
pub const MIN_SECRET_LEN: usize = 32;

/// Longest accepted token lifetime, in days
pub const MAX_TTL_DAYS: i64 = 3650;

/// Token service settings
#[derive(Clone)]
pub struct TokenConfig {
    pub secret: String,
    pub algorithm: Algorithm,
    pub ttl: Duration,
    /// Full RPC method paths that bypass authentication
    pub whitelist: Vec<String>,
}

impl fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenConfig")
            .field("secret", &"<redacted>")
            .field("algorithm", &self.algorithm)
            .field("ttl", &self.ttl)
            .field("whitelist", &self.whitelist)
            .finish()
    }
}

/// Which verification check failed. Never shown to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    Malformed,
    BadSignature,
    WrongAlgorithm,
    Expired,
    BadSubject,
}

impl InvalidReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::BadSignature => "bad_signature",
            Self::WrongAlgorithm => "wrong_algorithm",
            Self::Expired => "expired",
            Self::BadSubject => "bad_subject",
        }
    }
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("JWT secret must be at least {MIN_SECRET_LEN} bytes")]
    WeakSecret,

    #[error("unsupported JWT algorithm {0:?}, expected HS256, HS384 or HS512")]
    UnsupportedAlgorithm(Algorithm),

    #[error("token ttl must be positive")]
    NonPositiveTtl,

    #[error("token ttl must not exceed {MAX_TTL_DAYS} days")]
    TtlTooLong,

    #[error("token expiry is out of range")]
    ExpiryOutOfRange,

    #[error("cannot issue a token for subject id {0}")]
    InvalidSubjectId(i64),

    #[error("cannot issue a token without a subject name")]
    EmptySubjectName,

    #[error("failed to sign token")]
    Signing(#[source] jsonwebtoken::errors::Error),

    #[error("invalid token")]
    Invalid(InvalidReason),
}

impl TokenError {
    /// Diagnostic reason for verification failures
    pub fn invalid_reason(&self) -> Option<InvalidReason> {
        match self {
            Self::Invalid(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// Verified token payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub subject_id: i64,
    pub subject_name: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Registered claim names as they appear inside the token
#[derive(Debug, Serialize, Deserialize)]
struct TokenClaims {
    sub: String,
    name: String,
    iat: i64,
    exp: i64,
}

/// Issues and verifies tokens; read-only after construction.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    ttl: Duration,
    whitelist: HashSet<String>,
    time_source: Arc<dyn TimeSource>,
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService")
            .field("algorithm", &self.algorithm)
            .field("ttl", &self.ttl)
            .field("whitelist", &self.whitelist)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    /// Validate `config` and build the service.
    ///
    /// ## Errors
    ///
    /// - [`TokenError::UnsupportedAlgorithm`] for non-HMAC algorithms
    /// - [`TokenError::WeakSecret`] if the secret is empty or shorter than [`MIN_SECRET_LEN`]
    /// - [`TokenError::NonPositiveTtl`] if `ttl <= 0`
    /// - [`TokenError::TtlTooLong`] if `ttl` exceeds [`MAX_TTL_DAYS`]
    pub fn new(config: TokenConfig) -> Result<Self, TokenError> {
        if !matches!(
            config.algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Err(TokenError::UnsupportedAlgorithm(config.algorithm));
        }
        if config.secret.len() < MIN_SECRET_LEN {
            return Err(TokenError::WeakSecret);
        }
        if config.ttl <= Duration::zero() {
            return Err(TokenError::NonPositiveTtl);
        }
        if config.ttl > Duration::days(MAX_TTL_DAYS) {
            return Err(TokenError::TtlTooLong);
        }

        let secret = config.secret.as_bytes();
        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            algorithm: config.algorithm,
            ttl: config.ttl,
            whitelist: config.whitelist.into_iter().collect(),
            time_source: Arc::new(SystemTimeSource),
        })
    }

    /// Replace the time source used for issuance and expiry checks.
    pub fn with_time_source(mut self, time_source: Arc<dyn TimeSource>) -> Self {
        self.time_source = time_source;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token for a subject, expiring `ttl` after now.
    pub fn issue(&self, subject_id: i64, subject_name: &str) -> Result<String, TokenError> {
        if subject_id <= 0 {
            return Err(TokenError::InvalidSubjectId(subject_id));
        }
        if subject_name.trim().is_empty() {
            return Err(TokenError::EmptySubjectName);
        }

        let now = self.time_source.now();
        let expires_at = now
            .checked_add_signed(self.ttl)
            .ok_or(TokenError::ExpiryOutOfRange)?;
        let exp = if expires_at.timestamp_subsec_nanos() > 0 {
            expires_at.timestamp() + 1
        } else {
            expires_at.timestamp()
        };

        let claims = TokenClaims {
            sub: subject_id.to_string(),
            name: subject_name.to_string(),
            iat: now.timestamp(),
            exp,
        };

        encode(&Header::new(self.algorithm), &claims, &self.encoding_key)
            .map_err(TokenError::Signing)
    }

    /// Verify signature, algorithm and expiry, returning the claims.
    ///
    /// ## Errors
    ///
    /// Always [`TokenError::Invalid`]; inspect [`TokenError::invalid_reason`]
    /// only for logging.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(self.algorithm);
        // Expiry is checked below against the injected time source
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        let data = decode::<TokenClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| TokenError::Invalid(classify(e.kind())))?;
        let claims = data.claims;

        let now = self.time_source.now().timestamp();
        if now >= claims.exp {
            return Err(TokenError::Invalid(InvalidReason::Expired));
        }

        let subject_id = claims
            .sub
            .parse::<i64>()
            .ok()
            .filter(|id| *id > 0)
            .ok_or(TokenError::Invalid(InvalidReason::BadSubject))?;

        let issued_at = timestamp(claims.iat)?;
        let expires_at = timestamp(claims.exp)?;

        Ok(Claims {
            subject_id,
            subject_name: claims.name,
            issued_at,
            expires_at,
        })
    }

    /// Exact membership check against the configured bypass list.
    pub fn is_whitelisted(&self, route: &str) -> bool {
        self.whitelist.contains(route)
    }
}

fn classify(kind: &ErrorKind) -> InvalidReason {
    match kind {
        ErrorKind::InvalidSignature => InvalidReason::BadSignature,
        ErrorKind::InvalidAlgorithm => InvalidReason::WrongAlgorithm,
        ErrorKind::ExpiredSignature => InvalidReason::Expired,
        _ => InvalidReason::Malformed,
    }
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, TokenError> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or(TokenError::Invalid(InvalidReason::Malformed))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ControllableTimeSource;

    const TEST_SECRET: &str = "test-secret-that-is-long-enough-for-hs256";

    fn test_config() -> TokenConfig {
        TokenConfig {
            secret: TEST_SECRET.to_string(),
            algorithm: Algorithm::HS256,
            ttl: Duration::seconds(3600),
            whitelist: vec![
                "/user.v1.UserService/Register".to_string(),
                "/user.v1.UserService/Login".to_string(),
            ],
        }
    }

    #[test]
    fn test_rejects_short_secret() {
        let config = TokenConfig {
            secret: "short".to_string(),
            ..test_config()
        };
        assert!(matches!(TokenService::new(config), Err(TokenError::WeakSecret)));
    }

    #[test]
    fn test_rejects_empty_secret() {
        let config = TokenConfig {
            secret: String::new(),
            ..test_config()
        };
        assert!(matches!(TokenService::new(config), Err(TokenError::WeakSecret)));
    }

    #[test]
    fn test_rejects_non_positive_ttl() {
        for ttl in [Duration::zero(), Duration::seconds(-5)] {
            let config = TokenConfig { ttl, ..test_config() };
            assert!(matches!(TokenService::new(config), Err(TokenError::NonPositiveTtl)));
        }
    }

    #[test]
    fn test_rejects_overflowing_ttl() {
        for ttl in [
            Duration::seconds(10_000_000_000_000),
            Duration::days(MAX_TTL_DAYS + 1),
        ] {
            let config = TokenConfig { ttl, ..test_config() };
            assert!(matches!(TokenService::new(config), Err(TokenError::TtlTooLong)));
        }

        let config = TokenConfig {
            ttl: Duration::days(MAX_TTL_DAYS),
            ..test_config()
        };
        let tokens = TokenService::new(config).unwrap();
        assert!(tokens.verify(&tokens.issue(42, "alice").unwrap()).is_ok());
    }

    #[test]
    fn test_issue_at_end_of_time_is_error() {
        let clock = Arc::new(ControllableTimeSource::new(DateTime::<Utc>::MAX_UTC));
        let tokens = TokenService::new(test_config())
            .unwrap()
            .with_time_source(clock);

        assert!(matches!(
            tokens.issue(42, "alice"),
            Err(TokenError::ExpiryOutOfRange)
        ));
    }

    #[test]
    fn test_rejects_asymmetric_algorithm() {
        let config = TokenConfig {
            algorithm: Algorithm::RS256,
            ..test_config()
        };
        assert!(matches!(
            TokenService::new(config),
            Err(TokenError::UnsupportedAlgorithm(Algorithm::RS256))
        ));
    }

    #[test]
    fn test_issue_rejects_invalid_subject() {
        let tokens = TokenService::new(test_config()).unwrap();

        assert!(matches!(tokens.issue(0, "alice"), Err(TokenError::InvalidSubjectId(0))));
        assert!(matches!(tokens.issue(-1, "alice"), Err(TokenError::InvalidSubjectId(-1))));
        assert!(matches!(tokens.issue(7, "  "), Err(TokenError::EmptySubjectName)));
    }

    #[test]
    fn test_issue_then_verify() {
        let tokens = TokenService::new(test_config()).unwrap();

        let token = tokens.issue(42, "alice").unwrap();
        assert_eq!(token.matches('.').count(), 2); // JWT has 3 parts

        let claims = tokens.verify(&token).unwrap();
        assert_eq!(claims.subject_id, 42);
        assert_eq!(claims.subject_name, "alice");
        let lifetime = claims.expires_at - claims.issued_at;
        assert!(lifetime >= Duration::seconds(3600));
        assert!(lifetime <= Duration::seconds(3601));
    }

    #[test]
    fn test_each_issuance_computes_fresh_expiry() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let clock = Arc::new(ControllableTimeSource::new(start));
        let tokens = TokenService::new(test_config())
            .unwrap()
            .with_time_source(clock.clone());

        let first = tokens.verify(&tokens.issue(1, "a").unwrap()).unwrap();
        clock.advance(Duration::seconds(600));
        let second = tokens.verify(&tokens.issue(1, "a").unwrap()).unwrap();

        assert_eq!(second.expires_at - first.expires_at, Duration::seconds(600));
    }

    #[test]
    fn test_expiry_boundary() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let clock = Arc::new(ControllableTimeSource::new(start));
        let tokens = TokenService::new(test_config())
            .unwrap()
            .with_time_source(clock.clone());
        let token = tokens.issue(42, "alice").unwrap();

        clock.set(start + Duration::seconds(3599));
        assert!(tokens.verify(&token).is_ok());

        clock.set(start + Duration::seconds(3600));
        let err = tokens.verify(&token).unwrap_err();
        assert_eq!(err.invalid_reason(), Some(InvalidReason::Expired));

        clock.set(start + Duration::seconds(3601));
        assert!(tokens.verify(&token).is_err());
    }

    #[test]
    fn test_subsecond_issuance_never_expires_early() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
            + Duration::milliseconds(900);
        let clock = Arc::new(ControllableTimeSource::new(start));
        let tokens = TokenService::new(test_config())
            .unwrap()
            .with_time_source(clock.clone());
        let token = tokens.issue(42, "alice").unwrap();
        let full_ttl = start + Duration::seconds(3600);

        clock.set(full_ttl - Duration::milliseconds(500));
        assert!(tokens.verify(&token).is_ok());

        clock.set(full_ttl);
        assert!(tokens.verify(&token).is_ok());

        clock.set(full_ttl + Duration::milliseconds(100));
        let err = tokens.verify(&token).unwrap_err();
        assert_eq!(err.invalid_reason(), Some(InvalidReason::Expired));
    }

    #[test]
    fn test_wrong_secret_is_bad_signature() {
        let issuer = TokenService::new(TokenConfig {
            secret: "another-secret-also-long-enough-for-hs256".to_string(),
            ..test_config()
        })
        .unwrap();
        let verifier = TokenService::new(test_config()).unwrap();

        let err = verifier.verify(&issuer.issue(42, "alice").unwrap()).unwrap_err();
        assert_eq!(err.invalid_reason(), Some(InvalidReason::BadSignature));
        assert_eq!(err.to_string(), "invalid token");
    }

    #[test]
    fn test_other_hmac_algorithm_is_rejected() {
        let issuer = TokenService::new(TokenConfig {
            algorithm: Algorithm::HS512,
            ..test_config()
        })
        .unwrap();
        let verifier = TokenService::new(test_config()).unwrap();

        let err = verifier.verify(&issuer.issue(42, "alice").unwrap()).unwrap_err();
        assert_eq!(err.invalid_reason(), Some(InvalidReason::WrongAlgorithm));
    }

    #[test]
    fn test_garbage_is_malformed() {
        let tokens = TokenService::new(test_config()).unwrap();

        let err = tokens.verify("not-a-token").unwrap_err();
        assert_eq!(err.invalid_reason(), Some(InvalidReason::Malformed));
        assert_eq!(err.to_string(), "invalid token");
    }

    #[test]
    fn test_whitelist_is_exact_match() {
        let tokens = TokenService::new(test_config()).unwrap();

        assert!(tokens.is_whitelisted("/user.v1.UserService/Login"));
        assert!(!tokens.is_whitelisted("/user.v1.UserService/GetMyProfile"));
        assert!(!tokens.is_whitelisted("/user.v1.UserService/Login/"));
        assert!(!tokens.is_whitelisted("/user.v1.userservice/login"));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let rendered = format!("{:?}", test_config());
        assert!(!rendered.contains(TEST_SECRET));
    }
}
