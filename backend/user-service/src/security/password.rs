/// Password hashing and verification using Argon2id
use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{
        rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString,
    },
    Argon2,
};
use tracing::warn;

/// Hash/verify contract for stored credentials.
#[cfg_attr(test, mockall::automock)]
pub trait PasswordHasher: Send + Sync {
    /// PHC-formatted digest of `plaintext`.
    fn hash(&self, plaintext: &str) -> Result<String>;

    /// `false` for a mismatch and for a digest that cannot be parsed.
    fn verify(&self, plaintext: &str, digest: &str) -> bool;
}

/// Argon2id with default parameters and a random 16-byte salt per password.
#[derive(Debug, Clone, Default)]
pub struct Argon2Hasher;

impl PasswordHasher for Argon2Hasher {
    fn hash(&self, plaintext: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);

        let digest = Argon2::default()
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| anyhow!("Password hashing failed: {}", e))?
            .to_string();

        Ok(digest)
    }

    fn verify(&self, plaintext: &str, digest: &str) -> bool {
        let parsed = match PasswordHash::new(digest) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "Stored password hash is not a valid PHC string");
                return false;
            }
        };

        // Constant-time comparison happens inside argon2.
        Argon2::default()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hasher = Argon2Hasher;
        let digest = hasher.hash("Secret123").unwrap();

        assert!(digest.starts_with("$argon2id$"));
        assert!(hasher.verify("Secret123", &digest));
        assert!(!hasher.verify("Secret124", &digest));
    }

    #[test]
    fn test_salts_differ() {
        let hasher = Argon2Hasher;

        assert_ne!(hasher.hash("Secret123").unwrap(), hasher.hash("Secret123").unwrap());
    }

    #[test]
    fn test_garbage_digest_never_verifies() {
        assert!(!Argon2Hasher.verify("Secret123", "not-a-phc-string"));
    }
}
