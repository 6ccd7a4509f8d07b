//! Account use cases
//!
//! Errors leave this module as `anyhow::Error`s carrying registered codes
//! where the failure is the caller's; anything else is classified as internal
//! by the interceptor chain.

use crate::db::UserRepository;
use crate::error::{is_code, UserCodes};
use crate::models::{NewUser, User};
use crate::security::PasswordHasher;
use crate::validators::Validator;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

pub struct UserUsecase {
    repository: Arc<dyn UserRepository>,
    hasher: Arc<dyn PasswordHasher>,
    validator: Arc<dyn Validator>,
    codes: UserCodes,
}

impl UserUsecase {
    pub fn new(
        repository: Arc<dyn UserRepository>,
        hasher: Arc<dyn PasswordHasher>,
        validator: Arc<dyn Validator>,
        codes: UserCodes,
    ) -> Self {
        Self {
            repository,
            hasher,
            validator,
            codes,
        }
    }

    /// Validate, reject taken usernames, hash the password and store.
    pub async fn register(&self, user: NewUser) -> Result<User> {
        self.validator.validate(&user)?;

        match self.repository.find_by_username(&user.username).await {
            Ok(_) => return Err(self.codes.already_exists.clone().into()),
            Err(err) if is_code(&err, &self.codes.not_found) => {}
            Err(err) => return Err(err),
        }

        let password_hash = self
            .hasher
            .hash(&user.password)
            .context("hash password for registration")?;

        let created = self.repository.create(user, password_hash).await?;

        info!(
            event = "user_create_success",
            user_id = created.id,
            username = %created.username,
            "User registered"
        );
        Ok(created)
    }

    /// Check credentials. Token issuance is left to the transport layer.
    pub async fn login(&self, username: &str, password: &str) -> Result<User> {
        let user = match self.repository.find_by_username(username).await {
            Ok(user) => user,
            Err(err) if is_code(&err, &self.codes.not_found) => {
                warn!(event = "user_login_fail_user_not_found", username = %username, "Login failed");
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        if !self.hasher.verify(password, &user.password_hash) {
            warn!(
                event = "user_login_fail_password_incorrect",
                user_id = user.id,
                "Login failed"
            );
            return Err(self.codes.password_incorrect.clone().into());
        }

        info!(event = "user_login_success", user_id = user.id, "User logged in");
        Ok(user)
    }

    pub async fn get_profile(&self, user_id: i64) -> Result<User> {
        self.repository.find_by_id(user_id).await
    }
}
