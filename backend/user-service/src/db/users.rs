/// User database operations for user-service
use crate::error::UserCodes;
use crate::models::{NewUser, User};
use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use sqlx::PgPool;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::error;

/// Storage boundary for accounts.
///
/// Lookups that find nothing fail with the `USER_NOT_FOUND` code.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Persist a new account. `password_hash` is stored as given.
    async fn create(&self, user: NewUser, password_hash: String) -> Result<User>;

    async fn find_by_username(&self, username: &str) -> Result<User>;

    async fn find_by_id(&self, id: i64) -> Result<User>;
}

/// Process-local repository used when no database is configured.
pub struct InMemoryUserRepository {
    by_id: DashMap<i64, User>,
    id_by_username: DashMap<String, i64>,
    next_id: AtomicI64,
    codes: UserCodes,
}

impl InMemoryUserRepository {
    pub fn new(codes: UserCodes) -> Self {
        Self {
            by_id: DashMap::new(),
            id_by_username: DashMap::new(),
            next_id: AtomicI64::new(1),
            codes,
        }
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, user: NewUser, password_hash: String) -> Result<User> {
        // The username entry is the uniqueness guard; the id is only taken once it is won.
        let entry = match self.id_by_username.entry(user.username.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(self.codes.already_exists.clone().into());
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => entry,
        };

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let stored = User {
            id,
            username: user.username,
            password_hash,
            phone: user.phone,
            email: user.email,
        };
        self.by_id.insert(id, stored.clone());
        entry.insert(id);

        Ok(stored)
    }

    async fn find_by_username(&self, username: &str) -> Result<User> {
        let id = self
            .id_by_username
            .get(username)
            .map(|entry| *entry.value())
            .ok_or_else(|| self.codes.not_found.clone())?;
        self.find_by_id(id).await
    }

    async fn find_by_id(&self, id: i64) -> Result<User> {
        self.by_id
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| self.codes.not_found.clone().into())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    password_hash: String,
    phone: String,
    email: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            password_hash: row.password_hash,
            phone: row.phone,
            email: row.email,
        }
    }
}

/// Postgres repository over a `users` table
/// (`id BIGSERIAL`, `username` unique, `password_hash`, `phone`, `email`).
pub struct PgUserRepository {
    pool: PgPool,
    codes: UserCodes,
}

impl PgUserRepository {
    pub fn new(pool: PgPool, codes: UserCodes) -> Self {
        Self { pool, codes }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, user: NewUser, password_hash: String) -> Result<User> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (username, password_hash, phone, email)
            VALUES ($1, $2, $3, $4)
            RETURNING id, username, password_hash, phone, email
            "#,
        )
        .bind(&user.username)
        .bind(&password_hash)
        .bind(&user.phone)
        .bind(&user.email)
        .fetch_one(&self.pool)
        .await;

        match row {
            Ok(row) => Ok(row.into()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(self.codes.already_exists.clone().into())
            }
            Err(e) => {
                error!(event = "db_user_create_failed", error = %e, "Failed to insert user");
                Err(anyhow::Error::new(e).context("insert user"))
            }
        }
    }

    async fn find_by_username(&self, username: &str) -> Result<User> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, password_hash, phone, email FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(event = "db_user_query_failed", error = %e, "Failed to query user by username");
            anyhow::Error::new(e).context("query user by username")
        })?;

        row.map(User::from)
            .ok_or_else(|| self.codes.not_found.clone().into())
    }

    async fn find_by_id(&self, id: i64) -> Result<User> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, password_hash, phone, email FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(event = "db_user_query_failed", error = %e, "Failed to query user by id");
            anyhow::Error::new(e).context("query user by id")
        })?;

        row.map(User::from)
            .ok_or_else(|| self.codes.not_found.clone().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::is_code;
    use error_types::ErrorRegistry;

    fn repository() -> (InMemoryUserRepository, UserCodes) {
        let codes = UserCodes::register(&mut ErrorRegistry::new());
        (InMemoryUserRepository::new(codes.clone()), codes)
    }

    fn new_user(username: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            password: "Secret123".to_string(),
            phone: "13800138000".to_string(),
            email: format!("{}@example.com", username),
        }
    }

    #[tokio::test]
    async fn test_create_assigns_increasing_ids() {
        let (repo, _) = repository();

        let alice = repo.create(new_user("alice"), "hash-a".into()).await.unwrap();
        let bob = repo.create(new_user("bob"), "hash-b".into()).await.unwrap();

        assert_eq!(alice.id, 1);
        assert_eq!(bob.id, 2);
        assert_eq!(bob.password_hash, "hash-b");
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let (repo, codes) = repository();
        repo.create(new_user("alice"), "hash".into()).await.unwrap();

        let err = repo.create(new_user("alice"), "hash".into()).await.unwrap_err();

        assert!(is_code(&err, &codes.already_exists));
    }

    #[tokio::test]
    async fn test_lookups() {
        let (repo, codes) = repository();
        let created = repo.create(new_user("alice"), "hash".into()).await.unwrap();

        assert_eq!(repo.find_by_username("alice").await.unwrap(), created);
        assert_eq!(repo.find_by_id(created.id).await.unwrap(), created);

        let missing = repo.find_by_username("mallory").await.unwrap_err();
        assert!(is_code(&missing, &codes.not_found));
        let missing = repo.find_by_id(99).await.unwrap_err();
        assert!(is_code(&missing, &codes.not_found));
    }
}
