/// Account records
use crate::grpc::proto;

/// A stored account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub phone: String,
    pub email: String,
}

/// Registration input before validation and hashing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub phone: String,
    pub email: String,
}

impl From<proto::RegisterRequest> for NewUser {
    fn from(request: proto::RegisterRequest) -> Self {
        Self {
            username: request.username,
            password: request.password,
            phone: request.phone,
            email: request.email,
        }
    }
}

impl From<User> for proto::User {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            phone: user.phone,
            email: user.email,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_user_omits_password_hash() {
        let user = User {
            id: 7,
            username: "alice".to_string(),
            password_hash: "$argon2id$v=19$secret".to_string(),
            phone: "13800138000".to_string(),
            email: "alice@example.com".to_string(),
        };

        let wire = proto::User::from(user);

        assert_eq!(wire.id, 7);
        assert_eq!(wire.username, "alice");
        assert!(!format!("{:?}", wire).contains("argon2"));
    }
}
