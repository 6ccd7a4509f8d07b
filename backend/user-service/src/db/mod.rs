/// Account persistence
pub mod users;

pub use users::{InMemoryUserRepository, PgUserRepository, UserRepository};
