//! Token issuance and verification for the user service
//!
//! - [`jwt`]: signed, time-bounded identity tokens plus the route whitelist
//! - [`time`]: injectable time source so expiry can be tested deterministically

pub mod jwt;
pub mod time;

pub use jwt::{Claims, InvalidReason, TokenConfig, TokenError, TokenService, MIN_SECRET_LEN};
pub use time::{ControllableTimeSource, SystemTimeSource, TimeSource};
