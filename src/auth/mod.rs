//! Authentication module
//!
//! Stateless HS256 bearer tokens carrying a user id and a role.

mod jwt;

pub use jwt::{AuthContext, Claims, JwtError, Role, TokenService, DEFAULT_TOKEN_TTL_MINUTES};
