//! Authentication and authorization module
//!
//! - Password hashing with Argon2id
//! - Access and refresh token codec (HS256 JWT)
//! - Auth service owning the session lifecycle
//! - Access guard and role gate middleware
//! - Request and response models

pub mod jwt;
pub mod middleware;
pub mod models;
pub mod password;
pub mod service;

pub use jwt::{AccessClaims, JwtConfig, JwtError, RefreshClaims, TokenCodec};
pub use middleware::{auth_middleware, bearer_token, require_role, AuthenticatedUser};
pub use models::{
    AuthResponse, ChangePasswordRequest, ClientInfo, LoginRequest, RefreshTokenRequest,
    RegisterRequest, TokenResponse, UserInfo,
};
pub use password::{hash_password, verify_password, PasswordError};
pub use service::{normalize_email, AuthService};
