//! JWT token generation and validation
//!
//! Access and refresh tokens are both HMAC-SHA256 signed JWTs sharing one
//! secret, with distinct lifetimes and distinct claim shapes. Expiry is judged
//! against the injected clock with zero leeway rather than the library's
//! wall-clock check.

use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use tessera_core::{AuthConfig, Clock, Role, User};
use thiserror::Error;
use uuid::Uuid;

/// Claims carried by an access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
    /// Unique token identifier
    pub uuid: Uuid,
    /// Issued at (Unix seconds)
    pub iat: i64,
    /// Expiration (Unix seconds)
    pub exp: i64,
}

/// Claims carried by a refresh token
///
/// Unknown fields are rejected so an access token never parses as a refresh
/// token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefreshClaims {
    pub user_id: Uuid,
    pub uuid: Uuid,
    pub iat: i64,
    pub exp: i64,
}

trait Expiring {
    fn exp(&self) -> i64;
}

impl Expiring for AccessClaims {
    fn exp(&self) -> i64 {
        self.exp
    }
}

impl Expiring for RefreshClaims {
    fn exp(&self) -> i64 {
        self.exp
    }
}

/// JWT token generation and validation errors
#[derive(Debug, Error)]
pub enum JwtError {
    #[error("Failed to encode JWT: {0}")]
    Encoding(#[from] jsonwebtoken::errors::Error),

    #[error("Invalid token format")]
    InvalidToken,

    #[error("Token has expired")]
    ExpiredToken,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Token algorithm not allowed")]
    InvalidAlgorithm,
}

/// JWT configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Secret key for HMAC signing
    pub secret: String,
    /// Access token lifetime in seconds (default: 3600)
    pub access_ttl_secs: u64,
    /// Refresh token lifetime in seconds (default: 604800)
    pub refresh_ttl_secs: u64,
}

impl From<&AuthConfig> for JwtConfig {
    fn from(auth: &AuthConfig) -> Self {
        Self {
            secret: auth.jwt_secret.clone(),
            access_ttl_secs: auth.access_token_ttl_secs,
            refresh_ttl_secs: auth.refresh_token_ttl_secs,
        }
    }
}

/// Issues and parses signed tokens
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
    clock: Arc<dyn Clock>,
}

impl TokenCodec {
    pub fn new(config: &JwtConfig, clock: Arc<dyn Clock>) -> Self {
        // HS256 is the only accepted algorithm. `exp` stays a required claim,
        // but its value is checked against `clock` after decoding.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            access_ttl_secs: i64::try_from(config.access_ttl_secs).unwrap_or(i64::MAX),
            refresh_ttl_secs: i64::try_from(config.refresh_ttl_secs).unwrap_or(i64::MAX),
            clock,
        }
    }

    /// Access token lifetime in seconds, as reported in `expires_in`
    pub fn access_ttl_secs(&self) -> u64 {
        self.access_ttl_secs.unsigned_abs()
    }

    /// Mint an access token for `user`
    pub fn issue_access(&self, user: &User) -> Result<(String, AccessClaims), JwtError> {
        let iat = self.clock.now().timestamp();
        let claims = AccessClaims {
            user_id: user.id,
            email: user.email.clone(),
            role: user.role,
            uuid: Uuid::new_v4(),
            iat,
            exp: iat.saturating_add(self.access_ttl_secs),
        };

        let token = self.sign(&claims)?;
        Ok((token, claims))
    }

    /// Mint a refresh token for `user_id`
    pub fn issue_refresh(&self, user_id: Uuid) -> Result<(String, RefreshClaims), JwtError> {
        let iat = self.clock.now().timestamp();
        let claims = RefreshClaims {
            user_id,
            uuid: Uuid::new_v4(),
            iat,
            exp: iat.saturating_add(self.refresh_ttl_secs),
        };

        let token = self.sign(&claims)?;
        Ok((token, claims))
    }

    pub fn parse_access(&self, token: &str) -> Result<AccessClaims, JwtError> {
        self.verify(token)
    }

    pub fn parse_refresh(&self, token: &str) -> Result<RefreshClaims, JwtError> {
        self.verify(token)
    }

    fn sign<C: Serialize>(&self, claims: &C) -> Result<String, JwtError> {
        Ok(encode(
            &Header::new(Algorithm::HS256),
            claims,
            &self.encoding_key,
        )?)
    }

    fn verify<C: DeserializeOwned + Expiring>(&self, token: &str) -> Result<C, JwtError> {
        let token_data = decode::<C>(token, &self.decoding_key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidSignature => JwtError::InvalidSignature,
                ErrorKind::InvalidAlgorithm => JwtError::InvalidAlgorithm,
                _ => JwtError::InvalidToken,
            }
        })?;

        if token_data.claims.exp() < self.clock.now().timestamp() {
            return Err(JwtError::ExpiredToken);
        }

        Ok(token_data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use proptest::prelude::*;
    use tessera_core::ManualClock;

    fn test_config() -> JwtConfig {
        JwtConfig {
            secret: "test-secret".to_string(),
            access_ttl_secs: 60,
            refresh_ttl_secs: 600,
        }
    }

    fn test_user(role: Role) -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            name: "Ann".to_string(),
            email: "ann@x.com".to_string(),
            password_hash: String::new(),
            role,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_issue_and_parse_access_token() {
        let codec = TokenCodec::new(&test_config(), Arc::new(ManualClock::default()));
        let user = test_user(Role::Admin);

        let (token, issued) = codec.issue_access(&user).unwrap();
        let parsed = codec.parse_access(&token).unwrap();

        assert_eq!(parsed, issued);
        assert_eq!(parsed.user_id, user.id);
        assert_eq!(parsed.role, Role::Admin);
        assert_eq!(parsed.exp - parsed.iat, 60);
    }

    #[test]
    fn test_tokens_minted_in_same_second_differ() {
        let codec = TokenCodec::new(&test_config(), Arc::new(ManualClock::default()));
        let user_id = Uuid::new_v4();

        let (first, _) = codec.issue_refresh(user_id).unwrap();
        let (second, _) = codec.issue_refresh(user_id).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_expiry_uses_injected_clock_with_zero_leeway() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let codec = TokenCodec::new(&test_config(), clock.clone());

        let (token, _) = codec.issue_access(&test_user(Role::User)).unwrap();

        clock.advance(Duration::seconds(60));
        assert!(codec.parse_access(&token).is_ok());

        clock.advance(Duration::seconds(1));
        assert!(matches!(
            codec.parse_access(&token),
            Err(JwtError::ExpiredToken)
        ));
    }

    #[test]
    fn test_wrong_secret() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::default());
        let codec1 = TokenCodec::new(&test_config(), clock.clone());
        let codec2 = TokenCodec::new(
            &JwtConfig {
                secret: "another-secret".to_string(),
                ..test_config()
            },
            clock,
        );

        let (token, _) = codec1.issue_access(&test_user(Role::User)).unwrap();
        assert!(matches!(
            codec2.parse_access(&token),
            Err(JwtError::InvalidSignature)
        ));
    }

    #[test]
    fn test_other_algorithm_rejected() {
        let config = test_config();
        let codec = TokenCodec::new(&config, Arc::new(ManualClock::default()));
        let now = Utc::now().timestamp();

        let claims = RefreshClaims {
            user_id: Uuid::new_v4(),
            uuid: Uuid::new_v4(),
            iat: now,
            exp: now + 600,
        };
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(config.secret.as_bytes()),
        )
        .unwrap();

        assert!(matches!(
            codec.parse_refresh(&token),
            Err(JwtError::InvalidAlgorithm)
        ));
    }

    #[test]
    fn test_missing_exp_rejected() {
        #[derive(Serialize)]
        struct NoExpiry {
            user_id: Uuid,
            uuid: Uuid,
            iat: i64,
        }

        let config = test_config();
        let codec = TokenCodec::new(&config, Arc::new(ManualClock::default()));
        let token = encode(
            &Header::new(Algorithm::HS256),
            &NoExpiry {
                user_id: Uuid::new_v4(),
                uuid: Uuid::new_v4(),
                iat: Utc::now().timestamp(),
            },
            &EncodingKey::from_secret(config.secret.as_bytes()),
        )
        .unwrap();

        assert!(matches!(
            codec.parse_refresh(&token),
            Err(JwtError::InvalidToken)
        ));
    }

    #[test]
    fn test_claim_shapes_do_not_cross() {
        let codec = TokenCodec::new(&test_config(), Arc::new(ManualClock::default()));
        let user = test_user(Role::User);

        let (refresh, _) = codec.issue_refresh(user.id).unwrap();
        let (access, _) = codec.issue_access(&user).unwrap();

        assert!(matches!(
            codec.parse_access(&refresh),
            Err(JwtError::InvalidToken)
        ));
        assert!(matches!(
            codec.parse_refresh(&access),
            Err(JwtError::InvalidToken)
        ));
    }

    #[test]
    fn test_malformed_token() {
        let codec = TokenCodec::new(&test_config(), Arc::new(ManualClock::default()));
        assert!(matches!(
            codec.parse_access("invalid.token.here"),
            Err(JwtError::InvalidToken)
        ));
        assert!(codec.parse_access("").is_err());
    }

    proptest! {
        #[test]
        fn prop_access_round_trip_before_expiry(
            email in "[a-z]{1,12}@[a-z]{1,8}\\.[a-z]{2,3}",
            admin in any::<bool>(),
            ttl in 1u64..86_400,
            elapsed_frac in 0.0f64..=1.0,
        ) {
            let clock = Arc::new(ManualClock::new(Utc::now()));
            let codec = TokenCodec::new(
                &JwtConfig { access_ttl_secs: ttl, ..test_config() },
                clock.clone(),
            );
            let mut user = test_user(if admin { Role::Admin } else { Role::User });
            user.email = email;

            let (token, issued) = codec.issue_access(&user).unwrap();
            clock.advance(Duration::seconds((ttl as f64 * elapsed_frac) as i64));
            prop_assert_eq!(codec.parse_access(&token).unwrap(), issued);

            clock.advance(Duration::seconds(ttl as i64 + 1));
            prop_assert!(matches!(codec.parse_access(&token), Err(JwtError::ExpiredToken)));
        }
    }
}
