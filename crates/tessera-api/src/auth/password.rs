/// Password hashing and verification using Argon2id
///
/// Work factor comes from `PasswordConfig` (memory in KiB, iterations,
/// lanes). Salts are 16 random bytes; the PHC string carries algorithm,
/// parameters and salt, so nothing else needs to be stored.
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, Params,
};
use tessera_core::PasswordConfig;
use thiserror::Error;

/// Output length of the raw Argon2 digest in bytes
const OUTPUT_LEN: usize = 32;

/// Password hashing and verification errors
#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("Unsupported work factor: {0}")]
    InvalidParams(String),

    #[error("Failed to hash password: {0}")]
    HashingFailed(String),

    #[error("Failed to verify password: {0}")]
    VerificationFailed(String),

    #[error("Invalid password hash format")]
    InvalidHashFormat,
}

fn to_params(config: &PasswordConfig) -> Result<Params, PasswordError> {
    Params::new(
        config.memory_cost,
        config.time_cost,
        config.parallelism,
        Some(OUTPUT_LEN),
    )
    .map_err(|e| PasswordError::InvalidParams(e.to_string()))
}

/// Check that the configured work factor is usable without hashing anything
pub fn check_params(config: &PasswordConfig) -> Result<(), PasswordError> {
    to_params(config).map(|_| ())
}

/// Hash a plaintext password with the configured work factor
///
/// Returns a PHC string such as `$argon2id$v=19$m=65536,t=3,p=4$...`.
/// CPU-heavy: async callers should run this on the blocking pool.
pub fn hash_password(password: &str, config: &PasswordConfig) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        to_params(config)?,
    );

    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| PasswordError::HashingFailed(e.to_string()))?;

    Ok(password_hash.to_string())
}

/// Verify a plaintext password against a stored hash
///
/// * `Ok(true)` - password matches
/// * `Ok(false)` - password does not match
/// * `Err(PasswordError::InvalidHashFormat)` - the stored digest is not a PHC string
///
/// Parameters are read from the digest itself, so hashes made under an older
/// work factor keep verifying.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| PasswordError::InvalidHashFormat)?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PasswordError::VerificationFailed(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Light parameters so the test suite stays fast
    fn test_config() -> PasswordConfig {
        PasswordConfig {
            memory_cost: 8192,
            time_cost: 1,
            parallelism: 1,
        }
    }

    #[test]
    fn test_hash_and_verify_password() {
        let hash = hash_password("secret1", &test_config()).unwrap();

        assert!(verify_password("secret1", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
    }

    #[test]
    fn test_same_password_produces_different_hashes() {
        let config = test_config();
        let hash1 = hash_password("same-password", &config).unwrap();
        let hash2 = hash_password("same-password", &config).unwrap();

        assert_ne!(hash1, hash2);
        assert!(verify_password("same-password", &hash1).unwrap());
        assert!(verify_password("same-password", &hash2).unwrap());
    }

    #[test]
    fn test_hash_carries_work_factor() {
        let hash = hash_password("secret1", &test_config()).unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(hash.contains("m=8192"));
        assert!(hash.contains("t=1"));
        assert!(hash.contains("p=1"));
    }

    #[test]
    fn test_invalid_hash_format() {
        let result = verify_password("password", "invalid-hash-format");
        assert!(matches!(result, Err(PasswordError::InvalidHashFormat)));
    }

    #[test]
    fn test_unsupported_work_factor_is_an_error() {
        let config = PasswordConfig {
            memory_cost: 8192,
            time_cost: 0,
            parallelism: 1,
        };

        assert!(matches!(
            hash_password("secret1", &config),
            Err(PasswordError::InvalidParams(_))
        ));
        assert!(check_params(&config).is_err());
        assert!(check_params(&test_config()).is_ok());
    }
}
