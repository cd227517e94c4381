//! Adaptive password hashing.

use sim_ecs::error::{ErrorKind, PlatformError};

/// Default bcrypt cost, overridable via `AuthConfig::bcrypt_cost`.
pub const DEFAULT_BCRYPT_COST: u32 = bcrypt::DEFAULT_COST;

/// Hash a plaintext password at the given cost.
pub fn hash_password(plain: &str, cost: u32) -> Result<String, PlatformError> {
    bcrypt::hash(plain, cost)
        .map_err(|err| PlatformError::new(ErrorKind::Internal, format!("password hashing failed: {err}")))
}

/// Constant-time verification of a plaintext password against a stored hash
/// (bcrypt's own comparison is constant-time over the digest).
#[must_use]
pub fn verify_password(plain: &str, hash: &str) -> bool {
    bcrypt::verify(plain, hash).unwrap_or(false)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify_round_trips() {
        let hash = hash_password("correct horse battery staple", 4).unwrap();
        assert!(verify_password("correct horse battery staple", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn malformed_hash_fails_closed() {
        assert!(!verify_password("anything", "not-a-bcrypt-hash"));
    }
}
