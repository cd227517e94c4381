//! Auth-related configuration.

use sim_ecs::config::env_or;

use crate::password::DEFAULT_BCRYPT_COST;

/// Configuration for [`crate::service::AuthService`].
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Explicit HMAC signing key, hex-encoded. `None` means "generate one at
    /// startup".
    pub jwt_secret: Option<String>,
    /// Issuer string recorded for operator bookkeeping (not embedded in the
    /// claims payload; the signature already binds the token to this process).
    pub jwt_issuer: String,
    /// Session token lifetime, in hours.
    pub session_expiry_hours: u64,
    /// Bcrypt adaptive cost factor.
    pub bcrypt_cost: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            jwt_issuer: "stadium".to_string(),
            session_expiry_hours: 24,
            bcrypt_cost: DEFAULT_BCRYPT_COST,
        }
    }
}

impl AuthConfig {
    /// Build from environment variables, falling back to documented defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            jwt_secret: std::env::var("jwt_secret").ok(),
            jwt_issuer: env_or("jwt_issuer", defaults.jwt_issuer),
            session_expiry_hours: env_or("session_expiry_hours", defaults.session_expiry_hours),
            bcrypt_cost: env_or("bcrypt_cost", defaults.bcrypt_cost),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = AuthConfig::default();
        assert_eq!(config.session_expiry_hours, 24);
        assert_eq!(config.jwt_secret, None);
    }
}
