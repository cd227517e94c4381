//! `AuthService`: login/verify/refresh wired to a [`UserStore`], [`RoleStore`],
//! and [`TokenSigner`].

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::RngCore;
use rustc_hash::FxHashSet;
use sim_ecs::error::{ErrorKind, PlatformError};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::password::verify_password;
use crate::role::RoleStore;
use crate::token::{hash_api_token, unix_secs, ApiToken, AuthToken, Claims, MatchToken, TokenSigner, DEFAULT_MATCH_SCOPES};
use crate::user::{User, UserStore};

fn decode_hex_key(hex: &str) -> Vec<u8> {
    (0..hex.len())
        .step_by(2)
        .filter_map(|i| hex.get(i..i + 2).and_then(|byte| u8::from_str_radix(byte, 16).ok()))
        .collect()
}

/// Generate a random, URL-safe opaque secret for API tokens.
fn generate_opaque_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Owns the user/role stores and the signing key; the single entry point
/// for login, token verification, and token issuance.
pub struct AuthService {
    config: AuthConfig,
    signer: TokenSigner,
    users: UserStore,
    roles: RoleStore,
}

impl AuthService {
    /// Build a service from configuration, generating a signing key if none
    /// is configured.
    #[must_use]
    pub fn new(config: AuthConfig) -> Self {
        let signer = config
            .jwt_secret
            .as_deref()
            .map(|hex| TokenSigner::with_key(decode_hex_key(hex)))
            .unwrap_or_else(TokenSigner::generate);
        Self {
            config,
            signer,
            users: UserStore::new(),
            roles: RoleStore::new(),
        }
    }

    /// Read access to the user store.
    #[must_use]
    pub const fn users(&self) -> &UserStore {
        &self.users
    }

    /// Mutable access to the user store, for account administration.
    pub fn users_mut(&mut self) -> &mut UserStore {
        &mut self.users
    }

    /// Read access to the role store.
    #[must_use]
    pub const fn roles(&self) -> &RoleStore {
        &self.roles
    }

    /// Mutable access to the role store, for role administration.
    pub fn roles_mut(&mut self) -> &mut RoleStore {
        &mut self.roles
    }

    fn effective_scopes_for(&self, user: &User) -> FxHashSet<String> {
        let mut scopes = user.direct_scopes.clone();
        for role_id in &user.role_ids {
            scopes.extend(self.roles.effective_scopes(*role_id));
        }
        scopes
    }

    fn role_names_for(&self, user: &User) -> Vec<String> {
        let mut names: Vec<String> = user
            .role_ids
            .iter()
            .filter_map(|id| self.roles.get(*id))
            .map(|role| role.name.clone())
            .collect();
        names.sort();
        names
    }

    fn issue_auth_token(&self, user: &User, now: SystemTime) -> Result<AuthToken, PlatformError> {
        let scopes = self.effective_scopes_for(user);
        let role_names = self.role_names_for(user);
        let expires_at = now + Duration::from_secs(self.config.session_expiry_hours * 3600);
        let claims = Claims {
            subject: user.id.to_string(),
            scopes: scopes.iter().cloned().collect(),
            issued_at: unix_secs(now),
            expires_at: unix_secs(expires_at),
            username: Some(user.username.clone()),
            role_names: role_names.clone(),
        };
        let signed_bearer = self.signer.sign(&claims)?;
        Ok(AuthToken {
            user_id: user.id,
            username: user.username.clone(),
            role_names,
            scopes,
            signed_bearer,
            issued_at: now,
            expires_at,
        })
    }

    /// Authenticate a username/password pair and issue a session token.
    pub fn login(&self, username: &str, password: &str, now: SystemTime) -> Result<AuthToken, PlatformError> {
        let user = self
            .users
            .get_by_username(username)
            .ok_or_else(|| PlatformError::new(ErrorKind::InvalidCredentials, "unknown username or password"))?;
        if !verify_password(password, &user.password_hash) {
            return Err(PlatformError::new(ErrorKind::InvalidCredentials, "unknown username or password"));
        }
        if !user.enabled {
            return Err(PlatformError::new(ErrorKind::UserDisabled, format!("user '{username}' is disabled")));
        }
        self.issue_auth_token(user, now)
    }

    /// Decode and verify a session bearer token without touching the user store.
    pub fn verify_token(&self, bearer: &str, now: SystemTime) -> Result<AuthToken, PlatformError> {
        let claims = self.signer.verify(bearer, now)?;
        let user_id = Uuid::parse_str(&claims.subject)
            .map_err(|_err| PlatformError::new(ErrorKind::InvalidToken, "malformed token subject"))?;
        Ok(AuthToken {
            user_id,
            username: claims.username.unwrap_or_default(),
            role_names: claims.role_names,
            scopes: claims.scopes.into_iter().collect(),
            signed_bearer: bearer.to_string(),
            issued_at: UNIX_EPOCH + Duration::from_secs(claims.issued_at),
            expires_at: UNIX_EPOCH + Duration::from_secs(claims.expires_at),
        })
    }

    /// Verify a bearer token, re-fetch the user, and issue a fresh one with
    /// up-to-date scopes.
    pub fn refresh_token(&self, bearer: &str, now: SystemTime) -> Result<AuthToken, PlatformError> {
        let claims = self.signer.verify(bearer, now)?;
        let user_id = Uuid::parse_str(&claims.subject)
            .map_err(|_err| PlatformError::new(ErrorKind::InvalidToken, "malformed token subject"))?;
        let user = self
            .users
            .get(user_id)
            .ok_or_else(|| PlatformError::not_found("user no longer exists"))?;
        if !user.enabled {
            return Err(PlatformError::new(ErrorKind::UserDisabled, "user has been disabled"));
        }
        self.issue_auth_token(user, now)
    }

    /// Issue a new API token for `user_id`, returning the stored record and
    /// the plaintext secret (shown to the caller exactly once).
    #[must_use]
    pub fn issue_api_token(
        &self,
        user_id: Uuid,
        name: impl Into<String>,
        scopes: FxHashSet<String>,
        expires_at: Option<SystemTime>,
        now: SystemTime,
    ) -> (ApiToken, String) {
        let plaintext = generate_opaque_secret();
        let token = ApiToken {
            id: Uuid::new_v4(),
            user_id,
            name: name.into(),
            token_hash: hash_api_token(&plaintext),
            scopes,
            created_at: now,
            expires_at,
            revoked_at: None,
            last_used_at: None,
            last_used_ip: None,
        };
        (token, plaintext)
    }

    /// Issue a match-scoped token bound to `match_id` (and optionally a
    /// specific `container_id`), signed so it travels as a bearer string.
    pub fn issue_match_token(
        &self,
        match_id: u64,
        container_id: Option<u64>,
        player_id: u64,
        user_id: Option<Uuid>,
        player_name: impl Into<String>,
        scopes: Option<FxHashSet<String>>,
        ttl: Duration,
        now: SystemTime,
    ) -> Result<MatchToken, PlatformError> {
        let player_name = player_name.into();
        let scopes = scopes.unwrap_or_else(|| DEFAULT_MATCH_SCOPES.iter().map(ToString::to_string).collect());
        let expires_at = now + ttl;
        let claims = Claims {
            subject: player_name.clone(),
            scopes: scopes.iter().cloned().collect(),
            issued_at: unix_secs(now),
            expires_at: unix_secs(expires_at),
            username: None,
            role_names: Vec::new(),
        };
        let signed_bearer = self.signer.sign(&claims)?;
        Ok(MatchToken {
            id: Uuid::new_v4(),
            match_id,
            container_id,
            player_id,
            user_id,
            player_name,
            scopes,
            created_at: now,
            expires_at,
            revoked_at: None,
            signed_bearer: Some(signed_bearer),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::password::hash_password;
    use crate::role::Role;

    fn make_service() -> AuthService {
        AuthService::new(AuthConfig::default())
    }

    #[test]
    fn login_happy_path_then_verify_carries_role_scopes() {
        let mut service = make_service();
        let now = SystemTime::now();
        let role_id = Uuid::new_v4();
        let mut role = Role::new(role_id, "admin", "administrators");
        role.scopes.insert("user.read".to_string());
        service.roles_mut().create(role).unwrap();

        let user_id = Uuid::new_v4();
        let mut user = User::new(user_id, "alice", hash_password("pw", 4).unwrap(), now);
        user.role_ids.insert(role_id);
        service.users_mut().create(user).unwrap();

        let token = service.login("alice", "pw", now).unwrap();
        assert!(token.scopes.contains("user.read"));

        let verified = service.verify_token(&token.signed_bearer, now).unwrap();
        assert_eq!(verified.user_id, user_id);
        assert!(verified.scopes.contains("user.read"));
    }

    #[test]
    fn login_with_wrong_password_is_invalid_credentials() {
        let mut service = make_service();
        let now = SystemTime::now();
        let user = User::new(Uuid::new_v4(), "alice", hash_password("pw", 4).unwrap(), now);
        service.users_mut().create(user).unwrap();
        let err = service.login("alice", "wrong", now).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidCredentials);
    }

    #[test]
    fn login_for_disabled_user_is_user_disabled() {
        let mut service = make_service();
        let now = SystemTime::now();
        let mut user = User::new(Uuid::new_v4(), "alice", hash_password("pw", 4).unwrap(), now);
        user.enabled = false;
        service.users_mut().create(user).unwrap();
        let err = service.login("alice", "pw", now).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UserDisabled);
    }

    #[test]
    fn refresh_reflects_newly_granted_scopes() {
        let mut service = make_service();
        let now = SystemTime::now();
        let user_id = Uuid::new_v4();
        let user = User::new(user_id, "alice", hash_password("pw", 4).unwrap(), now);
        service.users_mut().create(user).unwrap();

        let token = service.login("alice", "pw", now).unwrap();
        assert!(!token.scopes.contains("user.read"));

        service
            .users_mut()
            .get_mut(user_id)
            .unwrap()
            .direct_scopes
            .insert("user.read".to_string());

        let refreshed = service.refresh_token(&token.signed_bearer, now).unwrap();
        assert!(refreshed.scopes.contains("user.read"));
    }

    #[test]
    fn issue_api_token_returns_plaintext_once_and_hashes_for_storage() {
        let service = make_service();
        let now = SystemTime::now();
        let (token, plaintext) = service.issue_api_token(Uuid::new_v4(), "ci", FxHashSet::default(), None, now);
        assert_eq!(token.token_hash, hash_api_token(&plaintext));
        assert!(token.is_active(now));
    }
}
