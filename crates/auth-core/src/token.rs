//! Signed bearer tokens: the wire format, and the session/API/match token
//! types built on top of it.
//!
//! Tokens are a compact `payload.signature` string: `payload` is
//! base64url(JSON claims), `signature` is base64url(HMAC-SHA256(payload)).
//! Tampering with either half, or letting `expires_at` lapse, surfaces as
//! [`ErrorKind::InvalidToken`] — callers deliberately cannot distinguish
//! "tampered" from "expired".

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use rand::RngCore;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sim_ecs::error::{ErrorKind, PlatformError};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// The default scope set granted to a freshly issued match session.
pub const DEFAULT_MATCH_SCOPES: &[&str] = &["submit_commands", "view_snapshots", "receive_errors"];

pub(crate) fn unix_secs(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// The decoded, verified body of a signed bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// The principal this token speaks for (a user id or player name).
    pub subject: String,
    /// Scopes granted by this token.
    pub scopes: Vec<String>,
    /// Issuance time, Unix seconds.
    pub issued_at: u64,
    /// Expiry time, Unix seconds.
    pub expires_at: u64,
    /// Display username, carried for session tokens so `verify_token` can
    /// rebuild an [`AuthToken`] without re-fetching the user.
    #[serde(default)]
    pub username: Option<String>,
    /// Resolved role names, carried for session tokens for the same reason.
    #[serde(default)]
    pub role_names: Vec<String>,
}

/// Signs and verifies [`Claims`] with a single HMAC-SHA256 key.
///
/// Absent an explicitly configured key, a process-generated key is used
/// instead, which means every token signed before a restart becomes
/// invalid (`InvalidToken`) once the process comes back up with a new key.
/// This is intentional and must be documented to operators, not silently
/// worked around.
pub struct TokenSigner {
    key: Vec<u8>,
}

impl TokenSigner {
    /// Build a signer from an explicitly configured key.
    #[must_use]
    pub fn with_key(key: Vec<u8>) -> Self {
        Self { key }
    }

    /// Build a signer from a freshly generated, process-local random key.
    #[must_use]
    pub fn generate() -> Self {
        let mut key = vec![0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        Self { key }
    }

    fn mac(&self) -> Result<HmacSha256, PlatformError> {
        HmacSha256::new_from_slice(&self.key)
            .map_err(|err| PlatformError::new(ErrorKind::Internal, format!("invalid signing key: {err}")))
    }

    /// Sign `claims`, producing a `payload.signature` bearer string.
    pub fn sign(&self, claims: &Claims) -> Result<String, PlatformError> {
        let payload = serde_json::to_vec(claims)
            .map_err(|err| PlatformError::new(ErrorKind::Internal, format!("claims serialization failed: {err}")))?;
        let payload_b64 = URL_SAFE_NO_PAD.encode(payload);
        let mut mac = self.mac()?;
        mac.update(payload_b64.as_bytes());
        let signature_b64 = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        Ok(format!("{payload_b64}.{signature_b64}"))
    }

    /// Verify a bearer string's signature and expiry, returning its claims.
    pub fn verify(&self, bearer: &str, now: SystemTime) -> Result<Claims, PlatformError> {
        let (payload_b64, signature_b64) = bearer
            .split_once('.')
            .ok_or_else(|| PlatformError::new(ErrorKind::InvalidToken, "malformed bearer token"))?;

        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_err| PlatformError::new(ErrorKind::InvalidToken, "malformed token signature"))?;
        let mut mac = self.mac()?;
        mac.update(payload_b64.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_err| PlatformError::new(ErrorKind::InvalidToken, "token signature mismatch"))?;

        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_err| PlatformError::new(ErrorKind::InvalidToken, "malformed token payload"))?;
        let claims: Claims = serde_json::from_slice(&payload)
            .map_err(|_err| PlatformError::new(ErrorKind::InvalidToken, "malformed token claims"))?;

        if claims.expires_at < unix_secs(now) {
            return Err(PlatformError::new(ErrorKind::InvalidToken, "token expired"));
        }
        Ok(claims)
    }
}

/// A session token issued by `login`/`refresh_token`.
#[derive(Debug, Clone)]
pub struct AuthToken {
    /// The authenticated user.
    pub user_id: Uuid,
    /// Their username, for display.
    pub username: String,
    /// The names of their resolved roles.
    pub role_names: Vec<String>,
    /// Effective scopes (direct scopes ∪ role-derived scopes).
    pub scopes: FxHashSet<String>,
    /// The signed bearer string to hand back to the client.
    pub signed_bearer: String,
    /// Issuance time.
    pub issued_at: SystemTime,
    /// Expiry time.
    pub expires_at: SystemTime,
}

/// A long-lived, revocable API credential.
///
/// Unlike session/match tokens, the plaintext is never stored: only a SHA-256
/// digest (`token_hash`) is kept, so a leaked database dump cannot be used to
/// forge tokens. The plaintext is returned once, at creation.
#[derive(Debug, Clone)]
pub struct ApiToken {
    /// Unique id.
    pub id: Uuid,
    /// The owning user.
    pub user_id: Uuid,
    /// A caller-supplied label.
    pub name: String,
    /// SHA-256 hex digest of the plaintext token.
    pub token_hash: String,
    /// Scopes granted at creation.
    pub scopes: FxHashSet<String>,
    /// Creation time.
    pub created_at: SystemTime,
    /// Optional expiry.
    pub expires_at: Option<SystemTime>,
    /// Set once revoked.
    pub revoked_at: Option<SystemTime>,
    /// Updated by `record_usage`.
    pub last_used_at: Option<SystemTime>,
    /// Updated by `record_usage`.
    pub last_used_ip: Option<String>,
}

impl ApiToken {
    /// True if the token has neither been revoked nor expired.
    #[must_use]
    pub fn is_active(&self, now: SystemTime) -> bool {
        self.revoked_at.is_none() && self.expires_at.is_none_or(|exp| exp > now)
    }

    /// Update last-used bookkeeping without mutating the token's identity.
    pub fn record_usage(&mut self, ip: impl Into<String>, now: SystemTime) {
        self.last_used_at = Some(now);
        self.last_used_ip = Some(ip.into());
    }
}

/// Hash a plaintext API token for storage/comparison.
#[must_use]
pub fn hash_api_token(plaintext: &str) -> String {
    let digest = Sha256::digest(plaintext.as_bytes());
    hex_encode(&digest)
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// A credential scoped to one match, optionally pinned to a container.
#[derive(Debug, Clone)]
pub struct MatchToken {
    /// Unique id.
    pub id: Uuid,
    /// The match this token is valid for.
    pub match_id: u64,
    /// If set, the token is only valid within this container.
    pub container_id: Option<u64>,
    /// The player this token speaks for.
    pub player_id: u64,
    /// The backing user account, if the player is an authenticated user.
    pub user_id: Option<Uuid>,
    /// Display name for the player.
    pub player_name: String,
    /// Granted scopes, defaulting to [`DEFAULT_MATCH_SCOPES`].
    pub scopes: FxHashSet<String>,
    /// Creation time.
    pub created_at: SystemTime,
    /// Expiry time.
    pub expires_at: SystemTime,
    /// Set once revoked.
    pub revoked_at: Option<SystemTime>,
    /// The signed bearer string, if this token has been signed.
    pub signed_bearer: Option<String>,
}

impl MatchToken {
    /// True if neither revoked nor expired.
    #[must_use]
    pub fn is_active(&self, now: SystemTime) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }

    /// Enforce the match/container binding plus liveness.
    #[must_use]
    pub fn is_valid_for_match_and_container(&self, match_id: u64, container_id: u64, now: SystemTime) -> bool {
        self.match_id == match_id
            && self.container_id.is_none_or(|bound| bound == container_id)
            && self.is_active(now)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn claims(now: SystemTime, ttl: Duration) -> Claims {
        Claims {
            subject: "user-1".to_string(),
            scopes: vec!["user.read".to_string()],
            issued_at: unix_secs(now),
            expires_at: unix_secs(now + ttl),
            username: Some("alice".to_string()),
            role_names: vec!["admin".to_string()],
        }
    }

    #[test]
    fn sign_then_verify_round_trips_the_subject() {
        let signer = TokenSigner::generate();
        let now = SystemTime::now();
        let bearer = signer.sign(&claims(now, Duration::from_secs(3600))).unwrap();
        let decoded = signer.verify(&bearer, now).unwrap();
        assert_eq!(decoded.subject, "user-1");
    }

    #[test]
    fn tampering_with_the_token_invalidates_it() {
        let signer = TokenSigner::generate();
        let now = SystemTime::now();
        let mut bearer = signer.sign(&claims(now, Duration::from_secs(3600))).unwrap();
        bearer.push('x');
        let err = signer.verify(&bearer, now).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidToken);
    }

    #[test]
    fn expired_token_is_invalid() {
        let signer = TokenSigner::generate();
        let now = SystemTime::now();
        let bearer = signer.sign(&claims(now, Duration::from_secs(1))).unwrap();
        let later = now + Duration::from_secs(10);
        let err = signer.verify(&bearer, later).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidToken);
    }

    #[test]
    fn a_key_change_invalidates_previously_signed_tokens() {
        let signer_a = TokenSigner::generate();
        let signer_b = TokenSigner::generate();
        let now = SystemTime::now();
        let bearer = signer_a.sign(&claims(now, Duration::from_secs(3600))).unwrap();
        let err = signer_b.verify(&bearer, now).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidToken);
    }

    #[test]
    fn match_token_binding_enforces_container_pin() {
        let now = SystemTime::now();
        let token = MatchToken {
            id: Uuid::new_v4(),
            match_id: 1,
            container_id: Some(7),
            player_id: 1,
            user_id: None,
            player_name: "alice".to_string(),
            scopes: DEFAULT_MATCH_SCOPES.iter().map(ToString::to_string).collect(),
            created_at: now,
            expires_at: now + Duration::from_secs(3600),
            revoked_at: None,
            signed_bearer: None,
        };
        assert!(token.is_valid_for_match_and_container(1, 7, now));
        assert!(!token.is_valid_for_match_and_container(1, 8, now));
        assert!(!token.is_valid_for_match_and_container(2, 7, now));
    }
}
