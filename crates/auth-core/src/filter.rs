//! Request Authorization Filter: every endpoint declares a
//! required scope; this module is what actually enforces it.

use std::time::SystemTime;

use sim_ecs::error::{ErrorKind, PlatformError};

use crate::scope::matches;
use crate::service::AuthService;
use crate::token::{AuthToken, MatchToken};

/// Extract, verify, and scope-check a bearer token.
///
/// Missing or invalid tokens fail with `InvalidToken` (401); a verified
/// token lacking `required_scope` fails with `Forbidden` (403).
pub fn authorize(
    bearer: Option<&str>,
    required_scope: &str,
    service: &AuthService,
    now: SystemTime,
) -> Result<AuthToken, PlatformError> {
    let bearer = bearer.ok_or_else(|| PlatformError::new(ErrorKind::InvalidToken, "missing bearer token"))?;
    let token = service.verify_token(bearer, now)?;
    if !matches(&token.scopes, required_scope) {
        return Err(PlatformError::new(
            ErrorKind::Forbidden,
            format!("token lacks required scope '{required_scope}'"),
        ));
    }
    Ok(token)
}

/// Additionally verify a [`MatchToken`]'s match/container binding, for
/// match-scoped endpoints.
pub fn authorize_match(
    token: &MatchToken,
    required_scope: &str,
    match_id: u64,
    container_id: u64,
    now: SystemTime,
) -> Result<(), PlatformError> {
    if !token.is_valid_for_match_and_container(match_id, container_id, now) {
        return Err(PlatformError::new(
            ErrorKind::Forbidden,
            "match token is not valid for this match/container",
        ));
    }
    if !matches(&token.scopes, required_scope) {
        return Err(PlatformError::new(
            ErrorKind::Forbidden,
            format!("match token lacks required scope '{required_scope}'"),
        ));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use crate::password::hash_password;
    use crate::user::User;
    use uuid::Uuid;

    #[test]
    fn missing_bearer_is_invalid_token() {
        let service = AuthService::new(AuthConfig::default());
        let err = authorize(None, "user.read", &service, SystemTime::now()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidToken);
    }

    #[test]
    fn verified_token_without_required_scope_is_forbidden() {
        let mut service = AuthService::new(AuthConfig::default());
        let now = SystemTime::now();
        let user = User::new(Uuid::new_v4(), "alice", hash_password("pw", 4).unwrap(), now);
        service.users_mut().create(user).unwrap();
        let token = service.login("alice", "pw", now).unwrap();
        let err = authorize(Some(&token.signed_bearer), "control-plane.node.manage", &service, now).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Forbidden);
    }

    #[test]
    fn match_token_binding_mismatch_is_forbidden() {
        let service = AuthService::new(AuthConfig::default());
        let now = SystemTime::now();
        let token = service
            .issue_match_token(1, Some(7), 1, None, "alice", None, std::time::Duration::from_secs(3600), now)
            .unwrap();
        let err = authorize_match(&token, "submit_commands", 1, 8, now).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Forbidden);
        assert!(authorize_match(&token, "submit_commands", 1, 7, now).is_ok());
    }
}
