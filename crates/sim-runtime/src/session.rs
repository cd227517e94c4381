//! Player sessions: a player's credentialed context inside one match.

use std::time::SystemTime;

use auth_core::{matches as scopes_match, DEFAULT_MATCH_SCOPES};
use rustc_hash::FxHashSet;
use sim_match::{ContainerId, MatchId, PlayerId};
use uuid::Uuid;

/// Required to submit a command into a match's command queue.
pub const SCOPE_SUBMIT_COMMANDS: &str = "submit_commands";
/// Required to read a match's snapshots.
pub const SCOPE_VIEW_SNAPSHOTS: &str = "view_snapshots";
/// Required to receive command-execution error notifications.
pub const SCOPE_RECEIVE_ERRORS: &str = "receive_errors";

/// A player's session inside one match, created when they join.
///
/// Expiry is enforced by `auth-core`'s token layer upstream of this struct;
/// `is_active` here only reflects local revocation plus the `expires_at`
/// this session was stamped with at creation, for containers that want to
/// sweep stale sessions without calling back into `auth-core`.
#[derive(Debug, Clone)]
pub struct Session {
    /// Unique session id.
    pub id: Uuid,
    /// The player this session belongs to.
    pub player_id: PlayerId,
    /// The match this session was created for.
    pub match_id: MatchId,
    /// The container hosting that match.
    pub container_id: ContainerId,
    /// Granted scopes, defaulting to [`DEFAULT_MATCH_SCOPES`].
    pub scopes: FxHashSet<String>,
    /// Creation time.
    pub issued_at: SystemTime,
    /// Expiry time.
    pub expires_at: SystemTime,
    /// Set once explicitly revoked.
    pub revoked_at: Option<SystemTime>,
}

impl Session {
    /// Create a session with the default match scope set.
    #[must_use]
    pub fn new(
        id: Uuid,
        player_id: PlayerId,
        match_id: MatchId,
        container_id: ContainerId,
        issued_at: SystemTime,
        expires_at: SystemTime,
    ) -> Self {
        Self {
            id,
            player_id,
            match_id,
            container_id,
            scopes: DEFAULT_MATCH_SCOPES.iter().map(ToString::to_string).collect(),
            issued_at,
            expires_at,
            revoked_at: None,
        }
    }

    /// True unless revoked or past `expires_at`.
    #[must_use]
    pub fn is_active(&self, now: SystemTime) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }

    /// True if this session's scopes grant `required`.
    #[must_use]
    pub fn has_scope(&self, required: &str) -> bool {
        scopes_match(&self.scopes, required)
    }

    /// Revoke the session immediately.
    pub fn revoke(&mut self, now: SystemTime) {
        self.revoked_at = Some(now);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn session() -> Session {
        let now = SystemTime::now();
        Session::new(
            Uuid::new_v4(),
            PlayerId(1),
            MatchId(1),
            ContainerId(1),
            now,
            now + Duration::from_secs(3600),
        )
    }

    #[test]
    fn default_scopes_grant_submit_and_view_and_errors() {
        let s = session();
        assert!(s.has_scope(SCOPE_SUBMIT_COMMANDS));
        assert!(s.has_scope(SCOPE_VIEW_SNAPSHOTS));
        assert!(s.has_scope(SCOPE_RECEIVE_ERRORS));
    }

    #[test]
    fn revoked_session_is_not_active() {
        let mut s = session();
        let now = SystemTime::now();
        assert!(s.is_active(now));
        s.revoke(now);
        assert!(!s.is_active(now));
    }

    #[test]
    fn expired_session_is_not_active() {
        let now = SystemTime::now();
        let s = Session::new(Uuid::new_v4(), PlayerId(1), MatchId(1), ContainerId(1), now, now);
        assert!(!s.is_active(now + Duration::from_secs(1)));
    }
}
